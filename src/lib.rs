//! A deterministic rules engine for Twilight Imperium 4th Edition (base +
//! Prophecy of Kings).
//!
//! The engine is a pure function over an immutable state: `Game::apply`
//! validates a player intent against the rules and produces a new state plus
//! a log of observable events. Hidden information stays inside the state and
//! crosses the boundary only through `observe`. Replaying `(options, seed,
//! intent log)` reproduces every state and event exactly.

pub mod ability;
pub mod agenda;
pub mod card;
pub mod combat;
pub mod content;
pub mod deck;
pub mod effect;
pub mod engine;
pub mod event;
pub mod executor;
pub mod exploration;
pub mod galaxy;
pub mod ids;
pub mod intent;
pub mod movement;
pub mod observe;
pub mod phases;
pub mod planet;
pub mod player;
pub mod registry;
pub mod rng;
pub mod setup;
pub mod state;
pub mod strategy;
pub mod tactical;
pub mod transaction;
pub mod types;
pub mod unit;
pub mod window;

#[cfg(test)]
mod tests;

pub use ability::{AbilityCost, AbilityDef, AbilitySource, Condition, RerollGrant, WindowKind};
pub use card::{
    AgendaDef, AgendaKind, CardDefinition, CardKind, Elect, ExplorationDef, ExplorationOutcome,
    LawModifier, ObjectiveCondition, ObjectiveDef, ObjectiveKind, ObjectiveTiming, PromissoryDef,
    RelicDef, StrategyCard, TechDef,
};
pub use deck::Deck;
pub use effect::{Effect, PlanetSel, PlayerSel, SystemSel};
pub use engine::{Game, replay};
pub use event::{Event, EventKind, Scope};
pub use galaxy::{Galaxy, HexCoord, SystemTile};
pub use ids::{AbilityId, CardId, PlanetId, PlayerId, SystemId, UnitId};
pub use intent::{
    AbilityChoice, BombardmentOrder, BuildOrder, ChosenTargets, DecisionKind, HitAssignment,
    HitContext, Intent, MovementOrder, Outcome, PendingDecision, PrimaryParams, ProductionOrder,
    Rejection, SecondaryParams, Spend, TransactionOffer,
};
pub use observe::{DeckCounts, HandCounts, PublicState, observe};
pub use planet::Planet;
pub use player::{CommandPool, CommandSheet, LeaderSheet, LeaderState, Player, StrategyHolding};
pub use registry::CardRegistry;
pub use rng::DiceStream;
pub use setup::{GameOptions, PlayerSetup};
pub use state::{
    CombatStage, CombatState, DieRoll, GamePhase, GameState, InvasionStage, InvasionState,
    LawInPlay, RerollState, TacticalState, TacticalStep, WindowState,
};
pub use types::{
    Anomaly, Expansion, Faction, PlanetTrait, PlayerColor, TechColor, TileBack, UnitType,
    WormholeKind,
};
pub use unit::{Production, RollProfile, Unit, UnitCost, UnitLocation, UnitStats, UnitTier};
