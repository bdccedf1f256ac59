//! Intents, pending decisions, and the rejection taxonomy.
//!
//! An intent is a proposed player action. `apply` validates it against the
//! rules and either produces a new state plus events, or a `Rejection` that
//! leaves the state untouched. When a resolution step needs input from a
//! specific player, the state carries a `PendingDecision` naming that player
//! and the intent shape expected next.

use thiserror::Error;

use crate::ability::{AbilitySource, WindowKind};
use crate::card::StrategyCard;
use crate::ids::{CardId, PlanetId, PlayerId, SystemId, UnitId};
use crate::types::UnitType;

/// Chosen targets accompanying an ability or card play. Slots not used by
/// the ability are left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ChosenTargets {
    pub player: Option<PlayerId>,
    pub system: Option<SystemId>,
    pub planet: Option<PlanetId>,
    pub units: Vec<UnitId>,
    pub card: Option<CardId>,
}

/// A payment: readied planets to exhaust plus trade goods (1:1 substitution,
/// never valid for votes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Spend {
    pub planets: Vec<PlanetId>,
    pub trade_goods: u8,
}

/// One ship's movement declaration: the path ends at the active system, and
/// `cargo` lists fighters/ground forces picked up along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct MovementOrder {
    pub unit: UnitId,
    /// Systems entered, in order, excluding the origin.
    pub path: Vec<SystemId>,
    pub cargo: Vec<UnitId>,
}

/// Assignment of one produced hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct HitAssignment {
    pub unit: UnitId,
    /// Cancel the hit with sustain damage instead of destroying the unit.
    pub sustain: bool,
}

/// One bombardment roll: a ship with Bombardment and its target planet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct BombardmentOrder {
    pub unit: UnitId,
    pub planet: PlanetId,
}

/// A unit to produce and, for ground forces, where to place it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct BuildOrder {
    pub unit_type: UnitType,
    /// Ground forces from a space dock may land on the dock's planet or go
    /// to the space area (LRR 68.4). Ships ignore this field.
    pub on_planet: Option<PlanetId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ProductionOrder {
    pub producer: UnitId,
    pub build: Vec<BuildOrder>,
}

/// One side of a binding transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TransactionOffer {
    pub trade_goods: u8,
    pub commodities: u8,
    pub action_cards: Vec<CardId>,
    /// At most one promissory note per transaction.
    pub promissory: Option<CardId>,
    pub relic_fragments: Vec<CardId>,
}

impl TransactionOffer {
    pub fn is_empty(&self) -> bool {
        self.trade_goods == 0
            && self.commodities == 0
            && self.action_cards.is_empty()
            && self.promissory.is_none()
            && self.relic_fragments.is_empty()
    }
}

/// A vote outcome on an agenda.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Outcome {
    For,
    Against,
    ElectPlayer(PlayerId),
    ElectPlanet(PlanetId),
}

impl Outcome {
    pub fn describe(self) -> String {
        match self {
            Outcome::For => "for".to_string(),
            Outcome::Against => "against".to_string(),
            Outcome::ElectPlayer(p) => format!("elect {p}"),
            Outcome::ElectPlanet(p) => format!("elect {p}"),
        }
    }
}

/// Parameters of a strategic action primary, per card.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PrimaryParams {
    /// Gain 3 tokens, plus any number bought at 3 influence each; the tuple
    /// distributes all gained tokens (tactic, fleet, strategy).
    Leadership { spend: Spend, tokens: (u8, u8, u8) },
    /// Ready/annex: choose a system; each other player places a token there
    /// from reinforcements; ready up to 2 exhausted planets you control there.
    Diplomacy { system: SystemId },
    /// Choose the new speaker; draw 2 action cards; look at agenda top cards.
    Politics { speaker: PlayerId },
    /// Place 1 PDS or 1 space dock on a planet you control (`None` skips
    /// the placement when no planet can take one).
    Construction {
        unit_type: UnitType,
        planet: Option<PlanetId>,
    },
    /// Gain 3 trade goods, replenish commodities, choose players who also
    /// replenish.
    Trade { replenish: Vec<PlayerId> },
    /// Remove one of your command tokens from the board (`None` only when
    /// none are placed).
    Warfare { system: Option<SystemId> },
    /// Research one technology; optionally a second for 6 resources.
    Technology {
        tech: CardId,
        second: Option<(CardId, Spend)>,
    },
    /// Score a public objective you qualify for (or none); gain 1 VP if you
    /// control Mecatol Rex; draw a secret objective.
    Imperial { objective: Option<CardId> },
}

/// Parameters of a strategy-card secondary.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum SecondaryParams {
    Leadership { spend: Spend, tokens: (u8, u8, u8) },
    Diplomacy { planets: Vec<PlanetId> },
    Politics,
    Construction { unit_type: UnitType, planet: PlanetId },
    Trade,
    Warfare { orders: Vec<ProductionOrder>, spend: Spend },
    Technology { tech: CardId, spend: Spend },
    Imperial,
}

/// All player-initiated actions.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Intent {
    // Strategy phase
    ChooseStrategyCard {
        player: PlayerId,
        card: StrategyCard,
    },

    // Tactical action
    ActivateSystem {
        player: PlayerId,
        system: SystemId,
    },
    DeclareMovement {
        player: PlayerId,
        movements: Vec<MovementOrder>,
    },
    /// Use (or decline, with `roll: false`) space cannon against the active
    /// player's ships.
    UseSpaceCannon {
        player: PlayerId,
        roll: bool,
    },
    AssignSpaceCannonHits {
        player: PlayerId,
        assignments: Vec<HitAssignment>,
    },
    AnnounceRetreat {
        player: PlayerId,
        retreat: bool,
    },
    ChooseRetreatDestination {
        player: PlayerId,
        into: SystemId,
    },
    UseReroll {
        player: PlayerId,
        source: AbilitySource,
        /// Whose dice and which die index to reroll.
        roller: PlayerId,
        die: usize,
    },
    /// Close the reroll micro-window for this player.
    DeclineReroll {
        player: PlayerId,
    },
    AssignCombatHits {
        player: PlayerId,
        assignments: Vec<HitAssignment>,
    },
    Bombard {
        player: PlayerId,
        rolls: Vec<BombardmentOrder>,
    },
    CommitGroundForces {
        player: PlayerId,
        /// Empty = commit nothing, skip invasion of uncontested planets.
        commitments: Vec<(UnitId, PlanetId)>,
        /// Influence payment for the custodians token when committing to
        /// Mecatol Rex.
        custodians_payment: Option<Spend>,
    },
    Produce {
        player: PlayerId,
        orders: Vec<ProductionOrder>,
        spend: Spend,
    },

    // Strategic / component actions
    PerformStrategicAction {
        player: PlayerId,
        card: StrategyCard,
        params: PrimaryParams,
    },
    ResolveSecondary {
        player: PlayerId,
        card: StrategyCard,
        /// None = decline.
        params: Option<SecondaryParams>,
    },
    PlayActionCard {
        player: PlayerId,
        card: CardId,
        targets: ChosenTargets,
    },
    PlayPromissoryNote {
        player: PlayerId,
        card: CardId,
        targets: ChosenTargets,
    },
    /// Component action: purge three matching relic fragments (unknowns are
    /// wild) to draw a relic.
    TradeRelicFragments {
        player: PlayerId,
        fragments: Vec<CardId>,
    },

    // Transactions
    ProposeTransaction {
        from: PlayerId,
        to: PlayerId,
        give: TransactionOffer,
        receive: TransactionOffer,
    },
    ConfirmTransaction {
        player: PlayerId,
        accept: bool,
    },

    // Agenda phase
    CastVotes {
        player: PlayerId,
        /// Planets to exhaust; all votes go to one outcome. Empty = abstain.
        planets: Vec<PlanetId>,
        outcome: Option<Outcome>,
    },
    /// Speaker's tie-break / no-vote choice.
    ChooseOutcome {
        player: PlayerId,
        outcome: Outcome,
    },

    // Objectives and hands
    ScoreObjective {
        player: PlayerId,
        objective: CardId,
    },
    RedistributeTokens {
        player: PlayerId,
        tactic: u8,
        fleet: u8,
        strategy: u8,
    },
    DiscardActionCards {
        player: PlayerId,
        cards: Vec<CardId>,
    },
    ReturnSecretObjective {
        player: PlayerId,
        card: CardId,
    },
    RemoveExcessUnits {
        player: PlayerId,
        units: Vec<UnitId>,
    },

    // Generic flow
    Pass {
        player: PlayerId,
    },
    /// Accept an offered optional ability (window offer or cancellation
    /// offer), or decline with `choice: None`.
    ConfirmOptional {
        player: PlayerId,
        choice: Option<AbilityChoice>,
    },
    /// Synthetic intent submitted by an external scheduler: resolves as the
    /// pending player's default choice.
    Timeout {
        player: PlayerId,
    },
}

impl Intent {
    /// The player this intent belongs to.
    pub fn player(&self) -> PlayerId {
        match self {
            Intent::ChooseStrategyCard { player, .. }
            | Intent::ActivateSystem { player, .. }
            | Intent::DeclareMovement { player, .. }
            | Intent::UseSpaceCannon { player, .. }
            | Intent::AssignSpaceCannonHits { player, .. }
            | Intent::AnnounceRetreat { player, .. }
            | Intent::ChooseRetreatDestination { player, .. }
            | Intent::UseReroll { player, .. }
            | Intent::DeclineReroll { player }
            | Intent::AssignCombatHits { player, .. }
            | Intent::Bombard { player, .. }
            | Intent::CommitGroundForces { player, .. }
            | Intent::Produce { player, .. }
            | Intent::PerformStrategicAction { player, .. }
            | Intent::ResolveSecondary { player, .. }
            | Intent::PlayActionCard { player, .. }
            | Intent::PlayPromissoryNote { player, .. }
            | Intent::TradeRelicFragments { player, .. }
            | Intent::CastVotes { player, .. }
            | Intent::ChooseOutcome { player, .. }
            | Intent::ScoreObjective { player, .. }
            | Intent::RedistributeTokens { player, .. }
            | Intent::DiscardActionCards { player, .. }
            | Intent::ReturnSecretObjective { player, .. }
            | Intent::RemoveExcessUnits { player, .. }
            | Intent::Pass { player }
            | Intent::ConfirmOptional { player, .. }
            | Intent::Timeout { player } => *player,
            Intent::ProposeTransaction { from, .. } => *from,
            Intent::ConfirmTransaction { player, .. } => *player,
        }
    }
}

/// An accepted ability from a window offer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct AbilityChoice {
    pub source: AbilitySource,
    pub targets: ChosenTargets,
}

/// Why hits are being assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum HitContext {
    SpaceCannonOffense,
    SpaceCombat,
    SpaceCannonDefense(PlanetId),
    GroundCombat(PlanetId),
}

/// The intent shape the engine expects next, and from whom.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PendingDecision {
    pub player: PlayerId,
    pub kind: DecisionKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum DecisionKind {
    ChooseStrategyCard,
    /// Active player's turn: tactical, strategic, component action, or pass.
    TakeTurn,
    DeclareMovement { system: SystemId },
    OfferSpaceCannon { system: SystemId },
    AssignHits { count: u8, context: HitContext },
    AnnounceRetreat,
    ChooseRetreatDestination,
    OfferReroll,
    Bombard,
    CommitGroundForces,
    Produce,
    OfferAbility { window: WindowKind },
    OfferCancel { card: CardId },
    OfferSecondary { card: StrategyCard },
    /// Score or pass during the status-phase scoring step.
    ScoreObjectives,
    RedistributeTokens { gained: u8 },
    DiscardToHandLimit { excess: u8 },
    ReturnSecretObjective,
    CastVotes,
    ChooseOutcome,
    ConfirmTransaction { from: PlayerId },
    RemoveExcessUnits { system: SystemId, excess: u8 },
}

/// Failure kinds per the error taxonomy. Never a panic, never an exception
/// across the `apply` boundary; every rejection carries a stable code and a
/// presentable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub enum Rejection {
    #[error("invalid intent [{code}]: {message}")]
    InvalidIntent { code: &'static str, message: String },

    #[error("rules violation [{code}]: {message}")]
    RulesViolation { code: &'static str, message: String },

    #[error("ambiguous choice [{code}]: {message}")]
    AmbiguousChoice { code: &'static str, message: String },

    #[error("unresolvable effect [{code}]: {message}")]
    UnresolvableEffect { code: &'static str, message: String },

    #[error("internal invariant violation [{code}]: {message}")]
    InternalInvariantViolation { code: &'static str, message: String },
}

impl Rejection {
    pub fn invalid(code: &'static str, message: impl Into<String>) -> Self {
        Rejection::InvalidIntent {
            code,
            message: message.into(),
        }
    }

    pub fn rules(code: &'static str, message: impl Into<String>) -> Self {
        Rejection::RulesViolation {
            code,
            message: message.into(),
        }
    }

    pub fn ambiguous(code: &'static str, message: impl Into<String>) -> Self {
        Rejection::AmbiguousChoice {
            code,
            message: message.into(),
        }
    }

    pub fn unresolvable(code: &'static str, message: impl Into<String>) -> Self {
        Rejection::UnresolvableEffect {
            code,
            message: message.into(),
        }
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Rejection::InternalInvariantViolation {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Rejection::InvalidIntent { code, .. }
            | Rejection::RulesViolation { code, .. }
            | Rejection::AmbiguousChoice { code, .. }
            | Rejection::UnresolvableEffect { code, .. }
            | Rejection::InternalInvariantViolation { code, .. } => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_player_extraction() {
        let p = PlayerId::from_index(2);
        assert_eq!(Intent::Pass { player: p }.player(), p);
        assert_eq!(
            Intent::ProposeTransaction {
                from: p,
                to: PlayerId::from_index(0),
                give: TransactionOffer::default(),
                receive: TransactionOffer::default(),
            }
            .player(),
            p
        );
    }

    #[test]
    fn test_rejection_codes_are_stable() {
        let r = Rejection::rules("fleet_pool", "too many ships");
        assert_eq!(r.code(), "fleet_pool");
        assert!(r.to_string().contains("fleet_pool"));
    }
}
