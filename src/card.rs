//! Card entities.
//!
//! A card's identity is its `CardId`; its definition lives in the registry;
//! its *state* (in deck, in hand, in play, discarded, purged, attached) is
//! held by whoever contains it — decks, player hands, the law area — never on
//! the card value itself.

use crate::ability::AbilityDef;
use crate::ids::CardId;
use crate::types::{PlanetTrait, TechColor, UnitType};

/// The eight strategy cards, in initiative order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum StrategyCard {
    Leadership,
    Diplomacy,
    Politics,
    Construction,
    Trade,
    Warfare,
    Technology,
    Imperial,
}

impl StrategyCard {
    pub fn initiative(self) -> u8 {
        match self {
            StrategyCard::Leadership => 1,
            StrategyCard::Diplomacy => 2,
            StrategyCard::Politics => 3,
            StrategyCard::Construction => 4,
            StrategyCard::Trade => 5,
            StrategyCard::Warfare => 6,
            StrategyCard::Technology => 7,
            StrategyCard::Imperial => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StrategyCard::Leadership => "Leadership",
            StrategyCard::Diplomacy => "Diplomacy",
            StrategyCard::Politics => "Politics",
            StrategyCard::Construction => "Construction",
            StrategyCard::Trade => "Trade",
            StrategyCard::Warfare => "Warfare",
            StrategyCard::Technology => "Technology",
            StrategyCard::Imperial => "Imperial",
        }
    }

    pub const ALL: [StrategyCard; 8] = [
        StrategyCard::Leadership,
        StrategyCard::Diplomacy,
        StrategyCard::Politics,
        StrategyCard::Construction,
        StrategyCard::Trade,
        StrategyCard::Warfare,
        StrategyCard::Technology,
        StrategyCard::Imperial,
    ];
}

/// Laws persist; directives resolve and discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum AgendaKind {
    Law,
    Directive,
}

/// What an agenda elects, if anything. For/Against agendas elect nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Elect {
    ForAgainst,
    Player,
    Planet,
}

/// A persistent rules modification a law applies while in play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum LawModifier {
    /// +N to combat rolls for a unit type (space combat only).
    CombatBonus { unit_type: UnitType, bonus: i8 },
    /// -N to combat rolls for a unit type.
    CombatPenalty { unit_type: UnitType, penalty: i8 },
    /// Fleet pool counts as N larger for every player.
    FleetPoolBonus(u8),
    /// The elected player gains N victory points while the law stands
    /// (retained even if the law is later discarded, LRR 98.6).
    ElectedGainsVictoryPoint,
    /// No mechanical hook; text is informational at this layer.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct AgendaDef {
    pub kind: AgendaKind,
    pub elect: Elect,
    pub modifier: LawModifier,
    /// Resolution script for directives (and for law "Against" outcomes
    /// where the card specifies one).
    pub on_resolve: Vec<crate::effect::Effect>,
}

/// Objective classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectiveKind {
    StageI,
    StageII,
    Secret,
}

/// Scoring conditions, evaluated against the state at the listed timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectiveCondition {
    ControlPlanets(u8),
    ControlPlanetsOutsideHome(u8),
    ControlPlanetsWithTrait(PlanetTrait, u8),
    /// Control N planets that share any one trait.
    ControlPlanetsSameTrait(u8),
    OwnTechnologies(u8),
    /// Own N unit-upgrade technologies.
    OwnUnitUpgrades(u8),
    /// Hold N or more trade goods at scoring time.
    HoldTradeGoods(u8),
    ControlMecatolRex,
    /// Have N or more non-fighter ships in a single system.
    FleetOfShips(u8),
    /// Destroyed another player's unit this round (tracked flag).
    DestroyedEnemyUnit,
}

/// When an objective may be scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectiveTiming {
    StatusPhase,
    /// Action-phase secrets ("at the end of your turn" class).
    ActionPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectiveDef {
    pub kind: ObjectiveKind,
    pub condition: ObjectiveCondition,
    pub timing: ObjectiveTiming,
    pub points: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TechDef {
    /// None for unit upgrades.
    pub color: Option<TechColor>,
    /// Colored prerequisite pips.
    pub prerequisites: Vec<TechColor>,
    /// Set when this tech upgrades a unit type to tier II.
    pub unit_upgrade: Option<UnitType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PromissoryDef {
    /// The ability granted to a non-owner holder.
    pub ability: AbilityDef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct RelicDef {
    pub ability: AbilityDef,
    /// Most relics purge after use.
    pub purge_after_use: bool,
}

/// What resolving an exploration card does.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum ExplorationOutcome {
    /// Attach to the explored planet, adding values.
    Attach { resources: u8, influence: u8 },
    /// Gain a relic fragment of the given trait (None = unknown/frontier).
    RelicFragment(Option<PlanetTrait>),
    /// Run an effect script.
    Resolve(Vec<crate::effect::Effect>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ExplorationDef {
    /// Which deck the card belongs to; None = frontier deck.
    pub deck: Option<PlanetTrait>,
    pub outcome: ExplorationOutcome,
}

/// A card definition: identity, name, kind-specific payload. Definitions
/// are rebuilt from content, never serialized with the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardDefinition {
    pub id: CardId,
    pub name: &'static str,
    pub kind: CardKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum CardKind {
    Action(AbilityDef),
    Agenda(AgendaDef),
    Objective(ObjectiveDef),
    Technology(TechDef),
    Promissory(PromissoryDef),
    Relic(RelicDef),
    Exploration(ExplorationDef),
}

impl CardDefinition {
    pub fn as_action(&self) -> Option<&AbilityDef> {
        match &self.kind {
            CardKind::Action(def) => Some(def),
            _ => None,
        }
    }

    pub fn as_agenda(&self) -> Option<&AgendaDef> {
        match &self.kind {
            CardKind::Agenda(def) => Some(def),
            _ => None,
        }
    }

    pub fn as_objective(&self) -> Option<&ObjectiveDef> {
        match &self.kind {
            CardKind::Objective(def) => Some(def),
            _ => None,
        }
    }

    pub fn as_technology(&self) -> Option<&TechDef> {
        match &self.kind {
            CardKind::Technology(def) => Some(def),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_card_initiative_order() {
        let mut initiatives: Vec<u8> = StrategyCard::ALL.iter().map(|c| c.initiative()).collect();
        let sorted = initiatives.clone();
        initiatives.sort_unstable();
        assert_eq!(initiatives, sorted);
        assert_eq!(StrategyCard::Leadership.initiative(), 1);
        assert_eq!(StrategyCard::Imperial.initiative(), 8);
    }
}
