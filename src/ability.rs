//! Ability descriptors and timing windows.
//!
//! Every card, law, leader, and faction ability is described by data: the
//! window it may be used in, whether use is mandatory, a condition on the
//! state, an optional cost, the effect script, and cancellation metadata.
//! New cards are data, not code paths.

use crate::effect::Effect;
use crate::ids::{CardId, PlayerId};
use crate::types::Faction;

/// The timing windows the engine opens during resolution. Each variant
/// already encodes its before/when/after position relative to the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum WindowKind {
    StartOfTurn,
    EndOfTurn,
    /// "Action:" cards, played as the owner's action for the turn. A
    /// component action must be completely resolvable to begin (LRR 22.3).
    ComponentAction,
    /// After a system is activated, before movement.
    AfterActivation,
    /// After ships move into the active system, before space cannon fire.
    AfterMovement,
    StartOfCombat,
    StartOfCombatRound,
    /// The reroll micro-window; closes before any "after roll" effect.
    AfterDiceRoll,
    AfterCombatRound,
    EndOfCombat,
    StartOfInvasion,
    AfterBombardment,
    StartOfStatusPhase,
    /// Riders resolve here, before any votes are cast.
    WhenAgendaRevealed,
    BeforeAgendaResolved,
    AfterAgendaResolved,
    WhenUnitDestroyed,
    /// When another player plays an action card (cancellation window).
    WhenActionCardPlayed,
    /// A strategic action's secondary offer to non-active players.
    StrategySecondary,
}

/// Predicate an ability requires of the state before it is eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Condition {
    Always,
    OwnerIsActivePlayer,
    OwnerIsNotActivePlayer,
    OwnerInCombat,
    OwnerIsDefender,
}

/// Cost paid when resolving an ability. Costs are paid in full before any
/// effect atom runs; an unpayable cost makes the ability ineligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum AbilityCost {
    SpendTradeGoods(u8),
    SpendStrategyToken,
    ExhaustAgent,
    PurgeSelf,
}

/// How an ability may reroll dice in the reroll micro-window (LRR 74).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct RerollGrant {
    /// Dice the owner may reroll with one use of this ability.
    pub dice: u8,
    /// Whether the grant applies to the owner's own dice or an opponent's.
    pub own_dice: bool,
}

/// Where an ability comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum AbilitySource {
    ActionCard(CardId),
    Promissory(CardId),
    Technology(CardId),
    Law(CardId),
    Relic(CardId),
    Agent(PlayerId),
    FactionSheet(Faction),
}

/// A registered ability.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct AbilityDef {
    pub window: WindowKind,
    pub mandatory: bool,
    pub condition: Condition,
    pub cost: Option<AbilityCost>,
    pub effect: Vec<Effect>,
    /// Whether this ability can be cancelled while on the queue
    /// (action cards, unless the card says otherwise).
    pub cancellable: bool,
    /// Set on abilities that cancel another ability instead of producing
    /// their own effects.
    pub cancels: bool,
    /// Set on abilities that grant rerolls in the reroll micro-window.
    pub reroll: Option<RerollGrant>,
}

impl AbilityDef {
    pub fn new(window: WindowKind, effect: Vec<Effect>) -> Self {
        Self {
            window,
            mandatory: false,
            condition: Condition::Always,
            cost: None,
            effect,
            cancellable: false,
            cancels: false,
            reroll: None,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn costing(mut self, cost: AbilityCost) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn cancellable(mut self) -> Self {
        self.cancellable = true;
        self
    }

    pub fn canceller(mut self) -> Self {
        self.cancels = true;
        self
    }

    pub fn rerolls(mut self, grant: RerollGrant) -> Self {
        self.reroll = Some(grant);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::PlayerSel;

    #[test]
    fn test_builder_defaults_are_optional_uncancellable() {
        let def = AbilityDef::new(
            WindowKind::StartOfTurn,
            vec![Effect::GainTradeGoods {
                who: PlayerSel::Owner,
                n: 1,
            }],
        );
        assert!(!def.mandatory);
        assert!(!def.cancellable);
        assert_eq!(def.condition, Condition::Always);
        assert!(def.cost.is_none());
    }
}
