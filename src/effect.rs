//! The effect language.
//!
//! Card text is data: an ability's effect is a sequence of `Effect` values,
//! interpreted FIFO by the executor. Selectors (`PlayerSel`, `SystemSel`,
//! `PlanetSel`) are bound from the execution context at resolution time, so
//! the same vocabulary serves action cards, strategy-card primaries and
//! secondaries, agenda outcomes, relics, and leaders.

use crate::ids::{CardId, PlanetId, PlayerId, SystemId, UnitId};
use crate::player::CommandPool;
use crate::types::UnitType;

/// Which player an effect applies to, bound at resolution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PlayerSel {
    /// The player resolving the ability.
    Owner,
    /// The current active player.
    Active,
    /// Every player, clockwise from the owner.
    Each,
    /// Every player except the owner.
    EachOther,
    /// A player chosen in the intent parameters.
    Chosen,
    /// A specific player (bound when the ability was enqueued).
    Fixed(PlayerId),
}

/// Which system an effect applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum SystemSel {
    Active,
    Chosen,
    Fixed(SystemId),
}

/// Which planet an effect applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PlanetSel {
    Chosen,
    Fixed(PlanetId),
}

/// One atomic step of an ability's resolution.
///
/// Atoms that fail their preconditions at resolution time no-op and emit a
/// `Warning` event, unless card text says otherwise (LRR "if you cannot"
/// clauses are modeled as separate variants where needed).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Effect {
    // Economy
    GainTradeGoods { who: PlayerSel, n: u8 },
    SpendTradeGoods { who: PlayerSel, n: u8 },
    ReplenishCommodities { who: PlayerSel },
    GainCommodities { who: PlayerSel, n: u8 },

    // Cards
    DrawActionCards { who: PlayerSel, n: u8 },
    DiscardRandomActionCard { who: PlayerSel },
    DrawSecretObjective { who: PlayerSel },

    // Command tokens
    GainCommandTokens { who: PlayerSel, pool: CommandPool, n: u8 },
    RemoveCommandTokenFromPool { who: PlayerSel, pool: CommandPool },
    /// Place a token from reinforcements into a system (Diplomacy-style;
    /// does not activate).
    PlaceCommandTokenFrozen { who: PlayerSel, system: SystemSel },

    // Planets
    ReadyPlanet { planet: PlanetSel },
    ExhaustPlanet { planet: PlanetSel },
    ReadyAllPlanets { who: PlayerSel },

    // Units
    DestroyUnit { unit: UnitId },
    RepairUnitsIn { system: SystemSel, who: PlayerSel },
    PlaceUnitInSpace { who: PlayerSel, unit_type: UnitType, system: SystemSel },
    PlaceUnitOnPlanet { who: PlayerSel, unit_type: UnitType, planet: PlanetSel },
    PlaceStructure { who: PlayerSel, unit_type: UnitType, planet: PlanetSel },

    // Technology
    ResearchChosenTech { who: PlayerSel },

    // Victory / objectives
    GainVictoryPoints { who: PlayerSel, n: u8 },
    /// Speaker flips the next public objective (stage gating applies).
    RevealPublicObjective,

    // Combat
    /// +N to the player's combat rolls until the end of the combat round.
    CombatBonusThisRound { who: PlayerSel, n: i8 },

    // Attachments and relics
    AttachToPlanet { planet: PlanetSel, card: CardId, resources: u8, influence: u8 },
    DrawRelic { who: PlayerSel },
    PurgeCard { card: CardId },

    // Movement-adjacent
    ActivateNexus,

    /// Readies the owner's agent leader slot.
    ReadyAgent { who: PlayerSel },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_is_plain_data() {
        let script = vec![
            Effect::GainTradeGoods {
                who: PlayerSel::Owner,
                n: 2,
            },
            Effect::DrawActionCards {
                who: PlayerSel::Owner,
                n: 1,
            },
        ];
        let copy = script.clone();
        assert_eq!(script, copy);
    }
}
