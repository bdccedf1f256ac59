//! Players: command sheet, trade goods and commodities, hands, leaders,
//! reinforcements.

use std::collections::BTreeMap;

use crate::card::StrategyCard;
use crate::ids::{CardId, PlayerId, SystemId};
use crate::types::{Faction, PlayerColor, UnitType};
use crate::unit::UnitTier;

/// The three command pools on the command sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum CommandPool {
    Tactic,
    Fleet,
    Strategy,
}

/// Command token counts per pool. Fleet pool tokens sit ship-silhouette up
/// and bound non-fighter ships per system; they are not spent except via
/// specific effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct CommandSheet {
    pub tactic: u8,
    pub fleet: u8,
    pub strategy: u8,
}

impl CommandSheet {
    pub fn new(tactic: u8, fleet: u8, strategy: u8) -> Self {
        Self {
            tactic,
            fleet,
            strategy,
        }
    }

    pub fn count(&self, pool: CommandPool) -> u8 {
        match pool {
            CommandPool::Tactic => self.tactic,
            CommandPool::Fleet => self.fleet,
            CommandPool::Strategy => self.strategy,
        }
    }

    /// Remove one token from a pool. Returns false if the pool is empty.
    pub fn take(&mut self, pool: CommandPool) -> bool {
        let slot = match pool {
            CommandPool::Tactic => &mut self.tactic,
            CommandPool::Fleet => &mut self.fleet,
            CommandPool::Strategy => &mut self.strategy,
        };
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }

    pub fn add(&mut self, pool: CommandPool, n: u8) {
        match pool {
            CommandPool::Tactic => self.tactic += n,
            CommandPool::Fleet => self.fleet += n,
            CommandPool::Strategy => self.strategy += n,
        }
    }

    pub fn total(&self) -> u8 {
        self.tactic + self.fleet + self.strategy
    }
}

/// Lifecycle state of a leader on the leader sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum LeaderState {
    /// Commander not yet unlocked.
    Locked,
    Readied,
    /// Agents exhaust when used and ready in the status phase.
    Exhausted,
    /// Heroes purge after use.
    Purged,
}

/// Agent, commander, and hero slots (Prophecy of Kings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct LeaderSheet {
    pub agent: LeaderState,
    pub commander: LeaderState,
    pub hero: LeaderState,
}

impl Default for LeaderSheet {
    fn default() -> Self {
        Self {
            agent: LeaderState::Readied,
            commander: LeaderState::Locked,
            hero: LeaderState::Locked,
        }
    }
}

/// A strategy card in a player's play area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct StrategyHolding {
    pub card: StrategyCard,
    pub exhausted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Player {
    pub id: PlayerId,
    pub faction: Faction,
    pub color: PlayerColor,
    pub home: SystemId,
    pub command: CommandSheet,
    pub trade_goods: u8,
    pub commodities: u8,
    /// Hidden hand of action cards (soft cap 7 at status-phase end).
    pub action_cards: Vec<CardId>,
    /// Promissory notes currently held, own stock included.
    pub promissory_hand: Vec<CardId>,
    /// Unscored secret objectives (cap 3).
    pub secret_hand: Vec<CardId>,
    /// Scored secrets, kept faceup.
    pub scored_secrets: Vec<CardId>,
    pub scored_public: Vec<CardId>,
    pub technologies: Vec<CardId>,
    /// Relic fragments in the play area, faceup.
    pub relic_fragments: Vec<CardId>,
    /// Relics held.
    pub relics: Vec<CardId>,
    /// Unit tiers; absent types are tier I.
    pub unit_tiers: BTreeMap<UnitType, UnitTier>,
    pub strategy_cards: Vec<StrategyHolding>,
    pub leaders: LeaderSheet,
    /// Command tokens not yet on the sheet or board.
    pub token_reinforcements: u8,
    pub victory_points: u8,
    pub passed: bool,
    pub eliminated: bool,
}

impl Player {
    pub fn new(id: PlayerId, faction: Faction, color: PlayerColor, home: SystemId) -> Self {
        Self {
            id,
            faction,
            color,
            home,
            // Starting pools: 3 tactic, 3 fleet, 2 strategy (LRR setup).
            command: CommandSheet::new(3, 3, 2),
            trade_goods: 0,
            commodities: 0,
            action_cards: Vec::new(),
            promissory_hand: Vec::new(),
            secret_hand: Vec::new(),
            scored_secrets: Vec::new(),
            scored_public: Vec::new(),
            technologies: Vec::new(),
            relic_fragments: Vec::new(),
            relics: Vec::new(),
            unit_tiers: BTreeMap::new(),
            strategy_cards: Vec::new(),
            leaders: LeaderSheet::default(),
            token_reinforcements: 8,
            victory_points: 0,
            passed: false,
            eliminated: false,
        }
    }

    pub fn tier(&self, unit_type: UnitType) -> UnitTier {
        self.unit_tiers
            .get(&unit_type)
            .copied()
            .unwrap_or(UnitTier::I)
    }

    pub fn has_tech(&self, card: CardId) -> bool {
        self.technologies.contains(&card)
    }

    /// Replenish commodities up to the faction sheet value.
    pub fn replenish_commodities(&mut self) {
        self.commodities = self.faction.commodity_value();
    }

    /// The lowest initiative value among held strategy cards, if any.
    pub fn initiative(&self) -> Option<u8> {
        self.strategy_cards
            .iter()
            .map(|h| h.card.initiative())
            .min()
    }

    pub fn holds_strategy_card(&self, card: StrategyCard) -> bool {
        self.strategy_cards.iter().any(|h| h.card == card)
    }

    /// All held strategy cards have been exhausted (i.e. their strategic
    /// actions performed), which is the precondition for passing.
    pub fn all_strategy_cards_exhausted(&self) -> bool {
        self.strategy_cards.iter().all(|h| h.exhausted)
    }

    pub fn remove_action_card(&mut self, card: CardId) -> bool {
        if let Some(pos) = self.action_cards.iter().position(|&c| c == card) {
            self.action_cards.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn remove_secret(&mut self, card: CardId) -> bool {
        if let Some(pos) = self.secret_hand.iter().position(|&c| c == card) {
            self.secret_hand.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn remove_promissory(&mut self, card: CardId) -> bool {
        if let Some(pos) = self.promissory_hand.iter().position(|&c| c == card) {
            self.promissory_hand.remove(pos);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> Player {
        Player::new(
            PlayerId::from_index(0),
            Faction::FederationOfSol,
            PlayerColor::Blue,
            SystemId::from_raw(1),
        )
    }

    #[test]
    fn test_take_from_empty_pool_fails() {
        let mut p = player();
        p.command.strategy = 0;
        assert!(!p.command.take(CommandPool::Strategy));
        assert!(p.command.take(CommandPool::Tactic));
        assert_eq!(p.command.tactic, 2);
    }

    #[test]
    fn test_initiative_is_lowest_held_card() {
        let mut p = player();
        assert_eq!(p.initiative(), None);
        p.strategy_cards.push(StrategyHolding {
            card: StrategyCard::Warfare,
            exhausted: false,
        });
        p.strategy_cards.push(StrategyHolding {
            card: StrategyCard::Diplomacy,
            exhausted: false,
        });
        assert_eq!(p.initiative(), Some(2));
    }

    #[test]
    fn test_replenish_caps_at_faction_value() {
        let mut p = player();
        p.commodities = 1;
        p.replenish_commodities();
        assert_eq!(p.commodities, Faction::FederationOfSol.commodity_value());
    }

    #[test]
    fn test_default_tier_is_one() {
        let mut p = player();
        assert_eq!(p.tier(UnitType::Cruiser), UnitTier::I);
        p.unit_tiers.insert(UnitType::Cruiser, UnitTier::II);
        assert_eq!(p.tier(UnitType::Cruiser), UnitTier::II);
    }
}
