//! The card registry: card id → definition.
//!
//! Definitions are static data loaded at game creation; the registry is not
//! part of the serialized state (a snapshot carries only ids, and the same
//! content set rebuilds the same registry).

use std::collections::BTreeMap;

use crate::card::{CardDefinition, CardKind, ObjectiveKind};
use crate::ids::CardId;
use crate::types::PlanetTrait;

#[derive(Debug, Clone, Default)]
pub struct CardRegistry {
    cards: BTreeMap<CardId, CardDefinition>,
}

impl CardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Panics on id collision; content ids are
    /// assigned statically and a collision is a content-authoring bug.
    pub fn register(&mut self, def: CardDefinition) {
        let id = def.id;
        if self.cards.insert(id, def).is_some() {
            panic!("duplicate card id {id:?} in registry");
        }
    }

    pub fn get(&self, id: CardId) -> Option<&CardDefinition> {
        self.cards.get(&id)
    }

    pub fn name_of(&self, id: CardId) -> &'static str {
        self.cards.get(&id).map(|d| d.name).unwrap_or("<unknown>")
    }

    pub fn iter(&self) -> impl Iterator<Item = &CardDefinition> {
        self.cards.values()
    }

    pub fn ids_where(&self, mut pred: impl FnMut(&CardDefinition) -> bool) -> Vec<CardId> {
        self.cards
            .values()
            .filter(|d| pred(d))
            .map(|d| d.id)
            .collect()
    }

    pub fn action_card_ids(&self) -> Vec<CardId> {
        self.ids_where(|d| matches!(d.kind, CardKind::Action(_)))
    }

    pub fn agenda_ids(&self) -> Vec<CardId> {
        self.ids_where(|d| matches!(d.kind, CardKind::Agenda(_)))
    }

    pub fn objective_ids(&self, kind: ObjectiveKind) -> Vec<CardId> {
        self.ids_where(|d| match &d.kind {
            CardKind::Objective(o) => o.kind == kind,
            _ => false,
        })
    }

    pub fn relic_ids(&self) -> Vec<CardId> {
        self.ids_where(|d| matches!(d.kind, CardKind::Relic(_)))
    }

    pub fn exploration_ids(&self, deck: Option<PlanetTrait>) -> Vec<CardId> {
        self.ids_where(|d| match &d.kind {
            CardKind::Exploration(e) => e.deck == deck,
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::{AbilityDef, WindowKind};

    fn action(id: u16, name: &'static str) -> CardDefinition {
        CardDefinition {
            id: CardId::from_raw(id),
            name,
            kind: CardKind::Action(AbilityDef::new(WindowKind::StartOfTurn, Vec::new())),
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut reg = CardRegistry::new();
        reg.register(action(1, "Flank Speed"));
        assert_eq!(reg.name_of(CardId::from_raw(1)), "Flank Speed");
        assert_eq!(reg.action_card_ids(), vec![CardId::from_raw(1)]);
    }

    #[test]
    #[should_panic(expected = "duplicate card id")]
    fn test_duplicate_id_panics() {
        let mut reg = CardRegistry::new();
        reg.register(action(1, "A"));
        reg.register(action(1, "B"));
    }
}
