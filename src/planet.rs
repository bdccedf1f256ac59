//! Planets: resources, influence, ready/exhaust state, control.
//!
//! A planet card is exhausted ↔ facedown; an exhausted card cannot be spent
//! from, but passive effects on it stay active. Control is tracked here;
//! the rules for gaining and losing control (LRR 25) live in the state root,
//! which can see ground forces.

use std::collections::BTreeSet;

use crate::ids::{CardId, PlanetId, PlayerId, SystemId};
use crate::types::{PlanetTrait, TechColor};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Planet {
    pub id: PlanetId,
    pub name: String,
    pub system: SystemId,
    pub resources: u8,
    pub influence: u8,
    pub traits: BTreeSet<PlanetTrait>,
    pub tech_specialty: Option<TechColor>,
    pub legendary: bool,
    pub is_mecatol_rex: bool,
    pub exhausted: bool,
    pub controller: Option<PlayerId>,
    /// Control token marking ownership while no ground forces are present.
    pub control_token: Option<PlayerId>,
    /// Faceup attachment cards (exploration results, relics).
    pub attachments: Vec<CardId>,
    /// Value bonuses contributed by attachments.
    pub attach_resources: u8,
    pub attach_influence: u8,
    /// Set once the planet has been explored.
    pub explored: bool,
}

impl Planet {
    pub fn new(id: PlanetId, name: impl Into<String>, system: SystemId) -> Self {
        Self {
            id,
            name: name.into(),
            system,
            resources: 0,
            influence: 0,
            traits: BTreeSet::new(),
            tech_specialty: None,
            legendary: false,
            is_mecatol_rex: false,
            exhausted: false,
            controller: None,
            control_token: None,
            attachments: Vec::new(),
            attach_resources: 0,
            attach_influence: 0,
            explored: false,
        }
    }

    pub fn with_values(mut self, resources: u8, influence: u8) -> Self {
        self.resources = resources;
        self.influence = influence;
        self
    }

    pub fn with_trait(mut self, t: PlanetTrait) -> Self {
        self.traits.insert(t);
        self
    }

    pub fn with_tech_specialty(mut self, color: TechColor) -> Self {
        self.tech_specialty = Some(color);
        self
    }

    pub fn legendary(mut self) -> Self {
        self.legendary = true;
        self
    }

    pub fn mecatol_rex(mut self) -> Self {
        self.is_mecatol_rex = true;
        self
    }

    /// Printed value plus attachment bonuses.
    pub fn resource_value(&self) -> u8 {
        self.resources + self.attach_resources
    }

    pub fn influence_value(&self) -> u8 {
        self.influence + self.attach_influence
    }

    /// Spendable resources right now (zero while exhausted).
    pub fn spendable_resources(&self) -> u8 {
        if self.exhausted { 0 } else { self.resource_value() }
    }

    pub fn spendable_influence(&self) -> u8 {
        if self.exhausted { 0 } else { self.influence_value() }
    }

    /// A planet without a trait cannot be explored.
    pub fn explorable(&self) -> bool {
        !self.traits.is_empty()
    }

    pub fn exhaust(&mut self) {
        self.exhausted = true;
    }

    pub fn ready(&mut self) {
        self.exhausted = false;
    }

    pub fn attach(&mut self, card: CardId, resources: u8, influence: u8) {
        self.attachments.push(card);
        self.attach_resources += resources;
        self.attach_influence += influence;
    }

    pub fn controlled_by(&self, player: PlayerId) -> bool {
        self.controller == Some(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planet() -> Planet {
        Planet::new(PlanetId::from_raw(1), "Abyz", SystemId::from_raw(10)).with_values(3, 0)
    }

    #[test]
    fn test_exhausted_planet_spends_nothing() {
        let mut p = planet();
        assert_eq!(p.spendable_resources(), 3);
        p.exhaust();
        assert_eq!(p.spendable_resources(), 0);
        p.ready();
        assert_eq!(p.spendable_resources(), 3);
    }

    #[test]
    fn test_attachment_raises_values() {
        let mut p = planet();
        p.attach(CardId::from_raw(900), 1, 1);
        assert_eq!(p.resource_value(), 4);
        assert_eq!(p.influence_value(), 1);
    }

    #[test]
    fn test_traitless_planet_is_not_explorable() {
        let p = planet();
        assert!(!p.explorable());
        let p = planet().with_trait(PlanetTrait::Hazardous);
        assert!(p.explorable());
    }
}
