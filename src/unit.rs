//! Units and their stats.
//!
//! A `Unit` is a plastic piece somewhere: a space area, a planet, its owner's
//! reinforcements, or captured on another player's faction sheet. Stats are
//! never stored on the unit; they are derived from the base table for the
//! unit's type and tier, then adjusted by laws and transient effects at the
//! point of use (see `GameState::effective_stats`).

use crate::ids::{PlanetId, PlayerId, SystemId, UnitId};
use crate::types::UnitType;

/// Where a unit currently is. Every unit is in exactly one location; a
/// player's reinforcements are implicit (plastic limit minus pieces in
/// play), so destroyed units simply leave the unit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum UnitLocation {
    /// In a system's space area.
    Space(SystemId),
    /// On a planet.
    OnPlanet(PlanetId),
    /// Captured, on the given player's faction sheet.
    Captured(PlayerId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Unit {
    pub id: UnitId,
    pub owner: PlayerId,
    pub unit_type: UnitType,
    /// Only meaningful for sustain-damage-capable units.
    pub damaged: bool,
    pub location: UnitLocation,
}

impl Unit {
    pub fn new(id: UnitId, owner: PlayerId, unit_type: UnitType, location: UnitLocation) -> Self {
        Self {
            id,
            owner,
            unit_type,
            damaged: false,
            location,
        }
    }

    pub fn in_space(&self, system: SystemId) -> bool {
        self.location == UnitLocation::Space(system)
    }

    pub fn on_planet(&self, planet: PlanetId) -> bool {
        self.location == UnitLocation::OnPlanet(planet)
    }

    pub fn on_board(&self) -> bool {
        matches!(
            self.location,
            UnitLocation::Space(_) | UnitLocation::OnPlanet(_)
        )
    }
}

/// Unit upgrade tier. Tier II is reached through unit-upgrade technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum UnitTier {
    #[default]
    I,
    II,
}

/// A dice profile: roll `dice` dice, each hitting on `value` or better.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct RollProfile {
    pub value: u8,
    pub dice: u8,
}

impl RollProfile {
    pub const fn new(value: u8, dice: u8) -> Self {
        Self { value, dice }
    }
}

/// Production cost. Fighters and infantry have a dual icon: one payment of
/// `resources` produces `per_cost` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitCost {
    pub resources: u8,
    pub per_cost: u8,
}

impl UnitCost {
    pub const fn single(resources: u8) -> Self {
        Self {
            resources,
            per_cost: 1,
        }
    }

    pub const fn dual(resources: u8) -> Self {
        Self {
            resources,
            per_cost: 2,
        }
    }
}

/// Production ability value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Production {
    Fixed(u8),
    /// Space docks: the host planet's resource value plus a bonus.
    PlanetValuePlus(u8),
}

/// Effective stats of a unit at a point in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitStats {
    pub cost: Option<UnitCost>,
    pub combat: Option<RollProfile>,
    pub move_value: u8,
    pub capacity: u8,
    pub production: Option<Production>,
    pub bombardment: Option<RollProfile>,
    pub anti_fighter_barrage: Option<RollProfile>,
    pub space_cannon: Option<RollProfile>,
    /// 0 = own system only; 1 = reaches adjacent systems (PDS II).
    pub space_cannon_range: u8,
    pub sustain_damage: bool,
    pub planetary_shield: bool,
    /// War suns switch off opposing planetary shields for bombardment.
    pub disables_planetary_shield: bool,
}

/// Printed stats for a unit type at a tier.
pub fn base_stats(unit_type: UnitType, tier: UnitTier) -> UnitStats {
    use UnitTier::{I, II};
    use UnitType::*;
    let mut s = UnitStats::default();
    match (unit_type, tier) {
        (Carrier, I) => {
            s.cost = Some(UnitCost::single(3));
            s.combat = Some(RollProfile::new(9, 1));
            s.move_value = 1;
            s.capacity = 4;
        }
        (Carrier, II) => {
            s.cost = Some(UnitCost::single(3));
            s.combat = Some(RollProfile::new(9, 1));
            s.move_value = 2;
            s.capacity = 6;
        }
        (Cruiser, I) => {
            s.cost = Some(UnitCost::single(2));
            s.combat = Some(RollProfile::new(7, 1));
            s.move_value = 2;
        }
        (Cruiser, II) => {
            s.cost = Some(UnitCost::single(2));
            s.combat = Some(RollProfile::new(6, 1));
            s.move_value = 3;
            s.capacity = 1;
        }
        (Destroyer, I) => {
            s.cost = Some(UnitCost::single(1));
            s.combat = Some(RollProfile::new(9, 1));
            s.move_value = 2;
            s.anti_fighter_barrage = Some(RollProfile::new(9, 2));
        }
        (Destroyer, II) => {
            s.cost = Some(UnitCost::single(1));
            s.combat = Some(RollProfile::new(8, 1));
            s.move_value = 2;
            s.anti_fighter_barrage = Some(RollProfile::new(6, 3));
        }
        (Dreadnought, I) => {
            s.cost = Some(UnitCost::single(4));
            s.combat = Some(RollProfile::new(5, 1));
            s.move_value = 1;
            s.capacity = 1;
            s.sustain_damage = true;
            s.bombardment = Some(RollProfile::new(5, 1));
        }
        (Dreadnought, II) => {
            s.cost = Some(UnitCost::single(4));
            s.combat = Some(RollProfile::new(5, 1));
            s.move_value = 2;
            s.capacity = 1;
            s.sustain_damage = true;
            s.bombardment = Some(RollProfile::new(5, 1));
        }
        (WarSun, _) => {
            s.cost = Some(UnitCost::single(12));
            s.combat = Some(RollProfile::new(3, 3));
            s.move_value = 2;
            s.capacity = 6;
            s.sustain_damage = true;
            s.bombardment = Some(RollProfile::new(3, 3));
            s.disables_planetary_shield = true;
        }
        (Flagship, _) => {
            // A representative profile; per-faction flagship text is out of
            // the modeled data surface.
            s.cost = Some(UnitCost::single(8));
            s.combat = Some(RollProfile::new(5, 2));
            s.move_value = 1;
            s.capacity = 3;
            s.sustain_damage = true;
        }
        (Fighter, I) => {
            s.cost = Some(UnitCost::dual(1));
            s.combat = Some(RollProfile::new(9, 1));
        }
        (Fighter, II) => {
            s.cost = Some(UnitCost::dual(1));
            s.combat = Some(RollProfile::new(8, 1));
            s.move_value = 2;
        }
        (Infantry, I) => {
            s.cost = Some(UnitCost::dual(1));
            s.combat = Some(RollProfile::new(8, 1));
        }
        (Infantry, II) => {
            s.cost = Some(UnitCost::dual(1));
            s.combat = Some(RollProfile::new(7, 1));
        }
        (Mech, _) => {
            s.cost = Some(UnitCost::single(2));
            s.combat = Some(RollProfile::new(6, 1));
            s.sustain_damage = true;
        }
        (Pds, I) => {
            s.space_cannon = Some(RollProfile::new(6, 1));
            s.planetary_shield = true;
        }
        (Pds, II) => {
            s.space_cannon = Some(RollProfile::new(5, 1));
            s.space_cannon_range = 1;
            s.planetary_shield = true;
        }
        (SpaceDock, I) => {
            s.production = Some(Production::PlanetValuePlus(2));
        }
        (SpaceDock, II) => {
            s.production = Some(Production::PlanetValuePlus(4));
        }
    }
    s
}

/// Plastic piece limits per faction (LRR 96.2), enforced as hard invariants.
pub fn plastic_limit(unit_type: UnitType) -> u8 {
    match unit_type {
        UnitType::Fighter => 10,
        UnitType::Infantry => 12,
        UnitType::Carrier => 4,
        UnitType::Cruiser => 8,
        UnitType::Destroyer => 8,
        UnitType::Dreadnought => 5,
        UnitType::WarSun => 2,
        UnitType::Flagship => 1,
        UnitType::Mech => 4,
        UnitType::Pds => 6,
        UnitType::SpaceDock => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_changes_printed_stats() {
        let c1 = base_stats(UnitType::Cruiser, UnitTier::I);
        let c2 = base_stats(UnitType::Cruiser, UnitTier::II);
        assert_eq!(c1.combat, Some(RollProfile::new(7, 1)));
        assert_eq!(c2.combat, Some(RollProfile::new(6, 1)));
        assert_eq!(c2.move_value, 3);
        assert_eq!(c2.capacity, 1);
    }

    #[test]
    fn test_structures_have_no_cost() {
        assert!(base_stats(UnitType::Pds, UnitTier::I).cost.is_none());
        assert!(base_stats(UnitType::SpaceDock, UnitTier::I).cost.is_none());
    }

    #[test]
    fn test_fighter_cost_is_dual_icon() {
        let f = base_stats(UnitType::Fighter, UnitTier::I);
        assert_eq!(f.cost, Some(UnitCost::dual(1)));
    }

    #[test]
    fn test_war_sun_ignores_planetary_shield() {
        let w = base_stats(UnitType::WarSun, UnitTier::I);
        assert!(w.disables_planetary_shield);
        assert!(w.bombardment.is_some());
    }

    #[test]
    fn test_pds_ii_reaches_adjacent_systems() {
        assert_eq!(base_stats(UnitType::Pds, UnitTier::I).space_cannon_range, 0);
        assert_eq!(base_stats(UnitType::Pds, UnitTier::II).space_cannon_range, 1);
    }
}
