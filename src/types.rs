//! Closed vocabularies shared across the engine: unit types, planet traits,
//! anomalies, wormholes, technology colors, factions.

use std::fmt;

/// The eleven unit types of base + Prophecy of Kings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum UnitType {
    Fighter,
    Infantry,
    Carrier,
    Cruiser,
    Destroyer,
    Dreadnought,
    WarSun,
    Flagship,
    Mech,
    Pds,
    SpaceDock,
}

impl UnitType {
    /// Ships occupy a system's space area.
    pub fn is_ship(self) -> bool {
        matches!(
            self,
            UnitType::Fighter
                | UnitType::Carrier
                | UnitType::Cruiser
                | UnitType::Destroyer
                | UnitType::Dreadnought
                | UnitType::WarSun
                | UnitType::Flagship
        )
    }

    /// Non-fighter ships count against the fleet pool (LRR 37.2).
    pub fn counts_against_fleet_pool(self) -> bool {
        self.is_ship() && self != UnitType::Fighter
    }

    /// Ground forces occupy planets and can be transported.
    pub fn is_ground_force(self) -> bool {
        matches!(self, UnitType::Infantry | UnitType::Mech)
    }

    /// Structures are placed on planets and are never transported.
    pub fn is_structure(self) -> bool {
        matches!(self, UnitType::Pds | UnitType::SpaceDock)
    }

    /// Fighters and ground forces consume ship capacity in a space area.
    pub fn consumes_capacity(self) -> bool {
        self == UnitType::Fighter || self.is_ground_force()
    }

    pub fn name(self) -> &'static str {
        match self {
            UnitType::Fighter => "fighter",
            UnitType::Infantry => "infantry",
            UnitType::Carrier => "carrier",
            UnitType::Cruiser => "cruiser",
            UnitType::Destroyer => "destroyer",
            UnitType::Dreadnought => "dreadnought",
            UnitType::WarSun => "war sun",
            UnitType::Flagship => "flagship",
            UnitType::Mech => "mech",
            UnitType::Pds => "PDS",
            UnitType::SpaceDock => "space dock",
        }
    }

    pub const ALL: [UnitType; 11] = [
        UnitType::Fighter,
        UnitType::Infantry,
        UnitType::Carrier,
        UnitType::Cruiser,
        UnitType::Destroyer,
        UnitType::Dreadnought,
        UnitType::WarSun,
        UnitType::Flagship,
        UnitType::Mech,
        UnitType::Pds,
        UnitType::SpaceDock,
    ];
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Planet traits; a planet with no trait cannot be explored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PlanetTrait {
    Cultural,
    Hazardous,
    Industrial,
}

/// Technology colors (prerequisite pips).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum TechColor {
    /// Green.
    Biotic,
    /// Blue.
    Propulsion,
    /// Yellow.
    Cybernetic,
    /// Red.
    Warfare,
}

/// Anomaly kinds. A system may carry more than one (LRR 9.5); stacked
/// anomalies combine by union of effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Anomaly {
    AsteroidField,
    Nebula,
    Supernova,
    GravityRift,
}

/// Wormhole kinds. Matching kinds make their systems adjacent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum WormholeKind {
    Alpha,
    Beta,
    Gamma,
    Delta,
}

/// Tile back color: green = home, blue = planet system, red = anomaly/empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum TileBack {
    Green,
    Blue,
    Red,
}

/// Player plastic colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PlayerColor {
    Black,
    Blue,
    Green,
    Orange,
    Pink,
    Purple,
    Red,
    Yellow,
}

/// Content sets the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Expansion {
    Base,
    ProphecyOfKings,
}

/// The playable factions of base + Prophecy of Kings.
///
/// The engine consumes factions as data (commodity value, starting fleet,
/// flagship stats); faction-specific rule text beyond that data surface is
/// not modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Faction {
    Arborec,
    BaronyOfLetnev,
    ClanOfSaar,
    EmbersOfMuaat,
    EmiratesOfHacan,
    FederationOfSol,
    GhostsOfCreuss,
    L1z1xMindnet,
    MentakCoalition,
    NaaluCollective,
    NekroVirus,
    SardakkNorr,
    UniversitiesOfJolNar,
    Winnu,
    XxchaKingdom,
    YinBrotherhood,
    YssarilTribes,
    // Prophecy of Kings
    ArgentFlight,
    Empyrean,
    MahactGeneSorcerers,
    NaazRokhaAlliance,
    Nomad,
    TitansOfUl,
    VuilraithCabal,
}

impl Faction {
    /// Commodity value printed on the faction sheet.
    pub fn commodity_value(self) -> u8 {
        match self {
            Faction::EmiratesOfHacan => 6,
            Faction::MentakCoalition
            | Faction::ClanOfSaar
            | Faction::NaaluCollective
            | Faction::Empyrean => 4,
            Faction::Arborec
            | Faction::EmbersOfMuaat
            | Faction::SardakkNorr
            | Faction::NekroVirus
            | Faction::VuilraithCabal
            | Faction::MahactGeneSorcerers => 2,
            _ => 3,
        }
    }

    /// Whether this faction ships with the Prophecy of Kings expansion.
    pub fn expansion(self) -> Expansion {
        match self {
            Faction::ArgentFlight
            | Faction::Empyrean
            | Faction::MahactGeneSorcerers
            | Faction::NaazRokhaAlliance
            | Faction::Nomad
            | Faction::TitansOfUl
            | Faction::VuilraithCabal => Expansion::ProphecyOfKings,
            _ => Expansion::Base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fleet_pool_counts_non_fighter_ships_only() {
        assert!(UnitType::Cruiser.counts_against_fleet_pool());
        assert!(UnitType::Flagship.counts_against_fleet_pool());
        assert!(!UnitType::Fighter.counts_against_fleet_pool());
        assert!(!UnitType::Infantry.counts_against_fleet_pool());
        assert!(!UnitType::Pds.counts_against_fleet_pool());
    }

    #[test]
    fn test_capacity_consumers() {
        assert!(UnitType::Fighter.consumes_capacity());
        assert!(UnitType::Infantry.consumes_capacity());
        assert!(UnitType::Mech.consumes_capacity());
        assert!(!UnitType::Destroyer.consumes_capacity());
    }

    #[test]
    fn test_structures_are_not_ships() {
        assert!(UnitType::SpaceDock.is_structure());
        assert!(!UnitType::SpaceDock.is_ship());
        assert!(UnitType::Pds.is_structure());
    }

    #[test]
    fn test_hacan_commodity_value() {
        assert_eq!(Faction::EmiratesOfHacan.commodity_value(), 6);
        assert_eq!(Faction::FederationOfSol.commodity_value(), 3);
    }
}
