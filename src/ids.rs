//! Stable identifiers for game entities.
//!
//! Everything in the game state references other entities by id, never by
//! pointer; lookups go through the state root. Unit ids are allocated from a
//! counter owned by `GameState` so that replaying an intent log yields
//! identical ids.

use std::fmt;

/// Player identifier, seat-index based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PlayerId(pub u8);

/// System tile identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct SystemId(pub u16);

/// Planet identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PlanetId(pub u16);

/// Unit instance identifier, monotonically increasing and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitId(pub u32);

/// Card definition identifier, references static registry data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct CardId(pub u16);

/// Identifier for an ability instance offered in an open timing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct AbilityId(pub u32);

impl PlayerId {
    pub fn from_index(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl SystemId {
    pub fn from_raw(id: u16) -> Self {
        Self(id)
    }
}

impl PlanetId {
    pub fn from_raw(id: u16) -> Self {
        Self(id)
    }
}

impl UnitId {
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }
}

impl CardId {
    pub fn from_raw(id: u16) -> Self {
        Self(id)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sys{}", self.0)
    }
}

impl fmt::Display for PlanetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "planet{}", self.0)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit{}", self.0)
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "card{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_index() {
        let p = PlayerId::from_index(3);
        assert_eq!(p.index(), 3);
    }

    #[test]
    fn test_ids_order_by_raw_value() {
        assert!(UnitId::from_raw(1) < UnitId::from_raw(2));
        assert!(SystemId::from_raw(10) < SystemId::from_raw(11));
    }
}
