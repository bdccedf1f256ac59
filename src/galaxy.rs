//! The galaxy: hex-positioned system tiles and derived adjacency.
//!
//! Adjacency is never stored; it is derived from hex neighborhood, matching
//! wormholes (including the wormhole nexus active side), and hyperlane
//! connections. A system is never adjacent to itself. Hyperlane tiles are not
//! systems: they contribute only the system-to-system links recorded in
//! `hyperlanes`.

use std::collections::{BTreeMap, BTreeSet};

use crate::ids::{PlanetId, SystemId};
use crate::types::{Anomaly, TileBack, WormholeKind};

/// `BTreeMap<HexCoord, SystemId>` as a vec of pairs: serde_json requires
/// string object keys, and `HexCoord` is not one.
#[cfg(feature = "serialization")]
mod coord_map {
    use super::{BTreeMap, HexCoord};
    use crate::ids::SystemId;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<HexCoord, SystemId>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        map.iter()
            .map(|(k, v)| (*k, *v))
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<HexCoord, SystemId>, D::Error> {
        let pairs: Vec<(HexCoord, SystemId)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

/// Axial hex coordinate (pointy-top).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct HexCoord {
    pub q: i16,
    pub r: i16,
}

impl HexCoord {
    pub fn new(q: i16, r: i16) -> Self {
        Self { q, r }
    }

    /// The six neighboring coordinates.
    pub fn neighbors(self) -> [HexCoord; 6] {
        const DIRS: [(i16, i16); 6] = [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];
        DIRS.map(|(dq, dr)| HexCoord::new(self.q + dq, self.r + dr))
    }
}

/// A system tile on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct SystemTile {
    pub id: SystemId,
    pub back: TileBack,
    /// Planets contained in this system, in printed order.
    pub planets: Vec<PlanetId>,
    /// A system may carry several anomaly kinds at once (LRR 9.5).
    pub anomalies: BTreeSet<Anomaly>,
    /// Printed wormholes. The nexus active side is derived, not stored here.
    pub wormholes: BTreeSet<WormholeKind>,
    pub frontier_token: bool,
    /// The wormhole nexus tile (Mallice).
    pub is_wormhole_nexus: bool,
}

impl SystemTile {
    pub fn new(id: SystemId, back: TileBack) -> Self {
        Self {
            id,
            back,
            planets: Vec::new(),
            anomalies: BTreeSet::new(),
            wormholes: BTreeSet::new(),
            frontier_token: false,
            is_wormhole_nexus: false,
        }
    }

    pub fn with_planets(mut self, planets: Vec<PlanetId>) -> Self {
        self.planets = planets;
        self
    }

    pub fn with_anomaly(mut self, anomaly: Anomaly) -> Self {
        self.anomalies.insert(anomaly);
        self
    }

    pub fn with_wormhole(mut self, kind: WormholeKind) -> Self {
        self.wormholes.insert(kind);
        self
    }

    pub fn with_frontier_token(mut self) -> Self {
        self.frontier_token = true;
        self
    }

    pub fn has_anomaly(&self, anomaly: Anomaly) -> bool {
        self.anomalies.contains(&anomaly)
    }
}

/// The board: tiles keyed by system id, positioned on a hex grid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Galaxy {
    tiles: BTreeMap<SystemId, SystemTile>,
    positions: BTreeMap<SystemId, HexCoord>,
    #[cfg_attr(feature = "serialization", serde(with = "coord_map"))]
    by_coord: BTreeMap<HexCoord, SystemId>,
    /// Extra adjacency pairs contributed by hyperlane tiles, normalized
    /// smaller-id-first.
    hyperlanes: BTreeSet<(SystemId, SystemId)>,
    nexus_active: bool,
}

impl Galaxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a tile at a hex position. Replaces any tile already there.
    pub fn place(&mut self, tile: SystemTile, at: HexCoord) {
        let id = tile.id;
        if let Some(old) = self.by_coord.insert(at, id) {
            self.positions.remove(&old);
            self.tiles.remove(&old);
        }
        self.positions.insert(id, at);
        self.tiles.insert(id, tile);
    }

    /// Place the wormhole nexus off-grid (it sits outside the hex map and
    /// connects only through wormholes).
    pub fn place_nexus(&mut self, mut tile: SystemTile) {
        tile.is_wormhole_nexus = true;
        tile.wormholes.insert(WormholeKind::Gamma);
        self.tiles.insert(tile.id, tile);
    }

    /// Record a hyperlane connection between two systems.
    pub fn add_hyperlane(&mut self, a: SystemId, b: SystemId) {
        if a != b {
            self.hyperlanes.insert(normalize(a, b));
        }
    }

    pub fn system(&self, id: SystemId) -> Option<&SystemTile> {
        self.tiles.get(&id)
    }

    pub fn system_mut(&mut self, id: SystemId) -> Option<&mut SystemTile> {
        self.tiles.get_mut(&id)
    }

    pub fn position(&self, id: SystemId) -> Option<HexCoord> {
        self.positions.get(&id).copied()
    }

    pub fn systems(&self) -> impl Iterator<Item = &SystemTile> {
        self.tiles.values()
    }

    pub fn system_ids(&self) -> impl Iterator<Item = SystemId> + '_ {
        self.tiles.keys().copied()
    }

    pub fn nexus_id(&self) -> Option<SystemId> {
        self.tiles
            .values()
            .find(|t| t.is_wormhole_nexus)
            .map(|t| t.id)
    }

    pub fn nexus_is_active(&self) -> bool {
        self.nexus_active
    }

    /// Flip the wormhole nexus to its active side. Never flips back.
    pub fn activate_nexus(&mut self) {
        self.nexus_active = true;
    }

    /// The wormholes a system currently projects. The nexus active side adds
    /// alpha and beta to its printed gamma.
    pub fn effective_wormholes(&self, id: SystemId) -> BTreeSet<WormholeKind> {
        let Some(tile) = self.tiles.get(&id) else {
            return BTreeSet::new();
        };
        let mut kinds = tile.wormholes.clone();
        if tile.is_wormhole_nexus && self.nexus_active {
            kinds.insert(WormholeKind::Alpha);
            kinds.insert(WormholeKind::Beta);
        }
        kinds
    }

    /// Derived adjacency: hex neighbors, wormhole matches, hyperlanes.
    /// Excludes `id` itself.
    pub fn adjacent(&self, id: SystemId) -> BTreeSet<SystemId> {
        let mut out = BTreeSet::new();
        if let Some(pos) = self.positions.get(&id) {
            for n in pos.neighbors() {
                if let Some(&other) = self.by_coord.get(&n) {
                    out.insert(other);
                }
            }
        }
        let own_kinds = self.effective_wormholes(id);
        if !own_kinds.is_empty() {
            for &other in self.tiles.keys() {
                if other == id {
                    continue;
                }
                if !own_kinds.is_disjoint(&self.effective_wormholes(other)) {
                    out.insert(other);
                }
            }
        }
        for &(a, b) in &self.hyperlanes {
            if a == id {
                out.insert(b);
            } else if b == id {
                out.insert(a);
            }
        }
        out.remove(&id);
        out
    }

    pub fn are_adjacent(&self, a: SystemId, b: SystemId) -> bool {
        a != b && self.adjacent(a).contains(&b)
    }
}

fn normalize(a: SystemId, b: SystemId) -> (SystemId, SystemId) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(id: u16) -> SystemTile {
        SystemTile::new(SystemId::from_raw(id), TileBack::Blue)
    }

    #[test]
    fn test_hex_neighbors_are_adjacent() {
        let mut g = Galaxy::new();
        g.place(tile(1), HexCoord::new(0, 0));
        g.place(tile(2), HexCoord::new(1, 0));
        g.place(tile(3), HexCoord::new(5, 5));
        assert!(g.are_adjacent(SystemId(1), SystemId(2)));
        assert!(!g.are_adjacent(SystemId(1), SystemId(3)));
    }

    #[test]
    fn test_never_self_adjacent() {
        let mut g = Galaxy::new();
        g.place(
            tile(1).with_wormhole(WormholeKind::Alpha),
            HexCoord::new(0, 0),
        );
        assert!(!g.adjacent(SystemId(1)).contains(&SystemId(1)));
    }

    #[test]
    fn test_wormhole_adjacency_is_symmetric() {
        let mut g = Galaxy::new();
        g.place(
            tile(1).with_wormhole(WormholeKind::Beta),
            HexCoord::new(0, 0),
        );
        g.place(
            tile(2).with_wormhole(WormholeKind::Beta),
            HexCoord::new(4, 4),
        );
        g.place(
            tile(3).with_wormhole(WormholeKind::Alpha),
            HexCoord::new(8, 8),
        );
        assert!(g.are_adjacent(SystemId(1), SystemId(2)));
        assert!(g.are_adjacent(SystemId(2), SystemId(1)));
        assert!(!g.are_adjacent(SystemId(1), SystemId(3)));
    }

    #[test]
    fn test_hyperlane_adjacency() {
        let mut g = Galaxy::new();
        g.place(tile(1), HexCoord::new(0, 0));
        g.place(tile(2), HexCoord::new(6, 0));
        g.add_hyperlane(SystemId(1), SystemId(2));
        assert!(g.are_adjacent(SystemId(1), SystemId(2)));
        assert!(g.are_adjacent(SystemId(2), SystemId(1)));
    }

    #[test]
    fn test_nexus_active_side_matches_alpha_and_beta() {
        let mut g = Galaxy::new();
        g.place(
            tile(1).with_wormhole(WormholeKind::Alpha),
            HexCoord::new(0, 0),
        );
        g.place_nexus(tile(50));
        assert!(!g.are_adjacent(SystemId(1), SystemId(50)));
        g.activate_nexus();
        assert!(g.are_adjacent(SystemId(1), SystemId(50)));
    }

    #[test]
    fn test_replacing_a_tile_clears_the_old_entry() {
        let mut g = Galaxy::new();
        g.place(tile(1), HexCoord::new(0, 0));
        g.place(tile(2), HexCoord::new(0, 0));
        assert!(g.system(SystemId(1)).is_none());
        assert_eq!(g.position(SystemId(2)), Some(HexCoord::new(0, 0)));
    }
}
