//! End-to-end scenario tests: whole intent sequences driven through the
//! engine, with assertions on the observable event logs.

mod properties;
mod scenarios;

use crate::engine::Game;
use crate::galaxy::{HexCoord, SystemTile};
use crate::ids::{PlanetId, PlayerId, SystemId};
use crate::planet::Planet;
use crate::player::Player;
use crate::state::{ActionPhaseState, GamePhase, GameState};
use crate::types::{Faction, PlayerColor, TileBack};

/// A hand-built two-player action-phase state on a three-system row
/// (1 - 2 - 3), with the first player active and on the clock.
pub fn skirmish(seed: u64) -> (GameState, PlayerId, PlayerId) {
    let mut state = GameState::bare(seed, 10);
    let (a, b) = (PlayerId::from_index(0), PlayerId::from_index(1));
    let factions = [Faction::FederationOfSol, Faction::BaronyOfLetnev];
    let colors = [PlayerColor::Blue, PlayerColor::Red];
    for (i, &id) in [a, b].iter().enumerate() {
        state.players.insert(
            id,
            Player::new(id, factions[i], colors[i], SystemId::from_raw(90 + i as u16)),
        );
    }
    for (id, q) in [(1u16, 0i16), (2, 1), (3, 2)] {
        state.galaxy.place(
            SystemTile::new(SystemId::from_raw(id), TileBack::Blue),
            HexCoord::new(q, 0),
        );
    }
    state.phase = GamePhase::Action(ActionPhaseState::default());
    state.turn_order = vec![a, b];
    state.turn_cursor = 0;
    state.active_player = Some(a);
    state.pending = Some(crate::intent::PendingDecision {
        player: a,
        kind: crate::intent::DecisionKind::TakeTurn,
    });
    (state, a, b)
}

/// Add a controlled planet to a system.
pub fn add_planet(
    state: &mut GameState,
    id: u16,
    system: u16,
    owner: Option<PlayerId>,
    resources: u8,
    influence: u8,
) -> PlanetId {
    let planet_id = PlanetId::from_raw(id);
    let mut planet = Planet::new(planet_id, format!("planet-{id}"), SystemId::from_raw(system))
        .with_values(resources, influence);
    planet.controller = owner;
    if owner.is_some() {
        planet.control_token = owner;
    }
    state.planets.insert(planet_id, planet);
    if let Some(tile) = state.galaxy.system_mut(SystemId::from_raw(system)) {
        tile.planets.push(planet_id);
    }
    planet_id
}

/// Find a seed whose first `faces.len()` d10 draws match `faces` exactly,
/// ignoring entries of 0 (wildcards).
pub fn seed_with_faces(faces: &[u8]) -> u64 {
    'seed: for seed in 0..5_000_000u64 {
        let mut probe = crate::rng::DiceStream::from_seed(seed);
        for &want in faces {
            let got = probe.d10();
            if want != 0 && got != want {
                continue 'seed;
            }
        }
        return seed;
    }
    panic!("no seed found for faces {faces:?}");
}

pub fn game_of(state: GameState) -> Game {
    Game::from_snapshot(state)
}
