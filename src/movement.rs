//! Movement legality and execution for the tactical action.
//!
//! The active player declares one order per moving ship: a path ending at
//! the active system plus the cargo it carries. Validation checks the whole
//! declaration; execution then moves every surviving ship simultaneously.
//!
//! Anomaly rules (LRR 9): asteroid fields and supernovae block transit and
//! entry absolutely; a nebula may only be entered as the active system, and
//! a ship starting in one moves at value 1 this step; each gravity-rift
//! system entered grants +1 move, and every rift system exited rolls one die
//! per ship — 1 to 3 destroys the ship and its cargo.

use std::collections::BTreeSet;

use crate::event::{Event, EventKind};
use crate::ids::{PlayerId, SystemId, UnitId};
use crate::intent::{MovementOrder, Rejection};
use crate::registry::CardRegistry;
use crate::state::GameState;
use crate::types::Anomaly;
use crate::unit::UnitLocation;

/// Validate a whole movement declaration.
pub fn validate_movement(
    state: &GameState,
    registry: &CardRegistry,
    player: PlayerId,
    active_system: SystemId,
    orders: &[MovementOrder],
) -> Result<(), Rejection> {
    let mut claimed_cargo: BTreeSet<UnitId> = BTreeSet::new();
    let mut moved: BTreeSet<UnitId> = BTreeSet::new();
    for order in orders {
        let ship = state.unit(order.unit)?;
        if ship.owner != player {
            return Err(Rejection::invalid(
                "not_your_unit",
                format!("{} is not yours", order.unit),
            ));
        }
        if !ship.unit_type.is_ship() {
            return Err(Rejection::rules(
                "not_a_ship",
                format!("{} cannot move on its own", ship.unit_type),
            ));
        }
        if !moved.insert(order.unit) {
            return Err(Rejection::invalid(
                "duplicate_order",
                format!("{} was ordered to move twice", order.unit),
            ));
        }
        let UnitLocation::Space(origin) = ship.location else {
            return Err(Rejection::rules(
                "not_in_space",
                format!("{} is not in a space area", order.unit),
            ));
        };
        if origin == active_system {
            return Err(Rejection::rules(
                "already_there",
                "ships in the active system do not move",
            ));
        }
        if state
            .command_tokens_on_board
            .get(&origin)
            .is_some_and(|s| s.contains(&player))
        {
            return Err(Rejection::rules(
                "origin_activated",
                format!("{origin} already carries your command token"),
            ));
        }
        validate_path(state, registry, player, order, origin, active_system)?;
        validate_cargo(
            state,
            registry,
            player,
            order,
            origin,
            active_system,
            &mut claimed_cargo,
        )?;
    }
    Ok(())
}

fn validate_path(
    state: &GameState,
    registry: &CardRegistry,
    player: PlayerId,
    order: &MovementOrder,
    origin: SystemId,
    active_system: SystemId,
) -> Result<(), Rejection> {
    if order.path.last() != Some(&active_system) {
        return Err(Rejection::invalid(
            "bad_path",
            "the path must end at the active system",
        ));
    }
    let stats = state.effective_stats(registry, order.unit);
    let starts_in_nebula = state
        .galaxy
        .system(origin)
        .is_some_and(|t| t.has_anomaly(Anomaly::Nebula));
    let mut move_value: u16 = if starts_in_nebula {
        1
    } else {
        u16::from(stats.move_value)
    };
    if move_value == 0 {
        return Err(Rejection::rules(
            "cannot_move",
            format!("{} has no move value", order.unit),
        ));
    }
    let has_sustain = stats.sustain_damage;

    let mut rift_systems: BTreeSet<SystemId> = BTreeSet::new();
    let mut prev = origin;
    for (i, &step) in order.path.iter().enumerate() {
        if !state.galaxy.are_adjacent(prev, step) {
            return Err(Rejection::invalid(
                "not_adjacent",
                format!("{prev} and {step} are not adjacent"),
            ));
        }
        let tile = state
            .galaxy
            .system(step)
            .ok_or_else(|| Rejection::invalid("unknown_system", format!("no such system {step}")))?;
        if tile.has_anomaly(Anomaly::AsteroidField) {
            return Err(Rejection::rules(
                "asteroid_field",
                format!("{step} is an asteroid field; transit is not allowed"),
            ));
        }
        if tile.has_anomaly(Anomaly::Supernova) {
            return Err(Rejection::rules(
                "supernova",
                format!("{step} is a supernova; transit is not allowed"),
            ));
        }
        let is_final = i + 1 == order.path.len();
        if tile.has_anomaly(Anomaly::Nebula) && !is_final {
            return Err(Rejection::rules(
                "nebula_transit",
                "a nebula may only be entered as the active system",
            ));
        }
        if !is_final {
            // Passing through a space area another player's ships hold
            // requires sustain damage (LRR 58.4 reading).
            let blocked = state
                .players_with_ships_in(step)
                .into_iter()
                .any(|p| p != player);
            if blocked && !has_sustain {
                return Err(Rejection::rules(
                    "blocked_by_ships",
                    format!("{step} holds another player's ships"),
                ));
            }
        }
        if tile.has_anomaly(Anomaly::GravityRift) && rift_systems.insert(step) {
            move_value += 1;
        }
        prev = step;
    }
    if order.path.len() as u16 > move_value {
        return Err(Rejection::rules(
            "out_of_range",
            format!(
                "{} moves {} but the path is {} systems long",
                order.unit,
                move_value,
                order.path.len()
            ),
        ));
    }
    Ok(())
}

fn validate_cargo(
    state: &GameState,
    registry: &CardRegistry,
    player: PlayerId,
    order: &MovementOrder,
    origin: SystemId,
    active_system: SystemId,
    claimed: &mut BTreeSet<UnitId>,
) -> Result<(), Rejection> {
    let capacity = state.effective_stats(registry, order.unit).capacity;
    if order.cargo.len() > usize::from(capacity) {
        return Err(Rejection::rules(
            "over_capacity",
            format!("{} carries at most {capacity}", order.unit),
        ));
    }
    // Pick-up points: the origin, any traversed space area, the active
    // system. Traversal suffices (the ship need not stop).
    let mut pickup_points: BTreeSet<SystemId> = BTreeSet::new();
    pickup_points.insert(origin);
    pickup_points.insert(active_system);
    pickup_points.extend(order.path.iter().copied());
    for &cargo_id in &order.cargo {
        let cargo = state.unit(cargo_id)?;
        if cargo.owner != player {
            return Err(Rejection::invalid(
                "not_your_unit",
                format!("{cargo_id} is not yours"),
            ));
        }
        if !cargo.unit_type.consumes_capacity() {
            return Err(Rejection::rules(
                "not_transportable",
                format!("{} cannot be transported", cargo.unit_type),
            ));
        }
        let UnitLocation::Space(at) = cargo.location else {
            return Err(Rejection::rules(
                "cargo_not_in_space",
                format!("{cargo_id} is not in a space area"),
            ));
        };
        if !pickup_points.contains(&at) {
            return Err(Rejection::rules(
                "cargo_off_path",
                format!("{cargo_id} is not along the ship's path"),
            ));
        }
        if !claimed.insert(cargo_id) {
            return Err(Rejection::invalid(
                "cargo_claimed_twice",
                format!("{cargo_id} was assigned to two transports"),
            ));
        }
    }
    Ok(())
}

/// Execute a validated declaration. Gravity-rift exit rolls happen per ship
/// per rift system left behind; casualties never arrive. All survivors
/// arrive in the active system simultaneously. Returns whether any ship
/// entered the wormhole nexus.
pub fn execute_movement(
    state: &mut GameState,
    player: PlayerId,
    active_system: SystemId,
    orders: &[MovementOrder],
    events: &mut Vec<Event>,
) -> bool {
    let mut entered_nexus = false;
    for order in orders {
        let Some(origin) = state.units.get(&order.unit).and_then(|u| match u.location {
            UnitLocation::Space(s) => Some(s),
            _ => None,
        }) else {
            continue;
        };
        // Rift systems the ship exits: every rift along the path except a
        // rift it ends in, plus a rift origin.
        let mut exited_rifts: BTreeSet<SystemId> = BTreeSet::new();
        let rift_at = |state: &GameState, s: SystemId| {
            state
                .galaxy
                .system(s)
                .is_some_and(|t| t.has_anomaly(Anomaly::GravityRift))
        };
        if rift_at(state, origin) {
            exited_rifts.insert(origin);
        }
        for &step in &order.path {
            if step != active_system && rift_at(state, step) {
                exited_rifts.insert(step);
            }
        }
        let mut destroyed = false;
        for _ in exited_rifts {
            let face = state.rng.d10();
            events.push(Event::public(EventKind::DiceRolled {
                player,
                context: "gravity rift".to_string(),
                faces: vec![face],
            }));
            if (1..=3).contains(&face) {
                destroyed = true;
                break;
            }
        }
        if destroyed {
            let cargo = order.cargo.clone();
            state.destroy_unit(order.unit, None, events);
            for c in cargo {
                state.destroy_unit(c, None, events);
            }
            continue;
        }
        if let Some(u) = state.units.get_mut(&order.unit) {
            u.location = UnitLocation::Space(active_system);
        }
        events.push(Event::public(EventKind::UnitMoved {
            unit: order.unit,
            from: origin,
            to: active_system,
        }));
        for &c in &order.cargo {
            if let Some(u) = state.units.get_mut(&c) {
                u.location = UnitLocation::Space(active_system);
            }
        }
        if state
            .galaxy
            .system(active_system)
            .is_some_and(|t| t.is_wormhole_nexus)
        {
            entered_nexus = true;
        }
    }
    entered_nexus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::galaxy::{HexCoord, SystemTile};
    use crate::types::{Faction, PlayerColor, TileBack, UnitType};

    fn row_fixture() -> (GameState, CardRegistry, PlayerId) {
        // Three systems in a row: 1 - 2 - 3.
        let mut state = GameState::bare(21, 10);
        let registry = CardRegistry::new();
        let p = PlayerId::from_index(0);
        state.players.insert(
            p,
            crate::player::Player::new(
                p,
                Faction::GhostsOfCreuss,
                PlayerColor::Purple,
                SystemId::from_raw(1),
            ),
        );
        for (id, q) in [(1u16, 0i16), (2, 1), (3, 2)] {
            state.galaxy.place(
                SystemTile::new(SystemId::from_raw(id), TileBack::Blue),
                HexCoord::new(q, 0),
            );
        }
        (state, registry, p)
    }

    fn order(unit: UnitId, path: &[u16]) -> MovementOrder {
        MovementOrder {
            unit,
            path: path.iter().map(|&s| SystemId::from_raw(s)).collect(),
            cargo: Vec::new(),
        }
    }

    #[test]
    fn test_asteroid_field_blocks_transit() {
        let (mut state, registry, p) = row_fixture();
        state
            .galaxy
            .system_mut(SystemId::from_raw(2))
            .unwrap()
            .anomalies
            .insert(Anomaly::AsteroidField);
        let cruiser = state
            .spawn_unit(p, UnitType::Cruiser, UnitLocation::Space(SystemId::from_raw(1)))
            .unwrap();
        let err = validate_movement(
            &state,
            &registry,
            p,
            SystemId::from_raw(3),
            &[order(cruiser, &[2, 3])],
        )
        .unwrap_err();
        assert_eq!(err.code(), "asteroid_field");
    }

    #[test]
    fn test_nebula_only_enterable_as_active_system() {
        let (mut state, registry, p) = row_fixture();
        state
            .galaxy
            .system_mut(SystemId::from_raw(2))
            .unwrap()
            .anomalies
            .insert(Anomaly::Nebula);
        let cruiser = state
            .spawn_unit(p, UnitType::Cruiser, UnitLocation::Space(SystemId::from_raw(1)))
            .unwrap();
        let err = validate_movement(
            &state,
            &registry,
            p,
            SystemId::from_raw(3),
            &[order(cruiser, &[2, 3])],
        )
        .unwrap_err();
        assert_eq!(err.code(), "nebula_transit");
        // Entering the nebula itself is fine.
        validate_movement(
            &state,
            &registry,
            p,
            SystemId::from_raw(2),
            &[order(cruiser, &[2])],
        )
        .unwrap();
    }

    #[test]
    fn test_nebula_start_caps_move_at_one() {
        let (mut state, registry, p) = row_fixture();
        state
            .galaxy
            .system_mut(SystemId::from_raw(1))
            .unwrap()
            .anomalies
            .insert(Anomaly::Nebula);
        let cruiser = state
            .spawn_unit(p, UnitType::Cruiser, UnitLocation::Space(SystemId::from_raw(1)))
            .unwrap();
        let err = validate_movement(
            &state,
            &registry,
            p,
            SystemId::from_raw(3),
            &[order(cruiser, &[2, 3])],
        )
        .unwrap_err();
        assert_eq!(err.code(), "out_of_range");
    }

    #[test]
    fn test_gravity_rift_extends_range() {
        let (mut state, registry, p) = row_fixture();
        // Add a fourth system; carrier (move 1) can cross a rift at 2 to
        // reach 3 because entering the rift grants +1.
        state
            .galaxy
            .system_mut(SystemId::from_raw(2))
            .unwrap()
            .anomalies
            .insert(Anomaly::GravityRift);
        let carrier = state
            .spawn_unit(p, UnitType::Carrier, UnitLocation::Space(SystemId::from_raw(1)))
            .unwrap();
        validate_movement(
            &state,
            &registry,
            p,
            SystemId::from_raw(3),
            &[order(carrier, &[2, 3])],
        )
        .unwrap();
    }

    #[test]
    fn test_rift_exit_roll_of_two_destroys_ship() {
        let (mut state, registry, p) = row_fixture();
        state
            .galaxy
            .system_mut(SystemId::from_raw(2))
            .unwrap()
            .anomalies
            .insert(Anomaly::GravityRift);
        let cruiser = state
            .spawn_unit(p, UnitType::Cruiser, UnitLocation::Space(SystemId::from_raw(1)))
            .unwrap();
        let orders = [order(cruiser, &[2, 3])];
        validate_movement(&state, &registry, p, SystemId::from_raw(3), &orders).unwrap();
        // Find a seed whose first d10 is in 1..=3 so the exit roll kills.
        let mut seed = 0u64;
        loop {
            let mut probe = crate::rng::DiceStream::from_seed(seed);
            if (1..=3).contains(&probe.d10()) {
                break;
            }
            seed += 1;
        }
        state.rng = crate::rng::DiceStream::from_seed(seed);
        let mut events = Vec::new();
        execute_movement(&mut state, p, SystemId::from_raw(3), &orders, &mut events);
        assert!(!state.units.contains_key(&cruiser));
        assert!(state.units_in_space(SystemId::from_raw(3)).next().is_none());
    }

    #[test]
    fn test_origin_with_own_token_cannot_move() {
        let (mut state, registry, p) = row_fixture();
        let cruiser = state
            .spawn_unit(p, UnitType::Cruiser, UnitLocation::Space(SystemId::from_raw(1)))
            .unwrap();
        state
            .command_tokens_on_board
            .entry(SystemId::from_raw(1))
            .or_default()
            .insert(p);
        let err = validate_movement(
            &state,
            &registry,
            p,
            SystemId::from_raw(2),
            &[order(cruiser, &[2])],
        )
        .unwrap_err();
        assert_eq!(err.code(), "origin_activated");
    }

    #[test]
    fn test_transport_pickup_along_path() {
        let (mut state, registry, p) = row_fixture();
        let carrier = state
            .spawn_unit(p, UnitType::Carrier, UnitLocation::Space(SystemId::from_raw(1)))
            .unwrap();
        // Fighter waiting in the traversed system 2.
        let fighter = state
            .spawn_unit(p, UnitType::Fighter, UnitLocation::Space(SystemId::from_raw(2)))
            .unwrap();
        // Carrier I has move 1; upgrade to reach system 3 through 2.
        state
            .players
            .get_mut(&p)
            .unwrap()
            .unit_tiers
            .insert(UnitType::Carrier, crate::unit::UnitTier::II);
        let mut o = order(carrier, &[2, 3]);
        o.cargo.push(fighter);
        validate_movement(&state, &registry, p, SystemId::from_raw(3), &[o.clone()]).unwrap();
        let mut events = Vec::new();
        execute_movement(&mut state, p, SystemId::from_raw(3), &[o], &mut events);
        assert!(state.units[&fighter].in_space(SystemId::from_raw(3)));
    }
}
