//! Combat primitives shared by space combat, ground combat, bombardment,
//! space cannon, and anti-fighter barrage.
//!
//! Combat modifiers (nebula defender bonus, laws, transient effects) apply
//! only to combat rolls; AFB, space cannon, and bombardment roll unmodified.
//! Rerolls live in their own micro-window after a roll: one use per ability,
//! distinct abilities may each reroll the same die, and the window closes
//! before any "after roll" effect.

use crate::ability::{AbilitySource, WindowKind};
use crate::event::{Event, EventKind};
use crate::ids::{PlanetId, PlayerId, SystemId, UnitId};
use crate::intent::{HitAssignment, Rejection};
use crate::registry::CardRegistry;
use crate::state::{DieRoll, GameState, RerollState};
use crate::types::{Anomaly, UnitType};

/// Roll combat dice for every ship a player has in a system's space area.
/// `modifier` is folded into each die (nebula defender +1 and similar).
pub fn roll_space_combat(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    system: SystemId,
    modifier: i8,
    events: &mut Vec<Event>,
) -> Vec<DieRoll> {
    let shooters: Vec<(UnitId, u8, u8)> = state
        .units_in_space(system)
        .filter(|u| u.owner == player && u.unit_type.is_ship())
        .map(|u| u.id)
        .collect::<Vec<_>>()
        .into_iter()
        .filter_map(|id| {
            let stats = state.effective_stats(registry, id);
            stats.combat.map(|c| (id, c.value, c.dice))
        })
        .collect();
    roll_profiles(state, player, &shooters, modifier, "space combat", events)
}

/// Roll combat dice for a player's ground forces on a planet.
pub fn roll_ground_combat(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    planet: PlanetId,
    modifier: i8,
    events: &mut Vec<Event>,
) -> Vec<DieRoll> {
    let shooters: Vec<(UnitId, u8, u8)> = state
        .units_on_planet(planet)
        .filter(|u| u.owner == player && u.unit_type.is_ground_force())
        .map(|u| u.id)
        .collect::<Vec<_>>()
        .into_iter()
        .filter_map(|id| {
            let stats = state.effective_stats(registry, id);
            stats.combat.map(|c| (id, c.value, c.dice))
        })
        .collect();
    roll_profiles(state, player, &shooters, modifier, "ground combat", events)
}

fn roll_profiles(
    state: &mut GameState,
    player: PlayerId,
    shooters: &[(UnitId, u8, u8)],
    modifier: i8,
    context: &'static str,
    events: &mut Vec<Event>,
) -> Vec<DieRoll> {
    let mut rolls = Vec::new();
    for &(unit, needed, dice) in shooters {
        for _ in 0..dice {
            let face = state.rng.d10();
            rolls.push(DieRoll {
                unit,
                face,
                needed,
                modifier,
            });
        }
    }
    events.push(Event::public(EventKind::DiceRolled {
        player,
        context: context.to_string(),
        faces: rolls.iter().map(|r| r.face).collect(),
    }));
    rolls
}

pub fn count_hits(rolls: &[DieRoll]) -> u8 {
    rolls.iter().filter(|r| r.is_hit()).count() as u8
}

/// The defender in a nebula rolls at +1 in space combat (LRR 59.2).
pub fn nebula_defender_bonus(state: &GameState, system: SystemId, is_defender: bool) -> i8 {
    let in_nebula = state
        .galaxy
        .system(system)
        .is_some_and(|t| t.has_anomaly(Anomaly::Nebula));
    i8::from(in_nebula && is_defender)
}

// ============================================================================
// Anti-fighter barrage
// ============================================================================

/// Roll AFB for a player's units in the system; hits apply only to the
/// opponent's fighters and are assigned automatically (fighters are
/// interchangeable). Returns destroyed fighter count.
pub fn anti_fighter_barrage(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    opponent: PlayerId,
    system: SystemId,
    events: &mut Vec<Event>,
) -> u8 {
    let shooters: Vec<(UnitId, u8, u8)> = state
        .ships_of(player, system)
        .into_iter()
        .filter_map(|id| {
            let stats = state.effective_stats(registry, id);
            stats.anti_fighter_barrage.map(|p| (id, p.value, p.dice))
        })
        .collect();
    if shooters.is_empty() {
        return 0;
    }
    let rolls = roll_profiles(state, player, &shooters, 0, "anti-fighter barrage", events);
    let hits = count_hits(&rolls);
    if hits > 0 {
        events.push(Event::public(EventKind::HitsProduced {
            player,
            count: hits,
        }));
    }
    let fighters: Vec<UnitId> = state
        .units_in_space(system)
        .filter(|u| u.owner == opponent && u.unit_type == UnitType::Fighter)
        .map(|u| u.id)
        .collect();
    let destroyed = fighters.into_iter().take(hits as usize).collect::<Vec<_>>();
    let n = destroyed.len() as u8;
    for id in destroyed {
        events.push(Event::public(EventKind::HitAssigned { unit: id }));
        state.destroy_unit(id, Some(player), events);
    }
    n
}

// ============================================================================
// Space cannon
// ============================================================================

/// Dice for a player's space cannon units able to reach the target system:
/// units in the system itself plus, for units with range, adjacent systems.
pub fn space_cannon_offense(
    state: &mut GameState,
    registry: &CardRegistry,
    shooter: PlayerId,
    target_system: SystemId,
    events: &mut Vec<Event>,
) -> u8 {
    let adjacent = state.galaxy.adjacent(target_system);
    let mut shooters: Vec<(UnitId, u8, u8)> = Vec::new();
    let candidates: Vec<UnitId> = state
        .units
        .values()
        .filter(|u| u.owner == shooter)
        .map(|u| u.id)
        .collect();
    for id in candidates {
        let stats = state.effective_stats(registry, id);
        let Some(profile) = stats.space_cannon else {
            continue;
        };
        let Some(system) = unit_system(state, id) else {
            continue;
        };
        let in_range = system == target_system
            || (stats.space_cannon_range >= 1 && adjacent.contains(&system));
        if in_range {
            shooters.push((id, profile.value, profile.dice));
        }
    }
    if shooters.is_empty() {
        return 0;
    }
    let rolls = roll_profiles(state, shooter, &shooters, 0, "space cannon", events);
    let hits = count_hits(&rolls);
    if hits > 0 {
        events.push(Event::public(EventKind::HitsProduced {
            player: shooter,
            count: hits,
        }));
    }
    hits
}

/// Space cannon defense: the defender's cannon units on the invaded planet
/// fire at committed ground forces.
pub fn space_cannon_defense(
    state: &mut GameState,
    registry: &CardRegistry,
    shooter: PlayerId,
    planet: PlanetId,
    events: &mut Vec<Event>,
) -> u8 {
    let shooters: Vec<(UnitId, u8, u8)> = state
        .units_on_planet(planet)
        .filter(|u| u.owner == shooter)
        .map(|u| u.id)
        .collect::<Vec<_>>()
        .into_iter()
        .filter_map(|id| {
            let stats = state.effective_stats(registry, id);
            stats.space_cannon.map(|p| (id, p.value, p.dice))
        })
        .collect();
    if shooters.is_empty() {
        return 0;
    }
    let rolls = roll_profiles(state, shooter, &shooters, 0, "space cannon", events);
    let hits = count_hits(&rolls);
    if hits > 0 {
        events.push(Event::public(EventKind::HitsProduced {
            player: shooter,
            count: hits,
        }));
    }
    hits
}

fn unit_system(state: &GameState, id: UnitId) -> Option<SystemId> {
    match state.units.get(&id)?.location {
        crate::unit::UnitLocation::Space(s) => Some(s),
        crate::unit::UnitLocation::OnPlanet(p) => state.planets.get(&p).map(|pl| pl.system),
        crate::unit::UnitLocation::Captured(_) => None,
    }
}

// ============================================================================
// Bombardment
// ============================================================================

/// Whether a planet is shielded against a bombarding unit. War suns switch
/// off opposing planetary shields (LRR 15.3).
pub fn planet_is_shielded(
    state: &GameState,
    registry: &CardRegistry,
    planet: PlanetId,
    bombarder: UnitId,
) -> bool {
    let bombarder_stats = state.effective_stats(registry, bombarder);
    if bombarder_stats.disables_planetary_shield {
        return false;
    }
    let Some(attacker) = state.units.get(&bombarder).map(|u| u.owner) else {
        return false;
    };
    state
        .units_on_planet(planet)
        .filter(|u| u.owner != attacker)
        .any(|u| state.effective_stats(registry, u.id).planetary_shield)
}

/// Roll one unit's bombardment against a planet; hits destroy ground forces
/// chosen by the defender (assigned automatically here, mechs last so
/// sustain-capable pieces survive longest).
pub fn bombard(
    state: &mut GameState,
    registry: &CardRegistry,
    unit: UnitId,
    planet: PlanetId,
    events: &mut Vec<Event>,
) -> u8 {
    let Some(owner) = state.units.get(&unit).map(|u| u.owner) else {
        return 0;
    };
    let Some(profile) = state.effective_stats(registry, unit).bombardment else {
        return 0;
    };
    let shooters = [(unit, profile.value, profile.dice)];
    let rolls = roll_profiles(state, owner, &shooters, 0, "bombardment", events);
    let hits = count_hits(&rolls);
    if hits == 0 {
        return 0;
    }
    events.push(Event::public(EventKind::HitsProduced {
        player: owner,
        count: hits,
    }));
    let mut targets: Vec<UnitId> = state
        .units_on_planet(planet)
        .filter(|u| u.owner != owner && u.unit_type == UnitType::Infantry)
        .map(|u| u.id)
        .collect();
    targets.extend(
        state
            .units_on_planet(planet)
            .filter(|u| u.owner != owner && u.unit_type == UnitType::Mech)
            .map(|u| u.id),
    );
    let mut destroyed = 0;
    for id in targets.into_iter().take(hits as usize) {
        events.push(Event::public(EventKind::HitAssigned { unit: id }));
        state.destroy_unit(id, Some(owner), events);
        destroyed += 1;
    }
    destroyed
}

// ============================================================================
// Hit assignment
// ============================================================================

/// Where assigned hits must land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitScope {
    Space(SystemId),
    Ground(PlanetId),
}

/// Validate and apply a player's hit assignments: each hit destroys one of
/// their units in scope, or is cancelled by an undamaged sustain-capable
/// ship, marking it damaged.
pub fn apply_hit_assignments(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    scope: HitScope,
    assignments: &[HitAssignment],
    expected: u8,
    by: Option<PlayerId>,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let available: usize = match scope {
        HitScope::Space(system) => state
            .units_in_space(system)
            .filter(|u| u.owner == player && u.unit_type.is_ship())
            .count(),
        HitScope::Ground(planet) => state
            .units_on_planet(planet)
            .filter(|u| u.owner == player && u.unit_type.is_ground_force())
            .count(),
    };
    // Excess hits beyond what can be absorbed are lost, not banked.
    let needed = (expected as usize).min(available);
    if assignments.len() != needed {
        return Err(Rejection::invalid(
            "wrong_hit_count",
            format!("{needed} hits must be assigned, got {}", assignments.len()),
        ));
    }
    let mut seen: std::collections::BTreeSet<UnitId> = std::collections::BTreeSet::new();
    for a in assignments {
        let unit = state.unit(a.unit)?;
        if unit.owner != player {
            return Err(Rejection::invalid("not_your_unit", format!("{} is not yours", a.unit)));
        }
        let in_scope = match scope {
            HitScope::Space(system) => unit.in_space(system) && unit.unit_type.is_ship(),
            HitScope::Ground(planet) => {
                unit.on_planet(planet) && unit.unit_type.is_ground_force()
            }
        };
        if !in_scope {
            return Err(Rejection::invalid(
                "unit_out_of_scope",
                format!("{} is not in the combat", a.unit),
            ));
        }
        if a.sustain {
            let stats = state.effective_stats(registry, a.unit);
            if !stats.sustain_damage {
                return Err(Rejection::rules(
                    "cannot_sustain",
                    format!("{} cannot sustain damage", a.unit),
                ));
            }
            if unit.damaged || seen.contains(&a.unit) {
                return Err(Rejection::rules(
                    "already_damaged",
                    format!("{} is already damaged", a.unit),
                ));
            }
            seen.insert(a.unit);
        } else if seen.contains(&a.unit) {
            return Err(Rejection::invalid(
                "duplicate_assignment",
                format!("{} was already assigned a destroying hit", a.unit),
            ));
        } else {
            seen.insert(a.unit);
        }
    }
    for a in assignments {
        events.push(Event::public(EventKind::HitAssigned { unit: a.unit }));
        if a.sustain {
            if let Some(u) = state.units.get_mut(&a.unit) {
                u.damaged = true;
            }
            events.push(Event::public(EventKind::SustainedDamage { unit: a.unit }));
        } else {
            state.destroy_unit(a.unit, by, events);
        }
    }
    Ok(())
}

// ============================================================================
// Rerolls (LRR 74)
// ============================================================================

/// Reroll-granting abilities a player holds, usable in the micro-window.
pub fn reroll_sources(
    state: &GameState,
    registry: &CardRegistry,
    player: PlayerId,
) -> Vec<AbilitySource> {
    crate::window::eligible_abilities(state, registry, WindowKind::AfterDiceRoll, player)
        .into_iter()
        .filter(|a| a.def.reroll.is_some())
        .map(|a| a.source)
        .collect()
}

/// Apply one reroll: the ability must be unused this window, and the die
/// must belong to the right side for the grant.
pub fn apply_reroll(
    state: &mut GameState,
    registry: &CardRegistry,
    reroll: &mut RerollState,
    player: PlayerId,
    source: AbilitySource,
    roller: PlayerId,
    die: usize,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    if reroll.used.contains(&(player, source)) {
        return Err(Rejection::invalid(
            "reroll_used",
            "that ability already rerolled a die this window",
        ));
    }
    let grant = crate::window::lookup_def(registry, source)
        .and_then(|def| def.reroll)
        .ok_or_else(|| Rejection::invalid("not_a_reroll", "that ability grants no reroll"))?;
    if grant.own_dice && roller != player {
        return Err(Rejection::invalid(
            "wrong_side",
            "that ability rerolls your own dice",
        ));
    }
    if !grant.own_dice && roller == player {
        return Err(Rejection::invalid(
            "wrong_side",
            "that ability rerolls an opponent's dice",
        ));
    }
    let faces = reroll
        .rolls
        .get_mut(&roller)
        .ok_or_else(|| Rejection::invalid("no_such_roll", "that player has no dice out"))?;
    let slot = faces
        .get_mut(die)
        .ok_or_else(|| Rejection::invalid("no_such_die", format!("die {die} does not exist")))?;
    let old_face = slot.face;
    let new_face = state.rng.d10();
    slot.face = new_face;
    reroll.used.push((player, source));
    reroll.consecutive_passes = 0;
    events.push(Event::public(EventKind::DieRerolled {
        player,
        die,
        old_face,
        new_face,
    }));
    Ok(())
}

// ============================================================================
// Retreats and cleanup
// ============================================================================

/// Legal retreat destinations: adjacent systems with none of the opponent's
/// ships, containing the retreater's units or a planet they control
/// (LRR 78.7).
pub fn legal_retreat_targets(
    state: &GameState,
    player: PlayerId,
    opponent: PlayerId,
    from: SystemId,
) -> Vec<SystemId> {
    state
        .galaxy
        .adjacent(from)
        .into_iter()
        .filter(|&s| state.ships_of(opponent, s).is_empty())
        .filter(|&s| {
            let own_units = state.units_in_space(s).any(|u| u.owner == player)
                || state
                    .galaxy
                    .system(s)
                    .is_some_and(|tile| {
                        tile.planets.iter().any(|p| {
                            state.planets.get(p).is_some_and(|pl| {
                                pl.controlled_by(player)
                                    || state.units_on_planet(*p).any(|u| u.owner == player)
                            })
                        })
                    });
            own_units
        })
        .filter(|&s| {
            // Retreating into an asteroid field or supernova is still
            // forbidden; a nebula can only be entered as the active system.
            state.galaxy.system(s).is_some_and(|tile| {
                !tile.has_anomaly(Anomaly::AsteroidField)
                    && !tile.has_anomaly(Anomaly::Supernova)
                    && !tile.has_anomaly(Anomaly::Nebula)
            })
        })
        .collect()
}

/// After combat, fighters and ground forces beyond remaining capacity are
/// removed to reinforcements, fighters first.
pub fn enforce_capacity_after_combat(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    system: SystemId,
    events: &mut Vec<Event>,
) {
    let mut excess = state.capacity_excess(registry, player, system);
    if excess == 0 {
        return;
    }
    for kind in [UnitType::Fighter, UnitType::Infantry, UnitType::Mech] {
        if excess == 0 {
            break;
        }
        let ids: Vec<UnitId> = state
            .units_in_space(system)
            .filter(|u| u.owner == player && u.unit_type == kind)
            .map(|u| u.id)
            .collect();
        for id in ids {
            if excess == 0 {
                break;
            }
            if let Some(unit) = state.units.remove(&id) {
                events.push(Event::public(EventKind::UnitReturnedToReinforcements {
                    unit: id,
                    owner: unit.owner,
                }));
                excess -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::galaxy::{HexCoord, SystemTile};
    use crate::ids::SystemId;
    use crate::types::{Faction, PlayerColor, TileBack};
    use crate::unit::UnitLocation;

    fn combat_fixture() -> (GameState, CardRegistry, PlayerId, PlayerId, SystemId) {
        let mut state = GameState::bare(11, 10);
        let registry = CardRegistry::new();
        let (a, d) = (PlayerId::from_index(0), PlayerId::from_index(1));
        for id in [a, d] {
            state.players.insert(
                id,
                crate::player::Player::new(
                    id,
                    Faction::BaronyOfLetnev,
                    PlayerColor::Red,
                    SystemId::from_raw(90),
                ),
            );
        }
        let system = SystemId::from_raw(5);
        state
            .galaxy
            .place(SystemTile::new(system, TileBack::Blue), HexCoord::new(0, 0));
        (state, registry, a, d, system)
    }

    #[test]
    fn test_nebula_bonus_applies_to_defender_only() {
        let (mut state, _, _, _, system) = combat_fixture();
        state
            .galaxy
            .system_mut(system)
            .unwrap()
            .anomalies
            .insert(Anomaly::Nebula);
        assert_eq!(nebula_defender_bonus(&state, system, true), 1);
        assert_eq!(nebula_defender_bonus(&state, system, false), 0);
    }

    #[test]
    fn test_sustain_marks_damaged_instead_of_destroying() {
        let (mut state, registry, a, d, system) = combat_fixture();
        let dread = state
            .spawn_unit(d, UnitType::Dreadnought, UnitLocation::Space(system))
            .unwrap();
        let mut events = Vec::new();
        apply_hit_assignments(
            &mut state,
            &registry,
            d,
            HitScope::Space(system),
            &[HitAssignment {
                unit: dread,
                sustain: true,
            }],
            1,
            Some(a),
            &mut events,
        )
        .unwrap();
        assert!(state.units[&dread].damaged);
        // A second sustain on the damaged ship is illegal.
        let err = apply_hit_assignments(
            &mut state,
            &registry,
            d,
            HitScope::Space(system),
            &[HitAssignment {
                unit: dread,
                sustain: true,
            }],
            1,
            Some(a),
            &mut events,
        )
        .unwrap_err();
        assert_eq!(err.code(), "already_damaged");
    }

    #[test]
    fn test_afb_only_kills_fighters() {
        let (mut state, registry, a, d, system) = combat_fixture();
        state
            .spawn_unit(a, UnitType::Destroyer, UnitLocation::Space(system))
            .unwrap();
        let cruiser = state
            .spawn_unit(d, UnitType::Cruiser, UnitLocation::Space(system))
            .unwrap();
        // No defender fighters: AFB cannot destroy anything else.
        let mut events = Vec::new();
        let destroyed = anti_fighter_barrage(&mut state, &registry, a, d, system, &mut events);
        assert_eq!(destroyed, 0);
        assert!(state.units.contains_key(&cruiser));
    }

    #[test]
    fn test_capacity_cleanup_removes_fighters_first() {
        let (mut state, registry, a, _, system) = combat_fixture();
        // A lone carrier (capacity 4) with 5 fighters and 1 infantry.
        state
            .spawn_unit(a, UnitType::Carrier, UnitLocation::Space(system))
            .unwrap();
        for _ in 0..5 {
            state
                .spawn_unit(a, UnitType::Fighter, UnitLocation::Space(system))
                .unwrap();
        }
        state
            .spawn_unit(a, UnitType::Infantry, UnitLocation::Space(system))
            .unwrap();
        let mut events = Vec::new();
        enforce_capacity_after_combat(&mut state, &registry, a, system, &mut events);
        assert_eq!(state.capacity_excess(&registry, a, system), 0);
        let fighters = state
            .units_in_space(system)
            .filter(|u| u.unit_type == UnitType::Fighter)
            .count();
        let infantry = state
            .units_in_space(system)
            .filter(|u| u.unit_type == UnitType::Infantry)
            .count();
        assert_eq!(fighters, 3);
        assert_eq!(infantry, 1);
    }
}
