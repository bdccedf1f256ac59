//! The tactical action: activation, movement, space combat, invasion,
//! production.
//!
//! The pipeline is a state machine stored in `TacticalState`; each handler
//! here consumes one intent, advances the machine, and leaves either a new
//! `PendingDecision` or a finished action. Substeps validate fully before
//! mutating, and the engine commits the state clone only on success, so a
//! rejected substep rolls back wholesale.

use std::collections::BTreeMap;

use tracing::debug;

use crate::combat::{self, HitScope};
use crate::event::{Event, EventKind};
use crate::ids::{PlanetId, PlayerId, SystemId, UnitId};
use crate::intent::{
    BombardmentOrder, DecisionKind, HitAssignment, HitContext, MovementOrder, PendingDecision,
    ProductionOrder, Rejection, Spend,
};
use crate::movement;
use crate::player::CommandPool;
use crate::registry::CardRegistry;
use crate::state::{
    AssignState, CombatStage, CombatState, GamePhase, GameState, GroundCombatStage,
    GroundCombatState, InvasionStage, InvasionState, ModUntil, RerollState, SpaceCannonState,
    TacticalState, TacticalStep,
};
use crate::types::UnitType;
use crate::unit::{Production, UnitLocation};

fn pending(state: &mut GameState, player: PlayerId, kind: DecisionKind) {
    state.pending = Some(PendingDecision { player, kind });
}

fn tactical_mut(state: &mut GameState) -> Result<&mut TacticalState, Rejection> {
    match &mut state.phase {
        GamePhase::Action(a) => a
            .tactical
            .as_mut()
            .ok_or_else(|| Rejection::invalid("no_tactical", "no tactical action in progress")),
        _ => Err(Rejection::invalid("wrong_phase", "not in the action phase")),
    }
}

fn tactical_ref(state: &GameState) -> Result<&TacticalState, Rejection> {
    match &state.phase {
        GamePhase::Action(a) => a
            .tactical
            .as_ref()
            .ok_or_else(|| Rejection::invalid("no_tactical", "no tactical action in progress")),
        _ => Err(Rejection::invalid("wrong_phase", "not in the action phase")),
    }
}

// ============================================================================
// Step 1 — Activation
// ============================================================================

/// Spend a tactic token to activate a system. Other players' tokens in the
/// system do not block activation; the active player's own token does.
pub fn activate(
    state: &mut GameState,
    player: PlayerId,
    system: SystemId,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    if state.galaxy.system(system).is_none() {
        return Err(Rejection::invalid(
            "unknown_system",
            format!("no such system {system}"),
        ));
    }
    if state
        .command_tokens_on_board
        .get(&system)
        .is_some_and(|s| s.contains(&player))
    {
        return Err(Rejection::rules(
            "already_activated",
            format!("{system} already carries your command token"),
        ));
    }
    {
        let p = state.player_mut(player)?;
        if !p.command.take(CommandPool::Tactic) {
            return Err(Rejection::rules(
                "no_tactic_token",
                "the tactic pool is empty",
            ));
        }
    }
    debug!(%player, %system, "tactical action: activation");
    state
        .command_tokens_on_board
        .entry(system)
        .or_default()
        .insert(player);
    state.active_system = Some(system);
    if let GamePhase::Action(a) = &mut state.phase {
        a.tactical = Some(TacticalState {
            system,
            step: TacticalStep::Movement,
        });
    }
    events.push(Event::public(EventKind::CommandTokenSpent {
        player,
        pool: CommandPool::Tactic,
    }));
    events.push(Event::public(EventKind::SystemActivated { player, system }));
    pending(state, player, DecisionKind::DeclareMovement { system });
    Ok(())
}

// ============================================================================
// Step 2 — Movement
// ============================================================================

pub fn declare_movement(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    orders: &[MovementOrder],
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let tactical = tactical_ref(state)?;
    if tactical.step != TacticalStep::Movement {
        return Err(Rejection::invalid("wrong_step", "movement already declared"));
    }
    let system = tactical.system;
    movement::validate_movement(state, registry, player, system, orders)?;
    debug!(%player, %system, ships = orders.len(), "tactical action: movement");

    // The fleet pool binds at all times: arrivals may not push the active
    // system over it.
    let arriving = orders
        .iter()
        .filter(|o| {
            state
                .units
                .get(&o.unit)
                .is_some_and(|u| u.unit_type.counts_against_fleet_pool())
        })
        .count() as u8;
    let already_there = state
        .units_in_space(system)
        .filter(|u| u.owner == player && u.unit_type.counts_against_fleet_pool())
        .count() as u8;
    if already_there + arriving > state.fleet_pool_of(registry, player) {
        return Err(Rejection::rules(
            "fleet_pool",
            "the move would exceed your fleet pool",
        ));
    }

    let origins: std::collections::BTreeSet<SystemId> = orders
        .iter()
        .filter_map(|o| match state.units.get(&o.unit).map(|u| u.location) {
            Some(UnitLocation::Space(s)) => Some(s),
            _ => None,
        })
        .collect();
    let entered_nexus = movement::execute_movement(state, player, system, orders, events);
    if entered_nexus && !state.galaxy.nexus_is_active() {
        state.galaxy.activate_nexus();
        events.push(Event::public(EventKind::NexusActivated));
    }
    // Departing transports may strand fighters beyond the capacity left in
    // their origin systems; the excess returns to reinforcements.
    for origin in origins {
        combat::enforce_capacity_after_combat(state, registry, player, origin, events);
    }
    begin_space_cannon_offense(state, registry, events);
    Ok(())
}

/// Offer space cannon fire against the active player, clockwise from the
/// player left of them.
pub fn begin_space_cannon_offense(
    state: &mut GameState,
    registry: &CardRegistry,
    events: &mut Vec<Event>,
) {
    let Ok(tactical) = tactical_ref(state) else {
        return;
    };
    let system = tactical.system;
    let active = state.active_player.unwrap_or_default();
    let active_has_ships = !state.ships_of(active, system).is_empty();
    let mut queue = Vec::new();
    if active_has_ships {
        for p in state.clockwise_from(active) {
            if p == active {
                continue;
            }
            if has_space_cannon_in_range(state, registry, p, system) {
                queue.push(p);
            }
        }
    }
    if queue.is_empty() {
        after_space_cannon_offense(state, registry, events);
        return;
    }
    let first = queue[0];
    if let Ok(t) = tactical_mut(state) {
        t.step = TacticalStep::SpaceCannonOffense(SpaceCannonState {
            queue,
            cursor: 0,
            pending_hits: 0,
        });
    }
    pending(state, first, DecisionKind::OfferSpaceCannon { system });
    let _ = events;
}

fn has_space_cannon_in_range(
    state: &GameState,
    registry: &CardRegistry,
    player: PlayerId,
    system: SystemId,
) -> bool {
    let adjacent = state.galaxy.adjacent(system);
    state
        .units
        .values()
        .filter(|u| u.owner == player)
        .any(|u| {
            let stats = state.effective_stats(registry, u.id);
            let Some(_) = stats.space_cannon else {
                return false;
            };
            let at = match u.location {
                UnitLocation::Space(s) => Some(s),
                UnitLocation::OnPlanet(p) => state.planets.get(&p).map(|pl| pl.system),
                UnitLocation::Captured(_) => None,
            };
            match at {
                Some(s) => s == system || (stats.space_cannon_range >= 1 && adjacent.contains(&s)),
                None => false,
            }
        })
}

pub fn handle_use_space_cannon(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    roll: bool,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let system = tactical_ref(state)?.system;
    let TacticalStep::SpaceCannonOffense(sc) = &tactical_ref(state)?.step else {
        return Err(Rejection::invalid("wrong_step", "no space cannon window open"));
    };
    let sc = sc.clone();
    if sc.queue.get(sc.cursor) != Some(&player) {
        return Err(Rejection::invalid("not_your_offer", "not your space cannon offer"));
    }
    let mut hits = sc.pending_hits;
    if roll {
        hits += combat::space_cannon_offense(state, registry, player, system, events);
    }
    let cursor = sc.cursor + 1;
    if cursor < sc.queue.len() {
        let next = sc.queue[cursor];
        if let Ok(t) = tactical_mut(state) {
            t.step = TacticalStep::SpaceCannonOffense(SpaceCannonState {
                queue: sc.queue,
                cursor,
                pending_hits: hits,
            });
        }
        pending(state, next, DecisionKind::OfferSpaceCannon { system });
        return Ok(());
    }
    if hits > 0 {
        let active = state.active_player.unwrap_or_default();
        if let Ok(t) = tactical_mut(state) {
            t.step = TacticalStep::SpaceCannonOffense(SpaceCannonState {
                queue: sc.queue,
                cursor,
                pending_hits: hits,
            });
        }
        pending(
            state,
            active,
            DecisionKind::AssignHits {
                count: hits,
                context: HitContext::SpaceCannonOffense,
            },
        );
        return Ok(());
    }
    after_space_cannon_offense(state, registry, events);
    Ok(())
}

pub fn handle_assign_space_cannon_hits(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    assignments: &[HitAssignment],
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let system = tactical_ref(state)?.system;
    let TacticalStep::SpaceCannonOffense(sc) = &tactical_ref(state)?.step else {
        return Err(Rejection::invalid("wrong_step", "no space cannon hits pending"));
    };
    let hits = sc.pending_hits;
    combat::apply_hit_assignments(
        state,
        registry,
        player,
        HitScope::Space(system),
        assignments,
        hits,
        None,
        events,
    )?;
    after_space_cannon_offense(state, registry, events);
    Ok(())
}

/// Move into combat when two players hold ships, invasion otherwise.
fn after_space_cannon_offense(
    state: &mut GameState,
    registry: &CardRegistry,
    events: &mut Vec<Event>,
) {
    let Ok(tactical) = tactical_ref(state) else {
        return;
    };
    let system = tactical.system;
    let active = state.active_player.unwrap_or_default();
    let holders = state.players_with_ships_in(system);
    let opponent = holders.iter().copied().find(|&p| p != active);
    match opponent {
        Some(defender) if holders.contains(&active) => {
            begin_space_combat(state, registry, active, defender, events);
        }
        _ => begin_invasion(state, registry, events),
    }
}

// ============================================================================
// Step 3 — Space combat
// ============================================================================

fn begin_space_combat(
    state: &mut GameState,
    registry: &CardRegistry,
    attacker: PlayerId,
    defender: PlayerId,
    events: &mut Vec<Event>,
) {
    debug!(%attacker, %defender, "tactical action: space combat");
    if let Ok(t) = tactical_mut(state) {
        t.step = TacticalStep::SpaceCombat(CombatState {
            attacker,
            defender,
            round: 1,
            retreating: None,
            stage: CombatStage::AnnounceRetreats { cursor: 0 },
        });
    }
    pending(state, defender, DecisionKind::AnnounceRetreat);
    // The start-of-combat window, when it opens, supersedes the retreat
    // prompt; closing it restores the prompt (WindowResume::CombatRounds).
    crate::window::open_window(
        state,
        registry,
        crate::ability::WindowKind::StartOfCombat,
        attacker,
        crate::state::WindowResume::CombatRounds,
        events,
    );
}

fn combat_mut(state: &mut GameState) -> Result<&mut CombatState, Rejection> {
    match &mut tactical_mut(state)?.step {
        TacticalStep::SpaceCombat(c) => Ok(c),
        _ => Err(Rejection::invalid("no_combat", "no space combat in progress")),
    }
}

pub fn handle_announce_retreat(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    retreat: bool,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let system = tactical_ref(state)?.system;
    let combat = combat_ref(state)?;
    let CombatStage::AnnounceRetreats { cursor } = &combat.stage else {
        return Err(Rejection::invalid("wrong_step", "retreats are not being announced"));
    };
    let cursor = *cursor;
    let (attacker, defender) = (combat.attacker, combat.defender);
    let expected = if cursor == 0 { defender } else { attacker };
    if player != expected {
        return Err(Rejection::invalid("not_your_offer", format!("waiting on {expected}")));
    }
    if retreat {
        let opponent = if player == attacker { defender } else { attacker };
        if combat::legal_retreat_targets(state, player, opponent, system).is_empty() {
            return Err(Rejection::rules(
                "no_retreat_target",
                "no adjacent system qualifies for a retreat",
            ));
        }
        let combat = combat_mut(state)?;
        combat.retreating = Some(player);
        events.push(Event::public(EventKind::RetreatAnnounced { player }));
        // The defender retreating forecloses the attacker's announcement.
        proceed_to_dice(state, registry, events);
        return Ok(());
    }
    if cursor == 0 {
        let combat = combat_mut(state)?;
        combat.stage = CombatStage::AnnounceRetreats { cursor: 1 };
        pending(state, attacker, DecisionKind::AnnounceRetreat);
        return Ok(());
    }
    proceed_to_dice(state, registry, events);
    Ok(())
}

/// AFB on the first round, then roll both sides and open the reroll window.
fn proceed_to_dice(state: &mut GameState, registry: &CardRegistry, events: &mut Vec<Event>) {
    let Ok(tactical) = tactical_ref(state) else { return };
    let system = tactical.system;
    let Ok(combat) = combat_ref(state) else { return };
    let (attacker, defender, round) = (combat.attacker, combat.defender, combat.round);

    if round == 1 {
        combat::anti_fighter_barrage(state, registry, attacker, defender, system, events);
        combat::anti_fighter_barrage(state, registry, defender, attacker, system, events);
        // Barrage may have cleared a side entirely.
        if check_combat_over(state, registry, events) {
            return;
        }
    }

    // Attacker rolls fully before the defender (LRR 78.4).
    let attacker_rolls = combat::roll_space_combat(
        state,
        registry,
        attacker,
        system,
        combat::nebula_defender_bonus(state, system, false),
        events,
    );
    let defender_rolls = combat::roll_space_combat(
        state,
        registry,
        defender,
        system,
        combat::nebula_defender_bonus(state, system, true),
        events,
    );
    let mut rolls = BTreeMap::new();
    rolls.insert(attacker, attacker_rolls);
    rolls.insert(defender, defender_rolls);

    let queue: Vec<PlayerId> = state
        .clockwise_from(attacker)
        .into_iter()
        .filter(|&p| p == attacker || p == defender)
        .collect();
    let any_rerolls = queue
        .iter()
        .any(|&p| !combat::reroll_sources(state, registry, p).is_empty());
    let reroll = RerollState {
        rolls,
        used: Vec::new(),
        queue: queue.clone(),
        cursor: 0,
        consecutive_passes: 0,
    };
    if any_rerolls {
        let first = queue[0];
        if let Ok(c) = combat_mut(state) {
            c.stage = CombatStage::Reroll(reroll);
        }
        pending(state, first, DecisionKind::OfferReroll);
    } else {
        settle_hits(state, registry, reroll, events);
    }
}

fn combat_ref(state: &GameState) -> Result<&CombatState, Rejection> {
    match &tactical_ref(state)?.step {
        TacticalStep::SpaceCombat(c) => Ok(c),
        _ => Err(Rejection::invalid("no_combat", "no space combat in progress")),
    }
}

pub fn handle_reroll(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    source: crate::ability::AbilitySource,
    roller: PlayerId,
    die: usize,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let combat = combat_ref(state)?;
    let CombatStage::Reroll(reroll) = &combat.stage else {
        return Err(Rejection::invalid("wrong_step", "no reroll window open"));
    };
    let mut reroll = reroll.clone();
    if reroll.queue.get(reroll.cursor % reroll.queue.len()) != Some(&player) {
        return Err(Rejection::invalid("not_your_offer", "not your reroll offer"));
    }
    if !combat::reroll_sources(state, registry, player).contains(&source) {
        return Err(Rejection::invalid(
            "not_eligible",
            "you hold no such reroll ability",
        ));
    }
    combat::apply_reroll(
        state, registry, &mut reroll, player, source, roller, die, events,
    )?;
    // A reroll granted by an action card consumes the card.
    if let crate::ability::AbilitySource::ActionCard(card) = source {
        if let Ok(p) = state.player_mut(player) {
            p.remove_action_card(card);
        }
        state.decks.action.discard(card);
        events.push(Event::public(EventKind::ActionCardPlayed { player, card }));
    }
    if let Ok(c) = combat_mut(state) {
        c.stage = CombatStage::Reroll(reroll);
    }
    Ok(())
}

pub fn handle_decline_reroll(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let combat = combat_ref(state)?;
    let CombatStage::Reroll(reroll) = &combat.stage else {
        return Err(Rejection::invalid("wrong_step", "no reroll window open"));
    };
    let mut reroll = reroll.clone();
    let len = reroll.queue.len();
    if reroll.queue.get(reroll.cursor % len) != Some(&player) {
        return Err(Rejection::invalid("not_your_offer", "not your reroll offer"));
    }
    reroll.consecutive_passes += 1;
    reroll.cursor = (reroll.cursor + 1) % len;
    if reroll.consecutive_passes >= len {
        settle_hits(state, registry, reroll, events);
        return Ok(());
    }
    let next = reroll.queue[reroll.cursor];
    if let Ok(c) = combat_mut(state) {
        c.stage = CombatStage::Reroll(reroll);
    }
    pending(state, next, DecisionKind::OfferReroll);
    Ok(())
}

/// The reroll window closed: count hits and hand out assignments.
fn settle_hits(
    state: &mut GameState,
    registry: &CardRegistry,
    reroll: RerollState,
    events: &mut Vec<Event>,
) {
    let Ok(combat) = combat_ref(state) else { return };
    let (attacker, defender) = (combat.attacker, combat.defender);
    let attacker_hits = reroll
        .rolls
        .get(&attacker)
        .map(|r| combat::count_hits(r))
        .unwrap_or(0);
    let defender_hits = reroll
        .rolls
        .get(&defender)
        .map(|r| combat::count_hits(r))
        .unwrap_or(0);
    for (player, hits) in [(attacker, attacker_hits), (defender, defender_hits)] {
        if hits > 0 {
            events.push(Event::public(EventKind::HitsProduced {
                player,
                count: hits,
            }));
        }
    }
    let mut remaining = BTreeMap::new();
    if attacker_hits > 0 {
        remaining.insert(defender, attacker_hits);
    }
    if defender_hits > 0 {
        remaining.insert(attacker, defender_hits);
    }
    if remaining.is_empty() {
        end_combat_round(state, registry, events);
        return;
    }
    let assign = AssignState { remaining };
    let order = state.clockwise_from(attacker);
    let next = order
        .into_iter()
        .find(|p| assign.remaining.contains_key(p))
        .unwrap_or(attacker);
    let count = assign.remaining.get(&next).copied().unwrap_or(0);
    if let Ok(c) = combat_mut(state) {
        c.stage = CombatStage::AssignHits(assign);
    }
    pending(
        state,
        next,
        DecisionKind::AssignHits {
            count,
            context: HitContext::SpaceCombat,
        },
    );
}

pub fn handle_assign_combat_hits(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    assignments: &[HitAssignment],
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let system = tactical_ref(state)?.system;

    // Ground combat assignment routes separately.
    if let Ok(t) = tactical_ref(state) {
        if matches!(t.step, TacticalStep::Invasion(_)) {
            return handle_assign_ground_hits(state, registry, player, assignments, events);
        }
    }

    let combat = combat_ref(state)?;
    let CombatStage::AssignHits(assign) = &combat.stage else {
        return Err(Rejection::invalid("wrong_step", "no hits to assign"));
    };
    let (attacker, _defender) = (combat.attacker, combat.defender);
    let mut assign = assign.clone();
    let Some(&count) = assign.remaining.get(&player) else {
        return Err(Rejection::invalid("no_hits_for_you", "no hits against you"));
    };
    let opponent = if player == combat.attacker {
        combat.defender
    } else {
        combat.attacker
    };
    combat::apply_hit_assignments(
        state,
        registry,
        player,
        HitScope::Space(system),
        assignments,
        count,
        Some(opponent),
        events,
    )?;
    assign.remaining.remove(&player);
    if let Some(next) = state
        .clockwise_from(attacker)
        .into_iter()
        .find(|p| assign.remaining.contains_key(p))
    {
        let count = assign.remaining.get(&next).copied().unwrap_or(0);
        if let Ok(c) = combat_mut(state) {
            c.stage = CombatStage::AssignHits(assign);
        }
        pending(
            state,
            next,
            DecisionKind::AssignHits {
                count,
                context: HitContext::SpaceCombat,
            },
        );
        return Ok(());
    }
    end_combat_round(state, registry, events);
    Ok(())
}

fn end_combat_round(state: &mut GameState, registry: &CardRegistry, events: &mut Vec<Event>) {
    state.expire_transients(ModUntil::EndOfCombatRound);
    let Ok(combat) = combat_ref(state) else { return };
    let retreating = combat.retreating;

    if check_combat_over(state, registry, events) {
        return;
    }

    if let Some(retreater) = retreating {
        let Ok(tactical) = tactical_ref(state) else { return };
        let system = tactical.system;
        let Ok(combat) = combat_ref(state) else { return };
        let opponent = if retreater == combat.attacker {
            combat.defender
        } else {
            combat.attacker
        };
        if !combat::legal_retreat_targets(state, retreater, opponent, system).is_empty() {
            pending(state, retreater, DecisionKind::ChooseRetreatDestination);
            return;
        }
        // Retreat invalidated; fight on.
    }

    let Ok(combat) = combat_mut(state) else { return };
    combat.round += 1;
    combat.retreating = None;
    combat.stage = CombatStage::AnnounceRetreats { cursor: 0 };
    let defender = combat.defender;
    pending(state, defender, DecisionKind::AnnounceRetreat);
}

pub fn handle_retreat_destination(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    into: SystemId,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let system = tactical_ref(state)?.system;
    let combat = combat_ref(state)?;
    if combat.retreating != Some(player) {
        return Err(Rejection::invalid("not_retreating", "you did not announce a retreat"));
    }
    let opponent = if player == combat.attacker {
        combat.defender
    } else {
        combat.attacker
    };
    if !combat::legal_retreat_targets(state, player, opponent, system).contains(&into) {
        return Err(Rejection::rules(
            "illegal_retreat",
            format!("{into} is not a legal retreat destination"),
        ));
    }
    let movers: Vec<UnitId> = state
        .units_in_space(system)
        .filter(|u| u.owner == player)
        .map(|u| u.id)
        .collect();
    for id in movers {
        if let Some(u) = state.units.get_mut(&id) {
            u.location = UnitLocation::Space(into);
        }
        events.push(Event::public(EventKind::UnitMoved {
            unit: id,
            from: system,
            to: into,
        }));
    }
    events.push(Event::public(EventKind::UnitsRetreated { player, to: into }));
    combat::enforce_capacity_after_combat(state, registry, player, into, events);
    let over = check_combat_over(state, registry, events);
    debug_assert!(over, "a completed retreat always ends the combat");
    Ok(())
}

/// If a side has no ships left, the combat ends and the pipeline moves on.
fn check_combat_over(
    state: &mut GameState,
    registry: &CardRegistry,
    events: &mut Vec<Event>,
) -> bool {
    let Ok(tactical) = tactical_ref(state) else {
        return true;
    };
    let system = tactical.system;
    let Ok(combat) = combat_ref(state) else {
        return true;
    };
    let (attacker, defender) = (combat.attacker, combat.defender);
    let attacker_ships = state.ships_of(attacker, system);
    let defender_ships = state.ships_of(defender, system);
    if !attacker_ships.is_empty() && !defender_ships.is_empty() {
        return false;
    }
    let winner = if attacker_ships.is_empty() && defender_ships.is_empty() {
        None
    } else if defender_ships.is_empty() {
        Some(attacker)
    } else {
        Some(defender)
    };
    events.push(Event::public(EventKind::CombatEnded { system, winner }));
    state.expire_transients(ModUntil::EndOfCombat);
    for p in [attacker, defender] {
        combat::enforce_capacity_after_combat(state, registry, p, system, events);
    }
    begin_invasion(state, registry, events);
    true
}

// ============================================================================
// Step 4 — Invasion
// ============================================================================

fn begin_invasion(state: &mut GameState, registry: &CardRegistry, events: &mut Vec<Event>) {
    let Ok(tactical) = tactical_ref(state) else { return };
    let system = tactical.system;
    let active = state.active_player.unwrap_or_default();
    let has_presence = !state.ships_of(active, system).is_empty();
    if !has_presence {
        begin_production(state, registry, events);
        return;
    }
    debug!(player = %active, %system, "tactical action: invasion");
    if let Ok(t) = tactical_mut(state) {
        t.step = TacticalStep::Invasion(InvasionState {
            stage: InvasionStage::Bombardment,
            committed: BTreeMap::new(),
        });
    }
    pending(state, active, DecisionKind::Bombard);
}

fn invasion_mut(state: &mut GameState) -> Result<&mut InvasionState, Rejection> {
    match &mut tactical_mut(state)?.step {
        TacticalStep::Invasion(i) => Ok(i),
        _ => Err(Rejection::invalid("no_invasion", "no invasion in progress")),
    }
}

fn invasion_ref(state: &GameState) -> Result<&InvasionState, Rejection> {
    match &tactical_ref(state)?.step {
        TacticalStep::Invasion(i) => Ok(i),
        _ => Err(Rejection::invalid("no_invasion", "no invasion in progress")),
    }
}

pub fn handle_bombard(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    rolls: &[BombardmentOrder],
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let system = tactical_ref(state)?.system;
    let invasion = invasion_ref(state)?;
    if invasion.stage != InvasionStage::Bombardment {
        return Err(Rejection::invalid("wrong_step", "bombardment already resolved"));
    }
    // Validate every order before rolling anything.
    let mut used: std::collections::BTreeSet<UnitId> = std::collections::BTreeSet::new();
    for order in rolls {
        let unit = state.unit(order.unit)?;
        if unit.owner != player || !unit.in_space(system) {
            return Err(Rejection::invalid(
                "bad_bombarder",
                format!("{} cannot bombard here", order.unit),
            ));
        }
        if state
            .effective_stats(registry, order.unit)
            .bombardment
            .is_none()
        {
            return Err(Rejection::rules(
                "no_bombardment",
                format!("{} has no bombardment", order.unit),
            ));
        }
        if !used.insert(order.unit) {
            return Err(Rejection::invalid(
                "duplicate_bombarder",
                format!("{} bombards once", order.unit),
            ));
        }
        let planet = state.planet(order.planet)?;
        if planet.system != system {
            return Err(Rejection::invalid(
                "planet_elsewhere",
                format!("{} is not in the active system", order.planet),
            ));
        }
        if combat::planet_is_shielded(state, registry, order.planet, order.unit) {
            return Err(Rejection::rules(
                "planetary_shield",
                format!("{} is protected by a planetary shield", order.planet),
            ));
        }
    }
    for order in rolls {
        combat::bombard(state, registry, order.unit, order.planet, events);
    }
    if let Ok(i) = invasion_mut(state) {
        i.stage = InvasionStage::Commit;
    }
    pending(state, player, DecisionKind::CommitGroundForces);
    Ok(())
}

pub fn handle_commit(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    commitments: &[(UnitId, PlanetId)],
    custodians_payment: Option<&Spend>,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let system = tactical_ref(state)?.system;
    let invasion = invasion_ref(state)?;
    if invasion.stage != InvasionStage::Commit {
        return Err(Rejection::invalid("wrong_step", "ground forces already committed"));
    }

    let mut seen: std::collections::BTreeSet<UnitId> = std::collections::BTreeSet::new();
    let mut commits_to_mecatol = false;
    for &(unit_id, planet_id) in commitments {
        let unit = state.unit(unit_id)?;
        if unit.owner != player || !unit.in_space(system) || !unit.unit_type.is_ground_force() {
            return Err(Rejection::invalid(
                "bad_commitment",
                format!("{unit_id} is not a ground force in the active system"),
            ));
        }
        if !seen.insert(unit_id) {
            return Err(Rejection::invalid(
                "duplicate_commitment",
                format!("{unit_id} committed twice"),
            ));
        }
        let planet = state.planet(planet_id)?;
        if planet.system != system {
            return Err(Rejection::invalid(
                "planet_elsewhere",
                format!("{planet_id} is not in the active system"),
            ));
        }
        if planet.is_mecatol_rex && state.custodians_on_mecatol {
            commits_to_mecatol = true;
        }
    }

    // The custodians token demands 6 influence before forces land on
    // Mecatol Rex; the payment is atomic with the commit.
    if commits_to_mecatol {
        let Some(payment) = custodians_payment else {
            return Err(Rejection::rules(
                "custodians_unpaid",
                "committing to Mecatol Rex requires paying 6 influence",
            ));
        };
        spend_influence(state, player, payment, 6, events)?;
        state.custodians_on_mecatol = false;
        events.push(Event::public(EventKind::CustodiansRemoved { player }));
        state.award_vp(player, 1, events);
    }

    for &(unit_id, planet_id) in commitments {
        if let Some(u) = state.units.get_mut(&unit_id) {
            u.location = UnitLocation::OnPlanet(planet_id);
        }
        if let Ok(i) = invasion_mut(state) {
            i.committed.entry(planet_id).or_default().push(unit_id);
        }
    }
    for (&planet_id, units) in &invasion_ref(state)?.committed.clone() {
        events.push(Event::public(EventKind::GroundForcesCommitted {
            player,
            planet: planet_id,
            count: units.len() as u8,
        }));
    }

    begin_space_cannon_defense(state, registry, events);
    Ok(())
}

/// Validate and apply an influence payment of at least `required`.
pub fn spend_influence(
    state: &mut GameState,
    player: PlayerId,
    spend: &Spend,
    required: u8,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let mut total = u16::from(spend.trade_goods);
    for &planet_id in &spend.planets {
        let planet = state.planet(planet_id)?;
        if !planet.controlled_by(player) {
            return Err(Rejection::rules(
                "not_your_planet",
                format!("{planet_id} is not yours"),
            ));
        }
        if planet.exhausted {
            return Err(Rejection::rules(
                "planet_exhausted",
                format!("{planet_id} is exhausted"),
            ));
        }
        total += u16::from(planet.influence_value());
    }
    if state.player(player)?.trade_goods < spend.trade_goods {
        return Err(Rejection::rules("short_trade_goods", "not enough trade goods"));
    }
    if total < u16::from(required) {
        return Err(Rejection::rules(
            "short_influence",
            format!("{total} influence offered, {required} required"),
        ));
    }
    for &planet_id in &spend.planets {
        if let Ok(p) = state.planet_mut(planet_id) {
            p.exhaust();
        }
        events.push(Event::public(EventKind::PlanetExhausted { planet: planet_id }));
    }
    if spend.trade_goods > 0 {
        if let Ok(p) = state.player_mut(player) {
            p.trade_goods -= spend.trade_goods;
        }
        events.push(Event::public(EventKind::TradeGoodsSpent {
            player,
            count: spend.trade_goods,
        }));
    }
    events.push(Event::public(EventKind::InfluenceSpent {
        player,
        planets: spend.planets.clone(),
        trade_goods: spend.trade_goods,
    }));
    Ok(())
}

/// Validate and apply a resource payment of at least `required`.
pub fn spend_resources(
    state: &mut GameState,
    player: PlayerId,
    spend: &Spend,
    required: u8,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let mut total = u16::from(spend.trade_goods);
    for &planet_id in &spend.planets {
        let planet = state.planet(planet_id)?;
        if !planet.controlled_by(player) {
            return Err(Rejection::rules(
                "not_your_planet",
                format!("{planet_id} is not yours"),
            ));
        }
        if planet.exhausted {
            return Err(Rejection::rules(
                "planet_exhausted",
                format!("{planet_id} is exhausted"),
            ));
        }
        total += u16::from(planet.resource_value());
    }
    if state.player(player)?.trade_goods < spend.trade_goods {
        return Err(Rejection::rules("short_trade_goods", "not enough trade goods"));
    }
    if total < u16::from(required) {
        return Err(Rejection::rules(
            "short_resources",
            format!("{total} resources offered, {required} required"),
        ));
    }
    for &planet_id in &spend.planets {
        if let Ok(p) = state.planet_mut(planet_id) {
            p.exhaust();
        }
        events.push(Event::public(EventKind::PlanetExhausted { planet: planet_id }));
    }
    if spend.trade_goods > 0 {
        if let Ok(p) = state.player_mut(player) {
            p.trade_goods -= spend.trade_goods;
        }
        events.push(Event::public(EventKind::TradeGoodsSpent {
            player,
            count: spend.trade_goods,
        }));
    }
    events.push(Event::public(EventKind::ResourcesSpent {
        player,
        planets: spend.planets.clone(),
        trade_goods: spend.trade_goods,
    }));
    Ok(())
}

/// Space cannon defense fires automatically per invaded planet (declining is
/// never useful); the active player then assigns hits to committed forces.
fn begin_space_cannon_defense(
    state: &mut GameState,
    registry: &CardRegistry,
    events: &mut Vec<Event>,
) {
    let Ok(invasion) = invasion_ref(state) else { return };
    let planets: Vec<PlanetId> = invasion.committed.keys().copied().collect();
    if let Ok(i) = invasion_mut(state) {
        i.stage = InvasionStage::SpaceCannonDefense {
            queue: planets,
            cursor: 0,
            pending_hits: 0,
        };
    }
    advance_space_cannon_defense(state, registry, events);
}

fn advance_space_cannon_defense(
    state: &mut GameState,
    registry: &CardRegistry,
    events: &mut Vec<Event>,
) {
    let active = state.active_player.unwrap_or_default();
    loop {
        let (queue, cursor, pending_hits) = match invasion_ref(state) {
            Ok(invasion) => match &invasion.stage {
                InvasionStage::SpaceCannonDefense {
                    queue,
                    cursor,
                    pending_hits,
                } => (queue.clone(), *cursor, *pending_hits),
                _ => return,
            },
            Err(_) => return,
        };
        if pending_hits > 0 {
            return; // waiting on the active player's assignment
        }
        let Some(&planet_id) = queue.get(cursor) else {
            begin_ground_combats(state, registry, events);
            return;
        };
        let defenders: Vec<PlayerId> = state
            .units_on_planet(planet_id)
            .filter(|u| u.owner != active)
            .map(|u| u.owner)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut hits = 0;
        for d in defenders {
            hits += combat::space_cannon_defense(state, registry, d, planet_id, events);
        }
        // Hits cannot exceed the committed forces still on the planet.
        let committed_here = state.ground_forces_of(active, planet_id).len() as u8;
        let hits = hits.min(committed_here);
        if hits > 0 {
            if let Ok(i) = invasion_mut(state) {
                i.stage = InvasionStage::SpaceCannonDefense {
                    queue,
                    cursor,
                    pending_hits: hits,
                };
            }
            pending(
                state,
                active,
                DecisionKind::AssignHits {
                    count: hits,
                    context: HitContext::SpaceCannonDefense(planet_id),
                },
            );
            return;
        }
        if let Ok(i) = invasion_mut(state) {
            i.stage = InvasionStage::SpaceCannonDefense {
                queue,
                cursor: cursor + 1,
                pending_hits: 0,
            };
        }
    }
}

fn handle_assign_ground_hits(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    assignments: &[HitAssignment],
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let stage = invasion_ref(state)?.stage.clone();
    match &stage {
        InvasionStage::SpaceCannonDefense {
            queue,
            cursor,
            pending_hits,
        } => {
            let queue = queue.clone();
            let cursor = *cursor;
            let hits = *pending_hits;
            let Some(&planet_id) = queue.get(cursor) else {
                return Err(Rejection::invalid("wrong_step", "no hits pending"));
            };
            combat::apply_hit_assignments(
                state,
                registry,
                player,
                HitScope::Ground(planet_id),
                assignments,
                hits,
                None,
                events,
            )?;
            if let Ok(i) = invasion_mut(state) {
                i.stage = InvasionStage::SpaceCannonDefense {
                    queue,
                    cursor: cursor + 1,
                    pending_hits: 0,
                };
            }
            advance_space_cannon_defense(state, registry, events);
            Ok(())
        }
        InvasionStage::GroundCombat { queue, current } => {
            let queue = queue.clone();
            let Some(gc) = current.clone() else {
                return Err(Rejection::invalid("wrong_step", "no ground combat open"));
            };
            let GroundCombatStage::AssignHits(assign) = &gc.stage else {
                return Err(Rejection::invalid("wrong_step", "no hits to assign"));
            };
            let mut assign = assign.clone();
            let Some(&count) = assign.remaining.get(&player) else {
                return Err(Rejection::invalid("no_hits_for_you", "no hits against you"));
            };
            let opponent = if player == gc.attacker {
                gc.defender
            } else {
                gc.attacker
            };
            combat::apply_hit_assignments(
                state,
                registry,
                player,
                HitScope::Ground(gc.planet),
                assignments,
                count,
                Some(opponent),
                events,
            )?;
            assign.remaining.remove(&player);
            if let Some(next) = state
                .clockwise_from(gc.attacker)
                .into_iter()
                .find(|p| assign.remaining.contains_key(p))
            {
                let count = assign.remaining.get(&next).copied().unwrap_or(0);
                let mut gc = gc;
                gc.stage = GroundCombatStage::AssignHits(assign);
                let planet = gc.planet;
                if let Ok(i) = invasion_mut(state) {
                    i.stage = InvasionStage::GroundCombat {
                        queue,
                        current: Some(gc),
                    };
                }
                pending(
                    state,
                    next,
                    DecisionKind::AssignHits {
                        count,
                        context: HitContext::GroundCombat(planet),
                    },
                );
                return Ok(());
            }
            end_ground_combat_round(state, registry, queue, gc, events);
            Ok(())
        }
        _ => Err(Rejection::invalid("wrong_step", "no hits pending")),
    }
}

fn begin_ground_combats(state: &mut GameState, registry: &CardRegistry, events: &mut Vec<Event>) {
    let Ok(invasion) = invasion_ref(state) else { return };
    let active = state.active_player.unwrap_or_default();
    let contested: Vec<PlanetId> = invasion
        .committed
        .keys()
        .copied()
        .filter(|&p| {
            let attackers = !state.ground_forces_of(active, p).is_empty();
            let defenders = state
                .units_on_planet(p)
                .any(|u| u.owner != active && u.unit_type.is_ground_force());
            attackers && defenders
        })
        .collect();
    if let Ok(i) = invasion_mut(state) {
        i.stage = InvasionStage::GroundCombat {
            queue: contested,
            current: None,
        };
    }
    advance_ground_combats(state, registry, events);
}

fn advance_ground_combats(state: &mut GameState, registry: &CardRegistry, events: &mut Vec<Event>) {
    let active = state.active_player.unwrap_or_default();
    let Ok(invasion) = invasion_ref(state) else { return };
    let InvasionStage::GroundCombat { queue, current } = &invasion.stage else {
        return;
    };
    if current.is_some() {
        return;
    }
    let mut queue = queue.clone();
    let Some(planet) = queue.pop() else {
        establish_control(state, registry, events);
        return;
    };
    let defender = state
        .units_on_planet(planet)
        .find(|u| u.owner != active && u.unit_type.is_ground_force())
        .map(|u| u.owner);
    let Some(defender) = defender else {
        if let Ok(i) = invasion_mut(state) {
            i.stage = InvasionStage::GroundCombat {
                queue,
                current: None,
            };
        }
        advance_ground_combats(state, registry, events);
        return;
    };
    let gc = GroundCombatState {
        planet,
        attacker: active,
        defender,
        round: 1,
        stage: GroundCombatStage::AssignHits(AssignState {
            remaining: BTreeMap::new(),
        }),
    };
    if let Ok(i) = invasion_mut(state) {
        i.stage = InvasionStage::GroundCombat {
            queue,
            current: Some(gc),
        };
    }
    roll_ground_round(state, registry, events);
}

fn roll_ground_round(state: &mut GameState, registry: &CardRegistry, events: &mut Vec<Event>) {
    let Ok(invasion) = invasion_ref(state) else { return };
    let InvasionStage::GroundCombat { queue, current } = &invasion.stage else {
        return;
    };
    let queue = queue.clone();
    let Some(gc) = current.clone() else { return };
    let (attacker, defender, planet) = (gc.attacker, gc.defender, gc.planet);

    let attacker_rolls =
        combat::roll_ground_combat(state, registry, attacker, planet, 0, events);
    let defender_rolls =
        combat::roll_ground_combat(state, registry, defender, planet, 0, events);
    let mut rolls = BTreeMap::new();
    rolls.insert(attacker, attacker_rolls);
    rolls.insert(defender, defender_rolls);
    let order: Vec<PlayerId> = state
        .clockwise_from(attacker)
        .into_iter()
        .filter(|&p| p == attacker || p == defender)
        .collect();
    let any_rerolls = order
        .iter()
        .any(|&p| !combat::reroll_sources(state, registry, p).is_empty());
    let reroll = RerollState {
        rolls,
        used: Vec::new(),
        queue: order.clone(),
        cursor: 0,
        consecutive_passes: 0,
    };
    if any_rerolls {
        let first = order[0];
        let mut gc = gc;
        gc.stage = GroundCombatStage::Reroll(reroll);
        if let Ok(i) = invasion_mut(state) {
            i.stage = InvasionStage::GroundCombat {
                queue,
                current: Some(gc),
            };
        }
        pending(state, first, DecisionKind::OfferReroll);
        return;
    }
    settle_ground_hits(state, registry, queue, gc, reroll, events);
}

fn settle_ground_hits(
    state: &mut GameState,
    registry: &CardRegistry,
    queue: Vec<PlanetId>,
    mut gc: GroundCombatState,
    reroll: RerollState,
    events: &mut Vec<Event>,
) {
    let attacker_hits = reroll
        .rolls
        .get(&gc.attacker)
        .map(|r| combat::count_hits(r))
        .unwrap_or(0);
    let defender_hits = reroll
        .rolls
        .get(&gc.defender)
        .map(|r| combat::count_hits(r))
        .unwrap_or(0);
    let mut remaining = BTreeMap::new();
    if attacker_hits > 0 {
        remaining.insert(gc.defender, attacker_hits);
    }
    if defender_hits > 0 {
        remaining.insert(gc.attacker, defender_hits);
    }
    if remaining.is_empty() {
        end_ground_combat_round(state, registry, queue, gc, events);
        return;
    }
    let assign = AssignState { remaining };
    let next = state
        .clockwise_from(gc.attacker)
        .into_iter()
        .find(|p| assign.remaining.contains_key(p))
        .unwrap_or(gc.attacker);
    let count = assign.remaining.get(&next).copied().unwrap_or(0);
    let planet = gc.planet;
    gc.stage = GroundCombatStage::AssignHits(assign);
    if let Ok(i) = invasion_mut(state) {
        i.stage = InvasionStage::GroundCombat {
            queue,
            current: Some(gc),
        };
    }
    pending(
        state,
        next,
        DecisionKind::AssignHits {
            count,
            context: HitContext::GroundCombat(planet),
        },
    );
}

fn end_ground_combat_round(
    state: &mut GameState,
    registry: &CardRegistry,
    queue: Vec<PlanetId>,
    mut gc: GroundCombatState,
    events: &mut Vec<Event>,
) {
    let attackers = !state.ground_forces_of(gc.attacker, gc.planet).is_empty();
    let defenders = !state.ground_forces_of(gc.defender, gc.planet).is_empty();
    if attackers && defenders {
        gc.round += 1;
        gc.stage = GroundCombatStage::AssignHits(AssignState {
            remaining: BTreeMap::new(),
        });
        if let Ok(i) = invasion_mut(state) {
            i.stage = InvasionStage::GroundCombat {
                queue,
                current: Some(gc),
            };
        }
        roll_ground_round(state, registry, events);
        return;
    }
    if let Ok(i) = invasion_mut(state) {
        i.stage = InvasionStage::GroundCombat {
            queue,
            current: None,
        };
    }
    advance_ground_combats(state, registry, events);
}

/// For each planet where only the active player has ground forces, gain
/// control (first-time control of a traited planet explores it).
fn establish_control(state: &mut GameState, registry: &CardRegistry, events: &mut Vec<Event>) {
    let active = state.active_player.unwrap_or_default();
    let Ok(invasion) = invasion_ref(state) else { return };
    let planets: Vec<PlanetId> = invasion.committed.keys().copied().collect();
    for planet_id in planets {
        let ours = !state.ground_forces_of(active, planet_id).is_empty();
        let theirs = state
            .units_on_planet(planet_id)
            .any(|u| u.owner != active && u.unit_type.is_ground_force());
        if ours && !theirs {
            let _ = state.gain_control(active, planet_id, events);
            crate::exploration::explore_on_first_control(state, registry, active, planet_id, events);
        }
    }
    begin_production(state, registry, events);
}

// ============================================================================
// Step 5 — Production
// ============================================================================

fn begin_production(state: &mut GameState, _registry: &CardRegistry, events: &mut Vec<Event>) {
    let active = state.active_player.unwrap_or_default();
    debug!(player = %active, "tactical action: production");
    if let Ok(t) = tactical_mut(state) {
        t.step = TacticalStep::Production;
    }
    pending(state, active, DecisionKind::Produce);
    let _ = events;
}

pub fn handle_produce(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    orders: &[ProductionOrder],
    spend: &Spend,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let system = tactical_ref(state)?.system;
    if tactical_ref(state)?.step != TacticalStep::Production {
        return Err(Rejection::invalid("wrong_step", "not at the production step"));
    }

    if !orders.is_empty() {
        produce_in_system(state, registry, player, system, orders, spend, events)?;
    }

    finish_tactical_action(state, events);
    Ok(())
}

/// Shared production routine (tactical step 5 and the Warfare secondary).
pub fn produce_in_system(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    system: SystemId,
    orders: &[ProductionOrder],
    spend: &Spend,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let mut total_units: u16 = 0;
    let mut production_limit: u16 = 0;
    let mut cost_units: BTreeMap<UnitType, u16> = BTreeMap::new();
    let mut seen: std::collections::BTreeSet<UnitId> = std::collections::BTreeSet::new();

    for order in orders {
        let producer = state.unit(order.producer)?;
        if producer.owner != player {
            return Err(Rejection::invalid(
                "not_your_unit",
                format!("{} is not yours", order.producer),
            ));
        }
        let producer_system = match producer.location {
            UnitLocation::Space(s) => s,
            UnitLocation::OnPlanet(p) => state.planet(p)?.system,
            UnitLocation::Captured(_) => {
                return Err(Rejection::invalid("bad_producer", "captured units cannot produce"));
            }
        };
        if producer_system != system {
            return Err(Rejection::invalid(
                "producer_elsewhere",
                format!("{} is not in the system", order.producer),
            ));
        }
        if !seen.insert(order.producer) {
            return Err(Rejection::invalid(
                "duplicate_producer",
                format!("{} produces once", order.producer),
            ));
        }
        let stats = state.effective_stats(registry, order.producer);
        let Some(production) = stats.production else {
            return Err(Rejection::rules(
                "no_production",
                format!("{} has no production", order.producer),
            ));
        };
        let value = match production {
            Production::Fixed(n) => u16::from(n),
            Production::PlanetValuePlus(bonus) => {
                let planet_value = match producer.location {
                    UnitLocation::OnPlanet(p) => u16::from(state.planet(p)?.resource_value()),
                    _ => 0,
                };
                planet_value + u16::from(bonus)
            }
        };
        production_limit += value;

        for build in &order.build {
            if build.unit_type.is_structure() {
                return Err(Rejection::rules(
                    "structures_not_produced",
                    "structures are placed by Construction, not produced",
                ));
            }
            // Ground forces land on the producing dock's planet or in the
            // space area; ships always go to the space area.
            if let Some(on_planet) = build.on_planet {
                if !build.unit_type.is_ground_force() {
                    return Err(Rejection::invalid(
                        "ships_to_space",
                        "ships are placed in the space area",
                    ));
                }
                let UnitLocation::OnPlanet(dock_planet) = producer.location else {
                    return Err(Rejection::invalid(
                        "bad_placement",
                        "only a dock on a planet can land ground forces",
                    ));
                };
                if on_planet != dock_planet {
                    return Err(Rejection::invalid(
                        "bad_placement",
                        "ground forces land on the producing dock's planet",
                    ));
                }
            }
            total_units += 1;
            *cost_units.entry(build.unit_type).or_insert(0) += 1;
        }
    }

    if total_units > production_limit {
        return Err(Rejection::rules(
            "over_production",
            format!("{total_units} units exceed production {production_limit}"),
        ));
    }

    let mut cost: u16 = 0;
    for (unit_type, count) in &cost_units {
        let Some(unit_cost) = crate::unit::base_stats(
            *unit_type,
            state.player(player)?.tier(*unit_type),
        )
        .cost
        else {
            return Err(Rejection::rules(
                "no_cost",
                format!("{unit_type} cannot be produced"),
            ));
        };
        let per = u16::from(unit_cost.per_cost);
        let payments = count.div_ceil(per);
        cost += payments * u16::from(unit_cost.resources);
    }
    if cost > u16::from(u8::MAX) {
        return Err(Rejection::rules("over_production", "order too large"));
    }
    spend_resources(state, player, spend, cost as u8, events)?;

    let mut placed = 0u8;
    for order in orders {
        let producer_location = state.unit(order.producer)?.location;
        for build in &order.build {
            let location = match build.on_planet {
                Some(p) => UnitLocation::OnPlanet(p),
                None => match (build.unit_type.is_ground_force(), producer_location) {
                    // Undirected ground forces from a dock default to its
                    // planet (LRR 68.4 lets them go either place).
                    (true, UnitLocation::OnPlanet(p)) => UnitLocation::OnPlanet(p),
                    _ => UnitLocation::Space(system),
                },
            };
            let id = state.spawn_unit(player, build.unit_type, location)?;
            events.push(Event::public(EventKind::UnitPlaced {
                unit: id,
                owner: player,
                unit_type: build.unit_type,
            }));
            placed += 1;
        }
    }
    if placed > 0 {
        events.push(Event::public(EventKind::UnitsProduced {
            player,
            system,
            count: placed,
        }));
    }

    // Fleet pool and capacity are hard limits at the end of production.
    if state.fleet_pool_excess(registry, player, system) > 0 {
        return Err(Rejection::rules(
            "fleet_pool",
            "production would exceed the fleet pool",
        ));
    }
    if state.capacity_excess(registry, player, system) > 0 {
        return Err(Rejection::rules(
            "over_capacity",
            "production would exceed ship capacity",
        ));
    }
    Ok(())
}

/// Tear down tactical sub-state; the engine then ends the turn.
fn finish_tactical_action(state: &mut GameState, events: &mut Vec<Event>) {
    debug!("tactical action complete");
    state.expire_transients(ModUntil::EndOfTacticalAction);
    state.active_system = None;
    if let GamePhase::Action(a) = &mut state.phase {
        a.tactical = None;
    }
    state.pending = None;
    let _ = events;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::galaxy::{HexCoord, SystemTile};
    use crate::state::ActionPhaseState;
    use crate::types::{Faction, PlayerColor, TileBack};

    fn fixture() -> (GameState, CardRegistry, PlayerId, SystemId) {
        let mut state = GameState::bare(31, 10);
        let registry = CardRegistry::new();
        let p = PlayerId::from_index(0);
        state.players.insert(
            p,
            crate::player::Player::new(
                p,
                Faction::FederationOfSol,
                PlayerColor::Blue,
                SystemId::from_raw(1),
            ),
        );
        let system = SystemId::from_raw(2);
        state.galaxy.place(
            SystemTile::new(SystemId::from_raw(1), TileBack::Green),
            HexCoord::new(0, 0),
        );
        state
            .galaxy
            .place(SystemTile::new(system, TileBack::Blue), HexCoord::new(1, 0));
        state.phase = GamePhase::Action(ActionPhaseState::default());
        state.active_player = Some(p);
        (state, registry, p, system)
    }

    #[test]
    fn test_activation_spends_a_tactic_token() {
        let (mut state, _registry, p, system) = fixture();
        let mut events = Vec::new();
        activate(&mut state, p, system, &mut events).unwrap();
        assert_eq!(state.players[&p].command.tactic, 2);
        assert_eq!(state.active_system, Some(system));
        assert!(state.command_tokens_on_board[&system].contains(&p));
    }

    #[test]
    fn test_reactivation_is_rejected() {
        let (mut state, _registry, p, system) = fixture();
        let mut events = Vec::new();
        activate(&mut state, p, system, &mut events).unwrap();
        // Reset the pipeline as if a new turn had begun.
        if let GamePhase::Action(a) = &mut state.phase {
            a.tactical = None;
        }
        let err = activate(&mut state, p, system, &mut events).unwrap_err();
        assert_eq!(err.code(), "already_activated");
    }

    #[test]
    fn test_empty_tactic_pool_blocks_activation() {
        let (mut state, _registry, p, system) = fixture();
        state.players.get_mut(&p).unwrap().command.tactic = 0;
        let mut events = Vec::new();
        let err = activate(&mut state, p, system, &mut events).unwrap_err();
        assert_eq!(err.code(), "no_tactic_token");
    }

    #[test]
    fn test_production_rejects_structures() {
        let (mut state, registry, p, system) = fixture();
        let mut events = Vec::new();
        activate(&mut state, p, system, &mut events).unwrap();
        // Put a dock on a planet in the system.
        let planet = crate::ids::PlanetId::from_raw(7);
        let mut pl = crate::planet::Planet::new(planet, "Quann", system).with_values(2, 1);
        pl.controller = Some(p);
        state.planets.insert(planet, pl);
        state
            .galaxy
            .system_mut(system)
            .unwrap()
            .planets
            .push(planet);
        let dock = state
            .spawn_unit(p, UnitType::SpaceDock, UnitLocation::OnPlanet(planet))
            .unwrap();
        if let Ok(t) = tactical_mut(&mut state) {
            t.step = TacticalStep::Production;
        }
        let err = handle_produce(
            &mut state,
            &registry,
            p,
            &[ProductionOrder {
                producer: dock,
                build: vec![crate::intent::BuildOrder {
                    unit_type: UnitType::Pds,
                    on_planet: None,
                }],
            }],
            &Spend::default(),
            &mut events,
        )
        .unwrap_err();
        assert_eq!(err.code(), "structures_not_produced");
    }

    #[test]
    fn test_production_pays_and_places() {
        let (mut state, registry, p, system) = fixture();
        let mut events = Vec::new();
        activate(&mut state, p, system, &mut events).unwrap();
        let planet = crate::ids::PlanetId::from_raw(7);
        let mut pl = crate::planet::Planet::new(planet, "Quann", system).with_values(2, 1);
        pl.controller = Some(p);
        state.planets.insert(planet, pl);
        state
            .galaxy
            .system_mut(system)
            .unwrap()
            .planets
            .push(planet);
        let dock = state
            .spawn_unit(p, UnitType::SpaceDock, UnitLocation::OnPlanet(planet))
            .unwrap();
        if let Ok(t) = tactical_mut(&mut state) {
            t.step = TacticalStep::Production;
        }
        state.players.get_mut(&p).unwrap().trade_goods = 1;
        // Two infantry for one trade good (dual icon), landing on the
        // dock's planet.
        handle_produce(
            &mut state,
            &registry,
            p,
            &[ProductionOrder {
                producer: dock,
                build: vec![
                    crate::intent::BuildOrder {
                        unit_type: UnitType::Infantry,
                        on_planet: Some(planet),
                    },
                    crate::intent::BuildOrder {
                        unit_type: UnitType::Infantry,
                        on_planet: Some(planet),
                    },
                ],
            }],
            &Spend {
                planets: Vec::new(),
                trade_goods: 1,
            },
            &mut events,
        )
        .unwrap();
        assert_eq!(state.players[&p].trade_goods, 0);
        let infantry = state
            .units_on_planet(planet)
            .filter(|u| u.unit_type == UnitType::Infantry)
            .count();
        assert_eq!(infantry, 2);
        // Action finished.
        assert!(state.active_system.is_none());
    }
}
