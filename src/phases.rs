//! The round loop: strategy phase, action-phase turn order, status phase,
//! and the hand-off into the agenda phase once the custodians token is gone.

use crate::card::{ObjectiveTiming, StrategyCard};
use crate::event::{Event, EventKind};
use crate::executor::draw_action_cards;
use crate::ids::{CardId, PlayerId};
use crate::intent::{DecisionKind, PendingDecision, Rejection};
use crate::player::StrategyHolding;
use crate::registry::CardRegistry;
use crate::state::{
    ActionPhaseState, GamePhase, GameState, ModUntil, StatusPhaseState, StatusStep,
    StrategyPhaseState, WindowResume,
};
use crate::window;

fn pending(state: &mut GameState, player: PlayerId, kind: DecisionKind) {
    state.pending = Some(PendingDecision { player, kind });
}

// ============================================================================
// Strategy phase
// ============================================================================

/// Start a round: speaker order picks strategy cards, twice around in 3- and
/// 4-player games.
pub fn begin_round(state: &mut GameState, events: &mut Vec<Event>) {
    state.round += 1;
    state.destroyed_enemy_unit.clear();
    let seats = state.clockwise_from(state.speaker);
    let picks = if seats.len() <= 4 { 2 } else { 1 };
    let mut queue = Vec::new();
    for _ in 0..picks {
        queue.extend(seats.iter().copied());
    }
    state.phase = GamePhase::Strategy(StrategyPhaseState { queue, cursor: 0 });
    events.push(Event::public(EventKind::PhaseChanged {
        phase: "strategy".to_string(),
        round: state.round,
    }));
    let first = state.speaker;
    pending(state, first, DecisionKind::ChooseStrategyCard);
}

pub fn handle_choose_strategy(
    state: &mut GameState,
    player: PlayerId,
    card: StrategyCard,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let GamePhase::Strategy(sp) = &state.phase else {
        return Err(Rejection::invalid("wrong_phase", "not the strategy phase"));
    };
    let sp = sp.clone();
    if sp.queue.get(sp.cursor) != Some(&player) {
        return Err(Rejection::invalid("not_your_pick", "not your pick"));
    }
    let Some(bonus) = state.strategy_pool.remove(&card) else {
        return Err(Rejection::invalid(
            "card_taken",
            format!("{} is no longer available", card.name()),
        ));
    };
    if bonus > 0 {
        if let Ok(p) = state.player_mut(player) {
            p.trade_goods += bonus;
            let total = p.trade_goods;
            events.push(Event::public(EventKind::TradeGoodsGained {
                player,
                count: bonus,
                total,
            }));
        }
    }
    if let Ok(p) = state.player_mut(player) {
        p.strategy_cards.push(StrategyHolding {
            card,
            exhausted: false,
        });
    }
    events.push(Event::public(EventKind::StrategyCardChosen {
        player,
        initiative: card.initiative(),
        name: card.name().to_string(),
    }));

    let cursor = sp.cursor + 1;
    if cursor < sp.queue.len() {
        let next = sp.queue[cursor];
        state.phase = GamePhase::Strategy(StrategyPhaseState {
            queue: sp.queue,
            cursor,
        });
        pending(state, next, DecisionKind::ChooseStrategyCard);
        return Ok(());
    }
    begin_action_phase(state, events);
    Ok(())
}

fn begin_action_phase(state: &mut GameState, events: &mut Vec<Event>) {
    // Unchosen cards accumulate a trade good for next round.
    for (card, tg) in state.strategy_pool.iter_mut() {
        *tg += 1;
        events.push(Event::public(EventKind::StrategyCardGainedTradeGood {
            initiative: card.initiative(),
            total: *tg,
        }));
    }
    state.turn_order = state.initiative_order();
    state.turn_cursor = 0;
    for p in state.players.values_mut() {
        p.passed = false;
    }
    state.phase = GamePhase::Action(ActionPhaseState::default());
    events.push(Event::public(EventKind::PhaseChanged {
        phase: "action".to_string(),
        round: state.round,
    }));
    begin_turn(state, events);
}

// ============================================================================
// Action phase turns
// ============================================================================

pub fn begin_turn(state: &mut GameState, events: &mut Vec<Event>) {
    let Some(&player) = state.turn_order.get(state.turn_cursor) else {
        return;
    };
    state.active_player = Some(player);
    state.transacted_this_turn.clear();
    events.push(Event::public(EventKind::TurnBegan { player }));
    pending(state, player, DecisionKind::TakeTurn);
}

pub fn handle_pass(
    state: &mut GameState,
    player: PlayerId,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    {
        let p = state.player(player)?;
        if p.passed {
            return Err(Rejection::invalid("already_passed", "you have already passed"));
        }
        if !p.all_strategy_cards_exhausted() {
            return Err(Rejection::rules(
                "strategic_action_due",
                "you cannot pass before performing your strategic action",
            ));
        }
    }
    if let Ok(p) = state.player_mut(player) {
        p.passed = true;
    }
    events.push(Event::public(EventKind::PlayerPassed { player }));
    advance_turn(state, events);
    Ok(())
}

/// Called when an action fully resolves; ends the active player's turn.
pub fn end_of_action_turn(
    state: &mut GameState,
    registry: &CardRegistry,
    events: &mut Vec<Event>,
) {
    let Some(player) = state.active_player else {
        advance_turn(state, events);
        return;
    };
    let opened = window::open_window(
        state,
        registry,
        crate::ability::WindowKind::EndOfTurn,
        player,
        WindowResume::AdvanceTurn,
        events,
    );
    if !opened {
        advance_turn(state, events);
    }
}

pub fn advance_turn(state: &mut GameState, events: &mut Vec<Event>) {
    state.expire_transients(ModUntil::EndOfTurn);
    state.transacted_this_turn.clear();
    let order = state.turn_order.clone();
    if order.is_empty() {
        return;
    }
    let everyone_passed = order
        .iter()
        .all(|p| state.players.get(p).is_none_or(|pl| pl.passed || pl.eliminated));
    if everyone_passed {
        begin_status_phase(state, events);
        return;
    }
    // Next unpassed player in initiative order, wrapping.
    let len = order.len();
    let mut cursor = state.turn_cursor;
    loop {
        cursor = (cursor + 1) % len;
        let candidate = order[cursor];
        let ready = state
            .players
            .get(&candidate)
            .is_some_and(|p| !p.passed && !p.eliminated);
        if ready {
            state.turn_cursor = cursor;
            begin_turn(state, events);
            return;
        }
    }
}

// ============================================================================
// Status phase
// ============================================================================

pub fn begin_status_phase(state: &mut GameState, events: &mut Vec<Event>) {
    state.active_player = None;
    let queue = state.initiative_order();
    state.phase = GamePhase::Status(StatusPhaseState {
        step: StatusStep::Scoring {
            queue: queue.clone(),
            cursor: 0,
            scored_public: Default::default(),
            scored_secret: Default::default(),
        },
    });
    events.push(Event::public(EventKind::PhaseChanged {
        phase: "status".to_string(),
        round: state.round,
    }));
    if let Some(&first) = queue.first() {
        pending(state, first, DecisionKind::ScoreObjectives);
    }
}

fn scoring_step_mut(state: &mut GameState) -> Result<&mut StatusStep, Rejection> {
    match &mut state.phase {
        GamePhase::Status(s) => Ok(&mut s.step),
        _ => Err(Rejection::invalid("wrong_phase", "not the status phase")),
    }
}

/// Score during the status-phase scoring step: up to one public and one
/// secret per player, in initiative order.
pub fn handle_status_score(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    objective: CardId,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let (my_window, public_done, secret_done) = match &state.phase {
        GamePhase::Status(s) => match &s.step {
            StatusStep::Scoring {
                queue,
                cursor,
                scored_public,
                scored_secret,
            } => (
                queue.get(*cursor) == Some(&player),
                scored_public.contains(&player),
                scored_secret.contains(&player),
            ),
            _ => return Err(Rejection::invalid("wrong_step", "scoring is over")),
        },
        _ => return Err(Rejection::invalid("wrong_phase", "not the status phase")),
    };
    if !my_window {
        return Err(Rejection::invalid("not_your_turn", "not your scoring window"));
    }
    if state.revealed_objectives().contains(&objective) {
        if public_done {
            return Err(Rejection::rules(
                "public_already_scored",
                "one public objective per status phase",
            ));
        }
        score_public(state, registry, player, objective, events)?;
        if let Ok(StatusStep::Scoring { scored_public, .. }) = scoring_step_mut(state) {
            scored_public.insert(player);
        }
    } else {
        if secret_done {
            return Err(Rejection::rules(
                "secret_already_scored",
                "one secret objective per status phase",
            ));
        }
        score_secret(
            state,
            registry,
            player,
            objective,
            ObjectiveTiming::StatusPhase,
            events,
        )?;
        if let Ok(StatusStep::Scoring { scored_secret, .. }) = scoring_step_mut(state) {
            scored_secret.insert(player);
        }
    }
    Ok(())
}

pub fn score_public(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    objective: CardId,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    if !state.revealed_objectives().contains(&objective) {
        return Err(Rejection::invalid(
            "not_revealed",
            "that objective is not revealed",
        ));
    }
    let def = registry
        .get(objective)
        .and_then(|d| d.as_objective())
        .ok_or_else(|| Rejection::invalid("not_an_objective", "not an objective card"))?;
    let points = def.points;
    {
        let p = state.player(player)?;
        if p.scored_public.contains(&objective) {
            return Err(Rejection::rules("already_scored", "already scored by you"));
        }
    }
    if !state.objective_met(registry, player, objective) {
        return Err(Rejection::rules(
            "condition_unmet",
            "you do not fulfill that objective",
        ));
    }
    if let Ok(p) = state.player_mut(player) {
        p.scored_public.push(objective);
    }
    events.push(Event::public(EventKind::ObjectiveScored {
        player,
        card: objective,
    }));
    state.award_vp(player, points, events);
    Ok(())
}

pub fn score_secret(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    objective: CardId,
    timing: ObjectiveTiming,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let def = registry
        .get(objective)
        .and_then(|d| d.as_objective())
        .ok_or_else(|| Rejection::invalid("not_an_objective", "not an objective card"))?;
    if def.timing != timing {
        return Err(Rejection::rules(
            "wrong_timing",
            "that secret cannot be scored now",
        ));
    }
    let points = def.points;
    {
        let p = state.player(player)?;
        if !p.secret_hand.contains(&objective) {
            return Err(Rejection::invalid("not_in_hand", "that secret is not yours"));
        }
    }
    if !state.objective_met(registry, player, objective) {
        return Err(Rejection::rules(
            "condition_unmet",
            "you do not fulfill that objective",
        ));
    }
    if let Ok(p) = state.player_mut(player) {
        p.remove_secret(objective);
        p.scored_secrets.push(objective);
    }
    events.push(Event::public(EventKind::ObjectiveScored {
        player,
        card: objective,
    }));
    state.award_vp(player, points, events);
    Ok(())
}

/// Pass out of the scoring window; the last pass rolls the bookkeeping steps
/// forward to token redistribution.
pub fn handle_status_pass(
    state: &mut GameState,
    player: PlayerId,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let StatusStep::Scoring { queue, cursor, .. } = scoring_step_mut(state)? else {
        return Err(Rejection::invalid("wrong_step", "nothing to pass"));
    };
    if queue.get(*cursor) != Some(&player) {
        return Err(Rejection::invalid("not_your_turn", "not your scoring window"));
    }
    *cursor += 1;
    let done = *cursor >= queue.len();
    if done {
        status_bookkeeping(state, events);
    } else {
        let StatusStep::Scoring { queue, cursor, .. } = scoring_step_mut(state)? else {
            return Ok(());
        };
        let next = queue[*cursor];
        pending(state, next, DecisionKind::ScoreObjectives);
    }
    Ok(())
}

/// Steps 2-5: reveal, draw, pull tokens off the board, hand out the 2-token
/// gain with redistribution.
fn status_bookkeeping(state: &mut GameState, events: &mut Vec<Event>) {
    state.reveal_next_objective(events);

    for player in state.initiative_order() {
        draw_action_cards(state, player, 1, events);
    }

    let board: Vec<(crate::ids::SystemId, PlayerId)> = state
        .command_tokens_on_board
        .iter()
        .flat_map(|(&s, players)| players.iter().map(move |&p| (s, p)))
        .collect();
    for (system, player) in board {
        if let Ok(p) = state.player_mut(player) {
            p.token_reinforcements += 1;
        }
        events.push(Event::public(EventKind::CommandTokenReturned {
            player,
            system,
        }));
    }
    state.command_tokens_on_board.clear();

    let queue = state.initiative_order();
    if let GamePhase::Status(s) = &mut state.phase {
        s.step = StatusStep::Redistribute {
            queue: queue.clone(),
            cursor: 0,
        };
    }
    if let Some(&first) = queue.first() {
        let gained = state
            .players
            .get(&first)
            .map(|p| p.token_reinforcements.min(2))
            .unwrap_or(0);
        pending(state, first, DecisionKind::RedistributeTokens { gained });
    }
}

/// Each player restates their full pool split after gaining 2 tokens.
pub fn handle_redistribute(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    tactic: u8,
    fleet: u8,
    strategy: u8,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let GamePhase::Status(s) = &state.phase else {
        return Err(Rejection::invalid("wrong_phase", "not the status phase"));
    };
    let StatusStep::Redistribute { queue, cursor } = &s.step else {
        return Err(Rejection::invalid("wrong_step", "not redistributing"));
    };
    let (queue, cursor) = (queue.clone(), *cursor);
    if queue.get(cursor) != Some(&player) {
        return Err(Rejection::invalid("not_your_turn", "not your redistribution"));
    }
    let (current, gained) = {
        let p = state.player(player)?;
        (p.command.total(), p.token_reinforcements.min(2))
    };
    if tactic + fleet + strategy != current + gained {
        return Err(Rejection::invalid(
            "token_mismatch",
            format!("distribute exactly {} tokens", current + gained),
        ));
    }
    if let Ok(p) = state.player_mut(player) {
        p.token_reinforcements -= gained;
        p.command.tactic = tactic;
        p.command.fleet = fleet;
        p.command.strategy = strategy;
    }
    events.push(Event::public(EventKind::CommandTokensGained {
        player,
        pool: crate::player::CommandPool::Tactic,
        count: gained,
    }));

    let cursor = cursor + 1;
    if cursor < queue.len() {
        let next = queue[cursor];
        if let GamePhase::Status(s) = &mut state.phase {
            s.step = StatusStep::Redistribute {
                queue: queue.clone(),
                cursor,
            };
        }
        let gained = state
            .players
            .get(&next)
            .map(|p| p.token_reinforcements.min(2))
            .unwrap_or(0);
        pending(state, next, DecisionKind::RedistributeTokens { gained });
        return Ok(());
    }
    status_ready_repair(state, registry, events);
    Ok(())
}

/// Steps 6-7 plus the hand-limit check, then return of strategy cards.
fn status_ready_repair(state: &mut GameState, registry: &CardRegistry, events: &mut Vec<Event>) {
    let planet_ids: Vec<_> = state.planets.keys().copied().collect();
    for id in planet_ids {
        if let Some(p) = state.planets.get_mut(&id) {
            if p.exhausted {
                p.ready();
                events.push(Event::public(EventKind::PlanetReadied { planet: id }));
            }
        }
    }
    for p in state.players.values_mut() {
        for holding in &mut p.strategy_cards {
            holding.exhausted = false;
        }
        if p.leaders.agent == crate::player::LeaderState::Exhausted {
            p.leaders.agent = crate::player::LeaderState::Readied;
        }
    }
    let damaged: Vec<_> = state
        .units
        .values()
        .filter(|u| u.damaged)
        .map(|u| u.id)
        .collect();
    for id in damaged {
        if let Some(u) = state.units.get_mut(&id) {
            u.damaged = false;
        }
        events.push(Event::public(EventKind::UnitRepaired { unit: id }));
    }

    let over_limit: Vec<PlayerId> = state
        .initiative_order()
        .into_iter()
        .filter(|p| {
            state
                .players
                .get(p)
                .is_some_and(|pl| pl.action_cards.len() > 7)
        })
        .collect();
    if let Some(&first) = over_limit.first() {
        let excess = state
            .players
            .get(&first)
            .map(|p| (p.action_cards.len() - 7) as u8)
            .unwrap_or(0);
        if let GamePhase::Status(s) = &mut state.phase {
            s.step = StatusStep::HandLimit {
                queue: over_limit.clone(),
                cursor: 0,
            };
        }
        pending(state, first, DecisionKind::DiscardToHandLimit { excess });
        return;
    }
    finish_status(state, registry, events);
}

pub fn handle_discard_excess(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    cards: &[CardId],
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let GamePhase::Status(s) = &state.phase else {
        return Err(Rejection::invalid("wrong_phase", "not the status phase"));
    };
    let StatusStep::HandLimit { queue, cursor } = &s.step else {
        return Err(Rejection::invalid("wrong_step", "no discard required"));
    };
    let (queue, cursor) = (queue.clone(), *cursor);
    if queue.get(cursor) != Some(&player) {
        return Err(Rejection::invalid("not_your_turn", "not your discard"));
    }
    let hand_size = state.player(player)?.action_cards.len();
    let excess = hand_size.saturating_sub(7);
    if cards.len() != excess {
        return Err(Rejection::invalid(
            "wrong_discard_count",
            format!("discard exactly {excess} cards"),
        ));
    }
    for &card in cards {
        let held = state.player(player)?.action_cards.contains(&card);
        if !held {
            return Err(Rejection::invalid("not_in_hand", format!("{card} is not in hand")));
        }
    }
    for &card in cards {
        if let Ok(p) = state.player_mut(player) {
            p.remove_action_card(card);
        }
        state.decks.action.discard(card);
        events.push(Event::public(EventKind::CardDiscarded { player, card }));
    }
    let cursor = cursor + 1;
    if cursor < queue.len() {
        let next = queue[cursor];
        let excess = state
            .players
            .get(&next)
            .map(|p| (p.action_cards.len().saturating_sub(7)) as u8)
            .unwrap_or(0);
        if let GamePhase::Status(s) = &mut state.phase {
            s.step = StatusStep::HandLimit { queue, cursor };
        }
        pending(state, next, DecisionKind::DiscardToHandLimit { excess });
        return Ok(());
    }
    finish_status(state, registry, events);
    Ok(())
}

/// Step 8: strategy cards return to the common area; then the agenda phase
/// if the custodians token is gone, otherwise the next round.
fn finish_status(state: &mut GameState, registry: &CardRegistry, events: &mut Vec<Event>) {
    let mut returned = Vec::new();
    for p in state.players.values_mut() {
        for holding in p.strategy_cards.drain(..) {
            returned.push(holding.card);
        }
    }
    for card in returned {
        state.strategy_pool.entry(card).or_insert(0);
    }
    state.pending = None;
    if state.custodians_on_mecatol {
        begin_round(state, events);
    } else {
        crate::agenda::begin_agenda_phase(state, registry, events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SystemId;
    use crate::types::{Faction, PlayerColor};

    fn three_player_state() -> GameState {
        let mut state = GameState::bare(71, 10);
        for i in 0..3 {
            let id = PlayerId::from_index(i);
            state.players.insert(
                id,
                crate::player::Player::new(
                    id,
                    Faction::XxchaKingdom,
                    PlayerColor::Green,
                    SystemId::from_raw(1),
                ),
            );
        }
        state
    }

    #[test]
    fn test_three_player_game_picks_twice() {
        let mut state = three_player_state();
        let mut events = Vec::new();
        begin_round(&mut state, &mut events);
        let GamePhase::Strategy(sp) = &state.phase else {
            panic!("expected strategy phase");
        };
        assert_eq!(sp.queue.len(), 6);
        assert_eq!(sp.queue[0], state.speaker);
    }

    #[test]
    fn test_strategy_pick_sets_initiative() {
        let mut state = three_player_state();
        let mut events = Vec::new();
        begin_round(&mut state, &mut events);
        let order: Vec<PlayerId> = {
            let GamePhase::Strategy(sp) = &state.phase else {
                panic!();
            };
            sp.queue.clone()
        };
        let picks = [
            StrategyCard::Warfare,
            StrategyCard::Leadership,
            StrategyCard::Imperial,
            StrategyCard::Trade,
            StrategyCard::Diplomacy,
            StrategyCard::Politics,
        ];
        for (player, card) in order.iter().zip(picks) {
            handle_choose_strategy(&mut state, *player, card, &mut events).unwrap();
        }
        // Second player holds Leadership (initiative 1) and goes first.
        assert_eq!(state.turn_order.first(), Some(&order[1]));
        assert!(matches!(state.phase, GamePhase::Action(_)));
    }

    #[test]
    fn test_taken_card_cannot_be_picked_again() {
        let mut state = three_player_state();
        let mut events = Vec::new();
        begin_round(&mut state, &mut events);
        let first = state.speaker;
        handle_choose_strategy(&mut state, first, StrategyCard::Trade, &mut events).unwrap();
        let second = state
            .pending
            .as_ref()
            .map(|p| p.player)
            .expect("second pick pending");
        let err =
            handle_choose_strategy(&mut state, second, StrategyCard::Trade, &mut events)
                .unwrap_err();
        assert_eq!(err.code(), "card_taken");
    }

    #[test]
    fn test_pass_requires_exhausted_strategy_cards() {
        let mut state = three_player_state();
        let p0 = PlayerId::from_index(0);
        state
            .players
            .get_mut(&p0)
            .unwrap()
            .strategy_cards
            .push(StrategyHolding {
                card: StrategyCard::Warfare,
                exhausted: false,
            });
        let mut events = Vec::new();
        let err = handle_pass(&mut state, p0, &mut events).unwrap_err();
        assert_eq!(err.code(), "strategic_action_due");
    }
}
