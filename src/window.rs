//! The timing-window engine.
//!
//! Entering a window gathers every ability whose timing matches and whose
//! condition holds. Mandatory abilities resolve first, clockwise from the
//! starting player; optional abilities are then offered in the same order,
//! one at a time. After any ability resolves, eligibility is re-evaluated.
//! The window closes only after a full clockwise round of passes with no
//! ability played.

use crate::ability::{AbilityCost, AbilityDef, AbilitySource, Condition, WindowKind};
use crate::card::CardKind;
use crate::event::{Event, EventKind};
use crate::ids::PlayerId;
use crate::intent::{AbilityChoice, ChosenTargets, DecisionKind, PendingDecision, Rejection};
use crate::player::LeaderState;
use crate::registry::CardRegistry;
use crate::state::{GamePhase, GameState, QueuedAbility, TacticalStep, WindowResume, WindowState};

/// One ability a player could use in the current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleAbility {
    pub source: AbilitySource,
    pub def: AbilityDef,
}

/// What `handle` calls report back so the engine can resume the interrupted
/// flow when the window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    StillOpen,
    Closed(WindowResume),
}

pub fn condition_holds(state: &GameState, player: PlayerId, condition: Condition) -> bool {
    let in_combat = |as_defender: Option<bool>| -> bool {
        let GamePhase::Action(a) = &state.phase else {
            return false;
        };
        let Some(tactical) = &a.tactical else {
            return false;
        };
        match &tactical.step {
            TacticalStep::SpaceCombat(c) => match as_defender {
                None => c.attacker == player || c.defender == player,
                Some(true) => c.defender == player,
                Some(false) => c.attacker == player,
            },
            _ => false,
        }
    };
    match condition {
        Condition::Always => true,
        Condition::OwnerIsActivePlayer => state.active_player == Some(player),
        Condition::OwnerIsNotActivePlayer => state.active_player != Some(player),
        Condition::OwnerInCombat => in_combat(None),
        Condition::OwnerIsDefender => in_combat(Some(true)),
    }
}

pub fn cost_payable(state: &GameState, player: PlayerId, cost: Option<AbilityCost>) -> bool {
    let Some(cost) = cost else { return true };
    let Ok(p) = state.player(player) else {
        return false;
    };
    match cost {
        AbilityCost::SpendTradeGoods(n) => p.trade_goods >= n,
        AbilityCost::SpendStrategyToken => p.command.strategy > 0,
        AbilityCost::ExhaustAgent => p.leaders.agent == LeaderState::Readied,
        AbilityCost::PurgeSelf => true,
    }
}

/// All abilities `player` could use in `kind` right now.
pub fn eligible_abilities(
    state: &GameState,
    registry: &CardRegistry,
    kind: WindowKind,
    player: PlayerId,
) -> Vec<EligibleAbility> {
    let Ok(p) = state.player(player) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for &card in &p.action_cards {
        if state.is_purged(card) {
            continue;
        }
        if let Some(def) = registry.get(card).and_then(|d| d.as_action()) {
            if def.window == kind
                && condition_holds(state, player, def.condition)
                && cost_payable(state, player, def.cost)
            {
                out.push(EligibleAbility {
                    source: AbilitySource::ActionCard(card),
                    def: def.clone(),
                });
            }
        }
    }
    for &card in &p.promissory_hand {
        // A note is playable only by a holder who is not its owner.
        if state.promissory_owner.get(&card) == Some(&player) || state.is_purged(card) {
            continue;
        }
        if let Some(CardKind::Promissory(note)) = registry.get(card).map(|d| &d.kind) {
            let def = &note.ability;
            if def.window == kind
                && condition_holds(state, player, def.condition)
                && cost_payable(state, player, def.cost)
            {
                out.push(EligibleAbility {
                    source: AbilitySource::Promissory(card),
                    def: def.clone(),
                });
            }
        }
    }
    for &card in &p.relics {
        if state.is_purged(card) {
            continue;
        }
        if let Some(CardKind::Relic(relic)) = registry.get(card).map(|d| &d.kind) {
            let def = &relic.ability;
            if def.window == kind
                && condition_holds(state, player, def.condition)
                && cost_payable(state, player, def.cost)
            {
                out.push(EligibleAbility {
                    source: AbilitySource::Relic(card),
                    def: def.clone(),
                });
            }
        }
    }
    out
}

/// Enter a window. Mandatory abilities resolve immediately in clockwise
/// order; if any optional ability remains for anyone, the window stays open
/// with an offer pending and `true` is returned. Otherwise the window never
/// opens and the caller continues its flow directly.
pub fn open_window(
    state: &mut GameState,
    registry: &CardRegistry,
    kind: WindowKind,
    start: PlayerId,
    resume: WindowResume,
    events: &mut Vec<Event>,
) -> bool {
    let queue = state.clockwise_from(start);

    // Mandatory abilities first (LRR default order).
    for &player in &queue {
        loop {
            let mandatory = eligible_abilities(state, registry, kind, player)
                .into_iter()
                .find(|a| a.def.mandatory);
            let Some(ability) = mandatory else { break };
            resolve_ability(
                state,
                registry,
                player,
                ability.source,
                &ability.def,
                ChosenTargets::default(),
                events,
            );
        }
    }

    let any_optional = queue.iter().any(|&p| {
        eligible_abilities(state, registry, kind, p)
            .iter()
            .any(|a| !a.def.mandatory)
    });
    if !any_optional {
        return false;
    }

    let mut window = WindowState {
        kind,
        resume,
        queue,
        cursor: 0,
        consecutive_passes: 0,
        queued: None,
        played_names: Vec::new(),
    };
    position_on_next_offer(state, registry, &mut window);
    let player = window.queue[window.cursor % window.queue.len()];
    state.pending = Some(PendingDecision {
        player,
        kind: DecisionKind::OfferAbility { window: kind },
    });
    state.window = Some(window);
    true
}

/// Skip players with nothing to offer, counting them as implicit passes.
fn position_on_next_offer(state: &GameState, registry: &CardRegistry, window: &mut WindowState) {
    let len = window.queue.len();
    while window.consecutive_passes < len {
        let player = window.queue[window.cursor % len];
        let has_option = eligible_abilities(state, registry, window.kind, player)
            .iter()
            .any(|a| !a.def.mandatory);
        if has_option {
            return;
        }
        window.consecutive_passes += 1;
        window.cursor = (window.cursor + 1) % len;
    }
}

/// Handle a `ConfirmOptional` intent against the open window.
pub fn handle_confirm(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    choice: Option<AbilityChoice>,
    events: &mut Vec<Event>,
) -> Result<WindowOutcome, Rejection> {
    let Some(window) = state.window.clone() else {
        return Err(Rejection::invalid("no_window", "no timing window is open"));
    };

    // A queued cancellable ability routes responses to the cancel queue.
    if window.queued.is_some() {
        return handle_cancel_response(state, registry, player, choice, events);
    }

    let len = window.queue.len();
    let expected = window.queue[window.cursor % len];
    if player != expected {
        return Err(Rejection::invalid(
            "not_your_offer",
            format!("waiting on {expected}"),
        ));
    }

    match choice {
        None => {
            let mut window = window;
            window.consecutive_passes += 1;
            window.cursor = (window.cursor + 1) % len;
            position_on_next_offer(state, registry, &mut window);
            finish_or_reoffer(state, registry, window)
        }
        Some(choice) => {
            let eligible = eligible_abilities(state, registry, window.kind, player);
            let Some(ability) = eligible.into_iter().find(|a| a.source == choice.source) else {
                return Err(Rejection::invalid(
                    "not_eligible",
                    "that ability is not usable in this window",
                ));
            };
            if ability.def.mandatory {
                return Err(Rejection::invalid(
                    "mandatory_ability",
                    "mandatory abilities resolve automatically",
                ));
            }
            // One copy of a named card per window.
            if let AbilitySource::ActionCard(card) = choice.source {
                let name = registry.name_of(card);
                if window.played_names.iter().any(|n| n == name) {
                    return Err(Rejection::rules(
                        "duplicate_in_window",
                        format!("{name} was already played in this window"),
                    ));
                }
            }
            crate::executor::validate_targets(
                &ability.def.effect,
                &crate::executor::ExecutionContext::new(player, choice.targets.clone()),
            )?;

            let mut window = window;
            if let AbilitySource::ActionCard(card) = choice.source {
                window.played_names.push(registry.name_of(card).to_string());
            }

            if ability.def.cancellable {
                let cancel_queue = cancellers_against(state, registry, player);
                if !cancel_queue.is_empty() {
                    let first = cancel_queue[0];
                    let card = match choice.source {
                        AbilitySource::ActionCard(card) => card,
                        _ => {
                            return Err(Rejection::internal(
                                "cancellable_non_card",
                                "only action cards are cancellable",
                            ));
                        }
                    };
                    window.queued = Some(QueuedAbility {
                        owner: player,
                        source: choice.source,
                        targets: choice.targets,
                        cancel_queue,
                        cancel_cursor: 0,
                    });
                    state.window = Some(window);
                    state.pending = Some(PendingDecision {
                        player: first,
                        kind: DecisionKind::OfferCancel { card },
                    });
                    return Ok(WindowOutcome::StillOpen);
                }
            }

            resolve_ability(
                state,
                registry,
                player,
                choice.source,
                &ability.def,
                choice.targets,
                events,
            );
            window.consecutive_passes = 0;
            window.cursor = (window.cursor + 1) % len;
            position_on_next_offer(state, registry, &mut window);
            finish_or_reoffer(state, registry, window)
        }
    }
}

fn finish_or_reoffer(
    state: &mut GameState,
    _registry: &CardRegistry,
    window: WindowState,
) -> Result<WindowOutcome, Rejection> {
    let len = window.queue.len();
    if window.consecutive_passes >= len {
        let resume = window.resume;
        state.window = None;
        state.pending = None;
        return Ok(WindowOutcome::Closed(resume));
    }
    let player = window.queue[window.cursor % len];
    state.pending = Some(PendingDecision {
        player,
        kind: DecisionKind::OfferAbility {
            window: window.kind,
        },
    });
    state.window = Some(window);
    Ok(WindowOutcome::StillOpen)
}

/// Players (clockwise after `against`) who hold a canceller for an action
/// card being played.
pub fn cancellers_against(
    state: &GameState,
    registry: &CardRegistry,
    against: PlayerId,
) -> Vec<PlayerId> {
    state
        .clockwise_from(against)
        .into_iter()
        .filter(|&p| p != against)
        .filter(|&p| {
            state.player(p).is_ok_and(|pl| {
                pl.action_cards.iter().any(|&card| {
                    registry
                        .get(card)
                        .and_then(|d| d.as_action())
                        .is_some_and(|def| def.cancels)
                })
            })
        })
        .collect()
}

fn handle_cancel_response(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    choice: Option<AbilityChoice>,
    events: &mut Vec<Event>,
) -> Result<WindowOutcome, Rejection> {
    let Some(mut window) = state.window.clone() else {
        return Err(Rejection::invalid("no_window", "no timing window is open"));
    };
    let Some(queued) = window.queued.clone() else {
        return Err(Rejection::internal("no_queued", "no queued ability"));
    };
    let expected = queued.cancel_queue[queued.cancel_cursor];
    if player != expected {
        return Err(Rejection::invalid(
            "not_your_offer",
            format!("waiting on {expected}"),
        ));
    }

    if let Some(choice) = choice {
        // The canceller plays their own card; the queued ability fizzles.
        let AbilitySource::ActionCard(canceller_card) = choice.source else {
            return Err(Rejection::invalid("not_a_canceller", "choose a cancel card"));
        };
        let cancels = registry
            .get(canceller_card)
            .and_then(|d| d.as_action())
            .is_some_and(|d| d.cancels);
        if !cancels {
            return Err(Rejection::invalid("not_a_canceller", "that card cannot cancel"));
        }
        if !state.player(player)?.action_cards.contains(&canceller_card) {
            return Err(Rejection::invalid("card_not_held", "card not in hand"));
        }
        let cancelled_card = match queued.source {
            AbilitySource::ActionCard(card) => card,
            _ => {
                return Err(Rejection::internal(
                    "cancellable_non_card",
                    "only action cards are cancellable",
                ));
            }
        };
        // Both cards go to the discard; the cancelled ability has no effect.
        if let Ok(p) = state.player_mut(player) {
            p.remove_action_card(canceller_card);
        }
        state.decks.action.discard(canceller_card);
        if let Ok(p) = state.player_mut(queued.owner) {
            p.remove_action_card(cancelled_card);
        }
        state.decks.action.discard(cancelled_card);
        events.push(Event::public(EventKind::ActionCardCancelled {
            player: queued.owner,
            card: cancelled_card,
            cancelled_by: player,
        }));

        window.queued = None;
        window.consecutive_passes = 0;
        let len = window.queue.len();
        window.cursor = (window.cursor + 1) % len;
        position_on_next_offer(state, registry, &mut window);
        return finish_or_reoffer(state, registry, window);
    }

    // Declined: next canceller, or resolve.
    let mut queued = queued;
    queued.cancel_cursor += 1;
    if queued.cancel_cursor < queued.cancel_queue.len() {
        let next = queued.cancel_queue[queued.cancel_cursor];
        let card = match queued.source {
            AbilitySource::ActionCard(card) => card,
            _ => {
                return Err(Rejection::internal(
                    "cancellable_non_card",
                    "only action cards are cancellable",
                ));
            }
        };
        window.queued = Some(queued);
        state.window = Some(window);
        state.pending = Some(PendingDecision {
            player: next,
            kind: DecisionKind::OfferCancel { card },
        });
        return Ok(WindowOutcome::StillOpen);
    }

    let Some(def) = lookup_def(registry, queued.source) else {
        return Err(Rejection::internal("missing_def", "queued ability lost its definition"));
    };
    resolve_ability(
        state,
        registry,
        queued.owner,
        queued.source,
        &def,
        queued.targets.clone(),
        events,
    );
    window.queued = None;
    window.consecutive_passes = 0;
    let len = window.queue.len();
    window.cursor = (window.cursor + 1) % len;
    position_on_next_offer(state, registry, &mut window);
    finish_or_reoffer(state, registry, window)
}

pub fn lookup_def(registry: &CardRegistry, source: AbilitySource) -> Option<AbilityDef> {
    match source {
        AbilitySource::ActionCard(card) => registry.get(card)?.as_action().cloned(),
        AbilitySource::Promissory(card) => match &registry.get(card)?.kind {
            CardKind::Promissory(note) => Some(note.ability.clone()),
            _ => None,
        },
        AbilitySource::Relic(card) => match &registry.get(card)?.kind {
            CardKind::Relic(relic) => Some(relic.ability.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Pay the cost and run the script; moves the source card where it goes
/// after resolution (action cards to the discard, promissory notes back to
/// their owner, purging relics that purge).
pub fn resolve_ability(
    state: &mut GameState,
    registry: &CardRegistry,
    owner: PlayerId,
    source: AbilitySource,
    def: &AbilityDef,
    targets: ChosenTargets,
    events: &mut Vec<Event>,
) {
    if let Some(cost) = def.cost {
        match cost {
            AbilityCost::SpendTradeGoods(n) => {
                if let Ok(p) = state.player_mut(owner) {
                    p.trade_goods = p.trade_goods.saturating_sub(n);
                    events.push(Event::public(EventKind::TradeGoodsSpent {
                        player: owner,
                        count: n,
                    }));
                }
            }
            AbilityCost::SpendStrategyToken => {
                if let Ok(p) = state.player_mut(owner) {
                    if p.command.take(crate::player::CommandPool::Strategy) {
                        events.push(Event::public(EventKind::CommandTokenSpent {
                            player: owner,
                            pool: crate::player::CommandPool::Strategy,
                        }));
                    }
                }
            }
            AbilityCost::ExhaustAgent => {
                if let Ok(p) = state.player_mut(owner) {
                    p.leaders.agent = LeaderState::Exhausted;
                }
            }
            AbilityCost::PurgeSelf => {}
        }
    }

    match source {
        AbilitySource::ActionCard(card) => {
            if let Ok(p) = state.player_mut(owner) {
                p.remove_action_card(card);
            }
            events.push(Event::public(EventKind::ActionCardPlayed {
                player: owner,
                card,
            }));
        }
        AbilitySource::Promissory(card) => {
            if let Ok(p) = state.player_mut(owner) {
                p.remove_promissory(card);
            }
            events.push(Event::public(EventKind::PromissoryNotePlayed {
                player: owner,
                card,
            }));
        }
        _ => {}
    }

    let ctx = crate::executor::ExecutionContext::new(owner, targets);
    crate::executor::run_script(state, registry, &ctx, &def.effect, events);

    match source {
        AbilitySource::ActionCard(card) => {
            state.decks.action.discard(card);
        }
        AbilitySource::Promissory(card) => {
            if let Some(&note_owner) = state.promissory_owner.get(&card) {
                if let Ok(p) = state.player_mut(note_owner) {
                    p.promissory_hand.push(card);
                }
                events.push(Event::public(EventKind::PromissoryNoteReturned {
                    owner: note_owner,
                    card,
                }));
            }
        }
        AbilitySource::Relic(card) => {
            let purges = matches!(
                registry.get(card).map(|d| &d.kind),
                Some(CardKind::Relic(r)) if r.purge_after_use
            ) || def.cost == Some(AbilityCost::PurgeSelf);
            if purges {
                if let Ok(p) = state.player_mut(owner) {
                    p.relics.retain(|&c| c != card);
                }
                state.purge(card, events);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::AbilityDef;
    use crate::card::CardDefinition;
    use crate::effect::{Effect, PlayerSel};
    use crate::ids::{CardId, SystemId};
    use crate::types::{Faction, PlayerColor};

    fn two_player_state() -> GameState {
        let mut state = GameState::bare(3, 10);
        for i in 0..2 {
            let id = PlayerId::from_index(i);
            state.players.insert(
                id,
                crate::player::Player::new(
                    id,
                    Faction::FederationOfSol,
                    PlayerColor::Blue,
                    SystemId::from_raw(1),
                ),
            );
        }
        state
    }

    fn registry_with_card(def: AbilityDef) -> (CardRegistry, CardId) {
        let mut reg = CardRegistry::new();
        let id = CardId::from_raw(1);
        reg.register(CardDefinition {
            id,
            name: "Test Card",
            kind: CardKind::Action(def),
        });
        (reg, id)
    }

    #[test]
    fn test_window_with_no_eligible_abilities_never_opens() {
        let mut state = two_player_state();
        let registry = CardRegistry::new();
        let mut events = Vec::new();
        let opened = open_window(
            &mut state,
            &registry,
            WindowKind::StartOfCombat,
            PlayerId::from_index(0),
            WindowResume::CombatRounds,
            &mut events,
        );
        assert!(!opened);
        assert!(state.window.is_none());
    }

    #[test]
    fn test_declining_closes_after_full_round() {
        let mut state = two_player_state();
        let (registry, card) = registry_with_card(AbilityDef::new(
            WindowKind::StartOfCombat,
            vec![Effect::GainTradeGoods {
                who: PlayerSel::Owner,
                n: 1,
            }],
        ));
        state
            .players
            .get_mut(&PlayerId::from_index(0))
            .unwrap()
            .action_cards
            .push(card);
        let mut events = Vec::new();
        assert!(open_window(
            &mut state,
            &registry,
            WindowKind::StartOfCombat,
            PlayerId::from_index(0),
            WindowResume::CombatRounds,
            &mut events,
        ));
        let outcome = handle_confirm(
            &mut state,
            &registry,
            PlayerId::from_index(0),
            None,
            &mut events,
        )
        .unwrap();
        // Player 1 has nothing, so their pass is implicit and the window
        // closes on the single explicit decline.
        assert_eq!(outcome, WindowOutcome::Closed(WindowResume::CombatRounds));
        assert!(state.window.is_none());
    }

    #[test]
    fn test_playing_resolves_and_discards() {
        let mut state = two_player_state();
        let (registry, card) = registry_with_card(AbilityDef::new(
            WindowKind::StartOfCombat,
            vec![Effect::GainTradeGoods {
                who: PlayerSel::Owner,
                n: 2,
            }],
        ));
        let p0 = PlayerId::from_index(0);
        state.players.get_mut(&p0).unwrap().action_cards.push(card);
        let mut events = Vec::new();
        open_window(
            &mut state,
            &registry,
            WindowKind::StartOfCombat,
            p0,
            WindowResume::CombatRounds,
            &mut events,
        );
        let outcome = handle_confirm(
            &mut state,
            &registry,
            p0,
            Some(AbilityChoice {
                source: AbilitySource::ActionCard(card),
                targets: ChosenTargets::default(),
            }),
            &mut events,
        )
        .unwrap();
        assert_eq!(outcome, WindowOutcome::Closed(WindowResume::CombatRounds));
        assert_eq!(state.players[&p0].trade_goods, 2);
        assert!(state.players[&p0].action_cards.is_empty());
    }

    #[test]
    fn test_canceller_fizzles_the_play() {
        let mut state = two_player_state();
        let mut reg = CardRegistry::new();
        let played = CardId::from_raw(1);
        let sabotage = CardId::from_raw(2);
        reg.register(CardDefinition {
            id: played,
            name: "Plague",
            kind: CardKind::Action(
                AbilityDef::new(
                    WindowKind::StartOfCombat,
                    vec![Effect::GainTradeGoods {
                        who: PlayerSel::Owner,
                        n: 5,
                    }],
                )
                .cancellable(),
            ),
        });
        reg.register(CardDefinition {
            id: sabotage,
            name: "Sabotage",
            kind: CardKind::Action(
                AbilityDef::new(WindowKind::WhenActionCardPlayed, Vec::new()).canceller(),
            ),
        });
        let p0 = PlayerId::from_index(0);
        let p1 = PlayerId::from_index(1);
        state.players.get_mut(&p0).unwrap().action_cards.push(played);
        state
            .players
            .get_mut(&p1)
            .unwrap()
            .action_cards
            .push(sabotage);
        let mut events = Vec::new();
        open_window(
            &mut state,
            &reg,
            WindowKind::StartOfCombat,
            p0,
            WindowResume::CombatRounds,
            &mut events,
        );
        handle_confirm(
            &mut state,
            &reg,
            p0,
            Some(AbilityChoice {
                source: AbilitySource::ActionCard(played),
                targets: ChosenTargets::default(),
            }),
            &mut events,
        )
        .unwrap();
        // Cancellation offer is pending for p1.
        assert_eq!(
            state.pending.as_ref().map(|p| p.player),
            Some(p1),
            "canceller should be consulted"
        );
        handle_confirm(
            &mut state,
            &reg,
            p1,
            Some(AbilityChoice {
                source: AbilitySource::ActionCard(sabotage),
                targets: ChosenTargets::default(),
            }),
            &mut events,
        )
        .unwrap();
        // No effect happened; both cards discarded.
        assert_eq!(state.players[&p0].trade_goods, 0);
        assert!(state.players[&p0].action_cards.is_empty());
        assert!(state.players[&p1].action_cards.is_empty());
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::ActionCardCancelled { .. })));
    }
}
