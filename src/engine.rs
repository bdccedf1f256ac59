//! The engine boundary: `Game::apply` consumes one intent against an
//! immutable state and yields a new state plus events, or a `Rejection`
//! leaving the state untouched.
//!
//! Routing is driven by the state's `PendingDecision`: when one is present,
//! only the named player's expected intent (or a `Timeout` standing in for
//! their default choice, or a transaction interleave) is accepted. Replaying
//! the same options, seed, and intent log always reproduces the same states
//! and events.

use tracing::debug;

use crate::ability::WindowKind;
use crate::card::StrategyCard;
use crate::event::Event;
use crate::exploration;
use crate::ids::PlayerId;
use crate::intent::{
    AbilityChoice, DecisionKind, HitAssignment, HitContext, Intent, PendingDecision, Rejection,
};
use crate::observe::{self, PublicState};
use crate::phases;
use crate::registry::CardRegistry;
use crate::setup::{self, GameOptions};
use crate::state::{GamePhase, GameState, QueuedAbility, WindowResume};
use crate::strategy;
use crate::tactical;
use crate::transaction;
use crate::window::{self, WindowOutcome};

pub struct Game {
    state: GameState,
    registry: CardRegistry,
}

impl Game {
    /// Create a game from the setup protocol.
    pub fn new(options: &GameOptions, seed: u64) -> Result<(Self, Vec<Event>), Rejection> {
        let (state, registry, events) = setup::new_game(options, seed)?;
        Ok((Self { state, registry }, events))
    }

    /// Rehydrate from a snapshot; the registry is rebuilt from content.
    pub fn from_snapshot(state: GameState) -> Self {
        Self {
            state,
            registry: crate::content::registry(),
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn registry(&self) -> &CardRegistry {
        &self.registry
    }

    pub fn observe(&self, viewer: PlayerId) -> PublicState {
        observe::observe(&self.state, viewer)
    }

    /// Pure application: validate and execute one intent, returning the next
    /// state and its events. The held state is not modified.
    pub fn apply(&self, intent: &Intent) -> Result<(GameState, Vec<Event>), Rejection> {
        let mut next = self.state.clone();
        let mut events = Vec::new();
        apply_inner(&mut next, &self.registry, intent, &mut events)?;
        if let Err(violation) = next.audit(&self.registry) {
            return Err(Rejection::internal("invariant", violation));
        }
        Ok((next, events))
    }

    /// Apply and commit. On an internal invariant violation the held state
    /// is poisoned so callers replay from a checkpoint.
    pub fn submit(&mut self, intent: &Intent) -> Result<Vec<Event>, Rejection> {
        match self.apply(intent) {
            Ok((next, events)) => {
                self.state = next;
                Ok(events)
            }
            Err(err) => {
                if matches!(err, Rejection::InternalInvariantViolation { .. }) {
                    self.state.poisoned = true;
                }
                Err(err)
            }
        }
    }

    pub fn is_legal(&self, intent: &Intent) -> bool {
        self.apply(intent).is_ok()
    }

    /// Enumerable legal intents for a player. Exhaustive for finite choice
    /// points (picks, offers, confirmations); parameter-rich intents such as
    /// movement declarations are validated by `apply`/`is_legal` instead.
    pub fn legal_intents(&self, player: PlayerId) -> Vec<Intent> {
        let state = &self.state;
        let Some(pending) = &state.pending else {
            return Vec::new();
        };
        if pending.player != player {
            return Vec::new();
        }
        let mut out = Vec::new();
        match &pending.kind {
            DecisionKind::ChooseStrategyCard => {
                for &card in state.strategy_pool.keys() {
                    out.push(Intent::ChooseStrategyCard { player, card });
                }
            }
            DecisionKind::TakeTurn => {
                for system in state.galaxy.system_ids() {
                    let intent = Intent::ActivateSystem { player, system };
                    if self.is_legal(&intent) {
                        out.push(intent);
                    }
                }
                let pass = Intent::Pass { player };
                if self.is_legal(&pass) {
                    out.push(pass);
                }
            }
            DecisionKind::DeclareMovement { .. } => {
                out.push(Intent::DeclareMovement {
                    player,
                    movements: Vec::new(),
                });
            }
            DecisionKind::OfferSpaceCannon { .. } => {
                out.push(Intent::UseSpaceCannon { player, roll: true });
                out.push(Intent::UseSpaceCannon {
                    player,
                    roll: false,
                });
            }
            DecisionKind::AnnounceRetreat => {
                for retreat in [false, true] {
                    let intent = Intent::AnnounceRetreat { player, retreat };
                    if self.is_legal(&intent) {
                        out.push(intent);
                    }
                }
            }
            DecisionKind::OfferReroll => {
                out.push(Intent::DeclineReroll { player });
            }
            DecisionKind::OfferAbility { window } => {
                out.push(Intent::ConfirmOptional {
                    player,
                    choice: None,
                });
                for ability in window::eligible_abilities(state, &self.registry, *window, player) {
                    if !ability.def.mandatory {
                        out.push(Intent::ConfirmOptional {
                            player,
                            choice: Some(AbilityChoice {
                                source: ability.source,
                                targets: Default::default(),
                            }),
                        });
                    }
                }
            }
            DecisionKind::OfferCancel { .. } => {
                out.push(Intent::ConfirmOptional {
                    player,
                    choice: None,
                });
            }
            DecisionKind::OfferSecondary { card } => {
                out.push(Intent::ResolveSecondary {
                    player,
                    card: *card,
                    params: None,
                });
            }
            DecisionKind::ScoreObjectives => {
                out.push(Intent::Pass { player });
                let mut candidates = state.revealed_objectives();
                if let Ok(p) = state.player(player) {
                    candidates.extend(p.secret_hand.iter().copied());
                }
                for objective in candidates {
                    let intent = Intent::ScoreObjective { player, objective };
                    if self.is_legal(&intent) {
                        out.push(intent);
                    }
                }
            }
            DecisionKind::CastVotes => {
                out.push(Intent::CastVotes {
                    player,
                    planets: Vec::new(),
                    outcome: None,
                });
            }
            DecisionKind::ConfirmTransaction { .. } => {
                out.push(Intent::ConfirmTransaction {
                    player,
                    accept: true,
                });
                out.push(Intent::ConfirmTransaction {
                    player,
                    accept: false,
                });
            }
            _ => {
                if let Some(fallback) = default_intent(state, &self.registry, pending) {
                    out.push(fallback);
                }
            }
        }
        out
    }
}

/// Replay a saved game: `(options, seed, intent log)` reproduces the exact
/// state and concatenated event log.
pub fn replay(
    options: &GameOptions,
    seed: u64,
    intents: &[Intent],
) -> Result<(GameState, Vec<Event>), Rejection> {
    let (mut game, mut events) = Game::new(options, seed)?;
    for intent in intents {
        let step_events = game.submit(intent)?;
        events.extend(step_events);
    }
    Ok((game.state, events))
}

// ============================================================================
// Dispatch
// ============================================================================

fn apply_inner(
    state: &mut GameState,
    registry: &CardRegistry,
    intent: &Intent,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    if state.poisoned {
        return Err(Rejection::internal(
            "poisoned",
            "the state is halted after an invariant violation; replay from a checkpoint",
        ));
    }
    if let GamePhase::Finished { winner } = &state.phase {
        return Err(Rejection::invalid(
            "game_over",
            format!("the game ended; {winner} won"),
        ));
    }
    debug!(?intent, phase = state.phase.name(), "applying intent");

    // A timeout resolves as the pending player's default choice.
    let resolved;
    let intent = if let Intent::Timeout { player } = intent {
        let Some(pending) = state.pending.clone() else {
            return Err(Rejection::invalid("no_pending", "nothing is pending"));
        };
        if pending.player != *player {
            return Err(Rejection::invalid(
                "not_pending_player",
                format!("waiting on {}", pending.player),
            ));
        }
        resolved = default_intent(state, registry, &pending).ok_or_else(|| {
            Rejection::ambiguous("no_default", "this decision has no default choice")
        })?;
        &resolved
    } else {
        intent
    };

    dispatch(state, registry, intent, events)?;

    // Forced secret return: more than three unscored secrets in any hand
    // preempts whatever is pending until resolved.
    enforce_secret_cap(state);

    // Game end is checked at the close of the step, so simultaneous scores
    // inside one resolution tie-break by initiative order.
    if !matches!(state.phase, GamePhase::Finished { .. }) {
        state.check_game_end(events);
    }
    Ok(())
}

fn enforce_secret_cap(state: &mut GameState) {
    if state
        .pending
        .as_ref()
        .is_some_and(|p| p.kind == DecisionKind::ReturnSecretObjective)
    {
        return;
    }
    let over: Option<PlayerId> = state
        .players
        .values()
        .find(|p| p.secret_hand.len() > 3)
        .map(|p| p.id);
    if let Some(player) = over {
        state.secret_overflow_resume = state.pending.take();
        state.pending = Some(PendingDecision {
            player,
            kind: DecisionKind::ReturnSecretObjective,
        });
    }
}

fn dispatch(
    state: &mut GameState,
    registry: &CardRegistry,
    intent: &Intent,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    // Transactions interleave with most pendings.
    if let Intent::ProposeTransaction {
        from,
        to,
        give,
        receive,
    } = intent
    {
        return transaction::handle_propose(
            state,
            *from,
            *to,
            give.clone(),
            receive.clone(),
            events,
        );
    }
    if let Intent::ConfirmTransaction { player, accept } = intent {
        return transaction::handle_confirm(state, *player, *accept, events);
    }

    let Some(pending) = state.pending.clone() else {
        return Err(Rejection::invalid("nothing_pending", "no decision is pending"));
    };
    let actor = intent.player();
    if actor != pending.player {
        return Err(Rejection::invalid(
            "not_your_decision",
            format!("waiting on {}", pending.player),
        ));
    }

    match (&pending.kind, intent) {
        (DecisionKind::ChooseStrategyCard, Intent::ChooseStrategyCard { player, card }) => {
            phases::handle_choose_strategy(state, *player, *card, events)
        }

        (DecisionKind::TakeTurn, Intent::Pass { player }) => {
            phases::handle_pass(state, *player, events)
        }
        (DecisionKind::TakeTurn, Intent::ActivateSystem { player, system }) => {
            tactical::activate(state, *player, *system, events)
        }
        (
            DecisionKind::TakeTurn,
            Intent::PerformStrategicAction {
                player,
                card,
                params,
            },
        ) => strategy::handle_strategic_action(state, registry, *player, *card, params, events),
        (
            DecisionKind::TakeTurn,
            Intent::PlayActionCard {
                player,
                card,
                targets,
            },
        ) => play_component_action(state, registry, *player, *card, targets.clone(), events),
        (
            DecisionKind::TakeTurn,
            Intent::PlayPromissoryNote {
                player,
                card,
                targets,
            },
        ) => play_promissory(state, registry, *player, *card, targets.clone(), events),
        (DecisionKind::TakeTurn, Intent::TradeRelicFragments { player, fragments }) => {
            exploration::trade_fragments(state, registry, *player, fragments, events)?;
            phases::end_of_action_turn(state, registry, events);
            Ok(())
        }
        (DecisionKind::TakeTurn, Intent::ConfirmOptional { player, choice }) => {
            // A relic's component-action ability is used through the offer
            // shape even on the owner's own turn.
            use_component_relic(state, registry, *player, choice.clone(), events)
        }

        (DecisionKind::DeclareMovement { .. }, Intent::DeclareMovement { player, movements }) => {
            tactical::declare_movement(state, registry, *player, movements, events)
        }
        (DecisionKind::OfferSpaceCannon { .. }, Intent::UseSpaceCannon { player, roll }) => {
            tactical::handle_use_space_cannon(state, registry, *player, *roll, events)
        }
        (
            DecisionKind::AssignHits { context, .. },
            Intent::AssignSpaceCannonHits {
                player,
                assignments,
            },
        )
        | (
            DecisionKind::AssignHits { context, .. },
            Intent::AssignCombatHits {
                player,
                assignments,
            },
        ) => route_hit_assignment(state, registry, *player, *context, assignments, events),
        (DecisionKind::AnnounceRetreat, Intent::AnnounceRetreat { player, retreat }) => {
            tactical::handle_announce_retreat(state, registry, *player, *retreat, events)
        }
        (
            DecisionKind::ChooseRetreatDestination,
            Intent::ChooseRetreatDestination { player, into },
        ) => tactical::handle_retreat_destination(state, registry, *player, *into, events),
        (
            DecisionKind::OfferReroll,
            Intent::UseReroll {
                player,
                source,
                roller,
                die,
            },
        ) => tactical::handle_reroll(state, registry, *player, *source, *roller, *die, events),
        (DecisionKind::OfferReroll, Intent::DeclineReroll { player }) => {
            tactical::handle_decline_reroll(state, registry, *player, events)
        }
        (DecisionKind::Bombard, Intent::Bombard { player, rolls }) => {
            tactical::handle_bombard(state, registry, *player, rolls, events)
        }
        (
            DecisionKind::CommitGroundForces,
            Intent::CommitGroundForces {
                player,
                commitments,
                custodians_payment,
            },
        ) => tactical::handle_commit(
            state,
            registry,
            *player,
            commitments,
            custodians_payment.as_ref(),
            events,
        ),
        (
            DecisionKind::Produce,
            Intent::Produce {
                player,
                orders,
                spend,
            },
        ) => {
            tactical::handle_produce(state, registry, *player, orders, spend, events)?;
            phases::end_of_action_turn(state, registry, events);
            Ok(())
        }

        (DecisionKind::OfferAbility { .. }, Intent::ConfirmOptional { player, choice })
        | (DecisionKind::OfferCancel { .. }, Intent::ConfirmOptional { player, choice }) => {
            handle_confirm_optional(state, registry, *player, choice.clone(), events)
        }

        (
            DecisionKind::OfferSecondary { .. },
            Intent::ResolveSecondary {
                player,
                card,
                params,
            },
        ) => strategy::handle_secondary(state, registry, *player, *card, params.as_ref(), events),

        (DecisionKind::ScoreObjectives, Intent::ScoreObjective { player, objective }) => {
            phases::handle_status_score(state, registry, *player, *objective, events)
        }
        (DecisionKind::ScoreObjectives, Intent::Pass { player }) => {
            phases::handle_status_pass(state, *player, events)
        }
        (
            DecisionKind::RedistributeTokens { .. },
            Intent::RedistributeTokens {
                player,
                tactic,
                fleet,
                strategy,
            },
        ) => phases::handle_redistribute(
            state, registry, *player, *tactic, *fleet, *strategy, events,
        ),
        (DecisionKind::DiscardToHandLimit { .. }, Intent::DiscardActionCards { player, cards }) => {
            phases::handle_discard_excess(state, registry, *player, cards, events)
        }
        (DecisionKind::ReturnSecretObjective, Intent::ReturnSecretObjective { player, card }) => {
            handle_return_secret(state, *player, *card)
        }

        (DecisionKind::CastVotes, Intent::CastVotes { player, planets, outcome }) => {
            agenda_cast(state, registry, *player, planets, *outcome, events)
        }
        (DecisionKind::ChooseOutcome, Intent::ChooseOutcome { player, outcome }) => {
            crate::agenda::handle_choose_outcome(state, registry, *player, *outcome, events)
        }

        _ => Err(Rejection::invalid(
            "unexpected_intent",
            format!("a {:?} decision is pending", pending.kind),
        )),
    }
}

fn agenda_cast(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    planets: &[crate::ids::PlanetId],
    outcome: Option<crate::intent::Outcome>,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    crate::agenda::handle_cast_votes(state, registry, player, planets, outcome, events)
}

fn route_hit_assignment(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    context: HitContext,
    assignments: &[HitAssignment],
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    match context {
        HitContext::SpaceCannonOffense => {
            tactical::handle_assign_space_cannon_hits(state, registry, player, assignments, events)
        }
        HitContext::SpaceCombat
        | HitContext::SpaceCannonDefense(_)
        | HitContext::GroundCombat(_) => {
            tactical::handle_assign_combat_hits(state, registry, player, assignments, events)
        }
    }
}

/// `ConfirmOptional` against an open window, or against a queued component
/// action's cancellation round.
fn handle_confirm_optional(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    choice: Option<AbilityChoice>,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    if state.window.is_some() {
        let outcome = window::handle_confirm(state, registry, player, choice, events)?;
        if let WindowOutcome::Closed(resume) = outcome {
            resume_flow(state, registry, resume, events);
        }
        return Ok(());
    }
    component_cancel_response(state, registry, player, choice, events)
}

fn resume_flow(
    state: &mut GameState,
    registry: &CardRegistry,
    resume: WindowResume,
    events: &mut Vec<Event>,
) {
    match resume {
        WindowResume::TakeTurn => {
            if let Some(player) = state.active_player {
                state.pending = Some(PendingDecision {
                    player,
                    kind: DecisionKind::TakeTurn,
                });
            }
        }
        WindowResume::TacticalMovement => {
            if let (Some(player), Some(system)) = (state.active_player, state.active_system) {
                state.pending = Some(PendingDecision {
                    player,
                    kind: DecisionKind::DeclareMovement { system },
                });
            }
        }
        WindowResume::TacticalSpaceCannon => {
            tactical::begin_space_cannon_offense(state, registry, events);
        }
        WindowResume::CombatRounds => {
            let defender = match &state.phase {
                GamePhase::Action(a) => a.tactical.as_ref().and_then(|t| match &t.step {
                    crate::state::TacticalStep::SpaceCombat(c) => Some(c.defender),
                    _ => None,
                }),
                _ => None,
            };
            if let Some(defender) = defender {
                state.pending = Some(PendingDecision {
                    player: defender,
                    kind: DecisionKind::AnnounceRetreat,
                });
            }
        }
        WindowResume::AgendaVoting => {
            crate::agenda::begin_voting(state, events);
        }
        WindowResume::AdvanceTurn => {
            phases::advance_turn(state, events);
        }
    }
}

// ============================================================================
// Component actions
// ============================================================================

fn play_component_action(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    card: crate::ids::CardId,
    targets: crate::intent::ChosenTargets,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let def = registry
        .get(card)
        .and_then(|d| d.as_action())
        .cloned()
        .ok_or_else(|| Rejection::invalid("not_an_action_card", format!("{card} is no action card")))?;
    if def.window != WindowKind::ComponentAction {
        return Err(Rejection::invalid(
            "not_a_component_action",
            "that card is played in its timing window, not as an action",
        ));
    }
    if !state.player(player)?.action_cards.contains(&card) {
        return Err(Rejection::invalid("card_not_held", "card not in hand"));
    }
    // A component action must be completely resolvable before it begins
    // (LRR 22.3): cost payable, required targets supplied.
    if !window::cost_payable(state, player, def.cost) {
        return Err(Rejection::rules("cost_unpayable", "you cannot pay that cost"));
    }
    crate::executor::validate_targets(
        &def.effect,
        &crate::executor::ExecutionContext::new(player, targets.clone()),
    )?;

    if def.cancellable {
        let cancellers = window::cancellers_against(state, registry, player);
        if !cancellers.is_empty() {
            let first = cancellers[0];
            if let GamePhase::Action(a) = &mut state.phase {
                a.queued_component = Some(QueuedAbility {
                    owner: player,
                    source: crate::ability::AbilitySource::ActionCard(card),
                    targets,
                    cancel_queue: cancellers,
                    cancel_cursor: 0,
                });
            }
            state.pending = Some(PendingDecision {
                player: first,
                kind: DecisionKind::OfferCancel { card },
            });
            return Ok(());
        }
    }
    window::resolve_ability(
        state,
        registry,
        player,
        crate::ability::AbilitySource::ActionCard(card),
        &def,
        targets,
        events,
    );
    phases::end_of_action_turn(state, registry, events);
    Ok(())
}

fn component_cancel_response(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    choice: Option<AbilityChoice>,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let queued = match &state.phase {
        GamePhase::Action(a) => a.queued_component.clone(),
        _ => None,
    };
    let Some(mut queued) = queued else {
        return Err(Rejection::invalid("no_offer", "nothing is offered"));
    };
    let expected = queued.cancel_queue[queued.cancel_cursor];
    if player != expected {
        return Err(Rejection::invalid(
            "not_your_offer",
            format!("waiting on {expected}"),
        ));
    }
    let crate::ability::AbilitySource::ActionCard(card) = queued.source else {
        return Err(Rejection::internal("bad_queue", "queued source is not a card"));
    };

    if let Some(choice) = choice {
        let crate::ability::AbilitySource::ActionCard(canceller) = choice.source else {
            return Err(Rejection::invalid("not_a_canceller", "choose a cancel card"));
        };
        let cancels = registry
            .get(canceller)
            .and_then(|d| d.as_action())
            .is_some_and(|d| d.cancels);
        if !cancels || !state.player(player)?.action_cards.contains(&canceller) {
            return Err(Rejection::invalid("not_a_canceller", "that card cannot cancel"));
        }
        if let Ok(p) = state.player_mut(player) {
            p.remove_action_card(canceller);
        }
        state.decks.action.discard(canceller);
        if let Ok(p) = state.player_mut(queued.owner) {
            p.remove_action_card(card);
        }
        state.decks.action.discard(card);
        events.push(Event::public(crate::event::EventKind::ActionCardCancelled {
            player: queued.owner,
            card,
            cancelled_by: player,
        }));
        if let GamePhase::Action(a) = &mut state.phase {
            a.queued_component = None;
        }
        // A cancelled action card does not consume the turn.
        state.pending = Some(PendingDecision {
            player: queued.owner,
            kind: DecisionKind::TakeTurn,
        });
        return Ok(());
    }

    queued.cancel_cursor += 1;
    if queued.cancel_cursor < queued.cancel_queue.len() {
        let next = queued.cancel_queue[queued.cancel_cursor];
        if let GamePhase::Action(a) = &mut state.phase {
            a.queued_component = Some(queued);
        }
        state.pending = Some(PendingDecision {
            player: next,
            kind: DecisionKind::OfferCancel { card },
        });
        return Ok(());
    }

    let def = registry
        .get(card)
        .and_then(|d| d.as_action())
        .cloned()
        .ok_or_else(|| Rejection::internal("missing_def", "queued card lost its definition"))?;
    if let GamePhase::Action(a) = &mut state.phase {
        a.queued_component = None;
    }
    window::resolve_ability(
        state,
        registry,
        queued.owner,
        queued.source,
        &def,
        queued.targets,
        events,
    );
    phases::end_of_action_turn(state, registry, events);
    Ok(())
}

fn play_promissory(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    card: crate::ids::CardId,
    targets: crate::intent::ChosenTargets,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    // A note is never played by its own color.
    if state.promissory_owner.get(&card) == Some(&player) {
        return Err(Rejection::rules(
            "own_note",
            "a promissory note is played only by a non-owner",
        ));
    }
    if !state.player(player)?.promissory_hand.contains(&card) {
        return Err(Rejection::invalid("note_not_held", "note not in hand"));
    }
    let def = match registry.get(card).map(|d| &d.kind) {
        Some(crate::card::CardKind::Promissory(note)) => note.ability.clone(),
        _ => return Err(Rejection::invalid("not_a_note", "that is not a promissory note")),
    };
    if !matches!(
        def.window,
        WindowKind::StartOfTurn | WindowKind::ComponentAction
    ) {
        return Err(Rejection::invalid(
            "wrong_window",
            "that note is played in its timing window",
        ));
    }
    crate::executor::validate_targets(
        &def.effect,
        &crate::executor::ExecutionContext::new(player, targets.clone()),
    )?;
    window::resolve_ability(
        state,
        registry,
        player,
        crate::ability::AbilitySource::Promissory(card),
        &def,
        targets,
        events,
    );
    // Notes do not consume the turn.
    Ok(())
}

/// Relic component actions, offered through the same choice shape.
fn use_component_relic(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    choice: Option<AbilityChoice>,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let Some(choice) = choice else {
        return Err(Rejection::invalid("no_choice", "nothing to decline here"));
    };
    let eligible =
        window::eligible_abilities(state, registry, WindowKind::ComponentAction, player);
    let Some(ability) = eligible.into_iter().find(|a| a.source == choice.source) else {
        return Err(Rejection::invalid(
            "not_eligible",
            "that ability is not usable as an action",
        ));
    };
    crate::executor::validate_targets(
        &ability.def.effect,
        &crate::executor::ExecutionContext::new(player, choice.targets.clone()),
    )?;
    window::resolve_ability(
        state,
        registry,
        player,
        choice.source,
        &ability.def,
        choice.targets,
        events,
    );
    phases::end_of_action_turn(state, registry, events);
    Ok(())
}

fn handle_return_secret(
    state: &mut GameState,
    player: PlayerId,
    card: crate::ids::CardId,
) -> Result<(), Rejection> {
    {
        let p = state.player(player)?;
        if !p.secret_hand.contains(&card) {
            return Err(Rejection::invalid("not_in_hand", "that secret is not yours"));
        }
    }
    if let Ok(p) = state.player_mut(player) {
        p.remove_secret(card);
    }
    state.decks.secret.return_and_shuffle(card, &mut state.rng);
    state.pending = state.secret_overflow_resume.take();
    Ok(())
}

// ============================================================================
// Timeout defaults
// ============================================================================

/// The pending player's default choice: decline what is optional, pass where
/// passing is legal, pick the forced option otherwise.
fn default_intent(
    state: &GameState,
    registry: &CardRegistry,
    pending: &PendingDecision,
) -> Option<Intent> {
    let player = pending.player;
    match &pending.kind {
        DecisionKind::ChooseStrategyCard => {
            let card = state.strategy_pool.keys().min_by_key(|c| c.initiative())?;
            Some(Intent::ChooseStrategyCard {
                player,
                card: *card,
            })
        }
        DecisionKind::TakeTurn => {
            // Passing is illegal while a strategic action is due; the
            // default then performs the first due card with stock choices.
            let due = state
                .players
                .get(&player)?
                .strategy_cards
                .iter()
                .find(|h| !h.exhausted)
                .map(|h| h.card);
            match due {
                None => Some(Intent::Pass { player }),
                Some(card) => Some(Intent::PerformStrategicAction {
                    player,
                    card,
                    params: default_primary(state, registry, player, card)?,
                }),
            }
        }
        DecisionKind::DeclareMovement { .. } => Some(Intent::DeclareMovement {
            player,
            movements: Vec::new(),
        }),
        DecisionKind::OfferSpaceCannon { .. } => Some(Intent::UseSpaceCannon {
            player,
            roll: false,
        }),
        DecisionKind::AssignHits { count, context } => {
            let assignments = default_assignments(state, player, *count, *context);
            Some(match context {
                HitContext::SpaceCannonOffense => Intent::AssignSpaceCannonHits {
                    player,
                    assignments,
                },
                _ => Intent::AssignCombatHits {
                    player,
                    assignments,
                },
            })
        }
        DecisionKind::AnnounceRetreat => Some(Intent::AnnounceRetreat {
            player,
            retreat: false,
        }),
        DecisionKind::ChooseRetreatDestination => None,
        DecisionKind::OfferReroll => Some(Intent::DeclineReroll { player }),
        DecisionKind::Bombard => Some(Intent::Bombard {
            player,
            rolls: Vec::new(),
        }),
        DecisionKind::CommitGroundForces => Some(Intent::CommitGroundForces {
            player,
            commitments: Vec::new(),
            custodians_payment: None,
        }),
        DecisionKind::Produce => Some(Intent::Produce {
            player,
            orders: Vec::new(),
            spend: Default::default(),
        }),
        DecisionKind::OfferAbility { .. } | DecisionKind::OfferCancel { .. } => {
            Some(Intent::ConfirmOptional {
                player,
                choice: None,
            })
        }
        DecisionKind::OfferSecondary { card } => Some(Intent::ResolveSecondary {
            player,
            card: *card,
            params: None,
        }),
        DecisionKind::ScoreObjectives => Some(Intent::Pass { player }),
        DecisionKind::RedistributeTokens { gained } => {
            let p = state.players.get(&player)?;
            Some(Intent::RedistributeTokens {
                player,
                tactic: p.command.tactic + gained,
                fleet: p.command.fleet,
                strategy: p.command.strategy,
            })
        }
        DecisionKind::DiscardToHandLimit { excess } => {
            let p = state.players.get(&player)?;
            Some(Intent::DiscardActionCards {
                player,
                cards: p
                    .action_cards
                    .iter()
                    .copied()
                    .take(*excess as usize)
                    .collect(),
            })
        }
        DecisionKind::ReturnSecretObjective => {
            let p = state.players.get(&player)?;
            Some(Intent::ReturnSecretObjective {
                player,
                card: p.secret_hand.first().copied()?,
            })
        }
        DecisionKind::CastVotes => Some(Intent::CastVotes {
            player,
            planets: Vec::new(),
            outcome: None,
        }),
        DecisionKind::ChooseOutcome => {
            let agenda = match &state.phase {
                GamePhase::Agenda(a) => Some(a.agenda),
                _ => None,
            }?;
            let def = registry.get(agenda)?.as_agenda()?.clone();
            let outcome = match def.elect {
                crate::card::Elect::ForAgainst => crate::intent::Outcome::Against,
                crate::card::Elect::Player => crate::intent::Outcome::ElectPlayer(state.speaker),
                crate::card::Elect::Planet => crate::intent::Outcome::ElectPlanet(
                    state.planets.keys().next().copied()?,
                ),
            };
            Some(Intent::ChooseOutcome { player, outcome })
        }
        DecisionKind::ConfirmTransaction { .. } => Some(Intent::ConfirmTransaction {
            player,
            accept: false,
        }),
        DecisionKind::RemoveExcessUnits { .. } => None,
    }
}

/// Stock primary parameters for a due strategic action.
fn default_primary(
    state: &GameState,
    registry: &CardRegistry,
    player: PlayerId,
    card: StrategyCard,
) -> Option<crate::intent::PrimaryParams> {
    use crate::intent::PrimaryParams;
    match card {
        StrategyCard::Leadership => {
            let free = 3.min(state.players.get(&player)?.token_reinforcements);
            Some(PrimaryParams::Leadership {
                spend: Default::default(),
                tokens: (free, 0, 0),
            })
        }
        StrategyCard::Diplomacy => {
            let system = state
                .planets
                .values()
                .find(|p| p.controlled_by(player))
                .map(|p| p.system)?;
            Some(PrimaryParams::Diplomacy { system })
        }
        StrategyCard::Politics => Some(PrimaryParams::Politics { speaker: player }),
        StrategyCard::Construction => {
            let pds_planet = state
                .planets
                .values()
                .filter(|p| p.controlled_by(player))
                .find(|p| {
                    state
                        .units_on_planet(p.id)
                        .filter(|u| u.unit_type == crate::types::UnitType::Pds)
                        .count()
                        < 2
                })
                .map(|p| p.id);
            let dock_planet = state
                .planets
                .values()
                .filter(|p| p.controlled_by(player))
                .find(|p| {
                    !state
                        .units_on_planet(p.id)
                        .any(|u| u.unit_type == crate::types::UnitType::SpaceDock)
                })
                .map(|p| p.id);
            match (pds_planet, dock_planet) {
                (Some(planet), _) => Some(PrimaryParams::Construction {
                    unit_type: crate::types::UnitType::Pds,
                    planet: Some(planet),
                }),
                (None, Some(planet)) => Some(PrimaryParams::Construction {
                    unit_type: crate::types::UnitType::SpaceDock,
                    planet: Some(planet),
                }),
                (None, None) => Some(PrimaryParams::Construction {
                    unit_type: crate::types::UnitType::Pds,
                    planet: None,
                }),
            }
        }
        StrategyCard::Trade => Some(PrimaryParams::Trade {
            replenish: Vec::new(),
        }),
        StrategyCard::Warfare => {
            let system = state
                .command_tokens_on_board
                .iter()
                .find(|(_, players)| players.contains(&player))
                .map(|(&s, _)| s);
            Some(PrimaryParams::Warfare { system })
        }
        StrategyCard::Technology => {
            let p = state.players.get(&player)?;
            let tech = registry
                .iter()
                .filter(|d| matches!(d.kind, crate::card::CardKind::Technology(_)))
                .find(|d| {
                    !p.has_tech(d.id)
                        && {
                            // Only prerequisite-free techs are safe stock picks.
                            matches!(
                                &d.kind,
                                crate::card::CardKind::Technology(t) if t.prerequisites.is_empty()
                            )
                        }
                })
                .map(|d| d.id)?;
            Some(PrimaryParams::Technology { tech, second: None })
        }
        StrategyCard::Imperial => Some(PrimaryParams::Imperial { objective: None }),
    }
}

/// Auto-assign hits: fighters first, then the rest in id order, sustains
/// unused.
fn default_assignments(
    state: &GameState,
    player: PlayerId,
    count: u8,
    context: HitContext,
) -> Vec<HitAssignment> {
    let mut targets: Vec<crate::ids::UnitId> = Vec::new();
    match context {
        HitContext::SpaceCannonOffense | HitContext::SpaceCombat => {
            if let Some(system) = state.active_system {
                let mut fighters = Vec::new();
                let mut rest = Vec::new();
                for u in state.units_in_space(system) {
                    if u.owner == player && u.unit_type.is_ship() {
                        if u.unit_type == crate::types::UnitType::Fighter {
                            fighters.push(u.id);
                        } else {
                            rest.push(u.id);
                        }
                    }
                }
                targets.extend(fighters);
                targets.extend(rest);
            }
        }
        HitContext::SpaceCannonDefense(planet) | HitContext::GroundCombat(planet) => {
            targets.extend(
                state
                    .units_on_planet(planet)
                    .filter(|u| u.owner == player && u.unit_type.is_ground_force())
                    .map(|u| u.id),
            );
        }
    }
    targets
        .into_iter()
        .take(count as usize)
        .map(|unit| HitAssignment {
            unit,
            sustain: false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::{GameOptions, PlayerSetup};
    use crate::types::{Faction, PlayerColor};

    fn options() -> GameOptions {
        GameOptions::standard(vec![
            PlayerSetup {
                faction: Faction::FederationOfSol,
                color: PlayerColor::Blue,
            },
            PlayerSetup {
                faction: Faction::BaronyOfLetnev,
                color: PlayerColor::Red,
            },
            PlayerSetup {
                faction: Faction::EmiratesOfHacan,
                color: PlayerColor::Yellow,
            },
        ])
    }

    #[test]
    fn test_wrong_player_intent_is_rejected_without_change() {
        let (game, _) = Game::new(&options(), 5).unwrap();
        let waiting_on = game.state().pending.as_ref().map(|p| p.player).unwrap();
        let someone_else = game
            .state()
            .players
            .keys()
            .copied()
            .find(|&p| p != waiting_on)
            .unwrap();
        let before = game.state().clone();
        let err = game
            .apply(&Intent::ChooseStrategyCard {
                player: someone_else,
                card: StrategyCard::Warfare,
            })
            .unwrap_err();
        assert_eq!(err.code(), "not_your_decision");
        assert_eq!(game.state(), &before);
    }

    #[test]
    fn test_timeout_picks_the_default_strategy_card() {
        let (mut game, _) = Game::new(&options(), 5).unwrap();
        let speaker = game.state().speaker;
        game.submit(&Intent::Timeout { player: speaker }).unwrap();
        assert!(
            game.state()
                .players
                .get(&speaker)
                .unwrap()
                .holds_strategy_card(StrategyCard::Leadership),
            "timeout takes the lowest-initiative card"
        );
    }

    #[test]
    fn test_legal_intents_enumerate_strategy_picks() {
        let (game, _) = Game::new(&options(), 5).unwrap();
        let speaker = game.state().speaker;
        let intents = game.legal_intents(speaker);
        assert_eq!(intents.len(), 8);
        assert!(intents
            .iter()
            .all(|i| matches!(i, Intent::ChooseStrategyCard { .. })));
        // Nothing is offered to the players not on the clock.
        let other = game
            .state()
            .players
            .keys()
            .copied()
            .find(|&p| p != speaker)
            .unwrap();
        assert!(game.legal_intents(other).is_empty());
    }

    #[test]
    fn test_replay_reproduces_state() {
        let intents: Vec<Intent> = {
            let (game, _) = Game::new(&options(), 13).unwrap();
            let mut log = Vec::new();
            let mut g = game;
            // Run the whole strategy phase through timeouts.
            for _ in 0..6 {
                let player = g.state().pending.as_ref().map(|p| p.player).unwrap();
                let intent = Intent::Timeout { player };
                g.submit(&intent).unwrap();
                log.push(intent);
            }
            log
        };
        let (a, events_a) = replay(&options(), 13, &intents).unwrap();
        let (b, events_b) = replay(&options(), 13, &intents).unwrap();
        assert_eq!(a, b);
        assert_eq!(events_a, events_b);
    }
}
