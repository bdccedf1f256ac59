//! The agenda phase: two agendas revealed, voted on, and resolved.
//!
//! Voting goes clockwise from the player left of the speaker; the speaker
//! votes last and breaks ties (and chooses when nobody voted). Votes come
//! from exhausting planets for influence; trade goods never buy votes. Laws
//! enter play on a "For" majority or an election; directives resolve and
//! discard.

use crate::card::{AgendaDef, AgendaKind, Elect, LawModifier};
use crate::event::{Event, EventKind};
use crate::executor::{ExecutionContext, run_script};
use crate::ids::{CardId, PlayerId};
use crate::intent::{ChosenTargets, DecisionKind, Outcome, PendingDecision, Rejection};
use crate::registry::CardRegistry;
use crate::state::{AgendaPhaseState, AgendaStage, GamePhase, GameState, LawInPlay, WindowResume};
use crate::window;

fn pending(state: &mut GameState, player: PlayerId, kind: DecisionKind) {
    state.pending = Some(PendingDecision { player, kind });
}

pub fn begin_agenda_phase(
    state: &mut GameState,
    registry: &CardRegistry,
    events: &mut Vec<Event>,
) {
    events.push(Event::public(EventKind::PhaseChanged {
        phase: "agenda".to_string(),
        round: state.round,
    }));
    reveal_agenda(state, registry, 0, events);
}

fn reveal_agenda(
    state: &mut GameState,
    registry: &CardRegistry,
    index: u8,
    events: &mut Vec<Event>,
) {
    let Some(card) = state.decks.agenda.draw(&mut state.rng) else {
        // An exhausted agenda deck skips the phase.
        ready_all_planets(state, events);
        crate::phases::begin_round(state, events);
        return;
    };
    events.push(Event::public(EventKind::AgendaRevealed { card }));
    state.phase = GamePhase::Agenda(AgendaPhaseState {
        index,
        agenda: card,
        stage: AgendaStage::Voting {
            queue: Vec::new(),
            cursor: 0,
            tally: Vec::new(),
        },
        transacted: Default::default(),
    });
    state.pending = None;
    // Riders and "when an agenda is revealed" plays happen before voting.
    let speaker = state.speaker;
    let opened = window::open_window(
        state,
        registry,
        crate::ability::WindowKind::WhenAgendaRevealed,
        speaker,
        WindowResume::AgendaVoting,
        events,
    );
    if !opened {
        begin_voting(state, events);
    }
}

/// Build the vote order: clockwise from the speaker's left, speaker last.
pub fn begin_voting(state: &mut GameState, events: &mut Vec<Event>) {
    let mut order = state.clockwise_from(state.speaker);
    if !order.is_empty() {
        order.rotate_left(1);
    }
    let first = order.first().copied();
    if let GamePhase::Agenda(a) = &mut state.phase {
        a.stage = AgendaStage::Voting {
            queue: order,
            cursor: 0,
            tally: Vec::new(),
        };
    }
    if let Some(first) = first {
        pending(state, first, DecisionKind::CastVotes);
    }
    let _ = events;
}

fn outcome_fits(def: &AgendaDef, outcome: Outcome) -> bool {
    match def.elect {
        Elect::ForAgainst => matches!(outcome, Outcome::For | Outcome::Against),
        Elect::Player => matches!(outcome, Outcome::ElectPlayer(_)),
        Elect::Planet => matches!(outcome, Outcome::ElectPlanet(_)),
    }
}

pub fn handle_cast_votes(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    planets: &[crate::ids::PlanetId],
    outcome: Option<Outcome>,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let (agenda, queue, cursor, mut tally) = match &state.phase {
        GamePhase::Agenda(a) => match &a.stage {
            AgendaStage::Voting {
                queue,
                cursor,
                tally,
            } => (a.agenda, queue.clone(), *cursor, tally.clone()),
            _ => return Err(Rejection::invalid("wrong_step", "voting is over")),
        },
        _ => return Err(Rejection::invalid("wrong_phase", "not the agenda phase")),
    };
    if queue.get(cursor) != Some(&player) {
        return Err(Rejection::invalid("not_your_vote", "not your vote"));
    }
    let def = registry
        .get(agenda)
        .and_then(|d| d.as_agenda())
        .cloned()
        .ok_or_else(|| Rejection::internal("missing_agenda", "agenda lost its definition"))?;

    if let Some(outcome) = outcome {
        if !outcome_fits(&def, outcome) {
            return Err(Rejection::invalid(
                "outcome_mismatch",
                "that outcome does not exist on this agenda",
            ));
        }
        if planets.is_empty() {
            return Err(Rejection::invalid(
                "no_votes",
                "choose planets to vote with, or abstain",
            ));
        }
        // Influence from exhausted planets only; trade goods never vote.
        let mut votes: u16 = 0;
        for &planet_id in planets {
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
            votes += u16::from(planet.influence_value());
        }
        for &planet_id in planets {
            if let Ok(p) = state.planet_mut(planet_id) {
                p.exhaust();
            }
            events.push(Event::public(EventKind::PlanetExhausted { planet: planet_id }));
        }
        match tally.iter_mut().find(|(o, _)| *o == outcome) {
            Some((_, total)) => *total += votes,
            None => tally.push((outcome, votes)),
        }
        events.push(Event::public(EventKind::VotesCast {
            player,
            outcome: outcome.describe(),
            votes,
        }));
    }

    let cursor = cursor + 1;
    if cursor < queue.len() {
        let next = queue[cursor];
        if let GamePhase::Agenda(a) = &mut state.phase {
            a.stage = AgendaStage::Voting {
                queue,
                cursor,
                tally,
            };
        }
        pending(state, next, DecisionKind::CastVotes);
        return Ok(());
    }

    // Everyone voted; find the leaders.
    let top = tally.iter().map(|&(_, v)| v).max().unwrap_or(0);
    let leaders: Vec<Outcome> = tally
        .iter()
        .filter(|&&(_, v)| v == top && top > 0)
        .map(|&(o, _)| o)
        .collect();
    match leaders.as_slice() {
        [single] => {
            resolve_agenda(state, registry, agenda, *single, events);
            Ok(())
        }
        _ => {
            // Tie or no votes: the speaker chooses among the outcomes.
            let tied = if leaders.is_empty() {
                Vec::new()
            } else {
                leaders
            };
            let speaker = state.speaker;
            if let GamePhase::Agenda(a) = &mut state.phase {
                a.stage = AgendaStage::SpeakerDecision { tied };
            }
            pending(state, speaker, DecisionKind::ChooseOutcome);
            Ok(())
        }
    }
}

pub fn handle_choose_outcome(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    outcome: Outcome,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let (agenda, tied) = match &state.phase {
        GamePhase::Agenda(a) => match &a.stage {
            AgendaStage::SpeakerDecision { tied } => (a.agenda, tied.clone()),
            _ => return Err(Rejection::invalid("wrong_step", "no speaker decision pending")),
        },
        _ => return Err(Rejection::invalid("wrong_phase", "not the agenda phase")),
    };
    if player != state.speaker {
        return Err(Rejection::invalid("not_speaker", "only the speaker decides"));
    }
    let def = registry
        .get(agenda)
        .and_then(|d| d.as_agenda())
        .cloned()
        .ok_or_else(|| Rejection::internal("missing_agenda", "agenda lost its definition"))?;
    if !outcome_fits(&def, outcome) {
        return Err(Rejection::invalid(
            "outcome_mismatch",
            "that outcome does not exist on this agenda",
        ));
    }
    // A tie restricts the speaker to the tied outcomes; no votes at all
    // leaves the choice open.
    if !tied.is_empty() && !tied.contains(&outcome) {
        return Err(Rejection::invalid(
            "not_among_tied",
            "the speaker chooses among the tied outcomes",
        ));
    }
    resolve_agenda(state, registry, agenda, outcome, events);
    Ok(())
}

fn resolve_agenda(
    state: &mut GameState,
    registry: &CardRegistry,
    agenda: CardId,
    outcome: Outcome,
    events: &mut Vec<Event>,
) {
    let index = match &state.phase {
        GamePhase::Agenda(a) => a.index,
        _ => 0,
    };
    events.push(Event::public(EventKind::AgendaOutcome {
        card: agenda,
        outcome: outcome.describe(),
    }));
    let Some(def) = registry.get(agenda).and_then(|d| d.as_agenda()).cloned() else {
        return;
    };

    let enact_as_law = def.kind == AgendaKind::Law
        && match outcome {
            Outcome::For => true,
            Outcome::Against => false,
            Outcome::ElectPlayer(_) | Outcome::ElectPlanet(_) => true,
        };
    if enact_as_law {
        let elected_player = match outcome {
            Outcome::ElectPlayer(p) => Some(p),
            _ => None,
        };
        let elected_planet = match outcome {
            Outcome::ElectPlanet(p) => Some(p),
            _ => None,
        };
        state.laws.push(LawInPlay {
            card: agenda,
            owner: elected_player,
            elected_player,
            elected_planet,
        });
        events.push(Event::public(EventKind::LawEnacted {
            card: agenda,
            owner: elected_player,
        }));
        // VP granted by a law is kept even if the law later leaves play
        // (LRR 98.6), so it is awarded outright.
        if def.modifier == LawModifier::ElectedGainsVictoryPoint {
            if let Some(p) = elected_player {
                state.award_vp(p, 1, events);
            }
        }
    } else {
        let ctx_targets = ChosenTargets {
            player: match outcome {
                Outcome::ElectPlayer(p) => Some(p),
                _ => None,
            },
            planet: match outcome {
                Outcome::ElectPlanet(p) => Some(p),
                _ => None,
            },
            ..ChosenTargets::default()
        };
        if outcome != Outcome::Against {
            let speaker = state.speaker;
            let ctx = ExecutionContext::new(speaker, ctx_targets);
            run_script(state, registry, &ctx, &def.on_resolve, events);
        }
        state.decks.agenda.discard(agenda);
    }

    if index == 0 {
        reveal_agenda(state, registry, 1, events);
        return;
    }
    ready_all_planets(state, events);
    state.pending = None;
    crate::phases::begin_round(state, events);
}

fn ready_all_planets(state: &mut GameState, events: &mut Vec<Event>) {
    let ids: Vec<_> = state.planets.keys().copied().collect();
    for id in ids {
        if let Some(p) = state.planets.get_mut(&id) {
            if p.exhausted {
                p.ready();
                events.push(Event::public(EventKind::PlanetReadied { planet: id }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{CardDefinition, CardKind};
    use crate::deck::Deck;
    use crate::ids::{PlanetId, SystemId};
    use crate::planet::Planet;
    use crate::types::{Faction, PlayerColor};

    fn fixture() -> (GameState, CardRegistry, Vec<PlayerId>) {
        let mut state = GameState::bare(91, 10);
        let mut reg = CardRegistry::new();
        let players: Vec<PlayerId> = (0..3).map(PlayerId::from_index).collect();
        for &id in &players {
            state.players.insert(
                id,
                crate::player::Player::new(
                    id,
                    Faction::XxchaKingdom,
                    PlayerColor::Green,
                    SystemId::from_raw(1),
                ),
            );
            let planet = PlanetId::from_raw(10 + id.0 as u16);
            let mut pl =
                Planet::new(planet, format!("world-{id}"), SystemId::from_raw(1)).with_values(0, 3);
            pl.controller = Some(id);
            state.planets.insert(planet, pl);
        }
        reg.register(CardDefinition {
            id: CardId::from_raw(500),
            name: "Political Censure",
            kind: CardKind::Agenda(AgendaDef {
                kind: AgendaKind::Law,
                elect: Elect::Player,
                modifier: LawModifier::ElectedGainsVictoryPoint,
                on_resolve: Vec::new(),
            }),
        });
        state.decks.agenda = Deck::new(vec![CardId::from_raw(500)]);
        state.custodians_on_mecatol = false;
        (state, reg, players)
    }

    fn planet_of(id: PlayerId) -> PlanetId {
        PlanetId::from_raw(10 + id.0 as u16)
    }

    #[test]
    fn test_election_enacts_law_and_awards_vp() {
        let (mut state, reg, players) = fixture();
        let mut events = Vec::new();
        begin_agenda_phase(&mut state, &reg, &mut events);
        let order: Vec<PlayerId> = {
            let GamePhase::Agenda(a) = &state.phase else { panic!() };
            let AgendaStage::Voting { queue, .. } = &a.stage else {
                panic!()
            };
            queue.clone()
        };
        assert_eq!(*order.last().unwrap(), state.speaker);
        for &voter in &order {
            handle_cast_votes(
                &mut state,
                &reg,
                voter,
                &[planet_of(voter)],
                Some(Outcome::ElectPlayer(players[2])),
                &mut events,
            )
            .unwrap();
        }
        assert_eq!(state.laws.len(), 1);
        assert_eq!(state.laws[0].elected_player, Some(players[2]));
        assert_eq!(state.players[&players[2]].victory_points, 1);
        // Planets exhausted for votes were readied by the agenda ready step
        // after the (exhausted) deck ran out of a second agenda.
        assert!(!state.planets[&planet_of(players[0])].exhausted);
    }

    #[test]
    fn test_trade_goods_cannot_vote() {
        let (mut state, reg, _players) = fixture();
        let mut events = Vec::new();
        begin_agenda_phase(&mut state, &reg, &mut events);
        let first = state.pending.as_ref().map(|p| p.player).unwrap();
        // An empty planet set with an outcome is rejected; abstention is
        // the only voteless option.
        let err = handle_cast_votes(
            &mut state,
            &reg,
            first,
            &[],
            Some(Outcome::ElectPlayer(first)),
            &mut events,
        )
        .unwrap_err();
        assert_eq!(err.code(), "no_votes");
    }

    #[test]
    fn test_no_votes_goes_to_speaker() {
        let (mut state, reg, players) = fixture();
        let mut events = Vec::new();
        begin_agenda_phase(&mut state, &reg, &mut events);
        let order: Vec<PlayerId> = {
            let GamePhase::Agenda(a) = &state.phase else { panic!() };
            let AgendaStage::Voting { queue, .. } = &a.stage else {
                panic!()
            };
            queue.clone()
        };
        for &voter in &order {
            handle_cast_votes(&mut state, &reg, voter, &[], None, &mut events).unwrap();
        }
        assert_eq!(
            state.pending.as_ref().map(|p| (p.player, p.kind.clone())),
            Some((state.speaker, DecisionKind::ChooseOutcome))
        );
        let speaker = state.speaker;
        handle_choose_outcome(
            &mut state,
            &reg,
            speaker,
            Outcome::ElectPlayer(players[0]),
            &mut events,
        )
        .unwrap();
        assert_eq!(state.laws.len(), 1);
    }
}
