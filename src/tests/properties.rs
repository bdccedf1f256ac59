//! Cross-cutting properties: determinism, conservation, idempotent
//! rejection, purge permanence, observation safety, snapshot round-trips.

use super::{game_of, skirmish};
use crate::engine::{Game, replay};
use crate::ids::{CardId, PlayerId, SystemId};
use crate::intent::{Intent, Rejection};
use crate::setup::{GameOptions, PlayerSetup};
use crate::state::GamePhase;
use crate::types::{Faction, PlayerColor, UnitType};
use crate::unit::UnitLocation;

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

/// Drive a full game on timeouts alone for a few rounds; every state along
/// the way satisfies the structural invariants, and the same log replays to
/// the same end state.
#[test]
fn timeouts_drive_whole_rounds_deterministically() {
    let (mut game, _) = Game::new(&options(), 99).unwrap();
    let mut log = Vec::new();
    for _ in 0..160 {
        if matches!(game.state().phase, GamePhase::Finished { .. }) {
            break;
        }
        let Some(pending) = game.state().pending.clone() else {
            break;
        };
        let intent = Intent::Timeout {
            player: pending.player,
        };
        match game.submit(&intent) {
            Ok(_) => log.push(intent),
            Err(err) => panic!("timeout wedged on {:?}: {err}", pending.kind),
        }
    }
    assert!(game.state().round >= 3, "several rounds should have passed");

    let (replayed, _) = replay(&options(), 99, &log).unwrap();
    assert_eq!(&replayed, game.state());
}

#[test]
fn passing_twice_is_rejected_and_changes_nothing() {
    let (state, a, _b) = skirmish(11);
    let mut game = game_of(state);
    game.submit(&Intent::Pass { player: a }).unwrap();
    let before = game.state().clone();
    let err = game.submit(&Intent::Pass { player: a }).unwrap_err();
    assert!(matches!(err, Rejection::InvalidIntent { .. }));
    assert_eq!(game.state(), &before);
}

#[test]
fn command_tokens_are_conserved_across_a_tactical_action() {
    let (mut state, a, _b) = skirmish(12);
    state
        .spawn_unit(a, UnitType::Cruiser, UnitLocation::Space(SystemId::from_raw(1)))
        .unwrap();
    let total_before = {
        let p = &state.players[&a];
        p.command.total() + p.token_reinforcements
    };
    let mut game = game_of(state);
    game.submit(&Intent::ActivateSystem {
        player: a,
        system: SystemId::from_raw(2),
    })
    .unwrap();
    let on_board: u8 = game
        .state()
        .command_tokens_on_board
        .values()
        .map(|s| s.iter().filter(|&&p| p == a).count() as u8)
        .sum();
    let p = &game.state().players[&a];
    assert_eq!(
        p.command.total() + p.token_reinforcements + on_board,
        total_before
    );
}

#[test]
fn purged_components_never_return() {
    let (mut state, a, _b) = skirmish(13);
    let fragment = CardId::from_raw(240);
    state.players.get_mut(&a).unwrap().relic_fragments = vec![
        CardId::from_raw(240),
        CardId::from_raw(240),
        CardId::from_raw(240),
    ];
    state.decks.relic = crate::deck::Deck::new(vec![CardId::from_raw(230)]);
    // Three matching fragments trade for a relic through a component action.
    let mut game = game_of(state);
    game.submit(&Intent::TradeRelicFragments {
        player: a,
        fragments: vec![fragment, fragment, fragment],
    })
    .unwrap();
    let state = game.state();
    assert!(state.is_purged(fragment));
    assert!(state.players[&a].relic_fragments.is_empty());
    assert!(!state.decks.cultural.contains(fragment));
    assert!(!state.decks.relic.contains(state.players[&a].relics[0]));
}

#[test]
fn observation_never_leaks_between_viewers() {
    let (state, _, _) = crate::setup::new_game(&options(), 31).unwrap();
    let players: Vec<PlayerId> = state.players.keys().copied().collect();
    for &v1 in &players {
        let view = crate::observe::observe(&state, v1);
        for &v3 in &players {
            if v3 == v1 {
                continue;
            }
            assert!(view.state.players[&v3].action_cards.is_empty());
            assert!(view.state.players[&v3].secret_hand.is_empty());
            assert!(view.state.players[&v3].promissory_hand.is_empty());
        }
        assert_eq!(view.state.decks.secret.draw_remaining(), 0);
        assert_eq!(view.state.decks.action.draw_remaining(), 0);
        // The dice stream would predict every future roll and shuffle.
        assert_ne!(view.state.rng, state.rng);
    }
}

#[test]
fn victory_points_never_decrease() {
    let (mut game, _) = Game::new(&options(), 55).unwrap();
    let mut best: std::collections::BTreeMap<PlayerId, u8> = Default::default();
    for _ in 0..160 {
        if matches!(game.state().phase, GamePhase::Finished { .. }) {
            break;
        }
        let Some(pending) = game.state().pending.clone() else {
            break;
        };
        if game
            .submit(&Intent::Timeout {
                player: pending.player,
            })
            .is_err()
        {
            break;
        }
        for (id, p) in &game.state().players {
            let floor = best.entry(*id).or_insert(0);
            assert!(p.victory_points >= *floor, "VP dropped for {id}");
            *floor = p.victory_points;
        }
    }
}

#[test]
fn a_fourth_secret_forces_a_return() {
    let (mut state, a, b) = skirmish(14);
    state.players.get_mut(&a).unwrap().secret_hand = vec![
        CardId::from_raw(120),
        CardId::from_raw(121),
        CardId::from_raw(122),
        CardId::from_raw(123),
    ];
    let mut game = game_of(state);
    // Any resolution with four unscored secrets forces the return first.
    game.submit(&Intent::Pass { player: a }).unwrap();
    assert_eq!(
        game.state().pending.as_ref().map(|p| (p.player, p.kind.clone())),
        Some((a, crate::intent::DecisionKind::ReturnSecretObjective))
    );
    game.submit(&Intent::ReturnSecretObjective {
        player: a,
        card: CardId::from_raw(120),
    })
    .unwrap();
    assert_eq!(game.state().players[&a].secret_hand.len(), 3);
    assert!(game.state().decks.secret.contains(CardId::from_raw(120)));
    // The interrupted flow resumes: the next player's turn is back on.
    assert_eq!(game.state().pending.as_ref().map(|p| p.player), Some(b));
}

#[cfg(feature = "serialization")]
#[test]
fn snapshot_round_trips_through_json() {
    let (mut game, _) = Game::new(&options(), 21).unwrap();
    // Advance into the action phase so the snapshot carries sub-state.
    for _ in 0..7 {
        let Some(pending) = game.state().pending.clone() else {
            break;
        };
        game.submit(&Intent::Timeout {
            player: pending.player,
        })
        .unwrap();
    }
    let state = game.state().clone();
    let json = serde_json::to_string(&state).unwrap();
    let back: crate::state::GameState = serde_json::from_str(&json).unwrap();
    assert_eq!(back, state);

    // Intents and events round-trip the same way.
    let intent = Intent::ActivateSystem {
        player: PlayerId::from_index(0),
        system: SystemId::from_raw(18),
    };
    let json = serde_json::to_string(&intent).unwrap();
    let back: Intent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, intent);
}
