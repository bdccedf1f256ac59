//! Observation: project the full state to what one player may see.
//!
//! The state stores complete information; this projection redacts other
//! players' action cards, promissory hands, unscored secrets, and every
//! deck's contents and order, exposing aggregate counts instead.

use std::collections::BTreeMap;

use crate::deck::Deck;
use crate::event::Event;
use crate::ids::PlayerId;
use crate::rng::DiceStream;
use crate::state::GameState;

/// Hidden-zone sizes exposed in place of contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct HandCounts {
    pub action_cards: u8,
    pub promissory_notes: u8,
    pub unscored_secrets: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct DeckCounts {
    pub action: usize,
    pub agenda: usize,
    pub secret: usize,
    pub relic: usize,
    pub exploration: usize,
}

/// A viewer-scoped snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PublicState {
    pub viewer: PlayerId,
    /// The redacted snapshot: hidden zones of other players are emptied and
    /// deck order is erased.
    pub state: GameState,
    pub hand_counts: BTreeMap<PlayerId, HandCounts>,
    pub deck_counts: DeckCounts,
}

pub fn observe(state: &GameState, viewer: PlayerId) -> PublicState {
    let mut projected = state.clone();
    let mut hand_counts = BTreeMap::new();
    for (&id, player) in &state.players {
        hand_counts.insert(
            id,
            HandCounts {
                action_cards: player.action_cards.len() as u8,
                promissory_notes: player.promissory_hand.len() as u8,
                unscored_secrets: player.secret_hand.len() as u8,
            },
        );
        if id != viewer {
            if let Some(p) = projected.players.get_mut(&id) {
                p.action_cards.clear();
                p.promissory_hand.clear();
                p.secret_hand.clear();
            }
        }
    }
    let deck_counts = DeckCounts {
        action: state.decks.action.draw_remaining(),
        agenda: state.decks.agenda.draw_remaining(),
        secret: state.decks.secret.draw_remaining(),
        relic: state.decks.relic.draw_remaining(),
        exploration: state.decks.cultural.draw_remaining()
            + state.decks.hazardous.draw_remaining()
            + state.decks.industrial.draw_remaining()
            + state.decks.frontier.draw_remaining(),
    };
    // The dice stream never leaves the engine: seed and position together
    // predict every future roll and shuffle, so the projection carries an
    // inert stand-in instead.
    projected.rng = DiceStream::from_seed(0);

    // Deck contents and order never leave the engine. The unrevealed
    // objective rows are blanked the same way.
    projected.decks.action = Deck::default();
    projected.decks.agenda = Deck::default();
    projected.decks.secret = Deck::default();
    projected.decks.relic = Deck::default();
    projected.decks.cultural = Deck::default();
    projected.decks.hazardous = Deck::default();
    projected.decks.industrial = Deck::default();
    projected.decks.frontier = Deck::default();
    projected.decks.stage1.truncate(projected.decks.stage1_revealed);
    projected.decks.stage2.truncate(projected.decks.stage2_revealed);

    PublicState {
        viewer,
        state: projected,
        hand_counts,
        deck_counts,
    }
}

/// Filter an event log down to what a viewer may see.
pub fn visible_events(events: &[Event], viewer: PlayerId) -> Vec<Event> {
    events
        .iter()
        .filter(|e| e.visible_to(viewer))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::Deck;
    use crate::ids::{CardId, SystemId};
    use crate::types::{Faction, PlayerColor};

    fn state_with_hands() -> GameState {
        let mut state = GameState::bare(61, 10);
        for i in 0..3 {
            let id = PlayerId::from_index(i);
            let mut p = crate::player::Player::new(
                id,
                Faction::YssarilTribes,
                PlayerColor::Black,
                SystemId::from_raw(1),
            );
            p.action_cards.push(CardId::from_raw(100 + i as u16));
            p.secret_hand.push(CardId::from_raw(200 + i as u16));
            state.players.insert(id, p);
        }
        state.decks.action = Deck::new(vec![CardId::from_raw(1), CardId::from_raw(2)]);
        state
    }

    #[test]
    fn test_projection_hides_other_hands() {
        let state = state_with_hands();
        let (v0, v1) = (PlayerId::from_index(0), PlayerId::from_index(1));
        let view = observe(&state, v0);
        assert_eq!(view.state.players[&v0].action_cards.len(), 1);
        assert!(view.state.players[&v1].action_cards.is_empty());
        assert!(view.state.players[&v1].secret_hand.is_empty());
        assert_eq!(view.hand_counts[&v1].action_cards, 1);
    }

    #[test]
    fn test_projection_hides_deck_order() {
        let state = state_with_hands();
        let view = observe(&state, PlayerId::from_index(0));
        assert_eq!(view.state.decks.action.draw_remaining(), 0);
        assert_eq!(view.deck_counts.action, 2);
    }

    #[test]
    fn test_projection_hides_the_dice_stream() {
        let mut state = state_with_hands();
        // Advance the stream so position differs from a fresh one too.
        let _ = state.rng.roll(5);
        let view = observe(&state, PlayerId::from_index(0));
        assert_ne!(view.state.rng, state.rng);
        assert_eq!(view.state.rng, DiceStream::from_seed(0));
    }

    #[test]
    fn test_two_viewers_agree_on_third_player() {
        let state = state_with_hands();
        let v2 = PlayerId::from_index(2);
        let a = observe(&state, PlayerId::from_index(0));
        let b = observe(&state, PlayerId::from_index(1));
        assert!(a.state.players[&v2].action_cards.is_empty());
        assert!(b.state.players[&v2].action_cards.is_empty());
        assert_eq!(a.hand_counts[&v2], b.hand_counts[&v2]);
    }
}
