//! Ordered decks with discard piles.
//!
//! Draw comes from the top (end of the vector). When the draw pile runs out,
//! the discard pile is shuffled in place to form a new deck; when both are
//! empty, drawing yields nothing and the caller decides whether that is a
//! warning or a rejection.

use crate::ids::CardId;
use crate::rng::DiceStream;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Deck {
    /// Draw pile; the top of the deck is the last element.
    cards: Vec<CardId>,
    discard: Vec<CardId>,
}

impl Deck {
    pub fn new(cards: Vec<CardId>) -> Self {
        Self {
            cards,
            discard: Vec::new(),
        }
    }

    pub fn shuffled(mut cards: Vec<CardId>, rng: &mut DiceStream) -> Self {
        rng.shuffle(&mut cards);
        Self::new(cards)
    }

    /// Draw the top card, reshuffling the discard pile first if the draw
    /// pile is empty.
    pub fn draw(&mut self, rng: &mut DiceStream) -> Option<CardId> {
        if self.cards.is_empty() && !self.discard.is_empty() {
            std::mem::swap(&mut self.cards, &mut self.discard);
            rng.shuffle(&mut self.cards);
        }
        self.cards.pop()
    }

    pub fn discard(&mut self, card: CardId) {
        self.discard.push(card);
    }

    /// Return a card to the draw pile and shuffle (secret objective returns).
    pub fn return_and_shuffle(&mut self, card: CardId, rng: &mut DiceStream) {
        self.cards.push(card);
        rng.shuffle(&mut self.cards);
    }

    pub fn draw_remaining(&self) -> usize {
        self.cards.len()
    }

    pub fn discard_pile(&self) -> &[CardId] {
        &self.discard
    }

    pub fn is_exhausted(&self) -> bool {
        self.cards.is_empty() && self.discard.is_empty()
    }

    /// Whether a card currently sits in the draw or discard pile.
    pub fn contains(&self, card: CardId) -> bool {
        self.cards.contains(&card) || self.discard.contains(&card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(range: std::ops::Range<u16>) -> Vec<CardId> {
        range.map(CardId::from_raw).collect()
    }

    #[test]
    fn test_draw_comes_from_the_top() {
        let mut rng = DiceStream::from_seed(1);
        let mut deck = Deck::new(ids(0..3));
        assert_eq!(deck.draw(&mut rng), Some(CardId::from_raw(2)));
        assert_eq!(deck.draw(&mut rng), Some(CardId::from_raw(1)));
    }

    #[test]
    fn test_empty_deck_reshuffles_discard() {
        let mut rng = DiceStream::from_seed(1);
        let mut deck = Deck::new(ids(0..1));
        assert_eq!(deck.draw(&mut rng), Some(CardId::from_raw(0)));
        deck.discard(CardId::from_raw(0));
        assert_eq!(deck.draw_remaining(), 0);
        assert_eq!(deck.draw(&mut rng), Some(CardId::from_raw(0)));
        assert!(deck.discard_pile().is_empty());
    }

    #[test]
    fn test_empty_deck_and_discard_draws_nothing() {
        let mut rng = DiceStream::from_seed(1);
        let mut deck = Deck::new(Vec::new());
        assert_eq!(deck.draw(&mut rng), None);
        assert!(deck.is_exhausted());
    }

    #[test]
    fn test_shuffle_is_deterministic_per_seed() {
        let mut a = DiceStream::from_seed(5);
        let mut b = DiceStream::from_seed(5);
        let da = Deck::shuffled(ids(0..20), &mut a);
        let db = Deck::shuffled(ids(0..20), &mut b);
        assert_eq!(da, db);
    }
}
