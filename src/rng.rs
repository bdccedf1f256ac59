//! Deterministic random stream owned by the game state.
//!
//! The stream is stored as a seed plus a word position into a ChaCha8
//! keystream, so the state stays plain data: snapshotting and replaying a
//! game from `(seed, intent log)` reproduces every die face and shuffle
//! exactly. Each draw reconstructs the cipher at the saved position, which is
//! O(1) for ChaCha.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded dice/shuffle stream.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct DiceStream {
    seed: u64,
    /// ChaCha word position split into halves so the snapshot is pure u64s.
    pos_lo: u64,
    pos_hi: u64,
}

impl DiceStream {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            pos_lo: 0,
            pos_hi: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn with_rng<T>(&mut self, f: impl FnOnce(&mut ChaCha8Rng) -> T) -> T {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_word_pos(u128::from(self.pos_hi) << 64 | u128::from(self.pos_lo));
        let out = f(&mut rng);
        let pos = rng.get_word_pos();
        self.pos_lo = pos as u64;
        self.pos_hi = (pos >> 64) as u64;
        out
    }

    /// Roll one ten-sided die, faces 1..=10.
    pub fn d10(&mut self) -> u8 {
        self.with_rng(|rng| rng.random_range(1..=10))
    }

    /// Roll `n` ten-sided dice.
    pub fn roll(&mut self, n: usize) -> Vec<u8> {
        self.with_rng(|rng| (0..n).map(|_| rng.random_range(1..=10)).collect())
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        self.with_rng(|rng| {
            for i in (1..items.len()).rev() {
                let j = rng.random_range(0..=i);
                items.swap(i, j);
            }
        });
    }

    /// Pick a uniform index below `bound`. Returns `None` for an empty range.
    pub fn pick(&mut self, bound: usize) -> Option<usize> {
        if bound == 0 {
            return None;
        }
        Some(self.with_rng(|rng| rng.random_range(0..bound)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = DiceStream::from_seed(42);
        let mut b = DiceStream::from_seed(42);
        assert_eq!(a.roll(20), b.roll(20));
        assert_eq!(a.d10(), b.d10());
    }

    #[test]
    fn test_snapshot_resumes_mid_stream() {
        let mut a = DiceStream::from_seed(7);
        let _ = a.roll(5);
        let snapshot = a.clone();
        let rest_a = a.roll(10);
        let mut b = snapshot;
        assert_eq!(b.roll(10), rest_a);
    }

    #[test]
    fn test_d10_in_range() {
        let mut s = DiceStream::from_seed(1);
        for _ in 0..200 {
            let face = s.d10();
            assert!((1..=10).contains(&face));
        }
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut s = DiceStream::from_seed(9);
        let mut v: Vec<u32> = (0..32).collect();
        s.shuffle(&mut v);
        let mut sorted = v.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_pick_empty_is_none() {
        let mut s = DiceStream::from_seed(3);
        assert_eq!(s.pick(0), None);
        assert!(s.pick(4).is_some());
    }
}
