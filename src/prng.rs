//! Deterministic 32-bit linear-congruential generator with forkable sub-streams.
//!
//! Every randomness-consuming phase of turn resolution gets its own fork of
//! this generator rather than sharing one global stream, so that adding or
//! reordering phases never perturbs a sequence another phase already
//! consumed. See [`Prng::fork`].

const MULTIPLIER: u32 = 1664525;
const INCREMENT: u32 = 1013904223;

/// A 32-bit LCG: `state' = state * MULTIPLIER + INCREMENT (mod 2^32)`.
///
/// Deliberately not `rand`-backed: the exact bit sequence this type produces
/// for a given seed is part of the contract (seed scenarios reference it
/// directly), so the algorithm is pinned here rather than left to whatever a
/// dependency's default generator happens to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prng {
    state: u32,
}

impl Prng {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Hash an arbitrary string seed down to a 32-bit integer seed via an
    /// FNV-1a-style rolling hash, then construct the generator from it.
    pub fn from_seed_str(seed: &str) -> Self {
        const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
        const FNV_PRIME: u32 = 0x0100_0193;
        let mut hash = FNV_OFFSET_BASIS;
        for byte in seed.as_bytes() {
            hash ^= *byte as u32;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        Self::new(hash)
    }

    /// Same hash `from_seed_str` uses internally, exposed so callers can
    /// derive a stable integer id from a string without constructing a
    /// generator (e.g. hashing a game id into an initial seed).
    pub fn hash_seed(seed: &str) -> u32 {
        Self::from_seed_str(seed).state
    }

    pub fn state(&self) -> u32 {
        self.state
    }

    fn step(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(MULTIPLIER).wrapping_add(INCREMENT);
        self.state
    }

    /// Next float in `[0, 1)`.
    pub fn next(&mut self) -> f64 {
        self.step() as f64 / (u32::MAX as f64 + 1.0)
    }

    /// Next integer in `[min, max]` inclusive. `min` and `max` may be equal.
    pub fn next_int(&mut self, min: i64, max: i64) -> i64 {
        debug_assert!(min <= max, "next_int: min {min} > max {max}");
        let span = (max - min + 1) as f64;
        min + (self.next() * span).floor() as i64
    }

    /// A child generator seeded from this generator's *current* state. The
    /// parent's stream is left untouched; only the child advances.
    pub fn fork(&self) -> Prng {
        Prng::new(self.state)
    }

    /// Pick one item by weight. Errors on empty input or non-positive total
    /// weight: a validated theme must never reach either case, so this is a
    /// guarded precondition violation rather than a recoverable error.
    pub fn weighted_choice<'a, T>(&mut self, items: &'a [(T, f64)]) -> Result<&'a T, WeightedChoiceError> {
        if items.is_empty() {
            return Err(WeightedChoiceError::Empty);
        }
        let total: f64 = items.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Err(WeightedChoiceError::NonPositiveWeight);
        }
        let roll = self.next() * total;
        let mut cumulative = 0.0;
        for (item, weight) in items {
            cumulative += weight;
            if roll < cumulative {
                return Ok(item);
            }
        }
        // Floating point rounding can push the roll past the final
        // cumulative sum by an epsilon; fall back to the last item.
        Ok(&items.last().unwrap().0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WeightedChoiceError {
    #[error("weighted_choice called with no candidates")]
    Empty,
    #[error("weighted_choice called with non-positive total weight")]
    NonPositiveWeight,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Prng::new(42);
        let mut b = Prng::new(42);
        for _ in 0..100 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = Prng::new(1);
        let mut b = Prng::new(2);
        assert_ne!(a.next(), b.next());
    }

    #[test]
    fn fork_does_not_advance_parent() {
        let mut parent = Prng::new(7);
        let parent_state_before = parent.state();
        let mut child = parent.fork();
        child.next();
        child.next();
        assert_eq!(parent.state(), parent_state_before);
        parent.next();
        assert_eq!(parent.state(), Prng::new(7).next_state_for_test());
    }

    impl Prng {
        fn next_state_for_test(mut self) -> u32 {
            self.step()
        }
    }

    #[test]
    fn next_int_inclusive_bounds() {
        let mut rng = Prng::new(123);
        for _ in 0..1000 {
            let v = rng.next_int(3, 5);
            assert!((3..=5).contains(&v));
        }
    }

    #[test]
    fn hash_seed_deterministic_and_u32() {
        assert_eq!(Prng::hash_seed("game-1"), Prng::hash_seed("game-1"));
        assert_ne!(Prng::hash_seed("game-1"), Prng::hash_seed("game-2"));
    }

    #[test]
    fn weighted_choice_errors_on_empty() {
        let mut rng = Prng::new(1);
        let items: Vec<(u32, f64)> = vec![];
        assert_eq!(rng.weighted_choice(&items), Err(WeightedChoiceError::Empty));
    }

    #[test]
    fn weighted_choice_picks_only_candidate() {
        let mut rng = Prng::new(1);
        let items = vec![("only", 1.0)];
        assert_eq!(rng.weighted_choice(&items), Ok(&"only"));
    }

    proptest::proptest! {
        #[test]
        fn fork_independence(seed: u32, steps in 1u32..50) {
            let parent = Prng::new(seed);
            let mut child = parent.fork();
            for _ in 0..steps {
                child.next();
            }
            let mut parent_copy = parent;
            let mut expected_copy = Prng::new(seed);
            proptest::prop_assert_eq!(parent_copy.next(), expected_copy.next());
        }
    }
}
