//! Seedable randomness for reproducible runs.
//!
//! Every random choice in a run flows from one master seed. Independent
//! streams are derived with [`BenchRng::fork`], which consumes exactly one
//! draw from the parent, so the order of forks is part of the contract:
//!
//! ```text
//! master (benchmark.seed)
//!   ├─> topology      (floor layout, AP names)
//!   ├─> population    (history written before ingestion)
//!   ├─> ingest        (one fork per producer thread)
//!   └─> query         (one fork per query thread)
//!         ├─> warm-up
//!         └─> prepare
//! ```

use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic random number generator.
///
/// ChaCha8 gives the same stream on every platform for a given seed.
#[derive(Debug, Clone)]
pub struct BenchRng {
    inner: ChaCha8Rng,
}

impl BenchRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    /// Uniform draw in `[0.0, 1.0)`.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        self.inner.r#gen()
    }

    /// Uniform draw in `[0, bound)`. Returns 0 when `bound` is 0.
    #[inline]
    pub fn next_below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.inner.gen_range(0..bound)
    }

    /// Uniform index in `[0, max)`. Returns 0 when `max` is 0.
    #[inline]
    pub fn next_usize(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        self.inner.gen_range(0..max)
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.inner);
    }

    /// Derives an independent stream from this one.
    pub fn fork(&mut self) -> Self {
        Self::new(self.next_u64())
    }
}
