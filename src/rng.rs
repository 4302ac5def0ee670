//! # RandomNumberGenerator
//!
//! The `RandomNumberGenerator` struct is the single random source used by the
//! gene sampler and the breeding operators. Every operator takes it as
//! `&mut RandomNumberGenerator`, so tests inject a seeded instance to make
//! sampling, selection and mutation reproducible.
//!
//! ## Example
//!
//! ```rust
//! use genoptim::rng::RandomNumberGenerator;
//!
//! let mut rng = RandomNumberGenerator::from_seed(7);
//! let step = rng.uniform(0.005, 0.5);
//! assert!((0.005..0.5).contains(&step));
//! ```

use rand::{rngs::StdRng, Rng, SeedableRng};

/// A wrapper around the `rand` crate's `StdRng` that provides the draws the
/// optimizer needs.
#[derive(Clone)]
pub struct RandomNumberGenerator {
    pub rng: StdRng,
}

impl RandomNumberGenerator {
    /// Creates a new `RandomNumberGenerator` instance seeded from the system entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a new `RandomNumberGenerator` instance with a specific seed.
    ///
    /// This is useful for reproducible tests and benchmarks.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// A uniform draw in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// A uniform draw in `[low, high]`. Callers guarantee `low <= high`.
    pub fn uniform_inclusive(&mut self, low: f64, high: f64) -> f64 {
        if low >= high {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    /// A uniform draw in `[low, high)`. Callers guarantee `low < high`.
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        self.rng.gen_range(low..high)
    }

    /// A uniformly random index into a collection of `len` elements.
    ///
    /// `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    /// Returns `true` with probability `p`. Values outside `[0, 1]` are clamped.
    pub fn chance(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Returns `1.0` or `-1.0` with equal probability.
    pub fn sign(&mut self) -> f64 {
        if self.rng.gen_bool(0.5) {
            1.0
        } else {
            -1.0
        }
    }
}

impl Default for RandomNumberGenerator {
    fn default() -> Self {
        Self::new()
    }
}
