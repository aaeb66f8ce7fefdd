//! Randomness used by the gate, pitch jitter and note lengths
//!
//! Everything random in the pipeline goes through [`RandomSource`], so tests
//! can swap in [`ConstantRandom`] and get fixed accept/reject outcomes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait RandomSource: Send {
    /// Uniform draw in `[0, 1)`
    fn unit(&mut self) -> f64;

    /// `true` with probability `p`. Never `true` for `p <= 0`.
    fn chance(&mut self, p: f64) -> bool {
        p > 0.0 && self.unit() < p
    }

    /// Uniform draw in `[lo, hi)`
    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.unit()
    }

    /// Index into a slice of length `len`; `len` must be non-zero
    fn pick(&mut self, len: usize) -> usize {
        ((self.unit() * len as f64) as usize).min(len.saturating_sub(1))
    }
}

/// Standard generator, optionally seeded for reproducible sessions
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl RandomSource for SeededRandom {
    fn unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Returns the same draw every time.
///
/// `ConstantRandom(0.0)` passes every non-zero chance; `ConstantRandom(0.999)`
/// fails every chance below 0.999.
#[derive(Debug, Clone, Copy)]
pub struct ConstantRandom(pub f64);

impl RandomSource for ConstantRandom {
    fn unit(&mut self) -> f64 {
        self.0
    }
}
