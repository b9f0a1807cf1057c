//! Seeded Bernoulli draws for scheduled sampling.
//!
//! Each step draws one decision per batch element. The random stream is seeded
//! explicitly and can be handed from one batch's sampler to the next, so a
//! training run draws fresh decisions per batch and still replays exactly.

use crate::error::HelperError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random source for scheduled sampling: seeded when `seed` is set, from OS
/// entropy otherwise.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Independent per-element Bernoulli(`prob`) decisions.
#[derive(Debug, Clone)]
pub struct BernoulliSampler {
    prob: f64,
    rng: StdRng,
}

impl BernoulliSampler {
    /// Create a sampler with its own random source.
    pub fn new(prob: f32, seed: Option<u64>) -> Result<Self, HelperError> {
        Self::with_rng(prob, seeded_rng(seed))
    }

    /// Create a sampler that continues an existing random stream.
    pub fn with_rng(prob: f32, rng: StdRng) -> Result<Self, HelperError> {
        if !prob.is_finite() || !(0.0..=1.0).contains(&prob) {
            return Err(HelperError::InvalidConfig(format!(
                "Bernoulli probability must be in [0, 1], got {prob}"
            )));
        }
        Ok(Self {
            prob: prob as f64,
            rng,
        })
    }

    pub fn prob(&self) -> f32 {
        self.prob as f32
    }

    /// Draw `batch` decisions on the host.
    pub fn draw(&mut self, batch: usize) -> Vec<bool> {
        (0..batch).map(|_| self.rng.gen_bool(self.prob)).collect()
    }

    /// Give back the random stream, positioned after the last draw.
    pub fn into_rng(self) -> StdRng {
        self.rng
    }
}
