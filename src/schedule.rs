//! Annealed teacher forcing.
//!
//! Training starts fully teacher forced and linearly hands over to the model's own
//! predictions as the global step grows.

use crate::config::{HelperConfig, ScheduleConfig};

/// Linear ramp of the scheduled-sampling probability over training steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingSchedule {
    start_step: usize,
    end_step: usize,
    final_prob: f32,
}

impl SamplingSchedule {
    /// Create a schedule. `end_step` is clamped to at least `start_step` and
    /// `final_prob` to `[0, 1]`.
    pub fn new(start_step: usize, end_step: usize, final_prob: f32) -> Self {
        Self {
            start_step,
            end_step: end_step.max(start_step),
            final_prob: final_prob.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self::new(config.start_step, config.end_step, config.final_prob)
    }

    /// Sampling probability at a global training step.
    #[must_use]
    pub fn sampling_prob(&self, step: usize) -> f32 {
        if step < self.start_step {
            return 0.0;
        }
        let span = self.end_step - self.start_step;
        if span == 0 {
            return self.final_prob;
        }
        let progress = ((step - self.start_step) as f64 / span as f64).min(1.0);
        (self.final_prob as f64 * progress) as f32
    }

    /// Helper configuration for one training step.
    ///
    /// Only configurations with `anneal_teacher_forcing` set pick up the scheduled
    /// probability; anything else is returned as is.
    pub fn apply(&self, config: &HelperConfig, step: usize) -> HelperConfig {
        let mut config = config.clone();
        if config.anneal_teacher_forcing {
            config.sampling_prob = self.sampling_prob(step);
        }
        config
    }
}
