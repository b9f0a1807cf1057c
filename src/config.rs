//! Configuration types for decoding helpers, the host loop and the prenet.
//!
//! Configurations are typically loaded from YAML files using [`load_config`].

use crate::error::HelperError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
/// Options recognised by both decoding helpers. Omitted fields take the values
/// of [`HelperConfig::default`].
pub struct HelperConfig {
    /// Probability of feeding the model's own output instead of the ground truth.
    pub sampling_prob: f32,
    /// Draw sampling decisions even when `sampling_prob` is zero.
    pub anneal_teacher_forcing: bool,
    /// Detach ground truth and model output from the autodiff graph.
    pub stop_gradient: bool,
    /// Inputs are laid out `[time, batch, feature]` instead of `[batch, time, feature]`.
    pub time_major: bool,
    /// Report sequences as finished (by length or stop token) instead of always running.
    pub mask_decoder_sequence: bool,
    /// Seed for the scheduled-sampling draws. Entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for HelperConfig {
    /// Pure teacher forcing, batch-major inputs, masking enabled.
    fn default() -> Self {
        Self {
            sampling_prob: 0.0,
            anneal_teacher_forcing: false,
            stop_gradient: false,
            time_major: false,
            mask_decoder_sequence: true,
            seed: None,
        }
    }
}

impl HelperConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), HelperError> {
        if !self.sampling_prob.is_finite() || !(0.0..=1.0).contains(&self.sampling_prob) {
            return Err(HelperError::InvalidConfig(format!(
                "sampling_prob must be in [0, 1], got {}",
                self.sampling_prob
            )));
        }
        Ok(())
    }

    /// Whether next inputs are blended from model output and ground truth.
    pub fn uses_sampling(&self) -> bool {
        self.anneal_teacher_forcing || self.sampling_prob > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
/// Host decoding loop settings.
pub struct DecodeConfig {
    /// Hard cap on decode steps.
    pub max_steps: usize,
    /// Zero the outputs of sequences that already finished.
    #[serde(default = "default_impute_finished")]
    pub impute_finished: bool,
}

fn default_impute_finished() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
/// Linear ramp for annealed teacher forcing.
pub struct ScheduleConfig {
    /// Training step at which the ramp starts.
    #[serde(default)]
    pub start_step: usize,
    /// Training step at which `final_prob` is reached.
    pub end_step: usize,
    /// Sampling probability at the end of the ramp.
    pub final_prob: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
/// Dense prenet shape and optional weights.
pub struct PrenetConfig {
    /// Feature dimension of the decoder inputs.
    pub input_dim: usize,
    /// Output width of each dense layer.
    pub layer_sizes: Vec<usize>,
    /// Optional safetensors file holding the layer weights.
    #[serde(default)]
    pub weights_path: Option<String>,
}

/// Top-level configuration for a decode run.
///
/// # Example YAML
///
/// ```yaml
/// helper:
///   sampling_prob: 0.2
///   mask_decoder_sequence: true
///   seed: 7
/// decode:
///   max_steps: 400
/// prenet:
///   input_dim: 80
///   layer_sizes: [256, 256]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Helper options.
    #[serde(default)]
    pub helper: HelperConfig,
    /// Host loop options.
    pub decode: DecodeConfig,
    /// Optional sampling-probability schedule.
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
    /// Optional dense prenet.
    #[serde(default)]
    pub prenet: Option<PrenetConfig>,
}

impl Config {
    /// Check every section for out-of-range values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.helper.validate()?;
        if self.decode.max_steps == 0 {
            anyhow::bail!("decode.max_steps must be > 0");
        }
        if let Some(schedule) = &self.schedule {
            if schedule.end_step < schedule.start_step {
                anyhow::bail!(
                    "schedule.end_step ({}) must not precede schedule.start_step ({})",
                    schedule.end_step,
                    schedule.start_step
                );
            }
            if !(0.0..=1.0).contains(&schedule.final_prob) {
                anyhow::bail!(
                    "schedule.final_prob must be in [0, 1], got {}",
                    schedule.final_prob
                );
            }
        }
        if let Some(prenet) = &self.prenet {
            if prenet.input_dim == 0 || prenet.layer_sizes.iter().any(|&size| size == 0) {
                anyhow::bail!("prenet dimensions must be non-zero");
            }
        }
        Ok(())
    }
}

/// Load and validate a configuration from a YAML file.
///
/// # Errors
///
/// Returns an error if the file doesn't exist, contains invalid YAML, or holds
/// out-of-range values.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    let data = fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&data)?;
    config.validate()?;
    Ok(config)
}

/// Resolve a possibly relative path against a config file location.
pub fn resolve_relative_path(config_path: &Path, maybe_relative: &str) -> PathBuf {
    let candidate = Path::new(maybe_relative);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(candidate)
}

#[cfg(test)]
mod tests {
    use super::{resolve_relative_path, Config, HelperConfig};
    use std::path::Path;

    #[test]
    fn helper_section_defaults_when_omitted() {
        let config: Config = serde_yaml::from_str("decode:\n  max_steps: 10\n").expect("parse");
        assert_eq!(config.helper, HelperConfig::default());
        assert!(config.decode.impute_finished);
        assert!(config.schedule.is_none());
        config.validate().expect("valid");
    }

    #[test]
    fn rejects_unknown_helper_options() {
        let yaml = "helper:\n  sampling_probability: 0.5\ndecode:\n  max_steps: 10\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn sampling_prob_outside_unit_interval_is_invalid() {
        let config = HelperConfig {
            sampling_prob: 1.5,
            ..HelperConfig::default()
        };
        assert!(config.validate().is_err());

        let config = HelperConfig {
            sampling_prob: f32::NAN,
            ..HelperConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn annealing_enables_sampling_at_zero_probability() {
        let config = HelperConfig {
            anneal_teacher_forcing: true,
            ..HelperConfig::default()
        };
        assert!(config.uses_sampling());
        assert!(!HelperConfig::default().uses_sampling());
    }

    #[test]
    fn relative_paths_resolve_next_to_config() {
        let resolved = resolve_relative_path(Path::new("/cfg/run.yaml"), "prenet.safetensors");
        assert_eq!(resolved, Path::new("/cfg/prenet.safetensors"));
        let absolute = resolve_relative_path(Path::new("/cfg/run.yaml"), "/w/p.safetensors");
        assert_eq!(absolute, Path::new("/w/p.safetensors"));
    }
}
