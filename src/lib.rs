//! # tacostep - decoding helpers for Tacotron-style decoders
//!
//! An attention-based text-to-speech decoder produces one spectrogram frame per
//! step. What feeds the *next* step, and when a sequence counts as finished, is
//! decided by a small state machine: the decoding helper. This crate implements
//! that state machine on top of the [`burn`] tensor runtime.
//!
//! ## Architecture Overview
//!
//! 1. **Helpers** ([`TrainingHelper`], [`InferenceHelper`]): per-step policy.
//!    Training feeds ground-truth frames (teacher forcing) and can swap in the
//!    model's own predictions per sequence (scheduled sampling). Inference feeds
//!    predictions back and stops on a stop-token logit.
//!
//! 2. **Host loop** ([`dynamic_decode`]): calls a [`DecoderCell`] and a helper until
//!    every sequence finishes or the step budget runs out.
//!
//! 3. **Prenet** ([`Prenet`], [`DensePrenet`]): the transform applied to every
//!    vector a helper selects as the next input.
//!
//! ## Quick Start
//!
//! ```no_run
//! use burn_ndarray::{NdArray, NdArrayDevice};
//! use burn::tensor::Tensor;
//! use tacostep::{
//!     dynamic_decode, seeded_rng, DecodeOptions, DenseCellConfig, HelperConfig,
//!     TrainingHelper,
//! };
//!
//! type B = NdArray<f32>;
//! let device = NdArrayDevice::default();
//!
//! // Ground truth: 2 sequences, up to 50 frames of 80 mel bins.
//! let mels = Tensor::<B, 3>::zeros([2, 50, 80], &device);
//! let config = HelperConfig { sampling_prob: 0.2, seed: Some(7), ..HelperConfig::default() };
//! let mut helper =
//!     TrainingHelper::new(mels, &[50, 37], None, &config, seeded_rng(config.seed)).unwrap();
//!
//! let cell = DenseCellConfig::new(80, 256, 80).init::<B>(&device);
//! let decoded = dynamic_decode(
//!     &cell,
//!     &mut helper,
//!     cell.zero_state(2, &device),
//!     DecodeOptions::new(100),
//! )
//! .unwrap();
//! assert_eq!(decoded.sequence_lengths, vec![50, 37]);
//! ```
//!
//! ## Configuration
//!
//! Runs can be described in YAML and loaded with [`load_config`]; see [`Config`].

pub mod cell;
pub mod config;
pub mod decode;
pub mod error;
pub mod helper;
pub mod perf;
pub mod prenet;
pub mod sampling;
pub mod schedule;
pub mod state;
pub mod weights;

pub use cell::{DenseCellConfig, DenseDecoderCell};
pub use config::{load_config, Config, DecodeConfig, HelperConfig, PrenetConfig, ScheduleConfig};
pub use decode::{dynamic_decode, CellOutput, DecodeOptions, DecodeOutput, DecoderCell};
pub use error::HelperError;
pub use helper::{DecoderHelper, Helper, InferenceHelper, NextInputs, TrainingHelper};
pub use prenet::{DensePrenet, Identity, Prenet};
pub use sampling::{seeded_rng, BernoulliSampler};
pub use schedule::SamplingSchedule;
pub use state::{FinishedTracker, HelperPhase};
