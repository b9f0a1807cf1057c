//! Teacher-forcing / scheduled-sampling helper used during training.

use super::{apply_prenet, check_batch, DecoderHelper, NextInputs};
use crate::config::HelperConfig;
use crate::error::{HelperError, Result};
use crate::perf::{self, Metric};
use crate::prenet::Prenet;
use crate::sampling::BernoulliSampler;
use crate::state::{all_flags, flags_to_tensor, HelperPhase};
use burn::tensor::backend::Backend;
use burn::tensor::{Bool, Tensor};
use rand::rngs::StdRng;
use std::fmt;

/// Feeds ground-truth frames to the decoder, optionally swapping in the model's
/// own previous output per sequence with probability `config.sampling_prob`.
pub struct TrainingHelper<B: Backend> {
    /// Ground truth, time major: `[time, batch, dim]`.
    inputs: Tensor<B, 3>,
    sequence_length: Vec<usize>,
    prenet: Option<Box<dyn Prenet<B>>>,
    config: HelperConfig,
    sampler: BernoulliSampler,
    start_inputs: Tensor<B, 2>,
    phase: HelperPhase,
}

impl<B: Backend> TrainingHelper<B> {
    /// Create a helper for one training batch.
    ///
    /// `inputs` is `[batch, time, dim]`, or `[time, batch, dim]` when
    /// `config.time_major` is set. Every `sequence_length` must fit in `time`:
    /// padded frames past a sequence's length are readable, frames past the
    /// buffer are not.
    ///
    /// Sampling decisions are drawn from `rng` with `config.sampling_prob`; use
    /// [`TrainingHelper::into_rng`] to carry the stream over to the next batch.
    pub fn new(
        inputs: Tensor<B, 3>,
        sequence_length: &[usize],
        prenet: Option<Box<dyn Prenet<B>>>,
        config: &HelperConfig,
        rng: StdRng,
    ) -> Result<Self> {
        config.validate()?;
        let sampler = BernoulliSampler::with_rng(config.sampling_prob, rng)?;
        let inputs = if config.time_major {
            inputs
        } else {
            inputs.swap_dims(0, 1)
        };
        let [max_time, batch, dim] = inputs.dims();
        if batch == 0 {
            return Err(HelperError::EmptyBatch);
        }
        if sequence_length.len() != batch {
            return Err(HelperError::shape(
                "sequence_length",
                &[batch],
                &[sequence_length.len()],
            ));
        }
        if let Some(&longest) = sequence_length.iter().max() {
            if longest > max_time {
                return Err(HelperError::IndexOutOfRange {
                    what: "ground-truth buffer",
                    index: longest - 1,
                    len: max_time,
                });
            }
        }

        let zeros = Tensor::<B, 2>::zeros([batch, dim], &inputs.device());
        let start_inputs = apply_prenet(prenet.as_deref(), zeros);

        Ok(Self {
            inputs,
            sequence_length: sequence_length.to_vec(),
            prenet,
            config: config.clone(),
            sampler,
            start_inputs,
            phase: HelperPhase::Initialized,
        })
    }

    /// Release the sampling stream, positioned after this helper's last draw.
    pub fn into_rng(self) -> StdRng {
        self.sampler.into_rng()
    }

    fn finished_at(&self, time: usize) -> Vec<bool> {
        if !self.config.mask_decoder_sequence {
            return vec![false; self.batch_size()];
        }
        self.sequence_length
            .iter()
            .map(|&length| time + 1 >= length)
            .collect()
    }

    /// Ground truth (or a sampled mix) for step `time`.
    fn next_input(&mut self, time: usize, outputs: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let [max_time, batch, dim] = self.inputs.dims();
        if time >= max_time {
            return Err(HelperError::IndexOutOfRange {
                what: "ground-truth buffer",
                index: time,
                len: max_time,
            });
        }
        let mut next_input = self.inputs.clone().narrow(0, time, 1).reshape([batch, dim]);
        let mut outputs = outputs;
        if self.config.stop_gradient {
            next_input = next_input.detach();
            outputs = outputs.detach();
        }
        let next_input = apply_prenet(self.prenet.as_deref(), next_input);

        if !self.config.uses_sampling() {
            perf::add_count(Metric::TeacherForcedInputs, batch as u64);
            return Ok(next_input);
        }

        let outputs = apply_prenet(self.prenet.as_deref(), outputs);
        let target_dims = next_input.dims();
        if outputs.dims() != target_dims {
            return Err(HelperError::shape(
                "model output after prenet",
                &target_dims,
                &outputs.dims(),
            ));
        }

        let decisions = self.sampler.draw(batch);
        let sampled = decisions.iter().filter(|&&d| d).count() as u64;
        perf::add_count(Metric::SampledInputs, sampled);
        perf::add_count(Metric::TeacherForcedInputs, batch as u64 - sampled);

        let device = next_input.device();
        let select_sample: Tensor<B, 2, Bool> = flags_to_tensor::<B>(&decisions, &device)
            .reshape([batch, 1])
            .repeat_dim(1, target_dims[1]);
        Ok(next_input.mask_where(select_sample, outputs))
    }
}

impl<B: Backend> DecoderHelper<B> for TrainingHelper<B> {
    fn batch_size(&self) -> usize {
        self.inputs.dims()[1]
    }

    fn input_dim(&self) -> usize {
        self.start_inputs.dims()[1]
    }

    fn phase(&self) -> HelperPhase {
        self.phase
    }

    fn initialize(&mut self) -> (Tensor<B, 1, Bool>, Tensor<B, 2>) {
        let _span = perf::span(Metric::HelperInitialize);
        let device = self.start_inputs.device();
        (
            all_flags::<B>(self.batch_size(), false, &device),
            self.start_inputs.clone(),
        )
    }

    fn next_inputs<S>(
        &mut self,
        time: usize,
        outputs: Tensor<B, 2>,
        state: S,
        _stop_token_predictions: Option<Tensor<B, 2>>,
    ) -> Result<NextInputs<B, S>> {
        let _span = perf::span(Metric::HelperNextInputs);
        let batch = self.batch_size();
        check_batch("model output", &outputs, batch)?;
        let device = self.start_inputs.device();

        if self.phase.is_terminal() {
            return Ok(NextInputs {
                finished: all_flags::<B>(batch, true, &device),
                next_inputs: self.start_inputs.clone(),
                state,
            });
        }

        let finished = self.finished_at(time);
        let all_finished = finished.iter().all(|&done| done);
        let next_inputs = if all_finished {
            self.start_inputs.clone()
        } else {
            self.next_input(time, outputs)?
        };
        self.phase = self.phase.advance(all_finished);

        Ok(NextInputs {
            finished: flags_to_tensor::<B>(&finished, &device),
            next_inputs,
            state,
        })
    }
}

impl<B: Backend> fmt::Debug for TrainingHelper<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainingHelper")
            .field("inputs", &self.inputs.dims())
            .field("sequence_length", &self.sequence_length)
            .field("prenet", &self.prenet.is_some())
            .field("config", &self.config)
            .field("phase", &self.phase)
            .finish()
    }
}
