//! Free-running helper used during evaluation and inference.

use super::{apply_prenet, check_batch, DecoderHelper, NextInputs};
use crate::config::HelperConfig;
use crate::error::{HelperError, Result};
use crate::perf::{self, Metric};
use crate::prenet::Prenet;
use crate::state::{all_flags, flags_to_tensor, tensor_to_flags, HelperPhase};
use burn::tensor::backend::Backend;
use burn::tensor::{Bool, Tensor};
use std::fmt;

/// Feeds the model's own output back as the next input and stops sequences
/// whose stop-token prediction crosses one half.
pub struct InferenceHelper<B: Backend> {
    prenet: Option<Box<dyn Prenet<B>>>,
    config: HelperConfig,
    start_inputs: Tensor<B, 2>,
    phase: HelperPhase,
}

impl<B: Backend> InferenceHelper<B> {
    /// Create a helper seeded from the first frame of each sequence in `inputs`.
    ///
    /// `inputs` is `[batch, time, dim]`, or `[time, batch, dim]` when
    /// `config.time_major` is set; only frame 0 is used.
    pub fn new(
        inputs: Tensor<B, 3>,
        prenet: Option<Box<dyn Prenet<B>>>,
        config: &HelperConfig,
    ) -> Result<Self> {
        config.validate()?;
        let inputs = if config.time_major {
            inputs
        } else {
            inputs.swap_dims(0, 1)
        };
        let [time, batch, dim] = inputs.dims();
        if batch == 0 {
            return Err(HelperError::EmptyBatch);
        }
        if time == 0 {
            return Err(HelperError::IndexOutOfRange {
                what: "start frame",
                index: 0,
                len: 0,
            });
        }
        let first = inputs.narrow(0, 0, 1).reshape([batch, dim]);
        let start_inputs = apply_prenet(prenet.as_deref(), first);
        Ok(Self {
            prenet,
            config: config.clone(),
            start_inputs,
            phase: HelperPhase::Initialized,
        })
    }

    /// `round(sigmoid(logit)) == 1` per sequence. Ties round to even, so this is
    /// exactly `logit > 0`, which is compared directly to avoid sigmoid rounding.
    fn finished_from_stop_tokens(&self, stop: Option<Tensor<B, 2>>) -> Result<Vec<bool>> {
        let batch = self.batch_size();
        if !self.config.mask_decoder_sequence {
            return Ok(vec![false; batch]);
        }
        let stop = stop.ok_or(HelperError::MissingStopToken)?;
        let dims = stop.dims();
        if dims != [batch, 1] {
            return Err(HelperError::shape("stop-token predictions", &[batch, 1], &dims));
        }
        let finished = stop.greater_elem(0.0).reshape([batch]);
        Ok(tensor_to_flags(finished))
    }
}

impl<B: Backend> DecoderHelper<B> for InferenceHelper<B> {
    fn batch_size(&self) -> usize {
        self.start_inputs.dims()[0]
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
        stop_token_predictions: Option<Tensor<B, 2>>,
    ) -> Result<NextInputs<B, S>> {
        let _ = time;
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

        let finished = self.finished_from_stop_tokens(stop_token_predictions)?;
        let all_finished = finished.iter().all(|&done| done);
        let next_inputs = if all_finished {
            self.start_inputs.clone()
        } else {
            let next = apply_prenet(self.prenet.as_deref(), outputs);
            let expected = self.start_inputs.dims();
            if next.dims() != expected {
                return Err(HelperError::shape("next input", &expected, &next.dims()));
            }
            perf::add_count(Metric::SampledInputs, batch as u64);
            next
        };
        self.phase = self.phase.advance(all_finished);

        Ok(NextInputs {
            finished: flags_to_tensor::<B>(&finished, &device),
            next_inputs,
            state,
        })
    }
}

impl<B: Backend> fmt::Debug for InferenceHelper<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceHelper")
            .field("start_inputs", &self.start_inputs.dims())
            .field("prenet", &self.prenet.is_some())
            .field("config", &self.config)
            .field("phase", &self.phase)
            .finish()
    }
}
