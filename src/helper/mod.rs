//! Decoding helpers: the per-step policy of an autoregressive decoder.
//!
//! A host loop calls [`DecoderHelper::initialize`] once, then alternates
//! [`DecoderHelper::sample`] and [`DecoderHelper::next_inputs`] with a growing
//! step index. The helper decides which sequences are finished and what feeds the
//! next step; the loop decides when to stop calling.
//!
//! Two variants exist:
//!
//! - [`TrainingHelper`]: teacher forcing, optionally blended with the model's own
//!   outputs (scheduled sampling).
//! - [`InferenceHelper`]: free running, terminated by a stop-token prediction.
//!
//! [`Helper`] wraps either one when the variant is only known at runtime.

pub mod inference;
pub mod training;

pub use inference::InferenceHelper;
pub use training::TrainingHelper;

use crate::error::{HelperError, Result};
use crate::perf::{self, Metric};
use crate::state::HelperPhase;
use burn::tensor::backend::Backend;
use burn::tensor::{Bool, Int, Tensor};

/// Result of one `next_inputs` call.
#[derive(Debug)]
pub struct NextInputs<B: Backend, S> {
    /// Per-sequence finished flags, shape `[batch]`.
    pub finished: Tensor<B, 1, Bool>,
    /// Input for the next step, shape `[batch, dim]`.
    pub next_inputs: Tensor<B, 2>,
    /// Decoder state, passed through untouched.
    pub state: S,
}

/// Per-step decoding policy driven by a host loop.
pub trait DecoderHelper<B: Backend> {
    /// Number of sequences decoded in lockstep.
    fn batch_size(&self) -> usize;

    /// Feature dimension of the inputs this helper produces.
    fn input_dim(&self) -> usize;

    /// Current state-machine phase.
    fn phase(&self) -> HelperPhase;

    /// Initial finished flags (all false) and the start input.
    fn initialize(&mut self) -> (Tensor<B, 1, Bool>, Tensor<B, 2>);

    /// Arg-max ids of `outputs` along the feature axis, shape `[batch]`.
    ///
    /// Informational only; neither helper feeds these ids back.
    fn sample(&self, time: usize, outputs: Tensor<B, 2>) -> Result<Tensor<B, 1, Int>> {
        let _ = time;
        let _span = perf::span(Metric::HelperSample);
        argmax_ids(outputs, self.batch_size())
    }

    /// Finished flags and next input after step `time` produced `outputs`.
    ///
    /// `stop_token_predictions` (`[batch, 1]` logits) is consumed by the inference
    /// helper and ignored by the training helper.
    fn next_inputs<S>(
        &mut self,
        time: usize,
        outputs: Tensor<B, 2>,
        state: S,
        stop_token_predictions: Option<Tensor<B, 2>>,
    ) -> Result<NextInputs<B, S>>;
}

/// Either helper, chosen when the decode is constructed.
#[derive(Debug)]
pub enum Helper<B: Backend> {
    Training(TrainingHelper<B>),
    Inference(InferenceHelper<B>),
}

impl<B: Backend> From<TrainingHelper<B>> for Helper<B> {
    fn from(helper: TrainingHelper<B>) -> Self {
        Helper::Training(helper)
    }
}

impl<B: Backend> From<InferenceHelper<B>> for Helper<B> {
    fn from(helper: InferenceHelper<B>) -> Self {
        Helper::Inference(helper)
    }
}

impl<B: Backend> DecoderHelper<B> for Helper<B> {
    fn batch_size(&self) -> usize {
        match self {
            Helper::Training(helper) => helper.batch_size(),
            Helper::Inference(helper) => helper.batch_size(),
        }
    }

    fn input_dim(&self) -> usize {
        match self {
            Helper::Training(helper) => helper.input_dim(),
            Helper::Inference(helper) => helper.input_dim(),
        }
    }

    fn phase(&self) -> HelperPhase {
        match self {
            Helper::Training(helper) => helper.phase(),
            Helper::Inference(helper) => helper.phase(),
        }
    }

    fn initialize(&mut self) -> (Tensor<B, 1, Bool>, Tensor<B, 2>) {
        match self {
            Helper::Training(helper) => helper.initialize(),
            Helper::Inference(helper) => helper.initialize(),
        }
    }

    fn sample(&self, time: usize, outputs: Tensor<B, 2>) -> Result<Tensor<B, 1, Int>> {
        match self {
            Helper::Training(helper) => helper.sample(time, outputs),
            Helper::Inference(helper) => helper.sample(time, outputs),
        }
    }

    fn next_inputs<S>(
        &mut self,
        time: usize,
        outputs: Tensor<B, 2>,
        state: S,
        stop_token_predictions: Option<Tensor<B, 2>>,
    ) -> Result<NextInputs<B, S>> {
        match self {
            Helper::Training(helper) => {
                helper.next_inputs(time, outputs, state, stop_token_predictions)
            }
            Helper::Inference(helper) => {
                helper.next_inputs(time, outputs, state, stop_token_predictions)
            }
        }
    }
}

/// Arg-max along the last axis of a `[batch, dim]` tensor.
pub(crate) fn argmax_ids<B: Backend>(
    outputs: Tensor<B, 2>,
    batch: usize,
) -> Result<Tensor<B, 1, Int>> {
    let dims = outputs.dims();
    if dims[0] != batch || dims[1] == 0 {
        return Err(HelperError::shape("model output", &[batch, dims[1].max(1)], &dims));
    }
    Ok(outputs.argmax(1).reshape([batch]))
}

/// Fail unless `outputs` has `batch` rows.
pub(crate) fn check_batch<B: Backend>(
    what: &'static str,
    outputs: &Tensor<B, 2>,
    batch: usize,
) -> Result<()> {
    let dims = outputs.dims();
    if dims[0] != batch {
        return Err(HelperError::shape(what, &[batch, dims[1]], &dims));
    }
    Ok(())
}

/// Apply an optional prenet.
pub(crate) fn apply_prenet<B: Backend>(
    prenet: Option<&dyn crate::prenet::Prenet<B>>,
    input: Tensor<B, 2>,
) -> Tensor<B, 2> {
    match prenet {
        Some(prenet) => prenet.forward(input),
        None => input,
    }
}
