//! Host decoding loop.
//!
//! [`dynamic_decode`] drives a [`DecoderCell`] and a [`DecoderHelper`] step by step
//! until every sequence has finished or the step budget runs out. It owns the
//! batch-wide finished flags (monotone, unlike the per-step flags a helper
//! reports) and the number of frames emitted per sequence.

use crate::config::DecodeConfig;
use crate::helper::{DecoderHelper, NextInputs};
use crate::perf::{self, Metric};
use crate::state::{flags_to_tensor, tensor_to_flags, FinishedTracker};
use burn::tensor::backend::Backend;
use burn::tensor::{Bool, Int, Tensor};
use log::{debug, info, warn};

/// One step of model output.
#[derive(Debug)]
pub struct CellOutput<B: Backend, S> {
    /// Frame prediction, shape `[batch, dim]`.
    pub output: Tensor<B, 2>,
    /// Stop-token logits, shape `[batch, 1]`.
    pub stop_token: Tensor<B, 2>,
    /// Recurrent state for the next step.
    pub state: S,
}

/// Model side of the decode: maps an input frame and state to an output frame.
pub trait DecoderCell<B: Backend> {
    type State;

    fn step(
        &self,
        input: Tensor<B, 2>,
        state: Self::State,
    ) -> anyhow::Result<CellOutput<B, Self::State>>;
}

/// Loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Hard cap on steps. Required because helpers without masking never finish.
    pub max_steps: usize,
    /// Zero the frames, stop logits and ids of sequences that finished on an
    /// earlier step.
    pub impute_finished: bool,
}

impl DecodeOptions {
    pub fn new(max_steps: usize) -> Self {
        Self {
            max_steps,
            impute_finished: true,
        }
    }
}

impl From<&DecodeConfig> for DecodeOptions {
    fn from(config: &DecodeConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            impute_finished: config.impute_finished,
        }
    }
}

/// Everything a decode produced.
#[derive(Debug)]
pub struct DecodeOutput<B: Backend, S> {
    /// Stacked frame predictions, `[batch, steps, dim]`.
    pub outputs: Tensor<B, 3>,
    /// Stacked stop-token logits, `[batch, steps]`.
    pub stop_tokens: Tensor<B, 2>,
    /// Stacked arg-max ids, `[batch, steps]`.
    pub sample_ids: Tensor<B, 2, Int>,
    /// Batch-wide finished flags after the last step.
    pub finished: Vec<bool>,
    /// Frames emitted per sequence, including the one that finished it.
    pub sequence_lengths: Vec<usize>,
    /// Number of steps executed.
    pub steps: usize,
    /// True when the loop stopped on `max_steps` with sequences still running.
    pub hit_step_limit: bool,
    /// Cell state after the last step.
    pub final_state: S,
}

/// Run `cell` under `helper` until all sequences finish or `max_steps` is hit.
///
/// # Errors
///
/// Fails on `max_steps == 0`, on any cell error, and on any helper error (shape
/// mismatches, reads past the ground-truth buffer, missing stop tokens). There is
/// no recovery: a bad step aborts the whole decode.
pub fn dynamic_decode<B, C, H>(
    cell: &C,
    helper: &mut H,
    initial_state: C::State,
    options: DecodeOptions,
) -> anyhow::Result<DecodeOutput<B, C::State>>
where
    B: Backend,
    C: DecoderCell<B>,
    H: DecoderHelper<B>,
{
    if options.max_steps == 0 {
        anyhow::bail!("max_steps must be > 0");
    }
    let _span = perf::span(Metric::DecodeTotal);
    let batch = helper.batch_size();

    let (initial_finished, mut inputs) = helper.initialize();
    let mut tracker = FinishedTracker::new(tensor_to_flags(initial_finished));
    let mut state = initial_state;

    let mut outputs = Vec::new();
    let mut stop_tokens = Vec::new();
    let mut sample_ids = Vec::new();
    let mut steps = 0;

    while steps < options.max_steps && !tracker.all_finished() {
        let time = steps;
        let cell_output = {
            let _step_span = perf::span(Metric::DecodeCellStep);
            cell.step(inputs, state)?
        };
        let CellOutput {
            output,
            stop_token,
            state: cell_state,
        } = cell_output;
        let [out_batch, out_dim] = output.dims();
        if out_batch != batch || stop_token.dims() != [batch, 1] {
            anyhow::bail!(
                "Decoder cell produced output {:?} and stop token {:?} for batch {batch}",
                output.dims(),
                stop_token.dims()
            );
        }

        let ids = helper.sample(time, output.clone())?;
        let NextInputs {
            finished,
            next_inputs,
            state: next_state,
        } = helper.next_inputs(time, output.clone(), cell_state, Some(stop_token.clone()))?;

        let ids = ids.reshape([batch, 1]);
        let (output, stop_token, ids) = if options.impute_finished && tracker.finished_count() > 0
        {
            let device = output.device();
            let done: Tensor<B, 2, Bool> =
                flags_to_tensor::<B>(tracker.finished(), &device).reshape([batch, 1]);
            (
                output.mask_fill(done.clone().repeat_dim(1, out_dim), 0.0),
                stop_token.mask_fill(done.clone(), 0.0),
                ids.mask_fill(done, 0),
            )
        } else {
            (output, stop_token, ids)
        };

        tracker.update(time, &tensor_to_flags(finished));
        debug!(
            "decode step {time}: {}/{batch} sequences finished",
            tracker.finished_count()
        );

        outputs.push(output.reshape([batch, 1, out_dim]));
        stop_tokens.push(stop_token);
        sample_ids.push(ids);
        inputs = next_inputs;
        state = next_state;
        steps += 1;
    }
    perf::add_count(Metric::DecodeSteps, steps as u64);

    let hit_step_limit = !tracker.all_finished();
    if hit_step_limit {
        warn!(
            "decode stopped at max_steps={} with {}/{batch} sequences unfinished",
            options.max_steps,
            batch - tracker.finished_count()
        );
    } else {
        info!("decode finished all {batch} sequences in {steps} steps");
    }

    let (finished, sequence_lengths) = tracker.into_parts();
    Ok(DecodeOutput {
        outputs: Tensor::cat(outputs, 1),
        stop_tokens: Tensor::cat(stop_tokens, 1),
        sample_ids: Tensor::cat(sample_ids, 1),
        finished,
        sequence_lengths,
        steps,
        hit_step_limit,
        final_state: state,
    })
}
