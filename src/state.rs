//! Step-state helpers shared by the decoding helpers and the host loop.
//!
//! [`HelperPhase`] is the per-helper state machine; [`FinishedTracker`] keeps the
//! batch-wide, monotone finished flags and per-sequence lengths a host loop needs.

use burn::tensor::backend::Backend;
use burn::tensor::{Bool, Tensor, TensorData};

/// Lifecycle of a decoding helper within one decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperPhase {
    /// Constructed; no step taken yet.
    Initialized,
    /// At least one step taken and some sequence is still running.
    Stepping,
    /// Every sequence finished. Absorbing.
    AllFinished,
}

impl HelperPhase {
    /// Transition after a `next_inputs` call.
    pub fn advance(self, all_finished: bool) -> Self {
        match self {
            HelperPhase::AllFinished => HelperPhase::AllFinished,
            _ if all_finished => HelperPhase::AllFinished,
            _ => HelperPhase::Stepping,
        }
    }

    /// True once the batch is done.
    pub fn is_terminal(self) -> bool {
        self == HelperPhase::AllFinished
    }
}

/// Monotone per-sequence finished flags and emitted lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedTracker {
    finished: Vec<bool>,
    lengths: Vec<usize>,
}

impl FinishedTracker {
    /// Start tracking from the flags returned by `initialize`.
    pub fn new(initial: Vec<bool>) -> Self {
        let lengths = vec![0; initial.len()];
        Self {
            finished: initial,
            lengths,
        }
    }

    /// Fold in the flags produced at step `time`.
    ///
    /// Sequences still running before this step get length `time + 1`; the flags
    /// are OR-ed so a finished sequence never becomes unfinished again.
    pub fn update(&mut self, time: usize, step_finished: &[bool]) {
        for ((done, length), &now) in self
            .finished
            .iter_mut()
            .zip(self.lengths.iter_mut())
            .zip(step_finished)
        {
            if !*done {
                *length = time + 1;
            }
            *done |= now;
        }
    }

    pub fn finished(&self) -> &[bool] {
        &self.finished
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn finished_count(&self) -> usize {
        self.finished.iter().filter(|&&done| done).count()
    }

    pub fn all_finished(&self) -> bool {
        self.finished.iter().all(|&done| done)
    }

    pub fn into_parts(self) -> (Vec<bool>, Vec<usize>) {
        (self.finished, self.lengths)
    }
}

/// Build a `[batch]` bool tensor from host flags.
pub fn flags_to_tensor<B: Backend>(flags: &[bool], device: &B::Device) -> Tensor<B, 1, Bool> {
    Tensor::from_data(TensorData::new(flags.to_vec(), [flags.len()]), device)
}

/// A `[batch]` bool tensor with every flag set to `value`.
pub fn all_flags<B: Backend>(
    batch: usize,
    value: bool,
    device: &B::Device,
) -> Tensor<B, 1, Bool> {
    Tensor::from_data(TensorData::new(vec![value; batch], [batch]), device)
}

/// Read a `[batch]` bool tensor back to host flags.
pub fn tensor_to_flags<B: Backend>(flags: Tensor<B, 1, Bool>) -> Vec<bool> {
    flags.into_data().iter::<bool>().collect()
}
