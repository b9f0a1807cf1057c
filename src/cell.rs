//! A small recurrent decoder cell for driving helpers end to end.
//!
//! `h' = tanh(W_in x + W_h h)`, frame `= W_out h'`, stop logit `= W_stop h'`.
//! Good enough to exercise teacher forcing, sampling and stop tokens without a
//! real attention decoder.

use crate::decode::{CellOutput, DecoderCell};
use burn::tensor::activation::tanh;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use burn_nn::{Linear, LinearConfig};

/// Dimensions of a [`DenseDecoderCell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenseCellConfig {
    /// Width of the (prenet-transformed) input.
    pub input_dim: usize,
    /// Recurrent state width.
    pub hidden_dim: usize,
    /// Width of the predicted frame.
    pub output_dim: usize,
}

impl DenseCellConfig {
    pub fn new(input_dim: usize, hidden_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            hidden_dim,
            output_dim,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseDecoderCell<B> {
        DenseDecoderCell {
            input_proj: LinearConfig::new(self.input_dim, self.hidden_dim).init(device),
            hidden_proj: LinearConfig::new(self.hidden_dim, self.hidden_dim)
                .with_bias(false)
                .init(device),
            frame_proj: LinearConfig::new(self.hidden_dim, self.output_dim).init(device),
            stop_proj: LinearConfig::new(self.hidden_dim, 1).init(device),
            hidden_dim: self.hidden_dim,
        }
    }
}

/// Single-layer tanh RNN with frame and stop-token heads.
#[derive(Debug)]
pub struct DenseDecoderCell<B: Backend> {
    pub input_proj: Linear<B>,
    pub hidden_proj: Linear<B>,
    pub frame_proj: Linear<B>,
    pub stop_proj: Linear<B>,
    pub hidden_dim: usize,
}

impl<B: Backend> DenseDecoderCell<B> {
    /// Zero recurrent state for `batch` sequences.
    pub fn zero_state(&self, batch: usize, device: &B::Device) -> Tensor<B, 2> {
        Tensor::zeros([batch, self.hidden_dim], device)
    }
}

impl<B: Backend> DecoderCell<B> for DenseDecoderCell<B> {
    type State = Tensor<B, 2>;

    fn step(
        &self,
        input: Tensor<B, 2>,
        state: Tensor<B, 2>,
    ) -> anyhow::Result<CellOutput<B, Tensor<B, 2>>> {
        let [batch, _] = input.dims();
        if state.dims() != [batch, self.hidden_dim] {
            anyhow::bail!(
                "Cell state has shape {:?}, expected [{batch}, {}]",
                state.dims(),
                self.hidden_dim
            );
        }
        let hidden = tanh(self.input_proj.forward(input) + self.hidden_proj.forward(state));
        Ok(CellOutput {
            output: self.frame_proj.forward(hidden.clone()),
            stop_token: self.stop_proj.forward(hidden.clone()),
            state: hidden,
        })
    }
}
