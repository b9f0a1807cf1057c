//! Prenet transforms applied to decoder inputs.
//!
//! A prenet is any deterministic `[batch, dim] -> [batch, dim']` map. Helpers run
//! it on whichever vector they select as the next input (and on the start input).

use crate::config::{resolve_relative_path, PrenetConfig};
use crate::weights::{load_prenet_state_dict, tensor1_from_data, tensor2_from_data, TensorData};
use anyhow::Result;
use burn::module::Param;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use burn_nn::{Linear, LinearConfig};
use std::collections::HashMap;
use std::path::Path;

/// Transform applied to decoder inputs before they enter the decoder cell.
pub trait Prenet<B: Backend> {
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2>;
}

impl<B, F> Prenet<B> for F
where
    B: Backend,
    F: Fn(Tensor<B, 2>) -> Tensor<B, 2>,
{
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self(input)
    }
}

/// Pass-through prenet.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<B: Backend> Prenet<B> for Identity {
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        input
    }
}

/// Stack of `Linear` + ReLU layers.
///
/// Unlike the training-time Tacotron prenet this has no dropout: the helpers
/// require a prenet that is deterministic given its input.
#[derive(Debug)]
pub struct DensePrenet<B: Backend> {
    pub layers: Vec<Linear<B>>,
    pub input_dim: usize,
}

impl<B: Backend> DensePrenet<B> {
    /// Randomly initialised layers shaped by `config`.
    pub fn new(config: &PrenetConfig, device: &B::Device) -> Self {
        let mut layers = Vec::with_capacity(config.layer_sizes.len());
        let mut in_dim = config.input_dim;
        for &out_dim in &config.layer_sizes {
            layers.push(LinearConfig::new(in_dim, out_dim).init::<B>(device));
            in_dim = out_dim;
        }
        Self {
            layers,
            input_dim: config.input_dim,
        }
    }

    /// Build from config, loading `weights_path` (relative to `config_path`) when set.
    pub fn from_config(
        config: &PrenetConfig,
        config_path: Option<&Path>,
        device: &B::Device,
    ) -> Result<Self> {
        let mut prenet = Self::new(config, device);
        if let Some(weights_path) = config.weights_path.as_ref() {
            let weights_path = match config_path {
                Some(config_path) => resolve_relative_path(config_path, weights_path),
                None => weights_path.into(),
            };
            let state = load_prenet_state_dict(&weights_path)?;
            prenet.load_state_dict(&state, device)?;
        }
        Ok(prenet)
    }

    /// Width of the last layer (or the input width with no layers).
    pub fn output_dim(&self) -> usize {
        self.layers
            .last()
            .map(|layer| layer.weight.val().dims()[1])
            .unwrap_or(self.input_dim)
    }

    /// Copy `layers.{i}.weight` / `layers.{i}.bias` into the layers.
    ///
    /// Every layer needs a weight; layers without a bias entry lose their bias.
    pub fn load_state_dict(
        &mut self,
        state: &HashMap<String, TensorData>,
        device: &B::Device,
    ) -> Result<()> {
        for (index, layer) in self.layers.iter_mut().enumerate() {
            let key = format!("layers.{index}.weight");
            let weight = state
                .get(&key)
                .ok_or_else(|| anyhow::anyhow!("Missing prenet weight {key}"))?;
            let weight = tensor2_from_data::<B>(weight, device)?;
            let expected = layer.weight.val().dims();
            if weight.dims() != expected {
                anyhow::bail!(
                    "Prenet weight {key} has shape {:?}, expected {:?}",
                    weight.dims(),
                    expected
                );
            }
            layer.weight = Param::from_tensor(weight);

            // A checkpoint without a bias describes a bias-free layer.
            layer.bias = match state.get(&format!("layers.{index}.bias")) {
                Some(bias) => {
                    let bias = tensor1_from_data::<B>(bias, device)?;
                    if bias.dims() != [expected[1]] {
                        anyhow::bail!(
                            "Prenet bias layers.{index}.bias has shape {:?}, expected [{}]",
                            bias.dims(),
                            expected[1]
                        );
                    }
                    Some(Param::from_tensor(bias))
                }
                None => None,
            };
        }
        Ok(())
    }
}

impl<B: Backend> Prenet<B> for DensePrenet<B> {
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.layers
            .iter()
            .fold(input, |hidden, layer| relu(layer.forward(hidden)))
    }
}
