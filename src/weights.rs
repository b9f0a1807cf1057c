//! SafeTensors weight loading and name mapping for the dense prenet.
//!
//! Checkpoints exported from PyTorch name layers `prenet.layers.{i}.weight` with
//! `[out, in]` matrices; TensorFlow exports use `.../dense_{i}/kernel` with
//! `[in, out]`. Both are mapped to `layers.{i}.weight` in `[in, out]` layout.

use anyhow::Result;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData as BurnTensorData};
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Raw tensor payload extracted from a SafeTensors file.
#[derive(Debug, Clone)]
pub struct TensorData {
    /// Scalar dtype in the file.
    pub dtype: Dtype,
    /// Shape as a list of dimensions.
    pub shape: Vec<usize>,
    /// Raw byte buffer in row-major order.
    pub data: Vec<u8>,
    /// Whether the matrix must be transposed into `[in, out]`.
    pub transposed: bool,
}

impl TensorData {
    /// Create TensorData from a safetensors TensorView.
    pub fn from_safetensor(tensor: safetensors::tensor::TensorView<'_>, transposed: bool) -> Self {
        Self {
            dtype: tensor.dtype(),
            shape: tensor.shape().to_vec(),
            data: tensor.data().to_vec(),
            transposed,
        }
    }

    /// Decode the payload into f32 values.
    pub fn to_f32(&self) -> Result<Vec<f32>> {
        let mut values = Vec::new();
        match self.dtype {
            Dtype::F32 => {
                values.reserve(self.data.len() / 4);
                for chunk in self.data.chunks_exact(4) {
                    values.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
                }
            }
            Dtype::BF16 => {
                values.reserve(self.data.len() / 2);
                for chunk in self.data.chunks_exact(2) {
                    let bits = u16::from_le_bytes([chunk[0], chunk[1]]) as u32;
                    values.push(f32::from_bits(bits << 16));
                }
            }
            _ => anyhow::bail!("Unsupported dtype {:?}", self.dtype),
        }
        Ok(values)
    }
}

/// Load prenet weights and map names into `layers.{i}.{weight,bias}`.
pub fn load_prenet_state_dict(path: impl AsRef<Path>) -> Result<HashMap<String, TensorData>> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let tensors = SafeTensors::deserialize(&bytes)?;
    let mut state = HashMap::new();

    for name in tensors.names() {
        if let Some((mapped, transposed)) = map_prenet_name(name) {
            let tensor = tensors.tensor(name)?;
            state.insert(mapped, TensorData::from_safetensor(tensor, transposed));
        }
    }

    Ok(state)
}

/// Map a checkpoint tensor name to `(rust_path, needs_transpose)`.
fn map_prenet_name(name: &str) -> Option<(String, bool)> {
    if let Some(rest) = name.strip_prefix("prenet.layers.") {
        let (index, param) = rest.split_once('.')?;
        let index: usize = index.parse().ok()?;
        return match param {
            "weight" => Some((format!("layers.{index}.weight"), true)),
            "bias" => Some((format!("layers.{index}.bias"), false)),
            _ => None,
        };
    }

    // TensorFlow scopes, e.g. `decoder/prenet/dense_1/kernel`.
    let (scope, param) = name.rsplit_once('/')?;
    let layer = scope.rsplit('/').next()?;
    if !scope.contains("prenet") {
        return None;
    }
    let index: usize = match layer {
        "dense" => 0,
        _ => layer.strip_prefix("dense_")?.parse().ok()?,
    };
    match param {
        "kernel" => Some((format!("layers.{index}.weight"), false)),
        "bias" => Some((format!("layers.{index}.bias"), false)),
        _ => None,
    }
}

/// Convert a 2D payload into a `[in, out]` Burn tensor.
pub fn tensor2_from_data<B: Backend>(
    tensor: &TensorData,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    let shape: [usize; 2] = tensor
        .shape
        .clone()
        .try_into()
        .map_err(|_| anyhow::anyhow!("Expected 2D tensor, got shape {:?}", tensor.shape))?;
    let values = tensor.to_f32()?;
    let tensor_2d = Tensor::from_data(BurnTensorData::new(values, shape), device);
    Ok(if tensor.transposed {
        tensor_2d.transpose()
    } else {
        tensor_2d
    })
}

/// Convert a 1D payload into a Burn tensor.
pub fn tensor1_from_data<B: Backend>(
    tensor: &TensorData,
    device: &B::Device,
) -> Result<Tensor<B, 1>> {
    let shape: [usize; 1] = tensor
        .shape
        .clone()
        .try_into()
        .map_err(|_| anyhow::anyhow!("Expected 1D tensor, got shape {:?}", tensor.shape))?;
    let values = tensor.to_f32()?;
    Ok(Tensor::from_data(BurnTensorData::new(values, shape), device))
}

#[cfg(test)]
mod tests {
    use super::{map_prenet_name, tensor2_from_data, TensorData};
    use burn::tensor::Tensor;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use safetensors::Dtype;

    #[test]
    fn maps_pytorch_and_tensorflow_names() {
        assert_eq!(
            map_prenet_name("prenet.layers.1.weight"),
            Some(("layers.1.weight".to_string(), true))
        );
        assert_eq!(
            map_prenet_name("prenet.layers.0.bias"),
            Some(("layers.0.bias".to_string(), false))
        );
        assert_eq!(
            map_prenet_name("ForwardPass/tacotron2_decoder/decoder/prenet/dense/kernel"),
            Some(("layers.0.weight".to_string(), false))
        );
        assert_eq!(
            map_prenet_name("decoder/prenet/dense_1/bias"),
            Some(("layers.1.bias".to_string(), false))
        );
        assert_eq!(map_prenet_name("decoder/attention/dense_1/kernel"), None);
        assert_eq!(map_prenet_name("encoder.layers.0.weight"), None);
    }

    #[test]
    fn tensor2_from_data_decodes_bf16() {
        let values = [1.0_f32, -0.5_f32, 2.25_f32];
        let mut data = Vec::new();
        let mut expected = Vec::new();
        for value in values {
            let bits = value.to_bits();
            let bf16 = (bits >> 16) as u16;
            data.extend_from_slice(&bf16.to_le_bytes());
            expected.push(f32::from_bits((bf16 as u32) << 16));
        }
        let tensor = TensorData {
            dtype: Dtype::BF16,
            shape: vec![1, expected.len()],
            data,
            transposed: false,
        };
        let device = NdArrayDevice::default();
        let decoded: Tensor<NdArray<f32>, 2> =
            tensor2_from_data(&tensor, &device).expect("decode bf16");
        let decoded_data = decoded.to_data();
        let decoded_values = decoded_data.as_slice::<f32>().expect("slice");
        assert_eq!(decoded_values, expected.as_slice());
    }

    #[test]
    fn pytorch_matrices_are_transposed() {
        let values = [1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let tensor = TensorData {
            dtype: Dtype::F32,
            shape: vec![2, 3],
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            transposed: true,
        };
        let device = NdArrayDevice::default();
        let decoded: Tensor<NdArray<f32>, 2> = tensor2_from_data(&tensor, &device).unwrap();
        assert_eq!(decoded.dims(), [3, 2]);
        let data: Vec<f32> = decoded.into_data().iter::<f32>().collect();
        assert_eq!(data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }
}
