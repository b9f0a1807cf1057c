//! Shared test utilities for fixture loading and tensor construction.
#![allow(dead_code)]

use burn::tensor::{Bool, Tensor, TensorData};
use burn_ndarray::{NdArray, NdArrayDevice};
use serde::Deserialize;
use std::path::PathBuf;
use tacostep::state::tensor_to_flags;

pub type TestBackend = NdArray<f32>;

pub const FIXTURE_DIR: &str = "tests/fixtures";

/// Absolute path of a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join(FIXTURE_DIR)
        .join(name)
}

/// Load and deserialize a JSON fixture file.
pub fn read_fixture<T: for<'de> Deserialize<'de>>(name: &str) -> T {
    let path = fixture_path(name);
    let data = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
    serde_json::from_str(&data)
        .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
}

/// Assert two tensor data slices are element-wise close within tolerance.
pub fn assert_close(a: &TensorData, b: &TensorData, tol: f32) {
    let a_slice = a.as_slice::<f32>().expect("a slice");
    let b_slice = b.as_slice::<f32>().expect("b slice");
    assert_eq!(
        a_slice.len(),
        b_slice.len(),
        "tensor length mismatch: {} vs {}",
        a_slice.len(),
        b_slice.len()
    );
    for (idx, (x, y)) in a_slice.iter().zip(b_slice.iter()).enumerate() {
        if (x - y).abs() > tol {
            panic!(
                "mismatch at {idx}: {x} vs {y} (diff: {}, tol: {tol})",
                (x - y).abs()
            );
        }
    }
}

/// Flatten a 2D tensor into rows.
pub fn rows(tensor: Tensor<TestBackend, 2>) -> Vec<Vec<f32>> {
    let [_, cols] = tensor.dims();
    let flat: Vec<f32> = tensor.into_data().iter::<f32>().collect();
    flat.chunks(cols.max(1)).map(|row| row.to_vec()).collect()
}

pub fn flags(tensor: Tensor<TestBackend, 1, Bool>) -> Vec<bool> {
    tensor_to_flags(tensor)
}

/// Create a 2D tensor from nested Vecs.
pub fn tensor2(data: Vec<Vec<f32>>, device: &NdArrayDevice) -> Tensor<TestBackend, 2> {
    let rows = data.len();
    let cols = data.first().map(|r| r.len()).unwrap_or(0);
    let flat: Vec<f32> = data.into_iter().flatten().collect();
    Tensor::from_data(TensorData::new(flat, [rows, cols]), device)
}

/// Create a 3D tensor from nested Vecs.
pub fn tensor3(data: Vec<Vec<Vec<f32>>>, device: &NdArrayDevice) -> Tensor<TestBackend, 3> {
    let d0 = data.len();
    let d1 = data.first().map(|v| v.len()).unwrap_or(0);
    let d2 = data
        .first()
        .and_then(|v| v.first())
        .map(|v| v.len())
        .unwrap_or(0);
    let flat: Vec<f32> = data.into_iter().flatten().flatten().collect();
    Tensor::from_data(TensorData::new(flat, [d0, d1, d2]), device)
}

/// Batch-major ground truth where frame `t` of sequence `b` is
/// `[100b + t, 100b + t + 0.5, ...]` over `dim` features.
pub fn ramp_frames(
    batch: usize,
    time: usize,
    dim: usize,
    device: &NdArrayDevice,
) -> Tensor<TestBackend, 3> {
    let data: Vec<Vec<Vec<f32>>> = (0..batch)
        .map(|b| {
            (0..time)
                .map(|t| {
                    (0..dim)
                        .map(|d| (100 * b + t) as f32 + 0.5 * d as f32)
                        .collect::<Vec<f32>>()
                })
                .collect::<Vec<_>>()
        })
        .collect();
    tensor3(data, device)
}

/// Stop-token logits, one per sequence.
pub fn stop_logits(values: &[f32], device: &NdArrayDevice) -> Tensor<TestBackend, 2> {
    tensor2(values.iter().map(|&v| vec![v]).collect(), device)
}
