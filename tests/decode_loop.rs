mod common;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use burn_ndarray::NdArrayDevice;
use common::{ramp_frames, stop_logits, TestBackend};
use tacostep::{
    dynamic_decode, seeded_rng, CellOutput, DecodeOptions, DecoderCell, DenseCellConfig,
    Helper, HelperConfig, HelperError, InferenceHelper, TrainingHelper,
};

/// Emits `input + 1` and replays a fixed table of stop logits, one row per step.
struct ScriptedCell {
    stops: Vec<Vec<f32>>,
}

impl DecoderCell<TestBackend> for ScriptedCell {
    type State = usize;

    fn step(
        &self,
        input: Tensor<TestBackend, 2>,
        step: usize,
    ) -> anyhow::Result<CellOutput<TestBackend, usize>> {
        let device = input.device();
        let row = self
            .stops
            .get(step)
            .ok_or_else(|| anyhow::anyhow!("no stop logits scripted for step {step}"))?;
        Ok(CellOutput {
            output: input.add_scalar(1.0),
            stop_token: stop_logits(row, &device),
            state: step + 1,
        })
    }
}

fn values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

#[test]
fn training_decode_runs_until_longest_sequence() {
    let device = NdArrayDevice::default();
    let config = HelperConfig::default();
    let mut helper = TrainingHelper::new(
        ramp_frames(2, 5, 1, &device),
        &[3, 5],
        None,
        &config,
        seeded_rng(config.seed),
    )
    .unwrap();
    let cell = ScriptedCell {
        stops: vec![vec![0.0, 0.0]; 8],
    };

    let decoded = dynamic_decode(&cell, &mut helper, 0, DecodeOptions::new(8)).unwrap();
    assert_eq!(decoded.steps, 5);
    assert_eq!(decoded.sequence_lengths, vec![3, 5]);
    assert_eq!(decoded.finished, vec![true, true]);
    assert!(!decoded.hit_step_limit);
    assert_eq!(decoded.outputs.dims(), [2, 5, 1]);
    assert_eq!(decoded.stop_tokens.dims(), [2, 5]);
    assert_eq!(decoded.sample_ids.dims(), [2, 5]);

    // Step 0 sees the zero start frame, step t > 0 sees ground-truth frame t - 1.
    // Sequence 0 finished at step 2, so steps 3 and 4 are imputed as zeros.
    assert_eq!(
        values(decoded.outputs),
        vec![1.0, 1.0, 2.0, 0.0, 0.0, 1.0, 101.0, 102.0, 103.0, 104.0]
    );
}

#[test]
fn imputation_can_be_disabled() {
    let device = NdArrayDevice::default();
    let config = HelperConfig::default();
    let mut helper = TrainingHelper::new(
        ramp_frames(2, 3, 1, &device),
        &[1, 3],
        None,
        &config,
        seeded_rng(config.seed),
    )
    .unwrap();
    let cell = ScriptedCell {
        stops: vec![vec![0.0, 0.0]; 3],
    };
    let options = DecodeOptions {
        max_steps: 3,
        impute_finished: false,
    };
    let decoded = dynamic_decode(&cell, &mut helper, 0, options).unwrap();
    assert_eq!(decoded.sequence_lengths, vec![1, 3]);
    // Sequence 0 keeps receiving ground truth after it finished.
    assert_eq!(
        values(decoded.outputs),
        vec![1.0, 1.0, 2.0, 1.0, 101.0, 102.0]
    );
}

#[test]
fn unmasked_training_decode_stops_on_step_budget() {
    let device = NdArrayDevice::default();
    let config = HelperConfig {
        mask_decoder_sequence: false,
        ..HelperConfig::default()
    };
    let mut helper = TrainingHelper::new(
        ramp_frames(2, 4, 1, &device),
        &[1, 2],
        None,
        &config,
        seeded_rng(config.seed),
    )
    .unwrap();
    let cell = ScriptedCell {
        stops: vec![vec![9.0, 9.0]; 4],
    };
    let decoded = dynamic_decode(&cell, &mut helper, 0, DecodeOptions::new(4)).unwrap();
    assert_eq!(decoded.steps, 4);
    assert!(decoded.hit_step_limit);
    assert_eq!(decoded.finished, vec![false, false]);
    assert_eq!(decoded.sequence_lengths, vec![4, 4]);
}

#[test]
fn unmasked_training_decode_past_buffer_fails_fast() {
    let device = NdArrayDevice::default();
    let config = HelperConfig {
        mask_decoder_sequence: false,
        ..HelperConfig::default()
    };
    let mut helper = TrainingHelper::new(
        ramp_frames(1, 2, 1, &device),
        &[2],
        None,
        &config,
        seeded_rng(config.seed),
    )
    .unwrap();
    let cell = ScriptedCell {
        stops: vec![vec![0.0]; 5],
    };
    let err = dynamic_decode(&cell, &mut helper, 0, DecodeOptions::new(5)).unwrap_err();
    assert_eq!(
        err.downcast_ref::<HelperError>(),
        Some(&HelperError::IndexOutOfRange {
            what: "ground-truth buffer",
            index: 2,
            len: 2,
        })
    );
}

#[test]
fn inference_finished_flags_stay_set_when_stop_token_drops() {
    let device = NdArrayDevice::default();
    let mut helper =
        InferenceHelper::new(ramp_frames(2, 1, 1, &device), None, &HelperConfig::default())
            .unwrap();
    // Sequence 0 fires at step 1 then "changes its mind"; sequence 1 fires at step 3.
    let cell = ScriptedCell {
        stops: vec![
            vec![-1.0, -1.0],
            vec![1.0, -1.0],
            vec![-1.0, -1.0],
            vec![-1.0, 1.0],
        ],
    };
    let decoded = dynamic_decode(&cell, &mut helper, 0, DecodeOptions::new(10)).unwrap();
    assert_eq!(decoded.steps, 4);
    assert_eq!(decoded.final_state, 4);
    assert_eq!(decoded.sequence_lengths, vec![2, 4]);
    assert_eq!(decoded.finished, vec![true, true]);
    // Sequence 0 outputs after step 1 are zeroed; sequence 1 counts up from frame 0.
    assert_eq!(
        values(decoded.outputs),
        vec![1.0, 2.0, 0.0, 0.0, 101.0, 102.0, 103.0, 104.0]
    );
    // Stop logits of a finished sequence are imputed like its frames.
    assert_eq!(
        values(decoded.stop_tokens),
        vec![-1.0, 1.0, 0.0, 0.0, -1.0, -1.0, -1.0, 1.0]
    );
}

#[test]
fn imputation_zeroes_stop_logits_and_ids() {
    let device = NdArrayDevice::default();
    let stops = vec![vec![-2.0, -2.0], vec![3.0, -2.0], vec![-2.0, -2.0]];

    let run = |impute_finished: bool| {
        // Frames are `[v, v + 0.5]`, so every emitted frame has arg-max 1.
        let mut helper =
            InferenceHelper::new(ramp_frames(2, 1, 2, &device), None, &HelperConfig::default())
                .unwrap();
        let cell = ScriptedCell {
            stops: stops.clone(),
        };
        let options = DecodeOptions {
            max_steps: 3,
            impute_finished,
        };
        dynamic_decode(&cell, &mut helper, 0, options).unwrap()
    };

    let imputed = run(true);
    assert_eq!(imputed.sequence_lengths, vec![2, 3]);
    assert_eq!(
        values(imputed.stop_tokens),
        vec![-2.0, 3.0, 0.0, -2.0, -2.0, -2.0]
    );
    let ids: Vec<i64> = imputed.sample_ids.into_data().iter::<i64>().collect();
    assert_eq!(ids, vec![1, 1, 0, 1, 1, 1]);

    let raw = run(false);
    assert_eq!(values(raw.stop_tokens), vec![-2.0, 3.0, -2.0, -2.0, -2.0, -2.0]);
    let ids: Vec<i64> = raw.sample_ids.into_data().iter::<i64>().collect();
    assert_eq!(ids, vec![1, 1, 1, 1, 1, 1]);
}

#[test]
fn dense_cell_runs_under_either_helper() {
    let device = NdArrayDevice::default();
    let config = HelperConfig {
        sampling_prob: 0.5,
        seed: Some(5),
        ..HelperConfig::default()
    };
    let frames = ramp_frames(2, 6, 4, &device);
    let cell = DenseCellConfig::new(4, 8, 4).init::<TestBackend>(&device);

    let mut training: Helper<TestBackend> = TrainingHelper::new(
        frames.clone(),
        &[6, 2],
        None,
        &config,
        seeded_rng(config.seed),
    )
    .unwrap()
    .into();
    let decoded = dynamic_decode(
        &cell,
        &mut training,
        cell.zero_state(2, &device),
        DecodeOptions::new(10),
    )
    .unwrap();
    assert_eq!(decoded.sequence_lengths, vec![6, 2]);
    assert_eq!(decoded.final_state.dims(), [2, 8]);

    let mut inference: Helper<TestBackend> =
        InferenceHelper::new(frames, None, &config).unwrap().into();
    let decoded = dynamic_decode(
        &cell,
        &mut inference,
        cell.zero_state(2, &device),
        DecodeOptions::new(7),
    )
    .unwrap();
    assert!(decoded.steps >= 1 && decoded.steps <= 7);
    assert_eq!(decoded.outputs.dims(), [2, decoded.steps, 4]);
    assert!(decoded
        .sequence_lengths
        .iter()
        .all(|&length| length >= 1 && length <= decoded.steps));
}
