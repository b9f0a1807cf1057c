//! Command-line interface for exercising the decoding helpers.
//!
//! `simulate` runs a randomly initialised decoder cell through a full training
//! or inference decode on synthetic frames; `check-config` validates a YAML run
//! description.

use anyhow::Result;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use tacostep::config::{load_config, Config};
use tacostep::perf;
use tacostep::{
    dynamic_decode, seeded_rng, DecodeOptions, DecoderHelper, DenseCellConfig, DensePrenet,
    Helper, InferenceHelper, Prenet, SamplingSchedule, TrainingHelper,
};

/// Which helper drives the decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
enum Mode {
    /// Teacher forcing / scheduled sampling against synthetic ground truth.
    Training,
    /// Free running, stopped by the cell's stop-token head.
    Inference,
}

/// Top-level CLI options.
#[derive(Parser)]
#[command(name = "tacostep")]
#[command(about = "Drive Tacotron-style decoding helpers", long_about = None)]
struct Cli {
    /// Print performance summary at the end of the run.
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Decode synthetic frames with a random decoder cell.
    Simulate {
        /// Run configuration YAML.
        #[arg(long)]
        config: PathBuf,
        /// Helper variant.
        #[arg(long, value_enum, default_value_t = Mode::Training)]
        mode: Mode,
        /// Number of sequences.
        #[arg(long, default_value_t = 2)]
        batch: usize,
        /// Ground-truth frames per sequence.
        #[arg(long, default_value_t = 16)]
        frames: usize,
        /// Frame width when no prenet is configured.
        #[arg(long, default_value_t = 8)]
        dim: usize,
        /// Recurrent width of the decoder cell.
        #[arg(long, default_value_t = 32)]
        hidden: usize,
        /// Global training step used by the sampling schedule.
        #[arg(long, default_value_t = 0)]
        global_step: usize,
        /// Seed for synthetic data (and sampling, unless the config sets one).
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Load and validate a configuration file.
    CheckConfig {
        /// Run configuration YAML.
        config: PathBuf,
    },
}

/// Arguments for `simulate`.
struct SimulateArgs {
    config_path: PathBuf,
    mode: Mode,
    batch: usize,
    frames: usize,
    dim: usize,
    hidden: usize,
    global_step: usize,
    seed: u64,
}

fn main() -> Result<()> {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .try_init();

    let cli = Cli::parse();
    let verbose = cli.verbose;

    match cli.command {
        Commands::Simulate {
            config,
            mode,
            batch,
            frames,
            dim,
            hidden,
            global_step,
            seed,
        } => {
            let args = SimulateArgs {
                config_path: config,
                mode,
                batch,
                frames,
                dim,
                hidden,
                global_step,
                seed,
            };
            let device = NdArrayDevice::default();
            run_simulate::<NdArray<f32>>(args, &device)?;
        }
        Commands::CheckConfig { config } => {
            let loaded = load_config(&config)?;
            print_config_summary(&config, &loaded);
        }
    }

    if verbose {
        eprintln!("{}", perf::report());
    }

    Ok(())
}

fn run_simulate<B: Backend>(args: SimulateArgs, device: &B::Device) -> Result<()> {
    if args.batch == 0 || args.frames == 0 {
        anyhow::bail!("--batch and --frames must be > 0");
    }
    let config = load_config(&args.config_path)?;
    let mut helper_config = config.helper.clone();
    if helper_config.seed.is_none() {
        helper_config.seed = Some(args.seed);
    }
    if let Some(schedule) = config.schedule.as_ref() {
        helper_config =
            SamplingSchedule::from_config(schedule).apply(&helper_config, args.global_step);
    }

    let dim = config
        .prenet
        .as_ref()
        .map(|prenet| prenet.input_dim)
        .unwrap_or(args.dim);
    let mut rng = StdRng::seed_from_u64(args.seed);
    let frames = synthetic_frames::<B>(&mut rng, args.batch, args.frames, dim, device);

    let make_prenet = || -> Result<Option<Box<dyn Prenet<B>>>> {
        match config.prenet.as_ref() {
            Some(prenet) => {
                let prenet = DensePrenet::<B>::from_config(
                    prenet,
                    Some(args.config_path.as_path()),
                    device,
                )?;
                Ok(Some(Box::new(prenet)))
            }
            None => Ok(None),
        }
    };

    let lengths: Vec<usize> = (0..args.batch)
        .map(|_| rng.gen_range(1..=args.frames))
        .collect();
    let mut helper: Helper<B> = match args.mode {
        Mode::Training => {
            let stream = seeded_rng(helper_config.seed);
            TrainingHelper::new(frames, &lengths, make_prenet()?, &helper_config, stream)?.into()
        }
        Mode::Inference => InferenceHelper::new(frames, make_prenet()?, &helper_config)?.into(),
    };

    let input_dim = helper.input_dim();
    let cell = DenseCellConfig::new(input_dim, args.hidden, dim).init::<B>(device);
    let mut options = DecodeOptions::from(&config.decode);
    if args.mode == Mode::Training && !helper_config.mask_decoder_sequence {
        // Without masking the helper never finishes; stay inside the buffer.
        options.max_steps = options.max_steps.min(args.frames);
    }

    let decoded = dynamic_decode(
        &cell,
        &mut helper,
        cell.zero_state(args.batch, device),
        options,
    )?;

    println!(
        "mode: {:?}, sampling_prob: {}, steps: {}, hit_step_limit: {}",
        args.mode, helper_config.sampling_prob, decoded.steps, decoded.hit_step_limit
    );
    for (index, (length, finished)) in decoded
        .sequence_lengths
        .iter()
        .zip(decoded.finished.iter())
        .enumerate()
    {
        println!("sequence {index}: length {length}, finished {finished}");
    }
    Ok(())
}

/// Uniform noise frames in `[-1, 1)`, shape `[batch, frames, dim]`.
fn synthetic_frames<B: Backend>(
    rng: &mut StdRng,
    batch: usize,
    frames: usize,
    dim: usize,
    device: &B::Device,
) -> Tensor<B, 3> {
    let values: Vec<f32> = (0..batch * frames * dim)
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();
    Tensor::from_data(TensorData::new(values, [batch, frames, dim]), device)
}

fn print_config_summary(path: &Path, config: &Config) {
    println!("config ok: {}", path.display());
    println!(
        "helper: sampling_prob={} anneal_teacher_forcing={} stop_gradient={} time_major={} mask_decoder_sequence={}",
        config.helper.sampling_prob,
        config.helper.anneal_teacher_forcing,
        config.helper.stop_gradient,
        config.helper.time_major,
        config.helper.mask_decoder_sequence
    );
    println!(
        "decode: max_steps={} impute_finished={}",
        config.decode.max_steps, config.decode.impute_finished
    );
    if let Some(schedule) = &config.schedule {
        println!(
            "schedule: {}..{} -> {}",
            schedule.start_step, schedule.end_step, schedule.final_prob
        );
    }
    if let Some(prenet) = &config.prenet {
        println!(
            "prenet: input_dim={} layers={:?}",
            prenet.input_dim, prenet.layer_sizes
        );
    }
}
