use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use securetl::{run_ecgid_preparation, LengthPolicy, PrepareConfig, SubjectRange, TensorConfig};

#[derive(Parser)]
#[command(name = "prepare_ecgid", about = "Build train/test triplet files from the ECG-ID database")]
struct Args {
    /// Directory with the NNN_rec.hea / .dat / .atr triples
    #[arg(long)]
    dataset_root: PathBuf,

    #[arg(long, default_value = "ecg_train_data.safetensors")]
    save_train: PathBuf,

    #[arg(long, default_value = "ecg_test_data.safetensors")]
    save_test: PathBuf,

    /// Number of training triplets
    #[arg(long, default_value_t = 100_000)]
    n_train: usize,

    /// Number of test triplets
    #[arg(long, default_value_t = 10_000)]
    n_test: usize,

    /// Expected sampling rate in Hz
    #[arg(long, default_value_t = 500.0)]
    fs: f32,

    /// Signal channel (1 = filtered)
    #[arg(long, default_value_t = 1)]
    channel: usize,

    #[arg(long, default_value = "1..73")]
    train_subjects: SubjectRange,

    #[arg(long, default_value = "73..91")]
    test_subjects: SubjectRange,

    /// Samples per prepared row
    #[arg(long, default_value_t = 1000)]
    length: usize,

    /// Cut a fixed window at this offset instead of resampling
    #[arg(long)]
    window_offset: Option<usize>,

    /// Skip per-row z-scoring
    #[arg(long)]
    no_zscore: bool,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let cfg = PrepareConfig {
        dataset_root: args.dataset_root,
        save_train: args.save_train,
        save_test: args.save_test,
        n_train: args.n_train,
        n_test: args.n_test,
        fs: args.fs,
        channel: args.channel,
        train_subjects: args.train_subjects,
        test_subjects: args.test_subjects,
        tensor: TensorConfig {
            length: args.length,
            policy: args.window_offset.map_or(LengthPolicy::Resample, |offset| LengthPolicy::Window { offset }),
            zscore: !args.no_zscore,
        },
        seed: args.seed,
    };

    let out = run_ecgid_preparation(&cfg)?;
    println!("Train triplets shape: {:?}", out.train.signals.dim());
    println!("Test triplets shape: {:?}", out.test.signals.dim());
    Ok(())
}
