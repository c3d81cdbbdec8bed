use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use securetl::{run_heartprint_preparation, HeartprintConfig, LengthPolicy, SubjectRange, TensorConfig};

#[derive(Parser)]
#[command(name = "prepare_heartprint", about = "Build train/test triplet files from the Heartprint database")]
struct Args {
    /// Directory with the Session-* folders
    #[arg(long)]
    root: PathBuf,

    /// Session names, comma-separated
    #[arg(long, value_delimiter = ',', default_value = "1,2,3R,3L")]
    sessions: Vec<String>,

    #[arg(long, default_value = "1..169")]
    subjects: SubjectRange,

    /// Records read per subject and session
    #[arg(long, default_value_t = 10)]
    records_per_session: usize,

    /// Fraction of each subject's recordings held out for testing
    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,

    #[arg(long, default_value = "heartprint_train_data.safetensors")]
    save_train: PathBuf,

    #[arg(long, default_value = "heartprint_test_data.safetensors")]
    save_test: PathBuf,

    #[arg(long, default_value_t = 100_000)]
    n_train: usize,

    #[arg(long, default_value_t = 10_000)]
    n_test: usize,

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

    let cfg = HeartprintConfig {
        root: args.root,
        sessions: args.sessions,
        subjects: args.subjects,
        records_per_session: args.records_per_session,
        test_fraction: args.test_fraction,
        save_train: args.save_train,
        save_test: args.save_test,
        n_train: args.n_train,
        n_test: args.n_test,
        tensor: TensorConfig {
            length: args.length,
            policy: args.window_offset.map_or(LengthPolicy::Resample, |offset| LengthPolicy::Window { offset }),
            zscore: !args.no_zscore,
        },
        seed: args.seed,
    };

    let out = run_heartprint_preparation(&cfg)?;
    println!("Training data shape: {:?}", out.train.signals.dim());
    println!("Testing data shape: {:?}", out.test.signals.dim());
    Ok(())
}
