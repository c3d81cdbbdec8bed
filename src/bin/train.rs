use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use securetl::{run_training, LossKind, TrainConfig};

#[derive(Parser)]
#[command(name = "train", about = "Train an ECG encoder with the Secure Triplet Loss")]
struct Args {
    /// Triplet file from prepare_ecgid / prepare_heartprint
    #[arg(long, default_value = "ecg_train_data.safetensors")]
    train_data: PathBuf,

    /// Best checkpoint path; history goes to <path>.history.json
    #[arg(long, default_value = "model_name.safetensors")]
    save_model: PathBuf,

    #[arg(long, default_value_t = 1e-4)]
    learning_rate: f64,

    #[arg(long, default_value_t = 1e-3)]
    weight_decay: f64,

    #[arg(long, default_value_t = 100)]
    epochs: usize,

    #[arg(long, default_value_t = 16)]
    batch_size: usize,

    /// Fraction of triplets held out for validation
    #[arg(long, default_value_t = 0.2)]
    valid_split: f64,

    #[arg(long, default_value_t = 1.0)]
    margin: f32,

    /// Weight of the discriminative term
    #[arg(long, default_value_t = 0.9)]
    gamma: f32,

    #[arg(long, value_enum, default_value_t = LossKind::Kld)]
    loss: LossKind,

    /// Epochs without validation improvement before stopping
    #[arg(long, default_value_t = 25)]
    patience: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 100)]
    key_dim: usize,

    #[arg(long, default_value_t = 16)]
    embedding_dim: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let cfg = TrainConfig {
        train_data: args.train_data,
        save_model: args.save_model,
        learning_rate: args.learning_rate,
        weight_decay: args.weight_decay,
        epochs: args.epochs,
        batch_size: args.batch_size,
        valid_split: args.valid_split,
        margin: args.margin,
        gamma: args.gamma,
        loss: args.loss,
        patience: args.patience,
        seed: args.seed,
        key_dim: args.key_dim,
        embedding_dim: args.embedding_dim,
    };

    let report = run_training(&cfg)?;
    match report.best_epoch {
        Some(e) => println!("Best epoch {e}, model → {}", cfg.save_model.display()),
        None => println!("No checkpoint written"),
    }
    Ok(())
}
