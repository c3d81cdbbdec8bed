//! Secure Triplet Loss training.
//!
//! ```text
//! triplets.safetensors
//!   │
//!   ├─ SecureTripletDataset   + keys k1, k2 per triplet
//!   ├─ split_indices          train / valid subsets
//!   ├─ BatchLoader            reshuffled every epoch
//!   └─ train_secure_triplet_model
//!        │
//!        ├─→ {save_model}                best checkpoint
//!        └─→ {save_model}.history.json   TrainReport
//! ```
pub mod dataset;
pub mod loss;
pub mod model;
pub mod optim;
pub mod trainer;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

pub use dataset::{BatchLoader, SecureBatch, SecureTripletDataset};
pub use loss::{
    Linkability, LossKind, LossOutput, SecureEmbeddings, SecureTripletLoss, SecureTripletLossKld, SecureTripletLossSl,
};
pub use model::{LinearSecureEncoder, SecureModel};
pub use optim::Adam;
pub use trainer::{train_secure_triplet_model, EpochMetrics, TrainReport};

use crate::config::TrainConfig;
use crate::split::split_indices;

/// `{save_model}.history.json`.
pub fn history_path(save_model: &Path) -> PathBuf {
    let mut s = save_model.as_os_str().to_owned();
    s.push(".history.json");
    PathBuf::from(s)
}

/// Load `cfg.train_data`, train the reference encoder and write the history.
pub fn run_training(cfg: &TrainConfig) -> Result<TrainReport> {
    let dataset = SecureTripletDataset::from_file(&cfg.train_data, cfg.key_dim, cfg.seed)
        .with_context(|| format!("loading {}", cfg.train_data.display()))?;
    if dataset.is_empty() {
        bail!("{}: no triplets", cfg.train_data.display());
    }
    tracing::info!(
        n = dataset.len(),
        length = dataset.signal_len(),
        key_dim = dataset.key_dim(),
        "dataset loaded"
    );

    let (train_idx, valid_idx) = split_indices(dataset.len(), cfg.valid_split, cfg.seed);
    let train = BatchLoader::new(&dataset, train_idx, cfg.batch_size, cfg.seed)?;
    let valid = BatchLoader::new(&dataset, valid_idx, cfg.batch_size, cfg.seed)?;

    let mut model = LinearSecureEncoder::new(
        dataset.signal_len(),
        cfg.key_dim,
        cfg.embedding_dim,
        cfg.learning_rate,
        cfg.weight_decay,
        cfg.seed,
    );
    let loss = cfg.loss.build(cfg.margin, cfg.gamma);
    let report = train_secure_triplet_model(&mut model, loss.as_ref(), &train, Some(&valid), cfg)?;

    let hist = history_path(&cfg.save_model);
    let json = serde_json::to_vec_pretty(&report)?;
    std::fs::write(&hist, json).with_context(|| format!("writing {}", hist.display()))?;
    tracing::info!(
        best_epoch = ?report.best_epoch,
        epochs = report.train_hist.len(),
        history = %hist.display(),
        "training finished"
    );
    Ok(report)
}
