//! Epoch loop with validation, best-checkpoint saving and early stopping.
use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::dataset::BatchLoader;
use super::loss::SecureTripletLoss;
use super::model::{evaluate, SecureModel};
use crate::config::TrainConfig;

/// Batch-size weighted means over one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f32,
    pub triplet_accuracy: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub train_hist: Vec<EpochMetrics>,
    /// Empty when training ran without a validation subset.
    pub valid_hist: Vec<EpochMetrics>,
    /// Epoch whose checkpoint is on disk.
    pub best_epoch: Option<usize>,
    pub stopped_early: bool,
}

#[derive(Default)]
struct Running {
    loss: f64,
    acc: f64,
    n: usize,
}

impl Running {
    fn add(&mut self, loss: f32, acc: f32, b: usize) {
        self.loss += loss as f64 * b as f64;
        self.acc += acc as f64 * b as f64;
        self.n += b;
    }

    fn finish(&self, epoch: usize) -> EpochMetrics {
        let n = self.n.max(1) as f64;
        EpochMetrics {
            epoch,
            loss: (self.loss / n) as f32,
            triplet_accuracy: (self.acc / n) as f32,
        }
    }
}

/// Train `model` for up to `cfg.epochs` epochs.
///
/// The monitored quantity is the validation loss, or the training loss when
/// `valid` is `None` or empty. Each improvement saves the model to
/// `cfg.save_model`; `cfg.patience` epochs without one stop the run.
pub fn train_secure_triplet_model<M: SecureModel + ?Sized>(
    model: &mut M,
    loss: &dyn SecureTripletLoss,
    train: &BatchLoader<'_>,
    valid: Option<&BatchLoader<'_>>,
    cfg: &TrainConfig,
) -> Result<TrainReport> {
    let valid = valid.filter(|v| !v.is_empty());
    let mut report = TrainReport::default();
    let mut best = f32::INFINITY;
    let mut since_best = 0usize;

    tracing::info!(
        loss = loss.name(),
        train = train.len(),
        valid = valid.map_or(0, |v| v.len()),
        batches = train.num_batches(),
        "training"
    );

    for epoch in 0..cfg.epochs {
        let mut run = Running::default();
        for batch in train.epoch(epoch) {
            let out = model.train_step(&batch, loss)?;
            run.add(out.loss, out.triplet_accuracy, batch.len());
        }
        let train_m = run.finish(epoch);
        report.train_hist.push(train_m);

        let monitored = match valid {
            Some(v) => {
                let mut run = Running::default();
                for batch in v.epoch(epoch) {
                    let out = evaluate(model, &batch, loss);
                    run.add(out.loss, out.triplet_accuracy, batch.len());
                }
                let m = run.finish(epoch);
                report.valid_hist.push(m);
                tracing::info!(
                    epoch,
                    train_loss = train_m.loss,
                    train_acc = train_m.triplet_accuracy,
                    valid_loss = m.loss,
                    valid_acc = m.triplet_accuracy,
                    "epoch done"
                );
                m.loss
            }
            None => {
                tracing::info!(
                    epoch,
                    train_loss = train_m.loss,
                    train_acc = train_m.triplet_accuracy,
                    "epoch done"
                );
                train_m.loss
            }
        };

        if monitored < best {
            best = monitored;
            since_best = 0;
            model.save(&cfg.save_model)?;
            report.best_epoch = Some(epoch);
            tracing::debug!(epoch, loss = best, path = %cfg.save_model.display(), "checkpoint");
        } else {
            since_best += 1;
            if since_best >= cfg.patience {
                tracing::info!(epoch, best_epoch = ?report.best_epoch, "early stop");
                report.stopped_early = true;
                break;
            }
        }
    }
    Ok(report)
}
