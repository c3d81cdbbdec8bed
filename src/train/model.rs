//! Models trained with the Secure Triplet Loss.
//!
//! A [`SecureModel`] maps a batch of signals and a batch of keys to
//! embeddings. [`LinearSecureEncoder`] is the reference implementation:
//!
//! ```text
//! e = tanh( x · Wx  +  k · Wk  +  b )      x: [B, L]   k: [B, K]   e: [B, D]
//! ```
//!
//! It carries its own Adam state so one `train_step` is forward, loss,
//! backward and update.
use std::path::Path;

use anyhow::{bail, Result};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::dataset::SecureBatch;
use super::loss::{LossOutput, SecureEmbeddings, SecureTripletLoss};
use super::optim::Adam;
use crate::io::{StFile, StWriter};

pub trait SecureModel {
    /// Embed `signals` `[B, L]` under `keys` `[B, K]`.
    fn embed(&self, signals: &Array2<f32>, keys: &Array2<f32>) -> Array2<f32>;

    /// One optimisation step on `batch`.
    fn train_step(&mut self, batch: &SecureBatch, loss: &dyn SecureTripletLoss) -> Result<LossOutput>;

    fn save(&self, path: &Path) -> Result<()>;
}

/// Forward pass producing all four embeddings of a batch.
pub fn forward<M: SecureModel + ?Sized>(model: &M, batch: &SecureBatch) -> SecureEmbeddings {
    SecureEmbeddings {
        anchor: model.embed(&batch.anchors, &batch.keys1),
        positive: model.embed(&batch.positives, &batch.keys1),
        negative: model.embed(&batch.negatives, &batch.keys1),
        positive_rekeyed: model.embed(&batch.positives, &batch.keys2),
    }
}

/// Evaluate `loss` on `batch` without updating the model.
pub fn evaluate<M: SecureModel + ?Sized>(
    model: &M,
    batch: &SecureBatch,
    loss: &dyn SecureTripletLoss,
) -> LossOutput {
    loss.compute(&forward(model, batch))
}

pub struct LinearSecureEncoder {
    pub w_x: Array2<f32>,
    pub w_k: Array2<f32>,
    pub b: Array1<f32>,
    optim: Adam,
}

impl LinearSecureEncoder {
    /// Uniform `±1/√(L+K)` initialisation.
    pub fn new(
        signal_len: usize,
        key_dim: usize,
        embedding_dim: usize,
        learning_rate: f64,
        weight_decay: f64,
        seed: u64,
    ) -> Self {
        let bound = 1.0 / ((signal_len + key_dim).max(1) as f32).sqrt();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut draw = || rng.gen_range(-bound..=bound);
        let w_x = Array2::from_shape_simple_fn((signal_len, embedding_dim), &mut draw);
        let w_k = Array2::from_shape_simple_fn((key_dim, embedding_dim), &mut draw);
        let b = Array1::from_shape_simple_fn(embedding_dim, &mut draw);
        Self { w_x, w_k, b, optim: Adam::new(learning_rate, weight_decay) }
    }

    /// Load weights written by [`SecureModel::save`].
    pub fn load(path: &Path, learning_rate: f64, weight_decay: f64) -> Result<Self> {
        let st = StFile::open(path)?;
        let w_x = st.f32_arr2("w_x")?;
        let w_k = st.f32_arr2("w_k")?;
        let b = Array1::from(st.f32("b")?);
        if w_x.ncols() != w_k.ncols() || w_x.ncols() != b.len() {
            bail!(
                "{}: inconsistent embedding width (w_x {}, w_k {}, b {})",
                path.display(),
                w_x.ncols(),
                w_k.ncols(),
                b.len()
            );
        }
        Ok(Self { w_x, w_k, b, optim: Adam::new(learning_rate, weight_decay) })
    }

    pub fn signal_len(&self) -> usize {
        self.w_x.nrows()
    }

    pub fn key_dim(&self) -> usize {
        self.w_k.nrows()
    }

    pub fn embedding_dim(&self) -> usize {
        self.b.len()
    }

    fn check_input(&self, x: &Array2<f32>, k: &Array2<f32>) -> Result<()> {
        if x.ncols() != self.signal_len() || k.ncols() != self.key_dim() || x.nrows() != k.nrows() {
            bail!(
                "encoder expects [B, {}] signals and [B, {}] keys, got {:?} and {:?}",
                self.signal_len(),
                self.key_dim(),
                x.shape(),
                k.shape()
            );
        }
        Ok(())
    }

    /// Add the parameter gradients of one embedding call to the accumulators.
    fn backward(
        &self,
        x: &Array2<f32>,
        k: &Array2<f32>,
        e: &Array2<f32>,
        g: &Array2<f32>,
        acc: &mut (Array2<f32>, Array2<f32>, Array1<f32>),
    ) {
        let dz = g * &e.mapv(|v| 1.0 - v * v);
        acc.0 += &x.t().dot(&dz);
        acc.1 += &k.t().dot(&dz);
        acc.2 += &dz.sum_axis(Axis(0));
    }
}

impl SecureModel for LinearSecureEncoder {
    fn embed(&self, signals: &Array2<f32>, keys: &Array2<f32>) -> Array2<f32> {
        let z = signals.dot(&self.w_x) + keys.dot(&self.w_k) + &self.b;
        z.mapv(f32::tanh)
    }

    fn train_step(&mut self, batch: &SecureBatch, loss: &dyn SecureTripletLoss) -> Result<LossOutput> {
        self.check_input(&batch.anchors, &batch.keys1)?;
        self.check_input(&batch.positives, &batch.keys2)?;
        self.check_input(&batch.negatives, &batch.keys1)?;

        let emb = forward(self, batch);
        let out = loss.compute(&emb);
        if !out.loss.is_finite() {
            bail!("loss diverged ({})", out.loss);
        }

        let mut acc = (
            Array2::zeros(self.w_x.raw_dim()),
            Array2::zeros(self.w_k.raw_dim()),
            Array1::zeros(self.b.raw_dim()),
        );
        let g = &out.grads;
        self.backward(&batch.anchors, &batch.keys1, &emb.anchor, &g.anchor, &mut acc);
        self.backward(&batch.positives, &batch.keys1, &emb.positive, &g.positive, &mut acc);
        self.backward(&batch.negatives, &batch.keys1, &emb.negative, &g.negative, &mut acc);
        self.backward(&batch.positives, &batch.keys2, &emb.positive_rekeyed, &g.positive_rekeyed, &mut acc);

        self.optim.begin_step();
        self.optim.update(0, &mut self.w_x, &acc.0);
        self.optim.update(1, &mut self.w_k, &acc.1);
        self.optim.update(2, &mut self.b, &acc.2);
        Ok(out)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let mut w = StWriter::new();
        w.add_array("w_x", &self.w_x);
        w.add_array("w_k", &self.w_k);
        w.add_array("b", &self.b);
        w.write(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::loss::SecureTripletLossSl;

    fn batch(seed: u64) -> SecureBatch {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut m = |c: usize| Array2::from_shape_simple_fn((4, c), || rng.gen_range(-1.0_f32..1.0));
        SecureBatch {
            anchors: m(8),
            positives: m(8),
            negatives: m(8),
            keys1: m(3),
            keys2: m(3),
        }
    }

    #[test]
    fn embeddings_are_bounded() {
        let enc = LinearSecureEncoder::new(8, 3, 5, 1e-3, 0.0, 1);
        let b = batch(2);
        let e = enc.embed(&b.anchors, &b.keys1);
        assert_eq!(e.shape(), &[4, 5]);
        assert!(e.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn training_reduces_loss_on_a_fixed_batch() {
        let mut enc = LinearSecureEncoder::new(8, 3, 5, 1e-2, 0.0, 1);
        let loss = SecureTripletLossSl::new(1.0, 0.9);
        let b = batch(3);
        let first = evaluate(&enc, &b, &loss).loss;
        for _ in 0..200 {
            enc.train_step(&b, &loss).unwrap();
        }
        let last = evaluate(&enc, &b, &loss).loss;
        assert!(last < first, "{last} !< {first}");
    }

    #[test]
    fn shape_mismatch_rejected() {
        let mut enc = LinearSecureEncoder::new(9, 3, 5, 1e-3, 0.0, 1);
        let loss = SecureTripletLossSl::new(1.0, 0.9);
        assert!(enc.train_step(&batch(1), &loss).is_err());
    }

    #[test]
    fn save_load_preserves_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let enc = LinearSecureEncoder::new(8, 3, 5, 1e-3, 0.0, 7);
        enc.save(&path).unwrap();
        let back = LinearSecureEncoder::load(&path, 1e-3, 0.0).unwrap();
        assert_eq!(back.w_x, enc.w_x);
        assert_eq!(back.w_k, enc.w_k);
        assert_eq!(back.b, enc.b);
    }
}
