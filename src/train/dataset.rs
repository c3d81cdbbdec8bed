//! Training-time dataset and batch loader.
//!
//! [`SecureTripletDataset`] wraps a persisted [`TripletBatch`] and gives every
//! triplet two cancelable keys `k1`, `k2` (uniform in `[0, 1)`), drawn once
//! from a seeded generator. [`BatchLoader`] walks a subset of the dataset's
//! indices in shuffled batches, reshuffling every epoch.
use std::path::Path;

use anyhow::{bail, Result};
use ndarray::{s, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::io::load_triplets;
use crate::triplet::{TripletBatch, ANCHOR, NEGATIVE, POSITIVE};

/// One collated batch, every array `[B, ·]`.
#[derive(Debug, Clone)]
pub struct SecureBatch {
    pub anchors: Array2<f32>,
    pub positives: Array2<f32>,
    pub negatives: Array2<f32>,
    pub keys1: Array2<f32>,
    pub keys2: Array2<f32>,
}

impl SecureBatch {
    pub fn len(&self) -> usize {
        self.anchors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct SecureTripletDataset {
    triplets: TripletBatch,
    keys1: Array2<f32>,
    keys2: Array2<f32>,
}

impl SecureTripletDataset {
    pub fn new(triplets: TripletBatch, key_dim: usize, seed: u64) -> Result<Self> {
        triplets.check_aligned()?;
        if key_dim == 0 {
            bail!("key dimension must be positive");
        }
        let n = triplets.len();
        let mut rng = StdRng::seed_from_u64(seed);
        let keys1 = Array2::from_shape_simple_fn((n, key_dim), || rng.gen::<f32>());
        let keys2 = Array2::from_shape_simple_fn((n, key_dim), || rng.gen::<f32>());
        Ok(Self { triplets, keys1, keys2 })
    }

    /// Load a triplet file written by the preparation stage.
    pub fn from_file(path: &Path, key_dim: usize, seed: u64) -> Result<Self> {
        Self::new(load_triplets(path)?, key_dim, seed)
    }

    pub fn len(&self) -> usize {
        self.triplets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triplets.is_empty()
    }

    pub fn signal_len(&self) -> usize {
        self.triplets.signal_len()
    }

    pub fn key_dim(&self) -> usize {
        self.keys1.ncols()
    }

    pub fn triplets(&self) -> &TripletBatch {
        &self.triplets
    }

    /// Gather `indices` into one batch.
    pub fn collate(&self, indices: &[usize]) -> SecureBatch {
        let (b, l, k) = (indices.len(), self.signal_len(), self.key_dim());
        let mut out = SecureBatch {
            anchors: Array2::zeros((b, l)),
            positives: Array2::zeros((b, l)),
            negatives: Array2::zeros((b, l)),
            keys1: Array2::zeros((b, k)),
            keys2: Array2::zeros((b, k)),
        };
        let sig = &self.triplets.signals;
        for (row, &i) in indices.iter().enumerate() {
            out.anchors.row_mut(row).assign(&sig.slice(s![i, ANCHOR, ..]));
            out.positives.row_mut(row).assign(&sig.slice(s![i, POSITIVE, ..]));
            out.negatives.row_mut(row).assign(&sig.slice(s![i, NEGATIVE, ..]));
            out.keys1.row_mut(row).assign(&self.keys1.row(i));
            out.keys2.row_mut(row).assign(&self.keys2.row(i));
        }
        out
    }
}

/// Batches over a fixed subset of dataset indices.
pub struct BatchLoader<'a> {
    dataset: &'a SecureTripletDataset,
    indices: Vec<usize>,
    batch_size: usize,
    seed: u64,
}

impl<'a> BatchLoader<'a> {
    pub fn new(
        dataset: &'a SecureTripletDataset,
        indices: Vec<usize>,
        batch_size: usize,
        seed: u64,
    ) -> Result<Self> {
        if batch_size == 0 {
            bail!("batch size must be positive");
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= dataset.len()) {
            bail!("index {bad} out of range for a dataset of {}", dataset.len());
        }
        Ok(Self { dataset, indices, batch_size, seed })
    }

    /// Number of samples in the subset.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    /// Batches for `epoch`. The subset order is a permutation seeded with
    /// `seed + epoch`; the last batch may be short.
    pub fn epoch(&self, epoch: usize) -> impl Iterator<Item = SecureBatch> + '_ {
        let mut order = self.indices.clone();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
        order.shuffle(&mut rng);
        let chunks: Vec<Vec<usize>> = order.chunks(self.batch_size).map(<[usize]>::to_vec).collect();
        chunks.into_iter().map(move |c| self.dataset.collate(&c))
    }
}
