//! Triplet generation.
//!
//! Samples `N` (anchor, positive, negative) triplets with replacement from an
//! anchor tensor (one row per subject) and a remaining tensor (every other
//! recording):
//!
//! ```text
//! anchor    uniform over anchors whose identity has ≥ 1 remaining row
//! positive  uniform over remaining rows of the anchor's identity
//! negative  identity uniform over all other identities,
//!           then a row uniform over that identity's anchor + remaining rows
//! ```
//!
//! Candidate pools are built once up front. An anchor identity with no
//! remaining rows is left out of the anchor pool (it can still serve as a
//! negative), so no draw ever needs to be retried.
//!
//! Sampling uses a seeded [`StdRng`]: the same inputs and seed give the same
//! batch.
use std::collections::BTreeMap;

use anyhow::Result;
use ndarray::{s, Array3, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::DataError;
use crate::label::{SubjectLabel, TripletLabel};
use crate::prepare::LabeledTensor;

/// Slot of a sample inside a triplet row.
pub const ANCHOR: usize = 0;
pub const POSITIVE: usize = 1;
pub const NEGATIVE: usize = 2;

/// `N` triplets: signals `[N, 3, L]` plus one label entry per triplet.
#[derive(Debug, Clone, PartialEq)]
pub struct TripletBatch {
    pub signals: Array3<f32>,
    pub labels: Vec<TripletLabel>,
}

impl TripletBatch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Samples per signal.
    pub fn signal_len(&self) -> usize {
        self.signals.shape()[2]
    }

    pub fn anchor(&self, i: usize) -> ArrayView1<'_, f32> {
        self.signals.slice(s![i, ANCHOR, ..])
    }

    pub fn positive(&self, i: usize) -> ArrayView1<'_, f32> {
        self.signals.slice(s![i, POSITIVE, ..])
    }

    pub fn negative(&self, i: usize) -> ArrayView1<'_, f32> {
        self.signals.slice(s![i, NEGATIVE, ..])
    }

    /// Reject a batch whose triplet count disagrees with its label count or
    /// whose second axis is not 3.
    pub fn check_aligned(&self) -> Result<()> {
        let shape = self.signals.shape();
        if shape[1] != 3 {
            return Err(DataError::ShapeMismatch {
                context: "triplet slots",
                left: shape[1],
                right: 3,
            }
            .into());
        }
        if shape[0] != self.labels.len() {
            return Err(DataError::ShapeMismatch {
                context: "triplet signals/labels",
                left: shape[0],
                right: self.labels.len(),
            }
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Row {
    Anchor(usize),
    Remaining(usize),
}

/// Candidate pools derived from the inputs.
struct Pools {
    /// Anchor rows whose identity has at least one positive.
    anchors: Vec<usize>,
    /// Remaining rows per identity.
    positives: BTreeMap<u32, Vec<usize>>,
    /// Every row (anchor or remaining) per identity.
    members: BTreeMap<u32, Vec<Row>>,
    /// Sorted distinct identities.
    identities: Vec<u32>,
}

impl Pools {
    fn build(anchors: &LabeledTensor, remaining: &LabeledTensor) -> Result<Self> {
        let mut positives: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        let mut members: BTreeMap<u32, Vec<Row>> = BTreeMap::new();
        for (i, l) in anchors.labels.iter().enumerate() {
            members.entry(l.identity()).or_default().push(Row::Anchor(i));
        }
        for (i, l) in remaining.labels.iter().enumerate() {
            positives.entry(l.identity()).or_default().push(i);
            members.entry(l.identity()).or_default().push(Row::Remaining(i));
        }

        let identities: Vec<u32> = members.keys().copied().collect();
        if identities.len() < 2 {
            return Err(DataError::InsufficientIdentities { found: identities.len() }.into());
        }

        let eligible: Vec<usize> = anchors
            .labels
            .iter()
            .enumerate()
            .filter(|(_, l)| positives.contains_key(&l.identity()))
            .map(|(i, _)| i)
            .collect();
        if eligible.is_empty() {
            return Err(DataError::NoPositiveCandidates { remaining: remaining.len() }.into());
        }
        let excluded = anchors.len() - eligible.len();
        if excluded > 0 {
            tracing::warn!(excluded, "anchors without positive candidates left out of the anchor pool");
        }

        Ok(Self { anchors: eligible, positives, members, identities })
    }

    /// A uniformly chosen identity different from `id`.
    fn other_identity(&self, id: u32, rng: &mut StdRng) -> u32 {
        let pos = self.identities.binary_search(&id).unwrap_or(self.identities.len());
        let k = rng.gen_range(0..self.identities.len() - 1);
        let k = if pos < self.identities.len() && k >= pos { k + 1 } else { k };
        self.identities[k]
    }
}

/// Generate `n` triplets.
///
/// # Errors
///
/// * [`DataError::ShapeMismatch`] if either tensor's labels disagree with its
///   rows, or the two tensors have different signal lengths.
/// * [`DataError::InsufficientIdentities`] if fewer than two identities exist
///   across both tensors.
/// * [`DataError::NoPositiveCandidates`] if no anchor identity appears in
///   `remaining`.
pub fn generate_triplets(
    anchors: &LabeledTensor,
    remaining: &LabeledTensor,
    n: usize,
    seed: u64,
) -> Result<TripletBatch> {
    anchors.check_aligned("anchor signals/labels")?;
    remaining.check_aligned("remaining signals/labels")?;
    if !remaining.is_empty() && anchors.signal_len() != remaining.signal_len() {
        return Err(DataError::ShapeMismatch {
            context: "anchor/remaining signal length",
            left: anchors.signal_len(),
            right: remaining.signal_len(),
        }
        .into());
    }

    let pools = Pools::build(anchors, remaining)?;
    tracing::debug!(
        anchors = pools.anchors.len(),
        identities = pools.identities.len(),
        n,
        "triplet pools ready"
    );

    let len = anchors.signal_len();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut signals = Array3::<f32>::zeros((n, 3, len));
    let mut labels = Vec::with_capacity(n);

    for t in 0..n {
        let a = pools.anchors[rng.gen_range(0..pools.anchors.len())];
        let a_label: &SubjectLabel = &anchors.labels[a];
        let id = a_label.identity();

        let pos_pool = &pools.positives[&id];
        let p = pos_pool[rng.gen_range(0..pos_pool.len())];

        let neg_id = pools.other_identity(id, &mut rng);
        let neg_pool = &pools.members[&neg_id];
        let (neg_row, neg_label) = match neg_pool[rng.gen_range(0..neg_pool.len())] {
            Row::Anchor(i) => (anchors.signals.row(i), &anchors.labels[i]),
            Row::Remaining(i) => (remaining.signals.row(i), &remaining.labels[i]),
        };

        signals.slice_mut(s![t, ANCHOR, ..]).assign(&anchors.signals.row(a));
        signals.slice_mut(s![t, POSITIVE, ..]).assign(&remaining.signals.row(p));
        signals.slice_mut(s![t, NEGATIVE, ..]).assign(&neg_row);
        labels.push(TripletLabel { anchor: a_label.clone(), negative: neg_label.clone() });
    }

    Ok(TripletBatch { signals, labels })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn tensor(ids: &[u32], len: usize) -> LabeledTensor {
        let signals = Array2::from_shape_fn((ids.len(), len), |(r, t)| (ids[r] * 100 + t as u32) as f32);
        LabeledTensor {
            signals,
            labels: ids.iter().map(|&i| SubjectLabel::anonymous(i)).collect(),
        }
    }

    #[test]
    fn other_identity_never_returns_self() {
        let a = tensor(&[1, 2, 3], 2);
        let r = tensor(&[1, 2, 3], 2);
        let pools = Pools::build(&a, &r).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..200 {
            for id in [1, 2, 3] {
                assert_ne!(pools.other_identity(id, &mut rng), id);
            }
        }
    }

    #[test]
    fn other_identity_reaches_all_others() {
        let a = tensor(&[1, 2, 3, 4], 2);
        let r = tensor(&[1], 2);
        let pools = Pools::build(&a, &r).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..500 {
            seen.insert(pools.other_identity(1, &mut rng));
        }
        assert_eq!(seen.into_iter().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn anchors_without_positives_are_excluded() {
        let a = tensor(&[1, 2, 3], 2);
        let r = tensor(&[2], 2);
        let pools = Pools::build(&a, &r).unwrap();
        assert_eq!(pools.anchors, vec![1]);
    }

    #[test]
    fn zero_triplets_is_an_empty_batch() {
        let b = generate_triplets(&tensor(&[1, 2], 3), &tensor(&[1, 2], 3), 0, 1).unwrap();
        assert!(b.is_empty());
        assert_eq!(b.signals.shape(), &[0, 3, 3]);
    }
}
