//! DNN tensor preparation.
//!
//! Turns a list of variable-length recordings plus their labels into one
//! `[rows, length]` array with the labels kept 1:1 in the same order.
//!
//! ```text
//! signals: [500] [700] [1000]      labels: [a, b, c]
//!    │  resample / window to `length`
//!    │  z-score per row (optional)
//!    └─→ Array2 [3, length]         labels: [a, b, c]
//! ```
use std::collections::HashSet;

use anyhow::Result;
use ndarray::{Array2, Axis};

use crate::config::{LengthPolicy, TensorConfig};
use crate::error::DataError;
use crate::label::SubjectLabel;
use crate::normalize::zscore_rows_inplace;
use crate::resample::resample_to_length;

/// A fixed-shape signal array with aligned labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTensor {
    /// `[rows, length]`.
    pub signals: Array2<f32>,
    pub labels: Vec<SubjectLabel>,
}

impl LabeledTensor {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Samples per row.
    pub fn signal_len(&self) -> usize {
        self.signals.ncols()
    }

    /// Reject a tensor whose row count disagrees with its label count.
    pub fn check_aligned(&self, context: &'static str) -> Result<()> {
        if self.signals.nrows() != self.labels.len() {
            return Err(DataError::ShapeMismatch {
                context,
                left: self.signals.nrows(),
                right: self.labels.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Rows `rows`, in the given order.
    pub fn select(&self, rows: &[usize]) -> Self {
        Self {
            signals: self.signals.select(Axis(0), rows),
            labels: rows.iter().map(|&r| self.labels[r].clone()).collect(),
        }
    }

    /// First row of every identity becomes an anchor, the rest are
    /// remaining. Returns `(anchors, remaining)`.
    pub fn split_anchors(&self) -> (Self, Self) {
        let mut seen = HashSet::new();
        let (mut a, mut r) = (Vec::new(), Vec::new());
        for (i, l) in self.labels.iter().enumerate() {
            if seen.insert(l.identity()) {
                a.push(i);
            } else {
                r.push(i);
            }
        }
        (self.select(&a), self.select(&r))
    }
}

/// `length` samples of `x` starting at `offset`, zero-padded past the end.
pub fn fixed_window(x: &[f32], offset: usize, length: usize) -> Vec<f32> {
    let mut out = vec![0.0_f32; length];
    if offset < x.len() {
        let n = (x.len() - offset).min(length);
        out[..n].copy_from_slice(&x[offset..offset + n]);
    }
    out
}

/// Bring every signal to `cfg.length` samples and stack them.
///
/// # Errors
///
/// * [`DataError::ShapeMismatch`] if `signals.len() != labels.len()`.
/// * [`DataError::EmptySignal`] if a signal has no samples.
pub fn prepare_for_dnn(
    signals: &[Vec<f32>],
    labels: &[SubjectLabel],
    cfg: &TensorConfig,
) -> Result<LabeledTensor> {
    if signals.len() != labels.len() {
        return Err(DataError::ShapeMismatch {
            context: "prepare_for_dnn signals/labels",
            left: signals.len(),
            right: labels.len(),
        }
        .into());
    }

    let mut out = Array2::<f32>::zeros((signals.len(), cfg.length));
    for (i, x) in signals.iter().enumerate() {
        if x.is_empty() {
            return Err(DataError::EmptySignal { index: i }.into());
        }
        let row = match cfg.policy {
            LengthPolicy::Resample => resample_to_length(x, cfg.length)?,
            LengthPolicy::Window { offset } => fixed_window(x, offset, cfg.length),
        };
        out.row_mut(i).assign(&ndarray::ArrayView1::from(&row));
    }
    if cfg.zscore {
        zscore_rows_inplace(&mut out);
    }

    Ok(LabeledTensor { signals: out, labels: labels.to_vec() })
}
