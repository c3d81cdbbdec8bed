//! Pipeline configuration.
//!
//! Every path, count and hyper-parameter of the preparation and training
//! stages lives in one of the structs below. All fields are `pub` and every
//! struct implements [`Default`] with the values used for the ECG-ID and
//! Heartprint experiments, so callers override only what they need:
//!
//! ```
//! use securetl::{PrepareConfig, TensorConfig};
//!
//! let cfg = PrepareConfig {
//!     n_train: 1_000,
//!     tensor: TensorConfig { length: 500, ..TensorConfig::default() },
//!     ..PrepareConfig::default()
//! };
//! assert_eq!(cfg.tensor.length, 500);
//! ```
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

use crate::train::loss::LossKind;

// ── Subject range ─────────────────────────────────────────────────────────

/// Half-open interval of subject identifiers, written `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectRange {
    pub start: u32,
    pub end: u32,
}

impl SubjectRange {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn iter(&self) -> Range<u32> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for SubjectRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl FromStr for SubjectRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (a, b) = s
            .split_once("..")
            .with_context(|| format!("subject range {s:?}: expected `start..end`"))?;
        let start = a.trim().parse().with_context(|| format!("subject range {s:?}"))?;
        let end = b.trim().parse().with_context(|| format!("subject range {s:?}"))?;
        if end < start {
            bail!("subject range {s:?}: end before start");
        }
        Ok(Self { start, end })
    }
}

// ── Tensor preparation ────────────────────────────────────────────────────

/// How a variable-length recording is brought to the common row length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthPolicy {
    /// FFT resample the whole recording to exactly `length` samples.
    #[default]
    Resample,
    /// Cut `length` samples starting at `offset`; zero-pad when short.
    Window { offset: usize },
}

/// Settings for [`crate::prepare::prepare_for_dnn`].
#[derive(Debug, Clone)]
pub struct TensorConfig {
    /// Samples per output row.
    ///
    /// Default: `1000`.
    pub length: usize,

    /// Length normalisation policy.
    ///
    /// Default: [`LengthPolicy::Resample`].
    pub policy: LengthPolicy,

    /// Z-score every row after length normalisation.
    ///
    /// Rows with zero variance are left unscaled.
    ///
    /// Default: `true`.
    pub zscore: bool,
}

impl Default for TensorConfig {
    fn default() -> Self {
        Self {
            length: 1000,
            policy: LengthPolicy::Resample,
            zscore: true,
        }
    }
}

// ── ECG-ID preparation ────────────────────────────────────────────────────

/// Configuration for preparing the ECG-ID database.
#[derive(Debug, Clone)]
pub struct PrepareConfig {
    /// Directory holding the `NNN_*.hea / .dat / .atr` record triples.
    pub dataset_root: PathBuf,

    /// Output path for the training triplets.
    pub save_train: PathBuf,

    /// Output path for the test triplets.
    pub save_test: PathBuf,

    /// Number of training triplets.
    ///
    /// Default: `100_000`.
    pub n_train: usize,

    /// Number of test triplets.
    ///
    /// Default: `10_000`.
    pub n_test: usize,

    /// Sampling rate of the recordings in Hz. Records whose header declares a
    /// different rate are rejected.
    ///
    /// Default: `500.0`.
    pub fs: f32,

    /// Signal channel to read (1 = filtered ECG in ECG-ID).
    ///
    /// Default: `1`.
    pub channel: usize,

    /// Subjects used for training. Default: `1..73` (72 subjects).
    pub train_subjects: SubjectRange,

    /// Subjects used for testing. Default: `73..91` (18 subjects).
    pub test_subjects: SubjectRange,

    pub tensor: TensorConfig,

    /// Seed for triplet sampling. The test split uses `seed + 1`.
    ///
    /// Default: `42`.
    pub seed: u64,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("data/ecgid"),
            save_train: PathBuf::from("ecg_train_data.safetensors"),
            save_test: PathBuf::from("ecg_test_data.safetensors"),
            n_train: 100_000,
            n_test: 10_000,
            fs: 500.0,
            channel: 1,
            train_subjects: SubjectRange::new(1, 73),
            test_subjects: SubjectRange::new(73, 91),
            tensor: TensorConfig::default(),
            seed: 42,
        }
    }
}

// ── Heartprint preparation ────────────────────────────────────────────────

/// Configuration for preparing the Heartprint database.
#[derive(Debug, Clone)]
pub struct HeartprintConfig {
    /// Directory holding the `Session-*` folders.
    pub root: PathBuf,

    /// Session names in reading order.
    ///
    /// Default: `["1", "2", "3R", "3L"]`.
    pub sessions: Vec<String>,

    /// Default: `1..169` (168 subjects).
    pub subjects: SubjectRange,

    /// Upper bound on records read per subject and session.
    ///
    /// Default: `10`.
    pub records_per_session: usize,

    /// Fraction of each subject's recordings held out for testing.
    ///
    /// Default: `0.2`.
    pub test_fraction: f64,

    pub save_train: PathBuf,
    pub save_test: PathBuf,
    pub n_train: usize,
    pub n_test: usize,
    pub tensor: TensorConfig,
    pub seed: u64,
}

impl Default for HeartprintConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/heartprint"),
            sessions: ["1", "2", "3R", "3L"].map(String::from).to_vec(),
            subjects: SubjectRange::new(1, 169),
            records_per_session: 10,
            test_fraction: 0.2,
            save_train: PathBuf::from("heartprint_train_data.safetensors"),
            save_test: PathBuf::from("heartprint_test_data.safetensors"),
            n_train: 100_000,
            n_test: 10_000,
            tensor: TensorConfig::default(),
            seed: 42,
        }
    }
}

// ── Training ──────────────────────────────────────────────────────────────

/// Configuration for [`crate::train::train_secure_triplet_model`].
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Triplet file written by one of the preparation binaries.
    pub train_data: PathBuf,

    /// Checkpoint path (best validation loss). [`crate::train::run_training`]
    /// writes the history next to it with a `.history.json` suffix.
    pub save_model: PathBuf,

    /// Adam step size. Default: `1e-4`.
    pub learning_rate: f64,

    /// L2 penalty added to every gradient. Default: `1e-3`.
    pub weight_decay: f64,

    /// Default: `100`.
    pub epochs: usize,

    /// Default: `16`.
    pub batch_size: usize,

    /// Fraction of triplets held out for validation. Default: `0.2`.
    pub valid_split: f64,

    /// Triplet margin. Default: `1.0`.
    pub margin: f32,

    /// Weight of the discriminative term; the linkability term gets
    /// `1 − gamma`. Default: `0.9`.
    pub gamma: f32,

    /// Default: [`LossKind::Kld`].
    pub loss: LossKind,

    /// Epochs without validation improvement before stopping. Default: `25`.
    pub patience: usize,

    /// Seed for the split, key generation, shuffling and weight init.
    ///
    /// Default: `42`.
    pub seed: u64,

    /// Length of the cancelable keys. Default: `100`.
    pub key_dim: usize,

    /// Embedding size of the reference encoder. Default: `16`.
    pub embedding_dim: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_data: PathBuf::from("ecg_train_data.safetensors"),
            save_model: PathBuf::from("model_name.safetensors"),
            learning_rate: 1e-4,
            weight_decay: 1e-3,
            epochs: 100,
            batch_size: 16,
            valid_split: 0.2,
            margin: 1.0,
            gamma: 0.9,
            loss: LossKind::Kld,
            patience: 25,
            seed: 42,
            key_dim: 100,
            embedding_dim: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_range_parses() {
        let r: SubjectRange = "1..73".parse().unwrap();
        assert_eq!(r, SubjectRange::new(1, 73));
        assert_eq!(r.len(), 72);
        assert_eq!(r.to_string(), "1..73");
    }

    #[test]
    fn subject_range_rejects_garbage() {
        assert!("1-73".parse::<SubjectRange>().is_err());
        assert!("9..3".parse::<SubjectRange>().is_err());
    }

    #[test]
    fn defaults_split_ecgid_subjects() {
        let cfg = PrepareConfig::default();
        assert_eq!(cfg.train_subjects.len() + cfg.test_subjects.len(), 90);
        assert_eq!(cfg.train_subjects.end, cfg.test_subjects.start);
    }
}
