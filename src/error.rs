//! Error taxonomy for dataset preparation.
//!
//! Absence of data (an unused subject slot, a record index past the end of a
//! directory) is never an error: readers return `Ok(None)` for that. Every
//! variant here is fatal for the record or the run that raised it.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    /// A required header field (`Age:`, `Sex:`, …) is absent.
    #[error("{path}: missing required field `{field}`")]
    MissingField { path: PathBuf, field: &'static str },

    /// A header field is present but cannot be interpreted.
    #[error("{path}: invalid value {value:?} for `{field}`")]
    InvalidField {
        path: PathBuf,
        field: &'static str,
        value: String,
    },

    /// A text file contains a line that is not a number.
    #[error("{path}:{line}: cannot parse {text:?} as a sample")]
    Parse {
        path: PathBuf,
        line: usize,
        text: String,
    },

    #[error("{path}: unsupported WFDB storage format {format}")]
    UnsupportedFormat { path: PathBuf, format: u32 },

    /// A binary file ended before the header said it would.
    #[error("{path}: truncated ({detail})")]
    Truncated { path: PathBuf, detail: String },

    /// Two collections that must be aligned 1:1 have different lengths.
    #[error("shape mismatch in {context}: {left} vs {right}")]
    ShapeMismatch {
        context: &'static str,
        left: usize,
        right: usize,
    },

    #[error("signal {index} is empty")]
    EmptySignal { index: usize },

    /// Negative sampling needs at least two identities.
    #[error("triplet generation needs at least 2 distinct identities, found {found}")]
    InsufficientIdentities { found: usize },

    /// No anchor identity has a matching sample in the remaining set.
    #[error("no anchor identity has a positive candidate among {remaining} remaining samples")]
    NoPositiveCandidates { remaining: usize },
}
