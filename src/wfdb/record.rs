//! One ECG record: signal channel + beat annotations + demographics.
//!
//! ECG-ID headers carry the subject's age and sex as free-text comments:
//!
//! ```text
//! # Age: 25
//! # Sex: male
//! ```
//!
//! Both fields are mandatory. A record without them is rejected instead of
//! being given a default, because the training labels are built from them.
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::annotation::{annotation_samples, read_annotations};
use super::header::parse_header;
use super::signal::read_signals;
use crate::error::DataError;

/// Channel holding the filtered ECG in ECG-ID records.
pub const FILTERED_CHANNEL: usize = 1;

/// Age and sex parsed from a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Demographics {
    pub age: u32,
    pub sex: String,
}

impl Demographics {
    /// Locate the `Age:` and `Sex:` labels in raw header text. Each value runs
    /// from the label to the end of its line.
    pub fn from_header_text(text: &str, path: &Path) -> Result<Self> {
        let age_str = labelled_value(text, "Age:").ok_or_else(|| DataError::MissingField {
            path: path.to_path_buf(),
            field: "Age",
        })?;
        let age = age_str.parse::<u32>().map_err(|_| DataError::InvalidField {
            path: path.to_path_buf(),
            field: "Age",
            value: age_str.to_string(),
        })?;
        let sex = labelled_value(text, "Sex:").ok_or_else(|| DataError::MissingField {
            path: path.to_path_buf(),
            field: "Sex",
        })?;
        if sex.is_empty() {
            return Err(DataError::InvalidField {
                path: path.to_path_buf(),
                field: "Sex",
                value: String::new(),
            }
            .into());
        }
        Ok(Self { age, sex: sex.to_string() })
    }
}

fn labelled_value<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let start = text.find(label)? + label.len();
    let rest = &text[start..];
    let end = rest.find('\n').unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// A loaded ECG record.
#[derive(Debug, Clone)]
pub struct EcgRecord {
    /// Physical values of the selected channel.
    pub signal: Vec<f32>,
    /// Annotated beat (R-peak) sample indices.
    pub r_peaks: Vec<usize>,
    pub age: u32,
    pub sex: String,
    /// Sampling rate declared by the header.
    pub fs: f64,
}

/// `{record_path}.{ext}` without touching dots already in the record name.
pub fn record_file(record_path: &Path, ext: &str) -> PathBuf {
    let mut s: OsString = record_path.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// Load `{record_path}.hea`, its signal file(s) and `{record_path}.atr`.
///
/// `channel` selects the signal row; ECG-ID stores the raw lead at 0 and the
/// filtered lead at [`FILTERED_CHANNEL`].
pub fn load_ecg_record(record_path: &Path, channel: usize) -> Result<EcgRecord> {
    let hea = record_file(record_path, "hea");
    let text = std::fs::read_to_string(&hea)
        .with_context(|| format!("reading {}", hea.display()))?;
    let header = parse_header(&text, &hea)?;

    if channel >= header.n_signals {
        return Err(DataError::InvalidField {
            path: hea,
            field: "channel",
            value: format!("{channel} (record has {} signals)", header.n_signals),
        }
        .into());
    }
    let demographics = Demographics::from_header_text(&text, &hea)?;

    let dir = record_path.parent().unwrap_or_else(|| Path::new("."));
    let data = read_signals(dir, &header)?;
    let signal = data.row(channel).to_vec();

    let annotations = read_annotations(&record_file(record_path, "atr"))?;

    Ok(EcgRecord {
        signal,
        r_peaks: annotation_samples(&annotations),
        age: demographics.age,
        sex: demographics.sex,
        fs: header.fs,
    })
}
