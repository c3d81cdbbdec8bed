//! Heartprint plain-text recordings.
//!
//! Layout:
//!
//! ```text
//! {root}/Session-{session}/{subject_id}/*.txt     one sample per line
//! ```
//!
//! Files inside a subject directory are addressed by their index in name
//! order. Asking for an index past the last file, or for a subject directory
//! that does not exist, yields `Ok(None)`: unused subject slots are normal in
//! this database.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::DataError;
use crate::label::SubjectLabel;

/// Directory holding one subject's recordings for one session.
pub fn subject_dir(root: &Path, session: &str, subject: u32) -> PathBuf {
    root.join(format!("Session-{session}")).join(format!("{subject:03}"))
}

/// `*.txt` files of a subject directory, sorted by name. Missing directory →
/// empty list.
pub fn list_records(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "txt") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parse newline-delimited samples. Blank lines are skipped.
pub fn parse_samples(text: &str, path: &Path) -> Result<Vec<f32>> {
    let mut out = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let v = line.parse::<f32>().map_err(|_| DataError::Parse {
            path: path.to_path_buf(),
            line: i + 1,
            text: line.to_string(),
        })?;
        out.push(v);
    }
    Ok(out)
}

/// Read record number `record` of `subject` in `session`.
///
/// Returns the samples and the subject's label, or `None` if the record does
/// not exist.
pub fn read_ecg(
    root: &Path,
    session: &str,
    subject: u32,
    record: usize,
) -> Result<Option<(Vec<f32>, SubjectLabel)>> {
    let files = list_records(&subject_dir(root, session, subject))?;
    let Some(path) = files.get(record) else {
        tracing::trace!(session, subject, record, available = files.len(), "no such record");
        return Ok(None);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let samples = parse_samples(&text, path)?;
    Ok(Some((samples, SubjectLabel::anonymous(subject))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_samples_skipping_blanks() {
        let v = parse_samples("1.5\n\n-2\n 3e-1 \n", Path::new("a.txt")).unwrap();
        assert_eq!(v, vec![1.5, -2.0, 0.3]);
    }

    #[test]
    fn bad_sample_reports_line() {
        let err = parse_samples("1\n2\nx\n", Path::new("a.txt")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::Parse { line: 3, .. })
        ));
    }

    #[test]
    fn subject_dir_is_zero_padded() {
        let d = subject_dir(Path::new("/hp"), "3R", 7);
        assert_eq!(d, PathBuf::from("/hp/Session-3R/007"));
    }
}
