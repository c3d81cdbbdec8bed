//! Subject data extraction.
//!
//! Walks a subject-id range, asks a [`RecordSource`] for each subject's
//! recordings, and splits them into one **anchor** (the first recording) and
//! the **remaining** recordings of the same subject.
//!
//! Subjects with no recordings are skipped without error. Some id slots are
//! unused in the real databases.
use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::config::SubjectRange;
use crate::heartprint;
use crate::label::SubjectLabel;
use crate::wfdb::{load_ecg_record, FILTERED_CHANNEL};

/// One signal capture of one subject.
#[derive(Debug, Clone)]
pub struct Recording {
    pub samples: Vec<f32>,
    /// Annotated event locations, when the format has them.
    pub events: Option<Vec<usize>>,
    pub label: SubjectLabel,
}

/// A dataset that can enumerate a subject's recordings.
pub trait RecordSource {
    /// All recordings of `subject` in a stable order, or `None` when the
    /// subject has no data.
    fn subject_recordings(&self, subject: u32) -> Result<Option<Vec<Recording>>>;
}

/// Output of [`extract_data`]: parallel signal/label lists.
#[derive(Debug, Clone, Default)]
pub struct SubjectData {
    pub x_anchors: Vec<Vec<f32>>,
    pub y_anchors: Vec<SubjectLabel>,
    pub x_remaining: Vec<Vec<f32>>,
    pub y_remaining: Vec<SubjectLabel>,
}

impl SubjectData {
    /// Number of subjects that contributed an anchor.
    pub fn n_subjects(&self) -> usize {
        self.y_anchors.len()
    }
}

/// Extract anchors and remaining recordings for every subject in `subjects`,
/// in ascending id order.
pub fn extract_data<S: RecordSource + ?Sized>(
    source: &S,
    subjects: SubjectRange,
) -> Result<SubjectData> {
    let mut data = SubjectData::default();
    for subject in subjects.iter() {
        let recordings = match source.subject_recordings(subject)? {
            Some(r) if !r.is_empty() => r,
            _ => {
                tracing::debug!(subject, "no recordings, skipping");
                continue;
            }
        };
        let n = recordings.len();
        let mut it = recordings.into_iter();
        if let Some(anchor) = it.next() {
            data.x_anchors.push(anchor.samples);
            data.y_anchors.push(anchor.label);
        }
        for rec in it {
            data.x_remaining.push(rec.samples);
            data.y_remaining.push(rec.label);
        }
        tracing::debug!(subject, recordings = n, "extracted");
    }
    Ok(data)
}

// ── ECG-ID ────────────────────────────────────────────────────────────────

/// ECG-ID database laid out flat: `{root}/{subject:03}_{rest}.hea/.dat/.atr`.
///
/// The root is listed once, on first use, and the header stems are reused for
/// every subject.
#[derive(Debug, Clone)]
pub struct EcgIdDatabase {
    pub root: PathBuf,
    pub channel: usize,
    /// Expected sampling rate; records declaring another rate are rejected.
    pub fs: Option<f64>,
    headers: OnceCell<Vec<PathBuf>>,
}

impl EcgIdDatabase {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            channel: FILTERED_CHANNEL,
            fs: None,
            headers: OnceCell::new(),
        }
    }

    /// Expected sampling rate of every record.
    pub fn with_fs(mut self, fs: f64) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn with_channel(mut self, channel: usize) -> Self {
        self.channel = channel;
        self
    }

    /// Every `.hea` stem under the root, sorted by name.
    fn header_stems(&self) -> Result<&[PathBuf]> {
        if let Some(stems) = self.headers.get() {
            return Ok(stems.as_slice());
        }
        let mut stems = Vec::new();
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("listing {}", self.root.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "hea") {
                stems.push(path.with_extension(""));
            }
        }
        stems.sort();
        tracing::debug!(root = %self.root.display(), records = stems.len(), "listed records");
        Ok(self.headers.get_or_init(|| stems).as_slice())
    }

    /// Record paths (without extension) of `subject`, sorted by name. One
    /// entry per `.hea` file, so the `.dat` / `.atr` companions do not
    /// produce duplicates.
    pub fn record_paths(&self, subject: u32) -> Result<Vec<PathBuf>> {
        let prefix = format!("{subject:03}_");
        Ok(self
            .header_stems()?
            .iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
            })
            .cloned()
            .collect())
    }
}

impl RecordSource for EcgIdDatabase {
    fn subject_recordings(&self, subject: u32) -> Result<Option<Vec<Recording>>> {
        let paths = self.record_paths(subject)?;
        if paths.is_empty() {
            return Ok(None);
        }
        let mut out = Vec::with_capacity(paths.len());
        for path in &paths {
            let rec = load_ecg_record(path, self.channel)?;
            if let Some(fs) = self.fs {
                if (rec.fs - fs).abs() > 1e-6 {
                    bail!("{}: sampled at {} Hz, expected {fs} Hz", path.display(), rec.fs);
                }
            }
            out.push(Recording {
                samples: rec.signal,
                events: Some(rec.r_peaks),
                label: SubjectLabel::with_demographics(subject, rec.age, rec.sex),
            });
        }
        Ok(Some(out))
    }
}

// ── Heartprint ────────────────────────────────────────────────────────────

/// Heartprint database: `{root}/Session-{s}/{subject:03}/*.txt`.
#[derive(Debug, Clone)]
pub struct HeartprintDatabase {
    pub root: PathBuf,
    pub sessions: Vec<String>,
    pub records_per_session: usize,
}

impl HeartprintDatabase {
    pub fn new(root: impl AsRef<Path>, sessions: Vec<String>, records_per_session: usize) -> Self {
        Self { root: root.as_ref().to_path_buf(), sessions, records_per_session }
    }
}

impl RecordSource for HeartprintDatabase {
    fn subject_recordings(&self, subject: u32) -> Result<Option<Vec<Recording>>> {
        let mut out = Vec::new();
        for session in &self.sessions {
            for record in 0..self.records_per_session {
                match heartprint::read_ecg(&self.root, session, subject, record)? {
                    Some((samples, label)) => out.push(Recording { samples, events: None, label }),
                    None => break,
                }
            }
        }
        Ok(if out.is_empty() { None } else { Some(out) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Fixed(HashMap<u32, usize>);

    impl RecordSource for Fixed {
        fn subject_recordings(&self, subject: u32) -> Result<Option<Vec<Recording>>> {
            Ok(self.0.get(&subject).map(|&n| {
                (0..n)
                    .map(|i| Recording {
                        samples: vec![subject as f32, i as f32],
                        events: None,
                        label: SubjectLabel::anonymous(subject),
                    })
                    .collect()
            }))
        }
    }

    #[test]
    fn first_recording_is_anchor() {
        let src = Fixed(HashMap::from([(1, 3), (2, 1)]));
        let d = extract_data(&src, SubjectRange::new(1, 3)).unwrap();
        assert_eq!(d.x_anchors, vec![vec![1.0, 0.0], vec![2.0, 0.0]]);
        assert_eq!(d.x_remaining, vec![vec![1.0, 1.0], vec![1.0, 2.0]]);
        assert_eq!(d.y_remaining.len(), d.x_remaining.len());
    }

    #[test]
    fn empty_and_absent_subjects_skipped() {
        let src = Fixed(HashMap::from([(1, 2), (2, 0), (4, 1)]));
        let d = extract_data(&src, SubjectRange::new(1, 5)).unwrap();
        let ids: Vec<u32> = d.y_anchors.iter().map(|l| l.subject).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(d.n_subjects(), 2);
    }

    #[test]
    fn ecgid_root_listed_once() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["001_rec_2.hea", "001_rec_1.hea", "001_rec_1.dat", "002_rec_1.hea"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let db = EcgIdDatabase::new(dir.path());
        let first = db.record_paths(1).unwrap();
        assert_eq!(first, vec![dir.path().join("001_rec_1"), dir.path().join("001_rec_2")]);

        // Files added after the first lookup are not picked up.
        std::fs::write(dir.path().join("002_rec_2.hea"), b"").unwrap();
        assert_eq!(db.record_paths(2).unwrap(), vec![dir.path().join("002_rec_1")]);
        assert!(db.record_paths(3).unwrap().is_empty());
    }
}
