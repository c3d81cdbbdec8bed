//! WFDB (PhysioNet) record reader.
//!
//! Reads the `.hea` / `.dat` / `.atr` triple used by the ECG-ID database.
//!
//! # Quick start
//! ```no_run
//! use securetl::wfdb::{load_ecg_record, FILTERED_CHANNEL};
//! use std::path::Path;
//!
//! let rec = load_ecg_record(Path::new("data/ecgid/001_rec_1"), FILTERED_CHANNEL).unwrap();
//! println!("{} samples @ {} Hz, {} beats", rec.signal.len(), rec.fs, rec.r_peaks.len());
//! ```
pub mod annotation;
pub mod header;
pub mod record;
pub mod signal;

pub use annotation::{annotation_samples, parse_annotations, read_annotations, Annotation};
pub use header::{parse_header, read_header, Header, SignalSpec};
pub use record::{load_ecg_record, record_file, Demographics, EcgRecord, FILTERED_CHANNEL};
pub use signal::{decode_digital, read_signals};
