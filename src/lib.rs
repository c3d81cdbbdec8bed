//! # securetl — ECG dataset preparation and Secure Triplet Loss training
//!
//! `securetl` turns raw electrocardiogram databases into anchor / positive /
//! negative triplet tensors and trains a biometric encoder on them with the
//! Secure Triplet Loss, which asks for embeddings that are discriminative and
//! also cancelable and non-linkable across keys.
//!
//! Pure Rust: the WFDB and Heartprint readers, the FFT resampler
//! ([RustFFT](https://crates.io/crates/rustfft)), the loss gradients and the
//! reference encoder have no Python, BLAS or C dependency.
//!
//! ## Pipeline overview
//!
//! ```text
//! ECG-ID  {NNN_rec}.hea/.dat/.atr        Heartprint  Session-{s}/{NNN}/*.txt
//!   │                                      │
//!   ├─ wfdb::load_ecg_record()             ├─ heartprint::read_ecg()
//!   └─ extract::EcgIdDatabase              └─ extract::HeartprintDatabase
//!        │                                      │
//!        └──────────── extract_data() ──────────┘   first recording → anchor
//!                          │
//!                          ├─ prepare_for_dnn()     resample to 1000, z-score
//!                          ├─ generate_triplets()   [N, 3, 1000] + labels
//!                          └─ io::save_triplets()   safetensors, atomic
//!                               │
//!                               └─→ train::run_training()
//!                                     keys k1, k2 · Secure Triplet Loss · Adam
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use securetl::{extract_data, generate_triplets, prepare_for_dnn};
//! use securetl::{EcgIdDatabase, SubjectRange, TensorConfig};
//!
//! let db = EcgIdDatabase::new("data/ecgid");
//! let data = extract_data(&db, SubjectRange::new(1, 73)).unwrap();
//!
//! let cfg = TensorConfig::default();
//! let anchors = prepare_for_dnn(&data.x_anchors, &data.y_anchors, &cfg).unwrap();
//! let remaining = prepare_for_dnn(&data.x_remaining, &data.y_remaining, &cfg).unwrap();
//!
//! let triplets = generate_triplets(&anchors, &remaining, 1_000, 42).unwrap();
//! assert_eq!(triplets.signals.dim(), (1_000, 3, 1000));
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod heartprint;
pub mod io;
pub mod label;
pub mod normalize;
pub mod prepare;
pub mod resample;
pub mod split;
pub mod train;
pub mod triplet;
pub mod wfdb;

use anyhow::Result;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::{HeartprintConfig, LengthPolicy, PrepareConfig, SubjectRange, TensorConfig, TrainConfig};

// errors and labels
pub use error::DataError;
pub use label::{SubjectLabel, TripletLabel};

// readers and extraction
pub use extract::{extract_data, EcgIdDatabase, HeartprintDatabase, RecordSource, Recording, SubjectData};
pub use heartprint::read_ecg;
pub use wfdb::{load_ecg_record, read_annotations, read_header, EcgRecord};

// tensors, triplets, persistence
pub use io::{load_triplets, save_triplets, StFile, StWriter};
pub use prepare::{prepare_for_dnn, LabeledTensor};
pub use split::{split_indices, stratified_split};
pub use triplet::{generate_triplets, TripletBatch};

// training
pub use train::{
    run_training, train_secure_triplet_model, BatchLoader, LinearSecureEncoder, LossKind,
    SecureModel, SecureTripletDataset, SecureTripletLoss, TrainReport,
};

/// Train and test triplets produced by one preparation run.
#[derive(Debug, Clone)]
pub struct PreparedTriplets {
    pub train: TripletBatch,
    pub test: TripletBatch,
}

/// Prepare the anchor and remaining tensors of `data` and draw `n` triplets.
pub fn triplets_from_subjects(
    data: &SubjectData,
    tensor: &TensorConfig,
    n: usize,
    seed: u64,
) -> Result<TripletBatch> {
    let anchors = prepare_for_dnn(&data.x_anchors, &data.y_anchors, tensor)?;
    let remaining = prepare_for_dnn(&data.x_remaining, &data.y_remaining, tensor)?;
    tracing::info!(
        anchors = ?anchors.signals.dim(),
        remaining = ?remaining.signals.dim(),
        "tensors prepared"
    );
    generate_triplets(&anchors, &remaining, n, seed)
}

/// Run the **ECG-ID preparation**: extract the train and test subject ranges,
/// prepare tensors, generate triplets and save both sets.
///
/// Train and test subjects are disjoint ranges, so no identity appears in
/// both files. The test set is sampled with `cfg.seed + 1`.
pub fn run_ecgid_preparation(cfg: &PrepareConfig) -> Result<PreparedTriplets> {
    let db = EcgIdDatabase::new(cfg.dataset_root.clone())
        .with_channel(cfg.channel)
        .with_fs(cfg.fs as f64);

    tracing::info!(root = %cfg.dataset_root.display(), "extracting ECG-ID data");
    let train_data = extract_data(&db, cfg.train_subjects)?;
    let test_data = extract_data(&db, cfg.test_subjects)?;
    tracing::info!(
        train_subjects = train_data.n_subjects(),
        test_subjects = test_data.n_subjects(),
        "extraction done"
    );

    tracing::info!("generating triplets");
    let train = triplets_from_subjects(&train_data, &cfg.tensor, cfg.n_train, cfg.seed)?;
    let test = triplets_from_subjects(&test_data, &cfg.tensor, cfg.n_test, cfg.seed.wrapping_add(1))?;

    save_prepared(&train, &cfg.save_train, &test, &cfg.save_test)?;
    Ok(PreparedTriplets { train, test })
}

/// Run the **Heartprint preparation**.
///
/// All recordings of all sessions are pooled, prepared, and split per
/// identity with [`stratified_split`]. Within each side the first row of an
/// identity is its anchor and the rest are positives.
pub fn run_heartprint_preparation(cfg: &HeartprintConfig) -> Result<PreparedTriplets> {
    let db = HeartprintDatabase::new(&cfg.root, cfg.sessions.clone(), cfg.records_per_session);

    tracing::info!(root = %cfg.root.display(), sessions = ?cfg.sessions, "extracting Heartprint data");
    let data = extract_data(&db, cfg.subjects)?;
    let mut signals = data.x_anchors;
    signals.extend(data.x_remaining);
    let mut labels = data.y_anchors;
    labels.extend(data.y_remaining);

    let all = prepare_for_dnn(&signals, &labels, &cfg.tensor)?;
    let (train_rows, test_rows) = stratified_split(&all.labels, cfg.test_fraction, cfg.seed);
    tracing::info!(
        recordings = all.len(),
        train = train_rows.len(),
        test = test_rows.len(),
        "stratified split"
    );

    let draw = |rows: &[usize], n: usize, seed: u64| -> Result<TripletBatch> {
        let (anchors, remaining) = all.select(rows).split_anchors();
        generate_triplets(&anchors, &remaining, n, seed)
    };
    let train = draw(&train_rows, cfg.n_train, cfg.seed)?;
    let test = draw(&test_rows, cfg.n_test, cfg.seed.wrapping_add(1))?;

    save_prepared(&train, &cfg.save_train, &test, &cfg.save_test)?;
    Ok(PreparedTriplets { train, test })
}

fn save_prepared(
    train: &TripletBatch,
    train_path: &std::path::Path,
    test: &TripletBatch,
    test_path: &std::path::Path,
) -> Result<()> {
    save_triplets(train, train_path)?;
    save_triplets(test, test_path)?;
    tracing::info!(
        train = ?train.signals.dim(),
        test = ?test.signals.dim(),
        train_path = %train_path.display(),
        test_path = %test_path.display(),
        "triplets saved"
    );
    Ok(())
}
