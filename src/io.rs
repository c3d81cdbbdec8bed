//! Safetensors I/O.
//!
//! Triplet files and model checkpoints are plain safetensors containers:
//!
//! ```text
//! u64 LE  header length n
//! n bytes JSON header   { name: { dtype, shape, data_offsets: [s, e] }, … }
//! …       tensor bytes  little-endian, row-major
//! ```
//!
//! Triplet file keys:
//!
//! | key               | dtype | shape       |                                 |
//! |-------------------|-------|-------------|---------------------------------|
//! | `signals`         | F32   | `[N, 3, L]` | anchor / positive / negative    |
//! | `anchor_labels`   | U8    | `[bytes]`   | newline-joined label text       |
//! | `negative_labels` | U8    | `[bytes]`   | newline-joined label text       |
//! | `n_triplets`      | I32   | `[1]`       |                                 |
//!
//! Writes go to `{path}.tmp` first and are renamed into place, so a reader
//! never sees a half-written file.
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ndarray::{Array, Array2, Array3, Dimension};
use serde::{Deserialize, Serialize};

use crate::error::DataError;
use crate::label::{SubjectLabel, TripletLabel};
use crate::triplet::TripletBatch;

/// Element types that can live in a safetensors file.
pub trait StElement: Copy {
    const DTYPE: &'static str;
    const SIZE: usize;
    fn put_le(self, out: &mut Vec<u8>);
    fn get_le(bytes: &[u8]) -> Self;
}

impl StElement for f32 {
    const DTYPE: &'static str = "F32";
    const SIZE: usize = 4;
    fn put_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
    fn get_le(b: &[u8]) -> Self {
        f32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }
}

impl StElement for f64 {
    const DTYPE: &'static str = "F64";
    const SIZE: usize = 8;
    fn put_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
    fn get_le(b: &[u8]) -> Self {
        let mut a = [0u8; 8];
        a.copy_from_slice(&b[..8]);
        f64::from_le_bytes(a)
    }
}

impl StElement for i32 {
    const DTYPE: &'static str = "I32";
    const SIZE: usize = 4;
    fn put_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
    fn get_le(b: &[u8]) -> Self {
        i32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }
}

impl StElement for u8 {
    const DTYPE: &'static str = "U8";
    const SIZE: usize = 1;
    fn put_le(self, out: &mut Vec<u8>) {
        out.push(self);
    }
    fn get_le(b: &[u8]) -> Self {
        b[0]
    }
}

/// One header entry, as stored in the JSON header.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

// ── Reader ────────────────────────────────────────────────────────────────

/// A safetensors file loaded into memory.
pub struct StFile {
    path: PathBuf,
    bytes: Vec<u8>,
    data_start: usize,
    entries: HashMap<String, Entry>,
}

impl StFile {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_bytes(bytes, path)
    }

    /// Parse an in-memory file. `path` is used for error messages only.
    pub fn from_bytes(bytes: Vec<u8>, path: &Path) -> Result<Self> {
        let Some(len) = bytes.get(..8) else {
            bail!("{}: safetensors file too small", path.display());
        };
        let n = u64::from_le_bytes(len.try_into()?) as usize;
        let data_start = 8usize.saturating_add(n);
        if bytes.len() < data_start {
            bail!("{}: header length {n} exceeds file size", path.display());
        }
        let raw: HashMap<String, serde_json::Value> = serde_json::from_slice(&bytes[8..data_start])
            .with_context(|| format!("{}: failed to parse safetensors header", path.display()))?;

        let mut entries = HashMap::new();
        for (name, v) in raw {
            if name == "__metadata__" {
                continue;
            }
            let e: Entry = serde_json::from_value(v)
                .with_context(|| format!("{}: malformed header entry {name:?}", path.display()))?;
            let [start, end] = e.data_offsets;
            let in_file = data_start.checked_add(end).is_some_and(|stop| stop <= bytes.len());
            if end < start || !in_file {
                bail!("{}: tensor {name:?} has bad offsets {start}..{end}", path.display());
            }
            entries.insert(name, e);
        }
        Ok(Self { path: path.to_path_buf(), bytes, data_start, entries })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn shape(&self, name: &str) -> Result<&[usize]> {
        Ok(&self.entry(name)?.shape)
    }

    fn entry(&self, name: &str) -> Result<&Entry> {
        self.entries
            .get(name)
            .with_context(|| format!("{}: missing {name:?} key", self.path.display()))
    }

    /// Raw bytes of `name`, checked against the expected dtype.
    fn raw<T: StElement>(&self, name: &str) -> Result<&[u8]> {
        let e = self.entry(name)?;
        if e.dtype != T::DTYPE {
            bail!("{}: {name:?} is {}, expected {}", self.path.display(), e.dtype, T::DTYPE);
        }
        let [start, end] = e.data_offsets;
        Ok(&self.bytes[self.data_start + start..self.data_start + end])
    }

    /// Flat data of `name`.
    pub fn get<T: StElement>(&self, name: &str) -> Result<Vec<T>> {
        Ok(self.raw::<T>(name)?.chunks_exact(T::SIZE).map(T::get_le).collect())
    }

    pub fn f32(&self, name: &str) -> Result<Vec<f32>> {
        self.get(name)
    }

    pub fn i32(&self, name: &str) -> Result<Vec<i32>> {
        self.get(name)
    }

    pub fn u8(&self, name: &str) -> Result<&[u8]> {
        self.raw::<u8>(name)
    }

    fn ranked<const R: usize>(&self, name: &str) -> Result<[usize; R]> {
        let shape = self.shape(name)?;
        shape.try_into().map_err(|_| {
            anyhow::anyhow!("{}: {name:?} has rank {}, expected {R}", self.path.display(), shape.len())
        })
    }

    pub fn f32_arr2(&self, name: &str) -> Result<Array2<f32>> {
        let [r, c] = self.ranked::<2>(name)?;
        Ok(Array2::from_shape_vec((r, c), self.f32(name)?)?)
    }

    pub fn f32_arr3(&self, name: &str) -> Result<Array3<f32>> {
        let [a, b, c] = self.ranked::<3>(name)?;
        Ok(Array3::from_shape_vec((a, b, c), self.f32(name)?)?)
    }

    /// Newline-joined UTF-8 strings stored as a U8 tensor.
    pub fn strings(&self, name: &str) -> Result<Vec<String>> {
        let raw = std::str::from_utf8(self.u8(name)?)
            .with_context(|| format!("{}: {name:?} is not UTF-8", self.path.display()))?;
        Ok(raw.split('\n').filter(|s| !s.is_empty()).map(String::from).collect())
    }
}

// ── Writer ────────────────────────────────────────────────────────────────

struct Tensor {
    name: String,
    dtype: &'static str,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

/// Safetensors writer. Tensors are laid out in insertion order.
///
/// ```rust,no_run
/// use securetl::io::StWriter;
/// use ndarray::Array2;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_array("w", &Array2::<f32>::zeros((2, 3)));
/// w.add_strings("labels", &["001_25_male".to_string()]);
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    tensors: Vec<Tensor>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<T: StElement>(&mut self, name: &str, data: &[T], shape: &[usize]) {
        let mut bytes = Vec::with_capacity(data.len() * T::SIZE);
        for &v in data {
            v.put_le(&mut bytes);
        }
        self.tensors.push(Tensor {
            name: name.to_string(),
            dtype: T::DTYPE,
            shape: shape.to_vec(),
            bytes,
        });
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        self.add(name, data, shape);
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        self.add(name, data, shape);
    }

    /// Any-rank array, stored row-major.
    pub fn add_array<T: StElement, D: Dimension>(&mut self, name: &str, arr: &Array<T, D>) {
        let data: Vec<T> = arr.iter().copied().collect();
        self.add(name, &data, arr.shape());
    }

    pub fn add_strings(&mut self, name: &str, items: &[String]) {
        let bytes = items.join("\n").into_bytes();
        self.add(name, &bytes, &[bytes.len()]);
    }

    /// Serialise header and data. The header is space-padded to a multiple
    /// of 8 bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header = BTreeMap::new();
        let mut offset = 0;
        for t in &self.tensors {
            let end = offset + t.bytes.len();
            header.insert(
                t.name.as_str(),
                Entry { dtype: t.dtype.to_string(), shape: t.shape.clone(), data_offsets: [offset, end] },
            );
            offset = end;
        }
        let mut json = serde_json::to_vec(&header)?;
        json.resize(json.len().next_multiple_of(8), b' ');

        let mut out = Vec::with_capacity(8 + json.len() + offset);
        out.extend_from_slice(&(json.len() as u64).to_le_bytes());
        out.extend_from_slice(&json);
        for t in &self.tensors {
            out.extend_from_slice(&t.bytes);
        }
        Ok(out)
    }

    /// Write to `{path}.tmp`, then rename over `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let bytes = self.to_bytes()?;
        let tmp = tmp_path(path);
        {
            let mut f = std::fs::File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp, path)
            .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".tmp");
    PathBuf::from(s)
}

// ── Triplet files ─────────────────────────────────────────────────────────

/// Persist a triplet batch in one atomic write.
pub fn save_triplets(batch: &TripletBatch, path: &Path) -> Result<()> {
    batch.check_aligned()?;
    let partial = batch
        .labels
        .iter()
        .flat_map(|l| [&l.anchor, &l.negative])
        .find(|l| !l.is_representable());
    if let Some(l) = partial {
        return Err(DataError::InvalidField {
            path: path.to_path_buf(),
            field: "label",
            value: format!("{l:?} (age and sex must be set together)"),
        }
        .into());
    }
    let anchors: Vec<String> = batch.labels.iter().map(|l| l.anchor.to_string()).collect();
    let negatives: Vec<String> = batch.labels.iter().map(|l| l.negative.to_string()).collect();

    let mut w = StWriter::new();
    w.add_array("signals", &batch.signals);
    w.add_strings("anchor_labels", &anchors);
    w.add_strings("negative_labels", &negatives);
    w.add_i32("n_triplets", &[batch.len() as i32], &[1]);
    w.write(path)
}

/// Load a batch written by [`save_triplets`].
pub fn load_triplets(path: &Path) -> Result<TripletBatch> {
    let st = StFile::open(path)?;
    let signals = st.f32_arr3("signals")?;
    let parse = |key: &str| -> Result<Vec<SubjectLabel>> {
        st.strings(key)?
            .iter()
            .map(|s| s.parse::<SubjectLabel>())
            .collect()
    };
    let anchors = parse("anchor_labels")?;
    let negatives = parse("negative_labels")?;
    if anchors.len() != negatives.len() {
        bail!(
            "{}: {} anchor labels but {} negative labels",
            path.display(),
            anchors.len(),
            negatives.len()
        );
    }
    let n = st.i32("n_triplets")?.first().copied().unwrap_or(-1);
    if n < 0 || n as usize != anchors.len() {
        bail!("{}: n_triplets = {n}, found {} labels", path.display(), anchors.len());
    }

    let labels = anchors
        .into_iter()
        .zip(negatives)
        .map(|(anchor, negative)| TripletLabel { anchor, negative })
        .collect();
    let batch = TripletBatch { signals, labels };
    batch.check_aligned()?;
    Ok(batch)
}
