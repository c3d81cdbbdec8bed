//! Signal file (`.dat`) decoding.
//!
//! Samples of all signals stored in one file are interleaved frame by frame:
//! `s0[0] s1[0] s0[1] s1[1] …`. Physical values are
//!
//! ```text
//! physical = (digital − baseline) / gain
//! ```
//!
//! Supported storage formats:
//!
//! | format | layout                                             |
//! |--------|----------------------------------------------------|
//! | 16     | little-endian `i16` per sample                     |
//! | 212    | two 12-bit two's-complement samples per 3 bytes    |
//! | 80     | one byte per sample, offset binary (`u8 − 128`)     |
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::Array2;

use super::header::{Header, SignalSpec};
use crate::error::DataError;

/// Decode the raw digital values of a file in the given storage format.
pub fn decode_digital(bytes: &[u8], format: u32, path: &Path) -> Result<Vec<i32>> {
    match format {
        16 => Ok(bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as i32)
            .collect()),
        212 => {
            let mut out = Vec::with_capacity(bytes.len() / 3 * 2 + 1);
            for c in bytes.chunks(3) {
                match *c {
                    [b0, b1, b2] => {
                        out.push(sign_extend_12(b0 as i32 | ((b1 as i32 & 0x0F) << 8)));
                        out.push(sign_extend_12(b2 as i32 | ((b1 as i32 & 0xF0) << 4)));
                    }
                    // A trailing odd sample occupies two bytes.
                    [b0, b1] => {
                        out.push(sign_extend_12(b0 as i32 | ((b1 as i32 & 0x0F) << 8)));
                    }
                    _ => {}
                }
            }
            Ok(out)
        }
        80 => Ok(bytes.iter().map(|&b| b as i32 - 128).collect()),
        other => Err(DataError::UnsupportedFormat {
            path: path.to_path_buf(),
            format: other,
        }
        .into()),
    }
}

#[inline]
fn sign_extend_12(v: i32) -> i32 {
    if v & 0x800 != 0 { v - 0x1000 } else { v }
}

/// Read every signal of a record into a `[n_signals, n_samples]` array of
/// physical values.
///
/// `dir` is the directory holding the record's files. Signals may be spread
/// over several files; each file is decoded once.
pub fn read_signals(dir: &Path, header: &Header) -> Result<Array2<f32>> {
    if header.signals.is_empty() {
        return Ok(Array2::zeros((0, header.n_samples.unwrap_or(0))));
    }

    // Group signal indices by file, keeping first-seen file order.
    let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
    for (i, spec) in header.signals.iter().enumerate() {
        match groups.iter_mut().find(|(f, _)| *f == spec.file_name) {
            Some((_, idx)) => idx.push(i),
            None => groups.push((spec.file_name.as_str(), vec![i])),
        }
    }

    let mut columns: Vec<Option<Vec<f32>>> = vec![None; header.signals.len()];
    let mut n_samples = header.n_samples;

    for (file, idx) in &groups {
        let path = dir.join(file);
        let specs: Vec<&SignalSpec> = idx.iter().map(|&i| &header.signals[i]).collect();
        let format = specs[0].format;
        if let Some(other) = specs.iter().find(|s| s.format != format) {
            return Err(DataError::UnsupportedFormat {
                path: path.clone(),
                format: other.format,
            }
            .into());
        }

        let bytes = std::fs::read(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let digital = decode_digital(&bytes, format, &path)?;

        let n_sig = specs.len();
        let n_frames = digital.len() / n_sig;
        let n = match n_samples {
            Some(n) if n > n_frames => {
                return Err(DataError::Truncated {
                    path,
                    detail: format!("header declares {n} samples, file holds {n_frames}"),
                }
                .into());
            }
            Some(n) => n,
            None => {
                n_samples = Some(n_frames);
                n_frames
            }
        };

        for (k, (&sig, spec)) in idx.iter().zip(&specs).enumerate() {
            let inv_gain = 1.0 / spec.gain;
            let base = spec.baseline as f64;
            let col: Vec<f32> = (0..n)
                .map(|t| ((digital[t * n_sig + k] as f64 - base) * inv_gain) as f32)
                .collect();
            columns[sig] = Some(col);
        }
    }

    let n_t = n_samples.unwrap_or(0);
    let mut out = Array2::<f32>::zeros((header.signals.len(), n_t));
    for (ch, col) in columns.into_iter().enumerate() {
        if let Some(col) = col {
            // Files of one record may differ in length when the header omits
            // n_samples; the shortest defines the record.
            let n = col.len().min(n_t);
            out.row_mut(ch)
                .slice_mut(ndarray::s![..n])
                .assign(&ndarray::ArrayView1::from(&col[..n]));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_16_little_endian() {
        let bytes = [0x01, 0x00, 0xFF, 0xFF, 0x00, 0x80];
        let d = decode_digital(&bytes, 16, Path::new("x.dat")).unwrap();
        assert_eq!(d, vec![1, -1, -32768]);
    }

    #[test]
    fn format_212_packs_two_samples() {
        // s0 = 0x123, s1 = 0xFFF (−1)
        let bytes = [0x23, 0xF1, 0xFF];
        let d = decode_digital(&bytes, 212, Path::new("x.dat")).unwrap();
        assert_eq!(d, vec![0x123, -1]);
    }

    #[test]
    fn format_80_is_offset_binary() {
        let d = decode_digital(&[0, 128, 255], 80, Path::new("x.dat")).unwrap();
        assert_eq!(d, vec![-128, 0, 127]);
    }

    #[test]
    fn unknown_format_rejected() {
        let err = decode_digital(&[0; 4], 310, Path::new("x.dat")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::UnsupportedFormat { format: 310, .. })
        ));
    }
}
