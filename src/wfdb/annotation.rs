//! MIT-format annotation (`.atr`) reader.
//!
//! The file is a stream of little-endian 16-bit words. Each word holds a
//! 6-bit code `A` (high bits) and a 10-bit field `I` (low bits):
//!
//! ```text
//! A = 0,  I = 0   end of file
//! A = 59  (SKIP)  next two words hold a 32-bit interval, high word first
//! A = 60  (NUM)   annotator number, no time advance
//! A = 61  (SUB)   subtype, no time advance
//! A = 62  (CHN)   channel, no time advance
//! A = 63  (AUX)   I bytes of auxiliary text follow, padded to even length
//! otherwise       annotation of type A at `previous sample + I`
//! ```
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::DataError;

const SKIP: u16 = 59;
const NUM: u16 = 60;
const SUB: u16 = 61;
const CHN: u16 = 62;
const AUX: u16 = 63;

/// One labelled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Annotation {
    /// Absolute sample index.
    pub sample: usize,
    /// MIT annotation code (1 = normal beat).
    pub code: u8,
}

/// Read `{record}.{extension}` (usually `atr`).
pub fn read_annotations(path: &Path) -> Result<Vec<Annotation>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse_annotations(&bytes, path)
}

/// Decode an annotation byte stream. `path` is used for error messages only.
pub fn parse_annotations(bytes: &[u8], path: &Path) -> Result<Vec<Annotation>> {
    let words: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect();

    let truncated = |at: usize| DataError::Truncated {
        path: path.to_path_buf(),
        detail: format!("annotation stream ends inside the record at word {at}"),
    };

    let mut out = Vec::new();
    let mut sample: i64 = 0;
    let mut i = 0;
    while i < words.len() {
        let w = words[i];
        let code = w >> 10;
        let field = w & 0x03FF;
        i += 1;

        match code {
            0 if field == 0 => break,
            SKIP => {
                if i + 2 > words.len() {
                    return Err(truncated(i).into());
                }
                let interval = ((words[i] as u32) << 16 | words[i + 1] as u32) as i32;
                sample += interval as i64;
                i += 2;
            }
            NUM | SUB | CHN => {}
            AUX => {
                let n_words = (field as usize).div_ceil(2);
                if i + n_words > words.len() {
                    return Err(truncated(i).into());
                }
                i += n_words;
            }
            _ => {
                sample += field as i64;
                let at = usize::try_from(sample).map_err(|_| DataError::InvalidField {
                    path: path.to_path_buf(),
                    field: "annotation time",
                    value: sample.to_string(),
                })?;
                out.push(Annotation { sample: at, code: code as u8 });
            }
        }
    }
    Ok(out)
}

/// Sample indices of every annotation, in file order.
pub fn annotation_samples(annotations: &[Annotation]) -> Vec<usize> {
    annotations.iter().map(|a| a.sample).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(code: u16, field: u16) -> [u8; 2] {
        ((code << 10) | field).to_le_bytes()
    }

    #[test]
    fn decodes_beats_with_aux_and_skip() {
        let mut bytes = Vec::new();
        // AUX with 3 bytes of text → 2 words of payload.
        bytes.extend(word(AUX, 3));
        bytes.extend(b"abc\0");
        bytes.extend(word(1, 100)); // N at 100
        bytes.extend(word(SKIP, 0));
        bytes.extend(0u16.to_le_bytes()); // high word
        bytes.extend(2000u16.to_le_bytes()); // low word
        bytes.extend(word(1, 50)); // N at 100 + 2000 + 50
        bytes.extend(word(SUB, 2));
        bytes.extend(word(5, 10)); // V at 2160
        bytes.extend(word(0, 0));
        bytes.extend(word(1, 1)); // after EOF: ignored

        let anns = parse_annotations(&bytes, Path::new("r.atr")).unwrap();
        assert_eq!(annotation_samples(&anns), vec![100, 2150, 2160]);
        assert_eq!(anns[2].code, 5);
    }

    #[test]
    fn truncated_skip_is_an_error() {
        let mut bytes = Vec::new();
        bytes.extend(word(SKIP, 0));
        bytes.extend(0u16.to_le_bytes());
        assert!(parse_annotations(&bytes, Path::new("r.atr")).is_err());
    }

    #[test]
    fn empty_stream_has_no_annotations() {
        assert!(parse_annotations(&[], Path::new("r.atr")).unwrap().is_empty());
    }
}
