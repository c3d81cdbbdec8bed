//! WFDB header (`.hea`) parser.
//!
//! ```text
//! # comment lines may appear anywhere
//! rec_1 2 500 10000                                   ← record line
//! rec_1.dat 16 200 12 0 -81 -26920 0 ECG I            ← one line per signal
//! rec_1.dat 16 200(0)/mV 12 0 -74 -1398 0 ECG I filtered
//! # Age: 25
//! # Sex: male
//! ```
//!
//! Record line: `name[/segments] n_signals [fs[/counter[(base)]] [n_samples …]]`.
//! Signal line: `file format[x…][:…][+…] [gain[(baseline)][/units] [adc_res
//! [adc_zero [init_value [checksum [block_size [description…]]]]]]]`.
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::DataError;

/// WFDB default sampling frequency when the record line omits it.
pub const DEFAULT_FS: f64 = 250.0;
/// WFDB default gain (ADC units per physical unit) when the header says `0`.
pub const DEFAULT_GAIN: f64 = 200.0;

/// One signal line of a header.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    pub file_name: String,
    /// Storage format number (`16`, `212`, `80`, …).
    pub format: u32,
    /// ADC units per physical unit. Never zero after parsing.
    pub gain: f64,
    /// Digital value that maps to physical zero.
    pub baseline: i32,
    pub units: Option<String>,
    pub adc_res: u32,
    pub adc_zero: i32,
    pub init_value: i32,
    pub checksum: i32,
    pub block_size: u32,
    pub description: String,
}

/// A parsed `.hea` file.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub record_name: String,
    pub n_signals: usize,
    pub fs: f64,
    /// Samples per signal, if declared.
    pub n_samples: Option<usize>,
    pub signals: Vec<SignalSpec>,
    /// `#` comment lines with the marker and leading blanks stripped.
    pub comments: Vec<String>,
}

/// Read and parse `{record}.hea`.
pub fn read_header(path: &Path) -> Result<Header> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse_header(&text, path)
}

/// Parse header text. `path` is used for error messages only.
pub fn parse_header(text: &str, path: &Path) -> Result<Header> {
    let mut comments = Vec::new();
    let mut lines = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if let Some(c) = line.strip_prefix('#') {
            comments.push(c.trim_start().to_string());
        } else if !line.is_empty() {
            lines.push(line);
        }
    }

    let mut lines = lines.into_iter();
    let record_line = lines.next().ok_or_else(|| DataError::MissingField {
        path: path.to_path_buf(),
        field: "record line",
    })?;
    let mut fields = record_line.split_whitespace();

    let record_name = fields
        .next()
        .unwrap_or_default()
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string();

    let n_signals_tok = fields.next().ok_or_else(|| DataError::MissingField {
        path: path.to_path_buf(),
        field: "n_signals",
    })?;
    let n_signals: usize = parse_field(n_signals_tok, "n_signals", path)?;

    let fs = match fields.next() {
        Some(tok) => {
            let head = tok.split(['/', '(']).next().unwrap_or_default();
            let fs: f64 = parse_field(head, "fs", path)?;
            if fs > 0.0 { fs } else { DEFAULT_FS }
        }
        None => DEFAULT_FS,
    };

    let n_samples = fields
        .next()
        .map(|tok| parse_field::<usize>(tok, "n_samples", path))
        .transpose()?;

    let mut signals = Vec::with_capacity(n_signals);
    for i in 0..n_signals {
        let line = lines.next().ok_or_else(|| DataError::Truncated {
            path: path.to_path_buf(),
            detail: format!("expected {n_signals} signal lines, found {i}"),
        })?;
        signals.push(parse_signal_line(line, path)?);
    }

    Ok(Header { record_name, n_signals, fs, n_samples, signals, comments })
}

fn parse_signal_line(line: &str, path: &Path) -> Result<SignalSpec> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(DataError::MissingField {
            path: path.to_path_buf(),
            field: "signal format",
        }
        .into());
    }
    let file_name = tokens[0].to_string();

    // `16`, `16x2`, `212:3`, `16+512` → leading digits only.
    let fmt_digits: String = tokens[1].chars().take_while(char::is_ascii_digit).collect();
    let format: u32 = parse_field(&fmt_digits, "format", path)?;

    let adc_zero: i32 = tokens
        .get(4)
        .map(|t| parse_field(t, "adc_zero", path))
        .transpose()?
        .unwrap_or(0);

    let (gain, baseline, units) = match tokens.get(2) {
        Some(tok) => parse_gain(tok, adc_zero, path)?,
        None => (DEFAULT_GAIN, adc_zero, None),
    };

    let adc_res = opt_field(&tokens, 3, "adc_res", path)?.unwrap_or(0);
    let init_value = opt_field(&tokens, 5, "init_value", path)?.unwrap_or(adc_zero);
    let checksum = opt_field(&tokens, 6, "checksum", path)?.unwrap_or(0);
    let block_size = opt_field(&tokens, 7, "block_size", path)?.unwrap_or(0);
    let description = tokens.get(8..).map(|t| t.join(" ")).unwrap_or_default();

    Ok(SignalSpec {
        file_name,
        format,
        gain,
        baseline,
        units,
        adc_res,
        adc_zero,
        init_value,
        checksum,
        block_size,
        description,
    })
}

/// `200`, `200/mV`, `200(0)`, `200(-12)/mV`.
fn parse_gain(tok: &str, adc_zero: i32, path: &Path) -> Result<(f64, i32, Option<String>)> {
    let (head, units) = match tok.split_once('/') {
        Some((h, u)) => (h, Some(u.to_string())),
        None => (tok, None),
    };
    let (gain_str, baseline) = match head.split_once('(') {
        Some((g, rest)) => {
            let b = rest.trim_end_matches(')');
            (g, parse_field::<i32>(b, "baseline", path)?)
        }
        None => (head, adc_zero),
    };
    let gain: f64 = parse_field(gain_str, "gain", path)?;
    let gain = if gain == 0.0 { DEFAULT_GAIN } else { gain };
    Ok((gain, baseline, units))
}

fn opt_field<T: std::str::FromStr>(
    tokens: &[&str],
    idx: usize,
    field: &'static str,
    path: &Path,
) -> Result<Option<T>> {
    tokens.get(idx).map(|t| parse_field(t, field, path)).transpose()
}

fn parse_field<T: std::str::FromStr>(tok: &str, field: &'static str, path: &Path) -> Result<T> {
    tok.parse::<T>().map_err(|_| {
        DataError::InvalidField {
            path: path.to_path_buf(),
            field,
            value: tok.to_string(),
        }
        .into()
    })
}
