/// Shared fixture writers for integration tests.
use std::path::Path;

use securetl::{LabeledTensor, SubjectLabel};

/// MIT annotation word: 6-bit code, 10-bit field.
pub fn ann_word(code: u16, field: u16) -> [u8; 2] {
    ((code << 10) | field).to_le_bytes()
}

#[allow(unused)]
/// Write `{dir}/{name}.hea/.dat/.atr` with two format-16 signals (raw, filtered)
/// at 500 Hz and gain 200. `demographics` = `None` leaves the comments out.
pub fn write_wfdb_record(
    dir: &Path,
    name: &str,
    demographics: Option<(u32, &str)>,
    raw: &[i16],
    filtered: &[i16],
    peaks: &[usize],
) {
    assert_eq!(raw.len(), filtered.len());
    let n = raw.len();

    let mut hea = format!("{name} 2 500 {n}\n");
    hea.push_str(&format!("{name}.dat 16 200/mV 16 0 {} 0 0 ECG I\n", raw[0]));
    hea.push_str(&format!("{name}.dat 16 200/mV 16 0 {} 0 0 ECG I filtered\n", filtered[0]));
    if let Some((age, sex)) = demographics {
        hea.push_str(&format!("#Age: {age}\n#Sex: {sex}\n#ECG date: 01.01.2000\n"));
    }
    std::fs::write(dir.join(format!("{name}.hea")), hea).unwrap();

    let dat: Vec<u8> = raw
        .iter()
        .zip(filtered)
        .flat_map(|(a, b)| a.to_le_bytes().into_iter().chain(b.to_le_bytes()))
        .collect();
    std::fs::write(dir.join(format!("{name}.dat")), dat).unwrap();

    let mut atr = Vec::new();
    let mut prev = 0;
    for &p in peaks {
        atr.extend(ann_word(1, (p - prev) as u16));
        prev = p;
    }
    atr.extend(ann_word(0, 0));
    std::fs::write(dir.join(format!("{name}.atr")), atr).unwrap();
}

#[allow(unused)]
/// A sine-ish digital trace with a subject-dependent offset.
pub fn digital_trace(n: usize, subject: u32) -> Vec<i16> {
    (0..n)
        .map(|t| ((t as f32 * 0.05).sin() * 400.0) as i16 + subject as i16 * 10)
        .collect()
}

#[allow(unused)]
/// Write one Heartprint text recording.
pub fn write_heartprint(root: &Path, session: &str, subject: u32, file: &str, samples: &[f32]) {
    let dir = root.join(format!("Session-{session}")).join(format!("{subject:03}"));
    std::fs::create_dir_all(&dir).unwrap();
    let text: String = samples.iter().map(|v| format!("{v}\n")).collect();
    std::fs::write(dir.join(file), text).unwrap();
}

#[allow(unused)]
/// `rows` rows of `len` samples; row `i` is filled with `i`.
pub fn tensor(ids: &[u32], len: usize) -> LabeledTensor {
    LabeledTensor {
        signals: ndarray::Array2::from_shape_fn((ids.len(), len), |(r, _)| r as f32),
        labels: ids.iter().map(|&i| SubjectLabel::anonymous(i)).collect(),
    }
}
