//! FFT resampling to a fixed length.
//!
//! ```text
//! x ──reflect pad──▶ [pad_l | x | pad_r]      n_old = n + pad_l + pad_r
//!   ──FFT──▶ half spectrum, cut or zero-extended to n_new = round(ratio · n_old)
//!   ──inverse FFT──▶ drop round(ratio · pad_l) leading samples, keep round(ratio · n)
//! ```
//!
//! The Nyquist bin shared by both lengths is doubled when shrinking and halved
//! when growing, so a constant signal stays constant.
use anyhow::{bail, Result};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Padding on each side: enough to reach the next power of two above
/// `n + 2·min(n/8, 100)`.
pub fn auto_npad(n: usize) -> (usize, usize) {
    let min_add = (n / 8).min(100) * 2;
    let target = (n + min_add).next_power_of_two();
    let total = target - n;
    (total / 2, total - total / 2)
}

/// Resample a 1-D signal to exactly `length` samples.
///
/// The last sample is trimmed or repeated when rounding leaves the result one
/// sample off.
pub fn resample_to_length(x: &[f32], length: usize) -> Result<Vec<f32>> {
    if x.is_empty() {
        bail!("cannot resample an empty signal");
    }
    if x.len() == length {
        return Ok(x.to_vec());
    }
    let ratio = length as f64 / x.len() as f64;
    let (npad_l, npad_r) = auto_npad(x.len());
    let mut out = resample_1d(x, ratio, npad_l, npad_r)?;
    let last = out.last().copied().unwrap_or(0.0);
    out.resize(length, last);
    Ok(out)
}

/// Resample `x` by `ratio` with reflect padding of `npad_l` / `npad_r`
/// samples (each capped at `x.len() − 1`). Output length is
/// `round(ratio · x.len())`.
pub fn resample_1d(x: &[f32], ratio: f64, npad_l: usize, npad_r: usize) -> Result<Vec<f32>> {
    let n = x.len();
    if n == 0 {
        return Ok(vec![]);
    }
    let out_len = (ratio * n as f64).round() as usize;
    let pad_l = npad_l.min(n - 1);
    let padded = reflect_pad(x, pad_l, npad_r.min(n - 1));
    let n_old = padded.len();
    let n_new = (ratio * n_old as f64).round() as usize;
    if n_new == 0 {
        bail!("resampling ratio {ratio} leaves no samples");
    }

    let mut planner = FftPlanner::<f64>::new();
    let mut spec: Vec<Complex<f64>> = padded.iter().map(|&v| Complex::new(v as f64, 0.0)).collect();
    planner.plan_fft_forward(n_old).process(&mut spec);

    let half_new = n_new / 2 + 1;
    let keep = (n_old / 2 + 1).min(half_new);
    let mut full = vec![Complex::<f64>::default(); n_new];
    full[..keep].copy_from_slice(&spec[..keep]);

    let shared = n_new.min(n_old);
    if shared % 2 == 0 {
        full[shared / 2] *= if n_new < n_old { 2.0 } else { 0.5 };
    }
    for k in 1..half_new {
        let m = n_new - k;
        if m >= half_new {
            full[m] = full[k].conj();
        }
    }
    planner.plan_fft_inverse(n_new).process(&mut full);

    // Spectrum scale n_new / n_old times the 1 / n_new of the inverse FFT.
    let scale = 1.0 / n_old as f64;
    let skip = ((ratio * pad_l as f64).round() as usize).min(n_new);
    let mut out: Vec<f32> = full[skip..]
        .iter()
        .take(out_len)
        .map(|c| (c.re * scale) as f32)
        .collect();
    out.resize(out_len, 0.0);
    Ok(out)
}

fn reflect_pad(x: &[f32], left: usize, right: usize) -> Vec<f32> {
    let n = x.len();
    let (first, last) = (x[0], x[n - 1]);
    let mut out = Vec::with_capacity(n + left + right);
    out.extend((1..=left).rev().map(|i| 2.0 * first - x[i]));
    out.extend_from_slice(x);
    out.extend((1..=right).map(|i| 2.0 * last - x[n - 1 - i]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_length_is_identity() {
        let x: Vec<f32> = (0..500).map(|t| (t as f32 * 0.03).sin()).collect();
        assert_eq!(resample_to_length(&x, 500).unwrap(), x);
    }

    #[test]
    fn exact_output_lengths() {
        for (n_in, n_out) in [(500, 1000), (700, 1000), (10000, 1000), (999, 1000), (3, 7)] {
            let x = vec![0.0_f32; n_in];
            assert_eq!(resample_to_length(&x, n_out).unwrap().len(), n_out, "{n_in} -> {n_out}");
        }
    }

    #[test]
    fn preserves_dc() {
        let x = vec![3.14_f32; 1024];
        for &v in resample_to_length(&x, 512).unwrap().iter() {
            approx::assert_abs_diff_eq!(v, 3.14, epsilon = 1e-2);
        }
    }

    #[test]
    fn sine_survives_upsampling() {
        let x: Vec<f32> = (0..500).map(|t| (t as f32 * 0.02).sin()).collect();
        let y = resample_to_length(&x, 1000).unwrap();
        for (t, v) in y.iter().enumerate().skip(50).take(900) {
            approx::assert_abs_diff_eq!(*v, (t as f32 * 0.01).sin(), epsilon = 2e-2);
        }
    }

    #[test]
    fn single_sample_is_held() {
        for v in resample_to_length(&[2.5], 4).unwrap() {
            approx::assert_abs_diff_eq!(v, 2.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn empty_signal_rejected() {
        assert!(resample_to_length(&[], 100).is_err());
    }

    #[test]
    fn auto_npad_correct() {
        // 500 Hz, 20 s = 10000 samples → next pow2 of 10200 is 16384
        assert_eq!(auto_npad(10000), (3192, 3192));
        assert_eq!(auto_npad(15360), (512, 512));
    }
}
