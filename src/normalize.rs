//! Z-score normalisation.
//!
//! `zscore_inplace`      — one signal: `x = (x − μ) / σ`, σ with ddof = 0.
//! `zscore_rows_inplace` — the same, independently for every row of `[R, T]`.
//!
//! Signals with σ = 0 are left untouched.
use ndarray::Array2;

/// Z-score a single signal in place. Returns the (mean, std) used.
pub fn zscore_inplace(x: &mut [f32]) -> (f32, f32) {
    if x.is_empty() {
        return (0.0, 0.0);
    }
    let n = x.len() as f64;
    let mean = x.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = x.iter().map(|&v| {
        let d = v as f64 - mean; d * d
    }).sum::<f64>() / n;
    let std = var.sqrt() as f32;
    let mean = mean as f32;

    if std > 0.0 {
        x.iter_mut().for_each(|v| *v = (*v - mean) / std);
    }
    (mean, std)
}

/// Z-score every row of `data` independently.
pub fn zscore_rows_inplace(data: &mut Array2<f32>) {
    for mut row in data.rows_mut() {
        match row.as_slice_mut() {
            Some(s) => {
                zscore_inplace(s);
            }
            None => {
                let mut v = row.to_vec();
                zscore_inplace(&mut v);
                row.assign(&ndarray::ArrayView1::from(&v));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zscore_mean_zero_std_one() {
        let mut x: Vec<f32> = (0..512).map(|t| (t as f32 * 0.1).sin() * 50.0 + 3.0).collect();
        let (mean, std) = zscore_inplace(&mut x);

        let out_mean = x.iter().map(|&v| v as f64).sum::<f64>() / x.len() as f64;
        let out_std = (x.iter().map(|&v| {
            let d = v as f64 - out_mean; d * d
        }).sum::<f64>() / x.len() as f64).sqrt();

        approx::assert_abs_diff_eq!(out_mean as f32, 0.0, epsilon = 1e-5_f32);
        approx::assert_abs_diff_eq!(out_std as f32, 1.0, epsilon = 1e-4_f32);
        assert!(std > 0.0);
        approx::assert_abs_diff_eq!(mean, 3.0, epsilon = 1.0_f32);
    }

    #[test]
    fn constant_signal_no_panic() {
        let mut x = vec![7.0_f32; 128];
        let (_m, s) = zscore_inplace(&mut x);
        assert_eq!(s, 0.0);
        assert!(x.iter().all(|&v| v == 7.0));
    }

    #[test]
    fn rows_are_independent() {
        let mut data = Array2::from_shape_fn((3, 256), |(r, t)| {
            (r as f32 + 1.0) * 10.0 + (t as f32 * 0.2).cos() * (r as f32 + 1.0)
        });
        zscore_rows_inplace(&mut data);
        for row in data.rows() {
            approx::assert_abs_diff_eq!(row.mean().unwrap(), 0.0, epsilon = 1e-4_f32);
        }
    }
}
