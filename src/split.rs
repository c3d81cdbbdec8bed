//! Index splitting.
//!
//! `split_indices`   — shuffled train/validation partition of `0..n`
//! `stratified_split` — per-identity train/test partition of labelled rows
//!
//! Both are pure functions of their inputs and seed.
use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::label::SubjectLabel;

/// Shuffle `0..n` with `seed` and hold out the first `floor(valid_fraction · n)`
/// indices for validation. Returns `(train, valid)`.
///
/// The two sets are disjoint and together cover `0..n` exactly once.
pub fn split_indices(n: usize, valid_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let split = ((valid_fraction.clamp(0.0, 1.0) * n as f64).floor() as usize).min(n);
    let train = indices.split_off(split);
    tracing::debug!(train = train.len(), valid = indices.len(), "index split");
    (train, indices)
}

/// Split rows so each identity contributes `round(test_fraction · count)` of its
/// rows to the test set, keeping at least one row on the train side when the
/// identity has two or more rows.
///
/// Returns `(train_rows, test_rows)`, each sorted ascending.
pub fn stratified_split(
    labels: &[SubjectLabel],
    test_fraction: f64,
    seed: u64,
) -> (Vec<usize>, Vec<usize>) {
    let mut by_identity: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (i, l) in labels.iter().enumerate() {
        by_identity.entry(l.identity()).or_default().push(i);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let frac = test_fraction.clamp(0.0, 1.0);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for rows in by_identity.values_mut() {
        rows.shuffle(&mut rng);
        let mut n_test = (frac * rows.len() as f64).round() as usize;
        if rows.len() > 1 {
            n_test = n_test.min(rows.len() - 1);
        }
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        let (t, v) = split_indices(0, 0.2, 42);
        assert!(t.is_empty() && v.is_empty());
    }

    #[test]
    fn zero_fraction_keeps_everything_for_training() {
        let (t, v) = split_indices(10, 0.0, 1);
        assert_eq!(t.len(), 10);
        assert!(v.is_empty());
    }

    #[test]
    fn stratified_keeps_every_identity_in_train() {
        let labels: Vec<SubjectLabel> = [1, 1, 1, 1, 1, 2, 2, 3]
            .iter()
            .map(|&i| SubjectLabel::anonymous(i))
            .collect();
        let (train, test) = stratified_split(&labels, 0.2, 3);
        assert_eq!(train.len() + test.len(), labels.len());
        for id in [1, 2, 3] {
            assert!(train.iter().any(|&r| labels[r].subject == id), "identity {id}");
        }
        // 5 rows × 0.2 = 1; 2 rows × 0.2 rounds to 0; single row stays.
        assert_eq!(test.len(), 1);
    }
}
