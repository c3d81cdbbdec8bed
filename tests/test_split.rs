use std::collections::BTreeSet;

use securetl::{split_indices, stratified_split, SubjectLabel};

#[test]
fn hundred_samples_at_twenty_percent() {
    let (train, valid) = split_indices(100, 0.2, 42);
    assert_eq!(valid.len(), 20);
    assert_eq!(train.len(), 80);

    let t: BTreeSet<_> = train.iter().copied().collect();
    let v: BTreeSet<_> = valid.iter().copied().collect();
    assert!(t.is_disjoint(&v));
    let all: BTreeSet<_> = t.union(&v).copied().collect();
    assert_eq!(all, (0..100).collect::<BTreeSet<usize>>());
}

#[test]
fn split_is_reproducible() {
    assert_eq!(split_indices(57, 0.3, 5), split_indices(57, 0.3, 5));
    assert_ne!(split_indices(57, 0.3, 5), split_indices(57, 0.3, 6));
}

#[test]
fn valid_size_is_floored() {
    let (_, valid) = split_indices(9, 0.25, 0);
    assert_eq!(valid.len(), 2);
}

#[test]
fn stratified_split_partitions_rows_per_identity() {
    let labels: Vec<SubjectLabel> = (0..50).map(|i| SubjectLabel::anonymous(i % 5)).collect();
    let (train, test) = stratified_split(&labels, 0.2, 11);
    assert_eq!(test.len(), 10);
    assert_eq!(train.len(), 40);
    for id in 0..5 {
        let n_test = test.iter().filter(|&&r| labels[r].subject == id).count();
        assert_eq!(n_test, 2, "identity {id}");
    }
    let t: BTreeSet<_> = train.iter().copied().collect();
    assert!(test.iter().all(|r| !t.contains(r)));
    assert_eq!(stratified_split(&labels, 0.2, 11), (train, test));
}
