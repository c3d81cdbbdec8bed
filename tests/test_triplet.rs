use ndarray::Array2;
use securetl::{generate_triplets, DataError, LabeledTensor, SubjectLabel};

/// Every sample of a row equals `identity * 100 + row`, so a row's identity
/// can be read back from its values.
fn tensor(ids: &[u32], len: usize) -> LabeledTensor {
    LabeledTensor {
        signals: Array2::from_shape_fn((ids.len(), len), |(r, _)| (ids[r] * 100 + r as u32) as f32),
        labels: ids.iter().map(|&i| SubjectLabel::anonymous(i)).collect(),
    }
}

fn identity_of(v: f32) -> u32 {
    v as u32 / 100
}

#[test]
fn produces_exactly_n_triplets() {
    let a = tensor(&[1, 2, 3], 8);
    let r = tensor(&[1, 1, 2, 3, 3], 8);
    let b = generate_triplets(&a, &r, 257, 42).unwrap();
    assert_eq!(b.signals.dim(), (257, 3, 8));
    assert_eq!(b.labels.len(), 257);
}

#[test]
fn identity_invariants_hold() {
    let a = tensor(&[1, 2, 3, 4], 4);
    let r = tensor(&[1, 2, 2, 3, 4, 4, 4], 4);
    let b = generate_triplets(&a, &r, 500, 3).unwrap();
    for i in 0..b.len() {
        let (ai, pi, ni) = (
            identity_of(b.anchor(i)[0]),
            identity_of(b.positive(i)[0]),
            identity_of(b.negative(i)[0]),
        );
        assert_eq!(ai, pi, "triplet {i}");
        assert_ne!(ai, ni, "triplet {i}");
        assert_eq!(b.labels[i].anchor.subject, ai);
        assert_eq!(b.labels[i].negative.subject, ni);
    }
}

#[test]
fn same_seed_same_batch() {
    let a = tensor(&[1, 2, 3], 5);
    let r = tensor(&[1, 2, 3, 3], 5);
    let x = generate_triplets(&a, &r, 64, 9).unwrap();
    let y = generate_triplets(&a, &r, 64, 9).unwrap();
    let z = generate_triplets(&a, &r, 64, 10).unwrap();
    assert_eq!(x.signals, y.signals);
    assert_eq!(x.labels, y.labels);
    assert_ne!(x.labels, z.labels);
}

#[test]
fn single_identity_is_fatal() {
    let a = tensor(&[5], 3);
    let r = tensor(&[5, 5], 3);
    let err = generate_triplets(&a, &r, 10, 0).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DataError>(),
        Some(DataError::InsufficientIdentities { found: 1 })
    ));
}

#[test]
fn no_positive_candidates_is_fatal() {
    let a = tensor(&[1, 2], 3);
    let r = tensor(&[], 3);
    let err = generate_triplets(&a, &r, 10, 0).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DataError>(),
        Some(DataError::NoPositiveCandidates { .. })
    ));
}

#[test]
fn anchors_without_positives_still_serve_as_negatives() {
    // Identity 2 has no remaining rows: never an anchor, sometimes a negative.
    let a = tensor(&[1, 2], 3);
    let r = tensor(&[1, 1], 3);
    let b = generate_triplets(&a, &r, 50, 1).unwrap();
    assert!(b.labels.iter().all(|l| l.anchor.subject == 1 && l.negative.subject == 2));
}

#[test]
fn misaligned_labels_rejected() {
    let mut a = tensor(&[1, 2], 3);
    a.labels.pop();
    let r = tensor(&[1, 2], 3);
    assert!(generate_triplets(&a, &r, 5, 0).is_err());
}

#[test]
fn signal_length_mismatch_rejected() {
    let err = generate_triplets(&tensor(&[1, 2], 3), &tensor(&[1, 2], 4), 5, 0).unwrap_err();
    assert!(matches!(err.downcast_ref::<DataError>(), Some(DataError::ShapeMismatch { .. })));
}
