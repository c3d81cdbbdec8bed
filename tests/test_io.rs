use ndarray::Array3;
use securetl::{load_triplets, save_triplets, SubjectLabel, TripletBatch, TripletLabel};

fn batch() -> TripletBatch {
    let signals = Array3::from_shape_fn((4, 3, 6), |(i, j, k)| {
        // Values that exercise every bit pattern class: negative, subnormal, large.
        match (i + j + k) % 4 {
            0 => -(i as f32) * 1.25e-3,
            1 => f32::MIN_POSITIVE / 3.0,
            2 => 3.4e38,
            _ => (k as f32).sin(),
        }
    });
    let labels = vec![
        TripletLabel {
            anchor: SubjectLabel::with_demographics(1, 25, "male"),
            negative: SubjectLabel::with_demographics(12, 40, "female"),
        },
        TripletLabel {
            anchor: SubjectLabel::anonymous(7),
            negative: SubjectLabel::anonymous(168),
        },
        TripletLabel {
            anchor: SubjectLabel::with_demographics(90, 61, "female"),
            negative: SubjectLabel::anonymous(3),
        },
        TripletLabel {
            anchor: SubjectLabel::anonymous(2),
            negative: SubjectLabel::with_demographics(2, 30, "male"),
        },
    ];
    TripletBatch { signals, labels }
}

#[test]
fn save_load_is_bit_exact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("triplets.safetensors");
    let b = batch();
    save_triplets(&b, &path).unwrap();
    let back = load_triplets(&path).unwrap();

    assert_eq!(back.labels, b.labels);
    assert_eq!(back.signals.dim(), b.signals.dim());
    for (x, y) in back.signals.iter().zip(b.signals.iter()) {
        assert_eq!(x.to_bits(), y.to_bits());
    }
}

#[test]
fn save_overwrites_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.safetensors");
    std::fs::write(&path, b"stale").unwrap();
    save_triplets(&batch(), &path).unwrap();
    assert_eq!(load_triplets(&path).unwrap().len(), 4);
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn empty_batch_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.safetensors");
    let b = TripletBatch { signals: Array3::zeros((0, 3, 10)), labels: vec![] };
    save_triplets(&b, &path).unwrap();
    let back = load_triplets(&path).unwrap();
    assert!(back.is_empty());
    assert_eq!(back.signals.dim(), (0, 3, 10));
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_triplets(&dir.path().join("nope.safetensors")).is_err());
}
