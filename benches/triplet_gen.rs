use std::hint::black_box;
use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use securetl::resample::resample_to_length;
use securetl::{generate_triplets, LabeledTensor, SubjectLabel};

fn tensor(ids: &[u32], len: usize) -> LabeledTensor {
    LabeledTensor {
        signals: Array2::from_shape_fn((ids.len(), len), |(r, t)| ((r * 7 + t) as f32 * 0.01).sin()),
        labels: ids.iter().map(|&i| SubjectLabel::anonymous(i)).collect(),
    }
}

fn bench_generate(c: &mut Criterion) {
    let anchor_ids: Vec<u32> = (1..=72).collect();
    let remaining_ids: Vec<u32> = (1..=72).flat_map(|i| [i, i]).collect();
    let anchors = tensor(&anchor_ids, 1000);
    let remaining = tensor(&remaining_ids, 1000);
    c.bench_function("generate_triplets 10k × [3, 1000]", |b| {
        b.iter(|| {
            let batch = generate_triplets(&anchors, &remaining, black_box(10_000), 42).unwrap();
            black_box(batch.len())
        })
    });
}

fn bench_resample(c: &mut Criterion) {
    // ECG-ID recordings are 20 s at 500 Hz.
    let x: Vec<f32> = (0..10_000).map(|t| (t as f32 * 0.013).sin()).collect();
    c.bench_function("resample_to_length 10000 → 1000", |b| {
        b.iter(|| black_box(resample_to_length(black_box(&x), 1000).unwrap()))
    });
}

criterion_group!(benches, bench_generate, bench_resample);
criterion_main!(benches);
