// In benches/score_bench.rs

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use arrow::array::{FixedSizeListArray, Float32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use timbang::container::{ContainerKind, ModelContainer, ScratchFile};
use timbang::engine::stub::StubEngine;
use timbang::scorer::ModelScorer;
use timbang::shape::{reconcile, ColumnShape};
use timbang::ScorerOptions;

// --- Mock Data Generation ---

const ROWS: usize = 1024;
const VECTOR_LEN: i32 = 12;

/// A single-column batch of flat 12-element vectors.
fn feature_batch() -> RecordBatch {
    let item = Arc::new(Field::new("item", DataType::Float32, true));
    let values: Vec<f32> = (0..ROWS * VECTOR_LEN as usize).map(|i| i as f32).collect();
    let child = Float32Array::from(values);
    let list = FixedSizeListArray::new(item.clone(), VECTOR_LEN, Arc::new(child), None);
    let schema = Schema::new(vec![Field::new(
        "Features",
        DataType::FixedSizeList(item, VECTOR_LEN),
        false,
    )]);
    RecordBatch::try_new(Arc::new(schema), vec![Arc::new(list)]).unwrap()
}

fn model_blob() -> Vec<u8> {
    (0..4096u32).flat_map(|i| i.to_le_bytes()).collect()
}

// --- Benchmark Suite ---

fn bench_container_codec(c: &mut Criterion) {
    let options = ScorerOptions::single("Score", "Features", vec![1, 3, 2, 2]);
    let container =
        ModelContainer::from_options(ContainerKind::SingleInput, &options, model_blob()).unwrap();
    let bytes = container.to_bytes().unwrap();

    let mut group = c.benchmark_group("Container Codec");
    group.throughput(criterion::Throughput::Bytes(bytes.len() as u64));

    group.bench_function("Encode", |b| {
        b.iter(|| black_box(container.to_bytes().unwrap()))
    });
    group.bench_function("Decode", |b| {
        b.iter(|| black_box(ModelContainer::from_bytes(black_box(&bytes)).unwrap()))
    });
    group.bench_function("Peek Info", |b| {
        b.iter(|| black_box(ModelContainer::peek_info(black_box(&bytes)).unwrap()))
    });
    group.finish();
}

fn bench_shape_reconcile(c: &mut Criterion) {
    let flat = ColumnShape::Flat(12);
    let dims = ColumnShape::Dims(vec![1, 3, 2, 2]);
    let configured = [1usize, 3, 2, 2];

    let mut group = c.benchmark_group("Shape Reconciliation");
    group.bench_function("Flat -> Reshape", |b| {
        b.iter(|| black_box(reconcile("Features", black_box(&flat), &configured)))
    });
    group.bench_function("Dims -> Exact", |b| {
        b.iter(|| black_box(reconcile("Features", black_box(&dims), &configured)))
    });
    group.finish();
}

fn bench_row_scoring(c: &mut Criterion) {
    let engine = Arc::new(StubEngine::with_output(vec![0.0; 4]));
    let options = ScorerOptions::single("Score", "Features", vec![1, 3, 2, 2]);
    let model_file = ScratchFile::create(&model_blob()).unwrap();
    let scorer = ModelScorer::from_options(engine, options, model_file.path()).unwrap();

    let batch = feature_batch();
    let mut mapper = scorer.bind(batch.schema().as_ref()).unwrap();

    let mut group = c.benchmark_group("Row Scoring (Stub Engine)");
    group.throughput(criterion::Throughput::Elements(ROWS as u64));

    group.bench_function("Score Single Row", |b| {
        b.iter(|| black_box(mapper.score_row(&batch, 0).unwrap()))
    });
    group.bench_function("Score Full Batch", |b| {
        b.iter(|| black_box(mapper.score_batch(&batch).unwrap()))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_container_codec,
    bench_shape_reconcile,
    bench_row_scoring
);
criterion_main!(benches);
