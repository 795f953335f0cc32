//! Benchmarks for annvault index lifecycle operations.
//!
//! Run with: `cargo bench`
//!
//! Covers opening with training, batch insertion, top-k search and the
//! save/load round trip.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use annvault::{Indexer, IndexerConfig, Matrix, TrainingSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

const DIM: usize = 64;

fn random_matrix(rows: usize, seed: u64) -> Matrix<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f32> = (0..rows * DIM).map(|_| rng.random::<f32>()).collect();
    Matrix::new(data, DIM).unwrap()
}

fn populated(index_key: &str, rows: usize) -> Indexer {
    let vectors = random_matrix(rows, 1);
    let config = IndexerConfig::new(index_key).with_training(TrainingSource::Vectors(vectors.clone()));
    let mut index = Indexer::open(config).unwrap();
    let keys: Vec<i64> = (0..rows as i64).collect();
    index.add(&keys, &vectors).unwrap();
    index
}

/// Benchmark opening an index that trains on 2000 vectors.
fn bench_open_trained(c: &mut Criterion) {
    let training = random_matrix(2000, 1);
    let mut group = c.benchmark_group("open_trained");
    group.sample_size(10);

    for index_key in ["IVF16,Flat", "IVF16,PQ8"] {
        group.bench_with_input(BenchmarkId::from_parameter(index_key), &index_key, |b, key| {
            b.iter(|| {
                let config =
                    IndexerConfig::new(*key).with_training(TrainingSource::Vectors(training.clone()));
                Indexer::open(config).unwrap().close().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark adding a 1000-vector batch.
fn bench_add(c: &mut Criterion) {
    let batch = random_matrix(1000, 2);
    let keys: Vec<i64> = (0..1000).collect();
    let mut group = c.benchmark_group("add_1000");
    group.sample_size(10);

    for index_key in ["Flat", "HNSW16"] {
        group.bench_with_input(BenchmarkId::from_parameter(index_key), &index_key, |b, key| {
            b.iter(|| {
                let mut index = Indexer::open(IndexerConfig::new(*key)).unwrap();
                index.add(&keys, &batch).unwrap();
                index
            });
        });
    }
    group.finish();
}

/// Benchmark top-10 search for 100 queries.
fn bench_query(c: &mut Criterion) {
    let queries = random_matrix(100, 3);
    let mut group = c.benchmark_group("query_100x10");

    for index_key in ["Flat", "HNSW16", "IVF16,Flat", "IVF16,PQ8"] {
        let index = populated(index_key, 5000);
        group.bench_function(BenchmarkId::from_parameter(index_key), |b| {
            b.iter(|| index.query(&queries, 10).unwrap());
        });
    }
    group.finish();
}

/// Benchmark saving and loading a 5000-vector flat index.
fn bench_save_load(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bench.avlt");
    let index = populated("Flat", 5000);

    c.bench_function("save_flat_5000", |b| {
        b.iter(|| index.save(&path).unwrap());
    });

    index.save(&path).unwrap();
    c.bench_function("load_flat_5000", |b| {
        b.iter(|| Indexer::load(&path).unwrap());
    });
}

criterion_group!(benches, bench_open_trained, bench_add, bench_query, bench_save_load);
criterion_main!(benches);
