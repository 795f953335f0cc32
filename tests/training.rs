//! Integration tests for the training policy.

use std::fs;

use annvault::{
    write_training_file, CompressionLevel, Indexer, IndexerConfig, IndexerError, Matrix,
    TrainingError, TrainingSource, ValidationError,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

fn random_matrix(rows: usize, cols: usize, seed: u64) -> Matrix<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f32> = (0..rows * cols).map(|_| rng.random::<f32>()).collect();
    Matrix::new(data, cols).unwrap()
}

#[test]
fn test_flat_never_reads_training_source() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.gz");

    for source in [
        TrainingSource::File(missing.clone()),
        TrainingSource::Artifact(missing.clone()),
        TrainingSource::Vectors(random_matrix(3, 7, 1)),
    ] {
        let mut index = Indexer::open(IndexerConfig::new("Flat").with_training(source)).unwrap();
        assert!(index.is_trained());
        // The ignored batch did not fix the dimension.
        assert_eq!(index.dimension(), None);
        index.add(&[1], &random_matrix(1, 4, 2)).unwrap();
    }
}

#[test]
fn test_hnsw_ignores_training_vectors() {
    let config = IndexerConfig::new("HNSW8").with_training(TrainingSource::Vectors(random_matrix(10, 5, 1)));
    let index = Indexer::open(config).unwrap();
    assert!(index.is_trained());
    assert_eq!(index.dimension(), None);
}

#[test]
fn test_ivf_without_source_opens_untrained() {
    let mut index = Indexer::open(IndexerConfig::new("IVF10,PQ2")).unwrap();
    assert!(!index.is_trained());

    let err = index.add(&[1, 2], &random_matrix(2, 10, 1)).unwrap_err();
    assert!(matches!(
        err,
        IndexerError::Training(TrainingError::Untrained { ref index_key }) if index_key == "IVF10,PQ2"
    ));
    assert!(index.is_empty());
}

#[test]
fn test_train_after_open_then_second_train_rejected() {
    let mut index = Indexer::open(IndexerConfig::new("IVF10,PQ2")).unwrap();
    index.train(&random_matrix(1024, 10, 1)).unwrap();
    assert!(index.is_trained());
    assert_eq!(index.dimension(), Some(10));

    index.add(&[5, 6, 7], &random_matrix(3, 10, 2)).unwrap();

    let err = index.train(&random_matrix(1024, 10, 3)).unwrap_err();
    assert!(err.is_already_trained());
    assert_eq!(index.len(), 3);
}

#[test]
fn test_undersized_training_set_surfaces_core_error() {
    // PQ codebooks have 256 entries per sub-quantizer.
    let config = IndexerConfig::new("PQ2").with_training(TrainingSource::Vectors(random_matrix(100, 4, 1)));
    let err = Indexer::open(config).unwrap_err();
    assert!(err.is_vector(), "got {:?}", err);
}

#[test]
fn test_training_width_must_divide_into_subquantizers() {
    let config = IndexerConfig::new("IVF4,PQ3").with_training(TrainingSource::Vectors(random_matrix(300, 10, 1)));
    let err = Indexer::open(config).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_training_file_requires_dimension() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("train.gz");
    write_training_file(&path, &random_matrix(300, 4, 1), CompressionLevel::default()).unwrap();

    let err = Indexer::open(IndexerConfig::new("PQ2").with_training(TrainingSource::File(path))).unwrap_err();
    assert!(matches!(err, IndexerError::Config { .. }));
}

#[test]
fn test_missing_training_file_is_io_error() {
    let dir = tempdir().unwrap();
    let config = IndexerConfig::new("IVF4,Flat")
        .with_dimension(4)
        .with_training(TrainingSource::File(dir.path().join("absent.gz")));
    assert!(Indexer::open(config).unwrap_err().is_io());
}

#[test]
fn test_malformed_training_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("train.f32");
    // 5 floats cannot form rows of 4.
    fs::write(&path, [0u8; 20]).unwrap();

    let config = IndexerConfig::new("IVF4,Flat")
        .with_dimension(4)
        .with_training(TrainingSource::File(path));
    let err = Indexer::open(config).unwrap_err();
    assert!(matches!(
        err,
        IndexerError::Training(TrainingError::MalformedTrainingFile { .. })
    ));
}

#[test]
fn test_training_file_dimension_mismatch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("train.gz");
    write_training_file(&path, &random_matrix(300, 8, 1), CompressionLevel::default()).unwrap();

    // 300 rows of 8 read as 600 rows of 4 would be accepted, so use an
    // incompatible width instead.
    let config = IndexerConfig::new("IVF4,Flat")
        .with_dimension(7)
        .with_training(TrainingSource::File(path));
    let err = Indexer::open(config).unwrap_err();
    assert!(matches!(
        err,
        IndexerError::Training(TrainingError::MalformedTrainingFile { .. })
    ));
}

#[test]
fn test_inline_training_must_match_dimension_hint() {
    let config = IndexerConfig::new("IVF4,Flat")
        .with_dimension(6)
        .with_training(TrainingSource::Vectors(random_matrix(50, 5, 1)));
    let err = Indexer::open(config).unwrap_err();
    assert!(matches!(
        err,
        IndexerError::Validation(ValidationError::DimensionMismatch {
            expected: 6,
            got: 5
        })
    ));
}

#[test]
fn test_train_from_own_artifact_workflow() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("self.avlt");
    let vectors = random_matrix(500, 64, 500);
    let mut rng = StdRng::seed_from_u64(500);
    let keys: Vec<i64> = (0..500).map(|_| rng.random_range(0..500)).collect();
    let queries = random_matrix(10, 64, 501);

    // First run: the artifact does not exist yet.
    let config = IndexerConfig::new("IVF10,PQ4").with_training(TrainingSource::Artifact(path.clone()));
    let mut first = Indexer::open(config).unwrap();
    assert!(!first.is_trained());
    first.train(&vectors).unwrap();
    first.add(&keys, &vectors).unwrap();
    first.save(&path).unwrap();
    first.close().unwrap();

    // Second run: trains on the vectors stored in the artifact.
    for level in 0..=4 {
        let config = IndexerConfig::new("IVF10,PQ4")
            .with_training(TrainingSource::Artifact(path.clone()))
            .with_compression_level(level)
            .unwrap();
        let mut second = Indexer::open(config).unwrap();
        assert!(second.is_trained());
        assert_eq!(second.dimension(), Some(64));
        // The donor's key map is not inherited.
        assert!(second.is_empty());

        second.add(&keys, &vectors).unwrap();
        let out = dir.path().join(format!("level{}.avlt", level));
        second.save(&out).unwrap();
        second.close().unwrap();

        let loaded = Indexer::load(&out).unwrap();
        let results = loaded.query(&queries, 4).unwrap();
        assert_eq!((results.ids.rows(), results.ids.cols()), (10, 4));
        assert!(results.ids.as_slice().iter().all(|k| keys.contains(k)));
    }
}

#[test]
fn test_empty_artifact_file_opens_untrained() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.avlt");
    fs::write(&path, b"").unwrap();

    let index = Indexer::open(IndexerConfig::new("PQ2").with_training(TrainingSource::Artifact(path))).unwrap();
    assert!(!index.is_trained());
}
