//! HNSW vector index implementation using hnsw_rs.
//!
//! Wraps `hnsw_rs::Hnsw<f32, DistL2>` and keeps a copy of every inserted
//! vector alongside the graph.
//!
//! # Persistence Strategy
//!
//! Only the raw vectors and the build parameters are serialized. The graph
//! is rebuilt on load, because `hnsw_rs::HnswIo::load_hnsw` borrows from
//! its loader and cannot be held in an owned struct.
//!
//! Rows are inserted one at a time in id order. hnsw_rs draws node levels
//! from a fixed-seed generator, so the same insertion sequence rebuilds
//! the same graph and a reloaded index returns exactly the results of the
//! index that was saved.

use anndists::dist::DistL2;
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};

use super::spec::MAX_HNSW_M;
use super::{check_batch_dimension, decode_state, select_top_k, VectorIndex};
use crate::config::HnswConfig;
use crate::error::{IndexerError, NotFoundError, Result};
use crate::types::{InternalId, Matrix};

/// HNSW vector index backed by `hnsw_rs`.
pub struct HnswIndex {
    /// The underlying HNSW graph. Uses `'static` lifetime because
    /// all data is heap-owned (not memory-mapped).
    hnsw: Hnsw<'static, f32, DistL2>,

    /// Links per node.
    m: usize,

    config: HnswConfig,

    dimension: usize,

    /// Inserted vectors in id order, for reconstruction and persistence.
    vectors: Vec<f32>,
}

#[derive(Serialize)]
struct HnswStateRef<'a> {
    dimension: usize,
    m: usize,
    config: &'a HnswConfig,
    vectors: &'a [f32],
}

#[derive(Deserialize)]
struct HnswState {
    dimension: usize,
    m: usize,
    config: HnswConfig,
    vectors: Vec<f32>,
}

impl HnswIndex {
    /// Creates a new empty HNSW index.
    ///
    /// # Arguments
    ///
    /// * `dimension` - Expected vector dimension (validated on insert)
    /// * `m` - Maximum links per node
    /// * `config` - HNSW tuning parameters
    pub fn new(dimension: usize, m: usize, config: &HnswConfig) -> Self {
        Self::with_capacity(dimension, m, config, config.max_elements)
    }

    fn with_capacity(dimension: usize, m: usize, config: &HnswConfig, capacity: usize) -> Self {
        let hnsw = Hnsw::new(
            m,
            capacity.max(1),
            config.max_layer,
            config.ef_construction,
            DistL2 {},
        );

        Self {
            hnsw,
            m,
            config: config.clone(),
            dimension,
            vectors: Vec::new(),
        }
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let state: HnswState = decode_state(bytes, "HNSW index")?;
        if state.dimension == 0 || state.vectors.len() % state.dimension != 0 {
            return Err(IndexerError::corrupt(format!(
                "HNSW index holds {} floats for dimension {}",
                state.vectors.len(),
                state.dimension
            )));
        }
        if state.m < 2 || state.m > MAX_HNSW_M {
            return Err(IndexerError::corrupt(format!(
                "HNSW link count {} is outside 2..={}",
                state.m, MAX_HNSW_M
            )));
        }
        state
            .config
            .validate()
            .map_err(|e| IndexerError::corrupt(format!("HNSW parameters: {}", e)))?;

        let count = state.vectors.len() / state.dimension;
        let mut index = Self::with_capacity(
            state.dimension,
            state.m,
            &state.config,
            state.config.max_elements.max(count),
        );
        if count > 0 {
            let batch = Matrix::new(state.vectors, state.dimension)?;
            index.insert_rows(&batch);
        }
        tracing::debug!(count, m = state.m, "HNSW graph rebuilt");
        Ok(index)
    }

    /// Inserts every row, assigning ids from the current length.
    fn insert_rows(&mut self, vectors: &Matrix<f32>) {
        let start = self.len();
        // Sequential: parallel_insert makes the graph depend on scheduling.
        for (i, row) in vectors.as_slice().chunks_exact(self.dimension).enumerate() {
            self.hnsw.insert_slice((row, start + i));
        }
        self.vectors.extend_from_slice(vectors.as_slice());
    }
}

impl VectorIndex for HnswIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_trained(&self) -> bool {
        true
    }

    fn train(&mut self, _vectors: &Matrix<f32>) -> Result<()> {
        Ok(())
    }

    fn add(&mut self, vectors: &Matrix<f32>) -> Result<()> {
        check_batch_dimension(self.dimension, vectors)?;
        if !vectors.is_empty() {
            self.insert_rows(vectors);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(InternalId, f32)>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let ef_search = self.config.ef_search.max(k);
        let results = self.hnsw.search(query, k, ef_search);

        // DistL2 is the plain Euclidean norm; report squared distances.
        let candidates = results
            .into_iter()
            .map(|n| (n.d_id, n.distance * n.distance));
        Ok(select_top_k(candidates, k))
    }

    fn reconstruct(&self, id: InternalId) -> Result<Vec<f32>> {
        if id >= self.len() {
            return Err(NotFoundError::internal_id(id).into());
        }
        Ok(self.vectors[id * self.dimension..(id + 1) * self.dimension].to_vec())
    }

    fn len(&self) -> usize {
        self.vectors.len() / self.dimension
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let state = HnswStateRef {
            dimension: self.dimension,
            m: self.m,
            config: &self.config,
            vectors: &self.vectors,
        };
        Ok(bincode::serialize(&state)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> HnswConfig {
        HnswConfig {
            ef_construction: 100,
            ef_search: 50,
            max_layer: 8,
            max_elements: 1000,
        }
    }

    /// Generates a deterministic vector from a seed.
    /// Vectors with close seeds produce similar vectors.
    fn make_vector(seed: u64, dim: usize) -> Vec<f32> {
        (0..dim)
            .map(|i| (seed as f32 * 0.1 + i as f32 * 0.01).sin())
            .collect()
    }

    fn batch(count: u64, dim: usize) -> Matrix<f32> {
        let rows: Vec<Vec<f32>> = (0..count).map(|i| make_vector(i, dim)).collect();
        Matrix::from_rows(&rows).unwrap()
    }

    #[test]
    fn test_new_index_is_empty() {
        let index = HnswIndex::new(16, 16, &test_config());
        assert!(index.is_empty());
        assert!(index.search(&make_vector(1, 16), 5).unwrap().is_empty());
    }

    #[test]
    fn test_insert_and_search() {
        let dim = 8;
        let mut index = HnswIndex::new(dim, 16, &test_config());
        index.add(&batch(10, dim)).unwrap();
        assert_eq!(index.len(), 10);

        let results = index.search(&make_vector(5, dim), 3).unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 3);
        for w in results.windows(2) {
            assert!(w[0].1 <= w[1].1, "Results not sorted by distance");
        }
    }

    #[test]
    fn test_identical_vector_has_zero_distance() {
        let dim = 8;
        let mut index = HnswIndex::new(dim, 16, &test_config());
        index.add(&batch(20, dim)).unwrap();

        let results = index.search(&make_vector(12, dim), 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 12);
        assert!(results[0].1 < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = HnswIndex::new(384, 16, &test_config());
        let err = index.add(&batch(2, 128)).unwrap_err();
        assert!(err.is_validation());
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let dim = 4;
        let mut index = HnswIndex::new(dim, 16, &test_config());
        index.add(&batch(1, dim)).unwrap();
        let results = index.search(&make_vector(1, dim), 100).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_ids_continue_across_batches() {
        let dim = 4;
        let mut index = HnswIndex::new(dim, 16, &test_config());
        index.add(&batch(3, dim)).unwrap();
        index.add(&Matrix::from_rows(&[make_vector(40, dim)]).unwrap()).unwrap();

        assert_eq!(index.reconstruct(3).unwrap(), make_vector(40, dim));
        let results = index.search(&make_vector(40, dim), 1).unwrap();
        assert_eq!(results[0].0, 3);
    }

    #[test]
    fn test_rebuild_from_bytes() {
        let dim = 8;
        let mut index = HnswIndex::new(dim, 16, &test_config());
        index.add(&batch(20, dim)).unwrap();

        let restored = HnswIndex::from_bytes(&index.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.len(), 20);
        assert_eq!(restored.reconstruct(7).unwrap(), index.reconstruct(7).unwrap());
        let results = restored.search(&make_vector(7, dim), 1).unwrap();
        assert_eq!(results[0].0, 7);
    }

    #[test]
    fn test_rebuild_returns_identical_results() {
        let dim = 8;
        let mut index = HnswIndex::new(dim, 4, &test_config());
        index.add(&batch(300, dim)).unwrap();
        let restored = HnswIndex::from_bytes(&index.to_bytes().unwrap()).unwrap();

        for seed in 0..50 {
            let query = make_vector(seed * 7 + 3, dim);
            assert_eq!(
                restored.search(&query, 10).unwrap(),
                index.search(&query, 10).unwrap()
            );
        }
    }

    fn tampered(m: usize, max_elements: usize) -> Vec<u8> {
        let config = HnswConfig {
            max_elements,
            ..test_config()
        };
        let vectors = make_vector(1, 4);
        let state = HnswStateRef {
            dimension: 4,
            m,
            config: &config,
            vectors: &vectors,
        };
        bincode::serialize(&state).unwrap()
    }

    #[test]
    fn test_rebuild_rejects_out_of_range_link_count() {
        for m in [0, 1, MAX_HNSW_M + 1, 300] {
            let err = HnswIndex::from_bytes(&tampered(m, 1000)).err().unwrap();
            assert!(err.is_storage(), "m = {} should be corrupt", m);
        }
        assert!(HnswIndex::from_bytes(&tampered(MAX_HNSW_M, 1000)).is_ok());
    }

    #[test]
    fn test_rebuild_rejects_huge_capacity() {
        let err = HnswIndex::from_bytes(&tampered(16, usize::MAX)).err().unwrap();
        assert!(err.is_storage());
    }

    #[test]
    fn test_rebuild_empty() {
        let index = HnswIndex::new(384, 16, &test_config());
        let restored = HnswIndex::from_bytes(&index.to_bytes().unwrap()).unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.dimension(), 384);
    }
}
