//! Vector index abstractions for nearest neighbor search.
//!
//! This module provides a trait-based abstraction over the index core,
//! so the lifecycle layer never depends on a concrete algorithm.
//! Backends are selected once from a parsed [`IndexSpec`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │         VectorIndex trait         │
//! └──────────┬───────────────────────┘
//!            │
//!    ┌───────┼──────────┬────────────┐
//!    │       │          │            │
//! FlatIndex HnswIndex IvfIndex    PqIndex
//!  (exact)  (hnsw_rs) (k-means +  (PQ codes,
//!                      Flat / PQ)  full scan)
//! ```
//!
//! Every backend uses squared Euclidean distance and assigns internal ids
//! in insertion order, starting at its current length.

mod flat;
mod hnsw;
mod ivf;
mod kmeans;
mod pq;
mod spec;

pub use flat::FlatIndex;
pub use hnsw::HnswIndex;
pub use ivf::IvfIndex;
pub use pq::PqIndex;
pub use spec::{IndexSpec, DEFAULT_HNSW_M, MAX_HNSW_M};

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::config::{IndexerConfig, MAX_DIMENSION};
use crate::error::{IndexerError, Result, ValidationError};
use crate::types::{InternalId, Matrix};

/// Vector index trait for nearest neighbor search.
///
/// Implementations must be `Send + Sync` so read-only queries can be
/// evaluated from several threads. Mutation goes through `&mut self`;
/// the caller keeps key assignment and insertion in lock-step.
pub trait VectorIndex: Send + Sync {
    /// Vector dimension accepted by this index.
    fn dimension(&self) -> usize;

    /// Returns true once the index can accept vectors.
    fn is_trained(&self) -> bool;

    /// Calibrates the index on representative vectors.
    ///
    /// Backends that need no calibration accept and ignore the call.
    fn train(&mut self, vectors: &Matrix<f32>) -> Result<()>;

    /// Appends a batch. Row `i` receives internal id `self.len() + i`.
    fn add(&mut self, vectors: &Matrix<f32>) -> Result<()>;

    /// Searches for the `k` nearest stored vectors.
    ///
    /// Returns `(internal_id, distance)` pairs sorted by distance
    /// ascending. May return fewer than `k` pairs.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(InternalId, f32)>>;

    /// Returns the stored (or decoded) vector for an internal id.
    ///
    /// Exact backends return the inserted vector; quantized backends
    /// return their reconstruction from codes.
    fn reconstruct(&self, id: InternalId) -> Result<Vec<f32>>;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    /// Returns true if the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes the complete index state.
    fn to_bytes(&self) -> Result<Vec<u8>>;
}

/// Builds an empty index for `spec` at the given dimension.
///
/// # Errors
///
/// Returns a validation error if the dimension is 0, above
/// [`MAX_DIMENSION`], or incompatible with the spec (for example not
/// divisible by the PQ sub-quantizer count).
pub fn build_index(
    spec: &IndexSpec,
    dimension: usize,
    config: &IndexerConfig,
) -> Result<Box<dyn VectorIndex>> {
    if dimension == 0 {
        return Err(ValidationError::invalid_field("dimension", "must be greater than 0").into());
    }
    if dimension > MAX_DIMENSION {
        return Err(ValidationError::invalid_field(
            "dimension",
            format!("{} exceeds the maximum of {}", dimension, MAX_DIMENSION),
        )
        .into());
    }
    spec.check_dimension(dimension)?;

    let index: Box<dyn VectorIndex> = match *spec {
        IndexSpec::Flat => Box::new(FlatIndex::new(dimension)),
        IndexSpec::Hnsw { m } => Box::new(HnswIndex::new(dimension, m, &config.hnsw)),
        IndexSpec::IvfFlat { nlist } => {
            Box::new(IvfIndex::new(dimension, nlist, None, &config.ivf, config.seed))
        }
        IndexSpec::IvfPq { nlist, m } => {
            Box::new(IvfIndex::new(dimension, nlist, Some(m), &config.ivf, config.seed))
        }
        IndexSpec::Pq { m } => Box::new(PqIndex::new(dimension, m, &config.ivf, config.seed)),
    };
    Ok(index)
}

/// Restores an index previously produced by [`VectorIndex::to_bytes`].
///
/// # Errors
///
/// Returns `StorageError::CorruptArtifact` if the bytes do not decode to
/// a consistent index of the given spec and dimension.
pub fn restore_index(
    spec: &IndexSpec,
    dimension: usize,
    bytes: &[u8],
) -> Result<Box<dyn VectorIndex>> {
    let index: Box<dyn VectorIndex> = match *spec {
        IndexSpec::Flat => Box::new(FlatIndex::from_bytes(bytes)?),
        IndexSpec::Hnsw { .. } => Box::new(HnswIndex::from_bytes(bytes)?),
        IndexSpec::IvfFlat { .. } | IndexSpec::IvfPq { .. } => Box::new(IvfIndex::from_bytes(bytes)?),
        IndexSpec::Pq { .. } => Box::new(PqIndex::from_bytes(bytes)?),
    };
    if index.dimension() != dimension {
        return Err(IndexerError::corrupt(format!(
            "index core has dimension {}, header says {}",
            index.dimension(),
            dimension
        )));
    }
    Ok(index)
}

/// Squared Euclidean distance.
#[inline]
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Decodes a bincode core state, mapping failures to corruption.
pub(crate) fn decode_state<T: serde::de::DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| IndexerError::corrupt(format!("{} state: {}", what, e)))
}

pub(crate) fn check_batch_dimension(expected: usize, vectors: &Matrix<f32>) -> Result<()> {
    if vectors.cols() != expected && !vectors.is_empty() {
        return Err(ValidationError::dimension_mismatch(expected, vectors.cols()).into());
    }
    Ok(())
}

/// Candidate ordered by (distance, id), so ties resolve to the lower id.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    distance: f32,
    id: InternalId,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

/// Keeps the `k` smallest candidates, returned ascending.
pub(crate) fn select_top_k(
    candidates: impl IntoIterator<Item = (InternalId, f32)>,
    k: usize,
) -> Vec<(InternalId, f32)> {
    if k == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
    for (id, distance) in candidates {
        let candidate = Candidate { distance, id };
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|worst| candidate < *worst) {
            heap.pop();
            heap.push(candidate);
        }
    }
    heap.into_sorted_vec()
        .into_iter()
        .map(|c| (c.id, c.distance))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_squared() {
        assert_eq!(l2_squared(&[1.0, 1.0, 1.0], &[10.0, 10.0, 10.0]), 243.0);
        assert_eq!(l2_squared(&[0.5], &[0.5]), 0.0);
    }

    #[test]
    fn test_select_top_k_orders_and_truncates() {
        let cands = vec![(0, 5.0), (1, 1.0), (2, 3.0), (3, 0.5), (4, 9.0)];
        assert_eq!(select_top_k(cands, 3), vec![(3, 0.5), (1, 1.0), (2, 3.0)]);
    }

    #[test]
    fn test_select_top_k_ties_prefer_lower_id() {
        let cands = vec![(7, 1.0), (2, 1.0), (5, 1.0)];
        assert_eq!(select_top_k(cands, 2), vec![(2, 1.0), (5, 1.0)]);
    }

    #[test]
    fn test_select_top_k_fewer_than_k() {
        assert_eq!(select_top_k(vec![(0, 1.0)], 4), vec![(0, 1.0)]);
        assert!(select_top_k(vec![(0, 1.0)], 0).is_empty());
    }

    #[test]
    fn test_build_index_rejects_bad_pq_dimension() {
        let config = IndexerConfig::default();
        let err = build_index(&IndexSpec::Pq { m: 3 }, 10, &config).err().unwrap();
        assert!(err.is_validation());
    }

    #[test]
    fn test_build_index_rejects_oversized_dimension() {
        let config = IndexerConfig::default();
        let err = build_index(&IndexSpec::Flat, MAX_DIMENSION + 1, &config).err().unwrap();
        assert!(err.is_validation());
        assert!(build_index(&IndexSpec::Flat, MAX_DIMENSION, &config).is_ok());
    }

    #[test]
    fn test_restore_rejects_dimension_disagreement() {
        let config = IndexerConfig::default();
        let index = build_index(&IndexSpec::Flat, 4, &config).unwrap();
        let bytes = index.to_bytes().unwrap();
        let err = restore_index(&IndexSpec::Flat, 8, &bytes).err().unwrap();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_restore_rejects_garbage() {
        let err = restore_index(&IndexSpec::Flat, 4, &[1, 2, 3]).err().unwrap();
        assert!(err.is_corrupt());
    }
}
