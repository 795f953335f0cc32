//! Exact brute-force index.

use serde::{Deserialize, Serialize};

use super::{check_batch_dimension, decode_state, l2_squared, select_top_k, VectorIndex};
use crate::error::{NotFoundError, Result};
use crate::types::{InternalId, Matrix};

/// Exact scan over raw vectors stored contiguously in id order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<f32>,
}

impl FlatIndex {
    /// Creates an empty index.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let index: Self = decode_state(bytes, "flat index")?;
        if index.dimension == 0 || index.vectors.len() % index.dimension != 0 {
            return Err(crate::IndexerError::corrupt(format!(
                "flat index holds {} floats for dimension {}",
                index.vectors.len(),
                index.dimension
            )));
        }
        Ok(index)
    }

    #[inline]
    fn vector(&self, id: InternalId) -> &[f32] {
        &self.vectors[id * self.dimension..(id + 1) * self.dimension]
    }
}

impl VectorIndex for FlatIndex {
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
        self.vectors.extend_from_slice(vectors.as_slice());
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(InternalId, f32)>> {
        let candidates = (0..self.len()).map(|id| (id, l2_squared(query, self.vector(id))));
        Ok(select_top_k(candidates, k))
    }

    fn reconstruct(&self, id: InternalId) -> Result<Vec<f32>> {
        if id >= self.len() {
            return Err(NotFoundError::internal_id(id).into());
        }
        Ok(self.vector(id).to_vec())
    }

    fn len(&self) -> usize {
        self.vectors.len() / self.dimension
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}
