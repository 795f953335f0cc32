//! Product quantization.
//!
//! A vector is split into `m` equal sub-vectors and each one is replaced
//! by the index of its nearest codeword in a per-subspace codebook of
//! [`PQ_CENTROIDS`] entries, so every vector compresses to `m` bytes.
//! Distances are computed asymmetrically: the query stays in full
//! precision and is compared against codewords through a lookup table.

use serde::{Deserialize, Serialize};

use super::kmeans::{nearest_centroid, KMeans};
use super::{check_batch_dimension, decode_state, l2_squared, select_top_k, VectorIndex};
use crate::config::IvfConfig;
use crate::error::{IndexerError, NotFoundError, Result, TrainingError};
use crate::types::{InternalId, Matrix};

/// Codewords per sub-quantizer. Codes are one byte.
pub const PQ_CENTROIDS: usize = 256;

/// Trained codebooks for `m` sub-quantizers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ProductQuantizer {
    dimension: usize,
    m: usize,
    sub_dimension: usize,
    /// Layout: `[subspace][codeword][sub_dimension]`, flattened.
    codebooks: Vec<f32>,
}

impl ProductQuantizer {
    /// Learns one codebook per subspace from row-major `data`.
    pub(crate) fn train(
        data: &[f32],
        dimension: usize,
        m: usize,
        max_iterations: usize,
        seed: u64,
    ) -> Result<Self> {
        let sub_dimension = dimension / m;
        let n = data.len() / dimension;
        let mut codebooks = Vec::with_capacity(m * PQ_CENTROIDS * sub_dimension);

        for subspace in 0..m {
            let range = subspace * sub_dimension..(subspace + 1) * sub_dimension;
            let mut slice = Vec::with_capacity(n * sub_dimension);
            for row in data.chunks_exact(dimension) {
                slice.extend_from_slice(&row[range.clone()]);
            }
            let centroids = KMeans::new(
                sub_dimension,
                PQ_CENTROIDS,
                max_iterations,
                seed.wrapping_add(subspace as u64),
            )
            .fit(&slice)?;
            codebooks.extend_from_slice(&centroids);
        }

        Ok(Self {
            dimension,
            m,
            sub_dimension,
            codebooks,
        })
    }

    fn codebook(&self, subspace: usize) -> &[f32] {
        let size = PQ_CENTROIDS * self.sub_dimension;
        &self.codebooks[subspace * size..(subspace + 1) * size]
    }

    fn codeword(&self, subspace: usize, code: u8) -> &[f32] {
        let start = code as usize * self.sub_dimension;
        &self.codebook(subspace)[start..start + self.sub_dimension]
    }

    /// Appends the `m` codes of `vector` to `out`.
    pub(crate) fn encode_into(&self, vector: &[f32], out: &mut Vec<u8>) {
        for (subspace, sub) in vector.chunks_exact(self.sub_dimension).enumerate() {
            let code = nearest_centroid(sub, self.codebook(subspace), self.sub_dimension);
            out.push(code as u8);
        }
    }

    /// Reconstructs an approximate vector from its codes.
    pub(crate) fn decode(&self, codes: &[u8]) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.dimension);
        for (subspace, &code) in codes.iter().enumerate() {
            vector.extend_from_slice(self.codeword(subspace, code));
        }
        vector
    }

    /// Squared distance from each query sub-vector to every codeword.
    ///
    /// Layout: `[subspace][codeword]`.
    pub(crate) fn distance_table(&self, query: &[f32]) -> Vec<f32> {
        let mut table = Vec::with_capacity(self.m * PQ_CENTROIDS);
        for (subspace, sub) in query.chunks_exact(self.sub_dimension).enumerate() {
            table.extend(
                self.codebook(subspace)
                    .chunks_exact(self.sub_dimension)
                    .map(|codeword| l2_squared(sub, codeword)),
            );
        }
        table
    }

    /// Sums table entries selected by `codes`.
    #[inline]
    pub(crate) fn table_distance(table: &[f32], codes: &[u8]) -> f32 {
        codes
            .iter()
            .enumerate()
            .map(|(subspace, &code)| table[subspace * PQ_CENTROIDS + code as usize])
            .sum()
    }

    pub(crate) fn m(&self) -> usize {
        self.m
    }

    pub(crate) fn is_consistent(&self, dimension: usize) -> bool {
        self.dimension == dimension
            && self.m > 0
            && self.sub_dimension * self.m == dimension
            && self.codebooks.len() == self.m * PQ_CENTROIDS * self.sub_dimension
    }
}

/// PQ codes scanned exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PqIndex {
    dimension: usize,
    m: usize,
    max_iterations: usize,
    seed: u64,
    quantizer: Option<ProductQuantizer>,
    /// `m` bytes per vector, in id order.
    codes: Vec<u8>,
}

impl PqIndex {
    /// Creates an untrained index with `m` sub-quantizers.
    pub fn new(dimension: usize, m: usize, config: &IvfConfig, seed: u64) -> Self {
        Self {
            dimension,
            m,
            max_iterations: config.max_iterations,
            seed,
            quantizer: None,
            codes: Vec::new(),
        }
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let index: Self = decode_state(bytes, "PQ index")?;
        if index.m == 0 || index.dimension == 0 || index.codes.len() % index.m != 0 {
            return Err(IndexerError::corrupt("PQ index has inconsistent code storage"));
        }
        if let Some(pq) = &index.quantizer {
            if !pq.is_consistent(index.dimension) || pq.m() != index.m {
                return Err(IndexerError::corrupt("PQ codebooks do not match index shape"));
            }
        } else if !index.codes.is_empty() {
            return Err(IndexerError::corrupt("untrained PQ index holds codes"));
        }
        Ok(index)
    }

    fn key(&self) -> String {
        format!("PQ{}", self.m)
    }
}

impl VectorIndex for PqIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_trained(&self) -> bool {
        self.quantizer.is_some()
    }

    fn train(&mut self, vectors: &Matrix<f32>) -> Result<()> {
        if self.quantizer.is_some() {
            return Err(TrainingError::AlreadyTrained.into());
        }
        check_batch_dimension(self.dimension, vectors)?;
        let pq = ProductQuantizer::train(
            vectors.as_slice(),
            self.dimension,
            self.m,
            self.max_iterations,
            self.seed,
        )?;
        self.quantizer = Some(pq);
        Ok(())
    }

    fn add(&mut self, vectors: &Matrix<f32>) -> Result<()> {
        check_batch_dimension(self.dimension, vectors)?;
        let pq = self
            .quantizer
            .as_ref()
            .ok_or_else(|| TrainingError::untrained(self.key()))?;
        self.codes.reserve(vectors.rows() * self.m);
        for row in vectors.iter_rows() {
            pq.encode_into(row, &mut self.codes);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(InternalId, f32)>> {
        let Some(pq) = &self.quantizer else {
            return Ok(Vec::new());
        };
        let table = pq.distance_table(query);
        let candidates = self
            .codes
            .chunks_exact(self.m)
            .enumerate()
            .map(|(id, codes)| (id, ProductQuantizer::table_distance(&table, codes)));
        Ok(select_top_k(candidates, k))
    }

    fn reconstruct(&self, id: InternalId) -> Result<Vec<f32>> {
        match &self.quantizer {
            Some(pq) if id < self.len() => Ok(pq.decode(&self.codes[id * self.m..(id + 1) * self.m])),
            _ => Err(NotFoundError::internal_id(id).into()),
        }
    }

    fn len(&self) -> usize {
        self.codes.len() / self.m
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 300 deterministic 4-d points on a coarse lattice.
    fn lattice() -> Matrix<f32> {
        let rows: Vec<[f32; 4]> = (0..300)
            .map(|i| {
                let i = i as f32;
                [i % 7.0, (i * 3.0) % 11.0, i % 5.0, (i * 2.0) % 13.0]
            })
            .collect();
        Matrix::from_rows(&rows).unwrap()
    }

    #[test]
    fn test_add_before_train_is_untrained() {
        let mut index = PqIndex::new(4, 2, &IvfConfig::default(), 42);
        let err = index.add(&lattice()).unwrap_err();
        assert!(err.is_untrained());
    }

    #[test]
    fn test_train_needs_enough_vectors() {
        let mut index = PqIndex::new(4, 2, &IvfConfig::default(), 42);
        let small = Matrix::new(vec![0.0f32; 4 * 10], 4).unwrap();
        assert!(index.train(&small).unwrap_err().is_vector());
        assert!(!index.is_trained());
    }

    #[test]
    fn test_lattice_codes_are_lossless() {
        // Each 2-d subspace has fewer distinct points than codewords.
        let data = lattice();
        let mut index = PqIndex::new(4, 2, &IvfConfig::default(), 42);
        index.train(&data).unwrap();
        index.add(&data).unwrap();

        assert_eq!(index.len(), 300);
        assert_eq!(index.reconstruct(17).unwrap(), data.row(17).to_vec());

        let hits = index.search(data.row(5), 1).unwrap();
        assert_eq!(hits[0].1, 0.0);
    }

    #[test]
    fn test_second_train_rejected() {
        let data = lattice();
        let mut index = PqIndex::new(4, 2, &IvfConfig::default(), 42);
        index.train(&data).unwrap();
        assert!(index.train(&data).unwrap_err().is_already_trained());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let data = lattice();
        let mut index = PqIndex::new(4, 2, &IvfConfig::default(), 42);
        index.train(&data).unwrap();
        index.add(&data).unwrap();

        let restored = PqIndex::from_bytes(&index.to_bytes().unwrap()).unwrap();
        assert_eq!(
            restored.search(data.row(9), 5).unwrap(),
            index.search(data.row(9), 5).unwrap()
        );
    }
}
