//! Inverted-file index.
//!
//! Training learns `nlist` coarse centroids with k-means. Every vector is
//! filed under its nearest centroid; a query only scans the `nprobe` lists
//! whose centroids are closest to it. Lists store either raw vectors
//! (`IVF{n},Flat`) or PQ codes of the residual `vector - centroid`
//! (`IVF{n},PQ{m}`).

use serde::{Deserialize, Serialize};

use super::kmeans::{assign, KMeans};
use super::pq::ProductQuantizer;
use super::{check_batch_dimension, decode_state, l2_squared, select_top_k, VectorIndex};
use crate::config::IvfConfig;
use crate::error::{IndexerError, NotFoundError, Result, TrainingError};
use crate::types::{InternalId, Matrix};

/// IVF index with Flat or PQ list encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfIndex {
    dimension: usize,
    nlist: usize,
    /// `Some(m)` for PQ-encoded lists.
    pq_m: Option<usize>,
    nprobe: usize,
    max_iterations: usize,
    seed: u64,

    /// `nlist * dimension` floats; empty until trained.
    centroids: Vec<f32>,
    quantizer: Option<ProductQuantizer>,

    /// Internal ids per list.
    lists: Vec<Vec<InternalId>>,
    /// List of each internal id.
    assignments: Vec<u32>,
    /// Raw vectors in id order (Flat encoding).
    vectors: Vec<f32>,
    /// Residual codes in id order (PQ encoding).
    codes: Vec<u8>,
}

impl IvfIndex {
    /// Creates an untrained IVF index.
    ///
    /// `pq_m` selects PQ-encoded lists with that many sub-quantizers.
    pub fn new(
        dimension: usize,
        nlist: usize,
        pq_m: Option<usize>,
        config: &IvfConfig,
        seed: u64,
    ) -> Self {
        Self {
            dimension,
            nlist,
            pq_m,
            nprobe: config.nprobe.min(nlist).max(1),
            max_iterations: config.max_iterations,
            seed,
            centroids: Vec::new(),
            quantizer: None,
            lists: Vec::new(),
            assignments: Vec::new(),
            vectors: Vec::new(),
            codes: Vec::new(),
        }
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let index: Self = decode_state(bytes, "IVF index")?;
        index.check_consistency()?;
        Ok(index)
    }

    fn check_consistency(&self) -> Result<()> {
        let corrupt = |what: &str| Err(IndexerError::corrupt(format!("IVF index: {}", what)));
        if self.dimension == 0 || self.nlist == 0 || self.nprobe == 0 {
            return corrupt("zero-sized parameter");
        }
        if !self.is_trained() {
            return if self.assignments.is_empty() {
                Ok(())
            } else {
                corrupt("untrained index holds vectors")
            };
        }
        if self.centroids.len() != self.nlist * self.dimension || self.lists.len() != self.nlist {
            return corrupt("centroid table does not match nlist");
        }
        let n = self.assignments.len();
        if self.assignments.iter().any(|&list| list as usize >= self.nlist)
            || self.lists.iter().map(Vec::len).sum::<usize>() != n
            || self.lists.iter().flatten().any(|&id| id >= n)
        {
            return corrupt("inverted lists disagree with assignments");
        }
        match (self.pq_m, &self.quantizer) {
            (None, None) if self.vectors.len() == n * self.dimension => Ok(()),
            (Some(m), Some(pq))
                if pq.m() == m
                    && pq.is_consistent(self.dimension)
                    && self.codes.len() == n * m =>
            {
                Ok(())
            }
            _ => corrupt("list payload does not match encoding"),
        }
    }

    fn key(&self) -> String {
        match self.pq_m {
            Some(m) => format!("IVF{},PQ{}", self.nlist, m),
            None => format!("IVF{},Flat", self.nlist),
        }
    }

    fn centroid(&self, list: usize) -> &[f32] {
        &self.centroids[list * self.dimension..(list + 1) * self.dimension]
    }

    fn residual(&self, vector: &[f32], list: usize) -> Vec<f32> {
        vector
            .iter()
            .zip(self.centroid(list))
            .map(|(x, c)| x - c)
            .collect()
    }

    /// Lists to scan for `query`, nearest centroid first.
    fn probe(&self, query: &[f32]) -> Vec<usize> {
        let candidates = (0..self.nlist).map(|list| (list, l2_squared(query, self.centroid(list))));
        select_top_k(candidates, self.nprobe)
            .into_iter()
            .map(|(list, _)| list)
            .collect()
    }
}

impl VectorIndex for IvfIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    fn train(&mut self, vectors: &Matrix<f32>) -> Result<()> {
        if self.is_trained() {
            return Err(TrainingError::AlreadyTrained.into());
        }
        check_batch_dimension(self.dimension, vectors)?;

        let data = vectors.as_slice();
        let centroids =
            KMeans::new(self.dimension, self.nlist, self.max_iterations, self.seed).fit(data)?;

        let quantizer = match self.pq_m {
            Some(m) => {
                let lists = assign(data, self.dimension, &centroids);
                let mut residuals = Vec::with_capacity(data.len());
                for (row, &list) in data.chunks_exact(self.dimension).zip(&lists) {
                    let centroid = &centroids[list * self.dimension..(list + 1) * self.dimension];
                    residuals.extend(row.iter().zip(centroid).map(|(x, c)| x - c));
                }
                Some(ProductQuantizer::train(
                    &residuals,
                    self.dimension,
                    m,
                    self.max_iterations,
                    self.seed.wrapping_add(1),
                )?)
            }
            None => None,
        };

        self.centroids = centroids;
        self.quantizer = quantizer;
        self.lists = vec![Vec::new(); self.nlist];
        tracing::debug!(nlist = self.nlist, n = vectors.rows(), "IVF coarse quantizer trained");
        Ok(())
    }

    fn add(&mut self, vectors: &Matrix<f32>) -> Result<()> {
        check_batch_dimension(self.dimension, vectors)?;
        if !self.is_trained() {
            return Err(TrainingError::untrained(self.key()).into());
        }

        let lists = assign(vectors.as_slice(), self.dimension, &self.centroids);
        let mut codes = Vec::new();
        if let Some(pq) = &self.quantizer {
            codes.reserve(vectors.rows() * pq.m());
            for (row, &list) in vectors.iter_rows().zip(&lists) {
                pq.encode_into(&self.residual(row, list), &mut codes);
            }
        }

        for &list in &lists {
            let id = self.assignments.len();
            self.lists[list].push(id);
            self.assignments.push(list as u32);
        }
        if self.quantizer.is_some() {
            self.codes.extend_from_slice(&codes);
        } else {
            self.vectors.extend_from_slice(vectors.as_slice());
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(InternalId, f32)>> {
        if !self.is_trained() || self.assignments.is_empty() {
            return Ok(Vec::new());
        }
        let dim = self.dimension;
        let mut candidates = Vec::new();

        for list in self.probe(query) {
            let ids = &self.lists[list];
            match (&self.quantizer, self.pq_m) {
                (Some(pq), Some(m)) => {
                    let table = pq.distance_table(&self.residual(query, list));
                    candidates.extend(ids.iter().map(|&id| {
                        let codes = &self.codes[id * m..(id + 1) * m];
                        (id, ProductQuantizer::table_distance(&table, codes))
                    }));
                }
                _ => {
                    candidates.extend(ids.iter().map(|&id| {
                        (id, l2_squared(query, &self.vectors[id * dim..(id + 1) * dim]))
                    }));
                }
            }
        }

        Ok(select_top_k(candidates, k))
    }

    fn reconstruct(&self, id: InternalId) -> Result<Vec<f32>> {
        let Some(&list) = self.assignments.get(id) else {
            return Err(NotFoundError::internal_id(id).into());
        };
        let dim = self.dimension;
        match (&self.quantizer, self.pq_m) {
            (Some(pq), Some(m)) => {
                let residual = pq.decode(&self.codes[id * m..(id + 1) * m]);
                Ok(residual
                    .iter()
                    .zip(self.centroid(list as usize))
                    .map(|(r, c)| r + c)
                    .collect())
            }
            _ => Ok(self.vectors[id * dim..(id + 1) * dim].to_vec()),
        }
    }

    fn len(&self) -> usize {
        self.assignments.len()
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}
