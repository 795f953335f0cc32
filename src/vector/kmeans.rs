//! Seeded k-means used for IVF coarse centroids and PQ codebooks.
//!
//! Lloyd iterations with k-means++ seeding under squared L2. The RNG is
//! seeded explicitly so the same training set always yields the same
//! centroids.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::l2_squared;
use crate::error::{IndexerError, Result};

/// k-means trainer over row-major `f32` data.
#[derive(Debug, Clone)]
pub(crate) struct KMeans {
    dimension: usize,
    k: usize,
    max_iterations: usize,
    seed: u64,
}

impl KMeans {
    pub(crate) fn new(dimension: usize, k: usize, max_iterations: usize, seed: u64) -> Self {
        Self {
            dimension,
            k,
            max_iterations,
            seed,
        }
    }

    /// Fits `k` centroids, returned flat (`k * dimension`).
    ///
    /// # Errors
    ///
    /// Fails if there are fewer points than clusters.
    pub(crate) fn fit(&self, data: &[f32]) -> Result<Vec<f32>> {
        let n = data.len() / self.dimension;
        if n < self.k {
            return Err(IndexerError::vector(format!(
                "k-means needs at least {} training vectors, got {}",
                self.k, n
            )));
        }

        let mut centroids = self.seed_centroids(data, n);
        let mut assignments = vec![usize::MAX; n];

        for iteration in 0..self.max_iterations {
            let next = assign(data, self.dimension, &centroids);
            let changed = next
                .iter()
                .zip(&assignments)
                .filter(|(a, b)| a != b)
                .count();
            assignments = next;
            self.update_centroids(data, &assignments, &mut centroids);

            if changed == 0 {
                tracing::trace!(iteration, k = self.k, "k-means converged");
                break;
            }
        }

        Ok(centroids)
    }

    /// k-means++ initialization.
    fn seed_centroids(&self, data: &[f32], n: usize) -> Vec<f32> {
        let dim = self.dimension;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids = Vec::with_capacity(self.k * dim);

        let first = rng.random_range(0..n);
        centroids.extend_from_slice(&data[first * dim..(first + 1) * dim]);

        let mut nearest: Vec<f32> = data
            .chunks_exact(dim)
            .map(|v| l2_squared(v, &centroids[..dim]))
            .collect();

        for c in 1..self.k {
            let total: f64 = nearest.iter().map(|&d| d as f64).sum();
            let pick = if total > 0.0 {
                let threshold = rng.random::<f64>() * total;
                let mut cumulative = 0.0f64;
                nearest
                    .iter()
                    .position(|&d| {
                        cumulative += d as f64;
                        cumulative >= threshold
                    })
                    .unwrap_or(n - 1)
            } else {
                // All points coincide with a centroid already.
                rng.random_range(0..n)
            };
            centroids.extend_from_slice(&data[pick * dim..(pick + 1) * dim]);

            let newest = &centroids[c * dim..(c + 1) * dim];
            for (d, v) in nearest.iter_mut().zip(data.chunks_exact(dim)) {
                *d = d.min(l2_squared(v, newest));
            }
        }

        centroids
    }

    fn update_centroids(&self, data: &[f32], assignments: &[usize], centroids: &mut [f32]) {
        let dim = self.dimension;
        let mut sums = vec![0.0f64; self.k * dim];
        let mut counts = vec![0usize; self.k];

        for (v, &cluster) in data.chunks_exact(dim).zip(assignments) {
            counts[cluster] += 1;
            for (s, &x) in sums[cluster * dim..(cluster + 1) * dim].iter_mut().zip(v) {
                *s += x as f64;
            }
        }

        for (cluster, &count) in counts.iter().enumerate() {
            // Empty clusters keep their previous centroid.
            if count == 0 {
                continue;
            }
            let target = &mut centroids[cluster * dim..(cluster + 1) * dim];
            for (c, &s) in target.iter_mut().zip(&sums[cluster * dim..(cluster + 1) * dim]) {
                *c = (s / count as f64) as f32;
            }
        }
    }
}

/// Index of the nearest centroid for one vector.
pub(crate) fn nearest_centroid(vector: &[f32], centroids: &[f32], dimension: usize) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, centroid) in centroids.chunks_exact(dimension).enumerate() {
        let d = l2_squared(vector, centroid);
        if d < best_distance {
            best_distance = d;
            best = i;
        }
    }
    best
}

/// Nearest centroid for every row of `data`.
pub(crate) fn assign(data: &[f32], dimension: usize, centroids: &[f32]) -> Vec<usize> {
    data.par_chunks_exact(dimension)
        .map(|v| nearest_centroid(v, centroids, dimension))
        .collect()
}
