//! Training coordination.
//!
//! Decides, once per `Indexer::open`, whether the index core must be
//! calibrated and where the calibration vectors come from:
//!
//! 1. The spec needs no calibration: the source is ignored, not even read.
//! 2. Explicit vectors (inline, or decoded from a training file): train on
//!    them.
//! 3. An existing, non-empty artifact: reconstruct every vector stored in
//!    it and train on those. Its key map is discarded.
//! 4. Anything else: stay untrained until `Indexer::train` is called.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::error::{IndexerError, Result};
use crate::storage;
use crate::types::Matrix;
use crate::vector::IndexSpec;

/// Where calibration vectors come from.
///
/// Only consulted while opening; it is never persisted.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum TrainingSource {
    /// No training data.
    #[default]
    None,

    /// An in-memory batch.
    Vectors(Matrix<f32>),

    /// A training file of little-endian `f32` rows, gzip or raw. The row
    /// width is the configured dimension.
    File(PathBuf),

    /// A previously saved artifact whose stored vectors become the
    /// training set. A missing or empty file means "no training data".
    Artifact(PathBuf),
}

impl TrainingSource {
    /// Returns true if no source was given.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Outcome of resolving a [`TrainingSource`] against a spec.
#[derive(Debug)]
pub(crate) enum TrainingPlan {
    /// The structure is usable without calibration.
    NotRequired,
    /// Calibrate on this batch.
    Train(Matrix<f32>),
    /// No usable data; the index opens untrained.
    Deferred,
}

/// Applies the training policy.
///
/// # Errors
///
/// - `Config` if a training file is given without a dimension
/// - `Io` / `MalformedTrainingFile` if a training file cannot be read
/// - any decode error of an existing training artifact
pub(crate) fn resolve(
    spec: &IndexSpec,
    source: TrainingSource,
    dimension: Option<usize>,
) -> Result<TrainingPlan> {
    if !spec.needs_training() {
        if !source.is_none() {
            debug!(index_key = %spec, "Index needs no training, ignoring training source");
        }
        return Ok(TrainingPlan::NotRequired);
    }

    match source {
        TrainingSource::None => Ok(TrainingPlan::Deferred),

        TrainingSource::Vectors(vectors) => Ok(TrainingPlan::Train(vectors)),

        TrainingSource::File(path) => {
            let dimension = dimension.ok_or_else(|| {
                IndexerError::config("a training file needs `dimension` to be set")
            })?;
            let vectors = storage::read_training_file(&path, dimension)?;
            Ok(TrainingPlan::Train(vectors))
        }

        TrainingSource::Artifact(path) => {
            let usable = fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);
            if !usable {
                info!(path = %path.display(), "No training artifact yet, opening untrained");
                return Ok(TrainingPlan::Deferred);
            }

            let donor = storage::read_artifact(&path)?;
            if donor.spec() != spec {
                warn!(
                    path = %path.display(),
                    stored = %donor.spec(),
                    requested = %spec,
                    "Training artifact was built with a different index layout"
                );
            }
            let vectors = donor.stored_vectors()?;
            if vectors.is_empty() {
                info!(path = %path.display(), "Training artifact holds no vectors, opening untrained");
                return Ok(TrainingPlan::Deferred);
            }
            info!(
                path = %path.display(),
                vectors = vectors.rows(),
                "Training from stored artifact"
            );
            Ok(TrainingPlan::Train(vectors))
        }
    }
}
