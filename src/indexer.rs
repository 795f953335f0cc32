//! Indexer handle and lifecycle operations.
//!
//! The [`Indexer`] struct is the primary interface of annvault. It
//! provides methods for:
//!
//! - Opening an index (running the training policy) and closing it
//! - Adding keyed vector batches
//! - Top-k search and reconstruction by key
//! - Saving to and loading from a single artifact file
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use annvault::{Indexer, IndexerConfig, Matrix};
//!
//! let mut index = Indexer::open(IndexerConfig::new("Flat"))?;
//!
//! let vectors = Matrix::from_rows(&[[1.0f32, 1.0, 1.0], [10.0, 10.0, 10.0]])?;
//! index.add(&[7, 8], &vectors)?;
//!
//! let results = index.query(&vectors, 1)?;
//! assert_eq!(results.ids.row(1), &[8]);
//!
//! index.save("./vectors.avlt")?;
//! index.close()?;
//! ```
//!
//! # Thread Safety
//!
//! `Indexer` is `Send + Sync`. Queries take `&self` and may run from many
//! threads through an `Arc`; mutations take `&mut self`, so a single
//! writer is enforced at compile time.

use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::config::{CompressionLevel, IndexerConfig, MAX_DIMENSION};
use crate::error::{IndexerError, Result, TrainingError, ValidationError};
use crate::keymap::KeyMap;
use crate::storage::{self, ArtifactHeader, ArtifactParts};
use crate::training::{self, TrainingPlan};
use crate::types::{
    ExternalKey, Matrix, SearchResults, Timestamp, MISSING_DISTANCE, MISSING_KEY,
};
use crate::vector::{build_index, restore_index, IndexSpec, VectorIndex};

/// An open vector index.
///
/// Create one with [`Indexer::open()`] or [`Indexer::load()`] and release
/// it with [`Indexer::close()`].
///
/// # Ownership
///
/// The handle owns its index core and key map. `close()` consumes it, so
/// a closed handle cannot be used again; dropping it without `close()`
/// releases the same resources.
pub struct Indexer {
    /// Configuration used to open this index.
    config: IndexerConfig,

    /// Parsed structural spec. Immutable for the handle's lifetime.
    spec: IndexSpec,

    /// Fixed by the configuration or by the first training/insertion batch.
    dimension: Option<usize>,

    /// Whether the core may accept vectors.
    trained: bool,

    /// External key ↔ internal id translation.
    key_map: KeyMap,

    /// Index core. Present exactly when `dimension` is known.
    core: Option<Box<dyn VectorIndex>>,
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("spec", &self.spec)
            .field("dimension", &self.dimension)
            .field("trained", &self.trained)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Indexer {
    /// Opens a fresh index and applies the training policy.
    ///
    /// The training source in `config` is consumed here; the stored
    /// configuration keeps [`TrainingSource::None`](crate::TrainingSource::None).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration is invalid (see [`IndexerConfig::validate`])
    /// - The training source cannot be read
    /// - Training itself fails (for example too few vectors)
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use annvault::{Indexer, IndexerConfig, TrainingSource};
    ///
    /// let config = IndexerConfig::new("IVF10,PQ2")
    ///     .with_training(TrainingSource::Artifact("./vectors.avlt".into()));
    /// let index = Indexer::open(config)?;
    /// ```
    #[instrument(skip(config), fields(index_key = %config.index_key))]
    pub fn open(mut config: IndexerConfig) -> Result<Self> {
        // Validate configuration first
        config.validate()?;
        let spec = config.spec()?;
        let source = std::mem::take(&mut config.training);

        info!("Opening index");

        let plan = training::resolve(&spec, source, config.dimension)?;

        let core = match config.dimension {
            Some(dimension) => Some(build_index(&spec, dimension, &config)?),
            None => None,
        };

        let mut indexer = Self {
            dimension: config.dimension,
            trained: !spec.needs_training(),
            key_map: KeyMap::new(),
            core,
            spec,
            config,
        };

        match plan {
            TrainingPlan::NotRequired => {}
            TrainingPlan::Train(vectors) => indexer.train(&vectors)?,
            TrainingPlan::Deferred => {
                info!("No training data, index opens untrained");
            }
        }

        info!(
            spec = %indexer.spec,
            dimension = ?indexer.dimension,
            trained = indexer.trained,
            "Index opened"
        );
        Ok(indexer)
    }

    /// Loads a previously saved index. Training is not re-run.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, or a storage error if it
    /// is not a valid artifact.
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let indexer = storage::read_artifact(path.as_ref())?;
        info!(
            spec = %indexer.spec,
            vectors = indexer.len(),
            "Index loaded"
        );
        Ok(indexer)
    }

    /// Calibrates an untrained index on `vectors`.
    ///
    /// Fixes the dimension if it was not known yet. Nothing changes if
    /// training fails.
    ///
    /// # Errors
    ///
    /// - `AlreadyTrained` if calibration already happened, including the
    ///   implicit calibration of specs that need none
    /// - `DimensionMismatch` if the batch width disagrees with the index
    /// - `InvalidField` if the batch would fix a width above `MAX_DIMENSION`
    /// - `Vector` if the batch is empty or the core rejects it
    #[instrument(skip(self, vectors), fields(rows = vectors.rows(), cols = vectors.cols()))]
    pub fn train(&mut self, vectors: &Matrix<f32>) -> Result<()> {
        if self.trained {
            return Err(TrainingError::AlreadyTrained.into());
        }
        if vectors.is_empty() {
            return Err(IndexerError::vector("training set is empty"));
        }
        let dimension = vectors.cols();
        self.check_dimension(dimension)?;

        match self.core.as_mut() {
            Some(core) => core.train(vectors)?,
            None => {
                let mut core = build_index(&self.spec, dimension, &self.config)?;
                core.train(vectors)?;
                self.core = Some(core);
                self.dimension = Some(dimension);
            }
        }

        self.trained = true;
        info!(spec = %self.spec, "Index trained");
        Ok(())
    }

    /// Adds a batch of keyed vectors.
    ///
    /// Row `i` of `vectors` is stored under `keys[i]`. Keys may repeat.
    /// The batch is all-or-nothing: on error neither the key map nor the
    /// core changes.
    ///
    /// # Errors
    ///
    /// - `LengthMismatch` if `keys.len() != vectors.rows()`
    /// - `Untrained` if the spec needs training that has not happened
    /// - `DimensionMismatch` if the width disagrees with the index
    /// - `InvalidField` if the batch would fix a width above `MAX_DIMENSION`
    pub fn add(&mut self, keys: &[ExternalKey], vectors: &Matrix<f32>) -> Result<()> {
        if keys.len() != vectors.rows() {
            return Err(ValidationError::length_mismatch(keys.len(), vectors.rows()).into());
        }
        if vectors.is_empty() {
            return Ok(());
        }
        if !self.trained {
            return Err(TrainingError::untrained(self.spec.to_string()).into());
        }
        let dimension = vectors.cols();
        self.check_dimension(dimension)?;

        let (mut core, fresh) = match self.core.take() {
            Some(core) => (core, false),
            None => (build_index(&self.spec, dimension, &self.config)?, true),
        };

        let start = self.key_map.len();
        for &key in keys {
            self.key_map.assign(key);
        }

        match core.add(vectors) {
            Ok(()) => {
                debug_assert_eq!(core.len(), self.key_map.len());
                self.core = Some(core);
                self.dimension = Some(dimension);
                debug!(rows = vectors.rows(), total = self.key_map.len(), "Batch added");
                Ok(())
            }
            Err(e) => {
                self.key_map.truncate(start);
                if !fresh {
                    self.core = Some(core);
                }
                Err(e)
            }
        }
    }

    /// Finds the `top_k` nearest stored vectors for every query row.
    ///
    /// Both result matrices are `(queries.rows(), top_k)`. Slots beyond
    /// the available neighbors hold [`MISSING_KEY`] and
    /// [`MISSING_DISTANCE`]. Distances are squared Euclidean.
    ///
    /// # Errors
    ///
    /// - `InvalidField` if `top_k` is 0
    /// - `DimensionMismatch` if the query width disagrees with the index
    /// - `NotFound` if the core reports an id the key map does not know
    pub fn query(&self, queries: &Matrix<f32>, top_k: usize) -> Result<SearchResults> {
        if top_k == 0 {
            return Err(ValidationError::invalid_field("top_k", "must be greater than 0").into());
        }
        if !queries.is_empty() {
            self.check_dimension(queries.cols())?;
        }

        let mut ids = Matrix::filled(queries.rows(), top_k, MISSING_KEY);
        let mut distances = Matrix::filled(queries.rows(), top_k, MISSING_DISTANCE);

        let Some(core) = self.core.as_ref() else {
            return Ok(SearchResults { ids, distances });
        };

        let hits: Vec<Vec<(usize, f32)>> = (0..queries.rows())
            .into_par_iter()
            .map(|row| core.search(queries.row(row), top_k))
            .collect::<Result<_>>()?;

        for (row, row_hits) in hits.into_iter().enumerate() {
            let id_row = ids.row_mut(row);
            for (slot, &(internal_id, _)) in row_hits.iter().take(top_k).enumerate() {
                id_row[slot] = self.key_map.internal_to_external(internal_id)?;
            }
            let distance_row = distances.row_mut(row);
            for (slot, &(_, distance)) in row_hits.iter().take(top_k).enumerate() {
                distance_row[slot] = distance;
            }
        }

        Ok(SearchResults { ids, distances })
    }

    /// Returns the stored vector for each key, one row per key.
    ///
    /// A key inserted more than once resolves to its first insertion.
    /// Quantized specs return their reconstruction, not the original.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a key that was never added.
    pub fn query_by_id(&self, keys: &[ExternalKey]) -> Result<Matrix<f32>> {
        let Some(core) = self.core.as_ref() else {
            return match keys.first() {
                Some(&key) => Err(crate::NotFoundError::external_key(key).into()),
                None => Ok(Matrix::filled(0, 0, 0.0)),
            };
        };

        let dimension = core.dimension();
        let mut data = Vec::with_capacity(keys.len() * dimension);
        for &key in keys {
            let id = self.key_map.first_internal_id(key)?;
            data.extend(core.reconstruct(id)?);
        }
        if data.is_empty() {
            return Ok(Matrix::filled(0, dimension, 0.0));
        }
        Matrix::new(data, dimension)
    }

    /// Saves the index to `path`.
    ///
    /// The write is atomic: a crash or error leaves any previous file at
    /// `path` intact. Missing parent directories are created.
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let level = self.config.compression_level;
        let bytes = storage::encode(self, level)?;
        storage::write_artifact(path.as_ref(), &bytes)?;
        info!(
            vectors = self.len(),
            bytes = bytes.len(),
            level = level.level(),
            "Index saved"
        );
        Ok(())
    }

    /// Closes the index, releasing the core and key map.
    ///
    /// This method consumes the handle. After calling `close()`, the
    /// index cannot be used.
    #[instrument(skip(self))]
    pub fn close(mut self) -> Result<()> {
        info!("Closing index");
        self.release();
        info!("Index closed successfully");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the parsed structural spec.
    #[inline]
    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Returns the fixed vector dimension, if known.
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Returns true if the index can accept vectors.
    #[inline]
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Number of stored vectors.
    #[inline]
    pub fn len(&self) -> usize {
        self.key_map.len()
    }

    /// Returns true if no vectors are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.key_map.is_empty()
    }

    /// Returns the configuration this handle was opened with.
    ///
    /// For a loaded handle only the spec, dimension and compression level
    /// come from the artifact; other fields hold defaults.
    #[inline]
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Returns the key map.
    #[inline]
    pub fn key_map(&self) -> &KeyMap {
        &self.key_map
    }

    // =========================================================================
    // Crate-internal
    // =========================================================================

    fn check_dimension(&self, got: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != got => {
                Err(ValidationError::dimension_mismatch(expected, got).into())
            }
            _ => Ok(()),
        }
    }

    fn release(&mut self) {
        self.core = None;
        self.key_map = KeyMap::new();
    }

    /// Every stored vector in internal-id order, as reconstructed by the core.
    pub(crate) fn stored_vectors(&self) -> Result<Matrix<f32>> {
        let Some(core) = self.core.as_ref() else {
            return Ok(Matrix::filled(0, 0, 0.0));
        };
        let dimension = core.dimension();
        let mut data = Vec::with_capacity(core.len() * dimension);
        for id in 0..core.len() {
            data.extend(core.reconstruct(id)?);
        }
        if data.is_empty() {
            return Ok(Matrix::filled(0, dimension, 0.0));
        }
        Matrix::new(data, dimension)
    }

    pub(crate) fn artifact_parts(&self, level: CompressionLevel) -> Result<ArtifactParts> {
        let core = match self.core.as_ref() {
            Some(core) => core.to_bytes()?,
            None => Vec::new(),
        };
        Ok(ArtifactParts {
            header: ArtifactHeader {
                index_key: self.spec.to_string(),
                dimension: self.dimension,
                is_trained: self.trained,
                compression_level: level.level(),
                num_vectors: self.key_map.len() as u64,
                created_at: Timestamp::now(),
            },
            core,
            keys: self.key_map.keys().to_vec(),
        })
    }

    pub(crate) fn from_artifact_parts(parts: ArtifactParts) -> Result<Self> {
        let ArtifactParts { header, core, keys } = parts;

        let spec = IndexSpec::parse(&header.index_key)
            .map_err(|e| IndexerError::corrupt(format!("stored index key: {}", e)))?;
        let compression_level = CompressionLevel::new(header.compression_level)
            .map_err(|e| IndexerError::corrupt(format!("stored compression level: {}", e)))?;

        if let Some(dimension) = header.dimension {
            if dimension == 0 || dimension > MAX_DIMENSION {
                return Err(IndexerError::corrupt(format!(
                    "stored dimension {} is out of range",
                    dimension
                )));
            }
        }

        let core = match header.dimension {
            Some(dimension) => Some(restore_index(&spec, dimension, &core)?),
            None => None,
        };

        let core_len = core.as_ref().map_or(0, |c| c.len());
        if core_len != keys.len() {
            return Err(IndexerError::corrupt(format!(
                "core holds {} vectors but {} keys are stored",
                core_len,
                keys.len()
            )));
        }
        let core_trained = match core.as_ref() {
            Some(core) => core.is_trained(),
            None => !spec.needs_training(),
        };
        if core_trained != header.is_trained {
            return Err(IndexerError::corrupt(
                "header training state disagrees with the index core",
            ));
        }

        let config = IndexerConfig {
            index_key: spec.to_string(),
            dimension: header.dimension,
            compression_level,
            ..IndexerConfig::default()
        };

        Ok(Self {
            config,
            spec,
            dimension: header.dimension,
            trained: header.is_trained,
            key_map: KeyMap::from_keys(keys),
            core,
        })
    }
}

impl Drop for Indexer {
    fn drop(&mut self) {
        if self.core.is_some() || !self.key_map.is_empty() {
            debug!(vectors = self.key_map.len(), "Index dropped without close, releasing");
            self.release();
        }
    }
}
