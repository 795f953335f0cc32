//! Configuration types for annvault.
//!
//! The [`IndexerConfig`] struct controls index behavior including:
//! - The structural spec string (`"Flat"`, `"HNSW32"`, `"IVF10,PQ2"`, ...)
//! - Where training vectors come from
//! - Artifact compression level
//! - Backend tuning ([`IvfConfig`], [`HnswConfig`])
//!
//! # Example
//! ```rust
//! use annvault::{CompressionLevel, IndexerConfig};
//!
//! // Exact search with defaults
//! let config = IndexerConfig::default();
//!
//! // Quantized index, higher compression
//! let config = IndexerConfig {
//!     compression_level: CompressionLevel::new(6).unwrap(),
//!     ..IndexerConfig::new("IVF16,PQ4")
//! };
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{self, ValidationError};
use crate::training::TrainingSource;
use crate::vector::IndexSpec;

/// Largest vector dimension accepted.
pub const MAX_DIMENSION: usize = 65_536;

/// Largest HNSW capacity hint accepted. hnsw_rs reserves layer storage
/// for the whole hint up front.
pub const MAX_HNSW_ELEMENTS: usize = 50_000_000;

/// Index configuration options.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings:
///
/// ```rust
/// use annvault::IndexerConfig;
///
/// let config = IndexerConfig {
///     seed: 7,
///     ..IndexerConfig::new("IVF4,Flat")
/// };
/// ```
#[derive(Clone, Debug)]
pub struct IndexerConfig {
    /// Structural spec string, parsed by [`IndexSpec::parse`].
    ///
    /// Default: `"Flat"`
    pub index_key: String,

    /// Expected vector dimension, if known before the first batch.
    ///
    /// Required when training from a raw training file.
    pub dimension: Option<usize>,

    /// Where calibration vectors come from. Consumed by `Indexer::open`.
    pub training: TrainingSource,

    /// gzip level used by `save`.
    pub compression_level: CompressionLevel,

    /// Inverted-file and PQ tuning.
    pub ivf: IvfConfig,

    /// HNSW graph tuning.
    pub hnsw: HnswConfig,

    /// Seed for k-means initialization. Same seed and training set give
    /// the same trained structure.
    pub seed: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            index_key: "Flat".to_string(),
            dimension: None,
            training: TrainingSource::None,
            compression_level: CompressionLevel::default(),
            ivf: IvfConfig::default(),
            hnsw: HnswConfig::default(),
            seed: 42,
        }
    }
}

impl IndexerConfig {
    /// Creates a config for the given structural spec with defaults elsewhere.
    pub fn new(index_key: impl Into<String>) -> Self {
        Self {
            index_key: index_key.into(),
            ..Default::default()
        }
    }

    /// Sets the training source.
    pub fn with_training(mut self, training: TrainingSource) -> Self {
        self.training = training;
        self
    }

    /// Sets the expected vector dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Sets the artifact compression level.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `level > 9`.
    pub fn with_compression_level(mut self, level: u32) -> error::Result<Self> {
        self.compression_level = CompressionLevel::new(level)?;
        Ok(self)
    }

    /// Parses the configured structural spec.
    pub fn spec(&self) -> Result<IndexSpec, ValidationError> {
        IndexSpec::parse(&self.index_key)
    }

    /// Validates the configuration.
    ///
    /// Called automatically by `Indexer::open()`. You can also call this
    /// explicitly to check configuration before attempting to open.
    ///
    /// # Errors
    /// Returns `ValidationError` if:
    /// - `index_key` does not parse
    /// - `dimension` is 0, larger than [`MAX_DIMENSION`], or not divisible
    ///   by the PQ sub-quantizer count
    /// - a tuning parameter is 0 or out of range
    pub fn validate(&self) -> Result<(), ValidationError> {
        let spec = self.spec()?;

        if let Some(dimension) = self.dimension {
            if dimension == 0 {
                return Err(ValidationError::invalid_field(
                    "dimension",
                    "must be greater than 0",
                ));
            }
            if dimension > MAX_DIMENSION {
                return Err(ValidationError::invalid_field(
                    "dimension",
                    format!("must be <= {}", MAX_DIMENSION),
                ));
            }
            spec.check_dimension(dimension)?;
        }

        self.ivf.validate()?;
        self.hnsw.validate()?;
        Ok(())
    }
}

/// gzip compression level for saved artifacts, `0..=9`.
///
/// 0 stores without compression; 9 is smallest and slowest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct CompressionLevel(u32);

impl CompressionLevel {
    /// Highest accepted level.
    pub const MAX: u32 = 9;

    /// Creates a level, rejecting values above 9.
    pub fn new(level: u32) -> Result<Self, ValidationError> {
        if level > Self::MAX {
            return Err(ValidationError::invalid_field(
                "compression_level",
                format!("{} is outside 0..={}", level, Self::MAX),
            ));
        }
        Ok(Self(level))
    }

    /// Returns the numeric level.
    #[inline]
    pub const fn level(&self) -> u32 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u32> for CompressionLevel {
    type Error = ValidationError;

    fn try_from(level: u32) -> Result<Self, Self::Error> {
        Self::new(level)
    }
}

impl From<CompressionLevel> for u32 {
    fn from(level: CompressionLevel) -> Self {
        level.0
    }
}

impl From<CompressionLevel> for flate2::Compression {
    fn from(level: CompressionLevel) -> Self {
        flate2::Compression::new(level.0)
    }
}

/// Inverted-file and product-quantizer tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IvfConfig {
    /// Lists scanned per query. Capped at the list count.
    ///
    /// Default: 8
    pub nprobe: usize,

    /// Upper bound on k-means iterations, for both coarse centroids and
    /// PQ codebooks.
    ///
    /// Default: 25
    pub max_iterations: usize,
}

impl Default for IvfConfig {
    fn default() -> Self {
        Self {
            nprobe: 8,
            max_iterations: 25,
        }
    }
}

impl IvfConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.nprobe == 0 {
            return Err(ValidationError::invalid_field(
                "ivf.nprobe",
                "must be greater than 0",
            ));
        }
        if self.max_iterations == 0 {
            return Err(ValidationError::invalid_field(
                "ivf.max_iterations",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// HNSW graph tuning. The link count comes from the spec (`HNSW{m}`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Candidate list size while building the graph.
    ///
    /// Default: 200
    pub ef_construction: usize,

    /// Candidate list size while searching. Raised to `k` when smaller.
    ///
    /// Default: 64
    pub ef_search: usize,

    /// Maximum number of graph layers. hnsw_rs caps this at 16.
    ///
    /// Default: 16
    pub max_layer: usize,

    /// Capacity hint for the graph, at most [`MAX_HNSW_ELEMENTS`].
    ///
    /// Default: 100 000
    pub max_elements: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            ef_construction: 200,
            ef_search: 64,
            max_layer: 16,
            max_elements: 100_000,
        }
    }
}

impl HnswConfig {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.ef_construction == 0 || self.ef_search == 0 || self.max_elements == 0 {
            return Err(ValidationError::invalid_field(
                "hnsw",
                "ef_construction, ef_search and max_elements must be greater than 0",
            ));
        }
        if self.max_elements > MAX_HNSW_ELEMENTS {
            return Err(ValidationError::invalid_field(
                "hnsw.max_elements",
                format!("must be <= {}", MAX_HNSW_ELEMENTS),
            ));
        }
        if self.max_layer == 0 || self.max_layer > 16 {
            return Err(ValidationError::invalid_field(
                "hnsw.max_layer",
                "must be in 1..=16",
            ));
        }
        Ok(())
    }
}
