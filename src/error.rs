//! Error types for annvault.
//!
//! annvault uses a hierarchical error system:
//! - `IndexerError` is the top-level error returned by all public APIs
//! - Specific error types (`ValidationError`, `TrainingError`,
//!   `NotFoundError`, `StorageError`) provide detail
//!
//! # Error Handling Pattern
//! ```rust,ignore
//! use annvault::{Indexer, IndexerConfig, Result};
//!
//! fn example() -> Result<()> {
//!     let mut indexer = Indexer::open(IndexerConfig::new("Flat"))?;
//!     // ... operations that may fail ...
//!     indexer.close()?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{ExternalKey, InternalId};

/// Result type alias for annvault operations.
pub type Result<T> = std::result::Result<T, IndexerError>;

/// Top-level error enum for all annvault operations.
///
/// This is the only error type returned by public APIs.
/// Use pattern matching or the `is_*` predicates to handle specific cases.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Input validation error (shapes, dimensions, parameters).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Training lifecycle error.
    #[error("Training error: {0}")]
    Training(#[from] TrainingError),

    /// Requested key or id not found.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// Persisted artifact error (corruption, version, serialization).
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of what's wrong with the configuration.
        reason: String,
    },

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Vector index core error (training, insertion, search).
    #[error("Vector index error: {0}")]
    Vector(String),
}

impl IndexerError {
    /// Creates a configuration error with the given reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Creates a vector index error with the given message.
    pub fn vector(msg: impl Into<String>) -> Self {
        Self::Vector(msg.into())
    }

    /// Creates a corrupt artifact error with the given message.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Storage(StorageError::corrupt(msg))
    }

    /// Returns true if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if the persisted artifact was truncated or malformed.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Storage(StorageError::CorruptArtifact(_)))
    }

    /// Returns true if a mutation was attempted before required training.
    pub fn is_untrained(&self) -> bool {
        matches!(self, Self::Training(TrainingError::Untrained { .. }))
    }

    /// Returns true if a second training pass was attempted.
    pub fn is_already_trained(&self) -> bool {
        matches!(self, Self::Training(TrainingError::AlreadyTrained))
    }

    /// Returns true if this is a vector index core error.
    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector(_))
    }

    /// Returns true if this is an I/O error.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Validation errors for input data.
///
/// These errors indicate problems with data provided by the caller.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Vector width doesn't match the index's fixed dimension.
    #[error("Vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension fixed by the first training or insertion batch.
        expected: usize,
        /// Actual dimension provided.
        got: usize,
    },

    /// Number of keys doesn't match number of vector rows.
    #[error("Length mismatch: {keys} keys for {vectors} vectors")]
    LengthMismatch {
        /// Number of external keys supplied.
        keys: usize,
        /// Number of vector rows supplied.
        vectors: usize,
    },

    /// A field has an invalid value.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// The structural spec string could not be parsed.
    #[error("Invalid index key '{key}': {reason}")]
    InvalidIndexKey {
        /// The rejected structural spec.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ValidationError {
    /// Creates a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }

    /// Creates a length mismatch error.
    pub fn length_mismatch(keys: usize, vectors: usize) -> Self {
        Self::LengthMismatch { keys, vectors }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid index key error.
    pub fn invalid_index_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIndexKey {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Training lifecycle errors.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// The index structure requires calibration that has not happened yet.
    #[error("Index '{index_key}' must be trained before vectors can be added")]
    Untrained {
        /// Structural spec of the untrained index.
        index_key: String,
    },

    /// Training was already performed in this session.
    #[error("Index is already trained")]
    AlreadyTrained,

    /// A training file could not be interpreted as f32 rows.
    #[error("Malformed training file {path}: {reason}")]
    MalformedTrainingFile {
        /// Path of the training file.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },
}

impl TrainingError {
    /// Creates an untrained index error.
    pub fn untrained(index_key: impl Into<String>) -> Self {
        Self::Untrained {
            index_key: index_key.into(),
        }
    }

    /// Creates a malformed training file error.
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedTrainingFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Not found errors for keys and ids.
#[derive(Debug, Error)]
pub enum NotFoundError {
    /// External key was never assigned.
    #[error("External key not found: {0}")]
    ExternalKey(ExternalKey),

    /// Internal id is outside the known range.
    #[error("Internal id not found: {0}")]
    InternalId(InternalId),
}

impl NotFoundError {
    /// Creates an external key not found error.
    pub fn external_key(key: ExternalKey) -> Self {
        Self::ExternalKey(key)
    }

    /// Creates an internal id not found error.
    pub fn internal_id(id: InternalId) -> Self {
        Self::InternalId(id)
    }
}

/// Persisted artifact errors.
///
/// These errors indicate problems reading or writing the on-disk artifact.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Artifact is truncated or malformed.
    #[error("Corrupt artifact: {0}")]
    CorruptArtifact(String),

    /// Artifact format version doesn't match this build.
    #[error("Artifact format version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Format version this build writes.
        expected: u32,
        /// Format version found in the artifact.
        found: u32,
    },

    /// Serialization error while encoding.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Creates a corrupt artifact error with the given message.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptArtifact(msg.into())
    }

    /// Creates a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for IndexerError {
    fn from(err: bincode::Error) -> Self {
        IndexerError::Storage(StorageError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexerError::config("compression level out of range");
        assert_eq!(
            err.to_string(),
            "Configuration error: compression level out of range"
        );
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::VersionMismatch {
            expected: 1,
            found: 7,
        };
        assert_eq!(
            err.to_string(),
            "Artifact format version mismatch: expected 1, found 7"
        );
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::dimension_mismatch(3, 4);
        assert_eq!(err.to_string(), "Vector dimension mismatch: expected 3, got 4");

        let err = ValidationError::length_mismatch(2, 5);
        assert_eq!(err.to_string(), "Length mismatch: 2 keys for 5 vectors");
    }

    #[test]
    fn test_not_found_error_display() {
        let err = NotFoundError::external_key(-42);
        assert_eq!(err.to_string(), "External key not found: -42");
    }

    #[test]
    fn test_training_predicates() {
        let err: IndexerError = TrainingError::untrained("IVF10,PQ2").into();
        assert!(err.is_untrained());
        assert!(!err.is_already_trained());

        let err: IndexerError = TrainingError::AlreadyTrained.into();
        assert!(err.is_already_trained());
    }

    #[test]
    fn test_is_corrupt() {
        let err = IndexerError::corrupt("bad magic");
        assert!(err.is_corrupt());
        assert!(err.is_storage());
        assert!(!err.is_not_found());

        let err: IndexerError = StorageError::VersionMismatch {
            expected: 1,
            found: 2,
        }
        .into();
        assert!(err.is_storage());
        assert!(!err.is_corrupt());
    }

    #[test]
    fn test_vector_error_display() {
        let err = IndexerError::vector("k-means needs more points");
        assert_eq!(err.to_string(), "Vector index error: k-means needs more points");
        assert!(err.is_vector());
        assert!(!err.is_storage());
    }

    #[test]
    fn test_error_conversion_chain() {
        fn inner() -> Result<()> {
            Err(StorageError::corrupt("truncated header"))?
        }

        let result = inner();
        assert!(result.is_err());
        assert!(result.unwrap_err().is_corrupt());
    }
}
