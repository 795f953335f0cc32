//! # annvault
//!
//! Persistent approximate nearest neighbor index with external keys, a
//! training lifecycle and single-file compressed artifacts.
//!
//! annvault accepts batches of `(key, vector)` pairs, maintains a
//! searchable index structure, saves it to one gzip artifact and answers
//! top-k similarity queries, translating between caller keys and the
//! dense ids the index core uses.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use annvault::{Indexer, IndexerConfig, Matrix};
//!
//! // Open an exact index
//! let mut index = Indexer::open(IndexerConfig::new("Flat"))?;
//!
//! // Add keyed vectors
//! let vectors = Matrix::from_rows(&[[1.0f32, 1.0], [10.0, 10.0]])?;
//! index.add(&[100, 200], &vectors)?;
//!
//! // Search
//! let results = index.query(&vectors, 1)?;
//!
//! // Persist and clean up
//! index.save("./vectors.avlt")?;
//! index.close()?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Index spec
//!
//! A string such as `"Flat"`, `"HNSW32"`, `"IVF100,Flat"`, `"IVF100,PQ8"`
//! or `"PQ8"` selects the index structure (see [`IndexSpec`]). IVF and PQ
//! structures must be **trained** before vectors can be added.
//!
//! ### Keys
//!
//! Every vector carries a caller-chosen `i64` key. Keys need not be
//! unique; a repeated key maps to several stored vectors and
//! [`Indexer::query_by_id`] returns the first one.
//!
//! ### Training
//!
//! [`TrainingSource`] tells [`Indexer::open`] where calibration vectors
//! come from: an in-memory batch, a training file, or the vectors stored
//! in an existing artifact. Without a usable source the index opens
//! untrained and can be trained later with [`Indexer::train`].
//!
//! ## Features
//!
//! - `async` - `spawn_blocking` wrappers in [`nonblocking`]
//!
//! ## Thread Safety
//!
//! `Indexer` is `Send + Sync`. Queries take `&self`; mutation takes
//! `&mut self`.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod config;
mod error;
mod indexer;
mod keymap;
mod training;
mod types;

pub mod storage;

/// Vector index module: the index core trait and its backends.
pub mod vector;

/// Async wrappers that move blocking work off the runtime threads.
#[cfg(feature = "async")]
pub mod nonblocking;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main index interface
pub use indexer::Indexer;

// Configuration
pub use config::{
    CompressionLevel, HnswConfig, IndexerConfig, IvfConfig, MAX_DIMENSION, MAX_HNSW_ELEMENTS,
};

// Error handling
pub use error::{
    IndexerError, NotFoundError, Result, StorageError, TrainingError, ValidationError,
};

// Core types
pub use keymap::KeyMap;
pub use training::TrainingSource;
pub use types::{
    ExternalKey, InternalId, Matrix, SearchResults, Timestamp, MISSING_DISTANCE, MISSING_KEY,
};

// Index structures
pub use vector::{IndexSpec, VectorIndex};

// Storage (for advanced users)
pub use storage::{read_training_file, write_training_file, ArtifactHeader};

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common annvault usage.
///
/// ```rust
/// use annvault::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::IndexerConfig;
    pub use crate::error::{IndexerError, Result};
    pub use crate::indexer::Indexer;
    pub use crate::training::TrainingSource;
    pub use crate::types::{ExternalKey, Matrix, SearchResults, MISSING_DISTANCE, MISSING_KEY};
    pub use crate::vector::IndexSpec;
}
