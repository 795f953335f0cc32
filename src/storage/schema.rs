//! Artifact layout definitions and versioning.
//!
//! A saved index is a single gzip member whose decompressed payload is:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ MAGIC            4 bytes   "AVLT"                            │
//! │ format_version   u32 LE                                      │
//! │ header_len       u32 LE                                      │
//! │ header           header_len bytes, bincode ArtifactHeader    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ core_len         u64 LE                                      │
//! │ core             core_len bytes, backend state (bincode)     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ key_count        u64 LE                                      │
//! │ keys             key_count × i64 LE, index = internal id     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Versioning
//!
//! The version word precedes the header, so a reader can refuse an
//! artifact from another format before attempting to parse it. There is
//! no migration; a mismatch is `StorageError::VersionMismatch`.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Current artifact format version.
///
/// Increment this when making breaking changes to the layout.
pub const FORMAT_VERSION: u32 = 1;

/// Leading bytes of every decompressed artifact.
pub const MAGIC: [u8; 4] = *b"AVLT";

/// Upper bound on the encoded header size.
pub const MAX_HEADER_LEN: u32 = 64 * 1024;

/// Descriptive metadata stored ahead of the index core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Canonical structural spec (e.g. `"IVF10,PQ2"`).
    pub index_key: String,

    /// Vector dimension, or `None` if nothing was ever trained or added.
    pub dimension: Option<usize>,

    /// Whether the index had been calibrated.
    pub is_trained: bool,

    /// gzip level the artifact was written with. Informational.
    pub compression_level: u32,

    /// Number of stored vectors; must equal the key count.
    pub num_vectors: u64,

    /// When the artifact was written.
    pub created_at: Timestamp,
}

impl ArtifactHeader {
    /// Returns true if this header describes a populated core.
    pub fn has_core(&self) -> bool {
        self.dimension.is_some()
    }
}
