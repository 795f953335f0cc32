//! Persistence layer for annvault.
//!
//! An index is saved as one self-contained, gzip-compressed artifact file
//! (layout in [`schema`]). This module converts between a live
//! [`Indexer`] and artifact bytes, and moves those bytes to and from disk
//! without ever leaving a half-written file at the target path.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  encode   ┌───────────────┐ encode_parts ┌──────────┐
//! │   Indexer    │ ────────▶ │ ArtifactParts │ ───────────▶ │ gzip     │
//! │ (core + map) │ ◀──────── │ header/core/  │ ◀─────────── │ bytes    │
//! └──────────────┘  decode   │ keys          │ decode_parts └──────────┘
//!                            └───────────────┘                  │
//!                                                  write_artifact ▼ read_artifact
//!                                                          ┌───────────┐
//!                                                          │   file    │
//!                                                          └───────────┘
//! ```
//!
//! The same module reads and writes training files: gzip streams of
//! little-endian `f32` rows with no header.

pub mod codec;
pub mod schema;

pub use codec::{decode_parts, encode_parts, ArtifactParts};
pub use schema::{ArtifactHeader, FORMAT_VERSION, MAGIC};

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::config::CompressionLevel;
use crate::error::{Result, TrainingError, ValidationError};
use crate::indexer::Indexer;
use crate::types::Matrix;

/// First two bytes of every gzip member.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Encodes a complete index into artifact bytes.
///
/// The core's own state, the key map and a header are written together;
/// nothing else is needed to reopen the index.
pub fn encode(indexer: &Indexer, level: CompressionLevel) -> Result<Vec<u8>> {
    let parts = indexer.artifact_parts(level)?;
    encode_parts(&parts, level)
}

/// Decodes artifact bytes into a ready-to-query index.
///
/// # Errors
///
/// Returns `StorageError::CorruptArtifact` for truncated or malformed
/// input and `StorageError::VersionMismatch` for another format version.
pub fn decode(bytes: &[u8]) -> Result<Indexer> {
    let parts = decode_parts(bytes)?;
    Indexer::from_artifact_parts(parts)
}

/// Writes `bytes` to `path` atomically.
///
/// The data goes to a temporary file in the target directory, is synced,
/// then renamed over `path`. On failure the previous file at `path`, if
/// any, is untouched and the temporary file is removed.
#[instrument(skip(bytes), fields(path = %path.display(), len = bytes.len()))]
pub fn write_artifact(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    debug!("Artifact written");
    Ok(())
}

/// Reads and decodes the artifact at `path`.
pub fn read_artifact(path: &Path) -> Result<Indexer> {
    let bytes = fs::read(path)?;
    decode(&bytes)
}

/// Reads a training file of `dimension`-wide `f32` rows.
///
/// gzip input is decompressed; input without the gzip magic is taken as
/// raw little-endian floats.
///
/// # Errors
///
/// - `Io` if the file cannot be read
/// - `MalformedTrainingFile` if the gzip stream is invalid or the byte
///   count is not a whole number of rows
pub fn read_training_file(path: &Path, dimension: usize) -> Result<Matrix<f32>> {
    if dimension == 0 {
        return Err(ValidationError::invalid_field("dimension", "must be greater than 0").into());
    }

    let raw = fs::read(path)?;
    let bytes = if raw.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::new();
        GzDecoder::new(raw.as_slice())
            .read_to_end(&mut out)
            .map_err(|e| TrainingError::malformed(path, format!("gzip stream: {}", e)))?;
        out
    } else {
        raw
    };

    let row_bytes = dimension * 4;
    if bytes.len() % row_bytes != 0 {
        return Err(TrainingError::malformed(
            path,
            format!(
                "{} bytes is not a multiple of {} ({} floats per row)",
                bytes.len(),
                row_bytes,
                dimension
            ),
        )
        .into());
    }

    let data: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    debug!(rows = data.len() / dimension, dimension, "Training file read");
    Matrix::new(data, dimension)
}

/// Writes `vectors` as a gzip training file, atomically.
pub fn write_training_file(
    path: &Path,
    vectors: &Matrix<f32>,
    level: CompressionLevel,
) -> Result<()> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(vectors.as_slice().len() * 4), level.into());
    for value in vectors.as_slice() {
        encoder.write_all(&value.to_le_bytes())?;
    }
    write_artifact(path, &encoder.finish()?)
}
