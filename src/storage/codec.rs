//! Byte-level encoding of the artifact payload and its gzip envelope.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use super::schema::{ArtifactHeader, FORMAT_VERSION, MAGIC, MAX_HEADER_LEN};
use crate::config::CompressionLevel;
use crate::error::{IndexerError, Result, StorageError};
use crate::types::ExternalKey;

/// Decoded artifact sections, before the core is restored.
#[derive(Clone, Debug, PartialEq)]
pub struct ArtifactParts {
    /// Descriptive header.
    pub header: ArtifactHeader,
    /// Serialized index core; empty if the header has no dimension.
    pub core: Vec<u8>,
    /// External keys, index = internal id.
    pub keys: Vec<ExternalKey>,
}

/// Lays out the sections and gzips them.
pub fn encode_parts(parts: &ArtifactParts, level: CompressionLevel) -> Result<Vec<u8>> {
    let header = bincode::serialize(&parts.header)?;
    let header_len = u32::try_from(header.len())
        .ok()
        .filter(|&len| len <= MAX_HEADER_LEN)
        .ok_or_else(|| StorageError::serialization("artifact header too large"))?;

    let mut payload =
        Vec::with_capacity(24 + header.len() + parts.core.len() + parts.keys.len() * 8);
    payload.extend_from_slice(&MAGIC);
    payload.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    payload.extend_from_slice(&header_len.to_le_bytes());
    payload.extend_from_slice(&header);
    payload.extend_from_slice(&(parts.core.len() as u64).to_le_bytes());
    payload.extend_from_slice(&parts.core);
    payload.extend_from_slice(&(parts.keys.len() as u64).to_le_bytes());
    for key in &parts.keys {
        payload.extend_from_slice(&key.to_le_bytes());
    }

    let mut encoder = GzEncoder::new(Vec::new(), level.into());
    encoder.write_all(&payload)?;
    Ok(encoder.finish()?)
}

/// Gunzips and splits an artifact into its sections.
///
/// # Errors
///
/// - `CorruptArtifact` for invalid gzip, truncation, bad magic, section
///   overruns, trailing bytes or sections that disagree with the header
/// - `VersionMismatch` for an artifact written by another format version
pub fn decode_parts(bytes: &[u8]) -> Result<ArtifactParts> {
    let mut payload = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut payload)
        .map_err(|e| IndexerError::corrupt(format!("gzip stream: {}", e)))?;

    let mut reader = ByteReader::new(&payload);

    if reader.take(MAGIC.len(), "magic")? != MAGIC {
        return Err(IndexerError::corrupt("bad magic"));
    }

    let version = reader.u32("format version")?;
    if version != FORMAT_VERSION {
        return Err(StorageError::VersionMismatch {
            expected: FORMAT_VERSION,
            found: version,
        }
        .into());
    }

    let header_len = reader.u32("header length")?;
    if header_len > MAX_HEADER_LEN {
        return Err(IndexerError::corrupt(format!(
            "header length {} exceeds {}",
            header_len, MAX_HEADER_LEN
        )));
    }
    let header: ArtifactHeader = bincode::deserialize(reader.take(header_len as usize, "header")?)
        .map_err(|e| IndexerError::corrupt(format!("header: {}", e)))?;

    let core_len = reader.len_prefix("core length")?;
    let core = reader.take(core_len, "core")?.to_vec();

    let key_count = reader.len_prefix("key count")?;
    let key_bytes = key_count
        .checked_mul(8)
        .ok_or_else(|| IndexerError::corrupt("key count overflows"))?;
    let keys: Vec<ExternalKey> = reader
        .take(key_bytes, "keys")?
        .chunks_exact(8)
        .map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            ExternalKey::from_le_bytes(word)
        })
        .collect();

    if reader.remaining() != 0 {
        return Err(IndexerError::corrupt(format!(
            "{} trailing bytes after key section",
            reader.remaining()
        )));
    }

    if keys.len() as u64 != header.num_vectors {
        return Err(IndexerError::corrupt(format!(
            "header records {} vectors but {} keys are stored",
            header.num_vectors,
            keys.len()
        )));
    }
    if !header.has_core() && (!core.is_empty() || !keys.is_empty()) {
        return Err(IndexerError::corrupt(
            "artifact without a dimension carries index data",
        ));
    }

    Ok(ArtifactParts { header, core, keys })
}

/// Bounds-checked cursor over the decompressed payload.
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(IndexerError::corrupt(format!(
                "truncated {}: need {} bytes, {} left",
                what,
                n,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(4, what)?);
        Ok(u32::from_le_bytes(word))
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        let mut word = [0u8; 8];
        word.copy_from_slice(self.take(8, what)?);
        Ok(u64::from_le_bytes(word))
    }

    /// Reads a u64 length that must fit in the remaining payload.
    fn len_prefix(&mut self, what: &str) -> Result<usize> {
        let len = self.u64(what)?;
        usize::try_from(len)
            .ok()
            .filter(|&len| len <= self.remaining())
            .ok_or_else(|| {
                IndexerError::corrupt(format!(
                    "{} {} exceeds remaining {} bytes",
                    what,
                    len,
                    self.remaining()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;

    fn sample(keys: Vec<i64>) -> ArtifactParts {
        ArtifactParts {
            header: ArtifactHeader {
                index_key: "Flat".into(),
                dimension: Some(2),
                is_trained: true,
                compression_level: 1,
                num_vectors: keys.len() as u64,
                created_at: Timestamp::from_millis(0),
            },
            core: vec![9, 8, 7, 6],
            keys,
        }
    }

    fn gzip(payload: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::fast());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    fn gunzip(bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_roundtrip_every_level() {
        let parts = sample(vec![-5, 0, i64::MAX]);
        for level in 0..=9 {
            let bytes = encode_parts(&parts, CompressionLevel::new(level).unwrap()).unwrap();
            assert_eq!(decode_parts(&bytes).unwrap(), parts);
        }
    }

    #[test]
    fn test_rejects_non_gzip() {
        let err = decode_parts(b"definitely not gzip").unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let bytes = encode_parts(&sample(vec![1]), CompressionLevel::default()).unwrap();
        let mut payload = gunzip(&bytes);
        payload[0] = b'X';
        let err = decode_parts(&gzip(&payload)).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_rejects_other_version() {
        let bytes = encode_parts(&sample(vec![1]), CompressionLevel::default()).unwrap();
        let mut payload = gunzip(&bytes);
        payload[4..8].copy_from_slice(&7u32.to_le_bytes());
        let err = decode_parts(&gzip(&payload)).unwrap_err();
        assert!(matches!(
            err,
            IndexerError::Storage(StorageError::VersionMismatch {
                expected: FORMAT_VERSION,
                found: 7
            })
        ));
    }

    #[test]
    fn test_rejects_every_payload_truncation() {
        let bytes = encode_parts(&sample(vec![1, 2]), CompressionLevel::default()).unwrap();
        let payload = gunzip(&bytes);
        for cut in 0..payload.len() {
            let err = decode_parts(&gzip(&payload[..cut])).unwrap_err();
            assert!(err.is_corrupt(), "cut at {} gave {:?}", cut, err);
        }
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let bytes = encode_parts(&sample(vec![1]), CompressionLevel::default()).unwrap();
        let mut payload = gunzip(&bytes);
        payload.push(0);
        assert!(decode_parts(&gzip(&payload)).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_rejects_key_count_disagreeing_with_header() {
        let mut parts = sample(vec![1, 2]);
        parts.header.num_vectors = 3;
        let bytes = encode_parts(&parts, CompressionLevel::default()).unwrap();
        assert!(decode_parts(&bytes).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_rejects_truncated_gzip_stream() {
        let bytes = encode_parts(&sample(vec![1, 2]), CompressionLevel::default()).unwrap();
        let err = decode_parts(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(err.is_corrupt());
    }
}
