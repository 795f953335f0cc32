//! Structural spec parsing.
//!
//! An index key selects the backend and its parameters, in the
//! comma-separated style of index factories:
//!
//! | key            | backend                             | training |
//! |----------------|-------------------------------------|----------|
//! | `Flat`         | exact scan                          | no       |
//! | `HNSW32`       | HNSW graph, 32 links per node       | no       |
//! | `IVF100,Flat`  | 100 k-means lists, raw vectors      | yes      |
//! | `IVF100,PQ8`   | 100 k-means lists, 8-byte PQ codes  | yes      |
//! | `PQ8`          | 8-byte PQ codes, full scan          | yes      |
//!
//! Keys are case-insensitive and surrounding whitespace is ignored.

use std::fmt;
use std::str::FromStr;

use crate::error::{IndexerError, ValidationError};

/// Links per node when `HNSW` is given without a number.
pub const DEFAULT_HNSW_M: usize = 32;

/// Largest link count hnsw_rs accepts.
pub const MAX_HNSW_M: usize = 256;

/// Parsed structural spec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexSpec {
    /// Exact brute-force scan.
    Flat,

    /// HNSW graph with `m` links per node.
    Hnsw {
        /// Maximum links per node.
        m: usize,
    },

    /// Inverted lists over raw vectors.
    IvfFlat {
        /// Number of k-means lists.
        nlist: usize,
    },

    /// Inverted lists over product-quantized residuals.
    IvfPq {
        /// Number of k-means lists.
        nlist: usize,
        /// Number of sub-quantizers (code bytes per vector).
        m: usize,
    },

    /// Product quantization with a full scan over codes.
    Pq {
        /// Number of sub-quantizers (code bytes per vector).
        m: usize,
    },
}

impl IndexSpec {
    /// Parses an index key.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidIndexKey` for unknown layouts or
    /// zero-valued parameters, or for an HNSW link count outside `2..=256`.
    pub fn parse(key: &str) -> Result<Self, ValidationError> {
        let normalized = key.trim().to_ascii_uppercase();
        let parts: Vec<&str> = normalized.split(',').map(str::trim).collect();
        let invalid = |reason: &str| ValidationError::invalid_index_key(key, reason);

        match parts.as_slice() {
            ["FLAT"] => Ok(Self::Flat),
            [single] if single.starts_with("HNSW") => {
                let m = match &single["HNSW".len()..] {
                    "" => DEFAULT_HNSW_M,
                    digits => parse_count(digits).ok_or_else(|| invalid("bad HNSW link count"))?,
                };
                if m < 2 {
                    return Err(invalid("HNSW needs at least 2 links per node"));
                }
                if m > MAX_HNSW_M {
                    return Err(invalid("HNSW allows at most 256 links per node"));
                }
                Ok(Self::Hnsw { m })
            }
            [single] if single.starts_with("PQ") => {
                let m = parse_suffix(single, "PQ").ok_or_else(|| invalid("bad PQ size"))?;
                Ok(Self::Pq { m })
            }
            [coarse, fine] if coarse.starts_with("IVF") => {
                let nlist = parse_suffix(coarse, "IVF").ok_or_else(|| invalid("bad IVF list count"))?;
                if *fine == "FLAT" {
                    Ok(Self::IvfFlat { nlist })
                } else if fine.starts_with("PQ") {
                    let m = parse_suffix(fine, "PQ").ok_or_else(|| invalid("bad PQ size"))?;
                    Ok(Self::IvfPq { nlist, m })
                } else {
                    Err(invalid("IVF must be followed by Flat or PQ<m>"))
                }
            }
            _ => Err(invalid("unrecognized index layout")),
        }
    }

    /// Returns true if the structure must be calibrated before insertion.
    pub fn needs_training(&self) -> bool {
        matches!(
            self,
            Self::IvfFlat { .. } | Self::IvfPq { .. } | Self::Pq { .. }
        )
    }

    /// Returns true if the structure stores vectors losslessly.
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Flat | Self::Hnsw { .. } | Self::IvfFlat { .. })
    }

    /// Number of PQ sub-quantizers, if the structure uses PQ.
    pub fn pq_subquantizers(&self) -> Option<usize> {
        match self {
            Self::IvfPq { m, .. } | Self::Pq { m } => Some(*m),
            _ => None,
        }
    }

    /// Checks parameters that depend on the vector dimension.
    pub fn check_dimension(&self, dimension: usize) -> Result<(), ValidationError> {
        if let Some(m) = self.pq_subquantizers() {
            if dimension % m != 0 {
                return Err(ValidationError::invalid_field(
                    "dimension",
                    format!("{} is not divisible by PQ{}", dimension, m),
                ));
            }
        }
        Ok(())
    }
}

fn parse_count(digits: &str) -> Option<usize> {
    digits.parse::<usize>().ok().filter(|&n| n > 0)
}

fn parse_suffix(token: &str, prefix: &str) -> Option<usize> {
    token.strip_prefix(prefix).and_then(parse_count)
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat => write!(f, "Flat"),
            Self::Hnsw { m } => write!(f, "HNSW{}", m),
            Self::IvfFlat { nlist } => write!(f, "IVF{},Flat", nlist),
            Self::IvfPq { nlist, m } => write!(f, "IVF{},PQ{}", nlist, m),
            Self::Pq { m } => write!(f, "PQ{}", m),
        }
    }
}

impl FromStr for IndexSpec {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).map_err(IndexerError::from)
    }
}
