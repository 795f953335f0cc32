//! Core type definitions: identifiers, dense matrices, timestamps.
//!
//! Vectors travel through the public API as row-major [`Matrix`] values.
//! A matrix is one contiguous `Vec<T>` plus its shape, which is exactly
//! the layout the index backends and the training file format use.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, ValidationError};

/// Caller-chosen key attached to each vector.
///
/// Keys are not required to be dense, sorted or unique.
pub type ExternalKey = i64;

/// Dense, zero-based, insertion-ordered id used by the index core.
pub type InternalId = usize;

/// Key written into result slots that have no neighbor.
pub const MISSING_KEY: ExternalKey = -1;

/// Distance written into result slots that have no neighbor.
pub const MISSING_DISTANCE: f32 = f32::INFINITY;

/// Row-major dense matrix.
///
/// # Example
/// ```
/// use annvault::Matrix;
///
/// let m = Matrix::from_rows(&[[1.0f32, 2.0], [3.0, 4.0]]).unwrap();
/// assert_eq!(m.rows(), 2);
/// assert_eq!(m.cols(), 2);
/// assert_eq!(m.row(1), &[3.0, 4.0]);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Matrix<T> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T: Copy> Matrix<T> {
    /// Wraps a flat row-major buffer with `cols` values per row.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidField` if `cols` is zero or the
    /// buffer length is not a multiple of `cols`.
    pub fn new(data: Vec<T>, cols: usize) -> Result<Self> {
        if cols == 0 {
            return Err(ValidationError::invalid_field("cols", "must be greater than 0").into());
        }
        if data.len() % cols != 0 {
            return Err(ValidationError::invalid_field(
                "data",
                format!("length {} is not a multiple of {} columns", data.len(), cols),
            )
            .into());
        }
        Ok(Self {
            rows: data.len() / cols,
            data,
            cols,
        })
    }

    /// Builds a matrix from equally sized rows.
    ///
    /// An empty slice yields a `0 x 0` matrix.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DimensionMismatch` if any row's width
    /// differs from the first row's.
    pub fn from_rows<R: AsRef<[T]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(ValidationError::dimension_mismatch(cols, row.len()).into());
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: rows.len(),
            cols,
        })
    }

    /// Creates a `rows x cols` matrix with every cell set to `value`.
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            data: vec![value; rows * cols],
            rows,
            cols,
        }
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (the vector dimension for vector batches).
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns true if the matrix has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Returns row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.rows()`.
    #[inline]
    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Returns a mutable view of row `i`.
    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [T] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Returns the cell at (`row`, `col`), or `None` when out of range.
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Iterates over rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        (0..self.rows).map(move |i| self.row(i))
    }

    /// Flat row-major view of the data.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Consumes the matrix, returning the flat row-major buffer.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Copies the matrix into a vector of rows.
    pub fn to_rows(&self) -> Vec<Vec<T>> {
        self.iter_rows().map(<[T]>::to_vec).collect()
    }
}

/// Output of a top-k query.
///
/// Both matrices are shaped `(num_queries, top_k)`. Row `i` holds the
/// neighbors of query `i` by ascending distance; slots without a neighbor
/// hold [`MISSING_KEY`] and [`MISSING_DISTANCE`].
#[derive(Clone, Debug, PartialEq)]
pub struct SearchResults {
    /// External keys of the neighbors.
    pub ids: Matrix<ExternalKey>,
    /// Squared Euclidean distances of the neighbors.
    pub distances: Matrix<f32>,
}

impl SearchResults {
    /// Number of query rows.
    pub fn num_queries(&self) -> usize {
        self.ids.rows()
    }

    /// Requested number of neighbors per row.
    pub fn top_k(&self) -> usize {
        self.ids.cols()
    }
}

/// Unix timestamp in milliseconds.
///
/// Using i64 allows representing dates far into the future and past.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    ///
    /// If the system clock is before the Unix epoch (should never happen
    /// in practice), returns a timestamp of 0 (epoch) rather than panicking.
    #[inline]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }

    /// Creates a timestamp from Unix milliseconds.
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as Unix milliseconds.
    #[inline]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
