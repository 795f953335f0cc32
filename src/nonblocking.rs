//! Async wrappers for the blocking lifecycle operations.
//!
//! Opening (which may train), loading and saving all do file I/O and
//! CPU-bound work. These wrappers run them on Tokio's blocking thread
//! pool so they can be awaited from async code without stalling the
//! runtime. The handle itself stays synchronous.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::config::IndexerConfig;
use crate::error::{IndexerError, Result};
use crate::indexer::Indexer;
use crate::types::{Matrix, SearchResults};

async fn run_blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(|e| {
        IndexerError::Io(std::io::Error::other(format!("blocking task failed: {}", e)))
    })?
}

/// [`Indexer::open`] on the blocking pool.
pub async fn open_async(config: IndexerConfig) -> Result<Indexer> {
    debug!(index_key = %config.index_key, "Opening index on blocking pool");
    run_blocking(move || Indexer::open(config)).await
}

/// [`Indexer::load`] on the blocking pool.
pub async fn load_async(path: impl Into<PathBuf>) -> Result<Indexer> {
    let path = path.into();
    run_blocking(move || Indexer::load(path)).await
}

/// [`Indexer::save`] on the blocking pool.
///
/// Takes an `Arc` so the handle can keep serving queries elsewhere while
/// the artifact is written.
pub async fn save_async(indexer: Arc<Indexer>, path: impl Into<PathBuf>) -> Result<()> {
    let path = path.into();
    run_blocking(move || indexer.save(path)).await
}

/// [`Indexer::query`] on the blocking pool.
pub async fn query_async(
    indexer: Arc<Indexer>,
    queries: Matrix<f32>,
    top_k: usize,
) -> Result<SearchResults> {
    run_blocking(move || indexer.query(&queries, top_k)).await
}
