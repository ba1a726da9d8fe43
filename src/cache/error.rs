//! Error types for the cache and its collaborators.

use thiserror::Error;

/// Failure reported by a [`FreshnessOracle`](super::FreshnessOracle) or
/// [`DataFetcher`](super::DataFetcher).
///
/// The cache never fabricates these; they reach the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
  /// The resource or range no longer exists
  #[error("not found: {0}")]
  NotFound(String),

  /// The remote side asked us to slow down
  #[error("rate limited: {0}")]
  RateLimited(String),

  /// Network failure, timeout or server-side error
  #[error("transient failure: {0}")]
  Transient(String),
}

impl SourceError {
  /// Whether retrying the same call later could succeed.
  pub fn is_retryable(&self) -> bool {
    !matches!(self, SourceError::NotFound(_))
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, SourceError::NotFound(_))
  }
}

/// Internal failure of the on-disk tier. Logged, never surfaced to readers.
#[derive(Debug, Error)]
pub enum StorageError {
  #[error("cache file I/O failed: {0}")]
  Io(#[from] std::io::Error),

  #[error("cache file encoding failed: {0}")]
  Json(#[from] serde_json::Error),

  #[error("atomic rename of cache file failed: {0}")]
  Persist(#[from] tempfile::PersistError),
}
