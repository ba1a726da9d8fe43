//! Core traits and types for the caching system.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::SourceError;

/// One row of a table: column name to scalar, in column order.
pub type Record = Map<String, Value>;

/// Tabular payload returned by a [`DataFetcher`].
pub type Table = Vec<Record>;

/// Identifies one cached read: a remote resource plus a sub-range of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  resource_id: String,
  range_spec: String,
}

impl CacheKey {
  pub fn new(resource_id: impl Into<String>, range_spec: impl Into<String>) -> Self {
    Self {
      resource_id: resource_id.into(),
      range_spec: range_spec.into(),
    }
  }

  pub fn resource_id(&self) -> &str {
    &self.resource_id
  }

  pub fn range_spec(&self) -> &str {
    &self.range_spec
  }

  /// Encode as `<resource_id>:<range_spec>` for the cache file.
  ///
  /// Range specs usually contain colons (`Sheet1!A1:D10`), so the split on
  /// decode happens at the first colon and any `%` or `:` inside the resource
  /// id is percent-escaped.
  pub fn encode(&self) -> String {
    let mut out = String::with_capacity(self.resource_id.len() + self.range_spec.len() + 1);
    for c in self.resource_id.chars() {
      match c {
        '%' => out.push_str("%25"),
        ':' => out.push_str("%3A"),
        _ => out.push(c),
      }
    }
    out.push(':');
    out.push_str(&self.range_spec);
    out
  }

  /// Inverse of [`CacheKey::encode`]. Returns None for strings without a separator.
  pub fn decode(s: &str) -> Option<Self> {
    let (raw_id, range_spec) = s.split_once(':')?;

    let mut resource_id = String::with_capacity(raw_id.len());
    let mut rest = raw_id;
    while let Some(pos) = rest.find('%') {
      resource_id.push_str(&rest[..pos]);
      let escape = rest.get(pos..pos + 3)?;
      match escape {
        "%25" => resource_id.push('%'),
        "%3A" | "%3a" => resource_id.push(':'),
        _ => return None,
      }
      rest = &rest[pos + 3..];
    }
    resource_id.push_str(rest);

    Some(Self::new(resource_id, range_spec))
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.resource_id, self.range_spec)
  }
}

/// A cached table together with the freshness information it was fetched under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  /// The cached rows
  #[serde(rename = "data")]
  pub value: Table,
  /// Modification time of the resource when the rows were fetched
  pub modified_time: DateTime<Utc>,
  /// When the entry was stored locally
  pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
  pub fn new(value: Table, modified_time: DateTime<Utc>) -> Self {
    Self {
      value,
      modified_time,
      cached_at: Utc::now(),
    }
  }

  /// An entry is current unless the resource was written after it was fetched.
  pub fn is_current(&self, remote_modified: DateTime<Utc>) -> bool {
    remote_modified <= self.modified_time
  }
}

/// Cheap lookup of a resource's last modification time.
#[async_trait]
pub trait FreshnessOracle: Send + Sync {
  /// Fails with `NotFound` or `Transient`.
  async fn get_modification_time(&self, resource_id: &str) -> Result<DateTime<Utc>, SourceError>;
}

/// Expensive read of a resource's tabular payload.
#[async_trait]
pub trait DataFetcher: Send + Sync {
  /// Fails with `NotFound`, `RateLimited` or `Transient`.
  async fn read(&self, resource_id: &str, range_spec: &str) -> Result<Table, SourceError>;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from a confirmed-fresh entry.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result served without a successful freshness check.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched from the remote source during this call
  Network,
  /// Served from memory after the modification time was confirmed
  CacheFresh,
  /// Served from memory because the freshness check failed transiently
  Offline,
}
