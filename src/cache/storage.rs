//! On-disk tier: the whole cache state as one versioned JSON document.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::error::StorageError;
use super::traits::{CacheEntry, CacheKey};

/// Schema tag written into every cache file.
pub const CACHE_VERSION: &str = "1.0";

/// Document layout used when writing.
#[derive(Serialize)]
struct CacheFileOut<'a> {
  version: &'a str,
  last_updated: DateTime<Utc>,
  entries: Map<String, Value>,
}

/// Only the header is trusted up front; entries are decoded one by one so a
/// single bad record does not discard the rest.
#[derive(Deserialize)]
struct CacheFileIn {
  #[serde(default)]
  version: Option<String>,
  #[serde(default)]
  entries: Map<String, Value>,
}

/// JSON-file cache storage with atomic replacement.
#[derive(Debug, Clone)]
pub struct PersistentStore {
  path: PathBuf,
  version: String,
}

impl PersistentStore {
  /// Create a store for the given file using the current schema version.
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self::with_version(path, CACHE_VERSION)
  }

  /// Create a store that expects a specific schema version.
  pub fn with_version(path: impl Into<PathBuf>, version: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      version: version.into(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Default cache file location under the user's data directory.
  pub fn default_path() -> Option<PathBuf> {
    let data_dir = dirs::data_dir().or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))?;
    Some(data_dir.join("sheetcache").join("cache.json"))
  }

  /// Load all entries in stored order (least recently used first).
  ///
  /// Never fails: a missing, unreadable, corrupted or mismatched-version file
  /// yields an empty list.
  pub fn load(&self) -> Vec<(CacheKey, CacheEntry)> {
    let contents = match fs::read_to_string(&self.path) {
      Ok(contents) => contents,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(path = %self.path.display(), "Cache file not found");
        return Vec::new();
      }
      Err(e) => {
        error!(path = %self.path.display(), error = %e, "Failed to read cache file");
        return Vec::new();
      }
    };

    let file: CacheFileIn = match serde_json::from_str(&contents) {
      Ok(file) => file,
      Err(e) => {
        error!(
          path = %self.path.display(),
          error = %e,
          "Failed to parse cache file, starting empty"
        );
        return Vec::new();
      }
    };

    let found = file.version.as_deref().unwrap_or("unknown");
    if found != self.version {
      warn!(
        expected = %self.version,
        found,
        "Cache version mismatch, ignoring cache file"
      );
      return Vec::new();
    }

    let mut entries = Vec::with_capacity(file.entries.len());
    for (key_str, raw) in file.entries {
      let Some(key) = CacheKey::decode(&key_str) else {
        warn!(key = %key_str, "Invalid cache key format, skipping");
        continue;
      };

      match serde_json::from_value::<CacheEntry>(raw) {
        Ok(entry) => entries.push((key, entry)),
        Err(e) => warn!(key = %key_str, error = %e, "Invalid cache entry, skipping"),
      }
    }

    info!(
      path = %self.path.display(),
      entries = entries.len(),
      "Loaded cache from disk"
    );
    entries
  }

  /// Write the full state, replacing the file atomically.
  ///
  /// Returns whether the write succeeded; failures are logged here.
  pub fn save<'a, I>(&self, entries: I) -> bool
  where
    I: IntoIterator<Item = (&'a CacheKey, &'a CacheEntry)>,
  {
    match self.try_save(entries) {
      Ok(count) => {
        debug!(path = %self.path.display(), entries = count, "Saved cache to disk");
        true
      }
      Err(e) => {
        error!(path = %self.path.display(), error = %e, "Failed to save cache to disk");
        false
      }
    }
  }

  fn try_save<'a, I>(&self, entries: I) -> Result<usize, StorageError>
  where
    I: IntoIterator<Item = (&'a CacheKey, &'a CacheEntry)>,
  {
    let mut encoded = Map::new();
    for (key, entry) in entries {
      encoded.insert(key.encode(), serde_json::to_value(entry)?);
    }
    let count = encoded.len();

    let document = CacheFileOut {
      version: &self.version,
      last_updated: Utc::now(),
      entries: encoded,
    };

    let dir = match self.path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
      _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    // Temp file in the same directory so the rename stays on one filesystem.
    let mut temp = tempfile::Builder::new()
      .prefix(".sheetcache-")
      .suffix(".tmp")
      .tempfile_in(&dir)?;

    {
      let mut writer = BufWriter::new(temp.as_file_mut());
      serde_json::to_writer_pretty(&mut writer, &document)?;
      writer.flush()?;
    }
    temp.as_file().sync_all()?;

    // On failure the temp file is dropped and removed.
    temp.persist(&self.path)?;

    Ok(count)
  }
}
