//! Local directory of workbook documents, one JSON file per resource.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::cache::{DataFetcher, FreshnessOracle, SourceError, Table};

use super::grid::{values_to_records, A1Range};

/// On-disk workbook: sheet name to row-major cell grid.
#[derive(Debug, Deserialize)]
struct Workbook {
  sheets: HashMap<String, Vec<Vec<Value>>>,
}

/// Serves `<root>/<resource_id>.json`, using the file's mtime as its
/// modification time.
#[derive(Debug, Clone)]
pub struct DirectorySource {
  root: PathBuf,
}

impl DirectorySource {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn resource_path(&self, resource_id: &str) -> Result<PathBuf, SourceError> {
    // Ids are file stems; anything that could escape the root cannot exist.
    if resource_id.is_empty()
      || resource_id.contains(['/', '\\'])
      || resource_id == "."
      || resource_id == ".."
    {
      return Err(SourceError::NotFound(format!("invalid resource id {resource_id:?}")));
    }
    Ok(self.root.join(format!("{resource_id}.json")))
  }
}

fn io_error(resource_id: &str, e: std::io::Error) -> SourceError {
  if e.kind() == ErrorKind::NotFound {
    SourceError::NotFound(format!("resource {resource_id}"))
  } else {
    SourceError::Transient(format!("reading resource {resource_id}: {e}"))
  }
}

#[async_trait]
impl FreshnessOracle for DirectorySource {
  async fn get_modification_time(&self, resource_id: &str) -> Result<DateTime<Utc>, SourceError> {
    let path = self.resource_path(resource_id)?;
    let metadata = tokio::fs::metadata(&path)
      .await
      .map_err(|e| io_error(resource_id, e))?;
    let modified = metadata
      .modified()
      .map_err(|e| SourceError::Transient(format!("no mtime for {}: {e}", path.display())))?;

    Ok(DateTime::<Utc>::from(modified))
  }
}

#[async_trait]
impl DataFetcher for DirectorySource {
  async fn read(&self, resource_id: &str, range_spec: &str) -> Result<Table, SourceError> {
    let range = A1Range::parse(range_spec)
      .ok_or_else(|| SourceError::NotFound(format!("invalid range {range_spec:?}")))?;

    let path = self.resource_path(resource_id)?;
    let contents = tokio::fs::read_to_string(&path)
      .await
      .map_err(|e| io_error(resource_id, e))?;

    let workbook: Workbook = serde_json::from_str(&contents).map_err(|e| {
      SourceError::Transient(format!("malformed workbook {}: {e}", path.display()))
    })?;

    let grid = workbook
      .sheets
      .get(&range.sheet)
      .ok_or_else(|| SourceError::NotFound(format!("sheet {} in {resource_id}", range.sheet)))?;

    let table = values_to_records(range.select(grid));
    debug!(resource_id, range_spec, rows = table.len(), "Read range from directory");
    Ok(table)
  }
}
