//! Google Sheets / Drive client: values from Sheets v4, modification times
//! from Drive v3.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::cache::{DataFetcher, FreshnessOracle, SourceError, Table};

use super::grid::values_to_records;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata {
  modified_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
  #[serde(default)]
  values: Vec<Vec<Value>>,
}

/// HTTP client for spreadsheets stored in Google Drive.
#[derive(Clone)]
pub struct GoogleSource {
  client: reqwest::Client,
  sheets_url: Url,
  drive_url: Url,
  token: String,
}

impl GoogleSource {
  pub fn new(sheets_url: &str, drive_url: &str, token: String, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      sheets_url: parse_base(sheets_url)?,
      drive_url: parse_base(drive_url)?,
      token,
    })
  }

  async fn get_json<T>(
    &self,
    url: Url,
    query: &[(&str, &str)],
    context: &str,
  ) -> Result<T, SourceError>
  where
    T: serde::de::DeserializeOwned,
  {
    let response = self
      .client
      .get(url)
      .bearer_auth(&self.token)
      .query(query)
      .send()
      .await
      .map_err(|e| SourceError::Transient(format!("{context}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
      return Err(classify_status(status, context));
    }

    response
      .json::<T>()
      .await
      .map_err(|e| SourceError::Transient(format!("{context}: invalid response body: {e}")))
  }
}

fn parse_base(raw: &str) -> Result<Url> {
  let url = Url::parse(raw).map_err(|e| eyre!("Invalid API URL {}: {}", raw, e))?;
  if url.cannot_be_a_base() {
    return Err(eyre!("API URL {} cannot carry a path", raw));
  }
  Ok(url)
}

fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, SourceError> {
  let mut url = base.clone();
  url
    .path_segments_mut()
    .map_err(|_| SourceError::Transient(format!("API URL {base} cannot carry a path")))?
    .pop_if_empty()
    .extend(segments);
  Ok(url)
}

/// Map an HTTP failure onto the cache's error taxonomy.
///
/// 404 and 400 (unparseable range) mean the data is not there; 429 is rate
/// limiting; everything else, including auth failures and 5xx, is transient.
fn classify_status(status: StatusCode, context: &str) -> SourceError {
  match status {
    StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
      SourceError::NotFound(format!("{context} (HTTP {})", status.as_u16()))
    }
    StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimited(format!("{context} (HTTP 429)")),
    _ => SourceError::Transient(format!("{context} (HTTP {})", status.as_u16())),
  }
}

#[async_trait]
impl FreshnessOracle for GoogleSource {
  async fn get_modification_time(&self, resource_id: &str) -> Result<DateTime<Utc>, SourceError> {
    let url = endpoint(&self.drive_url, &["files", resource_id])?;
    let context = format!("metadata for {resource_id}");

    let metadata: FileMetadata = self
      .get_json(
        url,
        &[("fields", "modifiedTime"), ("supportsAllDrives", "true")],
        &context,
      )
      .await?;

    metadata
      .modified_time
      .ok_or_else(|| SourceError::Transient(format!("{context}: no modifiedTime in response")))
  }
}

#[async_trait]
impl DataFetcher for GoogleSource {
  async fn read(&self, resource_id: &str, range_spec: &str) -> Result<Table, SourceError> {
    let url = endpoint(
      &self.sheets_url,
      &["spreadsheets", resource_id, "values", range_spec],
    )?;
    let context = format!("values {resource_id}:{range_spec}");

    let range: ValueRange = self
      .get_json(url, &[("valueRenderOption", "UNFORMATTED_VALUE")], &context)
      .await?;

    let table = values_to_records(range.values);
    debug!(resource_id, range_spec, rows = table.len(), "Read range from Sheets API");
    Ok(table)
  }
}
