//! Concrete sources that answer both the freshness and the read question.

mod directory;
mod google;
pub mod grid;

use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;

use crate::cache::CacheCoordinator;
use crate::config::{Config, SourceConfig};

pub use directory::DirectorySource;
pub use google::GoogleSource;

/// Build the configured source and wrap it in a cache coordinator.
pub fn connect(config: &Config) -> Result<CacheCoordinator> {
  let coordinator = match &config.source {
    SourceConfig::Directory { root } => {
      CacheCoordinator::with_source(&config.cache, Arc::new(DirectorySource::new(root)))
    }
    SourceConfig::Google {
      sheets_url,
      drive_url,
      timeout_secs,
    } => {
      let token = Config::get_access_token()?;
      let source = GoogleSource::new(
        sheets_url,
        drive_url,
        token,
        Duration::from_secs(*timeout_secs),
      )?;
      CacheCoordinator::with_source(&config.cache, Arc::new(source))
    }
  };

  Ok(coordinator)
}
