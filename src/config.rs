use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::PersistentStore;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub source: SourceConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

/// Cache behaviour. Every field has a default so the section can be omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Location of the JSON cache file
  #[serde(default = "default_cache_path")]
  pub file_path: PathBuf,
  /// Maximum number of cached ranges held in memory
  #[serde(default = "default_max_size")]
  pub max_size: usize,
  /// Write the cache file after every change
  #[serde(default = "default_true")]
  pub auto_save: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      file_path: default_cache_path(),
      max_size: default_max_size(),
      auto_save: true,
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_max_size() -> usize {
  100
}

fn default_cache_path() -> PathBuf {
  PersistentStore::default_path().unwrap_or_else(|| PathBuf::from(".cache/sheets_cache.json"))
}

/// Where tables come from.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
  /// Local `<root>/<resource_id>.json` documents
  Directory { root: PathBuf },
  /// Google Sheets for data, Google Drive for modification times
  Google {
    #[serde(default = "default_sheets_url")]
    sheets_url: String,
    #[serde(default = "default_drive_url")]
    drive_url: String,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
  },
}

fn default_sheets_url() -> String {
  "https://sheets.googleapis.com/v4".to_string()
}

fn default_drive_url() -> String {
  "https://www.googleapis.com/drive/v3".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
  /// Filter directive used when RUST_LOG is unset (e.g. "info", "sheetcache=debug")
  pub level: Option<String>,
  /// Also append logs to this file
  pub file: Option<PathBuf>,
  /// Emit JSON lines instead of human-readable output
  #[serde(default)]
  pub json: bool,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./sheetcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/sheetcache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = match explicit_path {
      Some(p) if !p.exists() => return Err(eyre!("Config file not found: {}", p.display())),
      Some(p) => p.to_path_buf(),
      None => Self::search_paths()
        .into_iter()
        .find(|p| p.exists())
        .ok_or_else(|| {
          eyre!("No configuration file found. Create ./sheetcache.yaml or pass --config <path>.")
        })?,
    };

    Self::load_from_path(&path)
  }

  /// Default config locations, in the order they are tried.
  fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("sheetcache.yaml")];
    if let Some(config_dir) = dirs::config_dir() {
      paths.push(config_dir.join("sheetcache").join("config.yaml"));
    }
    paths
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  /// Parse and validate a YAML document.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.cache.max_size == 0 {
      return Err(eyre!("cache.max_size must be a positive integer"));
    }
    if let SourceConfig::Google { timeout_secs: 0, .. } = self.source {
      return Err(eyre!("source.timeout_secs must be greater than zero"));
    }
    Ok(())
  }

  /// Get the Google API access token from environment variables.
  ///
  /// Checks SHEETCACHE_ACCESS_TOKEN first, then GOOGLE_ACCESS_TOKEN as fallback.
  pub fn get_access_token() -> Result<String> {
    std::env::var("SHEETCACHE_ACCESS_TOKEN")
      .or_else(|_| std::env::var("GOOGLE_ACCESS_TOKEN"))
      .map_err(|_| {
        eyre!(
          "Google access token not found. \
           Set SHEETCACHE_ACCESS_TOKEN or GOOGLE_ACCESS_TOKEN."
        )
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_cache_defaults() {
    let config = Config::from_yaml("source:\n  kind: directory\n  root: ./data\n").unwrap();

    assert_eq!(
      config.source,
      SourceConfig::Directory {
        root: PathBuf::from("./data")
      }
    );
    assert!(config.cache.enabled);
    assert!(config.cache.auto_save);
    assert_eq!(config.cache.max_size, 100);
    assert!(config.logging.level.is_none());
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
source:
  kind: google
  timeout_secs: 10
cache:
  enabled: true
  file_path: /tmp/sheets.json
  max_size: 5
  auto_save: false
logging:
  level: debug
  json: true
"#;
    let config = Config::from_yaml(yaml).unwrap();

    assert_eq!(
      config.source,
      SourceConfig::Google {
        sheets_url: "https://sheets.googleapis.com/v4".into(),
        drive_url: "https://www.googleapis.com/drive/v3".into(),
        timeout_secs: 10,
      }
    );
    assert_eq!(config.cache.file_path, PathBuf::from("/tmp/sheets.json"));
    assert_eq!(config.cache.max_size, 5);
    assert!(!config.cache.auto_save);
    assert_eq!(config.logging.level.as_deref(), Some("debug"));
    assert!(config.logging.json);
  }

  #[test]
  fn test_zero_max_size_rejected() {
    let yaml = "source:\n  kind: directory\n  root: .\ncache:\n  max_size: 0\n";
    assert!(Config::from_yaml(yaml).is_err());
  }

  #[test]
  fn test_unknown_source_kind_rejected() {
    assert!(Config::from_yaml("source:\n  kind: ftp\n").is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let err = Config::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_search_prefers_working_directory() {
    let paths = Config::search_paths();
    assert_eq!(paths[0], PathBuf::from("sheetcache.yaml"));
    assert!(paths.iter().skip(1).all(|p| p.ends_with("sheetcache/config.yaml")));
  }
}
