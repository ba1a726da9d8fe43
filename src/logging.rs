//! Tracing subscriber setup.

use std::path::Path;

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber.
///
/// Filter precedence: `override_level`, then RUST_LOG, then the configured
/// level, then `warn`. Logs go to stderr so command output on stdout stays
/// machine-readable. The returned guard must be kept alive while logging to a
/// file.
pub fn init(config: &LoggingConfig, override_level: Option<&str>) -> Result<Option<WorkerGuard>> {
  let filter = build_filter(config, override_level)?;

  let mut layers: Vec<BoxedLayer> = Vec::new();

  let stderr = fmt::layer().with_writer(std::io::stderr).with_target(true);
  layers.push(if config.json {
    stderr.json().boxed()
  } else {
    stderr.boxed()
  });

  let mut guard = None;
  if let Some(path) = &config.file {
    let dir = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .unwrap_or_else(|| Path::new("."));
    let file_name = path
      .file_name()
      .ok_or_else(|| eyre!("Log file path {} has no file name", path.display()))?;

    std::fs::create_dir_all(dir)
      .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, file_guard) = tracing_appender::non_blocking(appender);
    guard = Some(file_guard);

    let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
    layers.push(if config.json {
      file_layer.json().boxed()
    } else {
      file_layer.boxed()
    });
  }

  tracing_subscriber::registry()
    .with(layers)
    .with(filter)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

fn build_filter(config: &LoggingConfig, override_level: Option<&str>) -> Result<EnvFilter> {
  if let Some(level) = override_level {
    return EnvFilter::try_new(level).map_err(|e| eyre!("Invalid log level '{}': {}", level, e));
  }

  if let Ok(filter) = EnvFilter::try_from_default_env() {
    return Ok(filter);
  }

  let level = config.level.as_deref().unwrap_or("warn");
  EnvFilter::try_new(level).map_err(|e| eyre!("Invalid log level '{}': {}", level, e))
}
