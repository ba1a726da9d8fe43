//! Dual-layer read-through cache for remote tabular data.
//!
//! This module provides a caching mechanism that:
//! - Keeps fetched ranges in a bounded in-memory LRU table
//! - Mirrors that table to a versioned JSON file, replaced atomically
//! - Revalidates entries against the resource's modification time
//! - Serves cached data when the freshness check fails transiently

mod error;
mod layer;
mod memory;
mod stats;
mod storage;
mod traits;

pub use error::{SourceError, StorageError};
pub use layer::CacheCoordinator;
pub use memory::MemoryStore;
pub use stats::{CacheStatistics, StatisticsSnapshot};
pub use storage::{PersistentStore, CACHE_VERSION};
pub use traits::{
  CacheEntry, CacheKey, CacheResult, CacheSource, DataFetcher, FreshnessOracle, Record, Table,
};
