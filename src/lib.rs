//! Read-through cache for remote spreadsheet ranges.
//!
//! [`cache::CacheCoordinator`] answers reads from memory while the remote
//! resource's modification time shows it unchanged, falls back to the source
//! otherwise, and mirrors its contents to a JSON file across restarts.

pub mod cache;
pub mod config;
pub mod logging;
pub mod source;
