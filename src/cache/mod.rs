//! Versioned cache partitions and the strategies that read and write them.
//!
//! This module provides:
//! - Named partitions holding response snapshots keyed by request
//! - Network-first, cache-first and pass-through strategies
//! - Offline fallback (serve the stored snapshot when the network is down)

mod layer;
mod snapshot;
mod storage;

pub use layer::{CacheLayer, Served, ServedFrom};
pub use snapshot::{CacheKey, Snapshot};
pub use storage::{CacheStorage, SqliteStorage};
