//! TTL cache stores
//!
//! Every store maps a [`CacheKey`] string to a JSON value with a per-entry TTL.
//! Expired entries are logically absent: `get` evicts them lazily and
//! `sweep_expired` removes them in bulk.
//!
//! - [`MemoryStore`]: bounded LRU living for the process lifetime
//! - [`PersistentStore`]: directory-backed store that survives restarts
//! - [`LayeredStore`]: memory in front of persistent, write-through

mod key;
mod layered;
mod memory;
mod persistent;

pub use key::*;
pub use layered::*;
pub use memory::*;
pub use persistent::*;

use crate::config::TtlConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Key/value store with per-entry expiry
///
/// Absence is the only failure signal; storage errors are absorbed by the
/// implementation.
pub trait TtlStore: Send + Sync {
    /// Get a live entry, evicting it if it has expired
    fn get(&self, key: &str) -> Option<Value>;

    /// Insert or overwrite an entry
    fn set(&self, key: &str, value: Value, ttl: Duration);

    /// Remove one entry
    fn remove(&self, key: &str);

    /// Remove every entry whose key starts with `prefix`
    fn remove_prefix(&self, prefix: &str);

    /// Remove everything
    fn clear(&self);

    /// Drop expired entries, returning how many were removed
    fn sweep_expired(&self) -> usize;

    /// Store statistics
    fn stats(&self) -> CacheStats;
}

/// Typed helpers over any [`TtlStore`]
pub trait TtlStoreExt: TtlStore {
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(key = key, error = %e, "Cached value has unexpected shape, dropping");
                self.remove(key);
                None
            }
        }
    }

    fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_value(value) {
            Ok(v) => self.set(key, v, ttl),
            Err(e) => tracing::warn!(key = key, error = %e, "Failed to serialize value for cache"),
        }
    }
}

impl<S: TtlStore + ?Sized> TtlStoreExt for S {}

/// Cache statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStats {
    /// Current number of entries
    pub entries: usize,
    /// Maximum capacity (0 when unbounded)
    pub capacity: usize,
    /// Live hits
    pub hits: u64,
    /// Misses, including expired entries
    pub misses: u64,
    /// Entries evicted because they expired
    pub expired: u64,
}

/// Data classes with distinct freshness requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    /// Balances, per-owner counts, total supply
    Volatile,
    /// Token URI, owner-of, index lookups
    SemiStable,
    /// Contract name, creator-of-token, token-bound account address
    Immutable,
    /// Creator names and lists
    Creator,
    /// Fast partial discovery index
    PartialIndex,
    /// Complete discovery index
    CompleteIndex,
    /// Token metadata documents
    Metadata,
}

impl TtlClass {
    /// Resolve the configured duration for this class
    pub fn ttl(self, config: &TtlConfig) -> Duration {
        let secs = match self {
            Self::Volatile => config.volatile_secs,
            Self::SemiStable => config.semi_stable_secs,
            Self::Immutable => config.immutable_secs,
            Self::Creator => config.creator_secs,
            Self::PartialIndex => config.partial_index_secs,
            Self::CompleteIndex => config.complete_index_secs,
            Self::Metadata => config.metadata_secs,
        };
        Duration::from_secs(secs)
    }
}
