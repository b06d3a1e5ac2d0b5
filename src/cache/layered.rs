//! Two-tier store: memory in front of persistent
//!
//! Writes go to both tiers. Reads try memory first; a persistent hit is
//! promoted back into memory for the remainder of a default TTL window.

use super::{CacheStats, MemoryStore, PersistentStore, TtlStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Memory-first, write-through store
pub struct LayeredStore {
    memory: Arc<MemoryStore>,
    persistent: Arc<PersistentStore>,
    /// TTL given to entries promoted from the persistent tier
    promote_ttl: Duration,
}

impl LayeredStore {
    pub fn new(memory: Arc<MemoryStore>, persistent: Arc<PersistentStore>, promote_ttl: Duration) -> Self {
        Self {
            memory,
            persistent,
            promote_ttl,
        }
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn persistent(&self) -> &PersistentStore {
        &self.persistent
    }
}

impl TtlStore for LayeredStore {
    fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.memory.get(key) {
            return Some(value);
        }

        let value = self.persistent.get(key)?;
        tracing::trace!(key = key, "Promoting persistent entry to memory");
        self.memory.set(key, value.clone(), self.promote_ttl);
        Some(value)
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.memory.set(key, value.clone(), ttl);
        self.persistent.set(key, value, ttl);
    }

    fn remove(&self, key: &str) {
        self.memory.remove(key);
        self.persistent.remove(key);
    }

    fn remove_prefix(&self, prefix: &str) {
        self.memory.remove_prefix(prefix);
        self.persistent.remove_prefix(prefix);
    }

    fn clear(&self) {
        self.memory.clear();
        self.persistent.clear();
    }

    fn sweep_expired(&self) -> usize {
        self.memory.sweep_expired() + self.persistent.sweep_expired()
    }

    fn stats(&self) -> CacheStats {
        let memory = self.memory.stats();
        let persistent = self.persistent.stats();
        CacheStats {
            entries: memory.entries,
            capacity: memory.capacity,
            hits: memory.hits + persistent.hits,
            misses: persistent.misses,
            expired: memory.expired + persistent.expired,
        }
    }
}
