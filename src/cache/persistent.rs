//! Directory-backed persistent store
//!
//! One JSON file per entry, named `{prefix}{sha256(key)}.json`, holding
//! `{key, data, timestamp, ttl}` (milliseconds). The store enforces a byte
//! quota; a write that would exceed it first triggers a best-effort cleanup
//! (expired entries, then oldest entries) and is dropped with a warning if it
//! still does not fit. An entry larger than the whole quota is dropped
//! without evicting anything. Callers never observe storage failures.

use super::{CacheStats, TtlStore};
use crate::error::{AppError, AppResult};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// On-disk entry format
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    data: Value,
    /// Creation time, epoch milliseconds
    timestamp: i64,
    /// Lifetime in milliseconds
    ttl: u64,
}

impl StoredEntry {
    fn is_live(&self, now_ms: i64) -> bool {
        now_ms < self.timestamp.saturating_add(self.ttl as i64)
    }
}

#[derive(Default)]
struct State {
    /// file name -> (key, size in bytes)
    files: HashMap<String, (String, u64)>,
    used_bytes: u64,
    hits: u64,
    misses: u64,
    expired: u64,
}

/// Persistent TTL store
pub struct PersistentStore {
    dir: PathBuf,
    prefix: String,
    quota_bytes: u64,
    state: Mutex<State>,
}

impl PersistentStore {
    /// Open (or create) a store in `dir`
    pub fn open(dir: impl AsRef<Path>, prefix: &str, quota_bytes: u64) -> AppResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| AppError::Internal(format!("Failed to create cache dir: {}", e)))?;

        let store = Self {
            dir,
            prefix: prefix.to_string(),
            quota_bytes,
            state: Mutex::new(State::default()),
        };
        store.load_index();
        Ok(store)
    }

    /// Rebuild the in-memory index from the files on disk
    fn load_index(&self) {
        let mut state = self.state.lock();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, dir = %self.dir.display(), "Failed to read cache dir");
                return;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(&self.prefix) || !name.ends_with(".json") {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let key = fs::read(entry.path())
                .ok()
                .and_then(|raw| serde_json::from_slice::<StoredEntry>(&raw).ok())
                .map(|e| e.key)
                .unwrap_or_default();
            state.used_bytes += size;
            state.files.insert(name, (key, size));
        }

        tracing::debug!(
            entries = state.files.len(),
            used_bytes = state.used_bytes,
            "Persistent cache index loaded"
        );
    }

    fn file_name(&self, key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        format!("{}{}.json", self.prefix, hex::encode(digest))
    }

    /// Bytes currently used on disk
    pub fn used_bytes(&self) -> u64 {
        self.state.lock().used_bytes
    }

    /// Write an entry, surfacing quota and I/O failures
    ///
    /// [`TtlStore::set`] wraps this and absorbs the error.
    pub fn try_set(&self, key: &str, value: Value, ttl: Duration) -> AppResult<()> {
        let entry = StoredEntry {
            key: key.to_string(),
            data: value,
            timestamp: Utc::now().timestamp_millis(),
            ttl: ttl.as_millis() as u64,
        };
        let raw = serde_json::to_vec(&entry)?;
        let size = raw.len() as u64;
        let name = self.file_name(key);

        let mut state = self.state.lock();

        // No amount of eviction makes room; leave other entries alone
        if size > self.quota_bytes {
            // The superseded value for this key must not outlive the write
            self.delete_file(&mut state, &name);
            return Err(AppError::StorageQuota(format!(
                "entry of {} bytes exceeds the {} byte quota",
                size, self.quota_bytes
            )));
        }

        let previous = state.files.get(&name).map(|(_, s)| *s).unwrap_or(0);

        if state.used_bytes - previous + size > self.quota_bytes {
            let needed = state.used_bytes - previous + size - self.quota_bytes;
            let freed = self.evict_for_space(&mut state, needed, &name);
            tracing::debug!(needed = needed, freed = freed, "Persistent cache cleanup");

            let previous = state.files.get(&name).map(|(_, s)| *s).unwrap_or(0);
            if state.used_bytes - previous + size > self.quota_bytes {
                return Err(AppError::StorageQuota(format!(
                    "entry of {} bytes does not fit in {} byte quota",
                    size, self.quota_bytes
                )));
            }
        }

        fs::write(self.dir.join(&name), &raw)
            .map_err(|e| AppError::StorageQuota(format!("write failed: {}", e)))?;

        state.used_bytes = state.used_bytes - previous + size;
        state.files.insert(name, (key.to_string(), size));
        Ok(())
    }

    /// Free at least `needed` bytes: expired entries first, then oldest
    fn evict_for_space(&self, state: &mut State, needed: u64, keep: &str) -> u64 {
        let now_ms = Utc::now().timestamp_millis();
        let mut candidates: Vec<(String, i64, bool)> = Vec::new();

        for name in state.files.keys() {
            if name == keep {
                continue;
            }
            match self.read_entry(name) {
                Some(entry) => candidates.push((name.clone(), entry.timestamp, entry.is_live(now_ms))),
                // Unreadable files are stale by definition
                None => candidates.push((name.clone(), i64::MIN, false)),
            }
        }

        // Expired before live, oldest before newest
        candidates.sort_by_key(|(_, ts, live)| (*live, *ts));

        let mut freed = 0;
        for (name, _, _) in candidates {
            if freed >= needed {
                break;
            }
            freed += self.delete_file(state, &name);
        }
        freed
    }

    fn read_entry(&self, name: &str) -> Option<StoredEntry> {
        let raw = fs::read(self.dir.join(name)).ok()?;
        serde_json::from_slice(&raw).ok()
    }

    fn delete_file(&self, state: &mut State, name: &str) -> u64 {
        if let Err(e) = fs::remove_file(self.dir.join(name)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, file = name, "Failed to remove cache file");
            }
        }
        match state.files.remove(name) {
            Some((_, size)) => {
                state.used_bytes = state.used_bytes.saturating_sub(size);
                size
            }
            None => 0,
        }
    }
}

impl TtlStore for PersistentStore {
    fn get(&self, key: &str) -> Option<Value> {
        let name = self.file_name(key);
        let mut state = self.state.lock();

        if !state.files.contains_key(&name) {
            state.misses += 1;
            return None;
        }

        match self.read_entry(&name) {
            Some(entry) if entry.key == key && entry.is_live(Utc::now().timestamp_millis()) => {
                state.hits += 1;
                Some(entry.data)
            }
            Some(entry) if entry.key == key => {
                tracing::trace!(key = key, "Persistent entry expired");
                self.delete_file(&mut state, &name);
                state.expired += 1;
                state.misses += 1;
                None
            }
            _ => {
                self.delete_file(&mut state, &name);
                state.misses += 1;
                None
            }
        }
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        if let Err(e) = self.try_set(key, value, ttl) {
            tracing::warn!(key = key, error = %e, "Persistent cache write dropped");
        }
    }

    fn remove(&self, key: &str) {
        let name = self.file_name(key);
        let mut state = self.state.lock();
        self.delete_file(&mut state, &name);
    }

    fn remove_prefix(&self, prefix: &str) {
        let mut state = self.state.lock();
        let doomed: Vec<String> = state
            .files
            .iter()
            .filter(|(_, (key, _))| key.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect();
        for name in doomed {
            self.delete_file(&mut state, &name);
        }
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        let names: Vec<String> = state.files.keys().cloned().collect();
        for name in names {
            self.delete_file(&mut state, &name);
        }
        tracing::debug!("Persistent cache cleared");
    }

    fn sweep_expired(&self) -> usize {
        let now_ms = Utc::now().timestamp_millis();
        let mut state = self.state.lock();
        let doomed: Vec<String> = state
            .files
            .keys()
            .filter(|name| {
                self.read_entry(name)
                    .map(|e| !e.is_live(now_ms))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        for name in &doomed {
            self.delete_file(&mut state, name);
        }
        state.expired += doomed.len() as u64;
        doomed.len()
    }

    fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.files.len(),
            capacity: 0,
            hits: state.hits,
            misses: state.misses,
            expired: state.expired,
        }
    }
}
