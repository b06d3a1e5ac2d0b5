//! Two-tier token id index
//!
//! Each scope has one current [`TokenIndex`] behind an `Arc`. Builders never
//! mutate a published index; they publish a new one, so a batch that already
//! took a snapshot keeps reading the index it started with.

use crate::cache::{CacheKey, KeyArg};
use crate::constants::namespaces;
use crate::models::IndexTier;
use alloy_primitives::{Address, U256};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What an index enumerates
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexScope {
    /// Every token of the contract
    All,
    /// Tokens attributed to one creator
    Creator(Address),
}

impl IndexScope {
    pub(crate) fn key(&self, contract: Address) -> String {
        let resource = KeyArg::Address(contract).to_string();
        match self {
            Self::All => CacheKey::new(namespaces::DISCOVERY, &resource, "all", &[]),
            Self::Creator(c) => CacheKey::new(namespaces::DISCOVERY, &resource, "creator", &[(*c).into()]),
        }
        .to_string()
    }
}

/// Ordered token ids of one scope, most recent first
#[derive(Debug, Clone)]
pub struct TokenIndex {
    pub ids: Vec<U256>,
    pub tier: IndexTier,
    /// Ids the scope is expected to hold once complete
    pub expected_len: usize,
    pub(crate) built_at: Instant,
    pub(crate) ttl: Duration,
    /// Contract write generation the index was built against
    pub(crate) generation: u64,
}

impl TokenIndex {
    pub fn new(mut ids: Vec<U256>, tier: IndexTier, expected_len: usize, ttl: Duration, generation: u64) -> Self {
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.dedup();
        Self {
            ids,
            tier,
            expected_len,
            built_at: Instant::now(),
            ttl,
            generation,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_expired(&self) -> bool {
        self.built_at.elapsed() >= self.ttl
    }

    /// Usable for reads at `generation`
    pub fn is_fresh(&self, generation: u64) -> bool {
        !self.is_expired() && self.generation == generation
    }

    /// Length used for `has_more`: a partial index stands in for the full scope
    pub fn logical_len(&self) -> usize {
        match self.tier {
            IndexTier::Complete => self.ids.len(),
            IndexTier::Partial => self.expected_len.max(self.ids.len()),
        }
    }

    /// Whether `[start, end)` reaches past what this index holds
    pub fn needs_more_than(&self, end: usize) -> bool {
        self.tier == IndexTier::Partial && end > self.ids.len() && self.ids.len() < self.expected_len
    }
}

/// Current index per scope, swapped atomically
#[derive(Default)]
pub(crate) struct IndexStore {
    current: RwLock<HashMap<String, Arc<TokenIndex>>>,
}

impl IndexStore {
    pub fn get(&self, key: &str) -> Option<Arc<TokenIndex>> {
        self.current.read().get(key).cloned()
    }

    /// Fresh index for `key`, dropping it if stale
    pub fn get_fresh(&self, key: &str, generation: u64) -> Option<Arc<TokenIndex>> {
        let index = self.get(key)?;
        if index.is_fresh(generation) {
            return Some(index);
        }
        let mut current = self.current.write();
        if current.get(key).is_some_and(|i| Arc::ptr_eq(i, &index)) {
            current.remove(key);
        }
        None
    }

    /// Publish an index
    ///
    /// A partial index never replaces a fresh complete one.
    pub fn publish(&self, key: &str, index: TokenIndex) -> Arc<TokenIndex> {
        let index = Arc::new(index);
        let mut current = self.current.write();
        if index.tier == IndexTier::Partial {
            if let Some(existing) = current.get(key) {
                if existing.tier == IndexTier::Complete && existing.is_fresh(index.generation) {
                    return existing.clone();
                }
            }
        }
        current.insert(key.to_string(), index.clone());
        index
    }

    pub fn clear(&self) {
        self.current.write().clear();
    }

    pub fn sweep_expired(&self) -> usize {
        let mut current = self.current.write();
        let before = current.len();
        current.retain(|_, index| !index.is_expired());
        before - current.len()
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }
}
