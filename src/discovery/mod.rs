//! Token discovery engine
//!
//! Enumerates tokens without an indexer, using only the ERC-721 Enumerable
//! reads and, as a fallback, Transfer logs.
//!
//! Contract-wide listing works off a two-tier index:
//! 1. First request: `totalSupply`, then `tokenByIndex` for the most recent
//!    `partial_index_size` positions gives a fast partial index
//! 2. A background job walks `[0, totalSupply)` in small throttled
//!    sub-batches and publishes the complete index over the partial one
//!
//! Batches slice whichever index is current. A batch that reaches past a
//! partial index waits for the complete one. Burned tokens and per-token
//! failures are skipped; failures of `totalSupply` abort the batch.

mod index;
mod owner;

pub use index::*;

use crate::config::{DiscoveryConfig, TtlConfig};
use crate::contract::ContractService;
use crate::error::{AppError, AppResult};
use crate::models::{IndexTier, SortOrder, TokenBatch, TokenRecord};
use alloy_primitives::U256;
use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use futures_util::stream::{self, Stream};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

type IndexJob = Shared<BoxFuture<'static, bool>>;

/// Discovery statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DiscoveryStats {
    pub indexes: usize,
    pub background_jobs: usize,
}

/// Incremental token enumeration over a [`ContractService`]
pub struct DiscoveryEngine {
    contract: ContractService,
    config: DiscoveryConfig,
    ttl: TtlConfig,
    indexes: IndexStore,
    jobs: Mutex<HashMap<String, IndexJob>>,
}

impl DiscoveryEngine {
    pub fn new(contract: ContractService, config: DiscoveryConfig) -> Arc<Self> {
        let ttl = contract.ttl().clone();
        Arc::new(Self {
            contract,
            config,
            ttl,
            indexes: IndexStore::default(),
            jobs: Mutex::new(HashMap::new()),
        })
    }

    pub fn contract(&self) -> &ContractService {
        &self.contract
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn stats(&self) -> DiscoveryStats {
        DiscoveryStats {
            indexes: self.indexes.len(),
            background_jobs: self.jobs.lock().len(),
        }
    }

    /// Current index of `scope`, if one has been published
    pub fn index_snapshot(&self, scope: &IndexScope) -> Option<Arc<TokenIndex>> {
        self.indexes.get(&scope.key(self.contract.address()))
    }

    /// Drop every index; the next batch rebuilds
    pub fn invalidate(&self) {
        self.indexes.clear();
    }

    pub fn sweep_expired(&self) -> usize {
        self.indexes.sweep_expired()
    }

    /// Restartable cursor over `scope`
    pub fn cursor(self: &Arc<Self>, scope: IndexScope, batch_size: usize) -> BatchCursor {
        BatchCursor::new(self.clone(), scope, batch_size)
    }

    /// One batch of `scope` starting at `start`
    pub async fn batch(self: &Arc<Self>, scope: &IndexScope, start: usize, size: usize) -> AppResult<TokenBatch> {
        self.batch_with(&self.contract, scope, start, size).await
    }

    async fn batch_with(
        self: &Arc<Self>,
        contract: &ContractService,
        scope: &IndexScope,
        start: usize,
        size: usize,
    ) -> AppResult<TokenBatch> {
        let size = if size == 0 { self.config.batch_size } else { size };
        let mut index = self.current_index(scope).await?;

        let end = start.saturating_add(size);
        if index.needs_more_than(end) {
            tracing::debug!(start = start, partial = index.len(), "Batch reaches past partial index, waiting for complete index");
            index = self.wait_for_complete_index(scope).await?;
        }

        let slice_end = end.min(index.len());
        let ids: Vec<U256> = if start < slice_end {
            index.ids[start..slice_end].to_vec()
        } else {
            Vec::new()
        };

        let tokens = self.fetch_records(contract, &ids).await;
        let has_more = end < index.logical_len();

        tracing::debug!(
            start = start,
            requested = size,
            returned = tokens.len(),
            has_more = has_more,
            tier = ?index.tier,
            "Served discovery batch"
        );

        Ok(TokenBatch {
            tokens,
            has_more,
            start,
            next_start: end,
            index_len: index.len(),
            tier: index.tier,
            order: SortOrder::MostRecentFirst,
        })
    }

    /// Records for `ids` in order, skipping burned tokens and failures
    pub(crate) async fn fetch_records(&self, contract: &ContractService, ids: &[U256]) -> Vec<TokenRecord> {
        let results = join_all(ids.iter().map(|id| contract.token_record(*id))).await;

        ids.iter()
            .zip(results)
            .filter_map(|(id, result)| match result {
                Ok(record) => Some(record),
                Err(AppError::NotFound(_)) => {
                    tracing::trace!(token_id = %id, "Skipping burned token");
                    None
                }
                Err(e) => {
                    tracing::warn!(token_id = %id, error = %e, "Skipping token that failed to load");
                    None
                }
            })
            .collect()
    }

    /// Fresh index of `scope`, building the fast tier if needed
    async fn current_index(self: &Arc<Self>, scope: &IndexScope) -> AppResult<Arc<TokenIndex>> {
        let key = scope.key(self.contract.address());
        let generation = self.contract.write_generation();
        if let Some(index) = self.indexes.get_fresh(&key, generation) {
            return Ok(index);
        }

        match scope {
            IndexScope::All => self.build_partial_index(&key, generation).await,
            IndexScope::Creator(creator) => {
                let ids = self.contract.creator_tokens(*creator).await?;
                let len = ids.len();
                tracing::debug!(creator = %creator, tokens = len, "Built creator index");
                Ok(self.indexes.publish(
                    &key,
                    TokenIndex::new(ids, IndexTier::Complete, len, self.ttl_of(IndexTier::Complete), generation),
                ))
            }
        }
    }

    fn ttl_of(&self, tier: IndexTier) -> Duration {
        match tier {
            IndexTier::Partial => Duration::from_secs(self.ttl.partial_index_secs),
            IndexTier::Complete => Duration::from_secs(self.ttl.complete_index_secs),
        }
    }

    async fn build_partial_index(self: &Arc<Self>, key: &str, generation: u64) -> AppResult<Arc<TokenIndex>> {
        let total_supply = self.contract.total_supply().await?;
        let total = self.indexable_len(total_supply)?;
        let count = total.min(self.config.partial_index_size);

        let positions: Vec<usize> = (total - count..total).rev().collect();
        let ids = self.ids_at_positions(&positions).await;

        if count == total {
            tracing::debug!(total = total, "Supply fits the fast index, publishing as complete");
            return Ok(self.indexes.publish(
                key,
                TokenIndex::new(ids, IndexTier::Complete, total, self.ttl_of(IndexTier::Complete), generation),
            ));
        }

        let partial = self.indexes.publish(
            key,
            TokenIndex::new(ids, IndexTier::Partial, total, self.ttl_of(IndexTier::Partial), generation),
        );
        tracing::info!(partial = partial.len(), total = total, "Published partial index");

        self.spawn_complete_job(key, total, generation);
        Ok(partial)
    }

    /// `totalSupply` as an index length, refusing supplies above the configured ceiling
    fn indexable_len(&self, total_supply: U256) -> AppResult<usize> {
        let ceiling = self.config.max_index_supply;
        usize::try_from(total_supply)
            .ok()
            .filter(|total| *total <= ceiling)
            .ok_or_else(|| {
                AppError::Parse(format!(
                    "totalSupply {} exceeds the indexable ceiling of {}",
                    total_supply, ceiling
                ))
            })
    }

    /// `tokenByIndex` for each position; failures are skipped
    async fn ids_at_positions(&self, positions: &[usize]) -> Vec<U256> {
        let results = join_all(
            positions
                .iter()
                .map(|&i| self.contract.token_by_index(U256::from(i))),
        )
        .await;

        positions
            .iter()
            .zip(results)
            .filter_map(|(position, result)| match result {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!(position = position, error = %e, "Skipping index position");
                    None
                }
            })
            .collect()
    }

    fn spawn_complete_job(self: &Arc<Self>, key: &str, total: usize, generation: u64) -> IndexJob {
        let mut jobs = self.jobs.lock();
        if let Some(job) = jobs.get(key) {
            return job.clone();
        }

        let engine = self.clone();
        let job_key = key.to_string();
        let job: IndexJob = async move {
            let ok = engine.build_complete_index(&job_key, total, generation).await;
            engine.jobs.lock().remove(&job_key);
            ok
        }
        .boxed()
        .shared();

        jobs.insert(key.to_string(), job.clone());
        tokio::spawn(job.clone());
        job
    }

    async fn build_complete_index(&self, key: &str, total: usize, generation: u64) -> bool {
        let step = self.config.background_batch_size.max(1);
        let delay = Duration::from_millis(self.config.background_delay_ms);
        let mut ids = Vec::with_capacity(total.min(step * 64));

        tracing::info!(total = total, "Building complete index in background");
        let mut start = 0;
        while start < total {
            let end = (start + step).min(total);
            let positions: Vec<usize> = (start..end).collect();
            ids.extend(self.ids_at_positions(&positions).await);
            start = end;
            if start < total {
                sleep(delay).await;
            }
        }

        if self.contract.write_generation() != generation {
            tracing::debug!("Contract changed while indexing, discarding complete index");
            return false;
        }

        let index = self.indexes.publish(
            key,
            TokenIndex::new(ids, IndexTier::Complete, total, self.ttl_of(IndexTier::Complete), generation),
        );
        tracing::info!(tokens = index.len(), "Published complete index");
        true
    }

    /// Wait for the background job of `scope` and return the resulting index
    ///
    /// Falls back to the current index when the job fails or none can run.
    pub async fn wait_for_complete_index(self: &Arc<Self>, scope: &IndexScope) -> AppResult<Arc<TokenIndex>> {
        let key = scope.key(self.contract.address());
        let job = self.jobs.lock().get(&key).cloned();
        if let Some(job) = job {
            job.await;
        }

        match self.indexes.get_fresh(&key, self.contract.write_generation()) {
            Some(index) if index.tier == IndexTier::Complete => Ok(index),
            Some(index) => {
                // No job ran to completion; start one for next time
                if let IndexScope::All = scope {
                    let job = self.spawn_complete_job(&key, index.expected_len, index.generation);
                    if job.await {
                        if let Some(complete) = self.indexes.get_fresh(&key, self.contract.write_generation()) {
                            return Ok(complete);
                        }
                    }
                }
                Ok(index)
            }
            None => self.current_index(scope).await,
        }
    }
}

/// Restartable lazy sequence of batches over one scope
///
/// Calls queued for a batch are skipped once the cursor is cancelled or
/// restarted.
pub struct BatchCursor {
    engine: Arc<DiscoveryEngine>,
    scope: IndexScope,
    batch_size: usize,
    next_start: usize,
    exhausted: bool,
    cancel: CancellationToken,
}

impl BatchCursor {
    fn new(engine: Arc<DiscoveryEngine>, scope: IndexScope, batch_size: usize) -> Self {
        let batch_size = if batch_size == 0 {
            engine.config.batch_size
        } else {
            batch_size
        };
        Self {
            engine,
            scope,
            batch_size,
            next_start: 0,
            exhausted: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn scope(&self) -> &IndexScope {
        &self.scope
    }

    pub fn position(&self) -> usize {
        self.next_start
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Next batch, or `None` once the scope is exhausted
    ///
    /// On error the position is kept so the same batch can be retried.
    pub async fn next_batch(&mut self) -> AppResult<Option<TokenBatch>> {
        if self.exhausted {
            return Ok(None);
        }

        let contract = self.engine.contract.with_cancellation(self.cancel.clone());
        let batch = self
            .engine
            .batch_with(&contract, &self.scope, self.next_start, self.batch_size)
            .await?;

        self.next_start = batch.next_start;
        self.exhausted = !batch.has_more;
        Ok(Some(batch))
    }

    /// Go back to the first batch, abandoning queued calls of this cursor
    pub fn restart(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.next_start = 0;
        self.exhausted = false;
    }

    /// Skip queued calls of this cursor that have not started yet
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stream of batches; ends after the last batch or the first error
    pub fn into_stream(self) -> impl Stream<Item = AppResult<TokenBatch>> {
        stream::unfold(Some(self), |cursor| async move {
            let mut cursor = cursor?;
            match cursor.next_batch().await {
                Ok(Some(batch)) => Some((Ok(batch), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}
