//! Owner enumeration
//!
//! `balanceOf` drives the lookup and is the only call whose failure reaches
//! the caller. After that the engine tries, in order:
//! 1. `tokenOfOwnerByIndex(owner, i)` for `i` in `[0, balance)`
//! 2. Transfer logs with `to == owner`, each candidate re-verified with `ownerOf`
//! 3. `ownerOf` probing over `tokenByIndex` ids, or a guessed id range
//!
//! Results are always in ascending id order.

use super::DiscoveryEngine;
use crate::chain::abi::IGalleryNft;
use crate::chain::{LogEntry, LogFilter};
use crate::constants::interfaces;
use crate::constants::sinks::is_burn_sink;
use crate::error::{AppError, AppResult};
use crate::models::{DiscoverySource, OwnedTokens, SortOrder};
use alloy_primitives::{Address, U256};
use alloy_sol_types::SolEvent;
use futures_util::future::join_all;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

impl DiscoveryEngine {
    /// Every token currently held by `owner`, ascending by id
    pub async fn tokens_of_owner(&self, owner: Address) -> AppResult<OwnedTokens> {
        let balance = self.contract.balance_of(owner).await?;
        if balance.is_zero() {
            return Ok(OwnedTokens {
                owner,
                balance,
                tokens: Vec::new(),
                order: SortOrder::AscendingId,
                source: DiscoverySource::Empty,
            });
        }
        let wanted = usize::try_from(balance).unwrap_or(usize::MAX);

        let (ids, source) = match self.ids_by_owner_index(owner, wanted).await {
            Ok(ids) => (ids, DiscoverySource::Enumerable),
            Err(e) => {
                tracing::debug!(owner = %owner, error = %e, "Owner enumeration unsupported, scanning Transfer logs");
                let from_logs = self.ids_from_transfer_logs(owner).await;
                if from_logs.is_empty() {
                    tracing::debug!(owner = %owner, "No tokens found in logs, scanning ownerOf over token range");
                    (self.ids_from_range_scan(owner, wanted).await, DiscoverySource::RangeScan)
                } else {
                    (from_logs, DiscoverySource::TransferLogs)
                }
            }
        };

        let mut ids: Vec<U256> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        SortOrder::AscendingId.sort(&mut ids);

        let tokens = self
            .fetch_records(&self.contract, &ids)
            .await
            .into_iter()
            .filter(|record| record.owner == owner)
            .collect::<Vec<_>>();

        tracing::info!(
            owner = %owner,
            balance = %balance,
            found = tokens.len(),
            source = ?source,
            "Enumerated owner tokens"
        );

        Ok(OwnedTokens {
            owner,
            balance,
            tokens,
            order: SortOrder::AscendingId,
            source,
        })
    }

    /// `tokenOfOwnerByIndex` walk
    ///
    /// Fails if the first lookup fails (contract lacks the function); later
    /// per-index failures are skipped.
    async fn ids_by_owner_index(&self, owner: Address, balance: usize) -> AppResult<Vec<U256>> {
        let first = self.contract.token_of_owner_by_index(owner, U256::ZERO).await?;

        let rest = join_all(
            (1..balance).map(|i| self.contract.token_of_owner_by_index(owner, U256::from(i))),
        )
        .await;

        let mut ids = Vec::with_capacity(balance);
        ids.push(first);
        for (i, result) in rest.into_iter().enumerate() {
            match result {
                Ok(id) => ids.push(id),
                Err(e) => tracing::warn!(owner = %owner, index = i + 1, error = %e, "Skipping owner index"),
            }
        }
        Ok(ids)
    }

    /// Candidates from Transfer logs, keeping those `owner` still holds
    async fn ids_from_transfer_logs(&self, owner: Address) -> Vec<U256> {
        let candidates = match self.transfer_candidates(owner).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(owner = %owner, error = %e, "Transfer log scan failed");
                return Vec::new();
            }
        };
        tracing::debug!(owner = %owner, candidates = candidates.len(), "Collected Transfer candidates");

        let candidates: Vec<U256> = candidates.into_iter().collect();
        let owners = join_all(candidates.iter().map(|id| self.contract.owner_of(*id))).await;

        candidates
            .into_iter()
            .zip(owners)
            .filter_map(|(id, current)| match current {
                Ok(current) if current == owner && !is_burn_sink(&current) => Some(id),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!(token_id = %id, error = %e, "Candidate no longer resolvable");
                    None
                }
            })
            .collect()
    }

    /// Token ids transferred to `owner`, scanned in block chunks
    ///
    /// A chunk that errors or exceeds the log timeout ends the scan with the
    /// candidates collected so far.
    async fn transfer_candidates(&self, owner: Address) -> AppResult<BTreeSet<U256>> {
        let queue = self.contract.queue().clone();
        let transport = self.contract.transport().clone();
        let retry = queue.default_retry();
        let latest = queue
            .execute_with_retry(
                move || {
                    let transport = transport.clone();
                    async move { transport.block_number().await }
                },
                retry,
            )
            .await?;

        let chunk = self.config.log_chunk_size.max(1);
        let limit = Duration::from_millis(self.config.log_timeout_ms);
        let mut candidates = BTreeSet::new();
        let mut from_block = self.config.log_start_block;

        while from_block <= latest {
            let to_block = from_block.saturating_add(chunk - 1).min(latest);
            let filter = LogFilter {
                address: self.contract.address(),
                topics: [
                    Some(IGalleryNft::Transfer::SIGNATURE_HASH),
                    None,
                    Some(owner.into_word()),
                    None,
                ],
                from_block,
                to_block,
            };

            match self.logs_with_timeout(filter, limit).await {
                Ok(logs) => candidates.extend(logs.iter().filter_map(transferred_token_id)),
                Err(e) => {
                    tracing::warn!(from_block = from_block, to_block = to_block, error = %e, "Log query failed, stopping scan");
                    break;
                }
            }
            from_block = to_block + 1;
        }

        Ok(candidates)
    }

    async fn logs_with_timeout(&self, filter: LogFilter, limit: Duration) -> AppResult<Vec<LogEntry>> {
        let transport = self.contract.transport().clone();
        let queue = self.contract.queue().clone();
        let cancel = CancellationToken::new();
        let query = queue.execute_cancellable(cancel.clone(), move || async move {
            transport.get_logs(&filter).await
        });

        match timeout(limit, query).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                Err(AppError::Timeout(format!("eth_getLogs exceeded {:?}", limit)))
            }
        }
    }

    /// Query `ownerOf` across candidate ids until `balance` tokens of `owner` are found
    async fn ids_from_range_scan(&self, owner: Address, balance: usize) -> Vec<U256> {
        let total = match self.contract.total_supply().await {
            Ok(supply) => match self.indexable_len(supply) {
                Ok(total) => total,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping range scan");
                    return Vec::new();
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, "totalSupply unavailable for range scan");
                0
            }
        };

        let group = self.config.scan_concurrency.max(1);
        let delay = Duration::from_millis(self.config.scan_delay_ms);
        let mut found = Vec::new();
        let mut resolved_any = false;

        if total > 0
            && self
                .contract
                .supports_interface(interfaces::ERC721_ENUMERABLE)
                .await
                .unwrap_or(false)
        {
            let mut start = 0;
            while start < total && found.len() < balance {
                if start > 0 {
                    sleep(delay).await;
                }
                let end = (start + group).min(total);
                let positions: Vec<usize> = (start..end).collect();
                let ids = self.ids_at_positions(&positions).await;
                resolved_any |= !ids.is_empty();
                self.collect_owned(owner, &ids, &mut found).await;
                start = end;
            }
        }

        if !resolved_any {
            let upper = (total.saturating_mul(2) as u64).max(self.config.min_scan_range);
            tracing::debug!(upper = upper, "Guessing token id range");
            let mut next: u64 = 0;
            while found.len() < balance {
                if next > 0 {
                    sleep(delay).await;
                }
                let last = next.saturating_add(group as u64 - 1).min(upper);
                let ids: Vec<U256> = (next..=last).map(U256::from).collect();
                self.collect_owned(owner, &ids, &mut found).await;
                if last == upper {
                    break;
                }
                next = last + 1;
            }
        }

        found
    }

    /// Push the ids in `ids` currently held by `owner`
    async fn collect_owned(&self, owner: Address, ids: &[U256], found: &mut Vec<U256>) {
        let owners = join_all(ids.iter().map(|id| self.contract.owner_of(*id))).await;
        for (id, current) in ids.iter().zip(owners) {
            // A revert means "not this owner" (usually a nonexistent id)
            if matches!(current, Ok(current) if current == owner && !is_burn_sink(&current)) {
                found.push(*id);
            }
        }
    }
}

/// Token id of an ERC-721 Transfer log (`tokenId` is the third indexed topic)
fn transferred_token_id(log: &LogEntry) -> Option<U256> {
    if log.topics.first() != Some(&IGalleryNft::Transfer::SIGNATURE_HASH) {
        return None;
    }
    log.topics.get(3).map(|t| U256::from_be_slice(t.as_slice()))
}
