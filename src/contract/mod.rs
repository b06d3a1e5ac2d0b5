//! Contract access service
//!
//! Typed wrapper over the gallery contract and its ERC-6551 companions.
//! Every read follows the same pipeline:
//!
//! ```text
//! TTL cache -> remote accelerator (allow-listed reads only)
//!           -> deduplicator -> rate-limited queue -> eth_call
//! ```
//!
//! Successful results are written back to the cache with the TTL of their
//! data class. State-changing calls live in [`writes`] and bypass both the
//! cache and the deduplicator.

mod codec;
mod writes;

pub use codec::*;

use crate::accelerator::RemoteAccelerator;
use crate::cache::{CacheKey, KeyArg, TtlClass, TtlStore};
use crate::chain::abi::{IERC6551Account, IERC6551Registry, IGalleryNft};
use crate::chain::{parse_address, ChainTransport, TransactionSigner};
use crate::config::{ContractConfig, TtlConfig};
use crate::constants::sinks::is_burn_sink;
use crate::dedup::{DedupStats, RequestDeduplicator};
use crate::error::{AppError, AppResult};
use crate::metadata::MetadataService;
use crate::models::{AccountInfo, CreatorInfo, TokenBoundAccount, TokenDetails, TokenRecord};
use crate::queue::{RateLimitedQueue, RetryPolicy};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Parameters used to derive token-bound accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSettings {
    pub registry: Address,
    pub implementation: Address,
    pub salt: B256,
    pub chain_id: U256,
}

impl AccountSettings {
    pub fn from_config(config: &ContractConfig) -> AppResult<Option<Self>> {
        if config.account_implementation.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            registry: parse_address(&config.registry_address)?,
            implementation: parse_address(&config.account_implementation)?,
            salt: B256::from(U256::from(config.account_salt).to_be_bytes::<32>()),
            chain_id: U256::from(config.chain_id),
        }))
    }
}

/// Typed access to the gallery contract
///
/// Cheap to clone; clones share cache, deduplicator, queue and signer.
#[derive(Clone)]
pub struct ContractService {
    address: Address,
    transport: Arc<dyn ChainTransport>,
    cache: Arc<dyn TtlStore>,
    dedup: RequestDeduplicator<Bytes>,
    queue: Arc<RateLimitedQueue>,
    metadata: Arc<MetadataService>,
    accelerator: Option<Arc<RemoteAccelerator>>,
    signer: Option<Arc<dyn TransactionSigner>>,
    accounts: Option<AccountSettings>,
    ttl: TtlConfig,
    retry: RetryPolicy,
    cancel: CancellationToken,
    write_generation: Arc<AtomicU64>,
}

impl ContractService {
    pub fn new(
        address: Address,
        transport: Arc<dyn ChainTransport>,
        cache: Arc<dyn TtlStore>,
        queue: Arc<RateLimitedQueue>,
        metadata: Arc<MetadataService>,
        ttl: TtlConfig,
    ) -> Self {
        let retry = queue.default_retry();
        Self {
            address,
            transport,
            cache,
            dedup: RequestDeduplicator::new(Duration::from_secs(ttl.dedup_secs)),
            queue,
            metadata,
            accelerator: None,
            signer: None,
            accounts: None,
            ttl,
            retry,
            cancel: CancellationToken::new(),
            write_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_accelerator(mut self, accelerator: Arc<RemoteAccelerator>) -> Self {
        self.accelerator = Some(accelerator);
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_accounts(mut self, accounts: AccountSettings) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Clone whose queued calls are skipped once `token` is cancelled
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        let mut scoped = self.clone();
        scoped.cancel = token;
        scoped
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn queue(&self) -> &Arc<RateLimitedQueue> {
        &self.queue
    }

    pub fn cache(&self) -> &Arc<dyn TtlStore> {
        &self.cache
    }

    pub fn metadata(&self) -> &Arc<MetadataService> {
        &self.metadata
    }

    pub fn transport(&self) -> &Arc<dyn ChainTransport> {
        &self.transport
    }

    pub fn ttl(&self) -> &TtlConfig {
        &self.ttl
    }

    pub fn dedup_stats(&self) -> DedupStats {
        self.dedup.stats()
    }

    pub fn accelerator(&self) -> Option<&Arc<RemoteAccelerator>> {
        self.accelerator.as_ref()
    }

    /// Bumped after every successful write; derived indexes compare against it
    pub fn write_generation(&self) -> u64 {
        self.write_generation.load(Ordering::Acquire)
    }

    /// Drop expired deduplicator results
    pub fn sweep(&self) -> usize {
        self.dedup.sweep_expired()
    }

    // ---- gallery reads ----

    pub async fn name(&self) -> AppResult<String> {
        self.read(self.address, IGalleryNft::nameCall {}, vec![], TtlClass::Immutable)
            .await
    }

    pub async fn total_supply(&self) -> AppResult<U256> {
        self.read(self.address, IGalleryNft::totalSupplyCall {}, vec![], TtlClass::Volatile)
            .await
    }

    pub async fn token_by_index(&self, index: U256) -> AppResult<U256> {
        self.read(
            self.address,
            IGalleryNft::tokenByIndexCall { index },
            vec![index.into()],
            TtlClass::SemiStable,
        )
        .await
    }

    pub async fn token_of_owner_by_index(&self, owner: Address, index: U256) -> AppResult<U256> {
        self.read(
            self.address,
            IGalleryNft::tokenOfOwnerByIndexCall { owner, index },
            vec![owner.into(), index.into()],
            TtlClass::SemiStable,
        )
        .await
    }

    pub async fn balance_of(&self, owner: Address) -> AppResult<U256> {
        self.read(
            self.address,
            IGalleryNft::balanceOfCall { owner },
            vec![owner.into()],
            TtlClass::Volatile,
        )
        .await
    }

    pub async fn owner_of(&self, token_id: U256) -> AppResult<Address> {
        self.read(
            self.address,
            IGalleryNft::ownerOfCall { tokenId: token_id },
            vec![token_id.into()],
            TtlClass::SemiStable,
        )
        .await
    }

    pub async fn token_uri(&self, token_id: U256) -> AppResult<String> {
        self.read(
            self.address,
            IGalleryNft::tokenURICall { tokenId: token_id },
            vec![token_id.into()],
            TtlClass::SemiStable,
        )
        .await
    }

    pub async fn supports_interface(&self, interface_id: [u8; 4]) -> AppResult<bool> {
        self.read(
            self.address,
            IGalleryNft::supportsInterfaceCall {
                interfaceId: interface_id.into(),
            },
            vec![interface_id.into()],
            TtlClass::Immutable,
        )
        .await
    }

    pub async fn creator_tokens(&self, creator: Address) -> AppResult<Vec<U256>> {
        self.read(
            self.address,
            IGalleryNft::getCreatorTokensCall { creator },
            vec![creator.into()],
            TtlClass::SemiStable,
        )
        .await
    }

    pub async fn creator_name(&self, creator: Address) -> AppResult<String> {
        self.read(
            self.address,
            IGalleryNft::getCreatorNameCall { creator },
            vec![creator.into()],
            TtlClass::Creator,
        )
        .await
    }

    pub async fn creator_addresses(&self) -> AppResult<Vec<Address>> {
        self.read(self.address, IGalleryNft::getCreatorsCall {}, vec![], TtlClass::Creator)
            .await
    }

    pub async fn token_creator(&self, token_id: U256) -> AppResult<Address> {
        self.read(
            self.address,
            IGalleryNft::getTokenCreatorCall { tokenId: token_id },
            vec![token_id.into()],
            TtlClass::Immutable,
        )
        .await
    }

    pub async fn is_soulbound(&self, token_id: U256) -> AppResult<bool> {
        self.read(
            self.address,
            IGalleryNft::isSoulboundCall { tokenId: token_id },
            vec![token_id.into()],
            TtlClass::Immutable,
        )
        .await
    }

    /// Every registered creator with its display name
    ///
    /// A missing name falls back to an empty string.
    pub async fn creators(&self) -> AppResult<Vec<CreatorInfo>> {
        let addresses = self.creator_addresses().await?;
        let mut creators = Vec::with_capacity(addresses.len());
        for address in addresses {
            let name = match self.creator_name(address).await {
                Ok(name) => name,
                Err(e) => {
                    tracing::debug!(creator = %address, error = %e, "Creator name unavailable");
                    String::new()
                }
            };
            creators.push(CreatorInfo { address, name });
        }
        Ok(creators)
    }

    /// Owner, URI and soulbound flag of one token
    ///
    /// A token owned by a burn sink is reported as `NotFound`. The soulbound
    /// flag defaults to `false` when the contract cannot answer.
    pub async fn token_record(&self, token_id: U256) -> AppResult<TokenRecord> {
        let owner = self.owner_of(token_id).await?;
        if is_burn_sink(&owner) {
            return Err(AppError::NotFound(format!("Token {} is burned", token_id)));
        }

        let token_uri = self.token_uri(token_id).await?;
        let is_sbt = match self.is_soulbound(token_id).await {
            Ok(flag) => flag,
            Err(e) => {
                tracing::debug!(token_id = %token_id, error = %e, "Soulbound flag unavailable, assuming transferable");
                false
            }
        };

        Ok(TokenRecord {
            token_id,
            owner,
            token_uri,
            contract_address: self.address,
            is_sbt,
        })
    }

    /// Record plus creator attribution and metadata
    ///
    /// Creator and metadata are best effort; only the record is required.
    pub async fn token_details(&self, token_id: U256) -> AppResult<TokenDetails> {
        let record = self.token_record(token_id).await?;

        let creator = self.token_creator(token_id).await.ok().filter(|c| !c.is_zero());
        let creator_name = match creator {
            Some(c) => self.creator_name(c).await.ok().filter(|n| !n.is_empty()),
            None => None,
        };

        let metadata = match self.metadata.fetch(&record.token_uri).await {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::debug!(token_id = %token_id, error = %e, "Metadata unavailable");
                None
            }
        };
        let image_url = metadata
            .as_ref()
            .and_then(|m| m.image.as_deref())
            .and_then(|u| self.metadata.resolve_media(u));
        let animation_url = metadata
            .as_ref()
            .and_then(|m| m.animation_url.as_deref())
            .and_then(|u| self.metadata.resolve_media(u));

        Ok(TokenDetails {
            record,
            creator,
            creator_name,
            metadata,
            image_url,
            animation_url,
        })
    }

    // ---- ERC-6551 reads ----

    fn account_settings(&self) -> AppResult<AccountSettings> {
        self.accounts
            .ok_or_else(|| AppError::Config("Token-bound accounts are not configured".to_string()))
    }

    /// Deterministic token-bound account address
    pub async fn token_bound_account(&self, token_id: U256) -> AppResult<TokenBoundAccount> {
        let settings = self.account_settings()?;
        let account = self
            .read(
                settings.registry,
                IERC6551Registry::accountCall {
                    implementation: settings.implementation,
                    salt: settings.salt,
                    chainId: settings.chain_id,
                    tokenContract: self.address,
                    tokenId: token_id,
                },
                vec![
                    settings.implementation.into(),
                    KeyArg::Bytes(settings.salt.to_vec()),
                    settings.chain_id.into(),
                    self.address.into(),
                    token_id.into(),
                ],
                TtlClass::Immutable,
            )
            .await?;

        Ok(TokenBoundAccount { token_id, account })
    }

    /// Token, owner and state reported by an account contract
    pub async fn account_info(&self, account: Address) -> AppResult<AccountInfo> {
        let (chain_id, token_contract, token_id) = self
            .read_mapped(
                account,
                IERC6551Account::tokenCall {},
                vec![],
                TtlClass::Immutable,
                |r| AccountToken(r.chainId, r.tokenContract, r.tokenId),
            )
            .await
            .map(|t| (t.0, t.1, t.2))?;
        let owner = self
            .read(account, IERC6551Account::ownerCall {}, vec![], TtlClass::Volatile)
            .await?;
        let state = self
            .read(account, IERC6551Account::stateCall {}, vec![], TtlClass::Volatile)
            .await?;

        Ok(AccountInfo {
            account,
            chain_id,
            token_contract,
            token_id,
            owner,
            state,
        })
    }

    // ---- pipeline ----

    async fn read<C>(
        &self,
        to: Address,
        call: C,
        args: Vec<KeyArg>,
        class: TtlClass,
    ) -> AppResult<C::Return>
    where
        C: SolCall + Send + 'static,
        C::Return: ReadValue,
    {
        self.read_mapped(to, call, args, class, |r| r).await
    }

    async fn read_mapped<C, T, M>(
        &self,
        to: Address,
        call: C,
        args: Vec<KeyArg>,
        class: TtlClass,
        map: M,
    ) -> AppResult<T>
    where
        C: SolCall + Send + 'static,
        T: ReadValue,
        M: FnOnce(C::Return) -> T + Send,
    {
        let method = method_name(C::SIGNATURE);
        let key = CacheKey::contract_read(to, method, &args);

        if let Some(cached) = self.cache.get(key.as_str()) {
            if let Some(value) = T::from_json(&cached) {
                tracing::trace!(key = %key, "Cache hit");
                return Ok(value);
            }
            self.cache.remove(key.as_str());
        }
        tracing::debug!(key = %key, "Cache miss");

        if to == self.address {
            if let Some(accelerator) = &self.accelerator {
                if let Some(value) = accelerator
                    .fetch(to, method, &args)
                    .await
                    .and_then(|v| T::from_json(&v))
                {
                    self.cache.set(key.as_str(), value.to_json(), class.ttl(&self.ttl));
                    return Ok(value);
                }
            }
        }

        let raw = self.call_deduplicated(&key, to, Bytes::from(call.abi_encode())).await?;
        let value = map(C::abi_decode_returns(&raw)?);
        self.cache.set(key.as_str(), value.to_json(), class.ttl(&self.ttl));
        Ok(value)
    }

    async fn call_deduplicated(&self, key: &CacheKey, to: Address, data: Bytes) -> AppResult<Bytes> {
        let transport = self.transport.clone();
        let queue = self.queue.clone();
        let retry = self.retry;

        // Queued work follows the shared token, so one caller cancelling
        // never takes the result away from another joined on the same key
        self.dedup
            .execute_cancellable(key.as_str(), self.cancel.clone(), move |shared| async move {
                queue
                    .execute_with_retry_cancellable(
                        shared,
                        move || {
                            let transport = transport.clone();
                            let data = data.clone();
                            async move { transport.call(to, data).await }
                        },
                        retry,
                    )
                    .await
            })
            .await
    }

    /// Read that skips cache, accelerator and deduplicator
    ///
    /// Used for the pre-flight checks of state-changing calls.
    pub(crate) async fn read_fresh<C>(&self, to: Address, call: C) -> AppResult<C::Return>
    where
        C: SolCall + Send + 'static,
    {
        let transport = self.transport.clone();
        let data = Bytes::from(call.abi_encode());
        let raw = self
            .queue
            .execute_with_retry_cancellable(
                self.cancel.clone(),
                move || {
                    let transport = transport.clone();
                    let data = data.clone();
                    async move { transport.call(to, data).await }
                },
                self.retry,
            )
            .await?;
        Ok(C::abi_decode_returns(&raw)?)
    }
}

/// `ownerOf(uint256)` -> `ownerOf`
fn method_name(signature: &str) -> &str {
    signature.split('(').next().unwrap_or(signature)
}

/// `token()` of an ERC-6551 account
struct AccountToken(U256, Address, U256);

impl ReadValue for AccountToken {
    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(vec![self.0.to_json(), self.1.to_json(), self.2.to_json()])
    }

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value.as_array()?.as_slice() {
            [chain_id, contract, token_id] => Some(Self(
                U256::from_json(chain_id)?,
                Address::from_json(contract)?,
                U256::from_json(token_id)?,
            )),
            _ => None,
        }
    }
}
