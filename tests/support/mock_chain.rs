//! In-memory gallery chain
//!
//! Implements [`ChainTransport`] by decoding ABI calldata, so the whole
//! cache -> dedup -> queue -> transport pipeline runs against it unchanged.

#![allow(dead_code)]

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent, SolValue};
use async_trait::async_trait;
use nft_gallery_gateway::cache::{MemoryStore, TtlStore};
use nft_gallery_gateway::chain::abi::{IERC6551Account, IERC6551Registry, IGalleryNft};
use nft_gallery_gateway::chain::{ChainTransport, LogEntry, LogFilter, NodeSigner, TxRequest};
use nft_gallery_gateway::config::{DiscoveryConfig, MetadataConfig, QueueConfig, TtlConfig};
use nft_gallery_gateway::constants::{interfaces, sinks};
use nft_gallery_gateway::contract::{AccountSettings, ContractService};
use nft_gallery_gateway::discovery::DiscoveryEngine;
use nft_gallery_gateway::error::{AppError, AppResult};
use nft_gallery_gateway::metadata::MetadataService;
use nft_gallery_gateway::queue::RateLimitedQueue;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub const GALLERY: Address = Address::new([0xAA; 20]);
pub const REGISTRY: Address = Address::new([0x65; 20]);
pub const IMPLEMENTATION: Address = Address::new([0x42; 20]);
pub const CHAIN_ID: u64 = 31337;

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn id(n: u64) -> U256 {
    U256::from(n)
}

#[derive(Debug, Clone)]
struct MockToken {
    owner: Address,
    uri: String,
    creator: Address,
    soulbound: bool,
}

#[derive(Default)]
struct ChainState {
    tokens: BTreeMap<U256, MockToken>,
    /// Enumeration order (mint order), as `tokenByIndex` sees it
    order: Vec<U256>,
    creator_names: Vec<(Address, String)>,
    accounts: HashMap<Address, U256>,
    logs: Vec<LogEntry>,
    block: u64,
    owner_enumeration: bool,
    reported_supply: Option<U256>,
    soulbound_support: bool,
    failing: HashSet<&'static str>,
    rate_limited_calls: usize,
    calls: HashMap<&'static str, usize>,
    sent: Vec<TxRequest>,
}

/// Scriptable ERC-721 Enumerable gallery with ERC-6551 accounts
pub struct MockChain {
    state: Mutex<ChainState>,
    latency: Mutex<Option<Duration>>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChainState {
                block: 1,
                owner_enumeration: true,
                soulbound_support: true,
                ..ChainState::default()
            }),
            latency: Mutex::new(None),
        }
    }

    /// Mint `token_id` to `owner`, emitting a Transfer log
    pub fn mint(&self, token_id: u64, owner: Address, creator: Address) {
        let token_id = id(token_id);
        let mut state = self.state.lock();
        state.tokens.insert(
            token_id,
            MockToken {
                owner,
                uri: format!("ipfs://meta/{}", token_id),
                creator,
                soulbound: false,
            },
        );
        state.order.push(token_id);
        Self::push_transfer(&mut state, Address::ZERO, owner, token_id);
    }

    /// Move a token without touching the enumeration
    pub fn transfer(&self, token_id: u64, to: Address) {
        let token_id = id(token_id);
        let mut state = self.state.lock();
        let from = match state.tokens.get_mut(&token_id) {
            Some(token) => std::mem::replace(&mut token.owner, to),
            None => return,
        };
        Self::push_transfer(&mut state, from, to, token_id);
    }

    /// Burn by sending the token to the dead address (stays enumerable)
    pub fn burn_to_sink(&self, token_id: u64) {
        self.transfer(token_id, sinks::DEAD);
    }

    /// Burn by destroying the token (leaves the enumeration)
    pub fn destroy(&self, token_id: u64) {
        let token_id = id(token_id);
        let mut state = self.state.lock();
        if let Some(token) = state.tokens.remove(&token_id) {
            state.order.retain(|t| *t != token_id);
            Self::push_transfer(&mut state, token.owner, Address::ZERO, token_id);
        }
    }

    pub fn set_uri(&self, token_id: u64, uri: &str) {
        if let Some(token) = self.state.lock().tokens.get_mut(&id(token_id)) {
            token.uri = uri.to_string();
        }
    }

    pub fn set_soulbound(&self, token_id: u64) {
        if let Some(token) = self.state.lock().tokens.get_mut(&id(token_id)) {
            token.soulbound = true;
        }
    }

    pub fn set_creator_name(&self, creator: Address, name: &str) {
        self.state.lock().creator_names.push((creator, name.to_string()));
    }

    /// `totalSupply` answers `supply` regardless of what was minted
    pub fn report_total_supply(&self, supply: U256) {
        self.state.lock().reported_supply = Some(supply);
    }

    /// Contract without `tokenOfOwnerByIndex` and without Enumerable support
    pub fn disable_owner_enumeration(&self) {
        self.state.lock().owner_enumeration = false;
    }

    /// Contract without `isSoulbound`
    pub fn disable_soulbound(&self) {
        self.state.lock().soulbound_support = false;
    }

    /// Drop every recorded log, as if the provider pruned history
    pub fn clear_logs(&self) {
        self.state.lock().logs.clear();
    }

    /// Every call to `method` fails with a network error
    pub fn fail(&self, method: &'static str) {
        self.state.lock().failing.insert(method);
    }

    /// The next `n` calls are rejected with a rate-limit error
    pub fn rate_limit_next(&self, n: usize) {
        self.state.lock().rate_limited_calls = n;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state.lock().calls.get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    pub fn sent_transactions(&self) -> Vec<TxRequest> {
        self.state.lock().sent.clone()
    }

    pub fn owner(&self, token_id: u64) -> Option<Address> {
        self.state.lock().tokens.get(&id(token_id)).map(|t| t.owner)
    }

    /// Address the registry derives for `token_id`
    pub fn account_for(token_id: U256) -> Address {
        let mut word = token_id.to_be_bytes::<32>();
        word[12] = 0x65;
        word[13] = 0x51;
        Address::from_word(B256::from(word))
    }

    fn push_transfer(state: &mut ChainState, from: Address, to: Address, token_id: U256) {
        state.block += 1;
        let block = state.block;
        state.logs.push(LogEntry {
            address: GALLERY,
            topics: vec![
                IGalleryNft::Transfer::SIGNATURE_HASH,
                from.into_word(),
                to.into_word(),
                B256::from(token_id.to_be_bytes::<32>()),
            ],
            data: Bytes::new(),
            block_number: Some(block),
        });
    }

    fn record(&self, method: &'static str) -> AppResult<()> {
        let mut state = self.state.lock();
        *state.calls.entry(method).or_default() += 1;
        if state.rate_limited_calls > 0 {
            state.rate_limited_calls -= 1;
            return Err(AppError::RateLimited("429 Too Many Requests".to_string()));
        }
        if state.failing.contains(method) {
            return Err(AppError::Network(format!("{} unavailable", method)));
        }
        Ok(())
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn answer(&self, to: Address, method: &'static str, data: &[u8]) -> AppResult<Bytes> {
        let mut state = self.state.lock();

        if to == REGISTRY {
            let c = IERC6551Registry::accountCall::abi_decode(data)?;
            let account = Self::account_for(c.tokenId);
            state.accounts.insert(account, c.tokenId);
            return Ok(encode(account));
        }

        if to != GALLERY {
            let Some(token_id) = state.accounts.get(&to).copied() else {
                return Err(revert("not an account"));
            };
            let owner = state.tokens.get(&token_id).map(|t| t.owner).unwrap_or_default();
            return match method {
                "token" => Ok((U256::from(CHAIN_ID), GALLERY, token_id).abi_encode_params().into()),
                "owner" => Ok(encode(owner)),
                "state" => Ok(encode(U256::ZERO)),
                _ => Err(revert("unknown account method")),
            };
        }

        let existing = |state: &ChainState, token_id: U256| {
            state
                .tokens
                .get(&token_id)
                .cloned()
                .ok_or_else(|| revert("ERC721: invalid token ID"))
        };

        match method {
            "name" => Ok(encode("Gallery".to_string())),
            "totalSupply" => Ok(encode(state.reported_supply.unwrap_or(U256::from(state.order.len())))),
            "tokenByIndex" => {
                let c = IGalleryNft::tokenByIndexCall::abi_decode(data)?;
                let index = usize::try_from(c.index).unwrap_or(usize::MAX);
                state
                    .order
                    .get(index)
                    .map(|t| encode(*t))
                    .ok_or_else(|| revert("ERC721Enumerable: global index out of bounds"))
            }
            "tokenOfOwnerByIndex" => {
                if !state.owner_enumeration {
                    return Err(revert(""));
                }
                let c = IGalleryNft::tokenOfOwnerByIndexCall::abi_decode(data)?;
                let index = usize::try_from(c.index).unwrap_or(usize::MAX);
                state
                    .order
                    .iter()
                    .filter(|t| state.tokens.get(*t).map(|m| m.owner) == Some(c.owner))
                    .nth(index)
                    .map(|t| encode(*t))
                    .ok_or_else(|| revert("ERC721Enumerable: owner index out of bounds"))
            }
            "balanceOf" => {
                let c = IGalleryNft::balanceOfCall::abi_decode(data)?;
                let balance = state.tokens.values().filter(|t| t.owner == c.owner).count();
                Ok(encode(U256::from(balance)))
            }
            "ownerOf" => {
                let c = IGalleryNft::ownerOfCall::abi_decode(data)?;
                existing(&*state, c.tokenId).map(|t| encode(t.owner))
            }
            "tokenURI" => {
                let c = IGalleryNft::tokenURICall::abi_decode(data)?;
                existing(&*state, c.tokenId).map(|t| encode(t.uri))
            }
            "supportsInterface" => {
                let c = IGalleryNft::supportsInterfaceCall::abi_decode(data)?;
                let enumerable = c.interfaceId.0 == interfaces::ERC721_ENUMERABLE;
                Ok(encode(enumerable && state.owner_enumeration))
            }
            "getCreatorTokens" => {
                let c = IGalleryNft::getCreatorTokensCall::abi_decode(data)?;
                let ids: Vec<U256> = state
                    .order
                    .iter()
                    .filter(|t| state.tokens.get(*t).map(|m| m.creator) == Some(c.creator))
                    .copied()
                    .collect();
                Ok(encode(ids))
            }
            "getCreatorName" => {
                let c = IGalleryNft::getCreatorNameCall::abi_decode(data)?;
                let name = state
                    .creator_names
                    .iter()
                    .find(|(a, _)| *a == c.creator)
                    .map(|(_, n)| n.clone())
                    .unwrap_or_default();
                Ok(encode(name))
            }
            "getCreators" => {
                let creators: Vec<Address> = state.creator_names.iter().map(|(a, _)| *a).collect();
                Ok(encode(creators))
            }
            "getTokenCreator" => {
                let c = IGalleryNft::getTokenCreatorCall::abi_decode(data)?;
                existing(&*state, c.tokenId).map(|t| encode(t.creator))
            }
            "isSoulbound" => {
                if !state.soulbound_support {
                    return Err(revert(""));
                }
                let c = IGalleryNft::isSoulboundCall::abi_decode(data)?;
                existing(&*state, c.tokenId).map(|t| encode(t.soulbound))
            }
            _ => Err(revert("unknown selector")),
        }
    }
}

fn revert(reason: &str) -> AppError {
    AppError::Revert {
        reason: (!reason.is_empty()).then(|| reason.to_string()),
    }
}

/// Return data of a single-value function
fn encode<T: SolValue>(value: T) -> Bytes {
    (value,).abi_encode_params().into()
}

fn method_of(data: &[u8]) -> &'static str {
    let Some(selector) = data.get(..4) else {
        return "unknown";
    };
    let table: &[([u8; 4], &'static str)] = &[
        (IGalleryNft::nameCall::SELECTOR, "name"),
        (IGalleryNft::totalSupplyCall::SELECTOR, "totalSupply"),
        (IGalleryNft::tokenByIndexCall::SELECTOR, "tokenByIndex"),
        (IGalleryNft::tokenOfOwnerByIndexCall::SELECTOR, "tokenOfOwnerByIndex"),
        (IGalleryNft::balanceOfCall::SELECTOR, "balanceOf"),
        (IGalleryNft::ownerOfCall::SELECTOR, "ownerOf"),
        (IGalleryNft::tokenURICall::SELECTOR, "tokenURI"),
        (IGalleryNft::supportsInterfaceCall::SELECTOR, "supportsInterface"),
        (IGalleryNft::getCreatorTokensCall::SELECTOR, "getCreatorTokens"),
        (IGalleryNft::getCreatorNameCall::SELECTOR, "getCreatorName"),
        (IGalleryNft::getCreatorsCall::SELECTOR, "getCreators"),
        (IGalleryNft::getTokenCreatorCall::SELECTOR, "getTokenCreator"),
        (IGalleryNft::isSoulboundCall::SELECTOR, "isSoulbound"),
        (IGalleryNft::mintCall::SELECTOR, "mint"),
        (IGalleryNft::burnCall::SELECTOR, "burn"),
        (IGalleryNft::safeTransferFromCall::SELECTOR, "safeTransferFrom"),
        (IERC6551Registry::accountCall::SELECTOR, "account"),
        (IERC6551Registry::createAccountCall::SELECTOR, "createAccount"),
        (IERC6551Account::tokenCall::SELECTOR, "token"),
        (IERC6551Account::ownerCall::SELECTOR, "owner"),
        (IERC6551Account::stateCall::SELECTOR, "state"),
        (IERC6551Account::executeCall::SELECTOR, "execute"),
    ];
    table
        .iter()
        .find(|(s, _)| s[..] == selector[..])
        .map(|(_, name)| *name)
        .unwrap_or("unknown")
}

#[async_trait]
impl ChainTransport for MockChain {
    async fn call(&self, to: Address, data: Bytes) -> AppResult<Bytes> {
        let method = method_of(&data);
        self.delay().await;
        self.record(method)?;
        self.answer(to, method, &data)
    }

    async fn send_transaction(&self, tx: TxRequest) -> AppResult<B256> {
        self.record("eth_sendTransaction")?;
        let from = tx.from.unwrap_or_default();
        let method = method_of(&tx.data);

        match method {
            "mint" => {
                let c = IGalleryNft::mintCall::abi_decode(&tx.data)?;
                let next = self.state.lock().tokens.keys().last().map(|t| t.to::<u64>() + 1).unwrap_or(1);
                self.mint(next, c.to, from);
                if c.soulbound {
                    self.set_soulbound(next);
                }
                self.set_uri(next, &c.uri);
            }
            "burn" => {
                let c = IGalleryNft::burnCall::abi_decode(&tx.data)?;
                self.destroy(c.tokenId.to::<u64>());
            }
            "safeTransferFrom" => {
                let c = IGalleryNft::safeTransferFromCall::abi_decode(&tx.data)?;
                self.transfer(c.tokenId.to::<u64>(), c.to);
            }
            "createAccount" => {
                let c = IERC6551Registry::createAccountCall::abi_decode(&tx.data)?;
                let account = Self::account_for(c.tokenId);
                self.state.lock().accounts.insert(account, c.tokenId);
            }
            _ => {}
        }

        let mut state = self.state.lock();
        state.sent.push(tx);
        Ok(B256::with_last_byte(state.sent.len() as u8))
    }

    async fn get_logs(&self, filter: &LogFilter) -> AppResult<Vec<LogEntry>> {
        self.delay().await;
        self.record("eth_getLogs")?;
        let state = self.state.lock();
        Ok(state
            .logs
            .iter()
            .filter(|log| log.address == filter.address)
            .filter(|log| {
                log.block_number
                    .is_some_and(|b| b >= filter.from_block && b <= filter.to_block)
            })
            .filter(|log| {
                filter
                    .topics
                    .iter()
                    .enumerate()
                    .all(|(i, topic)| topic.map_or(true, |t| log.topics.get(i) == Some(&t)))
            })
            .cloned()
            .collect())
    }

    async fn block_number(&self) -> AppResult<u64> {
        self.record("eth_blockNumber")?;
        Ok(self.state.lock().block)
    }
}

/// Timings small enough for tests while keeping the queue's ordering
pub fn fast_queue_config() -> QueueConfig {
    QueueConfig {
        min_interval_ms: 0,
        rate_limit_backoff_ms: 50,
        error_delay_ms: 0,
        max_retries: 3,
        base_retry_delay_ms: 1,
        ..QueueConfig::default()
    }
}

pub fn fast_discovery_config() -> DiscoveryConfig {
    DiscoveryConfig {
        batch_size: 10,
        partial_index_size: 20,
        background_batch_size: 10,
        background_delay_ms: 1,
        log_start_block: 0,
        log_chunk_size: 5,
        log_timeout_ms: 1_000,
        scan_concurrency: 5,
        scan_delay_ms: 1,
        min_scan_range: 20,
        max_index_supply: 10_000,
    }
}

/// Services wired to one mock chain
pub struct Harness {
    pub chain: Arc<MockChain>,
    pub cache: Arc<MemoryStore>,
    pub contract: ContractService,
    pub discovery: Arc<DiscoveryEngine>,
}

impl Harness {
    pub fn new(chain: Arc<MockChain>) -> Self {
        Self::with_queue(chain, fast_queue_config())
    }

    pub fn with_queue(chain: Arc<MockChain>, queue: QueueConfig) -> Self {
        Self::build(chain, queue, TtlConfig::default())
    }

    pub fn with_ttl(chain: Arc<MockChain>, ttl: TtlConfig) -> Self {
        Self::build(chain, fast_queue_config(), ttl)
    }

    pub fn build(chain: Arc<MockChain>, queue: QueueConfig, ttl: TtlConfig) -> Self {
        let cache = Arc::new(MemoryStore::new(1_000));
        let store: Arc<dyn TtlStore> = cache.clone();
        let metadata = Arc::new(
            MetadataService::new(&MetadataConfig::default(), store.clone(), &ttl).expect("metadata service"),
        );
        let contract = ContractService::new(
            GALLERY,
            chain.clone(),
            store,
            Arc::new(RateLimitedQueue::from_config(&queue)),
            metadata,
            ttl,
        )
        .with_accounts(AccountSettings {
            registry: REGISTRY,
            implementation: IMPLEMENTATION,
            salt: B256::ZERO,
            chain_id: U256::from(CHAIN_ID),
        });
        let discovery = DiscoveryEngine::new(contract.clone(), fast_discovery_config());

        Self {
            chain,
            cache,
            contract,
            discovery,
        }
    }

    /// Contract service signing as `signer` through the node
    pub fn signed_as(&self, signer: Address) -> ContractService {
        self.contract
            .clone()
            .with_signer(Arc::new(NodeSigner::new(self.chain.clone(), signer)))
    }
}
