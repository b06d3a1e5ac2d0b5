//! Blockchain RPC boundary
//!
//! [`ChainTransport`] is the raw call surface (`eth_call`,
//! `eth_sendTransaction`, `eth_getLogs`, `eth_blockNumber`). Everything above
//! it works with typed ABI calls from [`abi`].

pub mod abi;
mod http;

pub use http::*;

use crate::error::AppResult;
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::sync::Arc;

/// Transaction to submit
#[derive(Debug, Clone, PartialEq)]
pub struct TxRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl TxRequest {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            from: None,
            to,
            data: data.into(),
            value: U256::ZERO,
        }
    }
}

/// `eth_getLogs` filter for one contract
#[derive(Debug, Clone, PartialEq)]
pub struct LogFilter {
    pub address: Address,
    /// Positional topics; `None` matches anything
    pub topics: [Option<B256>; 4],
    pub from_block: u64,
    pub to_block: u64,
}

/// One log entry
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
}

/// Raw chain access
#[async_trait]
pub trait ChainTransport: Send + Sync {
    /// `eth_call` against the latest block
    async fn call(&self, to: Address, data: Bytes) -> AppResult<Bytes>;

    /// `eth_sendTransaction`, returning the transaction hash
    async fn send_transaction(&self, tx: TxRequest) -> AppResult<B256>;

    /// `eth_getLogs`
    async fn get_logs(&self, filter: &LogFilter) -> AppResult<Vec<LogEntry>>;

    /// `eth_blockNumber`
    async fn block_number(&self) -> AppResult<u64>;
}

/// Signing capability required by state-changing calls
///
/// Wallet connection lives outside this crate; anything that can sign and
/// submit a transaction for a known address fits here.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    async fn send_transaction(&self, tx: TxRequest) -> AppResult<B256>;
}

/// Signer backed by a node-managed account (`eth_sendTransaction` with `from`)
pub struct NodeSigner {
    transport: Arc<dyn ChainTransport>,
    address: Address,
}

impl NodeSigner {
    pub fn new(transport: Arc<dyn ChainTransport>, address: Address) -> Self {
        Self { transport, address }
    }
}

#[async_trait]
impl TransactionSigner for NodeSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn send_transaction(&self, mut tx: TxRequest) -> AppResult<B256> {
        tx.from = Some(self.address);
        self.transport.send_transaction(tx).await
    }
}

/// Parse a `0x`-prefixed address, as accepted from config and API paths
pub fn parse_address(raw: &str) -> AppResult<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| crate::error::AppError::Validation(format!("Invalid address {}: {}", raw, e)))
}

/// Parse a decimal (or `0x` hex) token id
pub fn parse_token_id(raw: &str) -> AppResult<U256> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(raw, 10),
    };
    parsed.map_err(|e| crate::error::AppError::Validation(format!("Invalid token id {}: {}", raw, e)))
}
