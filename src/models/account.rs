//! ERC-6551 token-bound account and transaction models

use super::u256_decimal;
use alloy_primitives::{Address, B256, U256};
use serde::Serialize;

/// Deterministic account address of a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBoundAccount {
    #[serde(with = "u256_decimal")]
    pub token_id: U256,
    pub account: Address,
}

/// What an account contract reports about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub account: Address,
    #[serde(with = "u256_decimal")]
    pub chain_id: U256,
    pub token_contract: Address,
    #[serde(with = "u256_decimal")]
    pub token_id: U256,
    pub owner: Address,
    #[serde(with = "u256_decimal")]
    pub state: U256,
}

/// Submitted state-changing transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxSubmission {
    pub tx_hash: B256,
    pub from: Address,
    pub to: Address,
}
