//! Token models - what discovery and the gallery API hand out

use super::u256_decimal;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Snapshot of one token at fetch time
///
/// Owner and URI may go stale; they refresh through cache expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    #[serde(with = "u256_decimal")]
    pub token_id: U256,
    pub owner: Address,
    #[serde(rename = "tokenURI")]
    pub token_uri: String,
    pub contract_address: Address,
    /// Soulbound (non-transferable)
    pub is_sbt: bool,
}

/// Order of token ids in a discovery result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    /// Descending id: contract-wide and creator galleries
    MostRecentFirst,
    /// Ascending id: owner enumeration
    AscendingId,
}

impl SortOrder {
    /// Sort ids in place
    pub fn sort(self, ids: &mut [U256]) {
        match self {
            Self::MostRecentFirst => ids.sort_unstable_by(|a, b| b.cmp(a)),
            Self::AscendingId => ids.sort_unstable(),
        }
    }
}

/// Which index tier served a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexTier {
    /// Most recent tokens only, built synchronously
    Partial,
    /// Every token id, built in the background
    Complete,
}

/// One page of a contract-wide or creator-scoped listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBatch {
    pub tokens: Vec<TokenRecord>,
    pub has_more: bool,
    /// Offset of this batch in the index
    pub start: usize,
    /// Offset of the next batch
    pub next_start: usize,
    /// Ids known to the index that served the batch
    pub index_len: usize,
    pub tier: IndexTier,
    pub order: SortOrder,
}

/// Path that produced an owner enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscoverySource {
    /// `tokenOfOwnerByIndex`
    Enumerable,
    /// Transfer logs re-verified with `ownerOf`
    TransferLogs,
    /// `ownerOf` probing over a token range
    RangeScan,
    /// `balanceOf` was zero, nothing to look up
    Empty,
}

/// Tokens held by one owner
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedTokens {
    pub owner: Address,
    #[serde(with = "u256_decimal")]
    pub balance: U256,
    pub tokens: Vec<TokenRecord>,
    pub order: SortOrder,
    pub source: DiscoverySource,
}

/// Creator with display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorInfo {
    pub address: Address,
    pub name: String,
}

/// Token metadata document
///
/// Fields are optional; no schema validation happens here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub animation_url: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub attributes: Vec<serde_json::Value>,
}

/// Record plus creator attribution and metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDetails {
    #[serde(flatten)]
    pub record: TokenRecord,
    pub creator: Option<Address>,
    pub creator_name: Option<String>,
    pub metadata: Option<TokenMetadata>,
    /// `image` resolved to a fetchable URL
    pub image_url: Option<String>,
    /// `animation_url` resolved to a fetchable URL
    pub animation_url: Option<String>,
}
