//! Token metadata fetching
//!
//! Resolves a token URI (`http(s)://`, `ipfs://` or a JSON `data:` URI),
//! fetches and parses the document, and caches it by the SHA-256 of the URI
//! rather than by token, since URIs can be shared or reused.

use crate::cache::{TtlClass, TtlStore, TtlStoreExt};
use crate::config::{MetadataConfig, TtlConfig};
use crate::constants::namespaces;
use crate::dedup::RequestDeduplicator;
use crate::error::{AppError, AppResult};
use crate::models::TokenMetadata;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Where a token URI points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedUri {
    /// Fetch over HTTP(S)
    Remote(String),
    /// Document embedded in the URI
    Inline(Vec<u8>),
}

/// Fetches and caches token metadata documents
pub struct MetadataService {
    client: reqwest::Client,
    ipfs_gateway: String,
    cache: Arc<dyn TtlStore>,
    dedup: RequestDeduplicator<TokenMetadata>,
    ttl: Duration,
}

impl MetadataService {
    pub fn new(config: &MetadataConfig, cache: Arc<dyn TtlStore>, ttl: &TtlConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create metadata client: {}", e)))?;

        let mut gateway = config.ipfs_gateway.clone();
        if !gateway.ends_with('/') {
            gateway.push('/');
        }

        Ok(Self {
            client,
            ipfs_gateway: gateway,
            cache,
            dedup: RequestDeduplicator::new(Duration::from_secs(ttl.dedup_secs)),
            ttl: TtlClass::Metadata.ttl(ttl),
        })
    }

    /// Cache key for a URI: `metadata:{sha256(uri)}`
    pub fn cache_key(uri: &str) -> String {
        let digest = Sha256::digest(uri.as_bytes());
        format!("{}:{}", namespaces::METADATA, hex::encode(digest))
    }

    /// Rewrite `ipfs://` through the configured gateway
    fn ipfs_to_gateway(&self, uri: &str) -> Option<String> {
        let path = uri.strip_prefix("ipfs://")?;
        let path = path.strip_prefix("ipfs/").unwrap_or(path);
        if path.is_empty() {
            return None;
        }
        Some(format!("{}{}", self.ipfs_gateway, path))
    }

    /// Work out where a token URI points
    ///
    /// Plain `data:` payloads are percent-decoded; `;base64` payloads are base64-decoded.
    pub fn resolve_uri(&self, uri: &str) -> AppResult<ResolvedUri> {
        let uri = uri.trim();
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Ok(ResolvedUri::Remote(uri.to_string()));
        }
        if uri.starts_with("ipfs://") {
            return self
                .ipfs_to_gateway(uri)
                .map(ResolvedUri::Remote)
                .ok_or_else(|| AppError::Validation(format!("Empty IPFS URI: {}", uri)));
        }
        if let Some(rest) = uri.strip_prefix("data:") {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| AppError::Validation("Malformed data URI".to_string()))?;
            if !header.starts_with("application/json") {
                return Err(AppError::Validation(format!(
                    "Unsupported data URI media type: {}",
                    header
                )));
            }
            let bytes = if header.split(';').any(|p| p == "base64") {
                BASE64
                    .decode(payload)
                    .map_err(|e| AppError::Parse(format!("Invalid base64 in data URI: {}", e)))?
            } else {
                percent_decode_str(payload).collect()
            };
            return Ok(ResolvedUri::Inline(bytes));
        }
        Err(AppError::Validation(format!("Unsupported token URI: {}", uri)))
    }

    /// Fetchable URL for an `image`/`animation_url` value
    pub fn resolve_media(&self, uri: &str) -> Option<String> {
        let uri = uri.trim();
        if uri.starts_with("ipfs://") {
            return self.ipfs_to_gateway(uri);
        }
        if uri.starts_with("http://") || uri.starts_with("https://") || uri.starts_with("data:") {
            return Some(uri.to_string());
        }
        None
    }

    /// Fetch, parse and cache the document behind `uri`
    pub async fn fetch(&self, uri: &str) -> AppResult<TokenMetadata> {
        let key = Self::cache_key(uri);
        if let Some(metadata) = self.cache.get_as::<TokenMetadata>(&key) {
            tracing::trace!(uri = uri, "Metadata cache hit");
            return Ok(metadata);
        }

        let resolved = self.resolve_uri(uri)?;
        let client = self.client.clone();
        let metadata = self
            .dedup
            .execute(&key, move || async move {
                let bytes = match resolved {
                    ResolvedUri::Inline(bytes) => bytes,
                    ResolvedUri::Remote(url) => fetch_bytes(&client, &url).await?,
                };
                serde_json::from_slice::<TokenMetadata>(&bytes)
                    .map_err(|e| AppError::Parse(format!("Malformed metadata JSON: {}", e)))
            })
            .await?;

        self.cache.set_as(&key, &metadata, self.ttl);
        Ok(metadata)
    }
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> AppResult<Vec<u8>> {
    tracing::debug!(url = url, "Fetching metadata");
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response.bytes().await?.to_vec())
}
