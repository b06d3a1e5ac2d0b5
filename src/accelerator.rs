//! Optional remote cache accelerator
//!
//! An external HTTP proxy that may answer a fixed set of contract reads
//! faster than direct RPC:
//!
//! `GET {base}/contract/{address}/{method}?{param}={value}...`
//! → `{ "result": ..., "cached": bool, "cachedAt": "..." }`
//!
//! Every failure (unsupported method, non-2xx, network, malformed body) is a
//! miss; the caller falls back to RPC without surfacing an error.

use crate::cache::KeyArg;
use crate::config::AcceleratorConfig;
use crate::error::{AppError, AppResult};
use alloy_primitives::Address;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Supported `(method, parameter names)` pairs
pub const SUPPORTED_METHODS: &[(&str, &[&str])] = &[
    ("name", &[]),
    ("totalSupply", &[]),
    ("ownerOf", &["tokenId"]),
    ("tokenURI", &["tokenId"]),
    ("balanceOf", &["owner"]),
    ("tokenByIndex", &["index"]),
    ("tokenOfOwnerByIndex", &["owner", "index"]),
    ("getCreatorTokens", &["creator"]),
    ("getCreatorName", &["creator"]),
    ("getCreators", &[]),
    ("getTokenCreator", &["tokenId"]),
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceleratorResponse {
    result: Value,
    #[serde(default)]
    cached: bool,
    #[serde(default)]
    cached_at: Option<String>,
}

/// Accelerator statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AcceleratorStats {
    pub hits: u64,
    pub fallbacks: u64,
}

/// Client for the remote cache accelerator
pub struct RemoteAccelerator {
    base_url: String,
    client: reqwest::Client,
    hits: AtomicU64,
    fallbacks: AtomicU64,
}

impl RemoteAccelerator {
    pub fn new(config: &AcceleratorConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create accelerator client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            hits: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
        })
    }

    /// Build from config, `None` when disabled
    pub fn from_config(config: &AcceleratorConfig) -> AppResult<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        Self::new(config).map(Some)
    }

    /// Parameter names for `method` if it is allow-listed with `arity` args
    pub fn param_names(method: &str, arity: usize) -> Option<&'static [&'static str]> {
        SUPPORTED_METHODS
            .iter()
            .find(|(m, params)| *m == method && params.len() == arity)
            .map(|(_, params)| *params)
    }

    pub fn supports(method: &str, arity: usize) -> bool {
        Self::param_names(method, arity).is_some()
    }

    pub fn stats(&self) -> AcceleratorStats {
        AcceleratorStats {
            hits: self.hits.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }

    /// Ask the accelerator; `None` means "use RPC"
    pub async fn fetch(&self, contract: Address, method: &str, args: &[KeyArg]) -> Option<Value> {
        let params = Self::param_names(method, args.len())?;

        match self.request(contract, method, params, args).await {
            Ok(response) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    method = method,
                    cached = response.cached,
                    cached_at = response.cached_at.as_deref().unwrap_or(""),
                    "Accelerator hit"
                );
                Some(response.result)
            }
            Err(e) => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(method = method, error = %e, "Accelerator miss, falling back to RPC");
                None
            }
        }
    }

    async fn request(
        &self,
        contract: Address,
        method: &str,
        params: &[&str],
        args: &[KeyArg],
    ) -> AppResult<AcceleratorResponse> {
        let url = format!(
            "{}/contract/{}/{}",
            self.base_url,
            KeyArg::Address(contract),
            method
        );
        let query: Vec<(&str, String)> = params
            .iter()
            .zip(args)
            .map(|(name, arg)| (*name, arg.plain()))
            .collect();

        let response = self.client.get(&url).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Http {
                status: status.as_u16(),
                url,
            });
        }

        let body: AcceleratorResponse = response.json().await?;
        if body.result.is_null() {
            return Err(AppError::NotFound(format!("{} returned no result", method)));
        }
        Ok(body)
    }
}
