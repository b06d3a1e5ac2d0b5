//! JSON-RPC 2.0 transport over HTTP

use super::{ChainTransport, LogEntry, LogFilter, TxRequest};
use crate::config::RpcConfig;
use crate::error::{AppError, AppResult};
use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::SolError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// JSON-RPC error code geth and most providers use for reverts
const REVERT_CODE: i64 = 3;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    address: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: String,
    #[serde(default)]
    block_number: Option<String>,
}

/// Chain transport for a JSON-RPC HTTP endpoint
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(config: &RpcConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: config.url.clone(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request<R: DeserializeOwned>(&self, method: &str, params: Value) -> AppResult<R> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::RateLimited(if body.is_empty() {
                "HTTP 429 Too Many Requests".to_string()
            } else {
                body
            }));
        }
        if !status.is_success() {
            return Err(AppError::Http {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| AppError::Parse(format!("Invalid JSON-RPC response to {}: {}", method, e)))?;

        if let Some(error) = body.error {
            return Err(map_rpc_error(error));
        }

        let result = body.result.unwrap_or(Value::Null);
        Ok(serde_json::from_value(result)?)
    }
}

fn map_rpc_error(error: RpcErrorObject) -> AppError {
    let lower = error.message.to_lowercase();
    if error.code == REVERT_CODE || lower.contains("execution reverted") {
        let reason = error
            .data
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|d| decode_hex(d).ok())
            .and_then(|d| revert_reason(&d))
            .or_else(|| {
                error
                    .message
                    .split_once("execution reverted:")
                    .map(|(_, r)| r.trim().to_string())
                    .filter(|r| !r.is_empty())
            });
        return AppError::Revert { reason };
    }
    AppError::Rpc {
        code: error.code,
        message: error.message,
    }
}

/// `Error(string)` payloads yield the bare message, anything else the
/// generic rendering (panics, custom errors)
fn revert_reason(data: &[u8]) -> Option<String> {
    match alloy_sol_types::Revert::abi_decode(data) {
        Ok(revert) => Some(revert.reason),
        Err(_) => alloy_sol_types::decode_revert_reason(data),
    }
}

pub(crate) fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub(crate) fn decode_hex(raw: &str) -> AppResult<Vec<u8>> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|e| AppError::Parse(format!("Invalid hex {}: {}", raw, e)))
}

fn parse_quantity(raw: &str) -> AppResult<u64> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16).map_err(|e| AppError::Parse(format!("Invalid quantity {}: {}", raw, e)))
}

fn parse_b256(raw: &str) -> AppResult<B256> {
    let bytes = decode_hex(raw)?;
    if bytes.len() != 32 {
        return Err(AppError::Parse(format!("Expected 32 bytes, got {}", bytes.len())));
    }
    Ok(B256::from_slice(&bytes))
}

fn quantity(value: u64) -> String {
    format!("0x{:x}", value)
}

impl RawLog {
    fn into_entry(self) -> AppResult<LogEntry> {
        Ok(LogEntry {
            address: self
                .address
                .parse::<Address>()
                .map_err(|e| AppError::Parse(format!("Invalid log address: {}", e)))?,
            topics: self
                .topics
                .iter()
                .map(|t| parse_b256(t))
                .collect::<AppResult<Vec<_>>>()?,
            data: Bytes::from(decode_hex(&self.data)?),
            block_number: self.block_number.as_deref().map(parse_quantity).transpose()?,
        })
    }
}

#[async_trait]
impl ChainTransport for HttpTransport {
    async fn call(&self, to: Address, data: Bytes) -> AppResult<Bytes> {
        let result: String = self
            .request(
                "eth_call",
                json!([{ "to": encode_hex(to.as_slice()), "data": encode_hex(&data) }, "latest"]),
            )
            .await?;
        Ok(Bytes::from(decode_hex(&result)?))
    }

    async fn send_transaction(&self, tx: TxRequest) -> AppResult<B256> {
        let mut object = json!({
            "to": encode_hex(tx.to.as_slice()),
            "data": encode_hex(&tx.data),
            "value": format!("0x{:x}", tx.value),
        });
        if let Some(from) = tx.from {
            object["from"] = Value::String(encode_hex(from.as_slice()));
        }

        let hash: String = self.request("eth_sendTransaction", json!([object])).await?;
        tracing::info!(tx_hash = %hash, to = %tx.to, "Transaction submitted");
        parse_b256(&hash)
    }

    async fn get_logs(&self, filter: &LogFilter) -> AppResult<Vec<LogEntry>> {
        let topics: Vec<Value> = filter
            .topics
            .iter()
            .map(|t| match t {
                Some(topic) => Value::String(encode_hex(topic.as_slice())),
                None => Value::Null,
            })
            .collect();

        let raw: Vec<RawLog> = self
            .request(
                "eth_getLogs",
                json!([{
                    "address": encode_hex(filter.address.as_slice()),
                    "topics": topics,
                    "fromBlock": quantity(filter.from_block),
                    "toBlock": quantity(filter.to_block),
                }]),
            )
            .await?;

        raw.into_iter().map(RawLog::into_entry).collect()
    }

    async fn block_number(&self) -> AppResult<u64> {
        let raw: String = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&raw)
    }
}
