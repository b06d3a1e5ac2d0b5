//! JSON-RPC Transport Tests
//!
//! Wire behaviour of the HTTP transport against a mocked node: result
//! decoding, throttling, reverts and log parsing.

use alloy_primitives::{Address, Bytes, B256};
use mockito::{Matcher, Server};
use nft_gallery_gateway::chain::{ChainTransport, HttpTransport, LogFilter, TxRequest};
use nft_gallery_gateway::config::RpcConfig;
use nft_gallery_gateway::error::AppError;
use serde_json::json;

fn transport(server: &Server) -> HttpTransport {
    HttpTransport::new(&RpcConfig {
        url: server.url(),
        timeout_ms: 2_000,
    })
    .unwrap()
}

fn rpc_result(result: serde_json::Value) -> String {
    json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string()
}

fn rpc_error(code: i64, message: &str, data: Option<&str>) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": { "code": code, "message": message, "data": data }
    })
    .to_string()
}

#[tokio::test]
async fn test_eth_call_returns_decoded_bytes() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_call" })))
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!("0x00000000000000000000000000000000000000000000000000000000000000ff")))
        .expect(1)
        .create_async()
        .await;

    let out = transport(&server)
        .call(Address::repeat_byte(0xAA), Bytes::from_static(&[0x18, 0x16, 0x0d, 0xdd]))
        .await
        .unwrap();

    assert_eq!(out.len(), 32);
    assert_eq!(out[31], 0xff);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_http_429_is_rate_limited() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/")
        .with_status(429)
        .with_body("Too Many Requests")
        .create_async()
        .await;

    let err = transport(&server)
        .call(Address::ZERO, Bytes::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::RateLimited(_)));
}

#[tokio::test]
async fn test_server_error_status_is_http_error() {
    let mut server = Server::new_async().await;
    server.mock("POST", "/").with_status(502).create_async().await;

    let err = transport(&server).block_number().await.unwrap_err();

    assert!(matches!(err, AppError::Http { status: 502, .. }));
}

#[tokio::test]
async fn test_revert_with_encoded_reason() {
    let mut server = Server::new_async().await;
    // Error(string) carrying "ERC721: invalid token ID"
    let data = "0x08c379a0\
        0000000000000000000000000000000000000000000000000000000000000020\
        0000000000000000000000000000000000000000000000000000000000000018\
        4552433732313a20696e76616c696420746f6b656e2049440000000000000000";
    server
        .mock("POST", "/")
        .with_header("content-type", "application/json")
        .with_body(rpc_error(3, "execution reverted", Some(data)))
        .create_async()
        .await;

    let err = transport(&server)
        .call(Address::ZERO, Bytes::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AppError::Revert {
            reason: Some("ERC721: invalid token ID".to_string())
        }
    );
}

#[tokio::test]
async fn test_revert_reason_from_message() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/")
        .with_header("content-type", "application/json")
        .with_body(rpc_error(-32000, "execution reverted: not owner", None))
        .create_async()
        .await;

    let err = transport(&server)
        .call(Address::ZERO, Bytes::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AppError::Revert {
            reason: Some("not owner".to_string())
        }
    );
}

#[tokio::test]
async fn test_other_rpc_errors_are_preserved() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/")
        .with_header("content-type", "application/json")
        .with_body(rpc_error(-32602, "invalid params", None))
        .create_async()
        .await;

    let err = transport(&server)
        .call(Address::ZERO, Bytes::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AppError::Rpc {
            code: -32602,
            message: "invalid params".to_string()
        }
    );
}

#[tokio::test]
async fn test_get_logs_parses_entries() {
    let mut server = Server::new_async().await;
    let topic = format!("0x{}", "dd".repeat(32));
    let holder = format!("0x{}{}", "00".repeat(12), "b0".repeat(20));
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({
            "method": "eth_getLogs",
            "params": [{ "fromBlock": "0x0", "toBlock": "0x64" }]
        })))
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!([{
            "address": format!("0x{}", "aa".repeat(20)),
            "topics": [topic, holder],
            "data": "0x",
            "blockNumber": "0x1f"
        }])))
        .create_async()
        .await;

    let logs = transport(&server)
        .get_logs(&LogFilter {
            address: Address::repeat_byte(0xAA),
            topics: [Some(B256::repeat_byte(0xDD)), None, None, None],
            from_block: 0,
            to_block: 100,
        })
        .await
        .unwrap();

    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].address, Address::repeat_byte(0xAA));
    assert_eq!(logs[0].topics[0], B256::repeat_byte(0xDD));
    assert_eq!(Address::from_word(logs[0].topics[1]), Address::repeat_byte(0xB0));
    assert!(logs[0].data.is_empty());
    assert_eq!(logs[0].block_number, Some(31));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_block_number_and_transaction_hash() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_blockNumber" })))
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!("0x1b4")))
        .create_async()
        .await;
    let hash = format!("0x{}", "ab".repeat(32));
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_sendTransaction" })))
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!(hash)))
        .create_async()
        .await;

    let transport = transport(&server);

    assert_eq!(transport.block_number().await.unwrap(), 436);
    let tx = TxRequest::new(Address::repeat_byte(0xAA), Bytes::new());
    assert_eq!(transport.send_transaction(tx).await.unwrap(), B256::repeat_byte(0xAB));
}
