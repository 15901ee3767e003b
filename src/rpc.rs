/// Node transport for the anchor engine.
///
/// All chain interaction goes through the `EthRpc` trait so the pipeline,
/// tracker, and query service can be driven against a stub node in tests.
/// The production implementation speaks raw Ethereum JSON-RPC over HTTP
/// for maximum provider compatibility.
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{AnchorError, Result};

/// Per-request transport deadline for a single JSON-RPC exchange.
pub const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Execution outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// On-chain status flag: true iff execution succeeded.
    pub succeeded: bool,
    /// Block the transaction was included in.
    pub block_number: Option<u64>,
    /// Gas consumed by execution.
    pub gas_used: Option<u64>,
}

/// Minimal node RPC surface used by the engine.
#[async_trait]
pub trait EthRpc: Send + Sync {
    /// Network chain identifier (`eth_chainId`).
    async fn chain_id(&self) -> Result<u64>;

    /// Pending-state nonce for a sender (`eth_getTransactionCount`).
    async fn pending_nonce(&self, address: Address) -> Result<u64>;

    /// Suggested gas price in wei (`eth_gasPrice`).
    async fn gas_price(&self) -> Result<u128>;

    /// Read-only contract call (`eth_call`), returns raw return bytes.
    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>>;

    /// Submit a signed raw transaction (`eth_sendRawTransaction`),
    /// returns the chain transaction hash.
    async fn send_raw_transaction(&self, raw: Vec<u8>) -> Result<String>;

    /// Fetch a transaction receipt (`eth_getTransactionReceipt`).
    /// `Ok(None)` means not yet mined — the expected steady state
    /// before inclusion, never an error.
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>>;
}

/// JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Receipt shape as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
struct RawReceipt {
    status: Option<String>,
    #[serde(rename = "blockNumber")]
    block_number: Option<String>,
    #[serde(rename = "gasUsed")]
    gas_used: Option<String>,
}

/// HTTP JSON-RPC client for a single node endpoint.
pub struct HttpRpc {
    client: reqwest::Client,
    url: String,
}

impl HttpRpc {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(RPC_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AnchorError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Send a JSON-RPC request. `Ok(None)` means the node answered with
    /// a null result (e.g., receipt not yet available).
    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp: JsonRpcResponse<T> = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnchorError::Connection(e.to_string()))?
            .json()
            .await
            .map_err(|e| AnchorError::Connection(format!("rpc response parse error: {e}")))?;

        if let Some(err) = resp.error {
            return Err(AnchorError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        Ok(resp.result)
    }

    async fn request_required<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        self.request(method, params)
            .await?
            .ok_or_else(|| AnchorError::Connection(format!("empty rpc response for {method}")))
    }
}

#[async_trait]
impl EthRpc for HttpRpc {
    async fn chain_id(&self) -> Result<u64> {
        let hex: String = self
            .request_required("eth_chainId", serde_json::json!([]))
            .await?;
        parse_hex_u64(&hex)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        let hex: String = self
            .request_required(
                "eth_getTransactionCount",
                serde_json::json!([format!("{address:?}"), "pending"]),
            )
            .await?;
        parse_hex_u64(&hex)
    }

    async fn gas_price(&self) -> Result<u128> {
        let hex: String = self
            .request_required("eth_gasPrice", serde_json::json!([]))
            .await?;
        parse_hex_u128(&hex)
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>> {
        let ret: String = self
            .request_required(
                "eth_call",
                serde_json::json!([
                    {
                        "to": format!("{to:?}"),
                        "data": format!("0x{}", hex::encode(&data)),
                    },
                    "latest"
                ]),
            )
            .await?;
        hex::decode(ret.trim_start_matches("0x"))
            .map_err(|e| AnchorError::Connection(format!("invalid call return data: {e}")))
    }

    async fn send_raw_transaction(&self, raw: Vec<u8>) -> Result<String> {
        self.request_required(
            "eth_sendRawTransaction",
            serde_json::json!([format!("0x{}", hex::encode(&raw))]),
        )
        .await
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>> {
        let raw: Option<RawReceipt> = self
            .request("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await?;

        raw.map(|r| {
            Ok(TxReceipt {
                succeeded: match r.status.as_deref() {
                    Some(status) => parse_hex_u64(status)? == 1,
                    None => false,
                },
                block_number: r.block_number.as_deref().map(parse_hex_u64).transpose()?,
                gas_used: r.gas_used.as_deref().map(parse_hex_u64).transpose()?,
            })
        })
        .transpose()
    }
}

fn parse_hex_u64(hex: &str) -> Result<u64> {
    u64::from_str_radix(hex.trim_start_matches("0x"), 16)
        .map_err(|e| AnchorError::Connection(format!("invalid hex quantity {hex:?}: {e}")))
}

fn parse_hex_u128(hex: &str) -> Result<u128> {
    u128::from_str_radix(hex.trim_start_matches("0x"), 16)
        .map_err(|e| AnchorError::Connection(format!("invalid hex quantity {hex:?}: {e}")))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_quantities() {
        assert_eq!(parse_hex_u64("0x1").unwrap(), 1);
        assert_eq!(parse_hex_u64("0xaa36a7").unwrap(), 11155111);
        assert_eq!(parse_hex_u128("0x4a817c800").unwrap(), 20_000_000_000);
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn test_raw_receipt_deserializes() {
        let raw: RawReceipt = serde_json::from_str(
            r#"{"status":"0x1","blockNumber":"0x10","gasUsed":"0x5208","logs":[]}"#,
        )
        .unwrap();
        assert_eq!(raw.status.as_deref(), Some("0x1"));
        assert_eq!(raw.block_number.as_deref(), Some("0x10"));
        assert_eq!(raw.gas_used.as_deref(), Some("0x5208"));
    }
}
