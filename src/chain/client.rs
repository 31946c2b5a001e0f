use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, ScoreSwapError};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct TxParams {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Chain operations the executor depends on. `submit` is serialized by the
/// executor; everything else may be called concurrently.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn estimate_gas(&self, tx: &TxParams) -> Result<u64>;

    async fn gas_price(&self) -> Result<u128>;

    async fn transaction_count(&self, address: Address) -> Result<u64>;

    async fn submit(&self, raw_tx: Bytes) -> Result<B256>;

    /// Polls for the receipt until `timeout`; Ok(None) means the transaction
    /// was not mined in time.
    async fn wait_for_receipt(
        &self,
        hash: B256,
        timeout: Duration,
    ) -> Result<Option<ReceiptStatus>>;
}

/// Ethereum JSON-RPC client over HTTP.
pub struct JsonRpcChainClient {
    client: Client,
    rpc_url: String,
}

impl JsonRpcChainClient {
    pub fn new(rpc_url: String) -> Self {
        Self {
            client: Client::new(),
            rpc_url,
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ScoreSwapError::chain_error(format!("RPC request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ScoreSwapError::chain_error(format!(
                "RPC request failed with status {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ScoreSwapError::chain_error(format!("Invalid RPC response: {}", e)))?;

        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            return Err(ScoreSwapError::chain_error(format!(
                "{} failed: {}",
                method, error
            )));
        }

        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let result = self.call("eth_chainId", json!([])).await?;
        Ok(parse_quantity(&result)? as u64)
    }
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    async fn estimate_gas(&self, tx: &TxParams) -> Result<u64> {
        let result = self
            .call(
                "eth_estimateGas",
                json!([{
                    "from": tx.from.to_string(),
                    "to": tx.to.to_string(),
                    "value": format!("0x{:x}", tx.value),
                    "data": tx.data.to_string(),
                }]),
            )
            .await?;
        Ok(parse_quantity(&result)? as u64)
    }

    async fn gas_price(&self) -> Result<u128> {
        let result = self.call("eth_gasPrice", json!([])).await?;
        parse_quantity(&result)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64> {
        let result = self
            .call(
                "eth_getTransactionCount",
                json!([address.to_string(), "pending"]),
            )
            .await?;
        Ok(parse_quantity(&result)? as u64)
    }

    async fn submit(&self, raw_tx: Bytes) -> Result<B256> {
        let result = self
            .call("eth_sendRawTransaction", json!([raw_tx.to_string()]))
            .await?;
        let hash = result
            .as_str()
            .ok_or_else(|| ScoreSwapError::chain_error("missing transaction hash"))?;
        B256::from_str(hash)
            .map_err(|e| ScoreSwapError::chain_error(format!("invalid transaction hash: {}", e)))
    }

    async fn wait_for_receipt(
        &self,
        hash: B256,
        timeout: Duration,
    ) -> Result<Option<ReceiptStatus>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let receipt = self
                .call("eth_getTransactionReceipt", json!([hash.to_string()]))
                .await?;

            if !receipt.is_null() {
                let status = receipt
                    .get("status")
                    .and_then(|s| s.as_str())
                    .unwrap_or("0x1");
                debug!("Receipt for {}: status {}", hash, status);
                return Ok(Some(if status == "0x1" {
                    ReceiptStatus::Success
                } else {
                    ReceiptStatus::Reverted
                }));
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

/// Parse a JSON-RPC hex quantity ("0x1a") into an integer.
pub fn parse_quantity(value: &Value) -> Result<u128> {
    let s = value
        .as_str()
        .ok_or_else(|| ScoreSwapError::chain_error(format!("expected hex quantity, got {}", value)))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u128::from_str_radix(digits, 16)
        .map_err(|e| ScoreSwapError::chain_error(format!("invalid hex quantity {}: {}", s, e)))
}

/// Parse a hex-encoded U256 field from an agent payload ("0x0", "0x2386f2...").
pub fn parse_hex_u256(s: &str) -> Result<U256> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| ScoreSwapError::chain_error(format!("invalid hex value {}: {}", s, e)))
}
