use alloy::consensus::TxLegacy;
use alloy::primitives::{Address, Bytes, TxKind, B256};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Result, ScoreSwapError};
use crate::session::SwapQuote;
use super::client::{parse_hex_u256, ChainClient, ReceiptStatus, TxParams};
use super::wallet::Wallet;

/// Fallback gas limit when estimation fails.
const DEFAULT_GAS_LIMIT: u64 = 200_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
    TimedOut,
}

/// Record of one submission attempt. Terminal once Confirmed, Failed or
/// TimedOut.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub nonce: u64,
    pub hash: Option<B256>,
    pub status: TxStatus,
    pub detail: Option<String>,
}

/// Executes swap quotes against the chain. All sessions share one signer, so
/// nonce assignment, signing and submission pass through a single lock, one
/// submission in flight at a time; gas estimation and receipt polling run
/// outside the barrier.
pub struct TransactionExecutor {
    chain: Arc<dyn ChainClient>,
    wallet: Wallet,
    chain_id: u64,
    receipt_timeout: Duration,
    next_nonce: Mutex<Option<u64>>,
}

impl TransactionExecutor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        wallet: Wallet,
        chain_id: u64,
        receipt_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            wallet,
            chain_id,
            receipt_timeout,
            next_nonce: Mutex::new(None),
        }
    }

    pub async fn execute(&self, quote: &SwapQuote) -> Result<Transaction> {
        let to = Address::from_str(&quote.tx_request.to)
            .map_err(|e| ScoreSwapError::chain_error(format!("invalid target address: {}", e)))?;
        let value = parse_hex_u256(&quote.tx_request.value)?;
        let data = Bytes::from_str(&quote.tx_request.data)
            .map_err(|e| ScoreSwapError::chain_error(format!("invalid calldata: {}", e)))?;

        info!(
            "Executing swap: {} {} -> {}",
            quote.amount_in, quote.token_in.symbol, quote.token_out.symbol
        );

        // Gas estimation stays outside the submission barrier.
        let tx_params = TxParams {
            from: self.wallet.address(),
            to,
            value,
            data: data.clone(),
        };
        let gas_limit = match self.chain.estimate_gas(&tx_params).await {
            Ok(gas) => gas,
            Err(e) => {
                warn!("Gas estimation failed, using default: {}", e);
                DEFAULT_GAS_LIMIT
            }
        };
        let gas_price = self.chain.gas_price().await?;

        // Submission barrier: assign the nonce, sign and submit while holding
        // the lock so concurrent sessions cannot interleave.
        let mut next_nonce = self.next_nonce.lock().await;
        let nonce = match *next_nonce {
            Some(nonce) => nonce,
            None => self.chain.transaction_count(self.wallet.address()).await?,
        };

        let tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(to),
            value,
            input: data,
        };
        let raw = self.wallet.sign_legacy(tx)?;

        let hash = match self.chain.submit(raw).await {
            Ok(hash) => hash,
            Err(e) => {
                // A rejected submission does not consume the nonce.
                *next_nonce = Some(nonce);
                return Ok(Transaction {
                    nonce,
                    hash: None,
                    status: TxStatus::Failed,
                    detail: Some(e.to_string()),
                });
            }
        };
        *next_nonce = Some(nonce + 1);
        drop(next_nonce);

        info!("Transaction sent: {} (nonce {})", hash, nonce);

        let transaction = match self.chain.wait_for_receipt(hash, self.receipt_timeout).await {
            Ok(Some(ReceiptStatus::Success)) => Transaction {
                nonce,
                hash: Some(hash),
                status: TxStatus::Confirmed,
                detail: None,
            },
            Ok(Some(ReceiptStatus::Reverted)) => Transaction {
                nonce,
                hash: Some(hash),
                status: TxStatus::Failed,
                detail: Some("transaction reverted".to_string()),
            },
            Ok(None) => Transaction {
                nonce,
                hash: Some(hash),
                status: TxStatus::TimedOut,
                detail: Some(format!(
                    "no receipt within {}s",
                    self.receipt_timeout.as_secs()
                )),
            },
            Err(e) => Transaction {
                nonce,
                hash: Some(hash),
                status: TxStatus::Failed,
                detail: Some(e.to_string()),
            },
        };

        info!(
            "Transaction {} finished with status {:?}",
            hash, transaction.status
        );
        Ok(transaction)
    }
}
