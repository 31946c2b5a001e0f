use alloy::consensus::{SignableTransaction, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes};
use alloy::signers::local::PrivateKeySigner;

use crate::error::{Result, ScoreSwapError};

/// Signing wallet shared by all sessions. The private key never leaves the
/// signer and is never logged or serialized.
pub struct Wallet {
    signer: PrivateKeySigner,
    address: Address,
}

impl Wallet {
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| ScoreSwapError::config_error(format!("Invalid private key: {}", e)))?;
        let address = signer.address();

        Ok(Self { signer, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a legacy transaction and return the raw payload ready for
    /// `eth_sendRawTransaction`.
    pub fn sign_legacy(&self, mut tx: TxLegacy) -> Result<Bytes> {
        let signature = self
            .signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| ScoreSwapError::chain_error(format!("Signing failed: {}", e)))?;
        let signed = tx.into_signed(signature);
        Ok(signed.encoded_2718().into())
    }
}

// Keep the signer out of Debug output.
impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}
