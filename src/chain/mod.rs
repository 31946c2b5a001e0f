pub mod client;
pub mod executor;
pub mod wallet;

pub use client::{ChainClient, JsonRpcChainClient, ReceiptStatus, TxParams};
pub use executor::{Transaction, TransactionExecutor, TxStatus};
pub use wallet::Wallet;
