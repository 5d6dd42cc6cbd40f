pub mod local;
pub mod program;

use self::program::{Transaction, TransactionReceipt};
use crate::error::{SubmitError, TransportError};
use crate::wallet::Pubkey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How far a transaction must have progressed before the
/// connection reports it as done.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    #[default]
    Processed,
    Confirmed,
    Finalized,
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        })
    }
}

/// Resolves a cluster moniker to its RPC endpoint. Anything else is
/// taken to be an endpoint already.
pub fn cluster_url(cluster: &str) -> String {
    match cluster {
        "devnet" => "https://api.devnet.solana.com".to_string(),
        "testnet" => "https://api.testnet.solana.com".to_string(),
        "mainnet-beta" => "https://api.mainnet-beta.solana.com".to_string(),
        "localnet" => "http://127.0.0.1:8899".to_string(),
        other => other.to_string(),
    }
}

/// Transport to the ledger program. Timeouts and retries, if any,
/// live behind this trait.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Resolves once the transaction is accepted at the connection's
    /// commitment level, or fails.
    async fn send_transaction(&self, tx: Transaction) -> Result<TransactionReceipt, SubmitError>;

    /// Raw data of `account`, `None` when the account does not exist.
    async fn get_account_data(&self, account: &Pubkey) -> Result<Option<Vec<u8>>, TransportError>;
}
