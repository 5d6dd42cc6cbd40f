pub mod cache;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod network;
pub mod sync;
pub mod wallet;

pub use cache::{LedgerSnapshot, SnapshotCache, SnapshotStatus};
pub use client::LedgerClient;
pub use commands::{CommandFacade, View};
pub use error::{CommandError, ConnectionError, FetchError, RemoteError, SubmitError, TransportError};
pub use network::program::{Entry, Operation, TransactionReceipt};
pub use sync::{Phase, SyncController};
pub use wallet::{Identity, Keypair, KeypairWallet, LedgerAccountRef, Pubkey, Wallet};
