use super::network::program::TransactionReceipt;
use super::sync::PendingTarget;
use super::wallet::Pubkey;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("no wallet available")]
    NoWallet,
    #[error("wallet not connected")]
    NotConnected,
    #[error("user rejected the connection request")]
    Rejected,
    #[error("wallet failed to sign: {0}")]
    Signing(String),
}

/// Operation rejected by the ledger program. Never worth retrying as is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("account {0} already in use")]
    AccountInUse(Pubkey),
    #[error("account {0} does not exist")]
    AccountNotFound(Pubkey),
    #[error("missing signature for {0}")]
    MissingSignature(Pubkey),
    #[error("invalid signature for {0}")]
    InvalidSignature(Pubkey),
    #[error("no entry with payload ref {0:?}")]
    UnknownEntry(String),
    #[error("invalid instruction: {0}")]
    InvalidInstruction(String),
    #[error("account {0} holds malformed data")]
    InvalidAccountData(Pubkey),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("endpoint unavailable: {0}")]
    Unavailable(String),
    #[error("request timed out")]
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Wallet(#[from] ConnectionError),
    #[error("failed to encode transaction: {0}")]
    Encode(String),
}

impl SubmitError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::Transport(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to decode ledger account: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }
}

/// Everything a command can hand back to the UI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("not connected: {0}")]
    NotConnected(#[from] ConnectionError),
    #[error("busy: {pending} still in flight")]
    Busy { pending: PendingTarget },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("rejected by ledger: {0}")]
    Remote(RemoteError),
    #[error("transport failure: {0}")]
    Transport(TransportError),
    #[error("could not encode request: {0}")]
    Encode(String),
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// The mutation landed but the view could not be refreshed.
    #[error("committed in {}, but refetch failed: {}", .receipt.signature, .source)]
    Refetch {
        receipt: TransactionReceipt,
        source: FetchError,
    },
}

impl CommandError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CommandError::Busy { .. } | CommandError::Transport(_) => true,
            CommandError::Fetch(e) | CommandError::Refetch { source: e, .. } => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<SubmitError> for CommandError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::Remote(e) => CommandError::Remote(e),
            SubmitError::Transport(e) => CommandError::Transport(e),
            SubmitError::Wallet(e) => CommandError::NotConnected(e),
            SubmitError::Encode(e) => CommandError::Encode(e),
        }
    }
}
