use super::cache::{LedgerSnapshot, SnapshotCache};
use super::client::LedgerClient;
use super::error::{CommandError, ConnectionError};
use super::network::program::Operation;
use super::network::Connection;
use super::sync::SyncController;
use super::wallet::{Identity, LedgerAccountRef, Wallet};
use log::{debug, info};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::watch;

/// Everything the UI needs to draw one frame
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub identity: Option<Identity>,
    pub snapshot: LedgerSnapshot,
    pub busy: bool,
    #[serde(serialize_with = "serialize_error")]
    pub last_error: Option<CommandError>,
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<CommandError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// User facing commands. Every command hands back a result; nothing
/// panics across this boundary.
pub struct CommandFacade {
    wallet: Arc<dyn Wallet>,
    controller: SyncController,
    identity: RwLock<Option<Identity>>,
    last_error: Mutex<Option<CommandError>>,
}

impl CommandFacade {
    pub fn new(
        connection: Arc<dyn Connection>,
        wallet: Arc<dyn Wallet>,
        ledger: LedgerAccountRef,
    ) -> Self {
        let client = LedgerClient::new(connection, wallet.clone());
        let controller = SyncController::new(client, SnapshotCache::new(), Arc::new(ledger));
        Self {
            wallet,
            controller,
            identity: RwLock::new(None),
            last_error: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> Option<Identity> {
        *self.identity.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn view(&self) -> View {
        View {
            identity: self.identity(),
            snapshot: self.controller.cache().current(),
            busy: self.controller.is_busy(),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<LedgerSnapshot>> {
        self.controller.cache().subscribe()
    }

    /// Connects the wallet and loads the ledger. `trusted_only` never prompts.
    pub async fn connect(&self, trusted_only: bool) -> Result<LedgerSnapshot, CommandError> {
        let res = self.connect_and_load(trusted_only).await;
        // a silent connect without prior trust is not worth reporting,
        // and leaves no stale error behind either
        if trusted_only && res == Err(CommandError::NotConnected(ConnectionError::NotConnected)) {
            debug!("no trusted wallet yet");
            *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
            return res;
        }
        self.record(res)
    }

    async fn connect_and_load(&self, trusted_only: bool) -> Result<LedgerSnapshot, CommandError> {
        let identity = self.wallet.connect(trusted_only).await?;
        *self.identity.write().unwrap_or_else(PoisonError::into_inner) = Some(identity);
        self.controller.refresh().await
    }

    pub async fn disconnect(&self) {
        self.wallet.disconnect().await;
        *self.identity.write().unwrap_or_else(PoisonError::into_inner) = None;
        info!("wallet disconnected");
    }

    /// One-time creation of the ledger account. A second call is forwarded
    /// and fails remotely; check the snapshot status before offering it.
    pub async fn initialize(&self) -> Result<LedgerSnapshot, CommandError> {
        let res = self.run(Operation::InitializeLedger).await;
        if res.is_ok() {
            info!(
                "created ledger account {}",
                self.controller.ledger().pubkey()
            );
        }
        res
    }

    pub async fn append(&self, payload_ref: &str) -> Result<LedgerSnapshot, CommandError> {
        if payload_ref.is_empty() {
            return self.record(Err(CommandError::InvalidArgument(
                "no payload ref given".into(),
            )));
        }
        self.run(Operation::AppendEntry {
            payload_ref: payload_ref.to_string(),
        })
        .await
    }

    pub async fn vote(&self, payload_ref: &str) -> Result<LedgerSnapshot, CommandError> {
        self.run(Operation::CastVote {
            payload_ref: payload_ref.to_string(),
        })
        .await
    }

    pub async fn refresh(&self) -> Result<LedgerSnapshot, CommandError> {
        let res = match self.require_identity() {
            Ok(_) => self.controller.refresh().await,
            Err(e) => Err(e),
        };
        self.record(res)
    }

    async fn run(&self, operation: Operation) -> Result<LedgerSnapshot, CommandError> {
        let res = match self.require_identity() {
            Ok(payer) => self
                .controller
                .mutate(payer, operation)
                .await
                .map(|outcome| outcome.snapshot),
            Err(e) => Err(e),
        };
        self.record(res)
    }

    fn require_identity(&self) -> Result<Identity, CommandError> {
        self.identity()
            .ok_or(CommandError::NotConnected(ConnectionError::NotConnected))
    }

    fn record(
        &self,
        res: Result<LedgerSnapshot, CommandError>,
    ) -> Result<LedgerSnapshot, CommandError> {
        let mut last_error = self.last_error.lock().unwrap_or_else(PoisonError::into_inner);
        *last_error = res.as_ref().err().cloned();
        res
    }
}
