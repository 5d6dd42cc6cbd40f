use super::cache::{LedgerSnapshot, SnapshotCache};
use super::client::LedgerClient;
use super::error::CommandError;
use super::network::program::{Operation, TransactionReceipt};
use super::wallet::{Identity, LedgerAccountRef};
use log::{debug, info, warn};
use serde::Serialize;
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// What an outstanding action is working on
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingTarget {
    LedgerCreation,
    LedgerMutation,
    /// A standalone read of the ledger
    Refresh,
}

impl fmt::Display for PendingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PendingTarget::LedgerCreation => "ledger creation",
            PendingTarget::LedgerMutation => "ledger mutation",
            PendingTarget::Refresh => "refresh",
        })
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting(PendingTarget),
    Refetching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingOperation {
    target: PendingTarget,
    /// Set once the submit landed and the refetch is running
    refetching: bool,
}

#[derive(Default)]
struct ControllerState {
    pending: Option<PendingOperation>,
    refreshes: usize,
}

/// Result of a mutation that landed and was read back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    pub receipt: TransactionReceipt,
    pub snapshot: LedgerSnapshot,
}

/// Sequences submit -> refetch for every mutation and keeps the snapshot
/// cache in step with the ledger. Only one mutation may be in flight per
/// controller, and none while a refresh runs; anything issued meanwhile is
/// turned away as busy.
pub struct SyncController {
    client: LedgerClient,
    cache: SnapshotCache,
    ledger: Arc<LedgerAccountRef>,
    state: Arc<Mutex<ControllerState>>,
}

impl SyncController {
    pub fn new(client: LedgerClient, cache: SnapshotCache, ledger: Arc<LedgerAccountRef>) -> Self {
        Self {
            client,
            cache,
            ledger,
            state: Arc::new(Mutex::new(ControllerState::default())),
        }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn ledger(&self) -> &LedgerAccountRef {
        &self.ledger
    }

    pub fn phase(&self) -> Phase {
        let state = lock(&self.state);
        match state.pending {
            Some(PendingOperation {
                refetching: false,
                target,
            }) => Phase::Submitting(target),
            Some(_) => Phase::Refetching,
            None if state.refreshes > 0 => Phase::Refetching,
            None => Phase::Idle,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.phase() != Phase::Idle
    }

    /// Submits `operation` as `payer`, then reads the ledger back into the cache.
    ///
    /// A failed submit leaves the cache alone. A failed refetch after a
    /// successful submit marks the cache `Unknown` and reports
    /// [`CommandError::Refetch`]; the mutation itself stands.
    pub async fn mutate(
        &self,
        payer: Identity,
        operation: Operation,
    ) -> Result<MutationOutcome, CommandError> {
        let slot = self.claim(operation.target())?;

        let ledger = self.ledger.pubkey();
        let accounts = operation.accounts(ledger, payer.0);
        let signers = match operation {
            Operation::InitializeLedger => vec![self.ledger.keypair()],
            _ => Vec::new(),
        };

        let label = operation.to_string();
        let receipt = match self.client.submit(payer, operation, accounts, &signers).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!("{} failed, cache untouched: {}", label, e);
                return Err(e.into());
            }
        };
        info!("{} committed in slot {}", label, receipt.slot);

        slot.refetching();
        match self.client.fetch(&ledger).await {
            Ok(snapshot) => {
                self.cache.replace(snapshot.clone());
                Ok(MutationOutcome { receipt, snapshot })
            }
            Err(source) => {
                warn!("refetch after {} failed: {}", label, source);
                self.cache.mark_unknown();
                Err(CommandError::Refetch { receipt, source })
            }
        }
    }

    /// Reads the ledger into the cache. Refreshes may overlap each other;
    /// whichever completes last wins.
    pub async fn refresh(&self) -> Result<LedgerSnapshot, CommandError> {
        let _refresh = self.begin_refresh()?;

        let snapshot = self.client.fetch(&self.ledger.pubkey()).await?;
        debug!(
            "fetched {} entries ({:?})",
            snapshot.entries.len(),
            snapshot.status
        );
        self.cache.replace(snapshot.clone());
        Ok(snapshot)
    }

    fn claim(&self, target: PendingTarget) -> Result<PendingSlot, CommandError> {
        let mut state = lock(&self.state);
        if let Some(pending) = state.pending {
            debug!("rejecting {}: {} in flight", target, pending.target);
            return Err(CommandError::Busy {
                pending: pending.target,
            });
        }
        // a refresh finishing after our refetch would hide the write
        if state.refreshes > 0 {
            debug!("rejecting {}: refresh in flight", target);
            return Err(CommandError::Busy {
                pending: PendingTarget::Refresh,
            });
        }
        state.pending = Some(PendingOperation {
            target,
            refetching: false,
        });
        Ok(PendingSlot {
            state: self.state.clone(),
        })
    }

    fn begin_refresh(&self) -> Result<RefreshGuard, CommandError> {
        let mut state = lock(&self.state);
        if let Some(pending) = state.pending {
            return Err(CommandError::Busy {
                pending: pending.target,
            });
        }
        state.refreshes += 1;
        Ok(RefreshGuard {
            state: self.state.clone(),
        })
    }
}

fn lock(state: &Mutex<ControllerState>) -> MutexGuard<'_, ControllerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds the mutation slot; dropping it returns the controller to idle,
/// including when the command future is dropped midway.
struct PendingSlot {
    state: Arc<Mutex<ControllerState>>,
}

impl PendingSlot {
    fn refetching(&self) {
        if let Some(pending) = lock(&self.state).pending.as_mut() {
            pending.refetching = true;
        }
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        lock(&self.state).pending = None;
    }
}

struct RefreshGuard {
    state: Arc<Mutex<ControllerState>>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.refreshes = state.refreshes.saturating_sub(1);
    }
}
