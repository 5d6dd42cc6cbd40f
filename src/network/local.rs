//! In-process ledger program. Runs the program's observable rules against
//! an in-memory account store, so the client can be driven without a cluster.

use super::program::{Entry, LedgerAccount, Operation, Transaction, TransactionReceipt};
use super::{Commitment, Connection};
use crate::error::{RemoteError, SubmitError, TransportError};
use crate::wallet::Pubkey;
use async_trait::async_trait;
use log::{debug, warn};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};
use tokio::sync::Semaphore;

#[derive(Default)]
struct Faults {
    failing_sends: usize,
    failing_fetches: usize,
}

pub struct LocalLedger {
    commitment: Commitment,
    accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    slot: AtomicU64,
    received: AtomicUsize,
    faults: Mutex<Faults>,
    /// When set, every send waits for a permit before executing
    gate: Mutex<Option<Arc<Semaphore>>>,
    /// Same for account reads
    fetch_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl LocalLedger {
    pub fn new(commitment: Commitment) -> Self {
        Self {
            commitment,
            accounts: Mutex::new(HashMap::new()),
            slot: AtomicU64::new(0),
            received: AtomicUsize::new(0),
            faults: Mutex::new(Faults::default()),
            gate: Mutex::new(None),
            fetch_gate: Mutex::new(None),
        }
    }

    /// Number of transactions handed to `send_transaction` so far
    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    /// The next `n` sends fail with a transport error before reaching the program.
    pub fn fail_sends(&self, n: usize) {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner).failing_sends = n;
    }

    /// The next `n` account reads fail with a transport error.
    pub fn fail_fetches(&self, n: usize) {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner).failing_fetches = n;
    }

    /// Holds sends until permits are added to the returned semaphore.
    pub fn hold_sends(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(gate.clone());
        gate
    }

    /// Holds account reads until permits are added to the returned semaphore.
    pub fn hold_fetches(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.fetch_gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(gate.clone());
        gate
    }

    /// Overwrites an account directly, bypassing the program.
    pub fn set_account_data(&self, account: Pubkey, data: Vec<u8>) {
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(account, data);
    }

    fn execute(&self, tx: &Transaction) -> Result<(), RemoteError> {
        tx.verify()?;

        let message = &tx.message;
        let ledger = message
            .accounts
            .first()
            .filter(|meta| meta.is_writable)
            .map(|meta| meta.pubkey)
            .ok_or_else(|| {
                RemoteError::InvalidInstruction(format!(
                    "{} needs a writable ledger account",
                    message.operation.name()
                ))
            })?;

        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);

        let state = match &message.operation {
            Operation::InitializeLedger => {
                if accounts.contains_key(&ledger) {
                    return Err(RemoteError::AccountInUse(ledger));
                }
                LedgerAccount::default()
            }
            operation => {
                let data = accounts
                    .get(&ledger)
                    .ok_or(RemoteError::AccountNotFound(ledger))?;
                let mut state = LedgerAccount::decode(data)
                    .map_err(|_| RemoteError::InvalidAccountData(ledger))?;
                apply(&mut state, operation, tx)?;
                state
            }
        };

        let data = state
            .encode()
            .map_err(|e| RemoteError::InvalidInstruction(e.to_string()))?;
        accounts.insert(ledger, data);
        Ok(())
    }
}

fn apply(
    state: &mut LedgerAccount,
    operation: &Operation,
    tx: &Transaction,
) -> Result<(), RemoteError> {
    match operation {
        Operation::InitializeLedger => {}
        Operation::AppendEntry { payload_ref } => {
            if payload_ref.is_empty() {
                return Err(RemoteError::InvalidInstruction("empty payload ref".into()));
            }
            let owner = tx
                .message
                .accounts
                .get(1)
                .filter(|meta| meta.is_signer)
                .map(|meta| meta.pubkey)
                .ok_or_else(|| {
                    RemoteError::InvalidInstruction("appendEntry needs a signing user".into())
                })?;
            state.entries.push(Entry {
                payload_ref: payload_ref.clone(),
                owner,
                vote_count: 0,
            });
            state.total_entries += 1;
        }
        Operation::CastVote { payload_ref } => {
            let entry = state
                .entries
                .iter_mut()
                .find(|e| &e.payload_ref == payload_ref)
                .ok_or_else(|| RemoteError::UnknownEntry(payload_ref.clone()))?;
            entry.vote_count += 1;
        }
    }
    Ok(())
}

fn take_fault(remaining: &mut usize) -> bool {
    if *remaining > 0 {
        *remaining -= 1;
        true
    } else {
        false
    }
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new(Commitment::default())
    }
}

#[async_trait]
impl Connection for LocalLedger {
    async fn send_transaction(&self, tx: Transaction) -> Result<TransactionReceipt, SubmitError> {
        self.received.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let injected = take_fault(
            &mut self.faults.lock().unwrap_or_else(PoisonError::into_inner).failing_sends,
        );
        if injected {
            warn!("dropping {} on the floor", tx.message.operation);
            return Err(TransportError::Unavailable("injected send failure".into()).into());
        }

        self.execute(&tx)?;

        let slot = self.slot.fetch_add(1, Ordering::SeqCst) + 1;
        let signature = tx.id().ok_or(RemoteError::MissingSignature(tx.message.fee_payer))?;
        debug!("{} landed in slot {}", tx.message.operation, slot);
        Ok(TransactionReceipt {
            signature,
            slot,
            commitment: self.commitment,
        })
    }

    async fn get_account_data(&self, account: &Pubkey) -> Result<Option<Vec<u8>>, TransportError> {
        let gate = self.fetch_gate.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let injected = take_fault(
            &mut self.faults.lock().unwrap_or_else(PoisonError::into_inner).failing_fetches,
        );
        if injected {
            return Err(TransportError::Unavailable("injected fetch failure".into()));
        }
        Ok(self
            .accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::program::Message;
    use crate::wallet::Keypair;

    fn signed(
        operation: Operation,
        user: &Keypair,
        ledger: &Keypair,
        with_ledger: bool,
    ) -> Transaction {
        let mut tx = Transaction::new(Message {
            fee_payer: user.pubkey(),
            accounts: operation.accounts(ledger.pubkey(), user.pubkey()),
            operation,
            nonce: rand::random(),
        });
        tx.sign(user).unwrap();
        if with_ledger {
            tx.sign(ledger).unwrap();
        }
        tx
    }

    #[tokio::test]
    async fn program_appends_and_counts_votes() {
        let chain = LocalLedger::default();
        let user = Keypair::generate();
        let ledger = Keypair::generate();

        chain
            .send_transaction(signed(Operation::InitializeLedger, &user, &ledger, true))
            .await
            .unwrap();
        let append = Operation::AppendEntry {
            payload_ref: "a.gif".into(),
        };
        chain.send_transaction(signed(append, &user, &ledger, false)).await.unwrap();
        for _ in 0..2 {
            let vote = Operation::CastVote {
                payload_ref: "a.gif".into(),
            };
            chain.send_transaction(signed(vote, &user, &ledger, false)).await.unwrap();
        }

        let data = chain.get_account_data(&ledger.pubkey()).await.unwrap().unwrap();
        let state = LedgerAccount::decode(&data).unwrap();
        assert_eq!(state.total_entries, 1);
        assert_eq!(
            state.entries,
            vec![Entry {
                payload_ref: "a.gif".into(),
                owner: user.pubkey(),
                vote_count: 2,
            }]
        );
        assert_eq!(chain.received(), 4);
    }

    #[tokio::test]
    async fn second_initialization_is_rejected() {
        let chain = LocalLedger::default();
        let user = Keypair::generate();
        let ledger = Keypair::generate();

        chain
            .send_transaction(signed(Operation::InitializeLedger, &user, &ledger, true))
            .await
            .unwrap();
        let again = chain
            .send_transaction(signed(Operation::InitializeLedger, &user, &ledger, true))
            .await;
        assert_eq!(
            again,
            Err(SubmitError::Remote(RemoteError::AccountInUse(ledger.pubkey())))
        );
    }

    #[tokio::test]
    async fn injected_faults_are_consumed() {
        let chain = LocalLedger::default();
        let key = Keypair::generate().pubkey();

        chain.fail_fetches(1);
        assert!(chain.get_account_data(&key).await.is_err());
        assert_eq!(chain.get_account_data(&key).await, Ok(None));
    }
}
