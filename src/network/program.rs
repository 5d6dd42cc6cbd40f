//! Wire types shared with the ledger program: operations, transactions
//! and the layout of the ledger account.

use crate::error::RemoteError;
use crate::sync::PendingTarget;
use crate::wallet::{Keypair, Pubkey, SYSTEM_PROGRAM};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Commitment;

/// Operations exposed by the ledger program
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// Creates the ledger account. Must be co-signed by the ledger keypair.
    InitializeLedger,
    AppendEntry { payload_ref: String },
    CastVote { payload_ref: String },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::InitializeLedger => "initializeLedger",
            Operation::AppendEntry { .. } => "appendEntry",
            Operation::CastVote { .. } => "castVote",
        }
    }

    pub fn target(&self) -> PendingTarget {
        match self {
            Operation::InitializeLedger => PendingTarget::LedgerCreation,
            _ => PendingTarget::LedgerMutation,
        }
    }

    /// Accounts touched by the operation, in the order the program expects.
    pub fn accounts(&self, ledger: Pubkey, user: Pubkey) -> Vec<AccountMeta> {
        match self {
            Operation::InitializeLedger => vec![
                AccountMeta::signer(ledger, true),
                AccountMeta::signer(user, true),
                AccountMeta::readonly(SYSTEM_PROGRAM),
            ],
            Operation::AppendEntry { .. } => vec![
                AccountMeta::writable(ledger),
                AccountMeta::signer(user, false),
            ],
            Operation::CastVote { .. } => vec![AccountMeta::writable(ledger)],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::InitializeLedger => f.write_str(self.name()),
            Operation::AppendEntry { payload_ref } | Operation::CastVote { payload_ref } => {
                write!(f, "{}({})", self.name(), payload_ref)
            }
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn signer(pubkey: Pubkey, is_writable: bool) -> Self {
        Self {
            pubkey,
            is_signer: true,
            is_writable,
        }
    }

    pub fn writable(pubkey: Pubkey) -> Self {
        Self {
            pubkey,
            is_signer: false,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: Pubkey) -> Self {
        Self {
            pubkey,
            is_signer: false,
            is_writable: false,
        }
    }
}

/// The signed part of a transaction
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub fee_payer: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub operation: Operation,
    /// Keeps otherwise identical transactions (two votes on the
    /// same entry) from carrying the same signature.
    pub nonce: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SignatureEntry {
    pub signer: Pubkey,
    pub signature: Vec<u8>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub message: Message,
    pub signatures: Vec<SignatureEntry>,
}

impl Transaction {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            signatures: Vec::new(),
        }
    }

    pub fn message_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&self.message)
    }

    pub fn sign(&mut self, keypair: &Keypair) -> Result<(), bincode::Error> {
        let signature = keypair.sign(&self.message_bytes()?);
        let signer = keypair.pubkey();
        // re-signing replaces the old signature
        self.signatures.retain(|s| s.signer != signer);
        self.signatures.push(SignatureEntry { signer, signature });
        Ok(())
    }

    /// Signature of the fee payer, which identifies the transaction.
    pub fn id(&self) -> Option<String> {
        self.signatures
            .iter()
            .find(|s| s.signer == self.message.fee_payer)
            .map(|s| bs58::encode(&s.signature).into_string())
    }

    /// Checks that the fee payer and every signer account signed the message.
    pub fn verify(&self) -> Result<(), RemoteError> {
        let bytes = self
            .message_bytes()
            .map_err(|e| RemoteError::InvalidInstruction(e.to_string()))?;

        let required = std::iter::once(self.message.fee_payer).chain(
            self.message
                .accounts
                .iter()
                .filter(|meta| meta.is_signer)
                .map(|meta| meta.pubkey),
        );

        for signer in required {
            let entry = self
                .signatures
                .iter()
                .find(|s| s.signer == signer)
                .ok_or(RemoteError::MissingSignature(signer))?;

            let key = VerifyingKey::from_bytes(&signer.to_bytes())
                .map_err(|_| RemoteError::InvalidSignature(signer))?;
            let signature = Signature::from_slice(&entry.signature)
                .map_err(|_| RemoteError::InvalidSignature(signer))?;
            key.verify(&bytes, &signature)
                .map_err(|_| RemoteError::InvalidSignature(signer))?;
        }
        Ok(())
    }
}

/// Proof that the ledger accepted a transaction
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub signature: String,
    pub slot: u64,
    pub commitment: Commitment,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub payload_ref: String,
    pub owner: Pubkey,
    pub vote_count: u64,
}

/// Data layout of the ledger account
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerAccount {
    pub total_entries: u64,
    pub entries: Vec<Entry>,
}

impl LedgerAccount {
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(fee_payer: Pubkey, ledger: Pubkey, operation: Operation) -> Message {
        Message {
            fee_payer,
            accounts: operation.accounts(ledger, fee_payer),
            operation,
            nonce: 7,
        }
    }

    #[test]
    fn initialize_requires_ledger_signature() {
        let user = Keypair::generate();
        let ledger = Keypair::generate();

        let mut tx = Transaction::new(message(
            user.pubkey(),
            ledger.pubkey(),
            Operation::InitializeLedger,
        ));
        tx.sign(&user).unwrap();
        assert_eq!(
            tx.verify(),
            Err(RemoteError::MissingSignature(ledger.pubkey()))
        );

        tx.sign(&ledger).unwrap();
        assert_eq!(tx.verify(), Ok(()));
    }

    #[test]
    fn tampered_message_fails_verification() {
        let user = Keypair::generate();
        let ledger = Keypair::generate();

        let mut tx = Transaction::new(message(
            user.pubkey(),
            ledger.pubkey(),
            Operation::CastVote {
                payload_ref: "a.gif".into(),
            },
        ));
        tx.sign(&user).unwrap();
        tx.message.operation = Operation::CastVote {
            payload_ref: "b.gif".into(),
        };
        assert_eq!(tx.verify(), Err(RemoteError::InvalidSignature(user.pubkey())));
    }

    #[test]
    fn vote_touches_only_the_ledger() {
        let ledger = Keypair::generate().pubkey();
        let user = Keypair::generate().pubkey();
        let op = Operation::CastVote {
            payload_ref: "x".into(),
        };
        assert_eq!(op.accounts(ledger, user), vec![AccountMeta::writable(ledger)]);
        assert_eq!(op.target(), PendingTarget::LedgerMutation);
        assert_eq!(Operation::InitializeLedger.target(), PendingTarget::LedgerCreation);
    }
}
