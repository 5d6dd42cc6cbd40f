use super::cache::LedgerSnapshot;
use super::error::{FetchError, SubmitError};
use super::network::program::{
    AccountMeta, LedgerAccount, Message, Operation, Transaction, TransactionReceipt,
};
use super::network::Connection;
use super::wallet::{Identity, Keypair, Pubkey, Wallet};
use log::{debug, error};
use std::sync::Arc;

/// Typed handle on the ledger program. Submits operations and reads the
/// ledger account; never touches the local cache.
#[derive(Clone)]
pub struct LedgerClient {
    connection: Arc<dyn Connection>,
    wallet: Arc<dyn Wallet>,
}

impl LedgerClient {
    pub fn new(connection: Arc<dyn Connection>, wallet: Arc<dyn Wallet>) -> Self {
        Self { connection, wallet }
    }

    /// Signs `operation` with every keypair in `signers`, then has the wallet
    /// sign as `payer` and relay it. A receipt means the ledger accepted it.
    pub async fn submit(
        &self,
        payer: Identity,
        operation: Operation,
        accounts: Vec<AccountMeta>,
        signers: &[&Keypair],
    ) -> Result<TransactionReceipt, SubmitError> {
        let name = operation.name();
        let mut tx = Transaction::new(Message {
            fee_payer: payer.0,
            accounts,
            operation,
            nonce: rand::random(),
        });

        for signer in signers {
            tx.sign(signer)
                .map_err(|e| SubmitError::Encode(e.to_string()))?;
        }
        let tx = self.wallet.sign_transaction(tx).await?;

        debug!("submitting {}", name);
        match self.connection.send_transaction(tx).await {
            Ok(receipt) => {
                debug!("{} accepted: {}", name, receipt.signature);
                Ok(receipt)
            }
            Err(e) => {
                error!("{} failed: {}", name, e);
                Err(e)
            }
        }
    }

    /// Reads and decodes the ledger account. A missing account is an
    /// uninitialized ledger, not an error.
    pub async fn fetch(&self, account: &Pubkey) -> Result<LedgerSnapshot, FetchError> {
        let data = self.connection.get_account_data(account).await?;
        match data {
            None => Ok(LedgerSnapshot::uninitialized()),
            Some(bytes) => LedgerAccount::decode(&bytes)
                .map(LedgerSnapshot::from)
                .map_err(|e| FetchError::Decode(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SnapshotStatus;
    use crate::error::RemoteError;
    use crate::network::local::LocalLedger;
    use crate::wallet::KeypairWallet;

    async fn connected() -> (LedgerClient, Arc<LocalLedger>, Identity) {
        let chain = Arc::new(LocalLedger::default());
        let wallet = Arc::new(KeypairWallet::new(Keypair::generate(), true, false));
        let identity = wallet.connect(true).await.unwrap();
        (LedgerClient::new(chain.clone(), wallet), chain, identity)
    }

    #[tokio::test]
    async fn initialize_without_ledger_signer_is_rejected() {
        let (client, _, identity) = connected().await;
        let ledger = Keypair::generate();

        let op = Operation::InitializeLedger;
        let accounts = op.accounts(ledger.pubkey(), identity.0);
        let res = client.submit(identity, op, accounts, &[]).await;
        assert_eq!(
            res,
            Err(SubmitError::Remote(RemoteError::MissingSignature(ledger.pubkey())))
        );
        assert!(!res.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn fetch_distinguishes_missing_from_malformed() {
        let (client, chain, identity) = connected().await;
        let ledger = Keypair::generate();

        let snapshot = client.fetch(&ledger.pubkey()).await.unwrap();
        assert_eq!(snapshot.status, SnapshotStatus::Uninitialized);

        let op = Operation::InitializeLedger;
        let accounts = op.accounts(ledger.pubkey(), identity.0);
        client.submit(identity, op, accounts, &[&ledger]).await.unwrap();
        let snapshot = client.fetch(&ledger.pubkey()).await.unwrap();
        assert_eq!(snapshot.status, SnapshotStatus::Ready);
        assert!(snapshot.entries.is_empty());

        chain.set_account_data(ledger.pubkey(), vec![0xff]);
        assert!(matches!(
            client.fetch(&ledger.pubkey()).await,
            Err(FetchError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn transport_failures_are_retryable() {
        let (client, chain, identity) = connected().await;
        let ledger = Keypair::generate();
        chain.fail_sends(1);

        let op = Operation::InitializeLedger;
        let accounts = op.accounts(ledger.pubkey(), identity.0);
        let err = client
            .submit(identity, op, accounts, &[&ledger])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
