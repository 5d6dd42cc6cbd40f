use super::error::ConnectionError;
use super::network::program::Transaction;
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, SECRET_KEY_LENGTH};
use log::{debug, info};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

/// 32 byte ed25519 public key, displayed in base58
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Pubkey(pub [u8; 32]);

impl Pubkey {
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

// base58 text for JSON, raw bytes for bincode
impl Serialize for Pubkey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let text = String::deserialize(deserializer)?;
            let bytes = bs58::decode(&text)
                .into_vec()
                .map_err(serde::de::Error::custom)?;
            let key: [u8; 32] = bytes
                .try_into()
                .map_err(|_| serde::de::Error::custom("public key must be 32 bytes"))?;
            Ok(Pubkey(key))
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Pubkey)
        }
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self)
    }
}

/// Owner of the system program. Shows up as `1111..` in base58.
pub const SYSTEM_PROGRAM: Pubkey = Pubkey([0; 32]);

pub struct Keypair(SigningKey);

impl Keypair {
    pub fn generate() -> Self {
        Keypair(SigningKey::generate(&mut OsRng))
    }

    /// Accepts either a bare 32 byte secret or the 64 byte
    /// `secret || public` layout exported by web3 wallets.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.len() {
            SECRET_KEY_LENGTH => {
                let secret: [u8; SECRET_KEY_LENGTH] = bytes.try_into().ok()?;
                Some(Keypair(SigningKey::from_bytes(&secret)))
            }
            64 => {
                let pair: [u8; 64] = bytes.try_into().ok()?;
                SigningKey::from_keypair_bytes(&pair).ok().map(Keypair)
            }
            _ => None,
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        Pubkey(self.0.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.0.sign(message).to_bytes().to_vec()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Keypair").field(&self.pubkey()).finish()
    }
}

/// Public account of the connected user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Identity(pub Pubkey);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The shared ledger account. Built once at session start from
/// the static ledger keypair; the keypair co-signs initialization.
#[derive(Debug)]
pub struct LedgerAccountRef {
    keypair: Keypair,
}

impl LedgerAccountRef {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

/// Identity capability: connects the user's account and signs
/// transactions on its behalf.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// With `trusted_only` set the wallet must not prompt, and fails
    /// if the user has not trusted this client before.
    async fn connect(&self, trusted_only: bool) -> Result<Identity, ConnectionError>;

    async fn disconnect(&self);

    /// Adds the connected identity's signature to `tx`.
    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, ConnectionError>;
}

/// Wallet backed by a local keypair. A non trusted connect stands in for
/// the approval prompt and is granted when `approve_prompts` is set.
pub struct KeypairWallet {
    keypair: Keypair,
    trusted: AtomicBool,
    connected: AtomicBool,
    approve_prompts: bool,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair, trusted: bool, approve_prompts: bool) -> Self {
        Self {
            keypair,
            trusted: AtomicBool::new(trusted),
            connected: AtomicBool::new(false),
            approve_prompts,
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

#[async_trait]
impl Wallet for KeypairWallet {
    async fn connect(&self, trusted_only: bool) -> Result<Identity, ConnectionError> {
        if !self.trusted.load(Ordering::SeqCst) {
            if trusted_only {
                debug!("wallet not trusted yet, skipping silent connect");
                return Err(ConnectionError::NotConnected);
            }
            if !self.approve_prompts {
                return Err(ConnectionError::Rejected);
            }
            self.trusted.store(true, Ordering::SeqCst);
        }

        self.connected.store(true, Ordering::SeqCst);
        let identity = Identity(self.keypair.pubkey());
        info!("Connected with public key: {}", identity);
        Ok(identity)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn sign_transaction(&self, mut tx: Transaction) -> Result<Transaction, ConnectionError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ConnectionError::NotConnected);
        }
        tx.sign(&self.keypair)
            .map_err(|e| ConnectionError::Signing(e.to_string()))?;
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_round_trips_through_web3_layout() {
        let keypair = Keypair::generate();
        let mut bytes = keypair.0.to_bytes().to_vec();
        bytes.extend_from_slice(&keypair.pubkey().to_bytes());

        let restored = Keypair::from_bytes(&bytes).unwrap();
        assert_eq!(restored.pubkey(), keypair.pubkey());
        assert!(Keypair::from_bytes(&bytes[..10]).is_none());
    }

    #[test]
    fn system_program_displays_as_ones() {
        assert_eq!(SYSTEM_PROGRAM.to_string(), "11111111111111111111111111111111");
    }

    #[test]
    fn pubkey_is_base58_in_json() {
        let key = Keypair::generate().pubkey();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key));
        assert_eq!(serde_json::from_str::<Pubkey>(&json).unwrap(), key);
    }

    #[tokio::test]
    async fn trusted_only_connect_never_prompts() {
        let wallet = KeypairWallet::new(Keypair::generate(), false, true);
        assert_eq!(
            wallet.connect(true).await,
            Err(ConnectionError::NotConnected)
        );

        // prompt approved, wallet is trusted from now on
        let identity = wallet.connect(false).await.unwrap();
        assert_eq!(identity.0, wallet.pubkey());
        assert_eq!(wallet.connect(true).await, Ok(identity));
    }

    #[tokio::test]
    async fn rejected_prompt_fails() {
        let wallet = KeypairWallet::new(Keypair::generate(), false, false);
        assert_eq!(wallet.connect(false).await, Err(ConnectionError::Rejected));
    }
}
