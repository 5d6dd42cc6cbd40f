use super::network::{cluster_url, Commitment};
use super::wallet::Keypair;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Cluster moniker (`devnet`, `mainnet-beta`, ..) or an RPC url. The
    /// binary only reports it; its ledger runs in process.
    pub cluster: String,
    pub commitment: Commitment,
    /// Static keypair of the shared ledger account
    pub ledger_keypair: PathBuf,
    /// Wallet keypair; a fresh one is generated when absent
    pub wallet_keypair: Option<PathBuf>,
    /// Whether the wallet already trusts this client
    pub trusted: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: "devnet".to_string(),
            commitment: Commitment::Processed,
            ledger_keypair: PathBuf::from("keypair.json"),
            wallet_keypair: None,
            trusted: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn rpc_url(&self) -> String {
        cluster_url(&self.cluster)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeypairFile {
    /// `{"_keypair": {"publicKey": [..], "secretKey": [..]}}`
    Web3 {
        #[serde(rename = "_keypair")]
        keypair: Web3Keypair,
    },
    Bytes(Vec<u8>),
}

#[derive(Deserialize)]
struct Web3Keypair {
    #[serde(rename = "secretKey")]
    secret_key: SecretKey,
}

/// web3 dumps the secret as an object keyed by index
#[derive(Deserialize)]
#[serde(untagged)]
enum SecretKey {
    Array(Vec<u8>),
    Indexed(std::collections::BTreeMap<String, u8>),
}

pub fn parse_keypair(raw: &str) -> anyhow::Result<Keypair> {
    let bytes = match serde_json::from_str::<KeypairFile>(raw)? {
        KeypairFile::Bytes(bytes) => bytes,
        KeypairFile::Web3 { keypair } => match keypair.secret_key {
            SecretKey::Array(bytes) => bytes,
            SecretKey::Indexed(map) => {
                let mut indexed = map
                    .into_iter()
                    .map(|(k, v)| k.parse::<usize>().map(|k| (k, v)))
                    .collect::<Result<Vec<_>, _>>()?;
                indexed.sort_unstable_by_key(|(k, _)| *k);
                indexed.into_iter().map(|(_, v)| v).collect()
            }
        },
    };
    Keypair::from_bytes(&bytes).ok_or_else(|| anyhow!("keypair must hold 32 or 64 bytes"))
}

pub fn load_keypair(path: &Path) -> anyhow::Result<Keypair> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading keypair {}", path.display()))?;
    parse_keypair(&raw).with_context(|| format!("parsing keypair {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"cluster": "localnet"}"#).unwrap();
        assert_eq!(config.rpc_url(), "http://127.0.0.1:8899");
        assert_eq!(config.commitment, Commitment::Processed);
        assert_eq!(config.ledger_keypair, PathBuf::from("keypair.json"));
    }

    #[test]
    fn keypair_formats_agree() {
        let seed = [7u8; 32];
        let expected = Keypair::from_bytes(&seed).unwrap().pubkey();

        let bare = serde_json::to_string(&seed.to_vec()).unwrap();
        assert_eq!(parse_keypair(&bare).unwrap().pubkey(), expected);

        let mut full = seed.to_vec();
        full.extend_from_slice(&expected.to_bytes());
        let web3 = format!(r#"{{"_keypair": {{"secretKey": {:?}}}}}"#, full);
        assert_eq!(parse_keypair(&web3).unwrap().pubkey(), expected);

        let indexed: String = full
            .iter()
            .enumerate()
            .map(|(i, b)| format!(r#""{}":{}"#, i, b))
            .collect::<Vec<_>>()
            .join(",");
        let web3_indexed = format!(r#"{{"_keypair": {{"secretKey": {{{}}}}}}}"#, indexed);
        assert_eq!(parse_keypair(&web3_indexed).unwrap().pubkey(), expected);
    }

    #[test]
    fn short_keypair_is_rejected() {
        assert!(parse_keypair("[1, 2, 3]").is_err());
    }
}
