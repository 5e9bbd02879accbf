//! Wallet collection: named keypairs persisted as a single JSON document.
//!
//! The file maps Base58Check addresses to hex-encoded key material and is
//! rewritten in full on every save. A missing file is simply an empty
//! collection.

use crate::crypto::KeyPair;
use crate::error::{ChainError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Persisted form of one keypair.
#[derive(Debug, Serialize, Deserialize)]
struct StoredKey {
    secret_key_hex: String,
    public_key_hex: String,
}

/// Thread-safe collection of keypairs keyed by address.
pub struct Wallets {
    path: PathBuf,
    inner: RwLock<HashMap<String, KeyPair>>,
}

impl Wallets {
    /// Loads the collection backed by `path`. Every entry is re-derived
    /// from its secret key and cross-checked against the stored public key
    /// and address, so silent file corruption surfaces here.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Wallets> {
        let path = path.as_ref().to_path_buf();
        let mut keys = HashMap::new();

        if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|e| {
                ChainError::Wallet(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let stored: HashMap<String, StoredKey> =
                serde_json::from_str(&contents).map_err(|e| {
                    ChainError::Wallet(format!("Failed to parse {}: {}", path.display(), e))
                })?;

            for (address, entry) in stored {
                let secret = hex::decode(&entry.secret_key_hex).map_err(|e| {
                    ChainError::Wallet(format!("Bad secret key for {}: {}", address, e))
                })?;
                let pair = KeyPair::from_secret_bytes(&secret)?;

                if hex::encode(pair.public_key_bytes()) != entry.public_key_hex {
                    return Err(ChainError::Wallet(format!(
                        "Stored public key for {} does not match its secret key",
                        address
                    )));
                }
                if pair.address() != address {
                    return Err(ChainError::Wallet(format!(
                        "Stored address {} does not match its key material",
                        address
                    )));
                }
                keys.insert(address, pair);
            }
        }

        Ok(Wallets {
            path,
            inner: RwLock::new(keys),
        })
    }

    /// Rewrites the whole collection to its backing file, going through a
    /// temporary file and an atomic rename.
    pub fn save(&self) -> Result<()> {
        let stored: HashMap<String, StoredKey> = self
            .inner
            .read()
            .iter()
            .map(|(address, pair)| {
                (
                    address.clone(),
                    StoredKey {
                        secret_key_hex: hex::encode(pair.secret_key.secret_bytes()),
                        public_key_hex: hex::encode(pair.public_key_bytes()),
                    },
                )
            })
            .collect();

        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| ChainError::Wallet(format!("Failed to serialize wallets: {}", e)))?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = File::create(&temp_path)
            .map_err(|e| ChainError::Wallet(format!("Failed to create temp file: {}", e)))?;
        file.write_all(json.as_bytes())
            .map_err(|e| ChainError::Wallet(format!("Failed to write wallets: {}", e)))?;
        file.sync_all()
            .map_err(|e| ChainError::Wallet(format!("Failed to sync file: {}", e)))?;
        drop(file);

        fs::rename(&temp_path, &self.path)
            .map_err(|e| ChainError::Wallet(format!("Failed to finalize write: {}", e)))?;
        Ok(())
    }

    /// Generates a fresh keypair, adds it to the collection and returns
    /// its address. The collection is not saved automatically.
    pub fn create(&self) -> Result<String> {
        let pair = KeyPair::generate()?;
        let address = pair.address();
        self.inner.write().insert(address.clone(), pair);
        Ok(address)
    }

    /// Known addresses, sorted for stable listing.
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.inner.read().keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Looks up the keypair behind `address`.
    pub fn get(&self, address: &str) -> Result<KeyPair> {
        self.inner
            .read()
            .get(address)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(format!("wallet for {}", address)))
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
