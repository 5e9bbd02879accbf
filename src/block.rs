//! Block structure and its persisted encoding.

use crate::error::{ChainError, Result};
use crate::merkle;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

/// Format tag prepended to every persisted block record, so stored layouts
/// can evolve without guessing.
pub const BLOCK_FORMAT_VERSION: u8 = 1;

/// One link of the chain. `prev_hash` is empty only on the genesis block;
/// `hash` and `nonce` are filled in by the proof-of-work search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    #[serde(with = "serde_bytes")]
    pub prev_hash: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub hash: Vec<u8>,
    pub nonce: i64,
}

impl Block {
    /// Assembles an unmined block on top of `prev_hash`, stamped with the
    /// current wall clock.
    pub fn new(transactions: Vec<Transaction>, prev_hash: Vec<u8>) -> Self {
        Block {
            timestamp: chrono::Utc::now().timestamp(),
            transactions,
            prev_hash,
            hash: Vec::new(),
            nonce: 0,
        }
    }

    /// True for the unique chain terminal.
    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_empty()
    }

    /// Merkle commitment over the contained transaction ids.
    pub fn tx_commitment(&self) -> [u8; 32] {
        let ids: Vec<Vec<u8>> = self
            .transactions
            .iter()
            .map(|tx| tx.id.clone())
            .collect();
        merkle::commit(&ids)
    }

    /// Encodes the block for storage, with a leading format version byte.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut record = vec![BLOCK_FORMAT_VERSION];
        bincode::serialize_into(&mut record, self)?;
        Ok(record)
    }

    /// Decodes a stored block record, checking the format version first.
    pub fn deserialize(record: &[u8]) -> Result<Block> {
        match record.split_first() {
            Some((&BLOCK_FORMAT_VERSION, body)) => Ok(bincode::deserialize(body)?),
            Some((version, _)) => Err(ChainError::Storage(format!(
                "Unsupported block record version {}",
                version
            ))),
            None => Err(ChainError::Storage("Empty block record".to_string())),
        }
    }
}
