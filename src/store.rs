//! Storage layer for forgechain
//!
//! Two namespaces back the system: block records keyed by hash plus a
//! reserved tip pointer, and unspent-output records keyed by transaction
//! id. Multi-key writes are atomic, and output scans come back in
//! ascending key order so derived results are reproducible.

use crate::error::{ChainError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;

/// Abstraction for persistence backends. Implementations must provide
/// atomic writes for every multi-key operation.
pub trait Store: Send + Sync {
    /// Persists a block record under its hash and advances the tip pointer
    /// to that hash in the same transaction.
    fn put_block(&self, hash: &[u8], record: &[u8]) -> Result<()>;

    /// Fetches a block record by hash.
    fn block(&self, hash: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Current tip hash, or `None` before the chain exists.
    fn tip(&self) -> Result<Option<Vec<u8>>>;

    /// Replaces the entire unspent-output namespace in one transaction.
    fn replace_outputs(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()>;

    /// Applies removals, then upserts, to the unspent-output namespace in
    /// one transaction.
    fn apply_outputs(&self, remove: Vec<Vec<u8>>, upsert: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()>;

    /// Fetches the unspent-output record for one transaction id.
    fn outputs(&self, tx_id: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All unspent-output records in ascending key order.
    fn scan_outputs(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                hash BLOB PRIMARY KEY,
                record BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::Storage(format!("Failed to create blocks table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS utxo (
                tx_id BLOB PRIMARY KEY,
                record BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::Storage(format!("Failed to create utxo table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::Storage(format!("Failed to create metadata table: {}", e)))?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ChainError::Storage("Mutex poisoned".to_string()))
    }
}

impl Store for SqliteStore {
    fn put_block(&self, hash: &[u8], record: &[u8]) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| ChainError::Storage(format!("Failed to start transaction: {}", e)))?;

        tx.execute(
            "INSERT OR REPLACE INTO blocks (hash, record) VALUES (?1, ?2)",
            params![hash, record],
        )
        .map_err(|e| ChainError::Storage(format!("Failed to save block: {}", e)))?;

        tx.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('tip', ?1)",
            params![hash],
        )
        .map_err(|e| ChainError::Storage(format!("Failed to save tip: {}", e)))?;

        tx.commit()
            .map_err(|e| ChainError::Storage(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    fn block(&self, hash: &[u8]) -> Result<Option<Vec<u8>>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT record FROM blocks WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(record)
    }

    fn tip(&self) -> Result<Option<Vec<u8>>> {
        let conn = self.lock()?;
        let tip = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'tip'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(tip)
    }

    fn replace_outputs(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| ChainError::Storage(format!("Failed to start transaction: {}", e)))?;

        tx.execute("DELETE FROM utxo", [])
            .map_err(|e| ChainError::Storage(format!("Failed to clear utxo table: {}", e)))?;

        for (tx_id, record) in &entries {
            tx.execute(
                "INSERT INTO utxo (tx_id, record) VALUES (?1, ?2)",
                params![tx_id, record],
            )
            .map_err(|e| ChainError::Storage(format!("Failed to save outputs: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| ChainError::Storage(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    fn apply_outputs(&self, remove: Vec<Vec<u8>>, upsert: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| ChainError::Storage(format!("Failed to start transaction: {}", e)))?;

        for tx_id in &remove {
            tx.execute("DELETE FROM utxo WHERE tx_id = ?1", params![tx_id])
                .map_err(|e| ChainError::Storage(format!("Failed to remove outputs: {}", e)))?;
        }
        for (tx_id, record) in &upsert {
            tx.execute(
                "INSERT OR REPLACE INTO utxo (tx_id, record) VALUES (?1, ?2)",
                params![tx_id, record],
            )
            .map_err(|e| ChainError::Storage(format!("Failed to save outputs: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| ChainError::Storage(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    fn outputs(&self, tx_id: &[u8]) -> Result<Option<Vec<u8>>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT record FROM utxo WHERE tx_id = ?1",
                params![tx_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(record)
    }

    fn scan_outputs(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT tx_id, record FROM utxo ORDER BY tx_id ASC")
            .map_err(|e| ChainError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| ChainError::Storage(format!("Failed to query utxo table: {}", e)))?;

        let mut entries = Vec::new();
        for row in rows {
            entries
                .push(row.map_err(|e| ChainError::Storage(format!("Failed to read row: {}", e)))?);
        }
        Ok(entries)
    }
}

/// In-memory store useful for tests and ephemeral runs. Ordered scans come
/// from the underlying BTreeMap.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    blocks: HashMap<Vec<u8>, Vec<u8>>,
    outputs: BTreeMap<Vec<u8>, Vec<u8>>,
    tip: Option<Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| ChainError::Storage("Mutex poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    fn put_block(&self, hash: &[u8], record: &[u8]) -> Result<()> {
        let mut inner = self.lock()?;
        inner.blocks.insert(hash.to_vec(), record.to_vec());
        inner.tip = Some(hash.to_vec());
        Ok(())
    }

    fn block(&self, hash: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.blocks.get(hash).cloned())
    }

    fn tip(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.tip.clone())
    }

    fn replace_outputs(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
        let mut inner = self.lock()?;
        inner.outputs = entries.into_iter().collect();
        Ok(())
    }

    fn apply_outputs(&self, remove: Vec<Vec<u8>>, upsert: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
        let mut inner = self.lock()?;
        for tx_id in remove {
            inner.outputs.remove(&tx_id);
        }
        for (tx_id, record) in upsert {
            inner.outputs.insert(tx_id, record);
        }
        Ok(())
    }

    fn outputs(&self, tx_id: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.outputs.get(tx_id).cloned())
    }

    fn scan_outputs(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .lock()?
            .outputs
            .iter()
            .map(|(tx_id, record)| (tx_id.clone(), record.clone()))
            .collect())
    }
}
