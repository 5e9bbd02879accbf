//! Chain-level API: genesis bootstrap, verified append, backward iteration
//! and prior-transaction lookups for signing.

use std::collections::HashMap;
use std::sync::Arc;

use crate::block::Block;
use crate::crypto;
use crate::error::{ChainError, Result};
use crate::pow::ProofOfWork;
use crate::store::Store;
use crate::transaction::Transaction;
use secp256k1::SecretKey;
use tracing::info;

/// Memo carried by the genesis coinbase.
pub const GENESIS_MEMO: &str = "Genesis data";

/// The append-only chain over a storage backend. The tip is cached and
/// only advances after the backing store has committed the new block.
pub struct Ledger {
    store: Arc<dyn Store>,
    pow: ProofOfWork,
    tip: Option<Vec<u8>>,
}

impl Ledger {
    /// Opens the ledger over `store`. The chain may not exist yet; reads
    /// and appends then fail until [`Ledger::genesis`] runs.
    pub fn open(store: Arc<dyn Store>, difficulty_bits: u32) -> Result<Ledger> {
        let tip = store.tip()?;
        Ok(Ledger {
            store,
            pow: ProofOfWork::new(difficulty_bits),
            tip,
        })
    }

    /// Creates and persists the genesis block paying the subsidy to
    /// `address`, unless a chain already exists. Returns whether a new
    /// chain was created. This is the only path that produces a block
    /// with an empty previous hash.
    pub fn genesis(&mut self, address: &str) -> Result<bool> {
        if self.tip.is_some() {
            return Ok(false);
        }
        crypto::validate_address(address)?;

        let coinbase = Transaction::new_coinbase(address, GENESIS_MEMO)?;
        let block = self.pow.mine(Block::new(vec![coinbase], Vec::new()))?;
        self.persist(&block)?;
        info!(hash = %hex::encode(&block.hash), "created genesis block");
        Ok(true)
    }

    /// Verifies `transactions`, mines a block on the current tip and
    /// appends it. On any failure the tip is left untouched.
    pub fn mine_block(&mut self, transactions: Vec<Transaction>) -> Result<Block> {
        let tip = self.tip.clone().ok_or(ChainError::NotInitialized)?;

        for tx in &transactions {
            if !self.verify_transaction(tx)? {
                return Err(ChainError::InvalidTransaction(format!(
                    "Signature verification failed for {}",
                    hex::encode(&tx.id)
                )));
            }
        }

        let block = self.pow.mine(Block::new(transactions, tip))?;
        self.persist(&block)?;
        info!(
            hash = %hex::encode(&block.hash),
            txs = block.transactions.len(),
            "appended block"
        );
        Ok(block)
    }

    fn persist(&mut self, block: &Block) -> Result<()> {
        let record = block.serialize()?;
        self.store.put_block(&block.hash, &record)?;
        self.tip = Some(block.hash.clone());
        Ok(())
    }

    /// Loads a block by hash.
    pub fn block(&self, hash: &[u8]) -> Result<Block> {
        let record = self
            .store
            .block(hash)?
            .ok_or_else(|| ChainError::NotFound(format!("block {}", hex::encode(hash))))?;
        Block::deserialize(&record)
    }

    /// Current tip hash, or `None` before the chain exists.
    pub fn tip(&self) -> Option<&[u8]> {
        self.tip.as_deref()
    }

    pub fn proof_of_work(&self) -> &ProofOfWork {
        &self.pow
    }

    /// Storage backend handle, shared with the unspent-output index.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Walks the chain backward from the tip down to and including the
    /// genesis block. Yields nothing when the chain is uninitialized.
    pub fn iter(&self) -> ChainIter<'_> {
        ChainIter {
            ledger: self,
            cursor: self.tip.clone().unwrap_or_default(),
        }
    }

    /// Finds a committed transaction by id, scanning tip to genesis.
    pub fn find_transaction(&self, id: &[u8]) -> Result<Transaction> {
        for block in self.iter() {
            let block = block?;
            for tx in block.transactions {
                if tx.id == id {
                    return Ok(tx);
                }
            }
        }
        Err(ChainError::NotFound(format!(
            "transaction {}",
            hex::encode(id)
        )))
    }

    /// Gathers the prior transactions referenced by the inputs of `tx`.
    fn prior_transactions(&self, tx: &Transaction) -> Result<HashMap<Vec<u8>, Transaction>> {
        let mut prior = HashMap::new();
        if tx.is_coinbase() {
            return Ok(prior);
        }
        for input in &tx.inputs {
            if prior.contains_key(&input.prev_tx_id) {
                continue;
            }
            let found = self
                .find_transaction(&input.prev_tx_id)
                .map_err(|err| match err {
                    ChainError::NotFound(_) => {
                        ChainError::MissingPriorTransaction(hex::encode(&input.prev_tx_id))
                    }
                    other => other,
                })?;
            prior.insert(input.prev_tx_id.clone(), found);
        }
        Ok(prior)
    }

    /// Signs `tx` against the prior transactions it references.
    pub fn sign_transaction(&self, tx: &mut Transaction, secret_key: &SecretKey) -> Result<()> {
        let prior = self.prior_transactions(tx)?;
        tx.sign(secret_key, &prior)
    }

    /// Verifies `tx` against the prior transactions it references.
    /// Coinbase transactions verify unconditionally.
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        let prior = self.prior_transactions(tx)?;
        tx.verify(&prior)
    }
}

/// Lazy tip-to-genesis walk; each step is one store read.
pub struct ChainIter<'a> {
    ledger: &'a Ledger,
    cursor: Vec<u8>,
}

impl Iterator for ChainIter<'_> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_empty() {
            return None;
        }
        match self.ledger.block(&self.cursor) {
            Ok(block) => {
                self.cursor = block.prev_hash.clone();
                Some(Ok(block))
            }
            Err(err) => {
                // Stop after surfacing a broken link.
                self.cursor = Vec::new();
                Some(Err(err))
            }
        }
    }
}
