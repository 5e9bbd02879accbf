//! Derived index of unspent transaction outputs.
//!
//! The index is never the source of truth: it can always be rebuilt from
//! the chain with [`UtxoIndex::reindex`], and after every appended block
//! [`UtxoIndex::update`] folds in the same changes incrementally. Both
//! paths must land on identical stored records.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::block::Block;
use crate::error::{ChainError, Result};
use crate::ledger::Ledger;
use crate::transaction::TxOutput;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Format tag prepended to every persisted outputs record.
const OUTPUTS_FORMAT_VERSION: u8 = 1;

/// Unspent outputs of one transaction, keyed by output index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UnspentOutputs(Vec<(i32, TxOutput)>);

impl UnspentOutputs {
    fn serialize(&self) -> Result<Vec<u8>> {
        let mut record = vec![OUTPUTS_FORMAT_VERSION];
        bincode::serialize_into(&mut record, self)?;
        Ok(record)
    }

    fn deserialize(record: &[u8]) -> Result<Self> {
        match record.split_first() {
            Some((&OUTPUTS_FORMAT_VERSION, body)) => Ok(bincode::deserialize(body)?),
            Some((version, _)) => Err(ChainError::Storage(format!(
                "Unsupported outputs record version {}",
                version
            ))),
            None => Err(ChainError::Storage("Empty outputs record".to_string())),
        }
    }
}

/// Index over the unspent-output namespace of the ledger's store.
pub struct UtxoIndex<'a> {
    ledger: &'a Ledger,
}

impl<'a> UtxoIndex<'a> {
    pub fn new(ledger: &'a Ledger) -> Self {
        UtxoIndex { ledger }
    }

    pub fn ledger(&self) -> &Ledger {
        self.ledger
    }

    /// Rebuilds the index from a single full chain scan, replacing the
    /// stored namespace wholesale.
    ///
    /// Blocks arrive tip first, so within each block spends are recorded
    /// before outputs are examined; an output is kept only if no input
    /// seen so far consumes it. A transaction with every output spent gets
    /// no entry at all, matching the incremental path.
    pub fn reindex(&self) -> Result<()> {
        let mut spent: HashMap<Vec<u8>, Vec<i32>> = HashMap::new();
        let mut unspent: HashMap<Vec<u8>, UnspentOutputs> = HashMap::new();

        for block in self.ledger.iter() {
            let block = block?;
            for tx in &block.transactions {
                if !tx.is_coinbase() {
                    for input in &tx.inputs {
                        spent
                            .entry(input.prev_tx_id.clone())
                            .or_default()
                            .push(input.output_index);
                    }
                }
            }
            for tx in &block.transactions {
                let spent_here = spent.get(&tx.id);
                let outputs: Vec<(i32, TxOutput)> = tx
                    .outputs
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| {
                        spent_here.map_or(true, |used| !used.contains(&(*index as i32)))
                    })
                    .map(|(index, output)| (index as i32, output.clone()))
                    .collect();
                if !outputs.is_empty() {
                    // First sighting wins, so a transaction re-minted with an
                    // identical id keeps its tip-most state, as the
                    // incremental path's last write does.
                    unspent
                        .entry(tx.id.clone())
                        .or_insert(UnspentOutputs(outputs));
                }
            }
        }

        let mut entries = Vec::with_capacity(unspent.len());
        for (tx_id, outputs) in unspent {
            entries.push((tx_id, outputs.serialize()?));
        }
        self.ledger.store().replace_outputs(entries)?;
        info!("utxo index rebuilt from chain scan");
        Ok(())
    }

    /// Applies one newly appended block: every output consumed by the
    /// block's inputs leaves the index, every output the block creates
    /// enters it. Removals are resolved against working copies so several
    /// inputs spending the same prior transaction see each other.
    pub fn update(&self, block: &Block) -> Result<()> {
        let store = self.ledger.store();
        let mut touched: HashMap<Vec<u8>, Vec<(i32, TxOutput)>> = HashMap::new();

        for tx in &block.transactions {
            if tx.is_coinbase() {
                continue;
            }
            for input in &tx.inputs {
                let remaining = match touched.entry(input.prev_tx_id.clone()) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let record = store.outputs(&input.prev_tx_id)?.ok_or_else(|| {
                            ChainError::NotFound(format!(
                                "utxo entry {}",
                                hex::encode(&input.prev_tx_id)
                            ))
                        })?;
                        entry.insert(UnspentOutputs::deserialize(&record)?.0)
                    }
                };
                remaining.retain(|(index, _)| *index != input.output_index);
            }
        }

        let mut remove = Vec::new();
        let mut upsert = Vec::new();
        for (tx_id, outputs) in touched {
            if outputs.is_empty() {
                remove.push(tx_id);
            } else {
                upsert.push((tx_id, UnspentOutputs(outputs).serialize()?));
            }
        }
        for tx in &block.transactions {
            let fresh: Vec<(i32, TxOutput)> = tx
                .outputs
                .iter()
                .enumerate()
                .map(|(index, output)| (index as i32, output.clone()))
                .collect();
            upsert.push((tx.id.clone(), UnspentOutputs(fresh).serialize()?));
        }

        store.apply_outputs(remove, upsert)?;
        debug!(txs = block.transactions.len(), "utxo index updated");
        Ok(())
    }

    /// Greedy first-fit selection for a payment of `amount`: walks the
    /// index in key order accumulating outputs locked to `pub_key_hash`
    /// and stops as soon as the total covers the amount.
    ///
    /// Returns the accumulated total and the `(tx_id, output_index)`
    /// references backing it; the referenced values always sum to exactly
    /// the returned total. A total below `amount` means the funds are not
    /// there.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: i64,
    ) -> Result<(i64, Vec<(Vec<u8>, i32)>)> {
        let mut total = 0i64;
        let mut picked: Vec<(Vec<u8>, i32)> = Vec::new();

        'scan: for (tx_id, record) in self.ledger.store().scan_outputs()? {
            let outputs = UnspentOutputs::deserialize(&record)?;
            for (index, output) in outputs.0 {
                if output.is_locked_with(pub_key_hash) {
                    total += output.value;
                    picked.push((tx_id.clone(), index));
                    if total >= amount {
                        break 'scan;
                    }
                }
            }
        }

        Ok((total, picked))
    }

    /// All unspent outputs locked to `pub_key_hash`.
    pub fn outputs_for(&self, pub_key_hash: &[u8]) -> Result<Vec<TxOutput>> {
        let mut found = Vec::new();
        for (_, record) in self.ledger.store().scan_outputs()? {
            let outputs = UnspentOutputs::deserialize(&record)?;
            for (_, output) in outputs.0 {
                if output.is_locked_with(pub_key_hash) {
                    found.push(output);
                }
            }
        }
        Ok(found)
    }

    /// Sum of all unspent output values locked to `pub_key_hash`.
    pub fn balance_of(&self, pub_key_hash: &[u8]) -> Result<i64> {
        Ok(self
            .outputs_for(pub_key_hash)?
            .iter()
            .map(|output| output.value)
            .sum())
    }
}
