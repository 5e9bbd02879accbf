//! Transaction types for forgechain
//!
//! A transaction consumes outputs of prior transactions and creates new
//! ones. Coinbase transactions mint the block subsidy from nothing and are
//! the only inputs-free shape. Ids are content-derived, and every input is
//! signed against the prior transaction it spends.

use std::collections::HashMap;

use crate::crypto::{self, KeyPair};
use crate::error::{ChainError, Result};
use crate::utxo::UtxoIndex;
use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Value minted by every coinbase transaction.
pub const SUBSIDY: i64 = 50;

/// Output index carried by the synthetic coinbase input.
pub const COINBASE_OUTPUT_INDEX: i32 = -1;

/// A reference to an output of a prior transaction, together with the
/// credentials that unlock it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInput {
    #[serde(with = "serde_bytes")]
    pub prev_tx_id: Vec<u8>,
    pub output_index: i32,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub pub_key: Vec<u8>,
}

impl TxInput {
    /// True when the embedded public key hashes to `pub_key_hash`.
    pub fn unlocks_with(&self, pub_key_hash: &[u8]) -> bool {
        crypto::hash_pub_key(&self.pub_key) == pub_key_hash
    }
}

/// An amount of value locked to a public key hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: i64,
    #[serde(with = "serde_bytes")]
    pub pub_key_hash: Vec<u8>,
}

impl TxOutput {
    /// Builds an output of `value` locked to the key hash behind `address`.
    pub fn locked_to(value: i64, address: &str) -> Result<Self> {
        Ok(TxOutput {
            value,
            pub_key_hash: crypto::decode_address(address)?,
        })
    }

    /// True when the holder of `pub_key_hash` may spend this output.
    pub fn is_locked_with(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash == pub_key_hash
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Mints the block subsidy to `to`. The single input references no
    /// prior output and carries `memo` bytes in place of a public key;
    /// an empty memo falls back to a reward note naming the recipient.
    pub fn new_coinbase(to: &str, memo: &str) -> Result<Transaction> {
        let memo = if memo.is_empty() {
            format!("Reward to '{}'", to)
        } else {
            memo.to_string()
        };

        let input = TxInput {
            prev_tx_id: Vec::new(),
            output_index: COINBASE_OUTPUT_INDEX,
            signature: Vec::new(),
            pub_key: memo.into_bytes(),
        };
        let output = TxOutput::locked_to(SUBSIDY, to)?;

        let mut tx = Transaction {
            id: Vec::new(),
            inputs: vec![input],
            outputs: vec![output],
        };
        tx.id = tx.compute_id()?;
        Ok(tx)
    }

    /// Builds and signs a transfer of `amount` from the holder of `sender`
    /// to the `to` address.
    ///
    /// Inputs are drawn greedily from the unspent outputs locked to the
    /// sender's key hash; a change output returns any overshoot to the
    /// sender. The transaction comes back fully signed.
    pub fn new_transfer(
        sender: &KeyPair,
        to: &str,
        amount: i64,
        utxo: &UtxoIndex,
    ) -> Result<Transaction> {
        if amount <= 0 {
            return Err(ChainError::InvalidTransaction(format!(
                "Transfer amount must be positive, got {}",
                amount
            )));
        }

        let pub_key_hash = crypto::hash_pub_key(&sender.public_key_bytes());
        let (total, picked) = utxo.find_spendable_outputs(&pub_key_hash, amount)?;
        if total < amount {
            return Err(ChainError::InsufficientFunds {
                requested: amount,
                available: total,
            });
        }

        let inputs: Vec<TxInput> = picked
            .into_iter()
            .map(|(prev_tx_id, output_index)| TxInput {
                prev_tx_id,
                output_index,
                signature: Vec::new(),
                pub_key: Vec::new(),
            })
            .collect();

        let mut outputs = vec![TxOutput::locked_to(amount, to)?];
        if total > amount {
            // Change returns to the sender.
            outputs.push(TxOutput {
                value: total - amount,
                pub_key_hash,
            });
        }

        let mut tx = Transaction {
            id: Vec::new(),
            inputs,
            outputs,
        };
        tx.id = tx.compute_id()?;
        utxo.ledger().sign_transaction(&mut tx, &sender.secret_key)?;
        Ok(tx)
    }

    /// True for subsidy-minting transactions.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].prev_tx_id.is_empty()
            && self.inputs[0].output_index == COINBASE_OUTPUT_INDEX
    }

    /// SHA-256 over the canonical encoding of this transaction with the id
    /// field cleared. Stable for a given content, so a transaction can be
    /// re-identified after a round trip through storage.
    pub fn compute_id(&self) -> Result<Vec<u8>> {
        let mut stripped = self.clone();
        stripped.id = Vec::new();
        let encoded = bincode::serialize(&stripped)?;
        Ok(Sha256::digest(&encoded).to_vec())
    }

    /// Structural copy with every input's signature and public key cleared.
    /// Signing digests are computed over this shape, so signatures never
    /// cover other inputs' credential bytes.
    pub fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .inputs
            .iter()
            .map(|input| TxInput {
                prev_tx_id: input.prev_tx_id.clone(),
                output_index: input.output_index,
                signature: Vec::new(),
                pub_key: Vec::new(),
            })
            .collect();

        Transaction {
            id: self.id.clone(),
            inputs,
            outputs: self.outputs.clone(),
        }
    }

    /// Signs every input against the prior transaction it spends.
    ///
    /// For input `i` the digest is the recomputed id of the trimmed copy
    /// with the referenced output's key hash standing in for the input's
    /// public key, the substitution being cleared again afterwards. The
    /// compact signature and the sender's raw public key are then stored
    /// on the real input.
    pub fn sign(
        &mut self,
        secret_key: &SecretKey,
        prior: &HashMap<Vec<u8>, Transaction>,
    ) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        // Resolve every reference up front so no input is left half signed.
        for input in &self.inputs {
            referenced_output(input, prior)?;
        }

        let public_key = KeyPair::from_secret_key(*secret_key).public_key_bytes();
        let mut trimmed = self.trimmed_copy();

        for index in 0..self.inputs.len() {
            let pub_key_hash = referenced_output(&self.inputs[index], prior)?
                .pub_key_hash
                .clone();

            trimmed.inputs[index].pub_key = pub_key_hash;
            trimmed.id = trimmed.compute_id()?;
            trimmed.inputs[index].pub_key = Vec::new();

            let signature = crypto::sign_digest(&trimmed.id, secret_key)?;
            self.inputs[index].signature = signature.to_vec();
            self.inputs[index].pub_key = public_key.to_vec();
        }
        Ok(())
    }

    /// Checks every input's signature against the prior transaction it
    /// spends, rebuilding the same digest the signer used.
    ///
    /// A mismatched or malformed signature yields `Ok(false)`; a prior
    /// transaction that cannot be resolved is a hard error.
    pub fn verify(&self, prior: &HashMap<Vec<u8>, Transaction>) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }

        let mut trimmed = self.trimmed_copy();

        for index in 0..self.inputs.len() {
            let input = &self.inputs[index];
            let pub_key_hash = referenced_output(input, prior)?.pub_key_hash.clone();

            trimmed.inputs[index].pub_key = pub_key_hash;
            trimmed.id = trimmed.compute_id()?;
            trimmed.inputs[index].pub_key = Vec::new();

            if !crypto::verify_digest(&trimmed.id, &input.signature, &input.pub_key)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Resolves the prior output an input spends, or fails with the typed
/// error for an unknown transaction or an out-of-range index.
fn referenced_output<'a>(
    input: &TxInput,
    prior: &'a HashMap<Vec<u8>, Transaction>,
) -> Result<&'a TxOutput> {
    let prior_tx = prior
        .get(&input.prev_tx_id)
        .ok_or_else(|| ChainError::MissingPriorTransaction(hex::encode(&input.prev_tx_id)))?;

    usize::try_from(input.output_index)
        .ok()
        .and_then(|index| prior_tx.outputs.get(index))
        .ok_or_else(|| {
            ChainError::InvalidTransaction(format!(
                "Input references missing output {} of {}",
                input.output_index,
                hex::encode(&input.prev_tx_id)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_hash_of(keypair: &KeyPair) -> Vec<u8> {
        crypto::hash_pub_key(&keypair.public_key_bytes())
    }

    /// A signed transfer spending the single output of a coinbase paid to
    /// `sender`, splitting it between `recipient` and change.
    fn signed_transfer(
        sender: &KeyPair,
        recipient: &KeyPair,
    ) -> (Transaction, HashMap<Vec<u8>, Transaction>) {
        let coinbase = Transaction::new_coinbase(&sender.address(), "").unwrap();
        let mut prior = HashMap::new();
        prior.insert(coinbase.id.clone(), coinbase.clone());

        let mut tx = Transaction {
            id: Vec::new(),
            inputs: vec![TxInput {
                prev_tx_id: coinbase.id.clone(),
                output_index: 0,
                signature: Vec::new(),
                pub_key: Vec::new(),
            }],
            outputs: vec![
                TxOutput {
                    value: 30,
                    pub_key_hash: key_hash_of(recipient),
                },
                TxOutput {
                    value: SUBSIDY - 30,
                    pub_key_hash: key_hash_of(sender),
                },
            ],
        };
        tx.id = tx.compute_id().unwrap();
        tx.sign(&sender.secret_key, &prior).unwrap();
        (tx, prior)
    }

    #[test]
    fn test_coinbase_shape() {
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.address();
        let tx = Transaction::new_coinbase(&address, "").unwrap();

        assert!(tx.is_coinbase());
        assert_eq!(tx.id.len(), 32);
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].value, SUBSIDY);
        assert_eq!(tx.outputs[0].pub_key_hash, key_hash_of(&keypair));
        assert_eq!(
            tx.inputs[0].pub_key,
            format!("Reward to '{}'", address).into_bytes()
        );
    }

    #[test]
    fn test_coinbase_memo_is_kept() {
        let keypair = KeyPair::generate().unwrap();
        let tx = Transaction::new_coinbase(&keypair.address(), "block one").unwrap();
        assert_eq!(tx.inputs[0].pub_key, b"block one".to_vec());
    }

    #[test]
    fn test_compute_id_is_stable_and_content_derived() {
        let keypair = KeyPair::generate().unwrap();
        let mut tx = Transaction::new_coinbase(&keypair.address(), "memo").unwrap();

        // The stored id does not feed back into the digest.
        let original = tx.id.clone();
        tx.id = vec![0xFF; 32];
        assert_eq!(tx.compute_id().unwrap(), original);

        tx.outputs[0].value += 1;
        assert_ne!(tx.compute_id().unwrap(), original);
    }

    #[test]
    fn test_trimmed_copy_clears_credentials() {
        let sender = KeyPair::generate().unwrap();
        let recipient = KeyPair::generate().unwrap();
        let (tx, _) = signed_transfer(&sender, &recipient);

        let trimmed = tx.trimmed_copy();
        assert_eq!(trimmed.inputs.len(), tx.inputs.len());
        assert!(trimmed.inputs.iter().all(|input| input.signature.is_empty()));
        assert!(trimmed.inputs.iter().all(|input| input.pub_key.is_empty()));
        assert!(!tx.inputs[0].signature.is_empty());
    }

    #[test]
    fn test_sign_then_verify() {
        let sender = KeyPair::generate().unwrap();
        let recipient = KeyPair::generate().unwrap();
        let (tx, prior) = signed_transfer(&sender, &recipient);

        assert!(tx.verify(&prior).unwrap());
        assert_eq!(tx.inputs[0].pub_key, sender.public_key_bytes().to_vec());
    }

    #[test]
    fn test_verify_fails_after_output_tampering() {
        let sender = KeyPair::generate().unwrap();
        let recipient = KeyPair::generate().unwrap();
        let (mut tx, prior) = signed_transfer(&sender, &recipient);

        tx.outputs[0].value += 1;
        assert!(!tx.verify(&prior).unwrap());
    }

    #[test]
    fn test_verify_fails_on_flipped_credentials() {
        let sender = KeyPair::generate().unwrap();
        let recipient = KeyPair::generate().unwrap();

        let (mut tx, prior) = signed_transfer(&sender, &recipient);
        tx.inputs[0].signature[7] ^= 0x01;
        assert!(!tx.verify(&prior).unwrap());

        let (mut tx, prior) = signed_transfer(&sender, &recipient);
        tx.inputs[0].pub_key[7] ^= 0x01;
        assert!(!tx.verify(&prior).unwrap());
    }

    #[test]
    fn test_verify_missing_prior_is_hard_error() {
        let sender = KeyPair::generate().unwrap();
        let recipient = KeyPair::generate().unwrap();
        let (tx, _) = signed_transfer(&sender, &recipient);

        let empty = HashMap::new();
        assert!(matches!(
            tx.verify(&empty),
            Err(ChainError::MissingPriorTransaction(_))
        ));
    }

    #[test]
    fn test_sign_rejects_out_of_range_reference() {
        let sender = KeyPair::generate().unwrap();
        let coinbase = Transaction::new_coinbase(&sender.address(), "").unwrap();
        let mut prior = HashMap::new();
        prior.insert(coinbase.id.clone(), coinbase.clone());

        let mut tx = Transaction {
            id: Vec::new(),
            inputs: vec![TxInput {
                prev_tx_id: coinbase.id.clone(),
                output_index: 5,
                signature: Vec::new(),
                pub_key: Vec::new(),
            }],
            outputs: vec![TxOutput {
                value: 1,
                pub_key_hash: key_hash_of(&sender),
            }],
        };
        tx.id = tx.compute_id().unwrap();

        assert!(matches!(
            tx.sign(&sender.secret_key, &prior),
            Err(ChainError::InvalidTransaction(_))
        ));
        // Nothing was written to the input.
        assert!(tx.inputs[0].signature.is_empty());
    }

    #[test]
    fn test_unlocks_with_matches_key_hash() {
        let keypair = KeyPair::generate().unwrap();
        let input = TxInput {
            prev_tx_id: vec![1; 32],
            output_index: 0,
            signature: Vec::new(),
            pub_key: keypair.public_key_bytes().to_vec(),
        };
        assert!(input.unlocks_with(&key_hash_of(&keypair)));
        assert!(!input.unlocks_with(&[0u8; 20]));
    }

    #[test]
    fn test_output_locking() {
        let keypair = KeyPair::generate().unwrap();
        let output = TxOutput::locked_to(10, &keypair.address()).unwrap();
        assert!(output.is_locked_with(&key_hash_of(&keypair)));
        assert!(!output.is_locked_with(&[0u8; 20]));
        assert!(TxOutput::locked_to(10, "not an address").is_err());
    }
}
