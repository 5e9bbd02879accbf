//! Proof-of-work sequencer: nonce search and the admission predicate.

use crate::block::Block;
use crate::error::{ChainError, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Default number of leading zero bits a block digest must clear.
pub const DEFAULT_DIFFICULTY_BITS: u32 = 16;

/// Fixed-difficulty proof of work over the block header fields.
///
/// A digest is acceptable when, read as a big-endian 256-bit integer, it is
/// strictly below `2^(256 - bits)`. The comparison runs against the largest
/// acceptable digest, so no big-integer arithmetic is needed.
#[derive(Debug, Clone)]
pub struct ProofOfWork {
    bits: u32,
    bound: [u8; 32],
}

impl ProofOfWork {
    pub fn new(bits: u32) -> Self {
        ProofOfWork {
            bits,
            bound: target_bound(bits),
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Searches nonces from zero upward until the header digest clears the
    /// difficulty bound, then returns the block with its winning nonce and
    /// hash filled in.
    pub fn mine(&self, mut block: Block) -> Result<Block> {
        let commitment = block.tx_commitment();
        for nonce in 0..i64::MAX {
            let digest = self.header_digest(&block, &commitment, nonce);
            if digest <= self.bound {
                block.nonce = nonce;
                block.hash = digest.to_vec();
                debug!(nonce, hash = %hex::encode(&block.hash), "difficulty target met");
                return Ok(block);
            }
        }
        Err(ChainError::MiningExhausted)
    }

    /// Recomputes the digest from the block contents and stored nonce and
    /// checks it against the difficulty bound. The stored hash is not
    /// trusted.
    pub fn validate(&self, block: &Block) -> bool {
        let commitment = block.tx_commitment();
        let digest = self.header_digest(block, &commitment, block.nonce);
        digest <= self.bound
    }

    /// Explicit header preimage: length-prefixed previous hash, transaction
    /// commitment, then fixed-width big-endian timestamp, difficulty bits
    /// and nonce. Field widths are pinned so the digest is reproducible.
    fn header_digest(&self, block: &Block, commitment: &[u8; 32], nonce: i64) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update((block.prev_hash.len() as u32).to_be_bytes());
        hasher.update(&block.prev_hash);
        hasher.update(commitment);
        hasher.update(block.timestamp.to_be_bytes());
        hasher.update(self.bits.to_be_bytes());
        hasher.update(nonce.to_be_bytes());
        hasher.finalize().into()
    }
}

/// Largest digest that still satisfies the difficulty, as a big-endian
/// byte array: `bits` leading zero bits, ones everywhere after.
fn target_bound(bits: u32) -> [u8; 32] {
    let mut bound = [0xFF; 32];
    let leading_zeros = (bits / 8) as usize;
    let partial_bits = bits % 8;

    for item in bound.iter_mut().take(leading_zeros.min(32)) {
        *item = 0;
    }

    if leading_zeros < 32 && partial_bits > 0 {
        bound[leading_zeros] = 0xFF >> partial_bits;
    }
    bound
}
