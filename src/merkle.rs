//! Merkle commitment over the transaction ids of a block.

use sha2::{Digest, Sha256};

/// Folds a list of transaction ids into a single 32-byte commitment.
///
/// Ids form the leaf level. An odd level is padded by repeating its last
/// value, then adjacent pairs are hashed together, and the fold repeats
/// until one value remains. A single-id list therefore commits to the hash
/// of the id paired with itself, and reordering ids changes the result.
pub fn commit(tx_ids: &[Vec<u8>]) -> [u8; 32] {
    if tx_ids.is_empty() {
        return Sha256::digest(b"").into();
    }

    let mut level: Vec<Vec<u8>> = tx_ids.to_vec();
    loop {
        if level.len() % 2 != 0 {
            level.push(level[level.len() - 1].clone());
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut hasher = Sha256::new();
                hasher.update(&pair[0]);
                hasher.update(&pair[1]);
                hasher.finalize().to_vec()
            })
            .collect();
        if level.len() == 1 {
            break;
        }
    }

    let mut root = [0u8; 32];
    root.copy_from_slice(&level[0]);
    root
}
