//! Integration tests for wallet persistence and address handling

use std::sync::Arc;
use tempfile::TempDir;

use forgechain::crypto::{decode_address, encode_address, hash_pub_key, validate_address, KeyPair};
use forgechain::error::ChainError;
use forgechain::ledger::Ledger;
use forgechain::store::SqliteStore;
use forgechain::transaction::Transaction;
use forgechain::utxo::UtxoIndex;
use forgechain::wallet::Wallets;

/// Helper to get test directory
fn get_test_dir() -> Result<TempDir, Box<dyn std::error::Error>> {
    Ok(TempDir::new()?)
}

#[test]
fn test_wallet_file_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let dir = get_test_dir()?;
    let path = dir.path().join("wallet.json");

    // Create two keys and persist the collection.
    let wallets = Wallets::load(&path)?;
    let first = wallets.create()?;
    let second = wallets.create()?;
    wallets.save()?;
    assert!(path.exists());

    // Load the collection back and compare.
    let reloaded = Wallets::load(&path)?;
    assert_eq!(reloaded.len(), 2);
    assert_eq!(reloaded.get(&first)?.address(), first);
    assert_eq!(reloaded.get(&second)?.address(), second);
    Ok(())
}

#[test]
fn test_address_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let pair = KeyPair::generate()?;
    let address = pair.address();

    validate_address(&address)?;
    let decoded = decode_address(&address)?;
    assert_eq!(decoded, hash_pub_key(&pair.public_key_bytes()));

    // Re-encoding the recovered hash reproduces the identical string.
    assert_eq!(encode_address(&decoded), address);
    Ok(())
}

#[test]
fn test_corrupted_address_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let pair = KeyPair::generate()?;
    let address = pair.address();

    // Replace one character; the checksum must catch it.
    let mut corrupted: Vec<char> = address.chars().collect();
    corrupted[3] = if corrupted[3] == 'z' { 'x' } else { 'z' };
    let corrupted: String = corrupted.into_iter().collect();

    assert!(matches!(
        validate_address(&corrupted),
        Err(ChainError::InvalidAddress(_))
    ));
    Ok(())
}

#[test]
fn test_send_with_keys_from_wallet_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = get_test_dir()?;
    let wallet_path = dir.path().join("wallet.json");

    // Two addresses created through the wallet file.
    let wallets = Wallets::load(&wallet_path)?;
    let alice = wallets.create()?;
    let bob = wallets.create()?;
    wallets.save()?;

    let store = Arc::new(SqliteStore::open(dir.path().join("chain.db"))?);
    let mut ledger = Ledger::open(store, 8)?;
    ledger.genesis(&alice)?;
    UtxoIndex::new(&ledger).reindex()?;

    // Sign the transfer with the key loaded back from disk.
    let sender = Wallets::load(&wallet_path)?.get(&alice)?;
    let tx = {
        let utxo = UtxoIndex::new(&ledger);
        Transaction::new_transfer(&sender, &bob, 10, &utxo)?
    };
    let block = ledger.mine_block(vec![tx])?;
    UtxoIndex::new(&ledger).update(&block)?;

    let utxo = UtxoIndex::new(&ledger);
    assert_eq!(utxo.balance_of(&decode_address(&alice)?)?, 40);
    assert_eq!(utxo.balance_of(&decode_address(&bob)?)?, 10);
    Ok(())
}
