//! Command surface: one binary, subcommand per ledger operation.

use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::config::{load_config, Config};
use crate::crypto::{decode_address, validate_address};
use crate::error::Result;
use crate::ledger::Ledger;
use crate::store::SqliteStore;
use crate::transaction::Transaction;
use crate::utxo::UtxoIndex;
use crate::wallet::Wallets;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Creates the chain and pays the genesis reward to an address
    Createchain {
        /// Address that receives the genesis coinbase
        #[arg(long)]
        address: String,
    },
    /// Prints every block from the tip back to genesis
    Printchain,
    /// Shows the spendable balance of an address
    Getbalance {
        #[arg(long)]
        address: String,
    },
    /// Transfers value between two addresses and mines the enclosing block
    Send {
        /// Sender address; its key must be in the wallet file
        #[arg(long)]
        from: String,
        /// Recipient address
        #[arg(long)]
        to: String,
        /// Amount to transfer
        #[arg(long)]
        amount: i64,
    },
    /// Generates a new keypair and stores it in the wallet file
    Createwallet,
    /// Lists the addresses stored in the wallet file
    Listaddresses,
    /// Rebuilds the unspent-output index from the chain
    Reindexutxo,
}

/// Parses arguments, loads configuration and dispatches one command.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config()?;

    match &cli.command {
        Commands::Createchain { address } => create_chain(&config, address),
        Commands::Printchain => print_chain(&config),
        Commands::Getbalance { address } => get_balance(&config, address),
        Commands::Send { from, to, amount } => send(&config, from, to, *amount),
        Commands::Createwallet => create_wallet(&config),
        Commands::Listaddresses => list_addresses(&config),
        Commands::Reindexutxo => reindex_utxo(&config),
    }
}

fn open_ledger(config: &Config) -> Result<Ledger> {
    let store = Arc::new(SqliteStore::open(&config.database.path)?);
    Ledger::open(store, config.pow.difficulty_bits)
}

fn create_chain(config: &Config, address: &str) -> Result<()> {
    validate_address(address)?;
    let mut ledger = open_ledger(config)?;
    if ledger.genesis(address)? {
        UtxoIndex::new(&ledger).reindex()?;
        println!("Chain created. Genesis reward sent to {}", address);
    } else {
        println!("Chain already exists, nothing to do");
    }
    Ok(())
}

fn print_chain(config: &Config) -> Result<()> {
    let ledger = open_ledger(config)?;
    for block in ledger.iter() {
        let block = block?;
        println!("============ Block {} ============", hex::encode(&block.hash));
        if block.is_genesis() {
            println!("Prev  : (genesis)");
        } else {
            println!("Prev  : {}", hex::encode(&block.prev_hash));
        }
        println!("Time  : {}", format_timestamp(block.timestamp));
        println!("Nonce : {}", block.nonce);
        println!(
            "PoW   : {}",
            if ledger.proof_of_work().validate(&block) {
                "valid"
            } else {
                "INVALID"
            }
        );
        for tx in &block.transactions {
            let kind = if tx.is_coinbase() { " (coinbase)" } else { "" };
            println!("  tx {}{}", hex::encode(&tx.id), kind);
        }
        println!();
    }
    Ok(())
}

fn get_balance(config: &Config, address: &str) -> Result<()> {
    let pub_key_hash = decode_address(address)?;
    let ledger = open_ledger(config)?;
    let balance = UtxoIndex::new(&ledger).balance_of(&pub_key_hash)?;
    println!("Balance of {}: {}", address, balance);
    Ok(())
}

fn send(config: &Config, from: &str, to: &str, amount: i64) -> Result<()> {
    validate_address(from)?;
    validate_address(to)?;

    let wallets = Wallets::load(&config.wallet.path)?;
    let sender = wallets.get(from)?;

    let mut ledger = open_ledger(config)?;
    let tx = {
        let utxo = UtxoIndex::new(&ledger);
        Transaction::new_transfer(&sender, to, amount, &utxo)?
    };
    let block = ledger.mine_block(vec![tx])?;
    UtxoIndex::new(&ledger).update(&block)?;

    println!(
        "Sent {} from {} to {} in block {}",
        amount,
        from,
        to,
        hex::encode(&block.hash)
    );
    Ok(())
}

fn create_wallet(config: &Config) -> Result<()> {
    let wallets = Wallets::load(&config.wallet.path)?;
    let address = wallets.create()?;
    wallets.save()?;
    println!("New address: {}", address);
    Ok(())
}

fn list_addresses(config: &Config) -> Result<()> {
    let wallets = Wallets::load(&config.wallet.path)?;
    let addresses = wallets.addresses();
    if addresses.is_empty() {
        println!("No addresses yet. Run 'createwallet' first.");
    }
    for address in addresses {
        println!("{}", address);
    }
    Ok(())
}

fn reindex_utxo(config: &Config) -> Result<()> {
    let ledger = open_ledger(config)?;
    UtxoIndex::new(&ledger).reindex()?;
    let entries = ledger.store().scan_outputs()?.len();
    println!("Done. {} transactions in the unspent-output index", entries);
    Ok(())
}

fn format_timestamp(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}
