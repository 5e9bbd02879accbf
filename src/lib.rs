//! ForgeChain - a single-node proof-of-work ledger with a UTXO index
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`block`] - Block structure and versioned encoding
//! - [`ledger`] - Hash-linked chain over a storage backend
//! - [`store`] - Key-value persistence (SQLite and in-memory)
//!
//! ## Consensus
//! - [`pow`] - Proof-of-work mining and validation
//! - [`merkle`] - Transaction commitment tree
//!
//! ## Transactions & State
//! - [`transaction`] - Inputs, outputs and ECDSA authorization
//! - [`utxo`] - Derived unspent-output index
//!
//! ## Cryptography & Keys
//! - [`crypto`] - secp256k1 keypairs and Base58Check addresses
//! - [`wallet`] - Keypair collection persisted as JSON
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`cli`] - Command-line surface

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod block;
pub mod ledger;
pub mod store;

// ============================================================================
// Consensus
// ============================================================================
pub mod merkle;
pub mod pow;

// ============================================================================
// Transactions & State
// ============================================================================
pub mod transaction;
pub mod utxo;

// ============================================================================
// Cryptography & Keys
// ============================================================================
pub mod crypto;
pub mod wallet;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod cli;
pub mod config;
pub mod error;
