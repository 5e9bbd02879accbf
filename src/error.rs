//! Error types for forgechain

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Chain is not initialized; create it first")]
    NotInitialized,

    #[error("Insufficient funds: requested {requested}, spendable {available}")]
    InsufficientFunds { requested: i64, available: i64 },

    #[error("Referenced transaction {0} is not in the chain")]
    MissingPriorTransaction(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Nonce space exhausted without meeting the difficulty target")]
    MiningExhausted,

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::Storage(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
