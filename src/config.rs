//! Configuration management for ForgeChain

use crate::error::{ChainError, Result};
use crate::pow::DEFAULT_DIFFICULTY_BITS;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "forgechain.toml";

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub pow: PowConfig,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_wallet_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PowConfig {
    #[serde(default = "default_difficulty_bits")]
    pub difficulty_bits: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            path: default_wallet_path(),
        }
    }
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            difficulty_bits: default_difficulty_bits(),
        }
    }
}

fn default_db_path() -> String {
    "forgechain.db".to_string()
}

fn default_wallet_path() -> String {
    "wallet.json".to_string()
}

fn default_difficulty_bits() -> u32 {
    DEFAULT_DIFFICULTY_BITS
}

/// Loads configuration from `forgechain.toml` in the working directory.
pub fn load_config() -> Result<Config> {
    load_config_from(CONFIG_FILE)
}

/// Loads configuration from `path`, falling back to defaults when the file
/// is absent.
pub fn load_config_from<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config_str = fs::read_to_string(path.as_ref()).unwrap_or_default();
    let config: Config = if config_str.is_empty() {
        Config {
            database: DatabaseConfig::default(),
            wallet: WalletConfig::default(),
            pow: PowConfig::default(),
        }
    } else {
        toml::from_str(&config_str)
            .map_err(|e| ChainError::Config(format!("Failed to parse config: {}", e)))?
    };

    // Validate critical values
    if config.database.path.is_empty() {
        return Err(ChainError::Config(
            "database.path must be set in forgechain.toml".to_string(),
        ));
    }

    if config.wallet.path.is_empty() {
        return Err(ChainError::Config(
            "wallet.path must be set in forgechain.toml".to_string(),
        ));
    }

    if config.pow.difficulty_bits == 0 || config.pow.difficulty_bits > 255 {
        return Err(ChainError::Config(
            "pow.difficulty_bits must be between 1 and 255".to_string(),
        ));
    }

    Ok(config)
}
