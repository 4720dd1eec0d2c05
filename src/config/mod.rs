//! Configuration for the tip jar wallet session
//!
//! Loaded from an optional JSON file, then overridden by environment
//! variables (a `.env` file is honoured by the CLI).

pub mod network;

use crate::{Error, Result};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use network::{NativeCurrency, NetworkConfig};

/// Environment variable names
pub mod env_vars {
    /// JSON-RPC endpoint acting as the wallet provider
    pub const RPC_URL: &str = "TIPJAR_RPC_URL";
    /// Target chain ID (decimal or 0x-hex) for network switching
    pub const CHAIN_ID: &str = "TIPJAR_CHAIN_ID";
    /// Tip jar contract address
    pub const CONTRACT_ADDRESS: &str = "TIPJAR_CONTRACT_ADDRESS";
    /// Path to the tip jar contract's JSON ABI
    pub const CONTRACT_ABI: &str = "TIPJAR_CONTRACT_ABI";
    /// Identity-linking backend endpoint
    pub const IDENTITY_URL: &str = "TIPJAR_IDENTITY_URL";
}

/// Where and how to reach the wallet provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// JSON-RPC endpoint; `None` means no provider is available
    pub rpc_url: Option<String>,
    /// Interval for polling account/chain changes (milliseconds)
    pub watch_interval_ms: u64,
    /// Per-request timeout (milliseconds). Account requests wait on the user,
    /// so keep this generous.
    pub request_timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            watch_interval_ms: 2_000,
            request_timeout_ms: 300_000, // 5 minutes for wallet prompts
        }
    }
}

/// The tip jar contract. Address and ABI are deployment specific and have no defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    pub address: Option<Address>,
    /// Path to a JSON ABI (either a bare array or a `{"abi": [...]}` artifact)
    pub abi_path: Option<PathBuf>,
    #[serde(default = "default_deposit_method")]
    pub deposit_method: String,
    #[serde(default = "default_withdraw_method")]
    pub withdraw_method: String,
}

fn default_deposit_method() -> String {
    "deposit".to_string()
}

fn default_withdraw_method() -> String {
    "withdraw".to_string()
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            address: None,
            abi_path: None,
            deposit_method: default_deposit_method(),
            withdraw_method: default_withdraw_method(),
        }
    }
}

/// Identity-linking backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub endpoint: Option<String>,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Network the session asks the wallet to switch to
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub contract: ContractConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Receipt polling interval for submitted transactions (milliseconds)
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
}

fn default_receipt_poll_interval_ms() -> u64 {
    4_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            network: NetworkConfig::default(),
            contract: ContractConfig::default(),
            identity: IdentityConfig::default(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
        }
    }
}

impl Config {
    /// Load from a JSON file (or defaults), then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Apply TIPJAR_* environment variables on top of the current values
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(env_vars::RPC_URL) {
            tracing::debug!("Using {} for the wallet provider", env_vars::RPC_URL);
            self.provider.rpc_url = Some(url);
        }

        if let Ok(raw) = std::env::var(env_vars::CHAIN_ID) {
            self.network = NetworkConfig::from_name_or_id(&raw).ok_or_else(|| {
                Error::Config(format!("{} names an unknown network: {}", env_vars::CHAIN_ID, raw))
            })?;
        }

        if let Ok(raw) = std::env::var(env_vars::CONTRACT_ADDRESS) {
            let address = Address::from_str(raw.trim()).map_err(|e| {
                Error::Config(format!("{} is not an address: {}", env_vars::CONTRACT_ADDRESS, e))
            })?;
            self.contract.address = Some(address);
        }

        if let Ok(path) = std::env::var(env_vars::CONTRACT_ABI) {
            self.contract.abi_path = Some(PathBuf::from(path));
        }

        if let Ok(url) = std::env::var(env_vars::IDENTITY_URL) {
            self.identity.endpoint = Some(url);
        }

        Ok(())
    }
}
