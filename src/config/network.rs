//! Network presets for `wallet_switchEthereumChain` / `wallet_addEthereumChain`
//!
//! The RPC URL advertised for a preset follows the usual Ethereum conventions:
//! 1. Per-chain env vars (ETH_RPC_URL, ARBITRUM_RPC_URL, etc.) - highest priority
//! 2. Public RPC fallbacks
//!
//! The URL ends up in the add-network request, so it must be reachable from
//! the user's wallet, not only from this process.

use crate::units::{chain_id_hex, ETHER_DECIMALS};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Chain ID constants
pub mod chains {
    pub const ETHEREUM: u64 = 1;
    pub const ARBITRUM: u64 = 42161;
    pub const OPTIMISM: u64 = 10;
    pub const BASE: u64 = 8453;
    pub const POLYGON: u64 = 137;
    pub const SEPOLIA: u64 = 11155111;
}

/// Environment variable names
mod env_vars {
    pub const ETH_RPC_URL: &str = "ETH_RPC_URL";
    pub const ARBITRUM_RPC_URL: &str = "ARBITRUM_RPC_URL";
    pub const OPTIMISM_RPC_URL: &str = "OPTIMISM_RPC_URL";
    pub const BASE_RPC_URL: &str = "BASE_RPC_URL";
    pub const POLYGON_RPC_URL: &str = "POLYGON_RPC_URL";
    pub const SEPOLIA_RPC_URL: &str = "SEPOLIA_RPC_URL";
}

/// Public RPC endpoints (rate limited)
mod public_rpcs {
    pub const ETHEREUM: &str = "https://eth.llamarpc.com";
    pub const ARBITRUM: &str = "https://arb1.arbitrum.io/rpc";
    pub const OPTIMISM: &str = "https://mainnet.optimism.io";
    pub const BASE: &str = "https://mainnet.base.org";
    pub const POLYGON: &str = "https://polygon-rpc.com";
    pub const SEPOLIA: &str = "https://rpc.sepolia.org";
}

/// Native currency metadata shown by the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl NativeCurrency {
    pub fn ether() -> Self {
        Self {
            name: "Ether".to_string(),
            symbol: "ETH".to_string(),
            decimals: ETHER_DECIMALS,
        }
    }
}

/// Everything a wallet needs to add (and then switch to) a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub block_explorer_urls: Vec<String>,
}

impl NetworkConfig {
    /// Look up a known network by chain ID
    pub fn preset(chain_id: u64) -> Option<Self> {
        let (name, currency, env_var, public_rpc, explorer) = match chain_id {
            chains::ETHEREUM => (
                "Ethereum Mainnet",
                NativeCurrency::ether(),
                env_vars::ETH_RPC_URL,
                public_rpcs::ETHEREUM,
                "https://etherscan.io",
            ),
            chains::ARBITRUM => (
                "Arbitrum One",
                NativeCurrency::ether(),
                env_vars::ARBITRUM_RPC_URL,
                public_rpcs::ARBITRUM,
                "https://arbiscan.io",
            ),
            chains::OPTIMISM => (
                "OP Mainnet",
                NativeCurrency::ether(),
                env_vars::OPTIMISM_RPC_URL,
                public_rpcs::OPTIMISM,
                "https://optimistic.etherscan.io",
            ),
            chains::BASE => (
                "Base",
                NativeCurrency::ether(),
                env_vars::BASE_RPC_URL,
                public_rpcs::BASE,
                "https://basescan.org",
            ),
            chains::POLYGON => (
                "Polygon Mainnet",
                NativeCurrency {
                    name: "POL".to_string(),
                    symbol: "POL".to_string(),
                    decimals: 18,
                },
                env_vars::POLYGON_RPC_URL,
                public_rpcs::POLYGON,
                "https://polygonscan.com",
            ),
            chains::SEPOLIA => (
                "Sepolia",
                NativeCurrency {
                    name: "Sepolia Ether".to_string(),
                    symbol: "ETH".to_string(),
                    decimals: 18,
                },
                env_vars::SEPOLIA_RPC_URL,
                public_rpcs::SEPOLIA,
                "https://sepolia.etherscan.io",
            ),
            _ => return None,
        };

        let rpc_url = match std::env::var(env_var) {
            Ok(url) => {
                tracing::debug!(chain_id, env_var, "Using RPC URL from environment");
                url
            }
            Err(_) => public_rpc.to_string(),
        };

        Some(Self {
            chain_id,
            chain_name: name.to_string(),
            native_currency: currency,
            rpc_urls: vec![rpc_url],
            block_explorer_urls: vec![explorer.to_string()],
        })
    }

    /// Resolve a network by name ("base") or numeric chain ID ("8453", "0x2105")
    pub fn from_name_or_id(value: &str) -> Option<Self> {
        let chain_id = match value.to_lowercase().as_str() {
            "ethereum" | "mainnet" => chains::ETHEREUM,
            "arbitrum" => chains::ARBITRUM,
            "optimism" => chains::OPTIMISM,
            "base" => chains::BASE,
            "polygon" => chains::POLYGON,
            "sepolia" => chains::SEPOLIA,
            other => crate::units::parse_chain_id(other).ok()?,
        };
        Self::preset(chain_id)
    }

    /// Chain ID in the `0x`-hex form wallets report and expect
    pub fn chain_id_hex(&self) -> String {
        chain_id_hex(self.chain_id)
    }

    /// Parameter object for `wallet_addEthereumChain`
    pub fn add_chain_params(&self) -> Value {
        let mut params = json!({
            "chainId": self.chain_id_hex(),
            "chainName": self.chain_name,
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
            "rpcUrls": self.rpc_urls,
        });
        if !self.block_explorer_urls.is_empty() {
            params["blockExplorerUrls"] = json!(self.block_explorer_urls);
        }
        params
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: chains::ETHEREUM,
            chain_name: "Ethereum Mainnet".to_string(),
            native_currency: NativeCurrency::ether(),
            rpc_urls: vec![public_rpcs::ETHEREUM.to_string()],
            block_explorer_urls: vec!["https://etherscan.io".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_cover_known_chains() {
        for chain in [
            chains::ETHEREUM,
            chains::ARBITRUM,
            chains::OPTIMISM,
            chains::BASE,
            chains::POLYGON,
            chains::SEPOLIA,
        ] {
            let network = NetworkConfig::preset(chain).unwrap();
            assert_eq!(network.chain_id, chain);
            assert_eq!(network.rpc_urls.len(), 1);
        }
        assert!(NetworkConfig::preset(999_999).is_none());
    }

    #[test]
    fn test_from_name_or_id() {
        assert_eq!(NetworkConfig::from_name_or_id("Base").unwrap().chain_id, chains::BASE);
        assert_eq!(NetworkConfig::from_name_or_id("0xa4b1").unwrap().chain_id, chains::ARBITRUM);
        assert_eq!(NetworkConfig::from_name_or_id("10").unwrap().chain_id, chains::OPTIMISM);
        assert!(NetworkConfig::from_name_or_id("atlantis").is_none());
    }

    #[test]
    fn test_add_chain_params_shape() {
        let network = NetworkConfig {
            chain_id: 8453,
            chain_name: "Base".to_string(),
            native_currency: NativeCurrency::ether(),
            rpc_urls: vec!["https://mainnet.base.org".to_string()],
            block_explorer_urls: vec!["https://basescan.org".to_string()],
        };

        let params = network.add_chain_params();
        assert_eq!(params["chainId"], "0x2105");
        assert_eq!(params["chainName"], "Base");
        assert_eq!(params["nativeCurrency"]["symbol"], "ETH");
        assert_eq!(params["nativeCurrency"]["decimals"], 18);
        assert_eq!(params["rpcUrls"][0], "https://mainnet.base.org");
        assert_eq!(params["blockExplorerUrls"][0], "https://basescan.org");
    }

    #[test]
    fn test_add_chain_params_omits_empty_explorers() {
        let network = NetworkConfig {
            block_explorer_urls: vec![],
            ..NetworkConfig::default()
        };
        assert!(network.add_chain_params().get("blockExplorerUrls").is_none());
    }
}
