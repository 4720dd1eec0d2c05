//! Tip Jar Wallet
//!
//! Wallet session for the tip jar client:
//! - Detect a wallet provider and track its accounts, balance and chain
//! - Switch (or add, then switch) to the tip jar's network
//! - Submit deposit/withdraw calls and track their confirmation
//! - Link a Discord identity to the connected address
//!
//! # Provider Model
//!
//! - The wallet is reached through the [`provider::WalletProvider`] trait
//! - Keys stay inside the wallet; this crate only ever asks it to sign
//! - Contract address and ABI are external configuration, never constants

pub mod config;
pub mod contract;
pub mod identity;
pub mod provider;
pub mod session;
pub mod transaction;
pub mod units;

mod error;

// Re-export commonly used types
pub use config::{Config, NetworkConfig};
pub use contract::ContractInterface;
pub use error::{Error, Result};
pub use identity::IdentityClient;
pub use provider::{detect_provider, HttpProvider, WalletProvider};
pub use session::{ErrorState, NetworkOutcome, SessionStatus, WalletSession, WalletState};
pub use transaction::{TransactionHandle, TxStatus};
