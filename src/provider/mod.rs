//! Wallet provider abstraction
//!
//! A provider is the externally supplied wallet object: a request/response
//! RPC surface (`request`) plus an event surface (`subscribe` /
//! `unsubscribe`) for `accountsChanged` and `chainChanged` notifications.
//! The session never assumes anything about where the provider lives.

mod http;
mod listeners;
#[cfg(test)]
pub(crate) mod mock;

pub use http::{detect_provider, HttpProvider};
pub use listeners::Listeners;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// RPC method names consumed from the wallet provider
pub mod methods {
    pub const REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
    pub const ACCOUNTS: &str = "eth_accounts";
    pub const GET_BALANCE: &str = "eth_getBalance";
    pub const CHAIN_ID: &str = "eth_chainId";
    pub const SWITCH_CHAIN: &str = "wallet_switchEthereumChain";
    pub const ADD_CHAIN: &str = "wallet_addEthereumChain";
    pub const SEND_TRANSACTION: &str = "eth_sendTransaction";
    pub const GET_TRANSACTION_RECEIPT: &str = "eth_getTransactionReceipt";
}

/// EIP-1193 / JSON-RPC error codes the session reacts to
pub mod codes {
    /// The user rejected the request
    pub const USER_REJECTED: i64 = 4001;
    /// The requested method/account has not been authorized
    pub const UNAUTHORIZED: i64 = 4100;
    /// The provider does not support the method
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    /// The provider is disconnected from all chains
    pub const DISCONNECTED: i64 = 4900;
    /// The provider is not connected to the requested chain
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    /// The chain has not been added to the wallet
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    /// A request of the same kind is already pending
    pub const RESOURCE_UNAVAILABLE: i64 = -32002;
    /// Method not found
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Internal / transport failure
    pub const INTERNAL: i64 = -32603;
}

/// A failed provider request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Transport or decoding failure on our side of the provider boundary
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL, message)
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == codes::USER_REJECTED
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == codes::UNRECOGNIZED_CHAIN
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for ProviderError {}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Provider event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AccountsChanged,
    ChainChanged,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::AccountsChanged => "accountsChanged",
            EventKind::ChainChanged => "chainChanged",
        }
    }
}

/// A notification pushed by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(String),
}

impl ProviderEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ProviderEvent::AccountsChanged(_) => EventKind::AccountsChanged,
            ProviderEvent::ChainChanged(_) => EventKind::ChainChanged,
        }
    }
}

/// Callback registered for provider events
pub type EventHandler = Arc<dyn Fn(ProviderEvent) + Send + Sync>;

/// Token returned by `subscribe`, required to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub(crate) id: u64,
    pub(crate) kind: EventKind,
}

impl SubscriptionHandle {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

/// The wallet provider surface
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Issue an RPC request; may suspend indefinitely while the user decides
    async fn request(&self, method: &str, params: Value) -> ProviderResult<Value>;

    /// Register a handler for one event kind
    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionHandle;

    /// Remove a previously registered handler. Returns false if it was already gone.
    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool;
}

#[async_trait]
impl<P: WalletProvider + ?Sized> WalletProvider for Arc<P> {
    async fn request(&self, method: &str, params: Value) -> ProviderResult<Value> {
        (**self).request(method, params).await
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionHandle {
        (**self).subscribe(kind, handler)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        (**self).unsubscribe(handle)
    }
}
