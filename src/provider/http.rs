//! JSON-RPC over HTTP wallet provider
//!
//! Speaks the same method set as an injected browser wallet, which makes it
//! usable against a dev node with unlocked accounts (anvil, hardhat) or a
//! signing proxy. HTTP has no push channel, so account and chain changes are
//! synthesized by an optional polling watcher.

use super::{
    methods, EventHandler, EventKind, Listeners, ProviderError, ProviderEvent, ProviderResult,
    SubscriptionHandle, WalletProvider,
};
use crate::config::ProviderConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ProviderError>,
}

/// Last observed account/chain values, used by the watcher to detect changes
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct WatchSnapshot {
    accounts: Option<Vec<String>>,
    chain_id: Option<String>,
}

/// Wallet provider backed by a JSON-RPC HTTP endpoint
pub struct HttpProvider {
    client: reqwest::Client,
    url: url::Url,
    next_id: AtomicU64,
    listeners: Listeners,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl HttpProvider {
    /// Create a provider for an endpoint
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| Error::Config(format!("Invalid RPC URL '{}': {}", rpc_url, e)))?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url,
            next_id: AtomicU64::new(1),
            listeners: Listeners::new(),
            watcher: Mutex::new(None),
        })
    }

    /// Create a provider from config. `Ok(None)` if no endpoint is configured.
    pub fn from_config(config: &ProviderConfig) -> Result<Option<Self>> {
        config
            .rpc_url
            .as_deref()
            .map(|url| Self::new(url, Duration::from_millis(config.request_timeout_ms)))
            .transpose()
    }

    pub fn url(&self) -> &url::Url {
        &self.url
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Start polling `eth_accounts` / `eth_chainId` and emitting change events.
    ///
    /// The task holds only a weak reference and stops once the provider is
    /// dropped. Calling this again replaces the previous watcher.
    pub fn spawn_watcher(self: &Arc<Self>, interval: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut snapshot = WatchSnapshot::default();
            loop {
                ticker.tick().await;
                let Some(provider) = weak.upgrade() else {
                    break;
                };
                provider.poll_once(&mut snapshot).await;
            }
            tracing::debug!("Provider watcher stopped");
        });

        let mut slot = self.watcher.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
        tracing::info!(url = %self.url, interval_ms = interval.as_millis() as u64, "Started provider watcher");
    }

    /// One watcher iteration. The first observation only seeds the snapshot.
    pub(crate) async fn poll_once(&self, snapshot: &mut WatchSnapshot) {
        match self.request(methods::ACCOUNTS, json!([])).await {
            Ok(value) => match serde_json::from_value::<Vec<String>>(value) {
                Ok(accounts) => {
                    let changed = snapshot
                        .accounts
                        .as_ref()
                        .is_some_and(|previous| *previous != accounts);
                    snapshot.accounts = Some(accounts.clone());
                    if changed {
                        self.listeners.emit(ProviderEvent::AccountsChanged(accounts));
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Malformed eth_accounts response"),
            },
            Err(e) => tracing::debug!(error = %e, "Watcher failed to poll accounts"),
        }

        match self.request(methods::CHAIN_ID, json!([])).await {
            Ok(Value::String(chain_id)) => {
                let changed = snapshot
                    .chain_id
                    .as_ref()
                    .is_some_and(|previous| *previous != chain_id);
                snapshot.chain_id = Some(chain_id.clone());
                if changed {
                    self.listeners.emit(ProviderEvent::ChainChanged(chain_id));
                }
            }
            Ok(other) => tracing::warn!(response = %other, "Malformed eth_chainId response"),
            Err(e) => tracing::debug!(error = %e, "Watcher failed to poll chain"),
        }
    }
}

#[async_trait]
impl WalletProvider for HttpProvider {
    async fn request(&self, method: &str, params: Value) -> ProviderResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let params = if params.is_null() { json!([]) } else { params };
        let body = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        tracing::trace!(id, method, "Sending provider request");

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::internal(format!("Request to {} failed: {}", method, e)))?;

        let status = response.status();
        let payload: RpcResponse = response.json().await.map_err(|e| {
            ProviderError::internal(format!("Invalid response to {} (HTTP {}): {}", method, status, e))
        })?;

        if let Some(error) = payload.error {
            tracing::debug!(id, method, code = error.code, message = %error.message, "Provider returned error");
            return Err(error);
        }

        Ok(payload.result.unwrap_or(Value::Null))
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionHandle {
        self.listeners.subscribe(kind, handler)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.listeners.unsubscribe(handle)
    }
}

impl Drop for HttpProvider {
    fn drop(&mut self) {
        let slot = self.watcher.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("url", &self.url.as_str())
            .field("listeners", &self.listeners)
            .finish()
    }
}

/// Probe for a wallet provider.
///
/// Absence is a normal state: a missing endpoint, an unparsable URL or a
/// failed `eth_chainId` probe all yield `None` without registering anything.
pub async fn detect_provider(config: &ProviderConfig) -> Option<Arc<HttpProvider>> {
    let provider = match HttpProvider::from_config(config) {
        Ok(Some(provider)) => provider,
        Ok(None) => {
            tracing::debug!("No wallet provider configured");
            return None;
        }
        Err(e) => {
            tracing::debug!(error = %e, "Wallet provider configuration unusable");
            return None;
        }
    };

    match provider.request(methods::CHAIN_ID, json!([])).await {
        Ok(chain_id) => {
            tracing::info!(url = %provider.url, chain_id = %chain_id, "Detected wallet provider");
            Some(Arc::new(provider))
        }
        Err(e) => {
            tracing::debug!(url = %provider.url, error = %e, "Wallet provider did not answer probe");
            None
        }
    }
}
