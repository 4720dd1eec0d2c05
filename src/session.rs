//! Wallet session
//!
//! Owns the connection to one wallet provider for its whole lifetime:
//! account/chain state, the user-visible error slot, provider event
//! subscriptions, network switching and contract calls.
//!
//! # Ordering
//!
//! Every operation takes `&mut self`, so requests and event application are
//! serialized by ownership. Provider callbacks only enqueue events; they are
//! applied in arrival order by [`WalletSession::next_event`] or
//! [`WalletSession::drain_events`]. A refresh can therefore never land on top
//! of state produced by a newer event.

use crate::config::{Config, ContractConfig, NetworkConfig};
use crate::contract::ContractInterface;
use crate::identity::{IdentityClient, IdentityResponse};
use crate::provider::{
    detect_provider, methods, EventKind, HttpProvider, ProviderError, ProviderEvent,
    SubscriptionHandle, WalletProvider,
};
use crate::transaction::{self, TransactionHandle, TransactionRequest, TxStatus};
use crate::units::{format_units, parse_chain_id, parse_quantity, ETHER_DECIMALS};
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use serde::Serialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Account, balance and chain as last reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalletState {
    /// Connected accounts in provider order; empty means disconnected
    pub accounts: Vec<String>,
    /// Balance of the first account in whole-currency units
    pub balance: Option<String>,
    pub chain_id: String,
}

impl WalletState {
    /// The canonical `{accounts: [], chainId: ""}` state
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        !self.accounts.is_empty()
    }

    pub fn primary_account(&self) -> Option<&str> {
        self.accounts.first().map(String::as_str)
    }
}

/// User-visible error slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorState {
    pub present: bool,
    pub message: String,
}

impl ErrorState {
    fn set(&mut self, message: String) {
        self.present = true;
        self.message = message;
    }

    fn clear(&mut self) {
        self.present = false;
        self.message.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Result of asking the wallet to move to a network. Failures are reported, never fatal.
#[derive(Debug)]
pub enum NetworkOutcome {
    /// The session already reports the target chain
    AlreadyActive,
    Switched,
    /// The wallet did not know the chain; it was added and then switched to
    Added,
    /// The chain was added but the follow-up switch failed
    AddedNotSwitched(Error),
    /// The switch failed for a reason other than an unknown chain
    SwitchFailed(Error),
    AddFailed(Error),
}

impl NetworkOutcome {
    pub fn is_on_target(&self) -> bool {
        matches!(
            self,
            NetworkOutcome::AlreadyActive | NetworkOutcome::Switched | NetworkOutcome::Added
        )
    }
}

/// A wallet session bound to one provider
pub struct WalletSession<P: WalletProvider + 'static> {
    provider: Arc<P>,
    state: WalletState,
    error: ErrorState,
    status: SessionStatus,
    currency_decimals: u8,
    contract: Option<ContractInterface>,
    deposit_method: String,
    withdraw_method: String,
    receipt_poll_interval: Duration,
    subscriptions: Vec<SubscriptionHandle>,
    events_tx: mpsc::UnboundedSender<ProviderEvent>,
    events_rx: mpsc::UnboundedReceiver<ProviderEvent>,
}

impl WalletSession<HttpProvider> {
    /// Detect the configured provider and build a session for it.
    ///
    /// `Ok(None)` when no provider answers; nothing is subscribed until `start`.
    pub async fn detect(config: &Config) -> Result<Option<Self>> {
        match detect_provider(&config.provider).await {
            Some(provider) => Ok(Some(Self::from_config(provider, config)?)),
            None => Ok(None),
        }
    }
}

impl<P: WalletProvider + 'static> WalletSession<P> {
    pub fn new(provider: Arc<P>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let contract_defaults = ContractConfig::default();
        Self {
            provider,
            state: WalletState::disconnected(),
            error: ErrorState::default(),
            status: SessionStatus::Disconnected,
            currency_decimals: ETHER_DECIMALS,
            contract: None,
            deposit_method: contract_defaults.deposit_method,
            withdraw_method: contract_defaults.withdraw_method,
            receipt_poll_interval: Duration::from_secs(4),
            subscriptions: Vec::new(),
            events_tx,
            events_rx,
        }
    }

    /// Build a session from config. The contract is loaded only when an ABI
    /// path is configured.
    pub fn from_config(provider: Arc<P>, config: &Config) -> Result<Self> {
        let mut session = Self::new(provider)
            .with_currency_decimals(config.network.native_currency.decimals)
            .with_receipt_poll_interval(Duration::from_millis(config.receipt_poll_interval_ms));

        session.deposit_method = config.contract.deposit_method.clone();
        session.withdraw_method = config.contract.withdraw_method.clone();

        if config.contract.abi_path.is_some() {
            session.contract = Some(ContractInterface::from_config(&config.contract)?);
        }
        Ok(session)
    }

    pub fn with_currency_decimals(mut self, decimals: u8) -> Self {
        self.currency_decimals = decimals;
        self
    }

    pub fn with_contract(mut self, contract: ContractInterface) -> Self {
        self.contract = Some(contract);
        self
    }

    pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn state(&self) -> &WalletState {
        &self.state
    }

    pub fn error(&self) -> &ErrorState {
        &self.error
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn is_observing(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Record a failure in the error slot and hand it back
    fn capture(&mut self, err: Error) -> Error {
        if err.is_expected() {
            tracing::info!(error = %err, "Wallet request declined");
        } else {
            tracing::warn!(error = %err, "Wallet operation failed");
        }
        self.error.set(err.display_message());
        err
    }

    fn settle_status(&mut self) {
        self.status = if self.state.is_connected() {
            SessionStatus::Connected
        } else {
            SessionStatus::Disconnected
        };
    }

    async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        let result = self.provider.request(method, params).await;
        result.map_err(|e| self.capture(Error::UnexpectedProvider(e)))
    }

    /// Subscribe to provider events and load whatever accounts are already authorized.
    ///
    /// Safe to call again: listeners are registered only once per session.
    pub async fn start(&mut self) -> Result<WalletState> {
        self.error.clear();
        if self.subscriptions.is_empty() {
            for kind in [EventKind::AccountsChanged, EventKind::ChainChanged] {
                let tx = self.events_tx.clone();
                let handle = self.provider.subscribe(
                    kind,
                    Arc::new(move |event| {
                        // Only fails once the session is gone
                        let _ = tx.send(event);
                    }),
                );
                self.subscriptions.push(handle);
            }
            tracing::debug!("Session observing provider events");
        }

        let accounts = self.call(methods::ACCOUNTS, json!([])).await?;
        let accounts = self.parse_accounts(accounts)?;
        self.refresh_wallet_state(accounts).await
    }

    /// Release provider listeners and drop queued events
    pub fn teardown(&mut self) {
        let count = self.subscriptions.len();
        for handle in self.subscriptions.drain(..) {
            self.provider.unsubscribe(handle);
        }
        while self.events_rx.try_recv().is_ok() {}
        if count > 0 {
            tracing::debug!(listeners = count, "Session stopped observing provider");
        }
    }

    fn parse_accounts(&mut self, value: Value) -> Result<Vec<String>> {
        serde_json::from_value::<Vec<String>>(value).map_err(|e| {
            self.capture(Error::UnexpectedProvider(ProviderError::internal(format!(
                "Malformed account list: {}",
                e
            ))))
        })
    }

    /// Ask the wallet for account access. May wait indefinitely on the user.
    ///
    /// Resolving with no accounts is a decline and yields an empty list.
    /// Rejections are recorded in the error slot.
    pub async fn request_accounts(&mut self) -> Result<Vec<String>> {
        let result = self
            .provider
            .request(methods::REQUEST_ACCOUNTS, json!([]))
            .await;

        match result {
            Ok(value) => {
                let accounts = self.parse_accounts(value)?;
                if accounts.is_empty() {
                    tracing::info!("Wallet returned no accounts");
                }
                Ok(accounts)
            }
            Err(e) if e.is_user_rejection() => Err(self.capture(Error::UserDeclined(e.message))),
            Err(e) => Err(self.capture(Error::UnexpectedProvider(e))),
        }
    }

    /// The explicit connect action
    pub async fn connect(&mut self) -> Result<WalletState> {
        self.error.clear();
        self.status = SessionStatus::Connecting;
        tracing::info!("Connecting wallet");

        let accounts = match self.request_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                self.settle_status();
                return Err(e);
            }
        };

        let result = self.refresh_wallet_state(accounts).await;
        self.settle_status();
        result
    }

    /// Rebuild wallet state for `accounts`.
    ///
    /// An empty list resets to the disconnected state without touching the provider.
    pub async fn refresh_wallet_state(&mut self, accounts: Vec<String>) -> Result<WalletState> {
        if accounts.is_empty() {
            if self.state.is_connected() {
                tracing::info!("Wallet disconnected");
            }
            self.state = WalletState::disconnected();
            self.settle_status();
            return Ok(self.state.clone());
        }

        let raw_balance = self
            .call(methods::GET_BALANCE, json!([accounts[0], "latest"]))
            .await?;
        let balance = match raw_balance.as_str().map(parse_quantity) {
            Some(Ok(wei)) => format_units(wei, self.currency_decimals),
            Some(Err(e)) => return Err(self.capture(e)),
            None => {
                return Err(self.capture(Error::UnexpectedProvider(ProviderError::internal(
                    format!("Malformed balance: {}", raw_balance),
                ))))
            }
        };

        let chain_id = match self.call(methods::CHAIN_ID, json!([])).await? {
            Value::String(chain_id) => chain_id,
            other => other.to_string(),
        };

        self.state = WalletState {
            accounts,
            balance: Some(balance),
            chain_id,
        };
        self.settle_status();

        tracing::info!(
            account = self.state.primary_account().unwrap_or_default(),
            accounts = self.state.accounts.len(),
            balance = self.state.balance.as_deref().unwrap_or_default(),
            chain_id = %self.state.chain_id,
            "Wallet state refreshed"
        );
        Ok(self.state.clone())
    }

    /// `accountsChanged` handler
    pub async fn on_accounts_changed(&mut self, accounts: Vec<String>) -> Result<WalletState> {
        tracing::debug!(accounts = accounts.len(), "Accounts changed");
        self.refresh_wallet_state(accounts).await
    }

    /// `chainChanged` handler: patches the chain only
    pub fn on_chain_changed(&mut self, chain_id: String) -> WalletState {
        tracing::info!(chain_id = %chain_id, "Chain changed");
        self.state.chain_id = chain_id;
        self.state.clone()
    }

    async fn apply_event(&mut self, event: ProviderEvent) -> Result<WalletState> {
        self.error.clear();
        match event {
            ProviderEvent::AccountsChanged(accounts) => self.on_accounts_changed(accounts).await,
            ProviderEvent::ChainChanged(chain_id) => Ok(self.on_chain_changed(chain_id)),
        }
    }

    /// Wait for the next provider event and apply it
    pub async fn next_event(&mut self) -> Result<WalletState> {
        match self.events_rx.recv().await {
            Some(event) => self.apply_event(event).await,
            // The session holds a sender, so the channel never closes
            None => Ok(self.state.clone()),
        }
    }

    /// Apply every queued event without waiting. Account changes superseded by
    /// a later one in the same batch are skipped. Returns how many were applied.
    pub async fn drain_events(&mut self) -> Result<usize> {
        let mut batch = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            batch.push(event);
        }

        let newest_accounts = batch
            .iter()
            .rposition(|e| matches!(e, ProviderEvent::AccountsChanged(_)));

        let mut applied = 0;
        let mut first_error = None;
        for (index, event) in batch.into_iter().enumerate() {
            if matches!(event, ProviderEvent::AccountsChanged(_)) && Some(index) != newest_accounts
            {
                tracing::debug!("Skipping superseded account change");
                continue;
            }
            match self.apply_event(event).await {
                Ok(_) => applied += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(applied),
        }
    }

    /// Ask the wallet to switch to `network`, adding it first if the wallet does not know it
    pub async fn ensure_network(&mut self, network: &NetworkConfig) -> NetworkOutcome {
        self.error.clear();
        let target = network.chain_id_hex();

        if parse_chain_id(&self.state.chain_id).ok() == Some(network.chain_id) {
            tracing::debug!(chain_id = %target, "Already on target network");
            return NetworkOutcome::AlreadyActive;
        }

        tracing::info!(chain_id = %target, name = %network.chain_name, "Requesting network switch");
        let switch_params = json!([{ "chainId": target }]);

        match self
            .provider
            .request(methods::SWITCH_CHAIN, switch_params.clone())
            .await
        {
            Ok(_) => {
                self.on_chain_changed(target);
                NetworkOutcome::Switched
            }
            Err(e) if e.is_unrecognized_chain() => {
                tracing::info!(chain_id = %target, "Wallet does not know the network, adding it");
                let added = self
                    .provider
                    .request(methods::ADD_CHAIN, json!([network.add_chain_params()]))
                    .await;
                if let Err(e) = added {
                    return NetworkOutcome::AddFailed(self.capture(Error::NetworkAddFailed(e)));
                }

                match self.provider.request(methods::SWITCH_CHAIN, switch_params).await {
                    Ok(_) => {
                        self.on_chain_changed(target);
                        NetworkOutcome::Added
                    }
                    Err(e) => NetworkOutcome::AddedNotSwitched(
                        self.capture(Error::NetworkSwitchFailed(e)),
                    ),
                }
            }
            Err(e) => NetworkOutcome::SwitchFailed(self.capture(Error::NetworkSwitchFailed(e))),
        }
    }

    fn build_request(
        &self,
        method: &str,
        args: &[String],
        recipient: Option<Address>,
    ) -> Result<TransactionRequest> {
        let from = self.state.primary_account().ok_or(Error::NotConnected)?;
        let from = Address::from_str(from)
            .map_err(|e| Error::InvalidArgument(format!("Account '{}' is not an address: {}", from, e)))?;

        let contract = self
            .contract
            .as_ref()
            .ok_or_else(|| Error::Config("No contract interface configured".to_string()))?;
        let to = recipient
            .or_else(|| contract.address())
            .ok_or_else(|| Error::Config("No contract address configured".to_string()))?;

        let data = contract.encode_call(method, args)?;
        Ok(TransactionRequest::new(from, to, data))
    }

    /// Encode `method(args)` and hand it to the connected signer.
    ///
    /// Returns as soon as the request is built; the handle starts in
    /// `Pending` while the wallet prompt is open. Failures to build the
    /// request are returned directly; the wallet's answer arrives through the
    /// handle (see [`WalletSession::observe_transaction`]).
    pub fn submit_transaction(
        &mut self,
        method: &str,
        args: &[String],
        recipient: Option<Address>,
    ) -> Result<TransactionHandle> {
        self.error.clear();
        let request = match self.build_request(method, args, recipient) {
            Ok(request) => request,
            Err(e) => return Err(self.capture(e)),
        };

        Ok(transaction::submit(
            &self.provider,
            method,
            request,
            self.receipt_poll_interval,
        ))
    }

    /// Call the contract's deposit method with `amount` in the smallest unit
    pub fn deposit(&mut self, amount: U256) -> Result<TransactionHandle> {
        let method = self.deposit_method.clone();
        self.submit_transaction(&method, &[amount.to_string()], None)
    }

    /// Call the contract's withdraw method with `amount` in the smallest unit
    pub fn withdraw(&mut self, amount: U256) -> Result<TransactionHandle> {
        let method = self.withdraw_method.clone();
        self.submit_transaction(&method, &[amount.to_string()], None)
    }

    /// Current status of `handle`. A rejection or failure is recorded in the
    /// error slot.
    pub fn observe_transaction(&mut self, handle: &TransactionHandle) -> TxStatus {
        let status = handle.status();
        if let Some(err) = status.error() {
            self.capture(err);
        }
        status
    }

    /// Wait for `handle` to reach a final status, then observe it
    pub async fn await_transaction(&mut self, handle: &TransactionHandle) -> TxStatus {
        handle.wait().await;
        self.observe_transaction(handle)
    }

    /// Link a Discord identity to the connected account. Without an explicit
    /// id the backend is asked to resolve one first.
    pub async fn link_identity(
        &mut self,
        client: &IdentityClient,
        discord_id: Option<&str>,
    ) -> Result<IdentityResponse> {
        self.error.clear();
        let Some(address) = self.state.primary_account().map(str::to_string) else {
            return Err(self.capture(Error::NotConnected));
        };

        let discord_id = match discord_id {
            Some(id) => id.to_string(),
            None => match client.resolve_discord_id().await {
                Ok(id) => id,
                Err(e) => return Err(self.capture(e)),
            },
        };

        let result = client.link(&discord_id, &address).await;
        result.map_err(|e| self.capture(e))
    }
}

impl<P: WalletProvider + 'static> Drop for WalletSession<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<P: WalletProvider + 'static> std::fmt::Debug for WalletSession<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSession")
            .field("state", &self.state)
            .field("error", &self.error)
            .field("status", &self.status)
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::network::chains;
    use crate::contract::tests::TIPJAR_ABI;
    use crate::provider::codes;
    use crate::provider::mock::MockProvider;

    const ALICE: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
    const BOB: &str = "0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc";
    const TX_HASH: &str = "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b";

    fn provider() -> Arc<MockProvider> {
        let provider = Arc::new(MockProvider::new());
        provider
            .respond(methods::GET_BALANCE, json!("1000000000000000000"))
            .respond(methods::CHAIN_ID, json!("0x1"));
        provider
    }

    fn base_network() -> NetworkConfig {
        NetworkConfig::preset(chains::BASE).unwrap()
    }

    #[tokio::test]
    async fn refresh_preserves_account_order() {
        let mut session = WalletSession::new(provider());
        let accounts = vec![BOB.to_string(), ALICE.to_string(), "0xabc".to_string()];

        let state = session.refresh_wallet_state(accounts.clone()).await.unwrap();

        assert_eq!(state.accounts, accounts);
        assert_eq!(session.state().accounts, accounts);
        assert_eq!(session.status(), SessionStatus::Connected);
    }

    #[tokio::test]
    async fn refresh_converts_wei_to_ether() {
        let provider = provider();
        let mut session = WalletSession::new(provider.clone());

        let state = session
            .refresh_wallet_state(vec!["0xabc".to_string()])
            .await
            .unwrap();

        assert_eq!(state.balance.as_deref(), Some("1"));
        assert_eq!(state.chain_id, "0x1");
        assert_eq!(
            provider.calls_to(methods::GET_BALANCE),
            vec![json!(["0xabc", "latest"])]
        );
    }

    #[tokio::test]
    async fn refresh_uses_configured_decimals() {
        let provider = Arc::new(MockProvider::new());
        provider
            .respond(methods::GET_BALANCE, json!("0x1e8480"))
            .respond(methods::CHAIN_ID, json!("0x89"));
        let mut session = WalletSession::new(provider).with_currency_decimals(6);

        let state = session.refresh_wallet_state(vec![ALICE.to_string()]).await.unwrap();
        assert_eq!(state.balance.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn empty_accounts_reset_to_disconnected() {
        let provider = provider();
        let mut session = WalletSession::new(provider.clone());
        session.refresh_wallet_state(vec![ALICE.to_string()]).await.unwrap();
        let calls_before = provider.calls().len();

        let state = session.refresh_wallet_state(vec![]).await.unwrap();

        assert_eq!(state, WalletState::disconnected());
        assert!(state.accounts.is_empty());
        assert_eq!(state.chain_id, "");
        assert_eq!(session.status(), SessionStatus::Disconnected);
        assert_eq!(provider.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn chain_change_patches_only_chain() {
        let mut session = WalletSession::new(provider());
        let before = session.refresh_wallet_state(vec![ALICE.to_string()]).await.unwrap();

        let after = session.on_chain_changed("0x2105".to_string());

        assert_eq!(after.accounts, before.accounts);
        assert_eq!(after.balance, before.balance);
        assert_eq!(after.chain_id, "0x2105");
    }

    #[tokio::test]
    async fn connect_success() {
        let provider = provider();
        provider.respond(methods::REQUEST_ACCOUNTS, json!([ALICE]));
        let mut session = WalletSession::new(provider);

        let state = session.connect().await.unwrap();

        assert_eq!(state.accounts, vec![ALICE.to_string()]);
        assert_eq!(session.status(), SessionStatus::Connected);
        assert!(!session.error().present);
    }

    #[tokio::test]
    async fn connect_with_no_accounts_stays_disconnected() {
        let provider = provider();
        provider.respond(methods::REQUEST_ACCOUNTS, json!([]));
        let mut session = WalletSession::new(provider);

        let state = session.connect().await.unwrap();

        assert_eq!(state, WalletState::disconnected());
        assert_eq!(session.status(), SessionStatus::Disconnected);
        assert!(!session.error().present);
    }

    #[tokio::test]
    async fn rejected_connect_records_error_and_keeps_state() {
        let provider = provider();
        let mut session = WalletSession::new(provider.clone());
        let prior = session.refresh_wallet_state(vec![ALICE.to_string()]).await.unwrap();

        provider.fail(
            methods::REQUEST_ACCOUNTS,
            codes::USER_REJECTED,
            "User rejected the request.",
        );
        let err = session.connect().await.unwrap_err();

        assert!(matches!(err, Error::UserDeclined(_)));
        assert_eq!(
            *session.error(),
            ErrorState {
                present: true,
                message: "User rejected the request.".to_string()
            }
        );
        assert_eq!(*session.state(), prior);
        assert_eq!(session.status(), SessionStatus::Connected);
    }

    #[tokio::test]
    async fn unexpected_rejection_is_captured_then_cleared_on_retry() {
        let provider = provider();
        provider.once(
            methods::REQUEST_ACCOUNTS,
            Err(ProviderError::new(
                codes::RESOURCE_UNAVAILABLE,
                "Request of type 'wallet_requestPermissions' already pending",
            )),
        );
        provider.respond(methods::REQUEST_ACCOUNTS, json!([ALICE]));
        let mut session = WalletSession::new(provider);

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedProvider(_)));
        assert!(session.error().present);
        assert_eq!(session.status(), SessionStatus::Disconnected);

        session.connect().await.unwrap();
        assert!(!session.error().present);
        assert!(session.error().message.is_empty());
        assert_eq!(session.status(), SessionStatus::Connected);
    }

    #[tokio::test]
    async fn start_registers_listeners_once_and_teardown_releases_them() {
        let provider = provider();
        provider.respond(methods::ACCOUNTS, json!([]));
        let mut session = WalletSession::new(provider.clone());

        session.start().await.unwrap();
        session.start().await.unwrap();
        assert_eq!(provider.listeners().count(EventKind::AccountsChanged), 1);
        assert_eq!(provider.listeners().count(EventKind::ChainChanged), 1);
        assert!(session.is_observing());

        session.teardown();
        assert!(provider.listeners().is_empty());
        assert!(!session.is_observing());
    }

    #[tokio::test]
    async fn dropping_session_releases_listeners() {
        let provider = provider();
        provider.respond(methods::ACCOUNTS, json!([ALICE]));
        {
            let mut session = WalletSession::new(provider.clone());
            let state = session.start().await.unwrap();
            assert!(state.is_connected());
        }
        assert!(provider.listeners().is_empty());
    }

    #[tokio::test]
    async fn provider_events_are_applied() {
        let provider = provider();
        provider.respond(methods::ACCOUNTS, json!([]));
        let mut session = WalletSession::new(provider.clone());
        session.start().await.unwrap();

        provider.emit(ProviderEvent::AccountsChanged(vec![ALICE.to_string()]));
        let state = session.next_event().await.unwrap();
        assert_eq!(state.accounts, vec![ALICE.to_string()]);

        provider.emit(ProviderEvent::ChainChanged("0xa".to_string()));
        let state = session.next_event().await.unwrap();
        assert_eq!(state.chain_id, "0xa");
        assert_eq!(state.balance.as_deref(), Some("1"));

        provider.emit(ProviderEvent::AccountsChanged(vec![]));
        session.next_event().await.unwrap();
        assert_eq!(session.status(), SessionStatus::Disconnected);
    }

    #[tokio::test]
    async fn drain_coalesces_account_changes() {
        let provider = provider();
        provider.respond(methods::ACCOUNTS, json!([]));
        let mut session = WalletSession::new(provider.clone());
        session.start().await.unwrap();

        provider.emit(ProviderEvent::AccountsChanged(vec![ALICE.to_string()]));
        provider.emit(ProviderEvent::AccountsChanged(vec![ALICE.to_string()]));
        provider.emit(ProviderEvent::AccountsChanged(vec![BOB.to_string()]));

        let applied = session.drain_events().await.unwrap();

        assert_eq!(applied, 1);
        assert_eq!(session.state().accounts, vec![BOB.to_string()]);
        assert_eq!(provider.calls_to(methods::GET_BALANCE).len(), 1);
        assert_eq!(session.drain_events().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn account_event_after_failed_connect_clears_error() {
        let provider = provider();
        provider
            .respond(methods::ACCOUNTS, json!([]))
            .fail(methods::REQUEST_ACCOUNTS, codes::USER_REJECTED, "User rejected the request.");
        let mut session = WalletSession::new(provider.clone());
        session.start().await.unwrap();

        session.connect().await.unwrap_err();
        assert!(session.error().present);

        provider.emit(ProviderEvent::AccountsChanged(vec![ALICE.to_string()]));
        session.drain_events().await.unwrap();

        assert_eq!(session.status(), SessionStatus::Connected);
        assert!(!session.error().present);
    }

    #[tokio::test]
    async fn start_clears_previous_error() {
        let provider = provider();
        provider
            .respond(methods::ACCOUNTS, json!([ALICE]))
            .fail(methods::REQUEST_ACCOUNTS, codes::USER_REJECTED, "User rejected the request.");
        let mut session = WalletSession::new(provider);

        session.connect().await.unwrap_err();
        assert!(session.error().present);

        session.start().await.unwrap();
        assert!(!session.error().present);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn replaying_accounts_is_idempotent() {
        let mut session = WalletSession::new(provider());
        let first = session.on_accounts_changed(vec![ALICE.to_string()]).await.unwrap();
        let second = session.on_accounts_changed(vec![ALICE.to_string()]).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unknown_chain_triggers_exactly_one_add() {
        let provider = provider();
        provider
            .once(
                methods::SWITCH_CHAIN,
                Err(ProviderError::new(
                    codes::UNRECOGNIZED_CHAIN,
                    "Unrecognized chain ID \"0x2105\".",
                )),
            )
            .respond(methods::SWITCH_CHAIN, Value::Null)
            .respond(methods::ADD_CHAIN, Value::Null);
        let mut session = WalletSession::new(provider.clone());
        let network = base_network();

        let outcome = session.ensure_network(&network).await;

        assert!(matches!(outcome, NetworkOutcome::Added));
        assert!(outcome.is_on_target());
        assert_eq!(
            provider.calls_to(methods::ADD_CHAIN),
            vec![json!([network.add_chain_params()])]
        );
        assert_eq!(provider.calls_to(methods::SWITCH_CHAIN).len(), 2);
        assert_eq!(session.state().chain_id, "0x2105");
    }

    #[tokio::test]
    async fn other_switch_errors_do_not_add() {
        let provider = provider();
        provider.fail(methods::SWITCH_CHAIN, codes::USER_REJECTED, "User rejected the request.");
        let mut session = WalletSession::new(provider.clone());

        let outcome = session.ensure_network(&base_network()).await;

        assert!(matches!(outcome, NetworkOutcome::SwitchFailed(_)));
        assert!(!outcome.is_on_target());
        assert!(provider.calls_to(methods::ADD_CHAIN).is_empty());
        assert_eq!(provider.calls_to(methods::SWITCH_CHAIN).len(), 1);
    }

    #[tokio::test]
    async fn failed_add_is_reported_not_fatal() {
        let provider = provider();
        provider
            .fail(methods::SWITCH_CHAIN, codes::UNRECOGNIZED_CHAIN, "Unrecognized chain ID")
            .fail(methods::ADD_CHAIN, codes::USER_REJECTED, "User rejected the request.");
        provider.respond(methods::ACCOUNTS, json!([ALICE]));
        let mut session = WalletSession::new(provider.clone());
        session.start().await.unwrap();

        let outcome = session.ensure_network(&base_network()).await;

        assert!(matches!(outcome, NetworkOutcome::AddFailed(Error::NetworkAddFailed(_))));
        assert_eq!(provider.calls_to(methods::ADD_CHAIN).len(), 1);
        assert_eq!(provider.calls_to(methods::SWITCH_CHAIN).len(), 1);
        assert!(session.error().present);
        assert!(session.is_connected());
        assert_eq!(session.state().chain_id, "0x1");
    }

    #[tokio::test]
    async fn switch_skipped_when_already_on_target() {
        let provider = provider();
        let mut session = WalletSession::new(provider.clone());
        session.refresh_wallet_state(vec![ALICE.to_string()]).await.unwrap();

        let outcome = session
            .ensure_network(&NetworkConfig::preset(chains::ETHEREUM).unwrap())
            .await;

        assert!(matches!(outcome, NetworkOutcome::AlreadyActive));
        assert!(provider.calls_to(methods::SWITCH_CHAIN).is_empty());
    }

    fn contract() -> ContractInterface {
        ContractInterface::from_json(TIPJAR_ABI)
            .unwrap()
            .with_address(Address::repeat_byte(0x22))
    }

    #[tokio::test]
    async fn submit_requires_connection() {
        let mut session = WalletSession::new(provider()).with_contract(contract());

        let err = session.deposit(U256::from(100u64)).unwrap_err();

        assert!(matches!(err, Error::NotConnected));
        assert!(session.error().present);
    }

    #[tokio::test]
    async fn submit_requires_contract() {
        let mut session = WalletSession::new(provider());
        session.refresh_wallet_state(vec![ALICE.to_string()]).await.unwrap();

        let err = session.withdraw(U256::from(1u64)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn deposit_sends_encoded_call() {
        let provider = provider();
        provider
            .respond(methods::SEND_TRANSACTION, json!(TX_HASH))
            .respond(methods::GET_TRANSACTION_RECEIPT, json!({"status": "0x1"}));
        let mut session = WalletSession::new(provider.clone())
            .with_contract(contract())
            .with_receipt_poll_interval(Duration::from_millis(5));
        session.refresh_wallet_state(vec![ALICE.to_string()]).await.unwrap();

        let handle = session.deposit(U256::from(100u64)).unwrap();
        assert!(matches!(handle.wait_sent().await, TxStatus::Mining(_)));

        let sent = provider.calls_to(methods::SEND_TRANSACTION);
        assert_eq!(sent.len(), 1);
        let tx = &sent[0][0];
        assert_eq!(tx["from"].as_str().unwrap().to_lowercase(), ALICE);
        assert_eq!(
            tx["to"].as_str().unwrap().to_lowercase(),
            "0x2222222222222222222222222222222222222222"
        );
        let data = tx["data"].as_str().unwrap();
        assert!(data.starts_with("0xb6b55f25"));
        assert!(data.ends_with("64"));

        assert!(matches!(
            session.await_transaction(&handle).await,
            TxStatus::Success(_)
        ));
        assert!(!session.error().present);
    }

    #[tokio::test]
    async fn deposit_returns_pending_while_wallet_prompt_is_open() {
        let provider = provider();
        provider.stall(methods::SEND_TRANSACTION);
        let mut session = WalletSession::new(provider.clone()).with_contract(contract());
        session.refresh_wallet_state(vec![ALICE.to_string()]).await.unwrap();

        let handle = session.deposit(U256::from(1u64)).unwrap();
        assert_eq!(handle.status(), TxStatus::Pending);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(session.observe_transaction(&handle), TxStatus::Pending);
        assert_eq!(provider.calls_to(methods::SEND_TRANSACTION).len(), 1);
        assert!(!session.error().present);
    }

    #[tokio::test]
    async fn explicit_recipient_overrides_contract_address() {
        let provider = provider();
        provider.respond(methods::SEND_TRANSACTION, json!(TX_HASH));
        let mut session = WalletSession::new(provider.clone()).with_contract(contract());
        session.refresh_wallet_state(vec![ALICE.to_string()]).await.unwrap();

        let mut handle = session
            .submit_transaction(
                "withdraw",
                &["5".to_string()],
                Some(Address::repeat_byte(0x33)),
            )
            .unwrap();
        handle.wait_sent().await;
        handle.abandon();
        assert!(session.observe_transaction(&handle).error().is_none());
        assert!(!session.error().present);

        let tx = &provider.calls_to(methods::SEND_TRANSACTION)[0][0];
        assert_eq!(
            tx["to"].as_str().unwrap().to_lowercase(),
            "0x3333333333333333333333333333333333333333"
        );
    }

    #[tokio::test]
    async fn rejected_transaction_populates_error_state() {
        let provider = provider();
        provider.fail(
            methods::SEND_TRANSACTION,
            codes::USER_REJECTED,
            "User denied transaction signature.",
        );
        let mut session = WalletSession::new(provider).with_contract(contract());
        session.refresh_wallet_state(vec![ALICE.to_string()]).await.unwrap();

        let handle = session.withdraw(U256::from(1u64)).unwrap();
        let status = session.await_transaction(&handle).await;

        assert!(matches!(status.error(), Some(Error::TransactionRejected(_))));
        assert_eq!(
            *session.error(),
            ErrorState {
                present: true,
                message: "User denied transaction signature.".to_string()
            }
        );
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn link_identity_requires_connection() {
        let client = IdentityClient::new("http://127.0.0.1:9/api/main").unwrap();
        let mut session = WalletSession::new(provider());

        let err = session.link_identity(&client, Some("42")).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }
}
