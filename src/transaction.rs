//! Transaction submission and confirmation tracking
//!
//! Submitting returns a handle immediately, in `Pending`. A background task
//! forwards the request to the wallet, which may keep its signing prompt open
//! indefinitely, then polls `eth_getTransactionReceipt` and publishes status
//! changes on a watch channel. There is no timeout; callers decide how long
//! to show "mining" and may abandon the handle, which stops tracking but
//! cannot cancel on chain.

use crate::provider::{methods, ProviderError, ProviderResult, WalletProvider};
use crate::Error;
use alloy::primitives::{Address, Bytes, B256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Failure reason recorded when the caller stops tracking a transaction
pub const ABANDONED: &str = "abandoned by user";

/// A contract call ready to hand to the signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
}

impl TransactionRequest {
    pub fn new(from: Address, to: Address, data: Bytes) -> Self {
        Self { from, to, data }
    }

    /// Params for `eth_sendTransaction`
    pub fn to_rpc_params(&self) -> Value {
        json!([{
            "from": self.from,
            "to": self.to,
            "data": self.data,
        }])
    }
}

/// Lifecycle of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Handed to the wallet, waiting for the user to sign
    Pending,
    /// Broadcast; waiting for a receipt
    Mining(B256),
    Success(B256),
    /// The wallet refused or failed to send the transaction
    Rejected(ProviderError),
    /// Reverted on chain, or abandoned before a receipt arrived
    Failed(String),
}

impl TxStatus {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TxStatus::Success(_) | TxStatus::Rejected(_) | TxStatus::Failed(_)
        )
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TxStatus::Pending)
    }

    pub fn hash(&self) -> Option<B256> {
        match self {
            TxStatus::Mining(hash) | TxStatus::Success(hash) => Some(*hash),
            TxStatus::Pending | TxStatus::Rejected(_) | TxStatus::Failed(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Mining(_) => "mining",
            TxStatus::Success(_) => "success",
            TxStatus::Rejected(_) => "rejected",
            TxStatus::Failed(_) => "failed",
        }
    }

    /// The error this status represents, if any. Abandoning is not an error.
    pub fn error(&self) -> Option<Error> {
        match self {
            TxStatus::Rejected(e) => Some(send_error(e.clone())),
            TxStatus::Failed(reason) if reason != ABANDONED => {
                Some(Error::TransactionFailed(reason.clone()))
            }
            _ => None,
        }
    }
}

/// Move `status` to `next` unless it already reached a final state
fn advance(status: &watch::Sender<TxStatus>, next: TxStatus) -> bool {
    status.send_if_modified(|current| {
        if current.is_final() {
            false
        } else {
            *current = next;
            true
        }
    })
}

/// Observable handle to a submitted transaction
#[derive(Debug)]
pub struct TransactionHandle {
    method: String,
    submitted_at: DateTime<Utc>,
    status: Arc<watch::Sender<TxStatus>>,
    tracker: Option<JoinHandle<()>>,
}

impl TransactionHandle {
    fn new(method: &str) -> Self {
        let (status, _) = watch::channel(TxStatus::Pending);
        Self {
            method: method.to_string(),
            submitted_at: Utc::now(),
            status: Arc::new(status),
            tracker: None,
        }
    }

    /// Contract method this transaction calls
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn status(&self) -> TxStatus {
        self.status.borrow().clone()
    }

    pub fn hash(&self) -> Option<B256> {
        self.status.borrow().hash()
    }

    /// Receiver for status updates, e.g. to drive a progress display
    pub fn subscribe(&self) -> watch::Receiver<TxStatus> {
        self.status.subscribe()
    }

    /// Wait until the wallet has answered: broadcast, rejected or abandoned
    pub async fn wait_sent(&self) -> TxStatus {
        self.wait_until(|status| !status.is_pending()).await
    }

    /// Wait until the transaction succeeds or fails. Never times out.
    pub async fn wait(&self) -> TxStatus {
        self.wait_until(TxStatus::is_final).await
    }

    async fn wait_until(&self, done: impl FnMut(&TxStatus) -> bool) -> TxStatus {
        let mut rx = self.status.subscribe();
        // The handle owns the sender, so the channel stays open while we wait
        let status = match rx.wait_for(done).await {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        };
        status
    }

    /// Stop tracking. The transaction itself may still be signed and mined.
    pub fn abandon(&mut self) {
        if let Some(tracker) = self.tracker.take() {
            tracker.abort();
        }
        if advance(&self.status, TxStatus::Failed(ABANDONED.to_string())) {
            tracing::info!(method = %self.method, "Abandoned transaction tracking");
        }
    }
}

impl Drop for TransactionHandle {
    fn drop(&mut self) {
        if let Some(tracker) = self.tracker.take() {
            tracker.abort();
        }
    }
}

/// Start sending `request` through the wallet and return its handle in `Pending`.
///
/// Must be called within a tokio runtime.
pub(crate) fn submit<P>(
    provider: &Arc<P>,
    method: &str,
    request: TransactionRequest,
    poll_interval: Duration,
) -> TransactionHandle
where
    P: WalletProvider + 'static,
{
    let mut handle = TransactionHandle::new(method);

    tracing::info!(
        method,
        from = %request.from,
        to = %request.to,
        data_len = request.data.len(),
        "Submitting transaction"
    );

    handle.tracker = Some(tokio::spawn(track(
        provider.clone(),
        method.to_string(),
        request,
        handle.status.clone(),
        poll_interval,
    )));
    handle
}

async fn track<P>(
    provider: Arc<P>,
    method: String,
    request: TransactionRequest,
    status: Arc<watch::Sender<TxStatus>>,
    poll_interval: Duration,
) where
    P: WalletProvider + 'static,
{
    let response = provider
        .request(methods::SEND_TRANSACTION, request.to_rpc_params())
        .await
        .and_then(|value| parse_hash(&value));

    let hash = match response {
        Ok(hash) => hash,
        Err(e) => {
            if e.is_user_rejection() {
                tracing::info!(method = %method, error = %e, "Wallet rejected transaction");
            } else {
                tracing::warn!(method = %method, error = %e, "Wallet failed to send transaction");
            }
            advance(&status, TxStatus::Rejected(e));
            return;
        }
    };

    tracing::info!(method = %method, hash = %hash, "Transaction broadcast");
    if advance(&status, TxStatus::Mining(hash)) {
        poll_receipt(provider, hash, &status, poll_interval).await;
    }
}

fn send_error(e: ProviderError) -> Error {
    if e.is_user_rejection() {
        Error::TransactionRejected(e.message)
    } else {
        Error::UnexpectedProvider(e)
    }
}

fn parse_hash(value: &Value) -> ProviderResult<B256> {
    let raw = value.as_str().ok_or_else(|| {
        ProviderError::internal(format!(
            "eth_sendTransaction returned a non-string: {}",
            value
        ))
    })?;
    B256::from_str(raw)
        .map_err(|e| ProviderError::internal(format!("Invalid transaction hash '{}': {}", raw, e)))
}

/// Interpret a receipt: `status` 0x1 is success, 0x0 a revert. Receipts
/// without a status field (pre-Byzantium) count as success.
fn receipt_status(hash: B256, receipt: &Value) -> TxStatus {
    match receipt.get("status").and_then(Value::as_str) {
        Some("0x0") => TxStatus::Failed("transaction reverted".to_string()),
        _ => TxStatus::Success(hash),
    }
}

async fn poll_receipt<P>(
    provider: Arc<P>,
    hash: B256,
    status: &watch::Sender<TxStatus>,
    interval: Duration,
) where
    P: WalletProvider + 'static,
{
    let mut attempts: u64 = 0;
    loop {
        tokio::time::sleep(interval).await;
        attempts += 1;

        match provider
            .request(methods::GET_TRANSACTION_RECEIPT, json!([hash]))
            .await
        {
            Ok(Value::Null) => {
                tracing::trace!(hash = %hash, attempts, "Receipt not available yet");
            }
            Ok(receipt) => {
                let outcome = receipt_status(hash, &receipt);
                tracing::info!(
                    hash = %hash,
                    status = outcome.label(),
                    block = ?receipt.get("blockNumber"),
                    "Transaction confirmed"
                );
                advance(status, outcome);
                return;
            }
            Err(e) => {
                tracing::warn!(hash = %hash, error = %e, "Failed to fetch receipt, retrying");
            }
        }
    }
}
