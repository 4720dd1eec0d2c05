//! Scripted in-memory provider for tests

use super::{
    codes, EventHandler, EventKind, Listeners, ProviderError, ProviderEvent, ProviderResult,
    SubscriptionHandle, WalletProvider,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
pub(crate) struct MockProvider {
    /// One-shot responses, consumed in order before falling back to `fixed`
    scripted: Mutex<HashMap<String, VecDeque<ProviderResult<Value>>>>,
    fixed: Mutex<HashMap<String, ProviderResult<Value>>>,
    calls: Mutex<Vec<(String, Value)>>,
    /// Methods that never answer, like a wallet prompt left open
    stalled: Mutex<HashSet<String>>,
    listeners: Listeners,
}

impl MockProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Always answer `method` with `result`
    pub(crate) fn respond(&self, method: &str, result: Value) -> &Self {
        self.fixed
            .lock()
            .unwrap()
            .insert(method.to_string(), Ok(result));
        self
    }

    /// Always fail `method`
    pub(crate) fn fail(&self, method: &str, code: i64, message: &str) -> &Self {
        self.fixed
            .lock()
            .unwrap()
            .insert(method.to_string(), Err(ProviderError::new(code, message)));
        self
    }

    /// Answer the next call to `method` with `result`
    pub(crate) fn once(&self, method: &str, result: ProviderResult<Value>) -> &Self {
        self.scripted
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(result);
        self
    }

    /// Never answer `method`
    pub(crate) fn stall(&self, method: &str) -> &Self {
        self.stalled.lock().unwrap().insert(method.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    /// Params of every call made to `method`
    pub(crate) fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub(crate) fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub(crate) fn emit(&self, event: ProviderEvent) {
        self.listeners.emit(event);
    }
}

#[async_trait]
impl WalletProvider for MockProvider {
    async fn request(&self, method: &str, params: Value) -> ProviderResult<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));

        let stalled = self.stalled.lock().unwrap().contains(method);
        if stalled {
            return std::future::pending().await;
        }

        if let Some(result) = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(|queue| queue.pop_front())
        {
            return result;
        }

        self.fixed
            .lock()
            .unwrap()
            .get(method)
            .cloned()
            .unwrap_or_else(|| {
                Err(ProviderError::new(
                    codes::METHOD_NOT_FOUND,
                    format!("{} not mocked", method),
                ))
            })
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionHandle {
        self.listeners.subscribe(kind, handler)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.listeners.unsubscribe(handle)
    }
}
