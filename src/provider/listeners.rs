//! Listener registry shared by provider implementations

use super::{EventHandler, EventKind, ProviderEvent, SubscriptionHandle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Registered event handlers, keyed by subscription id
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<u64, (EventKind, EventHandler)>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    fn handlers(&self) -> MutexGuard<'_, HashMap<u64, (EventKind, EventHandler)>> {
        // Inserts and removes are single operations, so a poisoned map is still consistent
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers().insert(id, (kind, handler));
        tracing::debug!(id, event = kind.name(), "Registered provider listener");
        SubscriptionHandle { id, kind }
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let removed = self.handlers().remove(&handle.id).is_some();
        if removed {
            tracing::debug!(id = handle.id, event = handle.kind.name(), "Removed provider listener");
        }
        removed
    }

    /// Number of live listeners for an event kind
    pub fn count(&self, kind: EventKind) -> usize {
        self.handlers().values().filter(|(k, _)| *k == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers().is_empty()
    }

    /// Deliver an event to every listener of its kind
    pub fn emit(&self, event: ProviderEvent) {
        let kind = event.kind();
        // Snapshot so handlers may (un)subscribe without deadlocking
        let targets: Vec<EventHandler> = self
            .handlers()
            .values()
            .filter(|(k, _)| *k == kind)
            .map(|(_, h)| h.clone())
            .collect();

        tracing::trace!(event = kind.name(), listeners = targets.len(), "Emitting provider event");
        for handler in targets {
            handler(event.clone());
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.handlers().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn emit_reaches_only_matching_kind() {
        let listeners = Listeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        listeners.subscribe(
            EventKind::ChainChanged,
            Arc::new(move |event| sink.lock().unwrap().push(event)),
        );

        listeners.emit(ProviderEvent::AccountsChanged(vec!["0xabc".to_string()]));
        listeners.emit(ProviderEvent::ChainChanged("0x1".to_string()));

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![ProviderEvent::ChainChanged("0x1".to_string())]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let listeners = Listeners::new();
        let handle = listeners.subscribe(EventKind::AccountsChanged, Arc::new(|_| {}));
        assert_eq!(listeners.count(EventKind::AccountsChanged), 1);

        assert!(listeners.unsubscribe(handle));
        assert!(!listeners.unsubscribe(handle));
        assert!(listeners.is_empty());
    }
}
