//! Idempotency cache: key -> the full response of the first call that used it.

use std::sync::Arc;

use dashmap::DashMap;
use opencall_core::CallResponse;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::service::config::IdempotencyScope;

/// Namespaced idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    /// `None` when keys are global.
    op: Option<String>,
    key: String,
}

impl IdempotencyKey {
    #[must_use]
    pub fn new(scope: IdempotencyScope, op: &str, key: &str) -> Self {
        Self {
            op: match scope {
                IdempotencyScope::PerOperation => Some(op.to_string()),
                IdempotencyScope::Global => None,
            },
            key: key.to_string(),
        }
    }
}

type Slot = Arc<Mutex<Option<CallResponse>>>;

/// Exclusive access to one key's cache slot.
///
/// Holding the guard serializes every dispatch carrying the same key, so the
/// handler behind it runs at most once per key even under concurrency.
pub struct IdempotencySlot {
    guard: OwnedMutexGuard<Option<CallResponse>>,
}

impl IdempotencySlot {
    /// The stored response, if a previous call already produced one.
    #[must_use]
    pub fn cached(&self) -> Option<&CallResponse> {
        self.guard.as_ref()
    }

    /// Stores `response`. Only the first store for a key sticks.
    pub fn store(&mut self, response: CallResponse) {
        if self.guard.is_none() {
            *self.guard = Some(response);
        }
    }
}

/// Unbounded, non-expiring cache of full responses.
#[derive(Debug, Default)]
pub struct IdempotencyCache {
    slots: DashMap<IdempotencyKey, Slot>,
}

impl IdempotencyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the slot for `key`, waiting for any in-flight call holding it.
    pub async fn acquire(&self, key: IdempotencyKey) -> IdempotencySlot {
        let slot: Slot = Arc::clone(self.slots.entry(key).or_default().value());
        IdempotencySlot {
            guard: slot.lock_owned().await,
        }
    }

    /// Number of keys with a stored response. Slots currently held by an
    /// in-flight call are not counted.
    #[must_use]
    pub fn stored(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.value().try_lock().is_ok_and(|slot| slot.is_some()))
            .count()
    }
}
