//! Mutual exclusion keyed by order id.
//!
//! Every path that can mutate a storefront order (checkout invoice creation, capture/cancel reconciliation, refund
//! settlement) takes the lock for that order id first. Distinct order ids proceed in parallel; waiters on the same
//! id are granted the lock in arrival order (tokio's mutex queues fairly).
//!
//! The registry holds one reference-counted entry per *active* key. The entry disappears as soon as the last
//! holder or waiter for that key is gone, so the map never grows with the (unbounded) space of order ids.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("Lock acquisition was cancelled by the caller")]
    Cancelled,
    #[error("Lock was not acquired within {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug)]
struct LockEntry {
    mutex: Arc<Mutex<()>>,
    refs: usize,
}

type Registry = Arc<StdMutex<HashMap<String, LockEntry>>>;

#[derive(Clone, Default)]
pub struct OrderLocks {
    entries: Registry,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock on `key` with no bound. Prefer the cancellable variants on request paths.
    pub async fn lock(&self, key: &str) -> OrderLockGuard {
        let mutex = self.register(key);
        let guard = mutex.lock_owned().await;
        self.guard(key, guard)
    }

    /// Wait for the lock on `key` until `cancel` fires. A cancelled waiter never blocks later waiters and releases
    /// nothing it never held.
    pub async fn lock_with_cancel(&self, key: &str, cancel: &CancellationToken) -> Result<OrderLockGuard, LockError> {
        let mutex = self.register(key);
        tokio::select! {
            guard = mutex.lock_owned() => Ok(self.guard(key, guard)),
            _ = cancel.cancelled() => {
                release(&self.entries, key);
                Err(LockError::Cancelled)
            },
        }
    }

    /// Wait for the lock on `key` for at most `timeout`.
    pub async fn lock_with_timeout(&self, key: &str, timeout: Duration) -> Result<OrderLockGuard, LockError> {
        let mutex = self.register(key);
        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(self.guard(key, guard)),
            Err(_) => {
                release(&self.entries, key);
                Err(LockError::TimedOut(timeout))
            },
        }
    }

    /// The number of keys with at least one holder or waiter. Quiescent registries are empty.
    pub fn active_keys(&self) -> usize {
        lock_registry(&self.entries).len()
    }

    fn register(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = lock_registry(&self.entries);
        let entry = map
            .entry(key.to_string())
            .or_insert_with(|| LockEntry { mutex: Arc::new(Mutex::new(())), refs: 0 });
        entry.refs += 1;
        Arc::clone(&entry.mutex)
    }

    fn guard(&self, key: &str, guard: OwnedMutexGuard<()>) -> OrderLockGuard {
        OrderLockGuard { key: key.to_string(), entries: Arc::clone(&self.entries), guard: Some(guard) }
    }
}

/// Holds the lock for one key. Dropping the guard releases the lock and decrements the key's refcount, on every
/// exit path including panics and early returns.
#[derive(Debug)]
pub struct OrderLockGuard {
    key: String,
    entries: Registry,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for OrderLockGuard {
    fn drop(&mut self) {
        // hand the mutex to the next waiter before touching the refcount
        drop(self.guard.take());
        release(&self.entries, &self.key);
    }
}

fn lock_registry(entries: &Registry) -> std::sync::MutexGuard<'_, HashMap<String, LockEntry>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn release(entries: &Registry, key: &str) {
    let mut map = lock_registry(entries);
    if let Some(entry) = map.get_mut(key) {
        entry.refs -= 1;
        if entry.refs == 0 {
            map.remove(key);
        }
    }
}
