//! Lock manager for serializing mutations per key
//!
//! Each [`LockScope`] maps to one async mutex. Holders of different keys
//! never wait on each other; holders of the same key queue in FIFO order.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::guard::LockGuard;
use super::types::LockScope;

/// Lock manager for coordinating keyed locks
#[derive(Debug, Default)]
pub struct LockManager {
    /// lock_key -> mutex; entries whose mutex has no holder are pruned lazily
    active_locks: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl LockManager {
    /// Create a new lock manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a scope, waiting for the current holder if any.
    ///
    /// The lock is released when the returned guard is dropped.
    pub async fn acquire(&self, scope: LockScope) -> LockGuard {
        let lock_key = scope.lock_key();
        let mutex = self.mutex_for(&lock_key).await;

        let start = Instant::now();
        let guard = mutex.lock_owned().await;
        debug!(
            lock_key = %lock_key,
            waited_ms = start.elapsed().as_millis() as u64,
            "Lock acquired"
        );

        LockGuard::new(scope, guard)
    }

    /// Acquire the lock only if nobody holds it right now
    pub async fn try_acquire(&self, scope: LockScope) -> Option<LockGuard> {
        let lock_key = scope.lock_key();
        let mutex = self.mutex_for(&lock_key).await;
        mutex
            .try_lock_owned()
            .ok()
            .map(|guard| LockGuard::new(scope, guard))
    }

    /// Number of keys with a live mutex
    pub async fn tracked_keys(&self) -> usize {
        let mut active = self.active_locks.lock().await;
        active.retain(|_, weak| weak.strong_count() > 0);
        active.len()
    }

    async fn mutex_for(&self, lock_key: &str) -> Arc<Mutex<()>> {
        let mut active = self.active_locks.lock().await;

        if let Some(existing) = active.get(lock_key).and_then(Weak::upgrade) {
            return existing;
        }

        active.retain(|_, weak| weak.strong_count() > 0);
        let mutex = Arc::new(Mutex::new(()));
        active.insert(lock_key.to_string(), Arc::downgrade(&mutex));
        mutex
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let manager = LockManager::new();
        let guard = manager.acquire(LockScope::graph("u-1")).await;

        assert!(manager.try_acquire(LockScope::graph("u-1")).await.is_none());
        drop(guard);
        assert!(manager.try_acquire(LockScope::graph("u-1")).await.is_some());
    }

    #[tokio::test]
    async fn test_different_keys_are_independent() {
        let manager = LockManager::new();
        let _a = manager.acquire(LockScope::graph("u-1")).await;
        let b = manager.try_acquire(LockScope::graph("u-2")).await;
        assert!(b.is_some());

        let c = manager.try_acquire(LockScope::sessions("u-1")).await;
        assert!(c.is_some());
    }

    #[tokio::test]
    async fn test_waiter_proceeds_after_release() {
        let manager = Arc::new(LockManager::new());
        let guard = manager.acquire(LockScope::entry("e-1")).await;

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let _guard = manager.acquire(LockScope::entry("e-1")).await;
                true
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_released_keys_are_pruned() {
        let manager = LockManager::new();
        {
            let _a = manager.acquire(LockScope::graph("u-1")).await;
            let _b = manager.acquire(LockScope::graph("u-2")).await;
            assert_eq!(manager.tracked_keys().await, 2);
        }
        assert_eq!(manager.tracked_keys().await, 0);
    }
}
