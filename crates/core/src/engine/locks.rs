//! Per-key serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Idle locks are dropped once the table grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

type Key = (String, String);

/// One async mutex per (session, url), behind a table-wide gate.
///
/// A [`KeyGuard`] serializes fetch, snapshot and clear for its key while
/// other keys proceed independently. Operations spanning many keys take the
/// gate exclusively and so wait for every key guard to drop.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    gate: RwLock<()>,
    table: Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of a single-key operation.
pub(crate) struct KeyGuard<'a> {
    _key: OwnedMutexGuard<()>,
    _shared: RwLockReadGuard<'a, ()>,
}

impl KeyLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn acquire(&self, session: &str, url: &str) -> KeyGuard<'_> {
        let shared = self.gate.read().await;
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            if table.len() >= PRUNE_THRESHOLD {
                // Only the table holds a reference to an idle lock.
                table.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            table
                .entry((session.to_string(), url.to_string()))
                .or_default()
                .clone()
        };
        KeyGuard { _key: lock.lock_owned().await, _shared: shared }
    }

    /// Exclude every single-key operation until the guard drops.
    pub(crate) async fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = Arc::new(KeyLocks::new());
        let guard = locks.acquire("s", "https://example.com/").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("s", "https://example.com/").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_exclusive_waits_for_key_holders() {
        let locks = Arc::new(KeyLocks::new());
        let guard = locks.acquire("s", "https://example.com/").await;

        let sweeper = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _all = locks.exclusive().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sweeper.is_finished());

        drop(guard);
        sweeper.await.unwrap();
        let _again = locks.acquire("t", "https://example.com/").await;
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.acquire("s", "https://example.com/").await;
        let _b = locks.acquire("t", "https://example.com/").await;
        let _c = locks.acquire("s", "https://other.com/").await;
        assert_eq!(locks.len(), 3);
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let locks = KeyLocks::new();
        for i in 0..PRUNE_THRESHOLD {
            drop(locks.acquire("s", &format!("https://example.com/{i}")).await);
        }
        let _held = locks.acquire("s", "https://example.com/held").await;
        assert_eq!(locks.len(), 1);
    }
}
