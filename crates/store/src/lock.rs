//! Keyed mutual exclusion for row-level locking.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// A mutex per key, created on first use.
///
/// This is the row-lock primitive for inventory and order mutations: two
/// concurrent updates on the same product or order serialize, while updates
/// on different keys proceed independently. The guard must only be held for
/// the read-modify-write cycle itself — never across a settlement gateway
/// call.
///
/// Lock entries are kept for the lifetime of the process; the key space
/// (products, open orders) is bounded in practice.
pub struct KeyedMutex<K> {
    locks: StdMutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> KeyedMutex<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Acquires the exclusive lock for `key`, waiting if another task holds
    /// it.
    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap();
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of keys that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().unwrap().is_empty()
    }
}

impl<K> Default for KeyedMutex<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = Arc::new(KeyedMutex::new());
        let counter = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();

        for _ in 0..20 {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("row-1").await;
                // Non-atomic read-modify-write; only safe under the lock.
                let v = counter.load(Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.store(v + 1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedMutex::new();
        let _a = locks.acquire("a").await;
        // Must not deadlock while `a` is held.
        let _b = locks.acquire("b").await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn reacquire_after_release() {
        let locks = KeyedMutex::new();
        drop(locks.acquire(1u64).await);
        let _again = locks.acquire(1u64).await;
        assert_eq!(locks.len(), 1);
    }
}
