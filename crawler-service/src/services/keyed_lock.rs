//! Keyed critical sections for per-user and per-(user, resource) writes.
//!
//! Token-store writes serialize per user; chunk-map and processing-status
//! writes serialize per (user, resource). A global lock would stall
//! unrelated users, so locks live in a map keyed by the critical-section
//! identity.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A map of independently lockable keys.
#[derive(Default)]
pub struct KeyedMutex {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the lock for `key`, creating it on first use. The guard is
    /// owned so it can be held across awaits.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Key for per-user serialization.
    pub fn user_key(user_id: &uuid::Uuid) -> String {
        user_id.to_string()
    }

    /// Key for per-(user, resource) serialization.
    pub fn resource_key(user_id: &uuid::Uuid, resource_id: &str) -> String {
        format!("{}:{}", user_id, resource_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = Arc::new(KeyedMutex::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let locks = locks.clone();
            let counter = counter.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("shared").await;
                let inside = counter.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(inside, Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedMutex::new();
        let _a = locks.lock("a").await;
        // Must not deadlock: "b" is an independent critical section.
        let _b = locks.lock("b").await;
    }

    #[test]
    fn key_shapes() {
        let user = uuid::Uuid::nil();
        assert_eq!(KeyedMutex::user_key(&user), user.to_string());
        assert_eq!(
            KeyedMutex::resource_key(&user, "doc-1"),
            format!("{}:doc-1", user)
        );
    }
}
