//! Per-key deduplication of concurrent async work.
//!
//! When several tasks ask for the same key at once, the first becomes the
//! leader and runs the work; the others wait on the leader's slot and receive
//! a clone of its result. A slot is removed as soon as its leader finishes, so
//! results are never cached here: callers pair this with their own cache.
//!
//! If the leader's future is dropped before completing (client disconnect,
//! timeout), the slot is released empty and waiting tasks retry, one of them
//! becoming the new leader.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot<V> = Arc<Mutex<Option<V>>>;

enum Role<V> {
    Leader(OwnedMutexGuard<Option<V>>),
    Follower(Slot<V>),
}

/// At-most-one in-flight computation per key.
pub struct Singleflight<K, V> {
    flights: std::sync::Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> Default for Singleflight<K, V> {
    fn default() -> Self {
        Self {
            flights: std::sync::Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> Singleflight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key`, or wait for the run already in progress.
    pub async fn run<F, Fut>(&self, key: &K, work: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        loop {
            match self.join(key) {
                Role::Leader(guard) => return self.lead(key, guard, work).await,
                Role::Follower(slot) => {
                    if let Some(value) = slot.lock().await.as_ref() {
                        return value.clone();
                    }
                }
            }
        }
    }

    /// Number of keys currently being computed.
    pub fn in_flight(&self) -> usize {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn join(&self, key: &K) -> Role<V> {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = flights.get(key) {
            return Role::Follower(Arc::clone(slot));
        }

        let slot: Slot<V> = Arc::new(Mutex::new(None));
        match Arc::clone(&slot).try_lock_owned() {
            Ok(guard) => {
                flights.insert(key.clone(), slot);
                Role::Leader(guard)
            }
            // Unreachable for a fresh mutex; the caller simply retries.
            Err(_) => Role::Follower(slot),
        }
    }

    async fn lead<F, Fut>(&self, key: &K, mut guard: OwnedMutexGuard<Option<V>>, work: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        // Dropped before `guard`, so followers wake after the key is released.
        let _release = Release {
            flights: &self.flights,
            key,
        };
        let value = work().await;
        *guard = Some(value.clone());
        value
    }
}

struct Release<'a, K: Eq + Hash, V> {
    flights: &'a std::sync::Mutex<HashMap<K, Slot<V>>>,
    key: &'a K,
}

impl<K: Eq + Hash, V> Drop for Release<'_, K, V> {
    fn drop(&mut self) {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.key);
    }
}
