//! Per-key serialization so concurrent cold lookups for the same company
//! collapse into one directory call sequence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::cache::CacheKey;

#[derive(Default)]
pub struct KeyedSingleFlight {
    in_flight: Mutex<HashMap<CacheKey, Weak<AsyncMutex<()>>>>,
}

impl KeyedSingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other caller holds `key`, then holds it until the guard drops.
    pub async fn acquire(&self, key: &CacheKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            in_flight.retain(|_, weak| weak.strong_count() > 0);
            match in_flight.get(key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    in_flight.insert(key.clone(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Keys with at least one live holder or waiter.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
