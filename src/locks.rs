use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// The serialization unit of the inventory engine.
pub type StockKey = (Uuid, Uuid);

/// Per-(item, location) async lock registry.
///
/// Every mutating operation against a stock key runs under that key's lock,
/// which linearizes reserve/append against the same pair while letting
/// disjoint pairs proceed independently. Reads never take these locks.
#[derive(Clone, Default)]
pub struct LockRegistry {
    locks: Arc<DashMap<StockKey, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: StockKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquires the lock for one stock key.
    pub async fn acquire(&self, item_id: Uuid, location_id: Uuid) -> OwnedMutexGuard<()> {
        self.lock_for((item_id, location_id)).lock_owned().await
    }

    /// Acquires locks for several stock keys.
    ///
    /// Keys are deduplicated and locked in sorted order so that two
    /// operations over overlapping key sets can never deadlock each other.
    pub async fn acquire_many(&self, keys: &[StockKey]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<StockKey> = keys.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for key in sorted {
            guards.push(self.lock_for(key).lock_owned().await);
        }
        guards
    }
}
