use crate::errors::ServiceError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

enum EntryState {
    InFlight,
    Completed {
        payload: serde_json::Value,
        stored_at: Instant,
    },
}

/// In-process idempotency-key deduplication for coordinator operations.
///
/// Keys are scoped per operation kind (`checkout:<key>` never collides with
/// `refund:<key>`). The first caller installs an in-flight marker; a replay
/// while the marker is live fails `OperationInProgress`; a replay after
/// success returns the stored result without re-executing side effects.
/// Dedup state transitions happen under the entry's shard lock, so two
/// racing callers with the same key can never both execute.
#[derive(Clone)]
pub struct IdempotencyRegistry {
    entries: Arc<DashMap<String, EntryState>>,
    ttl: Duration,
}

impl IdempotencyRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    fn scoped(scope: &str, key: &str) -> String {
        format!("{}:{}", scope, key)
    }

    /// Claims a key for execution.
    ///
    /// Returns `Ok(Some(result))` when a completed result is stored for the
    /// key, `Ok(None)` when the key is now claimed by this caller, and
    /// `Err(OperationInProgress)` when another execution is in flight.
    pub fn begin<T: DeserializeOwned>(
        &self,
        scope: &str,
        key: &str,
    ) -> Result<Option<T>, ServiceError> {
        self.evict_expired();

        match self.entries.entry(Self::scoped(scope, key)) {
            Entry::Occupied(occupied) => match occupied.get() {
                EntryState::InFlight => Err(ServiceError::OperationInProgress),
                EntryState::Completed { payload, .. } => {
                    let value = serde_json::from_value(payload.clone()).map_err(|e| {
                        ServiceError::InternalError(format!(
                            "stored idempotent result no longer deserializes: {}",
                            e
                        ))
                    })?;
                    Ok(Some(value))
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(EntryState::InFlight);
                Ok(None)
            }
        }
    }

    /// Stores the successful result for a claimed key.
    pub fn complete<T: Serialize>(
        &self,
        scope: &str,
        key: &str,
        result: &T,
    ) -> Result<(), ServiceError> {
        let payload = serde_json::to_value(result)
            .map_err(|e| ServiceError::InternalError(format!("result not serializable: {}", e)))?;
        self.entries.insert(
            Self::scoped(scope, key),
            EntryState::Completed {
                payload,
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Releases a claimed key after a failed execution so the caller can retry.
    pub fn abort(&self, scope: &str, key: &str) {
        let full = Self::scoped(scope, key);
        if let Entry::Occupied(occupied) = self.entries.entry(full) {
            if matches!(occupied.get(), EntryState::InFlight) {
                occupied.remove();
            }
        }
    }

    fn evict_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, state| match state {
            EntryState::InFlight => true,
            EntryState::Completed { stored_at, .. } => stored_at.elapsed() < ttl,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> IdempotencyRegistry {
        IdempotencyRegistry::new(Duration::from_secs(60))
    }

    #[test]
    fn first_claim_executes() {
        let reg = registry();
        let claimed: Option<u32> = reg.begin("checkout", "k1").unwrap();
        assert!(claimed.is_none());
    }

    #[test]
    fn replay_during_flight_is_rejected() {
        let reg = registry();
        let _: Option<u32> = reg.begin("checkout", "k1").unwrap();
        let second: Result<Option<u32>, _> = reg.begin("checkout", "k1");
        assert!(matches!(second, Err(ServiceError::OperationInProgress)));
    }

    #[test]
    fn replay_after_success_returns_stored_result() {
        let reg = registry();
        let _: Option<u32> = reg.begin("checkout", "k1").unwrap();
        reg.complete("checkout", "k1", &42u32).unwrap();

        let replay: Option<u32> = reg.begin("checkout", "k1").unwrap();
        assert_eq!(replay, Some(42));
    }

    #[test]
    fn abort_releases_the_key() {
        let reg = registry();
        let _: Option<u32> = reg.begin("checkout", "k1").unwrap();
        reg.abort("checkout", "k1");
        let again: Option<u32> = reg.begin("checkout", "k1").unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn scopes_do_not_collide() {
        let reg = registry();
        let _: Option<u32> = reg.begin("checkout", "k1").unwrap();
        let other: Option<u32> = reg.begin("refund", "k1").unwrap();
        assert!(other.is_none());
    }

    #[test]
    fn expired_results_are_reclaimed() {
        let reg = IdempotencyRegistry::new(Duration::from_millis(0));
        let _: Option<u32> = reg.begin("checkout", "k1").unwrap();
        reg.complete("checkout", "k1", &1u32).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let again: Option<u32> = reg.begin("checkout", "k1").unwrap();
        assert!(again.is_none());
    }
}
