use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use shield_core::ShipmentSession;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub trait SessionRepository: Send + Sync {
    async fn load_session(&self, session_id: &str) -> Result<Option<ShipmentSession>>;
    async fn upsert_session(&self, session: &ShipmentSession) -> Result<()>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Serializes turns on one session key. Different keys never contend.
    async fn lock_session(&self, session_id: &str) -> OwnedMutexGuard<()>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<String, ShipmentSession>>>,
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl SessionRepository for MemoryStore {
    async fn load_session(&self, session_id: &str) -> Result<Option<ShipmentSession>> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    async fn upsert_session(&self, session: &ShipmentSession) -> Result<()> {
        self.sessions
            .write()
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0_u64;
        let mut expired = Vec::new();
        self.sessions.write().retain(|key, value| {
            let keep = value.expires_at > now;
            if !keep {
                removed += 1;
                expired.push(key.clone());
            }
            keep
        });

        let mut locks = self.locks.lock();
        for key in expired {
            // A lock still held by an in-flight turn stays.
            if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&key);
            }
        }

        Ok(removed)
    }

    async fn lock_session(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[tokio::test]
    async fn round_trips_and_purges_sessions() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .upsert_session(&ShipmentSession::new("live", now + Duration::hours(1)))
            .await
            .unwrap();
        store
            .upsert_session(&ShipmentSession::new("stale", now - Duration::hours(1)))
            .await
            .unwrap();

        assert!(store.load_session("live").await.unwrap().is_some());
        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert!(store.load_session("stale").await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn session_locks_are_per_key() {
        let store = MemoryStore::new();
        let _held = store.lock_session("a").await;

        // A different key is free while "a" is held.
        let other = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.lock_session("b"),
        )
        .await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.lock_session("a"),
        )
        .await;
        assert!(same.is_err());
    }
}
