//! In-memory session store
//!
//! Sessions live in a `HashMap` and do not survive restarts. An optional
//! idle timeout makes expired sessions invisible to `load` and lets
//! `purge_expired` drop them.

use advisor_core::{Result, SessionState, SessionStore};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
    idle_timeout: Option<Duration>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire sessions idle for longer than `timeout`
    pub fn with_idle_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.idle_timeout = Duration::from_std(timeout).ok();
        self
    }

    fn is_expired(&self, state: &SessionState) -> bool {
        self.idle_timeout
            .map_or(false, |timeout| Utc::now() - state.updated_at > timeout)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        Ok(self
            .sessions
            .read()
            .get(session_id)
            .filter(|state| !self.is_expired(state))
            .cloned())
    }

    async fn save(&self, state: &SessionState) -> Result<()> {
        self.sessions
            .write()
            .insert(state.session_id.clone(), state.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.sessions.write().remove(session_id);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<Vec<String>> {
        let mut sessions = self.sessions.write();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, state)| self.is_expired(state))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            tracing::debug!(removed = expired.len(), "Purged expired sessions");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_delete() {
        let store = InMemorySessionStore::new();
        assert!(store.load("s1").await.unwrap().is_none());

        store.save(&SessionState::new("s1")).await.unwrap();
        assert_eq!(store.load("s1").await.unwrap().unwrap().session_id, "s1");
        assert_eq!(store.len(), 1);

        store.delete("s1").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let store = InMemorySessionStore::new().with_idle_timeout(std::time::Duration::from_secs(60));
        let mut stale = SessionState::new("stale");
        stale.updated_at = Utc::now() - Duration::minutes(5);
        store.save(&stale).await.unwrap();
        store.save(&SessionState::new("fresh")).await.unwrap();

        assert!(store.load("stale").await.unwrap().is_none());
        assert!(store.load("fresh").await.unwrap().is_some());
        assert_eq!(store.purge_expired().await.unwrap(), vec!["stale".to_string()]);
        assert_eq!(store.len(), 1);
    }
}
