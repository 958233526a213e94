//! Session persistence interface

use async_trait::async_trait;

use crate::session::SessionState;
use crate::Result;

/// Load/save of session state keyed by session id
///
/// Expiry after inactivity is the store's concern.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session, `None` if it does not exist or has expired
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>>;

    /// Save (create or replace) a session
    async fn save(&self, state: &SessionState) -> Result<()>;

    /// Delete a session
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Drop expired sessions, returning their ids
    ///
    /// Stores without expiry have nothing to purge.
    async fn purge_expired(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
