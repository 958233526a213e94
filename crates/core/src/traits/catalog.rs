//! Catalog search interface
//!
//! The core does not rank products; once the dialogue is ready it hands the
//! final slot map to an external search component.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Result;

/// Final requirement profile handed to catalog search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub session_id: String,
    /// Slot values keyed by slot name
    pub slots: BTreeMap<String, String>,
    /// Slots that were filled from defaults rather than from the user
    #[serde(default)]
    pub defaulted: Vec<String>,
    /// Whether readiness was forced by a turn or loop limit
    #[serde(default)]
    pub forced: bool,
}

/// External search / recommendation component
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    async fn submit(&self, request: &SearchRequest) -> Result<()>;
}
