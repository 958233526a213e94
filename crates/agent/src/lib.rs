//! Slot-Filling Dialogue Engine
//!
//! Features:
//! - Multi-strategy slot extraction (option selection, special cases,
//!   pattern matching, classifier fallback) with confidence arbitration
//! - Special-case knowledge base with per-session loop breaking
//! - Dependency-aware slot progression with bounded elicitation
//! - Session persistence behind the [`advisor_core::SessionStore`] trait
//!
//! # Example
//!
//! ```ignore
//! use advisor_agent::DialogueEngine;
//!
//! let engine = DialogueEngine::builder(schema).build()?;
//! let outcome = engine.process_turn("session-1", "我想要一台遊戲筆電").await?;
//! println!("{}", outcome.response);
//! ```

pub mod engine;
pub mod extractor;
pub mod policy;
pub mod session_store;
pub mod special_cases;
pub mod tracker;

#[cfg(test)]
mod test_support;

pub use engine::{DialogueEngine, DialogueEngineBuilder, TurnOutcome};
pub use extractor::{
    ExtractionContext, ExtractionResult, ExtractionStrategy, MultiStrategyExtractor,
    StrategyOutput,
};
pub use policy::{missing_required, DialogueAction, DialoguePolicy, ForceReason, PolicyDecision};
pub use session_store::InMemorySessionStore;
pub use special_cases::{CaseMatch, CaseStats, SpecialCaseKnowledgeBase};
pub use tracker::{ChangeSource, StateChange};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] advisor_config::ConfigError),

    #[error("Text processing error: {0}")]
    TextProcessing(#[from] advisor_text_processing::TextProcessingError),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Initialization error: {0}")]
    Initialization(String),
}

impl From<advisor_core::Error> for AgentError {
    fn from(err: advisor_core::Error) -> Self {
        match err {
            advisor_core::Error::Catalog(message) => AgentError::Catalog(message),
            other => AgentError::Session(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
