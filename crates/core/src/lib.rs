//! Core traits and types for the slot-filling advisor
//!
//! This crate provides foundational types used across all other crates:
//! - Match results and extraction provenance
//! - Dialogue stages and conversation turns
//! - The per-session state record
//! - Learned pattern records produced by dynamic learning
//! - Boundary traits for external collaborators (classifier, session
//!   store, catalog search, learned-pattern persistence)
//! - Error types

pub mod conversation;
pub mod error;
pub mod learning;
pub mod session;
pub mod slot;
pub mod traits;

pub use conversation::{DialogueStage, Turn, TurnRole};
pub use error::{Error, Result};
pub use learning::{LearnedPatternRecord, DYNAMIC_LEARNING_SOURCE};
pub use session::{DependencyEffects, FilledSlot, OfferedOptions, SessionState, SlotOption};
pub use slot::{insert_best, ExtractionMethod, MatchResult, MatchSpan};

pub use traits::{
    CatalogSearch, Classification, LearnedPatternStore, SearchRequest, SessionStore,
    SlotClassifier,
};
