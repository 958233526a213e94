//! Text processing for the product advisor
//!
//! This crate provides:
//! - **Normalisation**: full-width folding, lower-casing and query hashing
//! - **Similarity**: edit distance and char-bigram overlap for CJK text
//! - **Numeric ranges**: budget amounts such as "3-4萬" or "35k"
//! - **Pattern matching**: schema-driven slot matching over immutable,
//!   atomically swapped pattern tables
//! - **Dynamic learning**: new slot values registered at runtime and
//!   persisted through a [`advisor_core::LearnedPatternStore`]
//!
//! # Example
//!
//! ```ignore
//! use advisor_text_processing::{MatchOptions, PatternMatcher};
//!
//! let matcher = PatternMatcher::new(schema);
//! let outcome = matcher.match_text("我想要一台遊戲筆電", &MatchOptions::default());
//! assert_eq!(outcome.get("usage_purpose").unwrap().value, "gaming");
//! ```

pub mod learning;
pub mod matcher;
pub mod normalize;
pub mod numeric;
pub mod similarity;
pub mod store;
pub mod table;

mod error;

#[cfg(test)]
mod test_support;

pub use error::{Result, TextProcessingError};

pub use learning::{propose_candidates, synthesize_pattern, LearningCandidate};
pub use matcher::{MatchOptions, MatchOutcome, PatternMatcher};
pub use normalize::{canonical_query, normalize, query_hash};
pub use numeric::{parse_range, NumericRange};
pub use similarity::{bigram_dice, levenshtein_distance, levenshtein_similarity, phrase_similarity};
pub use store::{InMemoryPatternStore, JsonFilePatternStore};
pub use table::{PatternIssue, PatternTable};
