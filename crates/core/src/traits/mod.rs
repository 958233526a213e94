//! Boundary traits for the slot-filling core
//!
//! Everything outside the extraction-and-progression core is reached
//! through these traits so hosts can plug in real backends and tests can
//! substitute mocks.
//!
//! ```text
//! Consumed:
//!   - SlotClassifier: picks the most likely slot for unresolved input
//!   - SessionStore: load/save of SessionState keyed by session id
//!   - LearnedPatternStore: durable storage for dynamic-learning records
//!
//! Produced-to:
//!   - CatalogSearch: receives the final slot map once the dialogue is ready
//! ```

mod catalog;
mod classifier;
mod learning;
mod session;

pub use catalog::{CatalogSearch, SearchRequest};
pub use classifier::{Classification, SlotClassifier};
pub use learning::LearnedPatternStore;
pub use session::SessionStore;
