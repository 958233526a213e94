//! Durable storage for dynamically learned patterns

use crate::learning::LearnedPatternRecord;
use crate::Result;

/// Persistence for learned pattern records
///
/// Calls are blocking; the matcher runs `persist` off the request path.
pub trait LearnedPatternStore: Send + Sync {
    /// Load all previously learned records
    fn load(&self) -> Result<Vec<LearnedPatternRecord>>;

    /// Replace the stored records with the full current list
    fn persist(&self, records: &[LearnedPatternRecord]) -> Result<()>;
}
