//! Learned-pattern stores

use advisor_core::{LearnedPatternRecord, LearnedPatternStore, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};

/// Records kept in a JSON array on disk
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write never leaves a truncated store behind.
#[derive(Debug, Clone)]
pub struct JsonFilePatternStore {
    path: PathBuf,
}

impl JsonFilePatternStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LearnedPatternStore for JsonFilePatternStore {
    fn load(&self) -> Result<Vec<LearnedPatternRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn persist(&self, records: &[LearnedPatternRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(records)?)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), records = records.len(), "Persisted learned patterns");
        Ok(())
    }
}

/// Records kept in memory only
#[derive(Debug, Default)]
pub struct InMemoryPatternStore {
    records: RwLock<Vec<LearnedPatternRecord>>,
}

impl InMemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<LearnedPatternRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl LearnedPatternStore for InMemoryPatternStore {
    fn load(&self) -> Result<Vec<LearnedPatternRecord>> {
        Ok(self.records.read().clone())
    }

    fn persist(&self, records: &[LearnedPatternRecord]) -> Result<()> {
        *self.records.write() = records.to_vec();
        Ok(())
    }
}
