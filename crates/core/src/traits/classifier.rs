//! Slot classifier interface
//!
//! An opaque call to an external text classifier. The extractor treats any
//! error as "no classification".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Classifier verdict for one prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Slot the classifier picked, `None` when it declined
    pub classified_slot: Option<String>,
    /// Confidence in [0, 1]
    pub confidence: f32,
}

impl Classification {
    pub fn none() -> Self {
        Self {
            classified_slot: None,
            confidence: 0.0,
        }
    }
}

/// External text classifier
#[async_trait]
pub trait SlotClassifier: Send + Sync {
    /// Classify a prompt listing the candidate slots and the user text
    async fn classify(&self, prompt: &str) -> Result<Classification>;

    /// Name for logging
    fn name(&self) -> &str {
        "classifier"
    }
}
