//! Special-case lookup as an extraction step

use advisor_core::{ExtractionMethod, MatchResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::{ExtractionContext, ExtractionStrategy, StrategyOutput};
use crate::special_cases::SpecialCaseKnowledgeBase;

pub struct SpecialCaseStrategy {
    kb: Arc<SpecialCaseKnowledgeBase>,
}

impl SpecialCaseStrategy {
    pub fn new(kb: Arc<SpecialCaseKnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl ExtractionStrategy for SpecialCaseStrategy {
    fn name(&self) -> &'static str {
        "special_case"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::SpecialCaseKnowledge
    }

    async fn extract(
        &self,
        ctx: &ExtractionContext<'_>,
        _resolved: &HashMap<String, MatchResult>,
    ) -> StrategyOutput {
        let Some(case) = self.kb.find_matching_case(ctx.text, ctx.session_id) else {
            return StrategyOutput::default();
        };

        // Inferred values carry the case similarity as confidence
        let matches = case
            .inferred_slots
            .iter()
            .map(|(slot, value)| {
                MatchResult::new(slot, value, case.similarity, ExtractionMethod::SpecialCaseKnowledge)
            })
            .collect();

        StrategyOutput {
            matches,
            case: Some(case),
        }
    }
}
