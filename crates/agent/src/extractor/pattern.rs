//! Schema pattern matching as an extraction step
//!
//! Wraps the [`PatternMatcher`]. When the previous question asked for a
//! free-text slot and nothing else matched, the whole utterance becomes
//! that slot's value.

use advisor_config::SlotKind;
use advisor_core::{ExtractionMethod, MatchResult};
use advisor_text_processing::{MatchOptions, PatternMatcher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::{ExtractionContext, ExtractionStrategy, StrategyOutput};

/// Confidence of a free-text answer to a direct question
const FREE_TEXT_CONFIDENCE: f32 = 0.6;

pub struct PatternStrategy {
    matcher: Arc<PatternMatcher>,
    options: MatchOptions,
}

impl PatternStrategy {
    pub fn new(matcher: Arc<PatternMatcher>, enable_learning: bool) -> Self {
        Self {
            matcher,
            options: MatchOptions { enable_learning },
        }
    }

    fn free_text_answer(&self, ctx: &ExtractionContext<'_>) -> Option<MatchResult> {
        let schema = self.matcher.schema();
        let slot = ctx.pending_slots.iter().find(|slot| {
            schema
                .get_slot(slot)
                .map_or(false, |def| def.kind == SlotKind::Text)
        })?;
        let value = ctx.text.trim();
        if !schema.is_allowed_value(slot, value) {
            return None;
        }
        Some(MatchResult::new(slot, value, FREE_TEXT_CONFIDENCE, ExtractionMethod::PatternMatch))
    }
}

#[async_trait]
impl ExtractionStrategy for PatternStrategy {
    fn name(&self) -> &'static str {
        "pattern_match"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::PatternMatch
    }

    async fn extract(
        &self,
        ctx: &ExtractionContext<'_>,
        _resolved: &HashMap<String, MatchResult>,
    ) -> StrategyOutput {
        let outcome = self.matcher.match_text(ctx.text, &self.options);
        for record in &outcome.learned {
            tracing::info!(
                session_id = ctx.session_id,
                slot = %record.slot,
                value = %record.value,
                "Learned value during extraction"
            );
        }

        let mut matches = outcome.matches;
        if matches.is_empty() {
            matches.extend(self.free_text_answer(ctx));
        }
        StrategyOutput::from_matches(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::matcher;

    async fn run(text: &str, pending: &[String], learning: bool) -> StrategyOutput {
        let slots = HashMap::new();
        let ctx = ExtractionContext {
            text,
            session_id: "s1",
            current_slots: &slots,
            last_options: None,
            pending_slots: pending,
            unresolved_required: Vec::new(),
        };
        PatternStrategy::new(matcher(), learning)
            .extract(&ctx, &HashMap::new())
            .await
    }

    #[tokio::test]
    async fn test_free_text_answer_to_pending_question() {
        let pending = vec!["notes".to_string()];
        let output = run("要有背光鍵盤", &pending, false).await;
        assert_eq!(output.matches.len(), 1);
        assert_eq!(output.matches[0].slot, "notes");
        assert_eq!(output.matches[0].value, "要有背光鍵盤");
    }

    #[tokio::test]
    async fn test_no_free_text_without_pending_question() {
        assert!(run("要有背光鍵盤", &[], false).await.matches.is_empty());
    }

    #[tokio::test]
    async fn test_learning_flag_is_passed_through() {
        let output = run("我想要Framework的筆電", &[], true).await;
        assert_eq!(output.matches[0].slot, "brand");
        assert_eq!(output.matches[0].value, "framework");
    }
}
