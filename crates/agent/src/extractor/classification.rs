//! Classifier fallback for required slots nothing else resolved
//!
//! The classifier only names a slot. The value is then the allowed value
//! closest to the utterance, or the utterance itself for a free-text slot.
//! Classifier errors count as "no classification".

use advisor_config::SlotKind;
use advisor_core::{ExtractionMethod, MatchResult, SlotClassifier};
use advisor_text_processing::PatternMatcher;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::{ExtractionContext, ExtractionStrategy, StrategyOutput};

pub struct ClassificationStrategy {
    classifier: Arc<dyn SlotClassifier>,
    matcher: Arc<PatternMatcher>,
    /// Applied to the classifier's confidence
    weight: f32,
}

impl ClassificationStrategy {
    pub fn new(classifier: Arc<dyn SlotClassifier>, matcher: Arc<PatternMatcher>, weight: f32) -> Self {
        Self {
            classifier,
            matcher,
            weight: weight.clamp(0.0, 1.0),
        }
    }

    fn build_prompt(&self, text: &str, candidates: &[&String]) -> String {
        let schema = self.matcher.schema();
        let mut prompt = String::from("Which slot does the user message describe?\nSlots:\n");
        for name in candidates {
            let Some(def) = schema.get_slot(name) else {
                continue;
            };
            let values: Vec<String> = self.matcher.options(name).into_iter().map(|o| o.label).collect();
            prompt.push_str(&format!("- {}: {}", name, def.description));
            if !values.is_empty() {
                prompt.push_str(&format!(" (values: {})", values.join(", ")));
            }
            prompt.push('\n');
        }
        prompt.push_str(&format!("Message: {}", text));
        prompt
    }
}

#[async_trait]
impl ExtractionStrategy for ClassificationStrategy {
    fn name(&self) -> &'static str {
        "classification"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Classification
    }

    async fn extract(
        &self,
        ctx: &ExtractionContext<'_>,
        resolved: &HashMap<String, MatchResult>,
    ) -> StrategyOutput {
        let candidates: Vec<&String> = ctx
            .unresolved_required
            .iter()
            .filter(|slot| !resolved.contains_key(*slot))
            .collect();
        if candidates.is_empty() {
            return StrategyOutput::default();
        }

        let prompt = self.build_prompt(ctx.text, &candidates);
        let classification = match self.classifier.classify(&prompt).await {
            Ok(classification) => classification,
            Err(e) => {
                tracing::warn!(
                    classifier = self.classifier.name(),
                    error = %e,
                    "Classifier failed, continuing without it"
                );
                return StrategyOutput::default();
            },
        };

        let Some(slot) = classification.classified_slot else {
            return StrategyOutput::default();
        };
        if !candidates.iter().any(|c| **c == slot) {
            tracing::debug!(slot = %slot, "Classifier picked a slot that is not pending");
            return StrategyOutput::default();
        }

        let schema = self.matcher.schema();
        let is_text = schema
            .get_slot(&slot)
            .map_or(false, |def| def.kind == SlotKind::Text);
        let value = if is_text {
            Some(ctx.text.trim().to_string())
        } else {
            self.matcher.closest_value(&slot, ctx.text).map(|(value, _)| value)
        };
        let Some(value) = value else {
            tracing::debug!(slot = %slot, "No value close enough for classified slot");
            return StrategyOutput::default();
        };

        let confidence = classification.confidence.clamp(0.0, 1.0) * self.weight;
        if confidence < schema.validation_rules.min_confidence {
            return StrategyOutput::default();
        }

        StrategyOutput::from_matches(vec![MatchResult::new(
            slot,
            value,
            confidence,
            ExtractionMethod::Classification,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::matcher;
    use advisor_core::Classification;

    struct StubClassifier(advisor_core::Result<Classification>);

    #[async_trait]
    impl SlotClassifier for StubClassifier {
        async fn classify(&self, _prompt: &str) -> advisor_core::Result<Classification> {
            match &self.0 {
                Ok(c) => Ok(c.clone()),
                Err(e) => Err(advisor_core::Error::Classifier(e.to_string())),
            }
        }
    }

    fn picks(slot: Option<&str>, confidence: f32) -> Arc<dyn SlotClassifier> {
        Arc::new(StubClassifier(Ok(Classification {
            classified_slot: slot.map(str::to_string),
            confidence,
        })))
    }

    async fn run(classifier: Arc<dyn SlotClassifier>, text: &str, resolved: &HashMap<String, MatchResult>) -> StrategyOutput {
        let slots = HashMap::new();
        let ctx = ExtractionContext {
            text,
            session_id: "s1",
            current_slots: &slots,
            last_options: None,
            pending_slots: &[],
            unresolved_required: vec!["usage_purpose".to_string(), "budget_range".to_string()],
        };
        ClassificationStrategy::new(classifier, matcher(), 0.8)
            .extract(&ctx, resolved)
            .await
    }

    #[tokio::test]
    async fn test_weighted_confidence() {
        let output = run(picks(Some("usage_purpose"), 0.9), "打電", &HashMap::new()).await;
        let m = &output.matches[0];
        assert_eq!(m.value, "gaming");
        assert!((m.confidence - 0.72).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_errors_degrade_to_nothing() {
        let failing: Arc<dyn SlotClassifier> =
            Arc::new(StubClassifier(Err(advisor_core::Error::Classifier("down".to_string()))));
        assert!(run(failing, "打電", &HashMap::new()).await.is_empty());
        assert!(run(picks(None, 0.9), "打電", &HashMap::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_skipped_when_everything_resolved() {
        let mut resolved = HashMap::new();
        for slot in ["usage_purpose", "budget_range"] {
            resolved.insert(
                slot.to_string(),
                MatchResult::new(slot, "x", 0.9, ExtractionMethod::PatternMatch),
            );
        }
        assert!(run(picks(Some("usage_purpose"), 0.9), "打電", &resolved).await.is_empty());
    }

    #[tokio::test]
    async fn test_slot_not_pending_is_ignored() {
        assert!(run(picks(Some("brand"), 0.9), "打電", &HashMap::new()).await.is_empty());
    }
}
