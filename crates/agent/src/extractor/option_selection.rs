//! Replies to a multiple-choice question
//!
//! Accepts an ordinal ("2", "第二個", "選3") or the label of one offered
//! option. Only the options offered by the immediately preceding question
//! are considered.

use advisor_core::{ExtractionMethod, MatchResult, OfferedOptions, SlotOption};
use advisor_text_processing::canonical_query;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::{ExtractionContext, ExtractionStrategy, StrategyOutput};

const EXACT_CONFIDENCE: f32 = 0.95;
const CONTAINED_CONFIDENCE: f32 = 0.9;

static ORDINAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:我選|我要|選|要)?第?([0-9]{1,2}|[一二兩三四五六七八九十])(?:個|號|項|種|款)?(?:吧|好了|好|喔)?$")
        .unwrap()
});

fn parse_ordinal(canonical: &str) -> Option<usize> {
    let token = ORDINAL.captures(canonical)?.get(1)?.as_str();
    if let Ok(n) = token.parse::<usize>() {
        return Some(n);
    }
    match token {
        "一" => Some(1),
        "二" | "兩" => Some(2),
        "三" => Some(3),
        "四" => Some(4),
        "五" => Some(5),
        "六" => Some(6),
        "七" => Some(7),
        "八" => Some(8),
        "九" => Some(9),
        "十" => Some(10),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct OptionSelectionStrategy;

impl OptionSelectionStrategy {
    pub fn new() -> Self {
        Self
    }

    fn select<'a>(&self, canonical: &str, offered: &'a OfferedOptions) -> Option<(&'a SlotOption, f32)> {
        if let Some(n) = parse_ordinal(canonical) {
            return n
                .checked_sub(1)
                .and_then(|idx| offered.options.get(idx))
                .map(|option| (option, EXACT_CONFIDENCE));
        }

        let forms = |option: &SlotOption| [canonical_query(&option.label), canonical_query(&option.id)];

        if let Some(option) = offered
            .options
            .iter()
            .find(|option| forms(option).iter().any(|f| !f.is_empty() && f == canonical))
        {
            return Some((option, EXACT_CONFIDENCE));
        }

        let contained: Vec<&SlotOption> = offered
            .options
            .iter()
            .filter(|option| forms(option).iter().any(|f| !f.is_empty() && canonical.contains(f.as_str())))
            .collect();
        match contained.as_slice() {
            [only] => Some((*only, CONTAINED_CONFIDENCE)),
            _ => None,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for OptionSelectionStrategy {
    fn name(&self) -> &'static str {
        "option_selection"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::OptionSelection
    }

    async fn extract(
        &self,
        ctx: &ExtractionContext<'_>,
        _resolved: &HashMap<String, MatchResult>,
    ) -> StrategyOutput {
        let Some(offered) = ctx.last_options.filter(|o| !o.options.is_empty()) else {
            return StrategyOutput::default();
        };
        let canonical = canonical_query(ctx.text);
        if canonical.is_empty() {
            return StrategyOutput::default();
        }

        match self.select(&canonical, offered) {
            Some((option, confidence)) => {
                tracing::debug!(slot = %offered.slot, value = %option.id, confidence, "Option selected");
                StrategyOutput::from_matches(vec![MatchResult::new(
                    &offered.slot,
                    &option.id,
                    confidence,
                    ExtractionMethod::OptionSelection,
                )])
            },
            None => StrategyOutput::default(),
        }
    }
}
