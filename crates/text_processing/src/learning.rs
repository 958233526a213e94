//! Dynamic learning: spotting slot values the schema does not know yet
//!
//! Two signals propose a candidate for a learnable slot:
//! - a brand-like token, i.e. a capitalised Latin word ("Framework")
//! - a token right after one of the slot's indicator keywords
//!   ("品牌是微星" proposes "微星" for the slot announced by "品牌")
//!
//! A clause that waves the slot off ("牌子都可以") proposes nothing, and a
//! capitalised word opening an English sentence is ordinary capitalisation
//! unless an indicator announces the slot.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::normalize::{char_slice, find_keyword, is_ascii_word, normalize};
use crate::table::{PatternTable, SlotPatterns};

/// Capitalised words that are never values
const STOP_TOKENS: &[&str] = &[
    "i", "ok", "okay", "hi", "hello", "thanks", "please", "the", "cpu", "gpu", "ram", "ssd",
    "pc", "nb", "usb", "wifi", "recommend", "want", "need", "looking", "something", "anything",
    "just", "maybe", "any", "light", "cheap", "good", "best", "new", "my", "we", "you", "it",
];

/// Indifference and negation markers; a clause holding one names no value
const NON_VALUE_MARKERS: &[&str] = &[
    "都可以", "都行", "都好", "沒有", "沒差", "無所謂", "隨便", "特別", "任何", "不",
];

/// Particles trimmed from the end of a CJK candidate
const TRAILING_PARTICLES: &[char] = &['的', '吧', '啦', '喔', '哦', '呢', '嗎', '好', '了'];

static AFTER_INDICATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\s|是|用|要|選|偏好|喜歡|:|：)*([a-z][a-z0-9\-]+|\p{Han}{2,4})").unwrap()
});

/// A proposed (slot, value) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearningCandidate {
    pub slot: String,
    /// Canonical (lower-cased) value
    pub value: String,
    /// Char span of the token in the utterance
    pub start: usize,
    pub end: usize,
}

/// Minimal regex recognising a learned value
pub fn synthesize_pattern(value: &str) -> String {
    let escaped = regex::escape(value.trim());
    if is_ascii_word(value.trim()) {
        format!(r"\b{}\b", escaped)
    } else {
        escaped
    }
}

/// Propose candidates for learnable slots not in `filled`
///
/// `normalized` must be `normalize(original)`.
pub fn propose_candidates(
    original: &str,
    normalized: &str,
    table: &PatternTable,
    filled: &[&str],
) -> Vec<LearningCandidate> {
    let open: Vec<&SlotPatterns> = table
        .slots()
        .iter()
        .filter(|s| s.learnable && !filled.contains(&s.name.as_str()))
        .collect();
    if open.is_empty() {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    let mut declined: Vec<&str> = Vec::new();

    for slot in &open {
        for indicator in &slot.indicators {
            let Some((_, end)) = find_keyword(normalized, indicator) else {
                continue;
            };
            let rest = char_slice(normalized, end, usize::MAX);
            if declines_value(first_clause(&rest)) {
                declined.push(slot.name.as_str());
                break;
            }
            let Some(token) = AFTER_INDICATOR.captures(&rest).and_then(|c| c.get(1)) else {
                continue;
            };
            let value = token.as_str().trim_end_matches(TRAILING_PARTICLES).to_string();
            if value.chars().count() < 2 || declines_value(&value) || slot.knows_surface(&value) {
                continue;
            }
            let start = end + rest[..token.start()].chars().count();
            candidates.push(LearningCandidate {
                slot: slot.name.clone(),
                end: start + value.chars().count(),
                value,
                start,
            });
            break;
        }
    }

    // Brand-like tokens go to the slot whose indicator is present, else the
    // highest-priority open slot
    let indicated = open
        .iter()
        .find(|s| s.indicators.iter().any(|i| find_keyword(normalized, i).is_some()));
    let target = indicated.or_else(|| open.first());
    if let Some(slot) = target {
        let taken = candidates.iter().any(|c| c.slot == slot.name);
        if !taken && !declined.contains(&slot.name.as_str()) {
            if let Some(candidate) = brand_like_token(original, table, slot, indicated.is_some()) {
                candidates.push(candidate);
            }
        }
    }

    candidates
}

fn declines_value(text: &str) -> bool {
    NON_VALUE_MARKERS.iter().any(|m| text.contains(m))
}

fn first_clause(text: &str) -> &str {
    text.split(|c| matches!(c, ',' | '.' | '!' | '?' | ';' | '。' | '、'))
        .next()
        .unwrap_or("")
}

fn brand_like_token(
    original: &str,
    table: &PatternTable,
    slot: &SlotPatterns,
    indicated: bool,
) -> Option<LearningCandidate> {
    for (byte_start, word) in original.unicode_word_indices() {
        let mut chars = word.chars();
        let Some(first) = chars.next() else {
            continue;
        };
        if !first.is_ascii_uppercase() || word.len() < 2 || !is_ascii_word(word) {
            continue;
        }
        let value = normalize(word);
        if STOP_TOKENS.contains(&value.as_str()) || table.knows_surface_anywhere(&value) {
            continue;
        }
        let previous = original[..byte_start].trim_end().chars().next_back();
        let next = original[byte_start + word.len()..].chars().next();
        let embedded = previous.map_or(false, |c| !c.is_ascii()) || next.map_or(false, |c| !c.is_ascii());
        let sentence_start =
            previous.map_or(true, |c| matches!(c, '.' | '!' | '?' | '。' | '！' | '？'));
        if sentence_start && !embedded && !indicated {
            continue;
        }
        let start = original[..byte_start].chars().count();
        return Some(LearningCandidate {
            slot: slot.name.clone(),
            end: start + word.chars().count(),
            value,
            start,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::schema;

    fn propose(text: &str) -> Vec<LearningCandidate> {
        let table = PatternTable::build(&schema(), &[], 1);
        propose_candidates(text, &normalize(text), &table, &[])
    }

    #[test]
    fn test_brand_like_token() {
        let candidates = propose("我想要Framework的筆電");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].slot, "brand");
        assert_eq!(candidates[0].value, "framework");
        assert_eq!((candidates[0].start, candidates[0].end), (3, 12));
    }

    #[test]
    fn test_known_brand_not_proposed() {
        assert!(propose("我想要ASUS的筆電").is_empty());
        assert!(propose("I want something light").is_empty());
    }

    #[test]
    fn test_indicator_adjacent_token() {
        let candidates = propose("品牌是微星的");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].value, "微星");
        assert_eq!((candidates[0].start, candidates[0].end), (3, 5));
    }

    #[test]
    fn test_filled_slot_is_skipped() {
        let table = PatternTable::build(&schema(), &[], 1);
        let text = "Framework";
        assert!(propose_candidates(text, &normalize(text), &table, &["brand"]).is_empty());
    }

    #[test]
    fn test_indifferent_answers_propose_nothing() {
        for text in ["牌子都可以", "品牌沒有特別偏好", "品牌隨便", "牌子沒差啦", "品牌不挑"] {
            assert!(propose(text).is_empty(), "{}", text);
        }
    }

    #[test]
    fn test_sentence_initial_english_word_is_not_a_brand() {
        assert!(propose("Recommend a light one").is_empty());
        assert!(propose("Thin and light please").is_empty());
    }

    #[test]
    fn test_capitalised_word_mid_sentence() {
        let candidates = propose("I want a Framework laptop");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].value, "framework");
    }

    #[test]
    fn test_indicator_allows_sentence_initial_token() {
        let candidates = propose("Razer please, that is the 品牌");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].value, "razer");
    }

    #[test]
    fn test_synthesized_pattern() {
        assert_eq!(synthesize_pattern("framework"), r"\bframework\b");
        assert_eq!(synthesize_pattern("微星"), "微星");
        assert_eq!(synthesize_pattern("a.b"), r"a\.b");
    }
}
