//! Numeric range parsing for budget-like slots
//!
//! Recognises amounts with CJK and Latin magnitude suffixes in normalised
//! text: "3-4萬", "30000到40000", "35k", "4萬以下", "至少5萬", "3萬5".
//!
//! ## Optimization: Static Regex Patterns
//!
//! Patterns are compiled once using `once_cell::sync::Lazy`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::normalize::char_offset;

/// Bare numbers below this are not treated as amounts ("i7", "4060")
const BARE_AMOUNT_FLOOR: f64 = 10_000.0;

/// Range ends below this need an explicit unit
const RANGE_AMOUNT_FLOOR: f64 = 1_000.0;

static RANGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(萬|万|千|k|w)?\s*(?:-|~|到|至)\s*(\d+(?:\.\d+)?)\s*(萬|万|千|k|w)?")
        .unwrap()
});

static UPPER_BOUND_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:不要超過|不超過|低於|少於|最多|頂多|under|below|less than|within)\s*(\d+(?:\.\d+)?)\s*(萬|万|千|k|w)?")
        .unwrap()
});

static LOWER_BOUND_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:超過|高於|至少|最少|over|above|more than)\s*(\d+(?:\.\d+)?)\s*(萬|万|千|k|w)?")
        .unwrap()
});

static SINGLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(萬|万|千|k|w)?(\d)?\s*(?:元|塊)?\s*(以下|以內|之內|內|以上|起跳|左右|上下)?")
        .unwrap()
});

/// A parsed amount or amount range
#[derive(Debug, Clone, PartialEq)]
pub struct NumericRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub confidence: f32,
    /// Char span in the normalised text
    pub start: usize,
    pub end: usize,
}

impl NumericRange {
    /// Value used to pick a bucket: the midpoint of a closed range,
    /// otherwise the single known bound
    pub fn representative(&self) -> Option<f64> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Some((min + max) / 2.0),
            (Some(min), None) => Some(min),
            (None, Some(max)) => Some(max),
            (None, None) => None,
        }
    }
}

fn multiplier(unit: Option<&str>) -> Option<f64> {
    match unit? {
        "萬" | "万" | "w" => Some(10_000.0),
        "千" | "k" => Some(1_000.0),
        _ => None,
    }
}

fn number(caps: &Captures<'_>, idx: usize) -> Option<f64> {
    caps.get(idx)?.as_str().parse().ok()
}

/// Matches glued to a preceding Latin letter are model numbers, not amounts
fn preceded_by_letter(text: &str, byte_start: usize) -> bool {
    text[..byte_start]
        .chars()
        .next_back()
        .map_or(false, |c| c.is_ascii_alphabetic())
}

fn span(text: &str, caps: &Captures<'_>) -> (usize, usize) {
    caps.get(0)
        .map(|m| (char_offset(text, m.start()), char_offset(text, m.end())))
        .unwrap_or((0, 0))
}

/// Parse the first amount or range in normalised text
pub fn parse_range(text: &str) -> Option<NumericRange> {
    parse_closed_range(text)
        .or_else(|| parse_bound(text, &UPPER_BOUND_PATTERN, true))
        .or_else(|| parse_bound(text, &LOWER_BOUND_PATTERN, false))
        .or_else(|| parse_single(text))
}

fn parse_closed_range(text: &str) -> Option<NumericRange> {
    for caps in RANGE_PATTERN.captures_iter(text) {
        let whole = caps.get(0)?;
        if preceded_by_letter(text, whole.start()) {
            continue;
        }
        let (Some(a), Some(b)) = (number(&caps, 1), number(&caps, 3)) else {
            continue;
        };
        let unit_b = multiplier(caps.get(4).map(|m| m.as_str()));
        // "3-4萬": the trailing unit applies to both ends
        let unit_a = multiplier(caps.get(2).map(|m| m.as_str())).or(unit_b);
        let has_unit = unit_a.is_some() || unit_b.is_some();

        let lo = a * unit_a.unwrap_or(1.0);
        let hi = b * unit_b.unwrap_or(1.0);
        if !has_unit && lo.min(hi) < RANGE_AMOUNT_FLOOR {
            continue;
        }

        let (start, end) = span(text, &caps);
        return Some(NumericRange {
            min: Some(lo.min(hi)),
            max: Some(lo.max(hi)),
            confidence: 0.9,
            start,
            end,
        });
    }
    None
}

fn parse_bound(text: &str, pattern: &Regex, upper: bool) -> Option<NumericRange> {
    let caps = pattern.captures(text)?;
    let amount = number(&caps, 1)?;
    let unit = multiplier(caps.get(2).map(|m| m.as_str()));
    let value = amount * unit.unwrap_or(1.0);
    if unit.is_none() && value < RANGE_AMOUNT_FLOOR {
        return None;
    }

    let (start, end) = span(text, &caps);
    let (min, max) = if upper { (None, Some(value)) } else { (Some(value), None) };
    Some(NumericRange {
        min,
        max,
        confidence: 0.85,
        start,
        end,
    })
}

fn parse_single(text: &str) -> Option<NumericRange> {
    for caps in SINGLE_PATTERN.captures_iter(text) {
        let whole = caps.get(0)?;
        if preceded_by_letter(text, whole.start()) {
            continue;
        }
        let Some(amount) = number(&caps, 1) else {
            continue;
        };
        let unit = multiplier(caps.get(2).map(|m| m.as_str()));
        let mut value = amount * unit.unwrap_or(1.0);

        // "3萬5" means 35,000
        if unit == Some(10_000.0) {
            if let Some(extra) = number(&caps, 3) {
                value += extra * 1_000.0;
            }
        }

        let qualifier = caps.get(4).map(|m| m.as_str());
        if unit.is_none() && qualifier.is_none() && value < BARE_AMOUNT_FLOOR {
            continue;
        }

        let (min, max) = match qualifier {
            Some("以下" | "以內" | "之內" | "內") => (None, Some(value)),
            Some("以上" | "起跳") => (Some(value), None),
            _ => (Some(value), Some(value)),
        };
        let confidence = if unit.is_some() || qualifier.is_some() {
            0.85
        } else {
            0.75
        };

        let (start, end) = span(text, &caps);
        return Some(NumericRange {
            min,
            max,
            confidence,
            start,
            end,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn midpoint(text: &str) -> Option<f64> {
        parse_range(text).and_then(|r| r.representative())
    }

    #[test]
    fn test_cjk_range_with_shared_unit() {
        let range = parse_range("3-4萬").unwrap();
        assert_eq!(range.min, Some(30_000.0));
        assert_eq!(range.max, Some(40_000.0));
        assert_eq!(range.representative(), Some(35_000.0));
        assert_eq!((range.start, range.end), (0, 4));
    }

    #[test]
    fn test_plain_range() {
        assert_eq!(midpoint("預算30000到40000"), Some(35_000.0));
        assert_eq!(midpoint("2萬~3萬"), Some(25_000.0));
    }

    #[test]
    fn test_latin_suffix() {
        assert_eq!(midpoint("about 35k"), Some(35_000.0));
    }

    #[test]
    fn test_qualified_bounds() {
        let range = parse_range("4萬以下").unwrap();
        assert_eq!(range.min, None);
        assert_eq!(range.max, Some(40_000.0));

        let range = parse_range("至少5萬").unwrap();
        assert_eq!(range.min, Some(50_000.0));
        assert_eq!(range.max, None);
    }

    #[test]
    fn test_compound_wan() {
        assert_eq!(midpoint("3萬5左右"), Some(35_000.0));
    }

    #[test]
    fn test_model_numbers_are_not_amounts() {
        assert_eq!(parse_range("rtx 4060"), None);
        assert_eq!(parse_range("i5-1235u"), None);
        assert_eq!(parse_range("我要2台"), None);
    }
}
