//! Slot Schema Configuration
//!
//! The slot schema is the single source of truth for what the advisor
//! collects: which slots exist, which values each slot may take, how values
//! are recognised in text, how slots influence each other, and how the
//! dialogue falls back when the user does not answer.
//!
//! A schema file carries six top-level sections, all mandatory:
//! `metadata`, `slots`, `collection_strategy`, `dependencies`,
//! `validation_rules` and `fallback_strategy`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::validator::SchemaValidator;
use crate::ConfigError;

/// Top-level sections every schema file must declare
pub const REQUIRED_SECTIONS: [&str; 6] = [
    "metadata",
    "slots",
    "collection_strategy",
    "dependencies",
    "validation_rules",
    "fallback_strategy",
];

/// Wildcard accepted by [`ConditionalRule::when`]
pub const ANY_VALUE: &str = "*";

/// Slot schema loaded from `config/slots/*.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub metadata: SchemaMetadata,
    /// Slot definitions keyed by slot name
    pub slots: HashMap<String, SlotDefinition>,
    pub collection_strategy: CollectionStrategy,
    /// Dependency rules keyed by source slot
    pub dependencies: HashMap<String, DependencyDefinition>,
    pub validation_rules: ValidationRules,
    pub fallback_strategy: FallbackStrategy,
    /// Compiled `validation` regexes of text slots
    #[serde(skip)]
    text_validators: HashMap<String, Regex>,
}

impl SchemaConfig {
    /// Load and validate a schema file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::FileNotFound(path.as_ref().display().to_string(), e.to_string())
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate a schema from YAML text
    ///
    /// Fails on missing sections and on any critical validation finding;
    /// non-critical findings are logged.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let schema = Self::parse(content)?;
        let result = SchemaValidator::new().validate(&schema);

        for finding in &result.errors {
            if finding.severity < crate::ValidationSeverity::Critical {
                tracing::warn!(finding = %finding, "Slot schema finding");
            }
        }

        if !result.is_ok() {
            let details: Vec<String> = result
                .critical_errors()
                .iter()
                .map(|e| e.to_string())
                .collect();
            return Err(ConfigError::Validation(format!(
                "{}; {}",
                result.summary(),
                details.join("; ")
            )));
        }

        tracing::info!(
            schema = %schema.metadata.name,
            version = %schema.metadata.version,
            slots = schema.slots.len(),
            "Loaded slot schema"
        );
        Ok(schema)
    }

    /// Parse YAML, checking only that every section is present
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let value: serde_yaml::Value = serde_yaml::from_str(content)?;
        let root = value
            .as_mapping()
            .ok_or_else(|| ConfigError::ParseError("schema root must be a mapping".to_string()))?;

        for section in REQUIRED_SECTIONS {
            if !root.contains_key(section) {
                return Err(ConfigError::MissingSection(section.to_string()));
            }
        }

        let mut schema: Self = serde_yaml::from_value(value)?;
        schema.compile_text_validators();
        Ok(schema)
    }

    /// Invalid patterns are left out; the validator reports them
    fn compile_text_validators(&mut self) {
        self.text_validators = self
            .slots
            .iter()
            .filter_map(|(name, def)| {
                let pattern = def.validation.as_deref()?;
                Regex::new(pattern).ok().map(|re| (name.clone(), re))
            })
            .collect();
    }

    /// Get a slot definition by name
    pub fn get_slot(&self, name: &str) -> Option<&SlotDefinition> {
        self.slots.get(name)
    }

    /// Slots ordered by priority, then name
    pub fn slots_by_priority(&self) -> Vec<(&str, &SlotDefinition)> {
        let mut slots: Vec<(&str, &SlotDefinition)> = self
            .slots
            .iter()
            .map(|(name, def)| (name.as_str(), def))
            .collect();
        slots.sort_by(|a, b| a.1.priority.cmp(&b.1.priority).then_with(|| a.0.cmp(b.0)));
        slots
    }

    /// Names of slots flagged as required, in priority order
    pub fn required_slots(&self) -> Vec<&str> {
        self.slots_by_priority()
            .into_iter()
            .filter(|(_, def)| def.required)
            .map(|(name, _)| name)
            .collect()
    }

    /// Dependency rules whose source is `slot`
    pub fn dependency_for(&self, slot: &str) -> Option<&DependencyDefinition> {
        self.dependencies.get(slot)
    }

    /// Whether `value` is an acceptable value for `slot`
    pub fn is_allowed_value(&self, slot: &str, value: &str) -> bool {
        let Some(def) = self.slots.get(slot) else {
            return false;
        };

        match def.kind {
            SlotKind::Enum | SlotKind::NumericRange => def.allowed_value(value).is_some(),
            SlotKind::Text => {
                let trimmed = value.trim();
                if trimmed.is_empty()
                    || trimmed.chars().count() > self.validation_rules.max_text_length
                {
                    return false;
                }
                match &def.validation {
                    Some(_) => self
                        .text_validators
                        .get(slot)
                        .map_or(false, |re| re.is_match(trimmed)),
                    None => true,
                }
            },
        }
    }
}

/// Descriptive header of a schema file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub description: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Definition for a single slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDefinition {
    /// Semantic type: enum, text, numeric_range
    #[serde(rename = "type")]
    pub kind: SlotKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    /// Lower is asked earlier
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub default: Option<String>,
    /// Question used to elicit the slot
    #[serde(default)]
    pub prompt: Option<String>,
    /// Offer the allowed values as numbered options in the prompt
    #[serde(default)]
    pub options_in_prompt: bool,
    /// Allowed values (enum and numeric_range slots)
    #[serde(default)]
    pub values: Vec<AllowedValue>,
    /// Extra surface forms mapped to allowed-value ids
    #[serde(default)]
    pub synonyms: HashMap<String, String>,
    /// Words that announce the slot, e.g. "品牌" for brand
    #[serde(default)]
    pub indicator_keywords: Vec<String>,
    /// Dynamic learning may add values to this slot
    #[serde(default)]
    pub learnable: bool,
    /// Validation regex for text slots
    #[serde(default)]
    pub validation: Option<String>,
}

fn default_priority() -> u32 {
    100
}

impl SlotDefinition {
    /// Look up an allowed value by id (case-insensitive)
    pub fn allowed_value(&self, id: &str) -> Option<&AllowedValue> {
        self.values.iter().find(|v| v.id.eq_ignore_ascii_case(id))
    }

    pub fn value_ids(&self) -> Vec<&str> {
        self.values.iter().map(|v| v.id.as_str()).collect()
    }

    /// Display label for a value, falling back to the id itself
    pub fn display_for<'a>(&'a self, id: &'a str) -> &'a str {
        self.allowed_value(id)
            .map(|v| v.display.as_str())
            .unwrap_or(id)
    }

    /// Whether the slot has a closed set of values
    pub fn is_closed(&self) -> bool {
        !matches!(self.kind, SlotKind::Text)
    }
}

/// Slot semantic type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Enum,
    Text,
    NumericRange,
}

/// One allowed value of a slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowedValue {
    /// Canonical identifier
    pub id: String,
    /// Display name
    pub display: String,
    /// Keywords matched by containment
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Regular expressions
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Example phrases for similarity scoring
    #[serde(default)]
    pub examples: Vec<String>,
    /// Inclusive lower bound (numeric_range)
    #[serde(default)]
    pub min: Option<f64>,
    /// Inclusive upper bound (numeric_range)
    #[serde(default)]
    pub max: Option<f64>,
}

impl AllowedValue {
    /// Whether a number falls into this bucket; open ends are unbounded
    pub fn contains(&self, n: f64) -> bool {
        self.min.map_or(true, |min| n >= min) && self.max.map_or(true, |max| n <= max)
    }
}

/// How the dialogue walks the required slots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStrategy {
    #[serde(default)]
    pub mode: CollectionMode,
    /// Slots asked together in batch mode
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// User turns before the dialogue forces a search
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Times a slot may be asked before its default is used
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_slot: u32,
    /// Summarise collected slots before searching
    #[serde(default)]
    pub require_confirmation: bool,
}

fn default_batch_size() -> usize {
    2
}

fn default_max_turns() -> u32 {
    10
}

fn default_max_attempts() -> u32 {
    2
}

impl Default for CollectionStrategy {
    fn default() -> Self {
        Self {
            mode: CollectionMode::default(),
            batch_size: default_batch_size(),
            max_turns: default_max_turns(),
            max_attempts_per_slot: default_max_attempts(),
            require_confirmation: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    /// One slot per question, highest priority first
    #[default]
    Priority,
    /// Up to `batch_size` slots per question
    Batch,
}

/// Rules attached to one source slot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyDefinition {
    /// Slots this source may affect
    #[serde(default)]
    pub influences: Vec<String>,
    #[serde(default)]
    pub rules: Vec<ConditionalRule>,
}

/// Effects applied when the source slot takes a given value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionalRule {
    /// Source value the rule fires on, or `*`
    pub when: String,
    /// Values implied for other slots
    #[serde(default)]
    pub set: BTreeMap<String, String>,
    /// Soft defaults
    #[serde(default)]
    pub suggest: BTreeMap<String, String>,
    /// Restricted value sets
    #[serde(default)]
    pub narrow: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub require: Vec<String>,
    #[serde(default)]
    pub make_optional: Vec<String>,
}

impl ConditionalRule {
    pub fn fires_on(&self, value: &str) -> bool {
        self.when == ANY_VALUE || self.when.eq_ignore_ascii_case(value)
    }

    /// Every slot name the rule touches
    pub fn targets(&self) -> impl Iterator<Item = &String> {
        self.set
            .keys()
            .chain(self.suggest.keys())
            .chain(self.narrow.keys())
            .chain(self.require.iter())
            .chain(self.make_optional.iter())
    }
}

/// Thresholds applied to extracted values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Matches below this confidence are discarded
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// Runner-up values within this margin make a match ambiguous
    #[serde(default = "default_ambiguity_margin")]
    pub ambiguity_margin: f32,
    /// A filled slot is overwritten only by a value this much more confident
    #[serde(default = "default_overwrite_margin")]
    pub overwrite_margin: f32,
    /// Longest accepted free-text value, in chars
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
    /// Phrases marking a correction ("不對", "其實"); with one present a
    /// value only has to match the stored confidence to replace it
    #[serde(default = "default_correction_markers")]
    pub correction_markers: Vec<String>,
}

impl ValidationRules {
    pub fn is_correction(&self, text: &str) -> bool {
        self.correction_markers
            .iter()
            .any(|marker| !marker.is_empty() && text.contains(marker.as_str()))
    }
}

fn default_min_confidence() -> f32 {
    0.3
}

fn default_ambiguity_margin() -> f32 {
    0.05
}

fn default_overwrite_margin() -> f32 {
    0.1
}

fn default_max_text_length() -> usize {
    64
}

fn default_correction_markers() -> Vec<String> {
    ["不對", "其實", "改成", "換成", "應該是"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            ambiguity_margin: default_ambiguity_margin(),
            overwrite_margin: default_overwrite_margin(),
            max_text_length: default_max_text_length(),
            correction_markers: default_correction_markers(),
        }
    }
}

/// What happens when elicitation gives up on a slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackStrategy {
    /// Fill remaining required slots from suggestions and defaults
    #[serde(default = "default_true")]
    pub use_defaults: bool,
    #[serde(default)]
    pub missing_slot_policy: MissingSlotPolicy,
    /// Question asked when nothing useful could be extracted
    #[serde(default = "default_generic_question")]
    pub generic_question: String,
    /// Clarification template; `{options}` is replaced by the candidates
    #[serde(default = "default_clarify_template")]
    pub clarify_template: String,
    /// Confirmation template; `{summary}` is replaced by the collected slots
    #[serde(default = "default_confirmation_template")]
    pub confirmation_template: String,
}

fn default_true() -> bool {
    true
}

fn default_generic_question() -> String {
    "可以再多告訴我一些您的需求嗎？".to_string()
}

fn default_clarify_template() -> String {
    "請問您指的是：{options}？".to_string()
}

fn default_confirmation_template() -> String {
    "幫您確認一下：{summary}。我這就開始搜尋。".to_string()
}

impl Default for FallbackStrategy {
    fn default() -> Self {
        Self {
            use_defaults: true,
            missing_slot_policy: MissingSlotPolicy::default(),
            generic_question: default_generic_question(),
            clarify_template: default_clarify_template(),
            confirmation_template: default_confirmation_template(),
        }
    }
}

/// Handling of a required slot that has neither value nor default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingSlotPolicy {
    /// Leave the slot out of the search request
    #[default]
    Drop,
    /// Send the slot with an empty value
    KeepEmpty,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const LAPTOP_SCHEMA: &str = r#"
metadata:
  name: laptop
  version: "2.1"
  language: zh-TW
slots:
  usage_purpose:
    type: enum
    description: Main use of the laptop
    required: true
    priority: 1
    prompt: 請問您主要用途是什麼？
    options_in_prompt: true
    default: office
    values:
      - id: gaming
        display: 遊戲
        keywords: [遊戲, 電競, gaming]
        patterns: ["玩.{0,4}(game|遊戲)"]
        examples: [想打遊戲]
      - id: office
        display: 文書處理
        keywords: [文書處理, 文書, 上班]
    synonyms:
      打電動: gaming
  budget_range:
    type: numeric_range
    description: Budget in TWD
    required: true
    priority: 2
    prompt: 預算大概多少？
    values:
      - { id: under_30k, display: 3萬以下, max: 29999 }
      - { id: 30k_40k, display: 3-4萬, min: 30000, max: 40000 }
      - { id: over_40k, display: 4萬以上, min: 40001 }
  gpu_level:
    type: enum
    description: Graphics tier
    priority: 5
    values:
      - { id: integrated, display: 內顯 }
      - { id: dedicated, display: 獨顯 }
  notes:
    type: text
    description: Anything else
    priority: 9
    validation: "^[^<>]+$"
collection_strategy:
  mode: priority
  max_turns: 6
  max_attempts_per_slot: 2
dependencies:
  usage_purpose:
    influences: [gpu_level]
    rules:
      - when: gaming
        require: [gpu_level]
        suggest: { gpu_level: dedicated }
      - when: office
        set: { gpu_level: integrated }
validation_rules:
  min_confidence: 0.3
fallback_strategy:
  use_defaults: true
"#;

    #[test]
    fn test_parse_laptop_schema() {
        let schema = SchemaConfig::from_yaml_str(LAPTOP_SCHEMA).unwrap();
        assert_eq!(schema.metadata.version, "2.1");
        assert_eq!(schema.slots.len(), 4);
        assert_eq!(schema.required_slots(), vec!["usage_purpose", "budget_range"]);
        assert_eq!(schema.collection_strategy.max_turns, 6);
        assert_eq!(schema.validation_rules.overwrite_margin, 0.1);
    }

    #[test]
    fn test_missing_section_fails_fast() {
        let without_fallback = LAPTOP_SCHEMA.replace("fallback_strategy:\n  use_defaults: true\n", "");
        let err = SchemaConfig::from_yaml_str(&without_fallback).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection(ref s) if s == "fallback_strategy"));
    }

    #[test]
    fn test_slots_by_priority() {
        let schema = SchemaConfig::parse(LAPTOP_SCHEMA).unwrap();
        let order: Vec<&str> = schema.slots_by_priority().into_iter().map(|(n, _)| n).collect();
        assert_eq!(order, vec!["usage_purpose", "budget_range", "gpu_level", "notes"]);
    }

    #[test]
    fn test_allowed_value_membership() {
        let schema = SchemaConfig::parse(LAPTOP_SCHEMA).unwrap();
        assert!(schema.is_allowed_value("usage_purpose", "gaming"));
        assert!(!schema.is_allowed_value("usage_purpose", "cooking"));
        assert!(schema.is_allowed_value("budget_range", "30k_40k"));
        assert!(schema.is_allowed_value("notes", "需要背光鍵盤"));
        assert!(!schema.is_allowed_value("notes", "<script>"));
        assert!(!schema.is_allowed_value("unknown", "x"));
        assert_eq!(schema.text_validators.len(), 1);
    }

    #[test]
    fn test_correction_markers() {
        let schema = SchemaConfig::parse(LAPTOP_SCHEMA).unwrap();
        let rules = &schema.validation_rules;
        assert!(rules.is_correction("不對，我要遊戲的"));
        assert!(rules.is_correction("其實是寫程式"));
        assert!(!rules.is_correction("遊戲"));

        let custom: ValidationRules = serde_yaml::from_str("correction_markers: [改口]").unwrap();
        assert!(custom.is_correction("我改口"));
        assert!(!custom.is_correction("不對"));
        assert_eq!(custom.overwrite_margin, 0.1);
    }

    #[test]
    fn test_bucket_contains() {
        let schema = SchemaConfig::parse(LAPTOP_SCHEMA).unwrap();
        let budget = schema.get_slot("budget_range").unwrap();
        assert!(budget.allowed_value("30k_40k").unwrap().contains(35000.0));
        assert!(budget.allowed_value("under_30k").unwrap().contains(0.0));
        assert!(budget.allowed_value("over_40k").unwrap().contains(1e6));
        assert!(!budget.allowed_value("over_40k").unwrap().contains(40000.0));
    }

    #[test]
    fn test_rule_wildcard() {
        let rule = ConditionalRule {
            when: ANY_VALUE.to_string(),
            ..Default::default()
        };
        assert!(rule.fires_on("anything"));
    }
}
