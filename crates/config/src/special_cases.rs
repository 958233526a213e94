//! Special-case catalogue
//!
//! Pre-authored handling for meta requests ("just recommend something"),
//! vague answers and other utterances the slot patterns cannot resolve.
//! Each case carries example phrasings, a similarity threshold, the slots
//! it implies and a directive for the dialogue.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::schema::SchemaConfig;
use crate::ConfigError;

/// Id of the built-in loop breaker
pub const LOOP_BREAKER_ID: &str = "loop_breaker";

/// Catalogue loaded from `config/special_cases.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialCasesConfig {
    /// Consecutive identical matches tolerated before the loop breaker fires
    #[serde(default = "default_repeat_threshold")]
    pub repeat_threshold: u32,
    /// Normalized-query hashes remembered per session
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default)]
    pub cases: Vec<SpecialCaseDefinition>,
    /// Replaces the built-in loop breaker when present
    #[serde(default)]
    pub loop_breaker: Option<SpecialCaseDefinition>,
}

fn default_repeat_threshold() -> u32 {
    2
}

fn default_history_window() -> usize {
    8
}

impl Default for SpecialCasesConfig {
    fn default() -> Self {
        Self {
            repeat_threshold: default_repeat_threshold(),
            history_window: default_history_window(),
            cases: Vec::new(),
            loop_breaker: None,
        }
    }
}

impl SpecialCasesConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::FileNotFound(path.as_ref().display().to_string(), e.to_string())
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate_structure()?;
        Ok(config)
    }

    fn validate_structure(&self) -> Result<(), ConfigError> {
        if self.repeat_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "repeat_threshold".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }
        if self.history_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "history_window".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        let mut ids = HashSet::new();
        for case in self.cases.iter().chain(self.loop_breaker.iter()) {
            if !ids.insert(case.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("cases.{}", case.id),
                    message: "Duplicate case id".to_string(),
                });
            }
            if !(0.0..=1.0).contains(&case.threshold) {
                return Err(ConfigError::InvalidValue {
                    field: format!("cases.{}.threshold", case.id),
                    message: format!("Must be between 0.0 and 1.0, got {}", case.threshold),
                });
            }
        }

        if let Some(case) = self.cases.iter().find(|c| c.examples.is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: format!("cases.{}.examples", case.id),
                message: "Case needs at least one example".to_string(),
            });
        }
        Ok(())
    }

    /// Check that every inferred slot exists and holds an allowed value
    pub fn validate_against(&self, schema: &SchemaConfig) -> Result<(), ConfigError> {
        for case in self.cases.iter().chain(self.loop_breaker.iter()) {
            for (slot, value) in &case.inferred_slots {
                if schema.get_slot(slot).is_none() {
                    return Err(ConfigError::InvalidValue {
                        field: format!("cases.{}.inferred_slots", case.id),
                        message: format!("Unknown slot '{}'", slot),
                    });
                }
                if !schema.is_allowed_value(slot, value) {
                    return Err(ConfigError::InvalidValue {
                        field: format!("cases.{}.inferred_slots", case.id),
                        message: format!("'{}' is not an allowed value of '{}'", value, slot),
                    });
                }
            }
        }
        Ok(())
    }

    /// The configured loop breaker, or the built-in one
    pub fn loop_breaker_case(&self) -> SpecialCaseDefinition {
        self.loop_breaker
            .clone()
            .unwrap_or_else(SpecialCaseDefinition::builtin_loop_breaker)
    }
}

/// One pre-authored case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialCaseDefinition {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Phrasings the case is matched against
    #[serde(default)]
    pub examples: Vec<String>,
    /// Minimum similarity for a match
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Slot values implied by the case
    #[serde(default)]
    pub inferred_slots: BTreeMap<String, String>,
    #[serde(default)]
    pub directive: ResponseDirective,
}

fn default_threshold() -> f32 {
    0.6
}

impl SpecialCaseDefinition {
    /// Search with whatever has been collected
    pub fn builtin_loop_breaker() -> Self {
        Self {
            id: LOOP_BREAKER_ID.to_string(),
            description: "Stop repeating and search with defaults".to_string(),
            examples: Vec::new(),
            threshold: 1.0,
            inferred_slots: BTreeMap::new(),
            directive: ResponseDirective {
                response: Some("我先用目前的條件幫您找幾款合適的筆電。".to_string()),
                skip_next_question: true,
                force_search: true,
                clarify: false,
            },
        }
    }
}

/// How the dialogue should react to a matched case
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseDirective {
    /// Canned reply shown before the next question
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub skip_next_question: bool,
    /// Search now, filling gaps with defaults
    #[serde(default)]
    pub force_search: bool,
    /// Ask the user to rephrase or choose
    #[serde(default)]
    pub clarify: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::LAPTOP_SCHEMA;

    const CASES: &str = r#"
repeat_threshold: 2
cases:
  - id: just_recommend
    examples: [隨便推薦就好, 你幫我選]
    threshold: 0.55
    directive:
      response: 好的，我幫您挑熱門款。
      force_search: true
  - id: student
    examples: [我是學生預算不多]
    inferred_slots: { budget_range: under_30k }
"#;

    #[test]
    fn test_parse_catalogue() {
        let config = SpecialCasesConfig::from_yaml_str(CASES).unwrap();
        assert_eq!(config.cases.len(), 2);
        assert_eq!(config.history_window, 8);
        assert!(config.cases[0].directive.force_search);
        assert_eq!(config.cases[1].threshold, 0.6);
        assert_eq!(config.loop_breaker_case().id, LOOP_BREAKER_ID);
    }

    #[test]
    fn test_validate_against_schema() {
        let schema = SchemaConfig::parse(LAPTOP_SCHEMA).unwrap();
        let config = SpecialCasesConfig::from_yaml_str(CASES).unwrap();
        assert!(config.validate_against(&schema).is_ok());

        let bad = CASES.replace("budget_range: under_30k", "budget_range: free");
        let config = SpecialCasesConfig::from_yaml_str(&bad).unwrap();
        assert!(config.validate_against(&schema).is_err());
    }

    #[test]
    fn test_case_without_examples_rejected() {
        let yaml = "cases:\n  - id: empty\n    threshold: 0.5\n";
        assert!(SpecialCasesConfig::from_yaml_str(yaml).is_err());
    }
}
