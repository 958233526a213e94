//! Schema validator
//!
//! Validates a slot schema at startup to catch errors early.
//! Performs:
//! - Slot completeness checks (values, buckets, prompts)
//! - Allowed-value integrity (duplicates, defaults, synonym targets)
//! - Dependency cross-references and cycle detection
//! - Threshold range checks
//!
//! Critical findings make [`SchemaConfig::from_yaml_str`] fail; regex
//! problems are reported as errors only, since the matcher skips broken
//! patterns at match time.

use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::schema::{SchemaConfig, SlotDefinition, SlotKind, ANY_VALUE};

/// Validation finding with context
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub category: ValidationCategory,
    /// Config section the finding belongs to
    pub source: String,
    /// Specific slot or reference
    pub field: Option<String>,
    pub message: String,
    pub severity: ValidationSeverity,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let field_str = self.field.as_deref().unwrap_or("(root)");
        write!(
            f,
            "[{:?}] {}/{}: {}",
            self.severity, self.source, field_str, self.message
        )
    }
}

impl std::error::Error for ValidationError {}

/// Category of validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationCategory {
    MissingRequired,
    InvalidReference,
    ValueOutOfRange,
    Duplicate,
    /// Synonym or default pointing outside the allowed set
    DataIntegrity,
    InvalidPattern,
    Cycle,
    Unused,
}

/// Severity of validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationSeverity {
    /// Informational warning
    Warning,
    /// Potential issue
    Error,
    /// Critical - will prevent startup
    Critical,
}

/// Validation result
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    /// Schema name being validated
    pub schema: String,
}

impl ValidationResult {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            errors: Vec::new(),
            schema: schema.into(),
        }
    }

    fn push(
        &mut self,
        category: ValidationCategory,
        severity: ValidationSeverity,
        source: &str,
        field: Option<&str>,
        message: impl Into<String>,
    ) {
        self.errors.push(ValidationError {
            category,
            source: source.to_string(),
            field: field.map(str::to_string),
            message: message.into(),
            severity,
        });
    }

    pub fn add_critical(
        &mut self,
        category: ValidationCategory,
        source: &str,
        field: Option<&str>,
        message: impl Into<String>,
    ) {
        self.push(category, ValidationSeverity::Critical, source, field, message);
    }

    pub fn add_error(
        &mut self,
        category: ValidationCategory,
        source: &str,
        field: &str,
        message: impl Into<String>,
    ) {
        self.push(category, ValidationSeverity::Error, source, Some(field), message);
    }

    pub fn add_warning(&mut self, source: &str, field: &str, message: impl Into<String>) {
        self.push(
            ValidationCategory::Unused,
            ValidationSeverity::Warning,
            source,
            Some(field),
            message,
        );
    }

    /// Check if validation passed (no critical findings)
    pub fn is_ok(&self) -> bool {
        !self.errors.iter().any(|e| e.severity == ValidationSeverity::Critical)
    }

    pub fn critical_errors(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Critical)
            .collect()
    }

    pub fn has_category(&self, category: ValidationCategory) -> bool {
        self.errors.iter().any(|e| e.category == category)
    }

    pub fn summary(&self) -> String {
        let count = |s: ValidationSeverity| self.errors.iter().filter(|e| e.severity == s).count();

        if self.errors.is_empty() {
            format!("Schema '{}': All validations passed", self.schema)
        } else {
            format!(
                "Schema '{}': {} critical, {} errors, {} warnings",
                self.schema,
                count(ValidationSeverity::Critical),
                count(ValidationSeverity::Error),
                count(ValidationSeverity::Warning)
            )
        }
    }
}

/// Slot schema validator
pub struct SchemaValidator {
    include_warnings: bool,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self {
            include_warnings: true,
        }
    }

    pub fn with_warnings(mut self, include: bool) -> Self {
        self.include_warnings = include;
        self
    }

    pub fn validate(&self, schema: &SchemaConfig) -> ValidationResult {
        let mut result = ValidationResult::new(&schema.metadata.name);

        self.validate_slots(schema, &mut result);
        self.validate_dependencies(schema, &mut result);
        self.validate_inference_cycles(schema, &mut result);
        self.validate_strategy(schema, &mut result);

        if !self.include_warnings {
            result
                .errors
                .retain(|e| e.severity != ValidationSeverity::Warning);
        }
        result
    }

    fn validate_slots(&self, schema: &SchemaConfig, result: &mut ValidationResult) {
        if schema.slots.is_empty() {
            result.add_critical(
                ValidationCategory::MissingRequired,
                "slots",
                None,
                "No slots defined",
            );
            return;
        }

        for (name, slot) in &schema.slots {
            let name = name.as_str();
            if slot.description.is_empty() {
                result.add_warning("slots", name, "Slot missing description");
            }
            if slot.required && slot.prompt.is_none() {
                result.add_warning("slots", name, "Required slot has no prompt");
            }
            if slot.learnable && slot.kind != SlotKind::Enum {
                result.add_warning("slots", name, "Only enum slots can learn new values");
            }

            if slot.is_closed() && slot.values.is_empty() {
                result.add_critical(
                    ValidationCategory::MissingRequired,
                    "slots",
                    Some(name),
                    "Slot must have at least one allowed value",
                );
            }

            let mut seen = HashSet::new();
            for value in &slot.values {
                if !seen.insert(value.id.to_lowercase()) {
                    result.add_critical(
                        ValidationCategory::Duplicate,
                        "slots",
                        Some(name),
                        format!("Duplicate allowed value '{}'", value.id),
                    );
                }
                for pattern in &value.patterns {
                    if let Err(e) = Regex::new(pattern) {
                        result.add_error(
                            ValidationCategory::InvalidPattern,
                            "slots",
                            name,
                            format!("Invalid pattern for '{}': {}", value.id, e),
                        );
                    }
                }
            }

            if slot.kind == SlotKind::NumericRange {
                self.validate_buckets(name, slot, result);
            }

            if let Some(default) = &slot.default {
                if slot.is_closed() && slot.allowed_value(default).is_none() {
                    result.add_critical(
                        ValidationCategory::DataIntegrity,
                        "slots",
                        Some(name),
                        format!("Default '{}' is not an allowed value", default),
                    );
                }
            }

            for (surface, target) in &slot.synonyms {
                if slot.allowed_value(target).is_none() {
                    result.add_critical(
                        ValidationCategory::DataIntegrity,
                        "slots",
                        Some(name),
                        format!("Synonym '{}' maps to unknown value '{}'", surface, target),
                    );
                }
            }

            if let Some(validation) = &slot.validation {
                if let Err(e) = Regex::new(validation) {
                    result.add_error(
                        ValidationCategory::InvalidPattern,
                        "slots",
                        name,
                        format!("Invalid validation regex: {}", e),
                    );
                }
            }
        }
    }

    fn validate_buckets(&self, name: &str, slot: &SlotDefinition, result: &mut ValidationResult) {
        for value in &slot.values {
            match (value.min, value.max) {
                (None, None) => result.add_critical(
                    ValidationCategory::MissingRequired,
                    "slots",
                    Some(name),
                    format!("Range value '{}' needs min or max", value.id),
                ),
                (Some(min), Some(max)) if min > max => result.add_critical(
                    ValidationCategory::ValueOutOfRange,
                    "slots",
                    Some(name),
                    format!("Invalid range for '{}': min ({}) > max ({})", value.id, min, max),
                ),
                _ => {},
            }
        }
    }

    fn validate_dependencies(&self, schema: &SchemaConfig, result: &mut ValidationResult) {
        for (source, dependency) in &schema.dependencies {
            let source = source.as_str();
            let Some(source_def) = schema.get_slot(source) else {
                result.add_critical(
                    ValidationCategory::InvalidReference,
                    "dependencies",
                    Some(source),
                    "Dependency source is not a defined slot",
                );
                continue;
            };

            for influenced in &dependency.influences {
                if !schema.slots.contains_key(influenced) {
                    result.add_critical(
                        ValidationCategory::InvalidReference,
                        "dependencies",
                        Some(source),
                        format!("Influences unknown slot '{}'", influenced),
                    );
                }
            }

            for rule in &dependency.rules {
                if rule.when != ANY_VALUE
                    && source_def.is_closed()
                    && source_def.allowed_value(&rule.when).is_none()
                {
                    result.add_critical(
                        ValidationCategory::DataIntegrity,
                        "dependencies",
                        Some(source),
                        format!("Rule fires on unknown value '{}'", rule.when),
                    );
                }

                for target in rule.targets() {
                    if !schema.slots.contains_key(target) {
                        result.add_critical(
                            ValidationCategory::InvalidReference,
                            "dependencies",
                            Some(source),
                            format!("Rule references unknown slot '{}'", target),
                        );
                    } else if !dependency.influences.contains(target) {
                        result.add_warning(
                            "dependencies",
                            source,
                            format!("'{}' is not listed in influences", target),
                        );
                    }
                }

                let implied = rule
                    .set
                    .iter()
                    .chain(rule.suggest.iter())
                    .map(|(slot, value)| (slot, std::slice::from_ref(value)));
                let narrowed = rule.narrow.iter().map(|(slot, values)| (slot, values.as_slice()));
                for (slot, values) in implied.chain(narrowed) {
                    let Some(def) = schema.get_slot(slot) else {
                        continue;
                    };
                    for value in values {
                        if def.is_closed() && def.allowed_value(value).is_none() {
                            result.add_critical(
                                ValidationCategory::DataIntegrity,
                                "dependencies",
                                Some(source),
                                format!("'{}' is not an allowed value of '{}'", value, slot),
                            );
                        }
                    }
                }
            }
        }
    }

    /// The `set` inference graph must be acyclic
    fn validate_inference_cycles(&self, schema: &SchemaConfig, result: &mut ValidationResult) {
        let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
        for (source, dependency) in &schema.dependencies {
            for rule in &dependency.rules {
                for target in rule.set.keys() {
                    edges.entry(source.as_str()).or_default().push(target.as_str());
                }
            }
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            node: &'a str,
            edges: &HashMap<&'a str, Vec<&'a str>>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Option<&'a str> {
            match marks.get(node) {
                Some(Mark::Visiting) => return Some(node),
                Some(Mark::Done) => return None,
                None => {},
            }
            marks.insert(node, Mark::Visiting);
            for next in edges.get(node).into_iter().flatten() {
                if let Some(hit) = visit(*next, edges, marks) {
                    return Some(hit);
                }
            }
            marks.insert(node, Mark::Done);
            None
        }

        let mut sources: Vec<&str> = edges.keys().copied().collect();
        sources.sort_unstable();
        let mut marks = HashMap::new();
        for source in sources {
            if let Some(slot) = visit(source, &edges, &mut marks) {
                result.add_critical(
                    ValidationCategory::Cycle,
                    "dependencies",
                    Some(slot),
                    "Inference rules form a cycle",
                );
                return;
            }
        }
    }

    fn validate_strategy(&self, schema: &SchemaConfig, result: &mut ValidationResult) {
        let strategy = &schema.collection_strategy;
        if strategy.max_turns == 0 {
            result.add_critical(
                ValidationCategory::ValueOutOfRange,
                "collection_strategy",
                Some("max_turns"),
                "Must be at least 1",
            );
        }
        if strategy.max_attempts_per_slot == 0 {
            result.add_critical(
                ValidationCategory::ValueOutOfRange,
                "collection_strategy",
                Some("max_attempts_per_slot"),
                "Must be at least 1",
            );
        }
        if strategy.batch_size == 0 {
            result.add_critical(
                ValidationCategory::ValueOutOfRange,
                "collection_strategy",
                Some("batch_size"),
                "Must be at least 1",
            );
        }

        let rules = &schema.validation_rules;
        for (field, value) in [
            ("min_confidence", rules.min_confidence),
            ("ambiguity_margin", rules.ambiguity_margin),
            ("overwrite_margin", rules.overwrite_margin),
        ] {
            if !(0.0..=1.0).contains(&value) {
                result.add_critical(
                    ValidationCategory::ValueOutOfRange,
                    "validation_rules",
                    Some(field),
                    format!("Must be between 0.0 and 1.0, got {}", value),
                );
            }
        }

        if schema.fallback_strategy.generic_question.trim().is_empty() {
            result.add_warning("fallback_strategy", "generic_question", "Empty fallback question");
        }
    }
}
