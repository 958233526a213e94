//! Compiled pattern tables
//!
//! A [`PatternTable`] is an immutable snapshot of everything the matcher
//! needs: normalised keywords, compiled regexes and example phrases per
//! allowed value, built from the slot schema plus learned records. The
//! matcher swaps whole snapshots; a table is never mutated once published.

use advisor_config::{SchemaConfig, SlotKind};
use advisor_core::{LearnedPatternRecord, SlotOption};
use regex::{Regex, RegexBuilder};

use crate::normalize::normalize;

/// A stored pattern that failed to compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternIssue {
    pub slot: String,
    pub value: String,
    pub error: String,
}

/// Matching data for one allowed value
#[derive(Debug, Clone)]
pub struct ValuePatterns {
    pub id: String,
    pub display: String,
    /// Normalised keywords, display label and synonyms included
    pub keywords: Vec<String>,
    pub regexes: Vec<Regex>,
    /// Normalised example phrases
    pub examples: Vec<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Added by dynamic learning
    pub learned: bool,
}

impl ValuePatterns {
    /// Whether a number falls into this value's bucket
    pub fn contains(&self, n: f64) -> bool {
        self.min.map_or(true, |min| n >= min) && self.max.map_or(true, |max| n <= max)
    }

    fn push_keyword(&mut self, keyword: &str) {
        let keyword = normalize(keyword.trim());
        if !keyword.is_empty() && !self.keywords.contains(&keyword) {
            self.keywords.push(keyword);
        }
    }
}

/// Matching data for one slot
#[derive(Debug, Clone)]
pub struct SlotPatterns {
    pub name: String,
    pub kind: SlotKind,
    pub learnable: bool,
    /// Normalised indicator keywords
    pub indicators: Vec<String>,
    pub values: Vec<ValuePatterns>,
}

impl SlotPatterns {
    pub fn value(&self, id: &str) -> Option<&ValuePatterns> {
        self.values.iter().find(|v| v.id.eq_ignore_ascii_case(id))
    }

    /// Whether a normalised surface form already resolves to a value
    pub fn knows_surface(&self, surface: &str) -> bool {
        self.values.iter().any(|v| {
            v.id.eq_ignore_ascii_case(surface) || v.keywords.iter().any(|k| k == surface)
        })
    }
}

/// Immutable snapshot of all slot patterns
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    slots: Vec<SlotPatterns>,
    issues: Vec<PatternIssue>,
    version: u64,
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

impl PatternTable {
    /// Compile a table from the schema and learned records
    pub fn build(schema: &SchemaConfig, learned: &[LearnedPatternRecord], version: u64) -> Self {
        let mut table = Self {
            slots: Vec::with_capacity(schema.slots.len()),
            issues: Vec::new(),
            version,
        };

        for (name, def) in schema.slots_by_priority() {
            let mut slot = SlotPatterns {
                name: name.to_string(),
                kind: def.kind,
                learnable: def.learnable,
                indicators: def.indicator_keywords.iter().map(|k| normalize(k)).collect(),
                values: Vec::with_capacity(def.values.len()),
            };

            for allowed in &def.values {
                let mut value = ValuePatterns {
                    id: allowed.id.clone(),
                    display: allowed.display.clone(),
                    keywords: Vec::new(),
                    regexes: Vec::new(),
                    examples: allowed.examples.iter().map(|e| normalize(e)).collect(),
                    min: allowed.min,
                    max: allowed.max,
                    learned: false,
                };
                value.push_keyword(&allowed.display);
                for keyword in &allowed.keywords {
                    value.push_keyword(keyword);
                }
                for (surface, target) in &def.synonyms {
                    if target.eq_ignore_ascii_case(&allowed.id) {
                        value.push_keyword(surface);
                    }
                }
                for pattern in &allowed.patterns {
                    match compile(pattern) {
                        Ok(re) => value.regexes.push(re),
                        Err(e) => {
                            tracing::warn!(slot = %name, value = %allowed.id, error = %e, "Skipping invalid pattern");
                            table.issues.push(PatternIssue {
                                slot: name.to_string(),
                                value: allowed.id.clone(),
                                error: e.to_string(),
                            });
                        },
                    }
                }
                slot.values.push(value);
            }
            table.slots.push(slot);
        }

        for record in learned {
            table.apply_learned(record);
        }
        table
    }

    /// Copy of this table with one more learned record
    pub fn with_learned(&self, record: &LearnedPatternRecord, version: u64) -> Self {
        let mut next = self.clone();
        next.version = version;
        next.apply_learned(record);
        next
    }

    fn apply_learned(&mut self, record: &LearnedPatternRecord) {
        let Some(slot) = self.slots.iter_mut().find(|s| s.name == record.slot) else {
            tracing::warn!(slot = %record.slot, "Learned record for unknown slot ignored");
            return;
        };

        let regex = match compile(&record.pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(slot = %record.slot, value = %record.value, error = %e, "Skipping invalid learned pattern");
                self.issues.push(PatternIssue {
                    slot: record.slot.clone(),
                    value: record.value.clone(),
                    error: e.to_string(),
                });
                None
            },
        };

        let idx = match slot.values.iter().position(|v| v.id.eq_ignore_ascii_case(&record.value)) {
            Some(idx) => idx,
            None => {
                slot.values.push(ValuePatterns {
                    id: record.value.clone(),
                    display: record.value.clone(),
                    keywords: Vec::new(),
                    regexes: Vec::new(),
                    examples: Vec::new(),
                    min: None,
                    max: None,
                    learned: true,
                });
                slot.values.len() - 1
            },
        };

        let value = &mut slot.values[idx];
        value.push_keyword(&record.value);
        if let Some(re) = regex {
            value.regexes.push(re);
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Slots in priority order
    pub fn slots(&self) -> &[SlotPatterns] {
        &self.slots
    }

    pub fn slot(&self, name: &str) -> Option<&SlotPatterns> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// Patterns that failed to compile
    pub fn issues(&self) -> &[PatternIssue] {
        &self.issues
    }

    /// Whether a normalised surface form is known to any slot
    pub fn knows_surface_anywhere(&self, surface: &str) -> bool {
        self.slots.iter().any(|s| s.knows_surface(surface))
    }

    /// Allowed values of a slot as offerable options
    pub fn options(&self, slot: &str) -> Vec<SlotOption> {
        self.slot(slot)
            .map(|s| {
                s.values
                    .iter()
                    .map(|v| SlotOption {
                        id: v.id.clone(),
                        label: v.display.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
