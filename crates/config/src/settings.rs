//! Runtime settings
//!
//! Where the schema and catalogue live, extractor and learning knobs, and
//! logging. Loaded through the `config` crate so every field can be
//! overridden with `ADVISOR__SECTION__FIELD` environment variables.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation
    #[default]
    Development,
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Slot schema file
    #[serde(default = "default_schema_path")]
    pub schema_path: String,

    /// Special-case catalogue file
    #[serde(default = "default_special_cases_path")]
    pub special_cases_path: String,

    #[serde(default)]
    pub extractor: ExtractorSettings,

    #[serde(default)]
    pub learning: LearningSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_schema_path() -> String {
    "config/slots/laptop.yaml".to_string()
}

fn default_special_cases_path() -> String {
    "config/special_cases.yaml".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: RuntimeEnvironment::default(),
            schema_path: default_schema_path(),
            special_cases_path: default_special_cases_path(),
            extractor: ExtractorSettings::default(),
            learning: LearningSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Multi-strategy extractor knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorSettings {
    /// A strategy reaching this confidence ends the run
    #[serde(default = "default_short_circuit")]
    pub short_circuit_confidence: f32,
    /// Consult the classifier when required slots stay unresolved
    #[serde(default = "default_true")]
    pub classifier_enabled: bool,
    /// Multiplier applied to classifier confidence
    #[serde(default = "default_classifier_weight")]
    pub classifier_weight: f32,
}

fn default_short_circuit() -> f32 {
    0.85
}

fn default_classifier_weight() -> f32 {
    0.8
}

fn default_true() -> bool {
    true
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            short_circuit_confidence: default_short_circuit(),
            classifier_enabled: true,
            classifier_weight: default_classifier_weight(),
        }
    }
}

/// Dynamic learning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// JSON file holding learned patterns; in-memory only when unset
    #[serde(default)]
    pub store_path: Option<String>,
    /// Confidence given to learned candidates
    #[serde(default = "default_learned_confidence")]
    pub learned_confidence: f32,
}

fn default_learned_confidence() -> f32 {
    0.6
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            store_path: None,
            learned_confidence: default_learned_confidence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            (
                "extractor.short_circuit_confidence",
                self.extractor.short_circuit_confidence,
            ),
            ("extractor.classifier_weight", self.extractor.classifier_weight),
            ("learning.learned_confidence", self.learning.learned_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("Must be between 0.0 and 1.0, got {}", value),
                });
            }
        }

        if self.schema_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "schema_path".to_string(),
                message: "Must not be empty".to_string(),
            });
        }

        if self.environment.is_strict() && self.learning.enabled && self.learning.store_path.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "learning.store_path".to_string(),
                message: "Learning needs a store path outside development".to_string(),
            });
        }

        Ok(())
    }
}

/// Load settings from `config/default`, an optional environment file and
/// `ADVISOR__` environment variables
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("ADVISOR")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
