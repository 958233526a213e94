//! Configuration management for the product advisor
//!
//! Supports loading configuration from:
//! - the slot schema YAML (`config/slots/*.yaml`)
//! - the special-case catalogue YAML (`config/special_cases.yaml`)
//! - runtime settings files and environment variables (`ADVISOR__` prefix)
//!
//! Schema and catalogue loading fails fast: a structural problem found by
//! the [`SchemaValidator`] is returned as a [`ConfigError`] instead of being
//! discovered mid-conversation.

pub mod schema;
pub mod settings;
pub mod special_cases;
pub mod telemetry;
pub mod validator;

pub use schema::{
    AllowedValue, CollectionMode, CollectionStrategy, ConditionalRule, DependencyDefinition,
    FallbackStrategy, MissingSlotPolicy, SchemaConfig, SchemaMetadata, SlotDefinition, SlotKind,
    ValidationRules,
};
pub use settings::{
    load_settings, ExtractorSettings, LearningSettings, LoggingSettings, RuntimeEnvironment,
    Settings,
};
pub use special_cases::{ResponseDirective, SpecialCaseDefinition, SpecialCasesConfig};
pub use telemetry::init_tracing;
pub use validator::{
    SchemaValidator, ValidationCategory, ValidationError, ValidationResult, ValidationSeverity,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}: {1}")]
    FileNotFound(String, String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required section: {0}")]
    MissingSection(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Schema validation failed: {0}")]
    Validation(String),

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
