//! Error types for text processing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TextProcessingError {
    #[error("Pattern store error: {0}")]
    Store(#[from] advisor_core::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] advisor_config::ConfigError),
}

pub type Result<T> = std::result::Result<T, TextProcessingError>;
