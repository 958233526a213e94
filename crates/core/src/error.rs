//! Error types shared by the boundary traits

use thiserror::Error;

/// Errors raised by external collaborators behind the core traits
#[derive(Error, Debug)]
pub enum Error {
    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Session store error: {0}")]
    SessionStore(String),

    #[error("Catalog search error: {0}")]
    Catalog(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
