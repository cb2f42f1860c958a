//! Error types for wr-core

use thiserror::Error;

/// Main error type for wr-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Responder error: {0}")]
    Responder(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for wr-core
pub type Result<T> = std::result::Result<T, Error>;
