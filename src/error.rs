//! Error types for manna

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MannaError {
    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
