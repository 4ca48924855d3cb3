//! Error types for shortsurvey-core

use thiserror::Error;

/// Main error type for the shortsurvey-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Comment platform API or crawl error
    #[error("crawl error: {0}")]
    Crawl(String),

    /// Sheet import rejected or failed
    #[error("import error: {0}")]
    Import(String),

    /// Input rejected before touching the store
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Event kind label not in the closed set
    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),

    /// Table name not managed by this crate
    #[error("unknown table: {0}")]
    UnknownTable(String),
}

/// Result type alias for shortsurvey-core
pub type Result<T> = std::result::Result<T, Error>;
