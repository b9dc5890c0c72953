/// Error Module
///
/// This module defines the error taxonomy for the facade. Every operation
/// reports failures through [`DbError`], raised synchronously to the caller.
use thiserror::Error;

/// Error type covering every failure the facade can report.
///
/// - Invalid arguments supplied by the caller
/// - Driver-level connect and database-selection failures
/// - Statement execution failures
/// - References to connections or cache entries that do not exist
/// - Configuration file and record decoding failures
#[derive(Error, Debug)]
pub enum DbError {
    /// Invalid argument shape or value (empty host, port 0, unknown result mode, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The driver could not connect or select the requested database
    #[error("Connection error ({database}): {message}")]
    Connection { database: String, message: String },

    /// The driver rejected a statement
    #[error("Query error: {message} [query: {query}]")]
    Query { query: String, message: String },

    /// Operation refers to a connection or cache entry that does not exist
    #[error("State error: {0}")]
    State(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Record decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Diagnostic reported by a database driver.
///
/// The facade wraps it into [`DbError::Connection`] or [`DbError::Query`]
/// depending on which call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        DriverError {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        DriverError::new(err.to_string())
    }
}

/// Type alias for Result to use DbError as the error type.
pub type Result<T> = std::result::Result<T, DbError>;
