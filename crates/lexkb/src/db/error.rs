//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON column could not be encoded or decoded.
    #[error("JSON column '{column}': {source}")]
    Json {
        column: String,
        #[source]
        source: serde_json::Error,
    },

    /// A stored value does not fit the model (bad status, bad timestamp).
    #[error("Invalid value in column '{column}': {value}")]
    InvalidValue { column: String, value: String },

    /// An update referenced a column outside the entry whitelist.
    #[error("Unknown entry column: {0}")]
    UnknownColumn(String),

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,
}
