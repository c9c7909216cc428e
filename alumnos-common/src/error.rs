//! Common error types for Alumnos

use thiserror::Error;

/// Common result type for Alumnos operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the Alumnos crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation refused because other records depend on the target
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing, expired or wrong credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the backend rejected a write because of a foreign key
    pub fn is_foreign_key_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => db_err.is_foreign_key_violation(),
            _ => false,
        }
    }

    /// True when the backend rejected a write because of a UNIQUE constraint
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}
