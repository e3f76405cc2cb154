//! Custom error types for the common library
//!
//! This module defines application-specific error types that can be used
//! throughout the services.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Errors raised while reading or validating JWTs
#[derive(Error, Debug)]
pub enum TokenError {
    /// The key material could not be loaded
    #[error("Token key error: {0}")]
    Key(String),

    /// Signature, expiry or structure check failed
    #[error("Invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    /// A refresh token was presented where an access token is required, or the reverse
    #[error("Unexpected token type")]
    WrongType,
}

/// Errors raised while loading service settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
}
