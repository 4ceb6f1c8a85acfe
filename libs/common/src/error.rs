//! Custom error types for the common library
//!
//! Infrastructure failures shared by every service: PostgreSQL access and
//! the Redis cache.

use redis::RedisError;
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

/// Error type for Redis cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// The Redis URL could not be parsed or the client could not be built
    #[error("Cache configuration error: {0}")]
    Configuration(#[source] RedisError),

    /// A command failed or the server was unreachable
    #[error("Cache command error: {0}")]
    Command(#[source] RedisError),
}

/// Type alias for Result with CacheError
pub type CacheResult<T> = Result<T, CacheError>;
