//! Shared infrastructure for the parking services
//!
//! PostgreSQL connectivity, the Redis cache client, and the error types
//! both of them report.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool};
//!
//! # async fn run() -> Result<(), common::error::DatabaseError> {
//! let config = DatabaseConfig::from_env()?;
//! let pool = init_pool(&config).await?;
//! assert!(health_check(&pool).await?);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod database;
pub mod error;
