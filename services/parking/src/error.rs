//! Error types for the parking service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::{CacheError, DatabaseError};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::models::VehicleCategory;

/// Failures reported by the allocation, checkout and payment flows
#[derive(Error, Debug)]
pub enum ParkingError {
    /// Vehicle already parked, outstanding payment, or a lost reservation race
    #[error("{0}")]
    Conflict(String),

    /// Vehicle, slot or session absent, or no capacity left
    #[error("{0}")]
    NotFound(String),

    /// Checkout attempted twice on the same session
    #[error("Parking session {0} is already closed")]
    AlreadyClosed(Uuid),

    /// No slot in the facility accepts this category
    #[error("No parking slots are configured for {0} vehicles")]
    InvalidCategory(VehicleCategory),

    /// Malformed input
    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Broken invariant or programming error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ParkingError {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            ParkingError::Conflict(_) => "conflict",
            ParkingError::NotFound(_) => "not_found",
            ParkingError::AlreadyClosed(_) => "already_closed",
            ParkingError::InvalidCategory(_) => "invalid_category",
            ParkingError::Validation(_) => "validation",
            ParkingError::Database(_)
            | ParkingError::Cache(_)
            | ParkingError::Configuration(_)
            | ParkingError::Internal(_) => "internal",
        }
    }

    /// Faults that are not the caller's doing
    pub fn is_internal(&self) -> bool {
        self.kind() == "internal"
    }
}

impl From<sqlx::Error> for ParkingError {
    fn from(e: sqlx::Error) -> Self {
        ParkingError::Database(DatabaseError::Query(e))
    }
}

impl From<config::ConfigError> for ParkingError {
    fn from(e: config::ConfigError) -> Self {
        ParkingError::Configuration(e.to_string())
    }
}

impl IntoResponse for ParkingError {
    fn into_response(self) -> Response {
        let status = match &self {
            ParkingError::Conflict(_) | ParkingError::AlreadyClosed(_) => StatusCode::CONFLICT,
            ParkingError::NotFound(_) => StatusCode::NOT_FOUND,
            ParkingError::InvalidCategory(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ParkingError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if self.is_internal() {
            error!("Internal fault while handling request: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": self.kind(),
            "message": message,
        }));

        (status, body).into_response()
    }
}

/// Type alias for parking results
pub type ParkingResult<T> = Result<T, ParkingError>;
