//! Multi-level parking: slot allocation, session ledger, billing and settlement
//!
//! The [`service::AllocationService`] is the only writer coordinating the
//! slot registry and the session ledger. Storage sits behind the traits in
//! [`store`]; [`routes`] exposes the service over HTTP.

pub mod billing;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;
pub mod validation;

pub use error::{ParkingError, ParkingResult};
pub use service::AllocationService;
pub use state::AppState;
