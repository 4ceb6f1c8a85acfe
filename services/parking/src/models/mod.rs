//! Parking domain models

pub mod session;
pub mod slot;
pub mod vehicle;

// Re-export for convenience
pub use session::{
    ParkingSession, PaymentDetails, PaymentStatus, SessionSelector, SessionState,
};
pub use slot::{CategoryAvailability, LevelAvailability, Slot, SlotRef};
pub use vehicle::{Vehicle, VehicleCategory, VehicleRef};
