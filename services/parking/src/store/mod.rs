//! Persistence contracts for the parking core.
//!
//! The allocation service only talks to storage through these traits. Every
//! implementation must provide:
//! - an atomic conditional claim of a slot (`reserve` succeeds only when the
//!   slot was free),
//! - an atomic "open a session unless one is already open for the vehicle"
//!   insert,
//! - lookups by vehicle and session id ordered by creation time.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ParkingResult;
use crate::models::{
    LevelAvailability, ParkingSession, SessionSelector, Slot, Vehicle, VehicleCategory,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Index of slots by level and category; owns the occupied flag.
pub trait SlotRegistry: Send + Sync {
    /// Insert a new slot. Fails with `Conflict` when the (level, slot number)
    /// position is taken.
    fn add_slot(&self, slot: Slot) -> impl Future<Output = ParkingResult<Slot>> + Send;

    fn find_slot(&self, slot_id: Uuid) -> impl Future<Output = ParkingResult<Option<Slot>>> + Send;

    /// Free slot of `category` with the lowest (level, slot number)
    fn find_available(
        &self,
        category: VehicleCategory,
    ) -> impl Future<Output = ParkingResult<Option<Slot>>> + Send;

    /// Whether any slot, free or not, accepts `category`
    fn has_category(
        &self,
        category: VehicleCategory,
    ) -> impl Future<Output = ParkingResult<bool>> + Send;

    fn slot_count(&self) -> impl Future<Output = ParkingResult<usize>> + Send;

    /// Mark a slot occupied. Returns `false`, without mutating anything, when
    /// the slot was already occupied. Unknown slots are `NotFound`.
    fn reserve(&self, slot_id: Uuid) -> impl Future<Output = ParkingResult<bool>> + Send;

    /// Mark a slot free. Returns whether it was occupied; releasing a free
    /// slot is a no-op.
    fn release(&self, slot_id: Uuid) -> impl Future<Output = ParkingResult<bool>> + Send;

    /// Consistent per-level view of every slot
    fn snapshot_by_level(&self) -> impl Future<Output = ParkingResult<Vec<LevelAvailability>>> + Send;
}

/// Registered vehicles
pub trait VehicleDirectory: Send + Sync {
    /// Insert a vehicle. Fails with `Conflict` when the plate is already registered.
    fn insert_vehicle(&self, vehicle: Vehicle) -> impl Future<Output = ParkingResult<Vehicle>> + Send;

    fn find_vehicle(&self, id: Uuid) -> impl Future<Output = ParkingResult<Option<Vehicle>>> + Send;

    /// Exact match on an already normalized plate
    fn find_vehicle_by_plate(
        &self,
        license_plate: &str,
    ) -> impl Future<Output = ParkingResult<Option<Vehicle>>> + Send;
}

/// Parking records; enforces one open session per vehicle.
pub trait SessionLedger: Send + Sync {
    fn has_open_session(&self, vehicle_id: Uuid) -> impl Future<Output = ParkingResult<bool>> + Send;

    /// Whether the vehicle has a checked-out session that is not paid yet
    fn has_unsettled_session(
        &self,
        vehicle_id: Uuid,
    ) -> impl Future<Output = ParkingResult<bool>> + Send;

    /// Create an open session. Fails with `Conflict` when the vehicle already
    /// has one; the check and the insert are a single atomic step.
    fn open_session(
        &self,
        vehicle_id: Uuid,
        slot_id: Uuid,
        entry_time: DateTime<Utc>,
    ) -> impl Future<Output = ParkingResult<ParkingSession>> + Send;

    /// Close an open session and compute its fee.
    ///
    /// `NotFound` for unknown sessions, `AlreadyClosed` for closed ones.
    fn close_session(
        &self,
        session_id: Uuid,
        exit_time: DateTime<Utc>,
        rate_per_hour: i64,
    ) -> impl Future<Output = ParkingResult<ParkingSession>> + Send;

    /// Mark a closed session paid. Already paid sessions are returned as-is.
    fn settle_payment(
        &self,
        session_id: Uuid,
        paid_on: DateTime<Utc>,
    ) -> impl Future<Output = ParkingResult<ParkingSession>> + Send;

    fn find_session(
        &self,
        session_id: Uuid,
    ) -> impl Future<Output = ParkingResult<Option<ParkingSession>>> + Send;

    /// Latest matching session by creation time, later inserts winning ties,
    /// optionally only open ones
    fn most_recent(
        &self,
        selector: &SessionSelector,
        open_only: bool,
    ) -> impl Future<Output = ParkingResult<Option<ParkingSession>>> + Send;

    fn open_sessions(&self) -> impl Future<Output = ParkingResult<Vec<ParkingSession>>> + Send;

    /// Every session of a vehicle, newest first
    fn sessions_for_vehicle(
        &self,
        vehicle_id: Uuid,
    ) -> impl Future<Output = ParkingResult<Vec<ParkingSession>>> + Send;
}

/// Everything the allocation service needs from storage
pub trait ParkingStore: SlotRegistry + VehicleDirectory + SessionLedger {}

impl<T> ParkingStore for T where T: SlotRegistry + VehicleDirectory + SessionLedger {}
