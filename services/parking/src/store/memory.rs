//! In-process store
//!
//! Slots live under one `RwLock`, so `reserve` is a compare-and-set on the
//! occupied flag and a snapshot never straddles two registry states. The
//! ledger lives under one `Mutex`, making the open-session check and insert a
//! single step. Lock order when more than one is held: vehicles, then ledger.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{SessionLedger, SlotRegistry, VehicleDirectory};
use crate::error::{ParkingError, ParkingResult};
use crate::models::{
    LevelAvailability, ParkingSession, PaymentStatus, SessionSelector, Slot, Vehicle,
    VehicleCategory,
};

#[derive(Debug, Default)]
struct SlotTable {
    slots: HashMap<Uuid, Slot>,
    by_position: BTreeMap<(i32, i32), Uuid>,
}

#[derive(Debug, Default)]
struct Ledger {
    /// Insertion order doubles as the tie-break for equal creation times
    sessions: Vec<ParkingSession>,
    by_id: HashMap<Uuid, usize>,
    open_by_vehicle: HashMap<Uuid, Uuid>,
}

impl Ledger {
    fn get_mut(&mut self, session_id: Uuid) -> Option<&mut ParkingSession> {
        let index = *self.by_id.get(&session_id)?;
        self.sessions.get_mut(index)
    }

    fn latest<F>(&self, predicate: F) -> Option<&ParkingSession>
    where
        F: Fn(&ParkingSession) -> bool,
    {
        self.sessions
            .iter()
            .filter(|s| predicate(s))
            .max_by_key(|s| s.created_at)
    }
}

#[derive(Debug, Default)]
struct Inner {
    slots: RwLock<SlotTable>,
    vehicles: RwLock<HashMap<Uuid, Vehicle>>,
    ledger: Mutex<Ledger>,
}

/// Store kept entirely in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlotRegistry for MemoryStore {
    async fn add_slot(&self, slot: Slot) -> ParkingResult<Slot> {
        let mut table = self.inner.slots.write().await;

        if table.by_position.contains_key(&slot.position()) {
            return Err(ParkingError::Conflict(format!(
                "Slot {} already exists on level {}",
                slot.slot_number, slot.level_number
            )));
        }

        table.by_position.insert(slot.position(), slot.id);
        table.slots.insert(slot.id, slot.clone());
        Ok(slot)
    }

    async fn find_slot(&self, slot_id: Uuid) -> ParkingResult<Option<Slot>> {
        let table = self.inner.slots.read().await;
        Ok(table.slots.get(&slot_id).cloned())
    }

    async fn find_available(&self, category: VehicleCategory) -> ParkingResult<Option<Slot>> {
        let table = self.inner.slots.read().await;
        let slot = table
            .by_position
            .values()
            .filter_map(|id| table.slots.get(id))
            .find(|slot| slot.category == category && !slot.is_occupied)
            .cloned();
        Ok(slot)
    }

    async fn has_category(&self, category: VehicleCategory) -> ParkingResult<bool> {
        let table = self.inner.slots.read().await;
        Ok(table.slots.values().any(|slot| slot.category == category))
    }

    async fn slot_count(&self) -> ParkingResult<usize> {
        Ok(self.inner.slots.read().await.slots.len())
    }

    async fn reserve(&self, slot_id: Uuid) -> ParkingResult<bool> {
        let mut table = self.inner.slots.write().await;
        let slot = table
            .slots
            .get_mut(&slot_id)
            .ok_or_else(|| ParkingError::NotFound(format!("Slot {} not found", slot_id)))?;

        if slot.is_occupied {
            debug!("Slot {} already occupied, reservation refused", slot_id);
            return Ok(false);
        }

        slot.is_occupied = true;
        Ok(true)
    }

    async fn release(&self, slot_id: Uuid) -> ParkingResult<bool> {
        let mut table = self.inner.slots.write().await;
        let slot = table
            .slots
            .get_mut(&slot_id)
            .ok_or_else(|| ParkingError::NotFound(format!("Slot {} not found", slot_id)))?;

        let was_occupied = slot.is_occupied;
        slot.is_occupied = false;
        Ok(was_occupied)
    }

    async fn snapshot_by_level(&self) -> ParkingResult<Vec<LevelAvailability>> {
        let table = self.inner.slots.read().await;
        Ok(LevelAvailability::from_slots(
            table.slots.values().cloned(),
        ))
    }
}

impl VehicleDirectory for MemoryStore {
    async fn insert_vehicle(&self, vehicle: Vehicle) -> ParkingResult<Vehicle> {
        let mut vehicles = self.inner.vehicles.write().await;

        if vehicles
            .values()
            .any(|v| v.license_plate == vehicle.license_plate)
        {
            return Err(ParkingError::Conflict(format!(
                "Vehicle {} already registered",
                vehicle.license_plate
            )));
        }

        vehicles.insert(vehicle.id, vehicle.clone());
        Ok(vehicle)
    }

    async fn find_vehicle(&self, id: Uuid) -> ParkingResult<Option<Vehicle>> {
        Ok(self.inner.vehicles.read().await.get(&id).cloned())
    }

    async fn find_vehicle_by_plate(&self, license_plate: &str) -> ParkingResult<Option<Vehicle>> {
        let vehicles = self.inner.vehicles.read().await;
        Ok(vehicles
            .values()
            .find(|v| v.license_plate == license_plate)
            .cloned())
    }
}

impl SessionLedger for MemoryStore {
    async fn has_open_session(&self, vehicle_id: Uuid) -> ParkingResult<bool> {
        let ledger = self.inner.ledger.lock().await;
        Ok(ledger.open_by_vehicle.contains_key(&vehicle_id))
    }

    async fn has_unsettled_session(&self, vehicle_id: Uuid) -> ParkingResult<bool> {
        let ledger = self.inner.ledger.lock().await;
        Ok(ledger.sessions.iter().any(|s| {
            s.vehicle_id == vehicle_id
                && !s.is_open()
                && s.payment_status != PaymentStatus::Success
        }))
    }

    async fn open_session(
        &self,
        vehicle_id: Uuid,
        slot_id: Uuid,
        entry_time: DateTime<Utc>,
    ) -> ParkingResult<ParkingSession> {
        let mut ledger = self.inner.ledger.lock().await;

        if let Some(existing) = ledger.open_by_vehicle.get(&vehicle_id) {
            return Err(ParkingError::Conflict(format!(
                "Vehicle is already parked (session {})",
                existing
            )));
        }

        let session = ParkingSession::open(vehicle_id, slot_id, entry_time);
        let index = ledger.sessions.len();
        ledger.by_id.insert(session.id, index);
        ledger.open_by_vehicle.insert(vehicle_id, session.id);
        ledger.sessions.push(session.clone());

        Ok(session)
    }

    async fn close_session(
        &self,
        session_id: Uuid,
        exit_time: DateTime<Utc>,
        rate_per_hour: i64,
    ) -> ParkingResult<ParkingSession> {
        let vehicles = self.inner.vehicles.read().await;
        let mut ledger = self.inner.ledger.lock().await;

        let session = ledger.get_mut(session_id).ok_or_else(|| {
            ParkingError::NotFound(format!("Parking session {} not found", session_id))
        })?;

        let license_plate = vehicles
            .get(&session.vehicle_id)
            .map(|v| v.license_plate.clone())
            .ok_or_else(|| {
                ParkingError::Internal(format!(
                    "Parking session {} references unknown vehicle {}",
                    session_id, session.vehicle_id
                ))
            })?;

        session.close(&license_plate, exit_time, rate_per_hour)?;
        let closed = session.clone();
        ledger.open_by_vehicle.remove(&closed.vehicle_id);

        Ok(closed)
    }

    async fn settle_payment(
        &self,
        session_id: Uuid,
        paid_on: DateTime<Utc>,
    ) -> ParkingResult<ParkingSession> {
        let mut ledger = self.inner.ledger.lock().await;
        let session = ledger.get_mut(session_id).ok_or_else(|| {
            ParkingError::NotFound(format!("Parking session {} not found", session_id))
        })?;

        session.settle(paid_on)?;
        Ok(session.clone())
    }

    async fn find_session(&self, session_id: Uuid) -> ParkingResult<Option<ParkingSession>> {
        let ledger = self.inner.ledger.lock().await;
        Ok(ledger
            .by_id
            .get(&session_id)
            .and_then(|&index| ledger.sessions.get(index))
            .cloned())
    }

    async fn most_recent(
        &self,
        selector: &SessionSelector,
        open_only: bool,
    ) -> ParkingResult<Option<ParkingSession>> {
        let vehicles = self.inner.vehicles.read().await;
        let ledger = self.inner.ledger.lock().await;

        let matches_vehicle = |session: &ParkingSession| match selector {
            SessionSelector::Id(id) => session.id == *id,
            SessionSelector::Vehicle(vehicle_id) => session.vehicle_id == *vehicle_id,
            SessionSelector::Plate {
                license_plate,
                owner_id,
            } => vehicles.get(&session.vehicle_id).is_some_and(|v| {
                v.license_plate == *license_plate && owner_id.is_none_or(|o| o == v.owner_id)
            }),
        };

        Ok(ledger
            .latest(|s| matches_vehicle(s) && (!open_only || s.is_open()))
            .cloned())
    }

    async fn open_sessions(&self) -> ParkingResult<Vec<ParkingSession>> {
        let ledger = self.inner.ledger.lock().await;
        Ok(ledger
            .sessions
            .iter()
            .filter(|s| s.is_open())
            .cloned()
            .collect())
    }

    async fn sessions_for_vehicle(&self, vehicle_id: Uuid) -> ParkingResult<Vec<ParkingSession>> {
        let ledger = self.inner.ledger.lock().await;
        let mut sessions: Vec<ParkingSession> = ledger
            .sessions
            .iter()
            .rev()
            .filter(|s| s.vehicle_id == vehicle_id)
            .cloned()
            .collect();
        // Stable sort keeps later inserts first among equal timestamps.
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}
