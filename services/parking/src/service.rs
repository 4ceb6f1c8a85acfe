//! Allocation service: the only writer coordinating slots and sessions.
//!
//! Per vehicle: FREE -> PARKED -> AWAITING_PAYMENT -> SETTLED. A slot is
//! occupied if and only if exactly one open session references it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::billing::DEFAULT_RATE_PER_HOUR;
use crate::clock::Clock;
use crate::config::LevelLayout;
use crate::error::{ParkingError, ParkingResult};
use crate::models::{
    LevelAvailability, ParkingSession, PaymentDetails, PaymentStatus, SessionSelector, Slot,
    Vehicle, VehicleCategory, VehicleRef,
};
use crate::store::ParkingStore;
use crate::validation::{normalize_license_plate, validate_slot_number};

/// Extra attempts after losing a slot reservation race
const RESERVE_RETRIES: usize = 1;

/// Release attempts after a session closed. A closed session is never
/// reopened by a later checkout, so this is the only chance to free its slot.
const RELEASE_ATTEMPTS: u32 = 3;
const RELEASE_BACKOFF: std::time::Duration = std::time::Duration::from_millis(50);

/// Billing and policy knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub rate_per_hour: i64,
    /// When false, a vehicle with an unpaid closed session cannot park again
    pub allow_parking_with_unpaid: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            rate_per_hour: DEFAULT_RATE_PER_HOUR,
            allow_parking_with_unpaid: false,
        }
    }
}

/// Result of a successful allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub session_id: Uuid,
    pub vehicle_id: Uuid,
    pub slot_id: Uuid,
    pub level_number: i32,
    pub slot_number: i32,
    pub entry_time: DateTime<Utc>,
}

/// Fee breakdown returned at checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub session_id: Uuid,
    pub slot_id: Uuid,
    #[serde(flatten)]
    pub details: PaymentDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub session_id: Uuid,
    /// The session was already paid; nothing changed
    pub already_settled: bool,
    pub invoice_details: PaymentDetails,
}

/// Disagreement between the slot registry and the session ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OccupancyViolation {
    OccupiedWithoutSession { slot_id: Uuid },
    SessionOnFreeSlot { session_id: Uuid, slot_id: Uuid },
    SharedSlot { slot_id: Uuid, session_ids: Vec<Uuid> },
    SessionOnUnknownSlot { session_id: Uuid, slot_id: Uuid },
}

pub struct AllocationService<S> {
    store: S,
    clock: Arc<dyn Clock>,
    settings: ServiceSettings,
}

impl<S: ParkingStore> AllocationService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, settings: ServiceSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> ServiceSettings {
        self.settings
    }

    /// Register a vehicle under `owner_id`; plates are unique
    pub async fn register_vehicle(
        &self,
        owner_id: Uuid,
        license_plate: &str,
        category: VehicleCategory,
    ) -> ParkingResult<Vehicle> {
        let license_plate = normalize_license_plate(license_plate)?;
        let vehicle = self
            .store
            .insert_vehicle(Vehicle {
                id: Uuid::new_v4(),
                owner_id,
                license_plate,
                category,
                created_at: self.clock.now(),
            })
            .await?;

        info!(
            "Registered vehicle {} ({}) for owner {}",
            vehicle.license_plate, vehicle.category, owner_id
        );
        Ok(vehicle)
    }

    pub async fn add_slot(
        &self,
        level_number: i32,
        slot_number: i32,
        category: VehicleCategory,
    ) -> ParkingResult<Slot> {
        validate_slot_number(slot_number)?;
        let slot = self
            .store
            .add_slot(Slot {
                id: Uuid::new_v4(),
                level_number,
                slot_number,
                category,
                is_occupied: false,
            })
            .await?;

        info!(
            "Added {} slot {} on level {}",
            category, slot_number, level_number
        );
        Ok(slot)
    }

    /// Create the configured slots when the store has none yet.
    ///
    /// Slots are numbered from 1 on each level: two-wheelers first, then
    /// four-wheelers, then heavy-load. Returns the number of slots created.
    pub async fn seed_layout(&self, layout: &[LevelLayout]) -> ParkingResult<usize> {
        if layout.is_empty() {
            return Ok(0);
        }

        let existing = self.store.slot_count().await?;
        if existing > 0 {
            info!(
                "Store already holds {} slots, skipping layout seeding",
                existing
            );
            return Ok(0);
        }

        let mut created = 0;
        for level in layout {
            let groups = [
                (VehicleCategory::TwoWheeler, level.two_wheeler),
                (VehicleCategory::FourWheeler, level.four_wheeler),
                (VehicleCategory::HeavyLoad, level.heavy_load),
            ];

            let mut slot_number = 0;
            for (category, count) in groups {
                for _ in 0..count {
                    slot_number += 1;
                    self.add_slot(level.level_number, slot_number, category)
                        .await?;
                    created += 1;
                }
            }
        }

        info!("Seeded {} slots across {} levels", created, layout.len());
        Ok(created)
    }

    pub async fn vehicle(&self, vehicle_id: Uuid) -> ParkingResult<Vehicle> {
        self.store
            .find_vehicle(vehicle_id)
            .await?
            .ok_or_else(|| ParkingError::NotFound("Vehicle not found".to_string()))
    }

    pub async fn resolve_vehicle(&self, vehicle: &VehicleRef) -> ParkingResult<Vehicle> {
        match vehicle {
            VehicleRef::Id(id) => self.vehicle(*id).await,
            VehicleRef::Plate {
                license_plate,
                owner_id,
            } => {
                let license_plate = normalize_license_plate(license_plate)?;
                self.store
                    .find_vehicle_by_plate(&license_plate)
                    .await?
                    .filter(|v| owner_id.is_none_or(|owner| owner == v.owner_id))
                    .ok_or_else(|| ParkingError::NotFound("Vehicle not found".to_string()))
            }
        }
    }

    /// Park a vehicle in the lowest free slot of its category
    pub async fn allocate(&self, vehicle_id: Uuid) -> ParkingResult<Allocation> {
        let vehicle = self.vehicle(vehicle_id).await?;
        self.ensure_can_park(&vehicle).await?;

        let mut lost_races = 0;
        loop {
            let Some(slot) = self.store.find_available(vehicle.category).await? else {
                return Err(self.no_capacity(vehicle.category).await?);
            };

            if self.store.reserve(slot.id).await? {
                return self.open_on_reserved(&vehicle, slot).await;
            }

            lost_races += 1;
            if lost_races > RESERVE_RETRIES {
                warn!(
                    "Vehicle {} lost the reservation race {} times, giving up",
                    vehicle.license_plate, lost_races
                );
                return Err(ParkingError::Conflict(
                    "Lost the race for a free slot, please retry".to_string(),
                ));
            }

            warn!(
                "Slot {} was taken before vehicle {} could reserve it, retrying",
                slot.id, vehicle.license_plate
            );
        }
    }

    /// Park a vehicle in a specific slot
    pub async fn allocate_slot(&self, vehicle_id: Uuid, slot_id: Uuid) -> ParkingResult<Allocation> {
        let vehicle = self.vehicle(vehicle_id).await?;
        self.ensure_can_park(&vehicle).await?;

        let slot = self
            .store
            .find_slot(slot_id)
            .await?
            .filter(|slot| slot.category == vehicle.category)
            .ok_or_else(|| {
                ParkingError::NotFound("Slot not available for this vehicle".to_string())
            })?;

        if !self.store.reserve(slot.id).await? {
            return Err(ParkingError::Conflict(format!(
                "Slot {} on level {} is already occupied",
                slot.slot_number, slot.level_number
            )));
        }

        self.open_on_reserved(&vehicle, slot).await
    }

    /// Close the vehicle's open session, bill it, and free its slot
    pub async fn checkout(&self, vehicle_id: Uuid) -> ParkingResult<CheckoutReceipt> {
        let vehicle = self.vehicle(vehicle_id).await?;

        let session = self
            .store
            .most_recent(&SessionSelector::Vehicle(vehicle.id), true)
            .await?
            .ok_or_else(|| ParkingError::NotFound("No active parking record found".to_string()))?;

        let exit_time = self.clock.now();
        let closed = self
            .store
            .close_session(session.id, exit_time, self.settings.rate_per_hour)
            .await
            .inspect_err(|e| {
                if e.is_internal() {
                    error!("Failed to close parking session {}: {}", session.id, e);
                }
            })?;

        // The slot is released only once the session is durably closed.
        self.release_closed_slot(&closed).await?;

        let details = closed.payment_details.clone().ok_or_else(|| {
            ParkingError::Internal(format!("Session {} closed without an invoice", closed.id))
        })?;

        info!(
            "Vehicle {} checked out of slot {}: {} hour(s), amount {}",
            vehicle.license_plate, closed.slot_id, details.duration_hours, details.amount
        );

        Ok(CheckoutReceipt {
            session_id: closed.id,
            slot_id: closed.slot_id,
            details,
        })
    }

    /// Mark a checked-out session paid. Paying twice returns the first result.
    pub async fn settle(&self, selector: &SessionSelector) -> ParkingResult<Settlement> {
        let selector = match selector {
            SessionSelector::Plate {
                license_plate,
                owner_id,
            } => SessionSelector::Plate {
                license_plate: normalize_license_plate(license_plate)?,
                owner_id: *owner_id,
            },
            other => other.clone(),
        };

        let session = self
            .store
            .most_recent(&selector, false)
            .await?
            .ok_or_else(|| ParkingError::NotFound("Parking record not found".to_string()))?;

        let already_settled = session.payment_status == PaymentStatus::Success;
        let settled = self
            .store
            .settle_payment(session.id, self.clock.now())
            .await?;

        let invoice_details = settled.payment_details.clone().ok_or_else(|| {
            ParkingError::Internal(format!("Settled session {} has no invoice", settled.id))
        })?;

        if already_settled {
            info!("Payment for session {} was already completed", settled.id);
        } else {
            info!(
                "Payment of {} settled for session {}",
                invoice_details.amount, settled.id
            );
        }

        Ok(Settlement {
            session_id: settled.id,
            already_settled,
            invoice_details,
        })
    }

    pub async fn availability(&self) -> ParkingResult<Vec<LevelAvailability>> {
        self.store.snapshot_by_level().await
    }

    pub async fn session(&self, session_id: Uuid) -> ParkingResult<ParkingSession> {
        self.store
            .find_session(session_id)
            .await?
            .ok_or_else(|| ParkingError::NotFound("Parking record not found".to_string()))
    }

    pub async fn vehicle_history(&self, vehicle_id: Uuid) -> ParkingResult<Vec<ParkingSession>> {
        let vehicle = self.vehicle(vehicle_id).await?;
        self.store.sessions_for_vehicle(vehicle.id).await
    }

    /// Cross-check the registry against the ledger.
    ///
    /// Reads the two sides one after the other, so operations in flight can
    /// show up as transient violations; run it on a quiet facility.
    pub async fn audit(&self) -> ParkingResult<Vec<OccupancyViolation>> {
        let levels = self.store.snapshot_by_level().await?;
        let open_sessions = self.store.open_sessions().await?;

        let mut occupied = HashSet::new();
        let mut known = HashSet::new();
        for category in levels.iter().flat_map(|level| level.categories.values()) {
            for slot in &category.occupied {
                occupied.insert(slot.slot_id);
                known.insert(slot.slot_id);
            }
            for slot in &category.available {
                known.insert(slot.slot_id);
            }
        }

        let mut by_slot: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for session in &open_sessions {
            by_slot.entry(session.slot_id).or_default().push(session.id);
        }

        let mut violations = Vec::new();
        for session in &open_sessions {
            if !known.contains(&session.slot_id) {
                violations.push(OccupancyViolation::SessionOnUnknownSlot {
                    session_id: session.id,
                    slot_id: session.slot_id,
                });
            } else if !occupied.contains(&session.slot_id) {
                violations.push(OccupancyViolation::SessionOnFreeSlot {
                    session_id: session.id,
                    slot_id: session.slot_id,
                });
            }
        }
        for (slot_id, session_ids) in &by_slot {
            if session_ids.len() > 1 {
                violations.push(OccupancyViolation::SharedSlot {
                    slot_id: *slot_id,
                    session_ids: session_ids.clone(),
                });
            }
        }
        for slot_id in &occupied {
            if !by_slot.contains_key(slot_id) {
                violations.push(OccupancyViolation::OccupiedWithoutSession { slot_id: *slot_id });
            }
        }

        for violation in &violations {
            error!("Occupancy invariant violated: {:?}", violation);
        }

        Ok(violations)
    }

    async fn release_closed_slot(&self, closed: &ParkingSession) -> ParkingResult<()> {
        let mut attempt = 1;
        loop {
            match self.store.release(closed.slot_id).await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    error!(
                        "Slot {} was already free when session {} closed",
                        closed.slot_id, closed.id
                    );
                    return Ok(());
                }
                Err(e) if attempt < RELEASE_ATTEMPTS => {
                    warn!(
                        "Releasing slot {} for session {} failed (attempt {}/{}): {}",
                        closed.slot_id, closed.id, attempt, RELEASE_ATTEMPTS, e
                    );
                    tokio::time::sleep(RELEASE_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "Session {} closed but slot {} could not be released: {}",
                        closed.id, closed.slot_id, e
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn ensure_can_park(&self, vehicle: &Vehicle) -> ParkingResult<()> {
        if self.store.has_open_session(vehicle.id).await? {
            return Err(ParkingError::Conflict("Vehicle is already parked".to_string()));
        }

        if !self.settings.allow_parking_with_unpaid
            && self.store.has_unsettled_session(vehicle.id).await?
        {
            return Err(ParkingError::Conflict(
                "Vehicle has an outstanding payment; settle it before parking again".to_string(),
            ));
        }

        Ok(())
    }

    async fn no_capacity(&self, category: VehicleCategory) -> ParkingResult<ParkingError> {
        if self.store.has_category(category).await? {
            Ok(ParkingError::NotFound(format!(
                "No capacity for {} vehicles",
                category
            )))
        } else {
            Ok(ParkingError::InvalidCategory(category))
        }
    }

    /// Open the session on a slot this call already reserved, releasing the
    /// slot again if the session cannot be opened.
    async fn open_on_reserved(&self, vehicle: &Vehicle, slot: Slot) -> ParkingResult<Allocation> {
        let entry_time = self.clock.now();
        match self.store.open_session(vehicle.id, slot.id, entry_time).await {
            Ok(session) => {
                info!(
                    "Vehicle {} parked in slot {} on level {} (session {})",
                    vehicle.license_plate, slot.slot_number, slot.level_number, session.id
                );
                Ok(Allocation {
                    session_id: session.id,
                    vehicle_id: vehicle.id,
                    slot_id: slot.id,
                    level_number: slot.level_number,
                    slot_number: slot.slot_number,
                    entry_time: session.entry_time,
                })
            }
            Err(open_err) => {
                warn!(
                    "Opening a session for {} failed, releasing slot {}: {}",
                    vehicle.license_plate, slot.id, open_err
                );
                if let Err(release_err) = self.store.release(slot.id).await {
                    error!(
                        "Slot {} left occupied after failed session open: {}",
                        slot.id, release_err
                    );
                }
                Err(open_err)
            }
        }
    }
}
