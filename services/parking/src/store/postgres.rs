//! PostgreSQL store
//!
//! Concurrency rests on the database:
//! - `reserve` is `UPDATE ... WHERE is_occupied = FALSE`; one caller sees a
//!   row affected, every other caller sees zero.
//! - the partial unique index `parking_records_one_open_per_vehicle` makes
//!   `open_session` an atomic insert-if-absent.
//! - close and settle lock the record row (`FOR UPDATE`) for the transition.

use chrono::{DateTime, Utc};
use common::error::DatabaseError;
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use tracing::{debug, info};
use uuid::Uuid;

use super::{SessionLedger, SlotRegistry, VehicleDirectory};
use crate::error::{ParkingError, ParkingResult};
use crate::models::{
    LevelAvailability, ParkingSession, PaymentDetails, PaymentStatus, SessionSelector, Slot,
    Vehicle, VehicleCategory,
};

const SESSION_SELECT: &str = r#"
    SELECT r.id, r.vehicle_id, r.slot_id, r.entry_time, r.exit_time, r.amount,
           r.payment_status, r.payment_details, r.created_at, v.license_plate
    FROM parking_records r
    JOIN vehicles v ON v.id = r.vehicle_id
"#;

/// sqlx-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> ParkingResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        info!("Parking schema migrations applied");
        Ok(())
    }

    async fn slot_exists(&self, slot_id: Uuid) -> ParkingResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM parking_slots WHERE id = $1)")
                .bind(slot_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

fn parse_category(raw: &str) -> ParkingResult<VehicleCategory> {
    raw.parse().map_err(|_| {
        ParkingError::Internal(format!("Unknown vehicle category in storage: {}", raw))
    })
}

fn slot_from_row(row: &PgRow) -> ParkingResult<Slot> {
    let category: String = row.try_get("category")?;
    Ok(Slot {
        id: row.try_get("id")?,
        level_number: row.try_get("level_number")?,
        slot_number: row.try_get("slot_number")?,
        category: parse_category(&category)?,
        is_occupied: row.try_get("is_occupied")?,
    })
}

fn vehicle_from_row(row: &PgRow) -> ParkingResult<Vehicle> {
    let category: String = row.try_get("category")?;
    Ok(Vehicle {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        license_plate: row.try_get("license_plate")?,
        category: parse_category(&category)?,
        created_at: row.try_get("created_at")?,
    })
}

fn session_from_row(row: &PgRow) -> ParkingResult<ParkingSession> {
    let payment_status: String = row.try_get("payment_status")?;
    let payment_details: Option<Json<PaymentDetails>> = row.try_get("payment_details")?;
    Ok(ParkingSession {
        id: row.try_get("id")?,
        vehicle_id: row.try_get("vehicle_id")?,
        slot_id: row.try_get("slot_id")?,
        entry_time: row.try_get("entry_time")?,
        exit_time: row.try_get("exit_time")?,
        amount: row.try_get("amount")?,
        payment_status: payment_status.parse::<PaymentStatus>()?,
        payment_details: payment_details.map(|details| details.0),
        created_at: row.try_get("created_at")?,
    })
}

fn session_not_found(session_id: Uuid) -> ParkingError {
    ParkingError::NotFound(format!("Parking session {} not found", session_id))
}

impl SlotRegistry for PgStore {
    async fn add_slot(&self, slot: Slot) -> ParkingResult<Slot> {
        let row = sqlx::query(
            r#"
            INSERT INTO parking_slots (id, level_number, slot_number, category, is_occupied)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (level_number, slot_number) DO NOTHING
            RETURNING id, level_number, slot_number, category, is_occupied
            "#,
        )
        .bind(slot.id)
        .bind(slot.level_number)
        .bind(slot.slot_number)
        .bind(slot.category.as_str())
        .bind(slot.is_occupied)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => slot_from_row(&row),
            None => Err(ParkingError::Conflict(format!(
                "Slot {} already exists on level {}",
                slot.slot_number, slot.level_number
            ))),
        }
    }

    async fn find_slot(&self, slot_id: Uuid) -> ParkingResult<Option<Slot>> {
        let row = sqlx::query(
            r#"
            SELECT id, level_number, slot_number, category, is_occupied
            FROM parking_slots
            WHERE id = $1
            "#,
        )
        .bind(slot_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(slot_from_row).transpose()
    }

    async fn find_available(&self, category: VehicleCategory) -> ParkingResult<Option<Slot>> {
        let row = sqlx::query(
            r#"
            SELECT id, level_number, slot_number, category, is_occupied
            FROM parking_slots
            WHERE category = $1 AND is_occupied = FALSE
            ORDER BY level_number, slot_number
            LIMIT 1
            "#,
        )
        .bind(category.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(slot_from_row).transpose()
    }

    async fn has_category(&self, category: VehicleCategory) -> ParkingResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM parking_slots WHERE category = $1)")
                .bind(category.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn slot_count(&self) -> ParkingResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM parking_slots")
            .fetch_one(&self.pool)
            .await?;
        usize::try_from(count)
            .map_err(|_| ParkingError::Internal(format!("Invalid slot count: {}", count)))
    }

    async fn reserve(&self, slot_id: Uuid) -> ParkingResult<bool> {
        let result = sqlx::query(
            "UPDATE parking_slots SET is_occupied = TRUE WHERE id = $1 AND is_occupied = FALSE",
        )
        .bind(slot_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        if !self.slot_exists(slot_id).await? {
            return Err(ParkingError::NotFound(format!("Slot {} not found", slot_id)));
        }

        debug!("Slot {} already occupied, reservation refused", slot_id);
        Ok(false)
    }

    async fn release(&self, slot_id: Uuid) -> ParkingResult<bool> {
        let result = sqlx::query(
            "UPDATE parking_slots SET is_occupied = FALSE WHERE id = $1 AND is_occupied = TRUE",
        )
        .bind(slot_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        if !self.slot_exists(slot_id).await? {
            return Err(ParkingError::NotFound(format!("Slot {} not found", slot_id)));
        }

        Ok(false)
    }

    async fn snapshot_by_level(&self) -> ParkingResult<Vec<LevelAvailability>> {
        // One statement, one MVCC snapshot.
        let rows = sqlx::query(
            r#"
            SELECT id, level_number, slot_number, category, is_occupied
            FROM parking_slots
            ORDER BY level_number, slot_number
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let slots = rows
            .iter()
            .map(slot_from_row)
            .collect::<ParkingResult<Vec<_>>>()?;

        Ok(LevelAvailability::from_slots(slots))
    }
}

impl VehicleDirectory for PgStore {
    async fn insert_vehicle(&self, vehicle: Vehicle) -> ParkingResult<Vehicle> {
        let row = sqlx::query(
            r#"
            INSERT INTO vehicles (id, owner_id, license_plate, category, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (license_plate) DO NOTHING
            RETURNING id, owner_id, license_plate, category, created_at
            "#,
        )
        .bind(vehicle.id)
        .bind(vehicle.owner_id)
        .bind(&vehicle.license_plate)
        .bind(vehicle.category.as_str())
        .bind(vehicle.created_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => vehicle_from_row(&row),
            None => Err(ParkingError::Conflict(format!(
                "Vehicle {} already registered",
                vehicle.license_plate
            ))),
        }
    }

    async fn find_vehicle(&self, id: Uuid) -> ParkingResult<Option<Vehicle>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, license_plate, category, created_at
            FROM vehicles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(vehicle_from_row).transpose()
    }

    async fn find_vehicle_by_plate(&self, license_plate: &str) -> ParkingResult<Option<Vehicle>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, license_plate, category, created_at
            FROM vehicles
            WHERE license_plate = $1
            "#,
        )
        .bind(license_plate)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(vehicle_from_row).transpose()
    }
}

impl SessionLedger for PgStore {
    async fn has_open_session(&self, vehicle_id: Uuid) -> ParkingResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM parking_records WHERE vehicle_id = $1 AND exit_time IS NULL)",
        )
        .bind(vehicle_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn has_unsettled_session(&self, vehicle_id: Uuid) -> ParkingResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM parking_records
                WHERE vehicle_id = $1 AND exit_time IS NOT NULL AND payment_status <> 'SUCCESS'
            )
            "#,
        )
        .bind(vehicle_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn open_session(
        &self,
        vehicle_id: Uuid,
        slot_id: Uuid,
        entry_time: DateTime<Utc>,
    ) -> ParkingResult<ParkingSession> {
        let session = ParkingSession::open(vehicle_id, slot_id, entry_time);

        let row = sqlx::query(
            r#"
            INSERT INTO parking_records (id, vehicle_id, slot_id, entry_time, payment_status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (vehicle_id) WHERE exit_time IS NULL DO NOTHING
            RETURNING id, vehicle_id, slot_id, entry_time, exit_time, amount,
                      payment_status, payment_details, created_at
            "#,
        )
        .bind(session.id)
        .bind(session.vehicle_id)
        .bind(session.slot_id)
        .bind(session.entry_time)
        .bind(session.payment_status.as_str())
        .bind(session.created_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => session_from_row(&row),
            None => Err(ParkingError::Conflict(format!(
                "Vehicle {} is already parked",
                vehicle_id
            ))),
        }
    }

    async fn close_session(
        &self,
        session_id: Uuid,
        exit_time: DateTime<Utc>,
        rate_per_hour: i64,
    ) -> ParkingResult<ParkingSession> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("{} WHERE r.id = $1 FOR UPDATE OF r", SESSION_SELECT);
        let row = sqlx::query(&sql)
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| session_not_found(session_id))?;

        let license_plate: String = row.try_get("license_plate")?;
        let mut session = session_from_row(&row)?;
        session.close(&license_plate, exit_time, rate_per_hour)?;

        sqlx::query(
            r#"
            UPDATE parking_records
            SET exit_time = $2, amount = $3, payment_status = $4, payment_details = $5
            WHERE id = $1
            "#,
        )
        .bind(session.id)
        .bind(session.exit_time)
        .bind(session.amount)
        .bind(session.payment_status.as_str())
        .bind(session.payment_details.clone().map(Json))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(session)
    }

    async fn settle_payment(
        &self,
        session_id: Uuid,
        paid_on: DateTime<Utc>,
    ) -> ParkingResult<ParkingSession> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("{} WHERE r.id = $1 FOR UPDATE OF r", SESSION_SELECT);
        let row = sqlx::query(&sql)
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| session_not_found(session_id))?;

        let mut session = session_from_row(&row)?;
        if !session.settle(paid_on)? {
            return Ok(session);
        }

        sqlx::query(
            r#"
            UPDATE parking_records
            SET payment_status = $2, payment_details = $3
            WHERE id = $1
            "#,
        )
        .bind(session.id)
        .bind(session.payment_status.as_str())
        .bind(session.payment_details.clone().map(Json))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(session)
    }

    async fn find_session(&self, session_id: Uuid) -> ParkingResult<Option<ParkingSession>> {
        let sql = format!("{} WHERE r.id = $1", SESSION_SELECT);
        let row = sqlx::query(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn most_recent(
        &self,
        selector: &SessionSelector,
        open_only: bool,
    ) -> ParkingResult<Option<ParkingSession>> {
        let filter = match selector {
            SessionSelector::Id(_) => "r.id = $1",
            SessionSelector::Vehicle(_) => "r.vehicle_id = $1",
            SessionSelector::Plate { .. } => {
                "v.license_plate = $1 AND ($2::uuid IS NULL OR v.owner_id = $2)"
            }
        };
        let open_filter = if open_only { " AND r.exit_time IS NULL" } else { "" };
        let sql = format!(
            "{} WHERE {}{} ORDER BY r.created_at DESC, r.seq DESC LIMIT 1",
            SESSION_SELECT, filter, open_filter
        );

        let query = sqlx::query(&sql);
        let query = match selector {
            SessionSelector::Id(id) => query.bind(*id),
            SessionSelector::Vehicle(vehicle_id) => query.bind(*vehicle_id),
            SessionSelector::Plate {
                license_plate,
                owner_id,
            } => query.bind(license_plate.clone()).bind(*owner_id),
        };

        let row = query.fetch_optional(&self.pool).await?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn open_sessions(&self) -> ParkingResult<Vec<ParkingSession>> {
        let sql = format!(
            "{} WHERE r.exit_time IS NULL ORDER BY r.created_at, r.seq",
            SESSION_SELECT
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(session_from_row).collect()
    }

    async fn sessions_for_vehicle(&self, vehicle_id: Uuid) -> ParkingResult<Vec<ParkingSession>> {
        let sql = format!(
            "{} WHERE r.vehicle_id = $1 ORDER BY r.created_at DESC, r.seq DESC",
            SESSION_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(vehicle_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(session_from_row).collect()
    }
}
