//! Tests against a live PostgreSQL database.
//!
//! Run with `DATABASE_URL=... cargo test -p parking -- --ignored`.

use chrono::{Duration, Utc};
use common::database::{DatabaseConfig, init_pool};
use parking::{
    ParkingError,
    models::{PaymentStatus, SessionSelector, Slot, Vehicle, VehicleCategory},
    store::{PgStore, SessionLedger, SlotRegistry, VehicleDirectory},
};
use uuid::Uuid;

async fn store() -> PgStore {
    let config = DatabaseConfig::from_env().expect("database config");
    let pool = init_pool(&config).await.expect("database pool");
    let store = PgStore::new(pool);
    store.migrate().await.expect("migrations");
    store
}

// Levels far from any seeded layout keep runs independent of each other.
fn unique_level() -> i32 {
    1_000 + (Uuid::new_v4().as_u128() % 1_000_000) as i32
}

fn plate() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_uppercase()
}

async fn vehicle(store: &PgStore, category: VehicleCategory) -> Vehicle {
    store
        .insert_vehicle(Vehicle {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            license_plate: plate(),
            category,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

async fn slot(store: &PgStore, level_number: i32, slot_number: i32) -> Slot {
    store
        .add_slot(Slot {
            id: Uuid::new_v4(),
            level_number,
            slot_number,
            category: VehicleCategory::HeavyLoad,
            is_occupied: false,
        })
        .await
        .unwrap()
}

#[tokio::test]
#[ignore]
async fn test_reserve_is_compare_and_set() {
    let store = store().await;
    let slot = slot(&store, unique_level(), 1).await;

    assert!(store.reserve(slot.id).await.unwrap());
    assert!(!store.reserve(slot.id).await.unwrap());
    assert!(store.release(slot.id).await.unwrap());
    assert!(!store.release(slot.id).await.unwrap());

    let err = store.reserve(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ParkingError::NotFound(_)));
}

#[tokio::test]
#[ignore]
async fn test_duplicate_position_and_plate_conflict() {
    let store = store().await;
    let level = unique_level();
    slot(&store, level, 1).await;

    let err = store
        .add_slot(Slot {
            id: Uuid::new_v4(),
            level_number: level,
            slot_number: 1,
            category: VehicleCategory::TwoWheeler,
            is_occupied: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ParkingError::Conflict(_)));

    let existing = vehicle(&store, VehicleCategory::TwoWheeler).await;
    let err = store
        .insert_vehicle(Vehicle {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            license_plate: existing.license_plate.clone(),
            category: VehicleCategory::TwoWheeler,
            created_at: Utc::now(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ParkingError::Conflict(_)));

    let found = store
        .find_vehicle_by_plate(&existing.license_plate)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, existing.id);
}

#[tokio::test]
#[ignore]
async fn test_session_lifecycle() {
    let store = store().await;
    let level = unique_level();
    let first = slot(&store, level, 1).await;
    let second = slot(&store, level, 2).await;
    let truck = vehicle(&store, VehicleCategory::HeavyLoad).await;

    let entry = Utc::now();
    let session = store.open_session(truck.id, first.id, entry).await.unwrap();
    assert!(store.has_open_session(truck.id).await.unwrap());

    // The partial unique index rejects a second open session
    let err = store
        .open_session(truck.id, second.id, entry)
        .await
        .unwrap_err();
    assert!(matches!(err, ParkingError::Conflict(_)));

    let closed = store
        .close_session(session.id, entry + Duration::minutes(130), 20)
        .await
        .unwrap();
    assert_eq!(closed.amount, Some(40));
    assert!(store.has_unsettled_session(truck.id).await.unwrap());

    let err = store
        .close_session(session.id, entry + Duration::hours(5), 20)
        .await
        .unwrap_err();
    assert!(matches!(err, ParkingError::AlreadyClosed(_)));

    let paid_on = entry + Duration::hours(3);
    let settled = store.settle_payment(session.id, paid_on).await.unwrap();
    assert_eq!(settled.payment_status, PaymentStatus::Success);

    let again = store
        .settle_payment(session.id, paid_on + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(again.payment_details, settled.payment_details);

    let latest = store
        .most_recent(
            &SessionSelector::Plate {
                license_plate: truck.license_plate.clone(),
                owner_id: Some(truck.owner_id),
            },
            false,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, session.id);
    assert!(!store.has_unsettled_session(truck.id).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_most_recent_breaks_timestamp_ties_by_insertion() {
    let store = store().await;
    let first_slot = slot(&store, unique_level(), 1).await;
    let second_slot = slot(&store, unique_level(), 1).await;
    let truck = vehicle(&store, VehicleCategory::HeavyLoad).await;

    let instant = Utc::now();
    let earlier = store
        .open_session(truck.id, first_slot.id, instant)
        .await
        .unwrap();
    store.close_session(earlier.id, instant, 20).await.unwrap();
    let later = store
        .open_session(truck.id, second_slot.id, instant)
        .await
        .unwrap();

    let latest = store
        .most_recent(&SessionSelector::Vehicle(truck.id), false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, later.id);

    let history: Vec<Uuid> = store
        .sessions_for_vehicle(truck.id)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(history, vec![later.id, earlier.id]);
}
