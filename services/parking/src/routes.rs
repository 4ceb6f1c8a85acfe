//! Parking service routes

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::{ParkingError, ParkingResult},
    models::{SessionSelector, VehicleCategory, VehicleRef},
    state::AppState,
    store::ParkingStore,
};

#[derive(Debug, Deserialize)]
pub struct AddSlotRequest {
    pub level_number: i32,
    pub slot_number: i32,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterVehicleRequest {
    pub owner_id: Uuid,
    pub license_plate: String,
    pub category: String,
}

/// Identify the vehicle by id, or by plate with an optional owner check
#[derive(Debug, Default, Deserialize)]
pub struct AllocateRequest {
    pub vehicle_id: Option<Uuid>,
    pub license_plate: Option<String>,
    pub owner_id: Option<Uuid>,
    /// Park in this slot instead of the first free one
    pub slot_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    pub vehicle_id: Option<Uuid>,
    pub license_plate: Option<String>,
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentRequest {
    pub parking_record_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub license_plate: Option<String>,
    pub owner_id: Option<Uuid>,
}

/// Create the router for the parking service
pub fn create_router<S: ParkingStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/parking/availability", get(availability::<S>))
        .route("/parking/slots", post(add_slot::<S>))
        .route("/parking/vehicles", post(register_vehicle::<S>))
        .route("/parking/vehicles/:id/sessions", get(vehicle_history::<S>))
        .route("/parking/allocate", post(allocate::<S>))
        .route("/parking/checkout", post(checkout::<S>))
        .route("/parking/payment", post(payment::<S>))
        .route("/parking/sessions/:id", get(get_session::<S>))
        .route("/parking/audit", get(audit::<S>))
        .with_state(state)
}

fn vehicle_ref(
    vehicle_id: Option<Uuid>,
    license_plate: Option<String>,
    owner_id: Option<Uuid>,
) -> ParkingResult<VehicleRef> {
    match (vehicle_id, license_plate) {
        (Some(id), _) => Ok(VehicleRef::Id(id)),
        (None, Some(license_plate)) => Ok(VehicleRef::Plate {
            license_plate,
            owner_id,
        }),
        (None, None) => Err(ParkingError::Validation(
            "Either vehicle_id or license_plate is required".to_string(),
        )),
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "parking-service"
    }))
}

/// Free and occupied slots per level and category
pub async fn availability<S: ParkingStore>(
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, ParkingError> {
    if let Some(cache) = &state.cache {
        if let Some(levels) = cache.get().await {
            return Ok(Json(levels));
        }
    }

    let read_at = state.cache.as_ref().map(|cache| cache.generation());
    let levels = state.service.availability().await?;
    if let (Some(cache), Some(read_at)) = (&state.cache, read_at) {
        cache.put(read_at, &levels).await;
    }

    Ok(Json(levels))
}

pub async fn add_slot<S: ParkingStore>(
    State(state): State<AppState<S>>,
    Json(payload): Json<AddSlotRequest>,
) -> Result<impl IntoResponse, ParkingError> {
    let category: VehicleCategory = payload.category.parse()?;
    let slot = state
        .service
        .add_slot(payload.level_number, payload.slot_number, category)
        .await?;

    if let Some(cache) = &state.cache {
        cache.invalidate().await;
    }

    Ok((StatusCode::CREATED, Json(slot)))
}

pub async fn register_vehicle<S: ParkingStore>(
    State(state): State<AppState<S>>,
    Json(payload): Json<RegisterVehicleRequest>,
) -> Result<impl IntoResponse, ParkingError> {
    let category: VehicleCategory = payload.category.parse()?;
    let vehicle = state
        .service
        .register_vehicle(payload.owner_id, &payload.license_plate, category)
        .await?;

    Ok((StatusCode::CREATED, Json(vehicle)))
}

/// Park a vehicle
pub async fn allocate<S: ParkingStore>(
    State(state): State<AppState<S>>,
    Json(payload): Json<AllocateRequest>,
) -> Result<impl IntoResponse, ParkingError> {
    let vehicle = state
        .service
        .resolve_vehicle(&vehicle_ref(
            payload.vehicle_id,
            payload.license_plate,
            payload.owner_id,
        )?)
        .await?;

    let allocation = match payload.slot_id {
        Some(slot_id) => state.service.allocate_slot(vehicle.id, slot_id).await?,
        None => state.service.allocate(vehicle.id).await?,
    };

    if let Some(cache) = &state.cache {
        cache.invalidate().await;
    }

    Ok((StatusCode::CREATED, Json(allocation)))
}

/// Close the open session and return the fee breakdown
pub async fn checkout<S: ParkingStore>(
    State(state): State<AppState<S>>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ParkingError> {
    let vehicle = state
        .service
        .resolve_vehicle(&vehicle_ref(
            payload.vehicle_id,
            payload.license_plate,
            payload.owner_id,
        )?)
        .await?;

    let receipt = state.service.checkout(vehicle.id).await?;

    if let Some(cache) = &state.cache {
        cache.invalidate().await;
    }

    Ok(Json(receipt))
}

/// Mark a checked-out session as paid
pub async fn payment<S: ParkingStore>(
    State(state): State<AppState<S>>,
    Json(payload): Json<PaymentRequest>,
) -> Result<impl IntoResponse, ParkingError> {
    let selector = match (
        payload.parking_record_id,
        payload.vehicle_id,
        payload.license_plate,
    ) {
        (Some(id), _, _) => SessionSelector::Id(id),
        (None, Some(vehicle_id), _) => SessionSelector::Vehicle(vehicle_id),
        (None, None, Some(license_plate)) => SessionSelector::Plate {
            license_plate,
            owner_id: payload.owner_id,
        },
        (None, None, None) => {
            return Err(ParkingError::Validation(
                "One of parking_record_id, vehicle_id or license_plate is required".to_string(),
            ));
        }
    };

    let settlement = state.service.settle(&selector).await?;

    Ok(Json(settlement))
}

pub async fn get_session<S: ParkingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ParkingError> {
    let session = state.service.session(id).await?;

    Ok(Json(session))
}

pub async fn vehicle_history<S: ParkingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ParkingError> {
    let sessions = state.service.vehicle_history(id).await?;

    Ok(Json(sessions))
}

/// Registry and ledger consistency report
pub async fn audit<S: ParkingStore>(
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, ParkingError> {
    let violations = state.service.audit().await?;

    Ok(Json(json!({
        "consistent": violations.is_empty(),
        "violations": violations,
    })))
}
