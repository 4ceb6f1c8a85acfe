use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use chrono::{Duration, TimeZone, Utc};
use parking::{
    AllocationService, AppState, clock::ManualClock, routes::create_router,
    service::ServiceSettings, store::MemoryStore,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

fn app() -> (Router, ManualClock) {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 7, 4, 12, 0, 0).unwrap());
    let service = AllocationService::new(
        MemoryStore::new(),
        Arc::new(clock.clone()),
        ServiceSettings::default(),
    );
    (create_router(AppState::new(service, None)), clock)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = app();
    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "parking-service");
}

#[tokio::test]
async fn test_full_parking_cycle_over_http() {
    let (app, clock) = app();
    let owner = Uuid::new_v4();

    let (status, _) = send(
        &app,
        "POST",
        "/parking/slots",
        Some(json!({"level_number": 0, "slot_number": 1, "category": "4-wheeler"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, vehicle) = send(
        &app,
        "POST",
        "/parking/vehicles",
        Some(json!({"owner_id": owner, "license_plate": "ka01ab1234", "category": "4-wheeler"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(vehicle["license_plate"], "KA01AB1234");

    let (status, allocation) = send(
        &app,
        "POST",
        "/parking/allocate",
        Some(json!({"license_plate": "KA01AB1234", "owner_id": owner})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(allocation["slot_number"], 1);
    let session_id = allocation["session_id"].as_str().unwrap().to_string();

    let (status, availability) = send(&app, "GET", "/parking/availability", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(availability[0]["categories"]["4-wheeler"]["total"], 1);
    assert_eq!(
        availability[0]["categories"]["4-wheeler"]["occupied"]
            .as_array()
            .unwrap()
            .len(),
        1
    );

    clock.advance(Duration::minutes(200));
    let (status, receipt) = send(
        &app,
        "POST",
        "/parking/checkout",
        Some(json!({"vehicle_id": vehicle["id"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["duration_hours"], 3);
    assert_eq!(receipt["amount"], 60);
    assert_eq!(receipt["payment_status"], "PENDING");

    let (status, settlement) = send(
        &app,
        "POST",
        "/parking/payment",
        Some(json!({"parking_record_id": session_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settlement["already_settled"], false);
    assert_eq!(settlement["invoice_details"]["payment_status"], "SUCCESS");

    let (status, session) = send(&app, "GET", &format!("/parking/sessions/{session_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["payment_status"], "SUCCESS");

    let (status, history) = send(
        &app,
        "GET",
        &format!("/parking/vehicles/{}/sessions", vehicle["id"].as_str().unwrap()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (status, audit) = send(&app, "GET", "/parking/audit", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(audit["consistent"], true);
}

#[tokio::test]
async fn test_error_responses_carry_kind() {
    let (app, _) = app();

    let (status, body) = send(
        &app,
        "POST",
        "/parking/vehicles",
        Some(json!({"owner_id": Uuid::new_v4(), "license_plate": "BUS1", "category": "hovercraft"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, _) = send(
        &app,
        "POST",
        "/parking/vehicles",
        Some(json!({"owner_id": Uuid::new_v4(), "license_plate": "BUS1", "category": "heavy-load"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        "POST",
        "/parking/allocate",
        Some(json!({"license_plate": "bus1"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_category");

    let (status, body) = send(
        &app,
        "POST",
        "/parking/checkout",
        Some(json!({"license_plate": "BUS1"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = send(&app, "POST", "/parking/payment", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, body) = send(
        &app,
        "GET",
        &format!("/parking/sessions/{}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_duplicate_slot_is_conflict() {
    let (app, _) = app();
    let slot = json!({"level_number": 2, "slot_number": 7, "category": "2-wheeler"});

    let (status, _) = send(&app, "POST", "/parking/slots", Some(slot.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, "POST", "/parking/slots", Some(slot)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}
