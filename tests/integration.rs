use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Duration, TimeZone, Utc};
use driver_governance::api::rest::router;
use driver_governance::clock::ManualClock;
use driver_governance::engine::sweep::sweep_once;
use driver_governance::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 1, 8, 0, 0).unwrap()
}

fn setup() -> (axum::Router, Arc<AppState>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let state = Arc::new(AppState::new(1024, clock.clone()));
    (router(state.clone()), state, clock)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn call(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn register(app: &axum::Router, name: &str, class: &str, rating: f64) -> String {
    let (status, body) = call(
        app,
        json_request(
            "POST",
            "/drivers",
            json!({
                "name": name,
                "vehicle_class": class,
                "is_verified": true,
                "rating": rating,
                "languages": ["sw", "en"]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["id"].as_str().unwrap().to_string()
}

async fn register_online(app: &axum::Router, name: &str, class: &str, rating: f64) -> String {
    let id = register(app, name, class, rating).await;
    let (status, _) = call(app, json_request("POST", &format!("/drivers/{id}/online"), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    id
}

async fn create_bike_booking(app: &axum::Router) -> Value {
    let (status, body) = call(
        app,
        json_request(
            "POST",
            "/bookings",
            json!({
                "kind": { "type": "ride", "passengers": 1 },
                "pickup": { "lat": -6.8161, "lng": 39.2803 },
                "dropoff": { "lat": -6.7735, "lng": 39.2406 },
                "vehicle_class": "Bike",
                "base_distance": 5000
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

async fn accept(app: &axum::Router, booking_id: &str, driver_id: &str) -> (StatusCode, Value) {
    call(
        app,
        json_request(
            "POST",
            &format!("/bookings/{booking_id}/accept"),
            json!({ "driver_id": driver_id }),
        ),
    )
    .await
}

async fn driver_cancel(app: &axum::Router, booking_id: &str, driver_id: &str) -> (StatusCode, Value) {
    call(
        app,
        json_request(
            "POST",
            &format!("/bookings/{booking_id}/driver-cancel"),
            json!({ "driver_id": driver_id }),
        ),
    )
    .await
}

async fn effective_rate(app: &axum::Router, driver_id: &str) -> i64 {
    let (_, body) = call(app, get_request(&format!("/drivers/{driver_id}/rate"))).await;
    body["effective_rate"].as_i64().unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state, _clock) = setup();
    let (status, body) = call(&app, get_request("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["bookings"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state, _clock) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("driver_cancellations_total"));
}

#[tokio::test]
async fn register_driver_starts_first_membership_month() {
    let (app, _state, _clock) = setup();
    let (status, body) = call(
        &app,
        json_request(
            "POST",
            "/drivers",
            json!({ "name": "Asha", "vehicle_class": "Car", "is_verified": true }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["membership"]["status"], "Active");
    assert_eq!(body["membership"]["current_month"], 1);
    assert_eq!(body["is_online"], false);
    assert_eq!(body["rating"], 5.0);
    assert_eq!(body["version"], 0);
}

#[tokio::test]
async fn rate_change_is_bounded_and_cooled_down() {
    let (app, _state, clock) = setup();
    let id = register(&app, "Hamisi", "Bike", 4.5).await;

    let (status, body) = call(
        &app,
        json_request("PUT", &format!("/drivers/{id}/rate"), json!({ "rate": 3200 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("above the maximum of 3000"));

    let (status, body) = call(
        &app,
        json_request("PUT", &format!("/drivers/{id}/rate"), json!({ "rate": 2900 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["effective_rate"], 2900);
    assert_eq!(body["legal_minimum"], 2500);
    assert_eq!(body["max_allowed"], 3000);

    let (status, _) = call(
        &app,
        json_request("PUT", &format!("/drivers/{id}/rate"), json!({ "rate": 2800 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    clock.advance(Duration::minutes(31));
    let (status, _) = call(
        &app,
        json_request("PUT", &format!("/drivers/{id}/rate"), json!({ "rate": 2800 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn stale_version_is_a_conflict() {
    let (app, _state, _clock) = setup();
    let id = register(&app, "Rehema", "Car", 4.5).await;

    let (status, _) = call(
        &app,
        json_request(
            "PUT",
            &format!("/drivers/{id}/rate"),
            json!({ "rate": 4500, "expected_version": 7 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn quote_with_off_route_stop() {
    let (app, _state, _clock) = setup();
    let (status, body) = call(
        &app,
        json_request(
            "POST",
            "/quotes",
            json!({
                "vehicle_class": "Bike",
                "base_distance": 5000,
                "waypoints": [{
                    "location": { "lat": -6.79, "lng": 39.21 },
                    "is_on_route": false,
                    "detour_distance": 2000
                }]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fare"]["total_distance"], 7000);
    assert_eq!(body["fare"]["base_fare"], 17500);
    assert_eq!(body["fare"]["waypoint_fees"], 10000);
    assert_eq!(body["fare"]["total_fare"], 27500);
    assert!(body["hourly_fare"].is_null());
}

#[tokio::test]
async fn hourly_quote_rejected_for_bikes() {
    let (app, _state, _clock) = setup();
    let (status, _) = call(
        &app,
        json_request(
            "POST",
            "/quotes",
            json!({ "vehicle_class": "Bike", "base_distance": 1000, "hours": 2 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = call(
        &app,
        json_request(
            "POST",
            "/quotes",
            json!({ "vehicle_class": "Van", "base_distance": 1000, "hours": 2 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hourly_fare"], 90000);
}

#[tokio::test]
async fn penalty_locks_rate_until_it_expires() {
    let (app, _state, clock) = setup();
    let driver = register_online(&app, "Salim", "Bike", 4.6).await;
    let (status, _) = call(
        &app,
        json_request("PUT", &format!("/drivers/{driver}/rate"), json!({ "rate": 2900 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let booking = create_bike_booking(&app).await;
    let booking_id = booking["booking"]["id"].as_str().unwrap();
    let (status, accepted) = accept(&app, booking_id, &driver).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["fare"]["rate_per_km"], 2900);

    let (status, cancelled) = driver_cancel(&app, booking_id, &driver).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["driver"]["cancellation_count"], 1);
    assert_eq!(cancelled["driver"]["penalty"]["locked_rate"], 2500);
    assert_eq!(cancelled["booking"]["status"], "Searching");

    clock.advance(Duration::hours(1));
    assert_eq!(effective_rate(&app, &driver).await, 2500);

    let (status, _) = call(
        &app,
        json_request("PUT", &format!("/drivers/{driver}/rate"), json!({ "rate": 2700 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    clock.advance(Duration::hours(48));
    assert_eq!(effective_rate(&app, &driver).await, 2900);
}

#[tokio::test]
async fn repeated_driver_cancellations_exclude_every_canceller() {
    let (app, state, _clock) = setup();
    let mut drivers = Vec::new();
    for (name, rating) in [("A", 4.9), ("B", 4.8), ("C", 4.7), ("D", 4.6), ("E", 4.5)] {
        drivers.push(register_online(&app, name, "Bike", rating).await);
    }

    let created = create_bike_booking(&app).await;
    let booking_id = created["booking"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["candidates_to_notify"].as_array().unwrap().len(), 5);

    let mut last = Value::Null;
    for canceller in drivers.iter().take(3) {
        let (status, _) = accept(&app, &booking_id, canceller).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = driver_cancel(&app, &booking_id, canceller).await;
        assert_eq!(status, StatusCode::OK);

        let notified: Vec<&str> = body["candidates_to_notify"]
            .as_array()
            .unwrap()
            .iter()
            .map(|id| id.as_str().unwrap())
            .collect();
        assert!(!notified.contains(&canceller.as_str()));
        last = body;
    }

    let previous: Vec<&str> = last["booking"]["previous_drivers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|id| id.as_str().unwrap())
        .collect();
    assert_eq!(previous, vec![drivers[0].as_str(), drivers[1].as_str(), drivers[2].as_str()]);
    assert_eq!(last["booking"]["rebooking_attempts"], 3);
    assert_eq!(
        last["candidates_to_notify"],
        json!([drivers[3], drivers[4]])
    );
    assert_eq!(last["customer_notice"], "Still searching for a driver (attempt 3).");

    let (status, _) = accept(&app, &booking_id, &drivers[0]).await;
    assert_eq!(status, StatusCode::CONFLICT);

    assert_eq!(state.cancellations.len(), 3);
    let (_, logs) = call(&app, get_request("/cancellations")).await;
    assert_eq!(logs.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn stale_driver_cancel_does_not_double_penalise() {
    let (app, state, _clock) = setup();
    let first = register_online(&app, "First", "Bike", 4.9).await;
    let second = register_online(&app, "Second", "Bike", 4.8).await;

    let created = create_bike_booking(&app).await;
    let booking_id = created["booking"]["id"].as_str().unwrap().to_string();

    accept(&app, &booking_id, &first).await;
    let (status, _) = driver_cancel(&app, &booking_id, &first).await;
    assert_eq!(status, StatusCode::OK);
    accept(&app, &booking_id, &second).await;

    let (status, _) = driver_cancel(&app, &booking_id, &first).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, driver) = call(&app, get_request(&format!("/drivers/{first}"))).await;
    assert_eq!(driver["cancellation_count"], 1);
    assert_eq!(state.cancellations.len(), 1);
}

#[tokio::test]
async fn booking_completes_and_counts_the_trip() {
    let (app, _state, _clock) = setup();
    let driver = register_online(&app, "Msafiri", "Bike", 4.4).await;
    let created = create_bike_booking(&app).await;
    let booking_id = created["booking"]["id"].as_str().unwrap().to_string();
    accept(&app, &booking_id, &driver).await;

    let mut status_name = Value::Null;
    for _ in 0..3 {
        let (status, body) = call(
            &app,
            json_request("POST", &format!("/bookings/{booking_id}/advance"), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        status_name = body["status"].clone();
    }
    assert_eq!(status_name, "Completed");

    let (_, body) = call(&app, get_request(&format!("/drivers/{driver}"))).await;
    assert_eq!(body["trip_count"], 1);
}

#[tokio::test]
async fn lapsed_membership_deactivates_and_blocks_going_online() {
    let (app, state, clock) = setup();
    let driver = register_online(&app, "Kassim", "Bajaj", 4.3).await;

    clock.advance(Duration::days(31));
    let report = sweep_once(&state);
    assert_eq!(report.transitions, 1);

    let (_, body) = call(&app, get_request(&format!("/drivers/{driver}"))).await;
    assert_eq!(body["membership"]["status"], "Deactivated");
    assert_eq!(body["is_online"], false);

    let (status, body) = call(
        &app,
        json_request("POST", &format!("/drivers/{driver}/online"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "deactivated, pay to reactivate");

    let created = call(
        &app,
        json_request(
            "POST",
            "/bookings",
            json!({
                "kind": {
                    "type": "parcel",
                    "description": "spare parts",
                    "weight_kg": 4,
                    "recipient_name": "Mwajuma",
                    "recipient_phone": "+255711000000"
                },
                "pickup": { "lat": -6.8, "lng": 39.28 },
                "dropoff": { "lat": -6.78, "lng": 39.25 },
                "vehicle_class": "Bajaj",
                "base_distance": 3000
            }),
        ),
    )
    .await;
    assert_eq!(created.1["candidates_to_notify"], json!([]));
}

#[tokio::test]
async fn uploaded_proof_grants_grace_until_admin_decides() {
    let (app, state, clock) = setup();
    let driver = register_online(&app, "Upendo", "Car", 4.8).await;

    clock.advance(Duration::days(24));
    sweep_once(&state);
    let (_, summary) = call(&app, get_request(&format!("/drivers/{driver}/membership"))).await;
    assert_eq!(summary["status"], "PendingPayment");
    assert_eq!(summary["next_month_fee"], 20000);

    let (status, proof) = call(
        &app,
        json_request(
            "POST",
            &format!("/drivers/{driver}/proofs"),
            json!({ "amount": 20000, "evidence_ref": "receipts/upendo-2.png" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(proof["status"], "ProofUploaded");
    assert_eq!(proof["month"], 2);
    let proof_id = proof["id"].as_str().unwrap().to_string();

    clock.advance(Duration::hours(10));
    sweep_once(&state);
    let (_, body) = call(&app, get_request(&format!("/drivers/{driver}"))).await;
    assert_eq!(body["membership"]["status"], "PaymentVerification");

    let (status, _) = call(
        &app,
        json_request("POST", &format!("/drivers/{driver}/online"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    clock.advance(Duration::hours(40));
    let report = sweep_once(&state);
    assert_eq!(report.manual_reviews, 1);
    assert_eq!(report.transitions, 0);

    let (status, verified) = call(
        &app,
        json_request(
            "POST",
            &format!("/proofs/{proof_id}/verify"),
            json!({ "approved": true, "admin_id": "admin-7" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["proof"]["status"], "Verified");
    assert_eq!(verified["driver"]["membership"]["status"], "Active");
    assert_eq!(verified["driver"]["membership"]["current_month"], 2);

    let (status, _) = call(
        &app,
        json_request(
            "POST",
            &format!("/proofs/{proof_id}/verify"),
            json!({ "approved": false, "admin_id": "admin-7" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn wrong_amount_proof_is_rejected() {
    let (app, _state, _clock) = setup();
    let driver = register(&app, "Faraji", "Van", 4.1).await;

    let (status, _) = call(
        &app,
        json_request(
            "POST",
            &format!("/drivers/{driver}/proofs"),
            json!({ "amount": 100, "evidence_ref": "receipts/x.png" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn get_nonexistent_booking_returns_404() {
    let (app, _state, _clock) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/bookings/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_trip_is_rejected_not_priced() {
    let (app, _state, _clock) = setup();
    let (status, body) = call(
        &app,
        json_request(
            "POST",
            "/quotes",
            json!({
                "vehicle_class": "Bike",
                "base_distance": u64::MAX,
                "waypoints": [{
                    "location": { "lat": -6.79, "lng": 39.21 },
                    "is_on_route": false,
                    "detour_distance": 1
                }]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("limit"));

    let (status, _) = call(
        &app,
        json_request(
            "POST",
            "/bookings",
            json!({
                "kind": { "type": "ride", "passengers": 1 },
                "pickup": { "lat": -6.8, "lng": 39.28 },
                "dropoff": { "lat": -6.7, "lng": 39.2 },
                "vehicle_class": "Truck",
                "base_distance": 6_000_000
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
