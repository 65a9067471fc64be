use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::dispatch::{broadcast_set, is_eligible, select_candidates};
use crate::engine::fare::{compute_fare, compute_hourly_fare, trip_distance, MAX_QUOTABLE_DISTANCE};
use crate::engine::rates;
use crate::error::{AppError, RateError};
use crate::models::booking::{Booking, BookingKind, BookingStatus, GeoPoint, Waypoint};
use crate::models::cancellation::CancellationLog;
use crate::models::driver::{Driver, VehicleClass};
use crate::models::event::DispatchEvent;
use crate::models::fare::FareQuote;
use crate::models::money::{Distance, Money};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/quotes", post(quote))
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/accept", post(accept_booking))
        .route("/bookings/:id/advance", post(advance_booking))
        .route("/bookings/:id/driver-cancel", post(driver_cancel))
        .route("/bookings/:id/customer-cancel", post(customer_cancel))
        .route("/bookings/:id/timeout", post(time_out))
        .route("/cancellations", get(list_cancellations))
}

#[derive(Deserialize)]
pub struct QuoteRequest {
    pub vehicle_class: VehicleClass,
    pub base_distance: Distance,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
    pub driver_id: Option<Uuid>,
    pub hours: Option<u32>,
}

#[derive(Serialize)]
pub struct QuoteResponse {
    pub fare: FareQuote,
    pub hourly_fare: Option<Money>,
}

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub kind: BookingKind,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
    pub vehicle_class: VehicleClass,
    pub base_distance: Distance,
}

#[derive(Serialize)]
pub struct BookingCreated {
    pub booking: Booking,
    pub candidates_to_notify: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct AcceptRequest {
    pub driver_id: Uuid,
    pub expected_version: Option<u64>,
}

#[derive(Deserialize)]
pub struct VersionedRequest {
    pub expected_version: Option<u64>,
}

#[derive(Deserialize)]
pub struct DriverCancelRequest {
    pub driver_id: Uuid,
    pub reason: Option<String>,
    pub expected_version: Option<u64>,
}

#[derive(Serialize)]
pub struct DriverCancelResponse {
    pub booking: Booking,
    pub driver: Driver,
    pub log: CancellationLog,
    pub candidates_to_notify: Vec<Uuid>,
    pub customer_notice: String,
}

async fn quote(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    check_trip_distance(payload.base_distance, &payload.waypoints)?;

    let now = state.now();
    let driver = payload.driver_id.map(|id| state.driver(id)).transpose()?;

    if let Some(driver) = &driver {
        if driver.vehicle_class != payload.vehicle_class {
            return Err(AppError::BadRequest(format!(
                "driver {} drives a {:?}, not a {:?}",
                driver.id, driver.vehicle_class, payload.vehicle_class
            )));
        }
    }

    let rate = driver
        .as_ref()
        .map_or(rates::legal_minimum(payload.vehicle_class), |driver| {
            rates::effective_rate(driver, now)
        });
    let fare = compute_fare(
        payload.base_distance,
        &payload.waypoints,
        payload.vehicle_class,
        rate,
    );

    let hourly_fare = match payload.hours {
        Some(hours) => {
            if !rates::supports_hourly(payload.vehicle_class) {
                return Err(RateError::HourlyNotSupported(payload.vehicle_class).into());
            }
            let hourly_rate = driver
                .as_ref()
                .and_then(|driver| rates::effective_hourly_rate(driver, now))
                .or_else(|| rates::hourly_minimum(payload.vehicle_class))
                .ok_or(RateError::HourlyNotSupported(payload.vehicle_class))?;
            Some(compute_hourly_fare(hours, hourly_rate))
        }
        None => None,
    };

    Ok(Json(QuoteResponse { fare, hourly_fare }))
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<Json<BookingCreated>, AppError> {
    if payload.base_distance == Distance::ZERO {
        return Err(AppError::BadRequest("base_distance must be > 0".to_string()));
    }
    check_trip_distance(payload.base_distance, &payload.waypoints)?;

    let now = state.now();
    // quoted at the floor until a driver accepts and reprices it
    let fare = compute_fare(
        payload.base_distance,
        &payload.waypoints,
        payload.vehicle_class,
        rates::legal_minimum(payload.vehicle_class),
    );

    let booking = Booking {
        id: Uuid::new_v4(),
        kind: payload.kind,
        pickup: payload.pickup,
        dropoff: payload.dropoff,
        waypoints: payload.waypoints,
        vehicle_class: payload.vehicle_class,
        base_distance: payload.base_distance,
        status: BookingStatus::Searching,
        assigned_driver: None,
        previous_drivers: Vec::new(),
        rebooking_attempts: 0,
        fare,
        version: 0,
        created_at: now,
        updated_at: now,
    };

    let pool = state.driver_snapshot();
    let candidates = select_candidates(&pool, booking.vehicle_class, &booking.previous_drivers);
    let candidates_to_notify = broadcast_set(&candidates);

    state.bookings.insert(booking.id, booking.clone());
    state
        .metrics
        .rebooking_broadcast_size
        .observe(candidates_to_notify.len() as f64);
    state.publish(DispatchEvent::BookingBroadcast {
        booking_id: booking.id,
        driver_ids: candidates_to_notify.clone(),
        rebooking_attempt: 0,
        customer_notice: None,
    });

    info!(
        booking_id = %booking.id,
        vehicle_class = ?booking.vehicle_class,
        notified = candidates_to_notify.len(),
        "booking created"
    );

    Ok(Json(BookingCreated {
        booking,
        candidates_to_notify,
    }))
}

fn check_trip_distance(base_distance: Distance, waypoints: &[Waypoint]) -> Result<(), AppError> {
    let total = trip_distance(base_distance, waypoints);
    if total > MAX_QUOTABLE_DISTANCE {
        return Err(AppError::BadRequest(format!(
            "trip of {} m exceeds the {} m limit",
            total.meters(),
            MAX_QUOTABLE_DISTANCE.meters()
        )));
    }
    Ok(())
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    state.booking(id).map(Json)
}

async fn accept_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptRequest>,
) -> Result<Json<Booking>, AppError> {
    let driver = state.driver(payload.driver_id)?;
    let now = state.now();

    let booking = state.update_booking(id, payload.expected_version, |booking| {
        if !is_eligible(&driver, booking.vehicle_class, &booking.previous_drivers) {
            return Err(AppError::Conflict(format!(
                "driver {} is not eligible for booking {}",
                driver.id, booking.id
            )));
        }

        let fare = compute_fare(
            booking.base_distance,
            &booking.waypoints,
            booking.vehicle_class,
            rates::effective_rate(&driver, now),
        );
        Ok(booking.assigned_to(driver.id, fare, now)?)
    })?;

    info!(booking_id = %id, driver_id = %driver.id, fare = %booking.fare.total_fare, "booking accepted");
    Ok(Json(booking))
}

async fn advance_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VersionedRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.commit_advance(id, payload.expected_version)?;

    info!(booking_id = %id, status = ?booking.status, "booking advanced");
    Ok(Json(booking))
}

async fn driver_cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverCancelRequest>,
) -> Result<Json<DriverCancelResponse>, AppError> {
    let outcome = state.commit_cancellation(
        id,
        payload.driver_id,
        payload.reason.as_deref(),
        payload.expected_version,
    )?;

    Ok(Json(DriverCancelResponse {
        booking: outcome.booking,
        driver: outcome.driver,
        log: outcome.log,
        candidates_to_notify: outcome.candidates_to_notify,
        customer_notice: outcome.customer_notice,
    }))
}

async fn customer_cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VersionedRequest>,
) -> Result<Json<Booking>, AppError> {
    let now = state.now();
    let booking = state.update_booking(id, payload.expected_version, |booking| {
        Ok(booking.cancelled_by_customer(now)?)
    })?;

    info!(booking_id = %id, "booking cancelled by customer");
    Ok(Json(booking))
}

async fn time_out(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VersionedRequest>,
) -> Result<Json<Booking>, AppError> {
    let now = state.now();
    let booking = state.update_booking(id, payload.expected_version, |booking| {
        Ok(booking.timed_out(now)?)
    })?;

    info!(booking_id = %id, attempts = booking.rebooking_attempts, "booking timed out");
    Ok(Json(booking))
}

async fn list_cancellations(State(state): State<Arc<AppState>>) -> Json<Vec<CancellationLog>> {
    let mut logs: Vec<CancellationLog> = state
        .cancellations
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    logs.sort_by_key(|log| log.cancelled_at);

    Json(logs)
}
