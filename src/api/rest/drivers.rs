use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::membership::{self, MembershipSummary};
use crate::engine::rates;
use crate::error::AppError;
use crate::models::driver::{Driver, VehicleClass};
use crate::models::money::Money;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver).get(list_drivers))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/rate", put(update_rate).get(get_rate))
        .route("/drivers/:id/hourly-rate", put(update_hourly_rate))
        .route("/drivers/:id/online", post(go_online))
        .route("/drivers/:id/offline", post(go_offline))
        .route("/drivers/:id/membership", get(get_membership))
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub name: String,
    pub vehicle_class: VehicleClass,
    pub is_verified: bool,
    #[serde(default = "default_rating")]
    pub rating: f64,
    #[serde(default)]
    pub languages: Vec<String>,
}

fn default_rating() -> f64 {
    5.0
}

#[derive(Deserialize)]
pub struct UpdateRateRequest {
    pub rate: Money,
    pub expected_version: Option<u64>,
}

#[derive(Deserialize)]
pub struct PresenceRequest {
    pub expected_version: Option<u64>,
}

#[derive(Serialize)]
pub struct HourlyRateView {
    pub minimum: Money,
    pub maximum: Money,
    pub effective_rate: Money,
    pub custom_rate: Option<Money>,
}

#[derive(Serialize)]
pub struct RateView {
    pub vehicle_class: VehicleClass,
    pub legal_minimum: Money,
    pub max_allowed: Money,
    pub effective_rate: Money,
    pub custom_rate: Option<Money>,
    pub next_update_allowed_at: Option<DateTime<Utc>>,
    pub penalty_until: Option<DateTime<Utc>>,
    pub hourly: Option<HourlyRateView>,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let driver = Driver::register(
        payload.name,
        payload.vehicle_class,
        payload.is_verified,
        payload.rating,
        payload.languages,
        state.now(),
    );

    state.drivers.insert(driver.id, driver.clone());
    info!(driver_id = %driver.id, vehicle_class = ?driver.vehicle_class, "driver registered");
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    Json(state.driver_snapshot())
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    state.driver(id).map(Json)
}

async fn get_rate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RateView>, AppError> {
    let driver = state.driver(id)?;
    Ok(Json(rate_view(&driver, state.now())))
}

async fn update_rate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRateRequest>,
) -> Result<Json<RateView>, AppError> {
    let now = state.now();
    let result = state.update_driver(id, payload.expected_version, |driver| {
        Ok(rates::validate_new_rate(driver, payload.rate, now)?)
    });
    record_rate_outcome(&state, &result);

    let driver = result?;
    info!(driver_id = %id, rate = %payload.rate, "driver rate updated");
    Ok(Json(rate_view(&driver, now)))
}

async fn update_hourly_rate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRateRequest>,
) -> Result<Json<RateView>, AppError> {
    let now = state.now();
    let result = state.update_driver(id, payload.expected_version, |driver| {
        Ok(rates::validate_new_hourly_rate(driver, payload.rate, now)?)
    });
    record_rate_outcome(&state, &result);

    let driver = result?;
    info!(driver_id = %id, rate = %payload.rate, "driver hourly rate updated");
    Ok(Json(rate_view(&driver, now)))
}

async fn go_online(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<PresenceRequest>>,
) -> Result<Json<Driver>, AppError> {
    let now = state.now();
    let expected_version = payload.and_then(|Json(p)| p.expected_version);
    let driver = state.update_driver(id, expected_version, |driver| {
        membership::can_go_online(driver, now)?;
        let mut next = driver.clone();
        next.is_online = true;
        next.updated_at = now;
        Ok(next)
    })?;

    info!(driver_id = %id, "driver online");
    Ok(Json(driver))
}

async fn go_offline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<PresenceRequest>>,
) -> Result<Json<Driver>, AppError> {
    let now = state.now();
    let expected_version = payload.and_then(|Json(p)| p.expected_version);
    let driver = state.update_driver(id, expected_version, |driver| {
        let mut next = driver.clone();
        next.is_online = false;
        next.updated_at = now;
        Ok(next)
    })?;

    info!(driver_id = %id, "driver offline");
    Ok(Json(driver))
}

async fn get_membership(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MembershipSummary>, AppError> {
    let driver = state.driver(id)?;
    Ok(Json(membership::summary(&driver, state.now())))
}

fn rate_view(driver: &Driver, now: DateTime<Utc>) -> RateView {
    let class = driver.vehicle_class;
    let hourly = rates::hourly_minimum(class)
        .zip(rates::max_hourly(class))
        .zip(rates::effective_hourly_rate(driver, now))
        .map(|((minimum, maximum), effective_rate)| HourlyRateView {
            minimum,
            maximum,
            effective_rate,
            custom_rate: driver.hourly_pricing.custom_rate,
        });

    RateView {
        vehicle_class: class,
        legal_minimum: rates::legal_minimum(class),
        max_allowed: rates::max_allowed(class),
        effective_rate: rates::effective_rate(driver, now),
        custom_rate: driver.pricing.custom_rate,
        next_update_allowed_at: driver.pricing.cooldown_until(now),
        penalty_until: driver.active_penalty(now).map(|penalty| penalty.until),
        hourly,
    }
}

fn record_rate_outcome(state: &AppState, result: &Result<Driver, AppError>) {
    let outcome = match result {
        Ok(_) => "accepted",
        Err(AppError::Unprocessable(_)) => "rejected",
        Err(_) => "error",
    };
    state
        .metrics
        .rate_updates_total
        .with_label_values(&[outcome])
        .inc();
}
