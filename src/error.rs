use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::booking::BookingStatus;
use crate::models::driver::VehicleClass;
use crate::models::money::Money;
use crate::models::payment::ProofStatus;

#[derive(Debug, Error, PartialEq)]
pub enum RateError {
    #[error("rate {proposed} is below the legal minimum of {minimum}")]
    BelowLegalMinimum { proposed: Money, minimum: Money },

    #[error("rate {proposed} is above the maximum of {maximum}")]
    AboveMaximum { proposed: Money, maximum: Money },

    #[error("rate was changed recently; next change allowed at {until}")]
    CooldownActive { until: DateTime<Utc> },

    #[error("rate is locked to the legal minimum until {until}")]
    PenaltyActive { until: DateTime<Utc> },

    #[error("{0:?} does not support hourly rental")]
    HourlyNotSupported(VehicleClass),
}

#[derive(Debug, Error, PartialEq)]
pub enum CancellationError {
    #[error("booking {booking_id} is not assigned to driver {driver_id}")]
    NoOpConflict { booking_id: Uuid, driver_id: Uuid },

    #[error("booking {booking_id} is already {status:?}")]
    BookingClosed {
        booking_id: Uuid,
        status: BookingStatus,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum BookingError {
    #[error("booking is {0:?}, not searching for a driver")]
    NotSearching(BookingStatus),

    #[error("booking cannot advance from {0:?}")]
    CannotAdvance(BookingStatus),

    #[error("booking cannot be cancelled while {0:?}")]
    CannotCancel(BookingStatus),
}

#[derive(Debug, Error, PartialEq)]
pub enum OnlineError {
    #[error("deactivated, pay to reactivate")]
    Deactivated,

    #[error("membership period ended at {period_end}; upload a payment proof")]
    PeriodExpired { period_end: DateTime<Utc> },
}

#[derive(Debug, Error, PartialEq)]
pub enum PaymentError {
    #[error("amount {submitted} does not match the fee due of {due}")]
    AmountMismatch { submitted: Money, due: Money },

    #[error("proof {proof_id} for this month is still awaiting review")]
    AlreadyPending { proof_id: Uuid },

    #[error("proof {proof_id} was already {status:?}")]
    AlreadyDecided { proof_id: Uuid, status: ProofStatus },

    #[error("proof {proof_id} belongs to another driver")]
    DriverMismatch { proof_id: Uuid },

    #[error("proof covers month {submitted}, expected month {expected}")]
    MonthMismatch { submitted: u32, expected: u32 },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unprocessable: {0}")]
    Unprocessable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RateError> for AppError {
    fn from(err: RateError) -> Self {
        AppError::Unprocessable(err.to_string())
    }
}

impl From<CancellationError> for AppError {
    fn from(err: CancellationError) -> Self {
        AppError::Conflict(err.to_string())
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        AppError::Conflict(err.to_string())
    }
}

impl From<OnlineError> for AppError {
    fn from(err: OnlineError) -> Self {
        AppError::Unprocessable(err.to_string())
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::AlreadyPending { .. } | PaymentError::AlreadyDecided { .. } => {
                AppError::Conflict(err.to_string())
            }
            PaymentError::AmountMismatch { .. }
            | PaymentError::DriverMismatch { .. }
            | PaymentError::MonthMismatch { .. } => AppError::Unprocessable(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
