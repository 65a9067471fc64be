use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::engine::dispatch::{broadcast_set, select_candidates};
use crate::engine::rates::legal_minimum;
use crate::error::CancellationError;
use crate::models::booking::{Booking, BookingStatus};
use crate::models::cancellation::CancellationLog;
use crate::models::driver::{Driver, Penalty};

pub const PENALTY_HOURS: i64 = 48;
pub const DEFAULT_REASON: &str = "cancelled accepted booking";

/// Everything a driver cancellation changes. The caller must commit `driver`,
/// `booking` and `log` together or not at all.
#[derive(Debug, Clone)]
pub struct CancellationOutcome {
    pub driver: Driver,
    pub booking: Booking,
    pub log: CancellationLog,
    pub candidates_to_notify: Vec<Uuid>,
    pub customer_notice: String,
}

pub fn handle_driver_cancellation(
    driver: &Driver,
    booking: &Booking,
    candidate_pool: &[Driver],
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<CancellationOutcome, CancellationError> {
    if booking.status.is_terminal() {
        return Err(CancellationError::BookingClosed {
            booking_id: booking.id,
            status: booking.status,
        });
    }
    if booking.assigned_driver != Some(driver.id) {
        return Err(CancellationError::NoOpConflict {
            booking_id: booking.id,
            driver_id: driver.id,
        });
    }

    let reason = reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REASON)
        .to_string();

    let mut next_driver = driver.clone();
    next_driver.cancellation_count += 1;
    next_driver.penalty = Some(Penalty {
        until: now + Duration::hours(PENALTY_HOURS),
        reason: reason.clone(),
        locked_rate: legal_minimum(driver.vehicle_class),
    });
    next_driver.updated_at = now;

    let mut next_booking = booking.clone();
    if !next_booking.excludes(driver.id) {
        next_booking.previous_drivers.push(driver.id);
    }
    next_booking.assigned_driver = None;
    next_booking.status = BookingStatus::Searching;
    next_booking.rebooking_attempts += 1;
    next_booking.updated_at = now;

    let log = CancellationLog {
        id: Uuid::new_v4(),
        driver_id: driver.id,
        booking_id: booking.id,
        reason,
        penalty_hours: PENALTY_HOURS,
        rebooking_attempt: next_booking.rebooking_attempts,
        cancelled_at: now,
    };

    let candidates = select_candidates(
        candidate_pool,
        next_booking.vehicle_class,
        &next_booking.previous_drivers,
    );
    let candidates_to_notify = broadcast_set(&candidates);
    let customer_notice = customer_notice(next_booking.rebooking_attempts);

    Ok(CancellationOutcome {
        driver: next_driver,
        booking: next_booking,
        log,
        candidates_to_notify,
        customer_notice,
    })
}

pub fn customer_notice(rebooking_attempt: u32) -> String {
    if rebooking_attempt <= 1 {
        "Your driver is no longer available. We are finding you another driver nearby \
         and will let you know as soon as someone accepts."
            .to_string()
    } else {
        format!("Still searching for a driver (attempt {rebooking_attempt}).")
    }
}
