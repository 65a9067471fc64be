use chrono::{DateTime, Duration, Utc};

use crate::error::RateError;
use crate::models::driver::{Driver, RateCard, VehicleClass};
use crate::models::money::Money;

const CEILING_PERCENT: i64 = 120;
const HOURLY_CEILING_PERCENT: i64 = 130;
pub const RATE_CHANGE_COOLDOWN_MINUTES: i64 = 30;

/// Floor price per km a vehicle class may charge.
pub fn legal_minimum(class: VehicleClass) -> Money {
    match class {
        VehicleClass::Bike => Money::new(2_500),
        VehicleClass::Bajaj => Money::new(3_000),
        VehicleClass::Car => Money::new(4_000),
        VehicleClass::Van => Money::new(5_500),
        VehicleClass::Truck => Money::new(7_000),
    }
}

pub fn max_allowed(class: VehicleClass) -> Money {
    legal_minimum(class).percent_of(CEILING_PERCENT)
}

/// Floor price per hour for classes offered as hourly rentals.
pub fn hourly_minimum(class: VehicleClass) -> Option<Money> {
    match class {
        VehicleClass::Car => Some(Money::new(30_000)),
        VehicleClass::Van => Some(Money::new(45_000)),
        VehicleClass::Bike | VehicleClass::Bajaj | VehicleClass::Truck => None,
    }
}

pub fn supports_hourly(class: VehicleClass) -> bool {
    hourly_minimum(class).is_some()
}

pub fn max_hourly(class: VehicleClass) -> Option<Money> {
    hourly_minimum(class).map(|minimum| minimum.percent_of(HOURLY_CEILING_PERCENT))
}

/// Per-km rate the driver charges right now.
pub fn effective_rate(driver: &Driver, now: DateTime<Utc>) -> Money {
    let minimum = legal_minimum(driver.vehicle_class);
    if driver.active_penalty(now).is_some() {
        return minimum;
    }
    clamp_rate(driver.pricing.custom_rate, minimum, max_allowed(driver.vehicle_class))
}

pub fn effective_hourly_rate(driver: &Driver, now: DateTime<Utc>) -> Option<Money> {
    let minimum = hourly_minimum(driver.vehicle_class)?;
    let maximum = max_hourly(driver.vehicle_class)?;
    if driver.active_penalty(now).is_some() {
        return Some(minimum);
    }
    Some(clamp_rate(driver.hourly_pricing.custom_rate, minimum, maximum))
}

/// Checks a driver's rate change request and returns the updated record.
///
/// Out-of-range requests are rejected, never clamped.
pub fn validate_new_rate(
    driver: &Driver,
    proposed: Money,
    now: DateTime<Utc>,
) -> Result<Driver, RateError> {
    let class = driver.vehicle_class;
    check_rate_change(
        driver,
        &driver.pricing,
        proposed,
        legal_minimum(class),
        max_allowed(class),
        now,
    )?;

    let mut next = driver.clone();
    next.pricing = updated_card(proposed, now);
    next.updated_at = now;
    Ok(next)
}

pub fn validate_new_hourly_rate(
    driver: &Driver,
    proposed: Money,
    now: DateTime<Utc>,
) -> Result<Driver, RateError> {
    let class = driver.vehicle_class;
    let (minimum, maximum) = hourly_minimum(class)
        .zip(max_hourly(class))
        .ok_or(RateError::HourlyNotSupported(class))?;
    check_rate_change(driver, &driver.hourly_pricing, proposed, minimum, maximum, now)?;

    let mut next = driver.clone();
    next.hourly_pricing = updated_card(proposed, now);
    next.updated_at = now;
    Ok(next)
}

/// Drops a penalty whose lock has run out. Readers never need this; it only
/// tidies the stored record.
pub fn clear_expired_penalty(driver: &Driver, now: DateTime<Utc>) -> Option<Driver> {
    let penalty = driver.penalty.as_ref()?;
    if penalty.is_active(now) {
        return None;
    }

    let mut next = driver.clone();
    next.penalty = None;
    next.updated_at = now;
    Some(next)
}

fn clamp_rate(custom: Option<Money>, minimum: Money, maximum: Money) -> Money {
    custom.map_or(minimum, |rate| rate.clamp(minimum, maximum))
}

fn check_rate_change(
    driver: &Driver,
    card: &RateCard,
    proposed: Money,
    minimum: Money,
    maximum: Money,
    now: DateTime<Utc>,
) -> Result<(), RateError> {
    if proposed < minimum {
        return Err(RateError::BelowLegalMinimum { proposed, minimum });
    }
    if proposed > maximum {
        return Err(RateError::AboveMaximum { proposed, maximum });
    }
    if let Some(until) = card.cooldown_until(now) {
        return Err(RateError::CooldownActive { until });
    }
    if let Some(penalty) = driver.active_penalty(now) {
        return Err(RateError::PenaltyActive {
            until: penalty.until,
        });
    }
    Ok(())
}

fn updated_card(rate: Money, now: DateTime<Utc>) -> RateCard {
    RateCard {
        custom_rate: Some(rate),
        last_updated_at: Some(now),
        next_update_allowed_at: Some(now + Duration::minutes(RATE_CHANGE_COOLDOWN_MINUTES)),
    }
}
