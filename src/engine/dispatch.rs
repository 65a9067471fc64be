use std::cmp::Ordering;

use uuid::Uuid;

use crate::models::driver::{Driver, VehicleClass};

/// Most drivers notified for a single booking event.
pub const BROADCAST_FAN_OUT: usize = 10;

pub fn is_eligible(driver: &Driver, class: VehicleClass, excluded: &[Uuid]) -> bool {
    driver.is_online
        && driver.is_verified
        && driver.vehicle_class == class
        && !excluded.contains(&driver.id)
        && !driver.is_deactivated()
}

/// Eligible drivers for a booking, best first. Never touches the pool.
pub fn select_candidates<'a>(
    drivers: &'a [Driver],
    class: VehicleClass,
    excluded: &[Uuid],
) -> Vec<&'a Driver> {
    let mut candidates: Vec<&Driver> = drivers
        .iter()
        .filter(|driver| is_eligible(driver, class, excluded))
        .collect();

    candidates.sort_by(|a, b| rank(a, b));
    candidates
}

pub fn broadcast_set(candidates: &[&Driver]) -> Vec<Uuid> {
    candidates
        .iter()
        .take(BROADCAST_FAN_OUT)
        .map(|driver| driver.id)
        .collect()
}

// Higher rating first; on equal rating the driver with fewer cancellations wins.
fn rank(a: &Driver, b: &Driver) -> Ordering {
    b.rating
        .total_cmp(&a.rating)
        .then_with(|| a.cancellation_count.cmp(&b.cancellation_count))
        .then_with(|| a.id.cmp(&b.id))
}
