use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::driver::VehicleClass;
use crate::models::fare::FareQuote;
use crate::models::money::Distance;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Intermediate stop (pit stop) between pickup and dropoff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Waypoint {
    pub location: GeoPoint,
    pub is_on_route: bool,
    /// Extra meters driven to reach the stop; ignored for on-route stops.
    #[serde(default)]
    pub detour_distance: Distance,
}

impl Waypoint {
    pub fn billable_detour(&self) -> Distance {
        if self.is_on_route {
            Distance::ZERO
        } else {
            self.detour_distance
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BookingStatus {
    Searching,
    DriverAssigned,
    DriverArrived,
    InTransit,
    Completed,
    Cancelled,
    TimedOut,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::TimedOut
        )
    }

    fn next(self) -> Option<BookingStatus> {
        match self {
            BookingStatus::DriverAssigned => Some(BookingStatus::DriverArrived),
            BookingStatus::DriverArrived => Some(BookingStatus::InTransit),
            BookingStatus::InTransit => Some(BookingStatus::Completed),
            BookingStatus::Searching
            | BookingStatus::Completed
            | BookingStatus::Cancelled
            | BookingStatus::TimedOut => None,
        }
    }
}

/// Kind-specific payload; the shared fields live on [`Booking`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingKind {
    Ride {
        passengers: u8,
    },
    Parcel {
        description: String,
        weight_kg: u32,
        recipient_name: String,
        recipient_phone: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub kind: BookingKind,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub waypoints: Vec<Waypoint>,
    pub vehicle_class: VehicleClass,
    pub base_distance: Distance,
    pub status: BookingStatus,
    pub assigned_driver: Option<Uuid>,
    /// Drivers who cancelled this booking. None of them may be offered it again.
    pub previous_drivers: Vec<Uuid>,
    pub rebooking_attempts: u32,
    pub fare: FareQuote,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn excludes(&self, driver_id: Uuid) -> bool {
        self.previous_drivers.contains(&driver_id)
    }

    /// Returns the booking assigned to `driver_id`, repriced with `fare`.
    ///
    /// # Panics
    ///
    /// Panics if `driver_id` previously cancelled this booking. Callers must
    /// filter excluded drivers before offering a booking.
    pub fn assigned_to(
        &self,
        driver_id: Uuid,
        fare: FareQuote,
        now: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        assert!(
            !self.excludes(driver_id),
            "driver {driver_id} previously cancelled booking {}",
            self.id
        );

        if self.status != BookingStatus::Searching {
            return Err(BookingError::NotSearching(self.status));
        }

        let mut next = self.clone();
        next.status = BookingStatus::DriverAssigned;
        next.assigned_driver = Some(driver_id);
        next.fare = fare;
        next.updated_at = now;
        Ok(next)
    }

    pub fn advanced(&self, now: DateTime<Utc>) -> Result<Booking, BookingError> {
        let status = self
            .status
            .next()
            .ok_or(BookingError::CannotAdvance(self.status))?;

        let mut next = self.clone();
        next.status = status;
        next.updated_at = now;
        Ok(next)
    }

    pub fn cancelled_by_customer(&self, now: DateTime<Utc>) -> Result<Booking, BookingError> {
        if self.status.is_terminal() || self.status == BookingStatus::InTransit {
            return Err(BookingError::CannotCancel(self.status));
        }

        let mut next = self.clone();
        next.status = BookingStatus::Cancelled;
        next.updated_at = now;
        Ok(next)
    }

    pub fn timed_out(&self, now: DateTime<Utc>) -> Result<Booking, BookingError> {
        if self.status != BookingStatus::Searching {
            return Err(BookingError::NotSearching(self.status));
        }

        let mut next = self.clone();
        next.status = BookingStatus::TimedOut;
        next.updated_at = now;
        Ok(next)
    }
}
