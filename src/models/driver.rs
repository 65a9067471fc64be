use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::money::Money;

/// Length of the first billing period, counted from approval.
pub const INITIAL_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VehicleClass {
    Bike,
    Bajaj,
    Car,
    Van,
    Truck,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 5] = [
        VehicleClass::Bike,
        VehicleClass::Bajaj,
        VehicleClass::Car,
        VehicleClass::Van,
        VehicleClass::Truck,
    ];
}

/// Self-service price a driver has set, and when they may change it again.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RateCard {
    pub custom_rate: Option<Money>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub next_update_allowed_at: Option<DateTime<Utc>>,
}

impl RateCard {
    pub fn cooldown_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_update_allowed_at.filter(|allowed_at| now < *allowed_at)
    }
}

/// Rate lock applied after a driver cancels an accepted booking.
///
/// `until` is the only source of truth for whether the lock holds; an expired
/// penalty may linger on the record until a reconciliation pass clears it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Penalty {
    pub until: DateTime<Utc>,
    pub reason: String,
    /// Rate shown to customers while the lock holds.
    pub locked_rate: Money,
}

impl Penalty {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.until
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MembershipStatus {
    Active,
    PendingPayment,
    PaymentVerification,
    Deactivated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Membership {
    pub status: MembershipStatus,
    pub current_month: u32,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub last_payment_at: Option<DateTime<Utc>>,
    pub notification_sent_at: Option<DateTime<Utc>>,
}

impl Membership {
    pub fn starting_at(approved_at: DateTime<Utc>) -> Self {
        Self {
            status: MembershipStatus::Active,
            current_month: 1,
            period_start: approved_at,
            period_end: approved_at + Duration::days(INITIAL_PERIOD_DAYS),
            last_payment_at: None,
            notification_sent_at: None,
        }
    }

    pub fn period_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.period_end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub vehicle_class: VehicleClass,
    pub is_online: bool,
    pub is_verified: bool,
    pub rating: f64,
    pub trip_count: u32,
    pub cancellation_count: u32,
    pub languages: Vec<String>,
    pub pricing: RateCard,
    pub hourly_pricing: RateCard,
    pub penalty: Option<Penalty>,
    pub membership: Membership,
    /// Optimistic concurrency token, bumped by the store on every commit.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn register(
        name: String,
        vehicle_class: VehicleClass,
        is_verified: bool,
        rating: f64,
        languages: Vec<String>,
        approved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            vehicle_class,
            is_online: false,
            is_verified,
            rating: rating.clamp(0.0, 5.0),
            trip_count: 0,
            cancellation_count: 0,
            languages,
            pricing: RateCard::default(),
            hourly_pricing: RateCard::default(),
            penalty: None,
            membership: Membership::starting_at(approved_at),
            version: 0,
            created_at: approved_at,
            updated_at: approved_at,
        }
    }

    pub fn active_penalty(&self, now: DateTime<Utc>) -> Option<&Penalty> {
        self.penalty.as_ref().filter(|penalty| penalty.is_active(now))
    }

    pub fn is_deactivated(&self) -> bool {
        self.membership.status == MembershipStatus::Deactivated
    }
}
