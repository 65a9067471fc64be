use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit record of a driver-initiated cancellation. Never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationLog {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub booking_id: Uuid,
    pub reason: String,
    pub penalty_hours: i64,
    pub rebooking_attempt: u32,
    pub cancelled_at: DateTime<Utc>,
}
