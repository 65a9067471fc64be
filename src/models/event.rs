use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Follow-up action for the messaging layer. The core never delivers these itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    BookingBroadcast {
        booking_id: Uuid,
        driver_ids: Vec<Uuid>,
        rebooking_attempt: u32,
        customer_notice: Option<String>,
    },
    ManualReviewRequired {
        driver_id: Uuid,
        proof_id: Uuid,
        uploaded_at: DateTime<Utc>,
        clearance_deadline: DateTime<Utc>,
    },
    DriverDeactivated {
        driver_id: Uuid,
        period_end: DateTime<Utc>,
    },
}
