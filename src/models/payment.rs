use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::money::Money;

/// Hours after upload during which the driver keeps operating while an admin
/// reviews the proof.
pub const CLEARANCE_WINDOW_HOURS: i64 = 48;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProofStatus {
    ProofUploaded,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProof {
    pub id: Uuid,
    pub driver_id: Uuid,
    /// Membership month this payment covers.
    pub month: u32,
    pub amount: Money,
    pub evidence_ref: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: ProofStatus,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<String>,
    pub rejection_reason: Option<String>,
    /// When the first manual-review request went out for this proof.
    #[serde(default)]
    pub review_requested_at: Option<DateTime<Utc>>,
}

impl PaymentProof {
    pub fn is_pending(&self) -> bool {
        self.status == ProofStatus::ProofUploaded
    }

    pub fn clearance_deadline(&self) -> DateTime<Utc> {
        self.uploaded_at + Duration::hours(CLEARANCE_WINDOW_HOURS)
    }

    pub fn within_clearance(&self, now: DateTime<Utc>) -> bool {
        now < self.clearance_deadline()
    }
}
