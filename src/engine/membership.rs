//! Monthly membership billing.
//!
//! A driver renews by uploading a payment proof for the next month. The
//! periodic [`tick`] moves the driver through the billing states from the
//! facts it is given; [`verify_payment`] is the only path that settles money,
//! and it is always an admin decision. Every function takes `now` explicitly.

use chrono::{DateTime, Duration, Months, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{OnlineError, PaymentError};
use crate::models::driver::{Driver, MembershipStatus};
use crate::models::money::Money;
use crate::models::payment::{PaymentProof, ProofStatus};

/// A renewal reminder goes out once the period has this many days or fewer left.
pub const RENEWAL_NOTICE_DAYS: i64 = 7;

/// Fee for a membership month: steps up for the first three months, flat after.
pub fn monthly_fee(month: u32) -> Money {
    match month {
        0 | 1 => Money::new(10_000),
        2 => Money::new(20_000),
        3 => Money::new(30_000),
        _ => Money::new(40_000),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MembershipTransition {
    EnteredVerification { proof_id: Uuid },
    RenewalDue,
    Deactivated,
}

/// A proof whose clearance window ran out with no admin decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManualReview {
    pub driver_id: Uuid,
    pub proof_id: Uuid,
    pub uploaded_at: DateTime<Utc>,
    pub clearance_deadline: DateTime<Utc>,
    /// False once a review request for this proof has been recorded.
    pub first_request: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    /// Updated record, present only when a transition fired.
    pub driver: Option<Driver>,
    pub transition: Option<MembershipTransition>,
    pub manual_review: Option<ManualReview>,
}

impl TickOutcome {
    fn transitioned(driver: Driver, transition: MembershipTransition) -> Self {
        Self {
            driver: Some(driver),
            transition: Some(transition),
            manual_review: None,
        }
    }

    fn review(review: ManualReview) -> Self {
        Self {
            manual_review: Some(review),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Verification {
    pub driver: Driver,
    pub proof: PaymentProof,
}

#[derive(Debug, Clone, Serialize)]
pub struct MembershipSummary {
    pub status: MembershipStatus,
    pub current_month: u32,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub next_month_fee: Money,
    pub days_until_expiry: i64,
    pub expired: bool,
}

/// The month a renewal proof must cover.
pub fn renewal_month(driver: &Driver) -> u32 {
    driver.membership.current_month + 1
}

/// Latest proof for the renewal month that still awaits a decision.
pub fn pending_proof<'a>(driver: &Driver, proofs: &'a [PaymentProof]) -> Option<&'a PaymentProof> {
    let month = renewal_month(driver);
    proofs
        .iter()
        .filter(|proof| proof.driver_id == driver.id && proof.month == month && proof.is_pending())
        .max_by_key(|proof| proof.uploaded_at)
}

/// Background evaluation of one driver. Idempotent: re-running it over the
/// same facts never fires the same transition twice.
pub fn tick(driver: &Driver, proofs: &[PaymentProof], now: DateTime<Utc>) -> TickOutcome {
    let membership = &driver.membership;
    let pending = pending_proof(driver, proofs);

    if membership.status == MembershipStatus::Deactivated {
        return pending
            .filter(|proof| !proof.within_clearance(now))
            .map(|proof| TickOutcome::review(manual_review(driver, proof)))
            .unwrap_or_default();
    }

    if let Some(proof) = pending {
        if !proof.within_clearance(now) {
            return TickOutcome::review(manual_review(driver, proof));
        }
        if membership.status == MembershipStatus::PaymentVerification {
            return TickOutcome::default();
        }

        let mut next = driver.clone();
        next.membership.status = MembershipStatus::PaymentVerification;
        next.updated_at = now;
        return TickOutcome::transitioned(
            next,
            MembershipTransition::EnteredVerification { proof_id: proof.id },
        );
    }

    if membership.period_expired(now) {
        let mut next = driver.clone();
        next.membership.status = MembershipStatus::Deactivated;
        next.is_online = false;
        next.updated_at = now;
        return TickOutcome::transitioned(next, MembershipTransition::Deactivated);
    }

    // PendingPayment is included for drivers reactivated into a fresh period.
    let renewal_due = membership.period_end - now <= Duration::days(RENEWAL_NOTICE_DAYS);
    let awaiting_renewal = matches!(
        membership.status,
        MembershipStatus::Active | MembershipStatus::PendingPayment
    );
    if renewal_due && awaiting_renewal && membership.notification_sent_at.is_none() {
        let mut next = driver.clone();
        next.membership.status = MembershipStatus::PendingPayment;
        next.membership.notification_sent_at = Some(now);
        next.updated_at = now;
        return TickOutcome::transitioned(next, MembershipTransition::RenewalDue);
    }

    TickOutcome::default()
}

/// Records a driver's uploaded proof for the renewal month.
pub fn submit_proof(
    driver: &Driver,
    existing: &[PaymentProof],
    amount: Money,
    evidence_ref: String,
    now: DateTime<Utc>,
) -> Result<PaymentProof, PaymentError> {
    let month = renewal_month(driver);
    let due = monthly_fee(month);
    if amount != due {
        return Err(PaymentError::AmountMismatch {
            submitted: amount,
            due,
        });
    }
    if let Some(pending) = pending_proof(driver, existing) {
        return Err(PaymentError::AlreadyPending {
            proof_id: pending.id,
        });
    }

    Ok(PaymentProof {
        id: Uuid::new_v4(),
        driver_id: driver.id,
        month,
        amount,
        evidence_ref,
        uploaded_at: now,
        status: ProofStatus::ProofUploaded,
        verified_at: None,
        verified_by: None,
        rejection_reason: None,
        review_requested_at: None,
    })
}

/// Applies an admin's decision on a proof. `admin_id` is trusted as already
/// authorised.
pub fn verify_payment(
    driver: &Driver,
    proof: &PaymentProof,
    approved: bool,
    admin_id: &str,
    rejection_reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Verification, PaymentError> {
    if proof.driver_id != driver.id {
        return Err(PaymentError::DriverMismatch { proof_id: proof.id });
    }
    if !proof.is_pending() {
        return Err(PaymentError::AlreadyDecided {
            proof_id: proof.id,
            status: proof.status,
        });
    }
    let expected = renewal_month(driver);
    if proof.month != expected {
        return Err(PaymentError::MonthMismatch {
            submitted: proof.month,
            expected,
        });
    }

    let mut next_proof = proof.clone();
    next_proof.verified_at = Some(now);
    next_proof.verified_by = Some(admin_id.to_string());

    let mut next_driver = driver.clone();
    next_driver.updated_at = now;

    if approved {
        next_proof.status = ProofStatus::Verified;

        let membership = &mut next_driver.membership;
        let reactivating = membership.status == MembershipStatus::Deactivated;
        // A lapsed membership restarts from the reactivation date instead of
        // back-filling the months it was off.
        let period_start = if reactivating {
            now
        } else {
            membership.period_end + Duration::days(1)
        };

        membership.status = if reactivating {
            MembershipStatus::PendingPayment
        } else {
            MembershipStatus::Active
        };
        membership.current_month += 1;
        membership.period_start = period_start;
        membership.period_end = one_month_after(period_start);
        membership.last_payment_at = Some(now);
        membership.notification_sent_at = None;
    } else {
        next_proof.status = ProofStatus::Rejected;
        next_proof.rejection_reason = Some(
            rejection_reason
                .map(str::trim)
                .filter(|reason| !reason.is_empty())
                .unwrap_or("payment could not be confirmed")
                .to_string(),
        );

        if next_driver.membership.status != MembershipStatus::Deactivated {
            next_driver.membership.status = MembershipStatus::PendingPayment;
        }
    }

    Ok(Verification {
        driver: next_driver,
        proof: next_proof,
    })
}

/// Whether a driver may switch to online. Drivers awaiting verification keep
/// operating even past the period end.
pub fn can_go_online(driver: &Driver, now: DateTime<Utc>) -> Result<(), OnlineError> {
    let membership = &driver.membership;
    match membership.status {
        MembershipStatus::Deactivated => Err(OnlineError::Deactivated),
        MembershipStatus::PaymentVerification => Ok(()),
        MembershipStatus::Active | MembershipStatus::PendingPayment
            if membership.period_expired(now) =>
        {
            Err(OnlineError::PeriodExpired {
                period_end: membership.period_end,
            })
        }
        MembershipStatus::Active | MembershipStatus::PendingPayment => Ok(()),
    }
}

pub fn summary(driver: &Driver, now: DateTime<Utc>) -> MembershipSummary {
    let membership = &driver.membership;
    MembershipSummary {
        status: membership.status,
        current_month: membership.current_month,
        period_start: membership.period_start,
        period_end: membership.period_end,
        next_month_fee: monthly_fee(renewal_month(driver)),
        days_until_expiry: (membership.period_end - now).num_days().max(0),
        expired: membership.period_expired(now),
    }
}

fn manual_review(driver: &Driver, proof: &PaymentProof) -> ManualReview {
    ManualReview {
        driver_id: driver.id,
        proof_id: proof.id,
        uploaded_at: proof.uploaded_at,
        clearance_deadline: proof.clearance_deadline(),
        first_request: proof.review_requested_at.is_none(),
    }
}

fn one_month_after(start: DateTime<Utc>) -> DateTime<Utc> {
    start
        .checked_add_months(Months::new(1))
        .unwrap_or(start + Duration::days(30))
}
