use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::engine::cancellation::{handle_driver_cancellation, CancellationOutcome};
use crate::engine::membership::{self, MembershipTransition, TickOutcome, Verification};
use crate::engine::rates::clear_expired_penalty;
use crate::error::AppError;
use crate::models::booking::{Booking, BookingStatus};
use crate::models::cancellation::CancellationLog;
use crate::models::driver::Driver;
use crate::models::event::DispatchEvent;
use crate::models::money::Money;
use crate::models::payment::PaymentProof;
use crate::observability::metrics::Metrics;

/// In-memory store. Each driver and booking entry is its own unit of locking.
///
/// Lock order when two entries are held together: booking before driver,
/// driver before proof. Proof writes for a driver and membership ticks both
/// run under that driver's lock, so they never interleave.
pub struct AppState {
    pub drivers: DashMap<Uuid, Driver>,
    pub bookings: DashMap<Uuid, Booking>,
    pub proofs: DashMap<Uuid, PaymentProof>,
    pub cancellations: DashMap<Uuid, CancellationLog>,
    pub events_tx: broadcast::Sender<DispatchEvent>,
    pub metrics: Metrics,
    clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(event_buffer_size: usize, clock: Arc<dyn Clock>) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            drivers: DashMap::new(),
            bookings: DashMap::new(),
            proofs: DashMap::new(),
            cancellations: DashMap::new(),
            events_tx,
            metrics: Metrics::new(),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Point-in-time copy of every driver, for dispatch ranking.
    pub fn driver_snapshot(&self) -> Vec<Driver> {
        self.drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn proofs_for(&self, driver_id: Uuid) -> Vec<PaymentProof> {
        self.proofs
            .iter()
            .filter(|entry| entry.driver_id == driver_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn driver(&self, id: Uuid) -> Result<Driver, AppError> {
        self.drivers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))
    }

    pub fn booking(&self, id: Uuid) -> Result<Booking, AppError> {
        self.bookings
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))
    }

    pub fn publish(&self, event: DispatchEvent) {
        // no subscribers is fine; the feed is best-effort
        let _ = self.events_tx.send(event);
    }

    /// Conditional write of one driver: `update` sees the current record and
    /// returns its replacement. Fails with `Conflict` when `expected_version`
    /// no longer matches.
    pub fn update_driver<F>(
        &self,
        id: Uuid,
        expected_version: Option<u64>,
        update: F,
    ) -> Result<Driver, AppError>
    where
        F: FnOnce(&Driver) -> Result<Driver, AppError>,
    {
        let mut entry = self
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;
        check_version("driver", id, entry.version, expected_version)?;

        let mut next = update(entry.value())?;
        next.version = entry.version + 1;
        *entry = next.clone();
        Ok(next)
    }

    pub fn update_booking<F>(
        &self,
        id: Uuid,
        expected_version: Option<u64>,
        update: F,
    ) -> Result<Booking, AppError>
    where
        F: FnOnce(&Booking) -> Result<Booking, AppError>,
    {
        let mut entry = self
            .bookings
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))?;
        check_version("booking", id, entry.version, expected_version)?;

        let mut next = update(entry.value())?;
        next.version = entry.version + 1;
        *entry = next.clone();
        Ok(next)
    }

    /// Applies a driver cancellation as one transaction over the booking, the
    /// driver and the cancellation log.
    pub fn commit_cancellation(
        &self,
        booking_id: Uuid,
        driver_id: Uuid,
        reason: Option<&str>,
        expected_version: Option<u64>,
    ) -> Result<CancellationOutcome, AppError> {
        // taken before any entry lock: iterating the driver map while holding
        // one of its entries can deadlock on the shard
        let pool = self.driver_snapshot();
        let now = self.now();

        let mut booking = self
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;
        check_version("booking", booking_id, booking.version, expected_version)?;

        let mut driver = self
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        let mut outcome = handle_driver_cancellation(&driver, &booking, &pool, reason, now)
            .inspect_err(|err| {
                warn!(booking_id = %booking_id, driver_id = %driver_id, error = %err, "driver cancellation rejected");
            })?;

        outcome.driver.version = driver.version + 1;
        outcome.booking.version = booking.version + 1;
        *driver = outcome.driver.clone();
        *booking = outcome.booking.clone();
        self.cancellations.insert(outcome.log.id, outcome.log.clone());
        drop(driver);
        drop(booking);

        self.metrics.driver_cancellations_total.inc();
        self.metrics
            .rebooking_broadcast_size
            .observe(outcome.candidates_to_notify.len() as f64);
        self.publish(DispatchEvent::BookingBroadcast {
            booking_id,
            driver_ids: outcome.candidates_to_notify.clone(),
            rebooking_attempt: outcome.booking.rebooking_attempts,
            customer_notice: Some(outcome.customer_notice.clone()),
        });

        info!(
            booking_id = %booking_id,
            driver_id = %driver_id,
            attempt = outcome.booking.rebooking_attempts,
            notified = outcome.candidates_to_notify.len(),
            "driver cancelled booking; rebooking"
        );

        Ok(outcome)
    }

    /// Applies a booking status step. Completing a trip credits the driver in
    /// the same commit.
    pub fn commit_advance(
        &self,
        booking_id: Uuid,
        expected_version: Option<u64>,
    ) -> Result<Booking, AppError> {
        let now = self.now();

        let mut booking = self
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;
        check_version("booking", booking_id, booking.version, expected_version)?;

        let mut next = booking.advanced(now)?;
        next.version = booking.version + 1;

        if next.status == BookingStatus::Completed {
            if let Some(driver_id) = next.assigned_driver {
                let mut driver = self
                    .drivers
                    .get_mut(&driver_id)
                    .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
                driver.trip_count += 1;
                driver.updated_at = now;
                driver.version += 1;
            }
        }

        *booking = next.clone();
        Ok(next)
    }

    /// Stores a driver's payment proof and immediately re-evaluates their
    /// membership, so the clearance grace period starts at upload.
    pub fn commit_proof_upload(
        &self,
        driver_id: Uuid,
        amount: Money,
        evidence_ref: String,
    ) -> Result<PaymentProof, AppError> {
        let now = self.now();

        let mut driver = self
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        let existing = self.proofs_for(driver_id);
        let proof = membership::submit_proof(driver.value(), &existing, amount, evidence_ref, now)?;
        self.proofs.insert(proof.id, proof.clone());

        let commit = self.tick_locked(driver.value_mut(), now);
        drop(driver);

        info!(driver_id = %driver_id, proof_id = %proof.id, month = proof.month, "payment proof uploaded");
        self.report_tick(driver_id, &commit);

        Ok(proof)
    }

    /// Records an admin decision on a proof together with the driver update.
    pub fn commit_verification(
        &self,
        proof_id: Uuid,
        approved: bool,
        admin_id: &str,
        rejection_reason: Option<&str>,
    ) -> Result<Verification, AppError> {
        let now = self.now();

        // a proof never changes owner, so its driver can be read unlocked
        let driver_id = self
            .proofs
            .get(&proof_id)
            .map(|proof| proof.driver_id)
            .ok_or_else(|| AppError::NotFound(format!("proof {proof_id} not found")))?;
        let mut driver = self
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
        let mut proof = self
            .proofs
            .get_mut(&proof_id)
            .ok_or_else(|| AppError::NotFound(format!("proof {proof_id} not found")))?;

        let mut verification =
            membership::verify_payment(&driver, &proof, approved, admin_id, rejection_reason, now)?;

        verification.driver.version = driver.version + 1;
        *driver = verification.driver.clone();
        *proof = verification.proof.clone();
        drop(proof);
        drop(driver);

        let to = format!("{:?}", verification.driver.membership.status);
        self.metrics
            .membership_transitions_total
            .with_label_values(&[to.as_str()])
            .inc();

        info!(
            proof_id = %proof_id,
            driver_id = %driver_id,
            approved,
            admin_id,
            month = verification.driver.membership.current_month,
            "payment proof decided"
        );

        Ok(verification)
    }

    /// Runs the membership tick for one driver and commits any transition.
    /// Also clears a penalty that has run out.
    pub fn apply_tick(&self, driver_id: Uuid) -> Result<TickOutcome, AppError> {
        let now = self.now();

        let mut driver = self
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
        let commit = self.tick_locked(driver.value_mut(), now);
        drop(driver);

        self.report_tick(driver_id, &commit);
        Ok(commit.outcome)
    }

    /// Tick body. The caller holds the driver's entry lock; proofs are read
    /// under it so an upload cannot slip in between the read and the commit.
    fn tick_locked(&self, driver: &mut Driver, now: DateTime<Utc>) -> TickCommit {
        let proofs = self.proofs_for(driver.id);
        let outcome = membership::tick(driver, &proofs, now);

        let mut next = outcome.driver.clone().unwrap_or_else(|| driver.clone());
        let penalty_cleared = match clear_expired_penalty(&next, now) {
            Some(cleared) => {
                next = cleared;
                true
            }
            None => false,
        };
        if outcome.driver.is_some() || penalty_cleared {
            next.version = driver.version + 1;
            *driver = next;
        }

        let announce_review = outcome
            .manual_review
            .as_ref()
            .filter(|review| review.first_request)
            .is_some_and(|review| self.mark_review_requested(review.proof_id, now));

        TickCommit {
            period_end: driver.membership.period_end,
            outcome,
            announce_review,
        }
    }

    fn mark_review_requested(&self, proof_id: Uuid, now: DateTime<Utc>) -> bool {
        match self.proofs.get_mut(&proof_id) {
            Some(mut proof) if proof.review_requested_at.is_none() => {
                proof.review_requested_at = Some(now);
                true
            }
            _ => false,
        }
    }

    fn report_tick(&self, driver_id: Uuid, commit: &TickCommit) {
        if let Some(transition) = &commit.outcome.transition {
            let to = match transition {
                MembershipTransition::EnteredVerification { .. } => "PaymentVerification",
                MembershipTransition::RenewalDue => "PendingPayment",
                MembershipTransition::Deactivated => "Deactivated",
            };
            self.metrics
                .membership_transitions_total
                .with_label_values(&[to])
                .inc();
            info!(driver_id = %driver_id, to, "membership transition");

            if *transition == MembershipTransition::Deactivated {
                self.publish(DispatchEvent::DriverDeactivated {
                    driver_id,
                    period_end: commit.period_end,
                });
            }
        }

        if let Some(review) = commit.outcome.manual_review.as_ref().filter(|_| commit.announce_review) {
            warn!(
                driver_id = %driver_id,
                proof_id = %review.proof_id,
                deadline = %review.clearance_deadline,
                "payment proof needs manual review"
            );
            self.publish(DispatchEvent::ManualReviewRequired {
                driver_id,
                proof_id: review.proof_id,
                uploaded_at: review.uploaded_at,
                clearance_deadline: review.clearance_deadline,
            });
        }
    }
}

struct TickCommit {
    outcome: TickOutcome,
    period_end: DateTime<Utc>,
    /// Set only on the tick that first recorded the review request.
    announce_review: bool,
}

fn check_version(kind: &str, id: Uuid, current: u64, expected: Option<u64>) -> Result<(), AppError> {
    match expected {
        Some(expected) if expected != current => Err(AppError::Conflict(format!(
            "{kind} {id} is at version {current}, not {expected}"
        ))),
        _ => Ok(()),
    }
}
