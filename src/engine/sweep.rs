use std::sync::Arc;
use std::time::Instant;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evaluated: usize,
    pub transitions: usize,
    pub manual_reviews: usize,
}

/// Background membership sweep. Every tick is idempotent, so a slow or
/// skipped interval only delays transitions.
pub async fn run_membership_sweep(state: Arc<AppState>, every: Duration) {
    info!(interval_secs = every.as_secs(), "membership sweep started");

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let start = Instant::now();
        let report = sweep_once(&state);
        state
            .metrics
            .sweep_duration_seconds
            .observe(start.elapsed().as_secs_f64());

        debug!(
            evaluated = report.evaluated,
            transitions = report.transitions,
            manual_reviews = report.manual_reviews,
            "membership sweep finished"
        );
    }
}

pub fn sweep_once(state: &AppState) -> SweepReport {
    let driver_ids: Vec<Uuid> = state.drivers.iter().map(|entry| *entry.key()).collect();
    let mut report = SweepReport::default();

    for driver_id in driver_ids {
        match state.apply_tick(driver_id) {
            Ok(outcome) => {
                report.evaluated += 1;
                if outcome.transition.is_some() {
                    report.transitions += 1;
                }
                if outcome.manual_review.is_some() {
                    report.manual_reviews += 1;
                }
            }
            Err(err) => {
                error!(driver_id = %driver_id, error = %err, "membership tick failed");
            }
        }
    }

    state
        .metrics
        .manual_reviews_required
        .set(report.manual_reviews as i64);

    report
}
