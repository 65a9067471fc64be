use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub rate_updates_total: IntCounterVec,
    pub driver_cancellations_total: IntCounter,
    pub rebooking_broadcast_size: Histogram,
    pub membership_transitions_total: IntCounterVec,
    pub manual_reviews_required: IntGauge,
    pub sweep_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let rate_updates_total = IntCounterVec::new(
            Opts::new("rate_updates_total", "Driver rate change requests by outcome"),
            &["outcome"],
        )
        .expect("valid rate_updates_total metric");

        let driver_cancellations_total = IntCounter::new(
            "driver_cancellations_total",
            "Accepted bookings cancelled by the driver",
        )
        .expect("valid driver_cancellations_total metric");

        let rebooking_broadcast_size = Histogram::with_opts(
            HistogramOpts::new(
                "rebooking_broadcast_size",
                "Drivers notified per booking broadcast",
            )
            .buckets(vec![0.0, 1.0, 2.0, 4.0, 6.0, 8.0, 10.0]),
        )
        .expect("valid rebooking_broadcast_size metric");

        let membership_transitions_total = IntCounterVec::new(
            Opts::new(
                "membership_transitions_total",
                "Membership state changes by target state",
            ),
            &["to"],
        )
        .expect("valid membership_transitions_total metric");

        let manual_reviews_required = IntGauge::new(
            "manual_reviews_required",
            "Payment proofs past clearance without an admin decision at the last sweep",
        )
        .expect("valid manual_reviews_required metric");

        let sweep_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "sweep_duration_seconds",
            "Duration of one membership sweep in seconds",
        ))
        .expect("valid sweep_duration_seconds metric");

        registry
            .register(Box::new(rate_updates_total.clone()))
            .expect("register rate_updates_total");
        registry
            .register(Box::new(driver_cancellations_total.clone()))
            .expect("register driver_cancellations_total");
        registry
            .register(Box::new(rebooking_broadcast_size.clone()))
            .expect("register rebooking_broadcast_size");
        registry
            .register(Box::new(membership_transitions_total.clone()))
            .expect("register membership_transitions_total");
        registry
            .register(Box::new(manual_reviews_required.clone()))
            .expect("register manual_reviews_required");
        registry
            .register(Box::new(sweep_duration_seconds.clone()))
            .expect("register sweep_duration_seconds");

        Self {
            registry,
            rate_updates_total,
            driver_cancellations_total,
            rebooking_broadcast_size,
            membership_transitions_total,
            manual_reviews_required,
            sweep_duration_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
