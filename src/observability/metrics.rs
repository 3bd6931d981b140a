use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub deliveries_created_total: IntCounterVec,
    pub status_transitions_total: IntCounterVec,
    pub notifications_total: IntCounterVec,
    pub active_simulations: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let deliveries_created_total = IntCounterVec::new(
            Opts::new("deliveries_created_total", "Delivery requests created by priority"),
            &["priority"],
        )
        .expect("valid deliveries_created_total metric");

        let status_transitions_total = IntCounterVec::new(
            Opts::new(
                "status_transitions_total",
                "Delivery status change attempts by target status and outcome",
            ),
            &["status", "outcome"],
        )
        .expect("valid status_transitions_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Chat notifications by outcome"),
            &["outcome"],
        )
        .expect("valid notifications_total metric");

        let active_simulations = IntGauge::new(
            "active_simulations",
            "Number of deliveries with a running movement simulation",
        )
        .expect("valid active_simulations metric");

        registry
            .register(Box::new(deliveries_created_total.clone()))
            .expect("register deliveries_created_total");
        registry
            .register(Box::new(status_transitions_total.clone()))
            .expect("register status_transitions_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(active_simulations.clone()))
            .expect("register active_simulations");

        Self {
            registry,
            deliveries_created_total,
            status_transitions_total,
            notifications_total,
            active_simulations,
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
