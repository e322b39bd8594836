use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub position_reports_total: IntCounterVec,
    pub status_transitions_total: IntCounterVec,
    pub assignments_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub side_effects_total: IntCounterVec,
    pub effects_in_queue: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let position_reports_total = IntCounterVec::new(
            Opts::new(
                "position_reports_total",
                "Position reports by outcome (moved, deduplicated, rejected)",
            ),
            &["outcome"],
        )
        .expect("valid position_reports_total metric");

        let status_transitions_total = IntCounterVec::new(
            Opts::new(
                "status_transitions_total",
                "Request status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid status_transitions_total metric");

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Courier assignments by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of auto-assign decisions in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let side_effects_total = IntCounterVec::new(
            Opts::new(
                "side_effects_total",
                "Fire-and-forget collaborator calls by gateway and outcome",
            ),
            &["gateway", "outcome"],
        )
        .expect("valid side_effects_total metric");

        let effects_in_queue =
            IntGauge::new("effects_in_queue", "Side-effect jobs awaiting the worker")
                .expect("valid effects_in_queue metric");

        registry
            .register(Box::new(position_reports_total.clone()))
            .expect("register position_reports_total");
        registry
            .register(Box::new(status_transitions_total.clone()))
            .expect("register status_transitions_total");
        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(side_effects_total.clone()))
            .expect("register side_effects_total");
        registry
            .register(Box::new(effects_in_queue.clone()))
            .expect("register effects_in_queue");

        Self {
            registry,
            position_reports_total,
            status_transitions_total,
            assignments_total,
            dispatch_latency_seconds,
            side_effects_total,
            effects_in_queue,
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
