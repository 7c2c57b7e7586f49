use engine_core::{TickObserver, TickReport};
use engine_io::metrics::{
    init_metrics, record_reading, serve_metrics, ENVELOPE_VIOLATIONS, PHASE_TRANSITIONS,
    PUBLISH_FAILURES, TICKS_EXECUTED,
};
use std::thread;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Feeds each tick's outcome into the Prometheus registry.
pub struct MetricsObserver;

impl TickObserver for MetricsObserver {
    fn on_tick(&mut self, report: &TickReport) {
        record_reading(&report.reading);
        TICKS_EXECUTED.inc();
        if report.transition.is_some() {
            PHASE_TRANSITIONS.inc();
        }
        if report.violation.is_some() {
            ENVELOPE_VIOLATIONS.inc();
        }
        let failures = u64::from(report.retries) + report.dropped.len() as u64;
        if failures > 0 {
            PUBLISH_FAILURES.inc_by(failures);
        }
    }
}
