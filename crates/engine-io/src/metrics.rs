//! Prometheus metrics for the telemetry generator.
//!
//! Engine gauges mirror the latest reading; counters track the driver and
//! the bridge's delivery bookkeeping.

use engine_core::{tags, Reading};
use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Driver Metrics
// ============================================================================

/// Total ticks generated
pub static TICKS_EXECUTED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(tags::TICK.metric, "Total engine ticks generated").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Duty phase changes
pub static PHASE_TRANSITIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "engine_phase_transitions_total",
        "Duty cycle phase transitions",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Sink publish attempts that failed
pub static PUBLISH_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "engine_publish_failures_total",
        "Sink publish attempts that failed (retried or dropped)",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Readings outside the physical envelope
pub static ENVELOPE_VIOLATIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "engine_envelope_violations_total",
        "Readings outside the expected physical envelope",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Engine State Metrics
// ============================================================================

/// Current revolution in RPM
pub static REVOLUTION_RPM: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::REVOLUTION_RPM.metric,
        "Current engine revolution in RPM",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Current oil pressure in bar
pub static OIL_PRESSURE_BAR: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::OIL_PRESSURE_BAR.metric, "Current oil pressure in bar").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Current temperature in Celsius
pub static TEMPERATURE_C: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::TEMPERATURE_C.metric,
        "Current engine temperature in Celsius",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Timestamp of the latest reading in Unix microseconds
pub static LAST_READING_TIMESTAMP_US: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::TIMESTAMP.metric,
        "Timestamp of the latest reading in Unix microseconds",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Duty phase (1 = running, 0 = idle)
pub static DUTY_RUNNING: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::DUTY_PHASE.metric, "Duty phase (1=running, 0=idle)").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Bridge Metrics
// ============================================================================

/// Bridge client connection status (1 = connected, 0 = disconnected)
pub static BRIDGE_CONNECTED: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "engine_bridge_connected",
        "Bridge client connection status (1=connected, 0=disconnected)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Telemetry messages written to the subscriber
pub static MESSAGES_PUBLISHED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "engine_messages_published_total",
        "Telemetry messages sent to the bridge subscriber (first delivery)",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// QoS 1 redeliveries
pub static MESSAGES_REDELIVERED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "engine_messages_redelivered_total",
        "Unacknowledged QoS 1 messages sent again",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Messages given up on
pub static MESSAGES_DROPPED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "engine_messages_dropped_total",
        "QoS 1 messages dropped after exhausting redeliveries",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Acknowledgements received
pub static MESSAGES_ACKED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "engine_messages_acked_total",
        "QoS 1 acknowledgements matched to an in-flight message",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Mirror a reading into the engine gauges.
pub fn record_reading(reading: &Reading) {
    REVOLUTION_RPM.set(reading.revolution);
    OIL_PRESSURE_BAR.set(reading.pressure);
    TEMPERATURE_C.set(reading.temperature);
    LAST_READING_TIMESTAMP_US.set(reading.timestamp_us as f64);
    DUTY_RUNNING.set(if reading.running() { 1.0 } else { 0.0 });
}

/// Text exposition of the whole registry.
pub fn gather_text() -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => {
                    let buffer = match gather_text() {
                        Ok(buffer) => buffer,
                        Err(e) => {
                            tracing::warn!("Failed to encode metrics: {}", e);
                            let _ = request.respond(
                                Response::from_string("Internal Server Error")
                                    .with_status_code(500),
                            );
                            continue;
                        }
                    };

                    let mut response = Response::from_data(buffer);
                    if let Ok(header) = tiny_http::Header::from_bytes(
                        &b"Content-Type"[..],
                        &b"text/plain; version=0.0.4"[..],
                    ) {
                        response = response.with_header(header);
                    }
                    let _ = request.respond(response);
                }
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    // Ready once the first reading exists
                    if TICKS_EXECUTED.get() > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = TICKS_EXECUTED.get();
    let _ = PHASE_TRANSITIONS.get();
    let _ = PUBLISH_FAILURES.get();
    let _ = ENVELOPE_VIOLATIONS.get();
    let _ = REVOLUTION_RPM.get();
    let _ = OIL_PRESSURE_BAR.get();
    let _ = TEMPERATURE_C.get();
    let _ = LAST_READING_TIMESTAMP_US.get();
    let _ = DUTY_RUNNING.get();
    let _ = BRIDGE_CONNECTED.get();
    let _ = MESSAGES_PUBLISHED.get();
    let _ = MESSAGES_REDELIVERED.get();
    let _ = MESSAGES_DROPPED.get();
    let _ = MESSAGES_ACKED.get();
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::DutyPhase;

    #[test]
    fn gauges_follow_reading_and_registry_exports_them() {
        init_metrics();
        record_reading(&Reading {
            tick: 7,
            timestamp_us: 1_704_067_200_000_000,
            phase: DutyPhase::Running,
            revolution: 1234.5,
            pressure: 3.5,
            temperature: 55.0,
        });
        assert_eq!(REVOLUTION_RPM.get(), 1234.5);
        assert_eq!(DUTY_RUNNING.get(), 1.0);
        assert_eq!(LAST_READING_TIMESTAMP_US.get(), 1_704_067_200_000_000.0);

        let text = String::from_utf8(gather_text().unwrap()).unwrap();
        assert!(text.contains("engine_revolution_rpm 1234.5"));
        assert!(text.contains("engine_bridge_connected"));
    }
}
