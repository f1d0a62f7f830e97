//! Prometheus metrics for the controller.
//!
//! Values are pushed from the connection loop after each tick and each
//! connection change; the exporter only reads the registry.

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use spindle_core::control_loop::{ExecutionStats, TickReport};
use spindle_core::tags::{self, Tag};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Control Loop Metrics
// ============================================================================

/// Control ticks executed
pub static TICKS_EXECUTED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("spindle_ticks_executed_total", "Control ticks executed")
        .expect("metric can be created");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric can be registered");
    counter
});

/// Tachometer readings discarded by the plausibility screen
pub static READINGS_REJECTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "spindle_readings_rejected_total",
            "Tachometer readings rejected, by reason",
        ),
        &["reason"],
    )
    .expect("metric can be created");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric can be registered");
    counter
});

/// How far past its period each tick ran
pub static TICK_LATENESS_US: LazyLock<Histogram> = LazyLock::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            tags::TICK_LATENESS_US.metric,
            "Control tick lateness distribution in microseconds",
        )
        .buckets(vec![
            100.0, 1_000.0, 5_000.0, 10_000.0, 25_000.0, 50_000.0, 100_000.0, 250_000.0,
        ]),
    )
    .expect("metric can be created");
    REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("metric can be registered");
    histogram
});

/// Commands executed from the client stream
pub static COMMANDS_EXECUTED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("spindle_commands_executed_total", "Client commands executed")
        .expect("metric can be created");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric can be registered");
    counter
});

/// Times the actuator was driven to the safe state
pub static ALL_STOPS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("spindle_all_stops_total", "All-stop procedures executed")
        .expect("metric can be created");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric can be registered");
    counter
});

// ============================================================================
// Process State Metrics
// ============================================================================

/// Smoothed rotor speed
pub static SMOOTHED_RPM: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::SMOOTHED_RPM.metric, "Smoothed rotor speed in RPM")
        .expect("metric can be created");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("metric can be registered");
    gauge
});

/// Closed-loop target speed
pub static TARGET_RPM: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::TARGET_RPM.metric, "Target speed in RPM")
        .expect("metric can be created");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("metric can be registered");
    gauge
});

/// PWM power
pub static POWER_PERCENT: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::POWER_PERCENT.metric, "Motor power in percent")
        .expect("metric can be created");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("metric can be registered");
    gauge
});

/// Control mode (0=manual, 1=automatic)
pub static CONTROL_MODE: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::CONTROL_MODE.metric,
        "Control mode (0=manual, 1=automatic)",
    )
    .expect("metric can be created");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("metric can be registered");
    gauge
});

// ============================================================================
// Link Metrics
// ============================================================================

/// Client connection status (1 = connected, 0 = disconnected)
pub static CLIENT_CONNECTED: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "spindle_client_connected",
        "Client connection status (1=connected, 0=disconnected)",
    )
    .expect("metric can be created");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("metric can be registered");
    gauge
});

/// Client connections accepted
pub static CONNECTIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("spindle_connections_total", "Client connections accepted")
        .expect("metric can be created");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric can be registered");
    counter
});

/// Telemetry lines queued to the client
pub static TELEMETRY_LINES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("spindle_telemetry_lines_total", "Telemetry lines sent")
        .expect("metric can be created");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric can be registered");
    counter
});

/// Publishes the process values of one tick.
pub fn record_tick(report: &TickReport) {
    TICKS_EXECUTED.inc();
    TICK_LATENESS_US.observe(report.lateness_us as f64);
    if !report.sample.verdict.is_accepted() {
        READINGS_REJECTED
            .with_label_values(&[report.sample.verdict.as_str()])
            .inc();
    }
    for (tag, value) in report.tagged_values() {
        if let Some(gauge) = process_gauge(tag) {
            gauge.set(value);
        }
    }
}

fn process_gauge(tag: Tag) -> Option<&'static Gauge> {
    match tag.key {
        k if k == tags::SMOOTHED_RPM.key => Some(&*SMOOTHED_RPM),
        k if k == tags::TARGET_RPM.key => Some(&*TARGET_RPM),
        k if k == tags::POWER_PERCENT.key => Some(&*POWER_PERCENT),
        k if k == tags::CONTROL_MODE.key => Some(&*CONTROL_MODE),
        _ => None,
    }
}

/// Forwards counters kept by the control context since the last call.
#[derive(Debug, Default)]
pub struct StatsCursor {
    last: ExecutionStats,
}

impl StatsCursor {
    pub fn publish(&mut self, stats: &ExecutionStats) {
        COMMANDS_EXECUTED.inc_by(stats.commands_executed.saturating_sub(self.last.commands_executed));
        ALL_STOPS.inc_by(stats.all_stops.saturating_sub(self.last.all_stops));
        self.last = stats.clone();
    }
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
            let response = match request.url() {
                "/metrics" => match render() {
                    Ok(body) => Response::from_data(body).with_header(
                        tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        )
                        .expect("static header is valid"),
                    ),
                    Err(e) => {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        Response::from_string("Internal Server Error").with_status_code(500)
                    }
                },
                "/health" => Response::from_string("OK"),
                // Ready once the control loop has ticked
                "/ready" if TICKS_EXECUTED.get() > 0 => Response::from_string("Ready"),
                "/ready" => Response::from_string("Not Ready").with_status_code(503),
                _ => Response::from_string("Not Found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    })
}

fn render() -> Result<Vec<u8>, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = TICKS_EXECUTED.get();
    let _ = READINGS_REJECTED.with_label_values(&["above_ceiling"]).get();
    let _ = TICK_LATENESS_US.get_sample_count();
    let _ = COMMANDS_EXECUTED.get();
    let _ = ALL_STOPS.get();
    let _ = SMOOTHED_RPM.get();
    let _ = TARGET_RPM.get();
    let _ = POWER_PERCENT.get();
    let _ = CONTROL_MODE.get();
    let _ = CLIENT_CONNECTED.get();
    let _ = CONNECTIONS.get();
    let _ = TELEMETRY_LINES.get();
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    #[test]
    fn registry_renders_after_init() {
        init_metrics();
        let text = String::from_utf8(render().unwrap()).unwrap();
        assert!(text.contains("spindle_ticks_executed_total"));
        assert!(text.contains(tags::SMOOTHED_RPM.metric));
    }

    #[test]
    fn process_tags_map_to_their_gauges() {
        for tag in [tags::SMOOTHED_RPM, tags::TARGET_RPM, tags::POWER_PERCENT, tags::CONTROL_MODE] {
            let gauge = process_gauge(tag).expect("gauge for tag");
            assert_eq!(gauge.desc()[0].fq_name, tag.metric);
        }
        // Lateness goes to the histogram instead.
        assert!(process_gauge(tags::TICK_LATENESS_US).is_none());
    }

    #[test]
    fn cursor_forwards_only_new_counts() {
        let mut cursor = StatsCursor::default();
        let before = ALL_STOPS.get();
        let mut stats = ExecutionStats {
            all_stops: 2,
            ..ExecutionStats::default()
        };
        cursor.publish(&stats);
        stats.all_stops = 3;
        cursor.publish(&stats);
        cursor.publish(&stats);
        assert!(ALL_STOPS.get() >= before + 3);
    }
}
