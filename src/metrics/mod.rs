//! Prometheus metrics for the monitor
//!
//! This module provides metrics tracking for:
//! - Alert bus: alerts published by kind and severity, stored alerts, subscriber failures
//! - Monitor loop: check runs and failures, source errors, loop recoveries, tick duration
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram,
    Counter, CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use parking_lot::Mutex;
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for alert bus metrics
struct AlertMetrics {
    published: CounterVec,
    stored: Gauge,
    subscriber_failures: Counter,
}

/// Container for monitor loop metrics
struct MonitorMetrics {
    check_runs: CounterVec,
    check_failures: CounterVec,
    source_errors: CounterVec,
    loop_recoveries: Counter,
    tick_duration: Histogram,
    running: Gauge,
}

/// Global storage for alert metrics
static ALERT_METRICS: OnceLock<AlertMetrics> = OnceLock::new();

/// Global storage for monitor metrics
static MONITOR_METRICS: OnceLock<MonitorMetrics> = OnceLock::new();

/// Set once initialization has been attempted; held while registering
static METRICS_INIT_ATTEMPTED: Mutex<bool> = Mutex::new(false);

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Call once at application startup. If registration fails the error is
/// returned and every recording function below stays a no-op.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = seikyoku::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    let mut attempted = METRICS_INIT_ATTEMPTED.lock();
    if *attempted {
        return Ok(());
    }
    *attempted = true;

    let alerts = AlertMetrics {
        published: register_counter_vec!(
            "seikyoku_alerts_published_total",
            "Total alerts published by kind and severity",
            &["kind", "severity"]
        )?,
        stored: register_gauge!(
            "seikyoku_alerts_stored",
            "Number of alerts currently held by the alert bus"
        )?,
        subscriber_failures: register_counter!(
            "seikyoku_subscriber_failures_total",
            "Total subscriber callbacks that failed or panicked"
        )?,
    };

    let monitor = MonitorMetrics {
        check_runs: register_counter_vec!(
            "seikyoku_check_runs_total",
            "Total check routine executions",
            &["check"]
        )?,
        check_failures: register_counter_vec!(
            "seikyoku_check_failures_total",
            "Total check routine executions that failed",
            &["check"]
        )?,
        source_errors: register_counter_vec!(
            "seikyoku_source_errors_total",
            "Total metric source fetch errors by metric",
            &["metric"]
        )?,
        loop_recoveries: register_counter!(
            "seikyoku_loop_recoveries_total",
            "Total times the monitor loop recovered from a failed tick"
        )?,
        tick_duration: register_histogram!(
            "seikyoku_tick_duration_seconds",
            "Time spent running one full round of checks",
            vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
        )?,
        running: register_gauge!(
            "seikyoku_monitor_running",
            "Whether the monitor loop is running (1 = yes, 0 = no)"
        )?,
    };

    ALERT_METRICS.set(alerts).map_err(|_| "Alert metrics already initialized")?;
    MONITOR_METRICS.set(monitor).map_err(|_| "Monitor metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    ALERT_METRICS.get().is_some() && MONITOR_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a published alert
pub fn record_alert_published(kind: &str, severity: &str) {
    if let Some(m) = ALERT_METRICS.get() {
        m.published.with_label_values(&[kind, severity]).inc();
    }
}

/// Update the number of stored alerts
pub fn update_alert_queue_size(size: usize) {
    if let Some(m) = ALERT_METRICS.get() {
        m.stored.set(size as f64);
    }
}

/// Record a failed or panicking subscriber
pub fn record_subscriber_failure() {
    if let Some(m) = ALERT_METRICS.get() {
        m.subscriber_failures.inc();
    }
}

/// Record one check routine execution
pub fn record_check_run(check: &str, failed: bool) {
    let Some(m) = MONITOR_METRICS.get() else {
        return;
    };

    m.check_runs.with_label_values(&[check]).inc();
    if failed {
        m.check_failures.with_label_values(&[check]).inc();
    }
}

/// Record a metric source error
pub fn record_source_error(metric: &str) {
    if let Some(m) = MONITOR_METRICS.get() {
        m.source_errors.with_label_values(&[metric]).inc();
    }
}

/// Record a loop recovery after a failed tick
pub fn record_loop_recovery() {
    if let Some(m) = MONITOR_METRICS.get() {
        m.loop_recoveries.inc();
    }
}

/// Update monitor running state
pub fn set_monitor_running(running: bool) {
    if let Some(m) = MONITOR_METRICS.get() {
        m.running.set(if running { 1.0 } else { 0.0 });
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a tick timer (returns a timer handle)
pub fn start_tick_timer() -> MetricsTimer {
    match MONITOR_METRICS.get() {
        Some(m) => MetricsTimer::new(m.tick_duration.start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================
