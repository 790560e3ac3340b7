//! Background monitor loop
//!
//! A [`MonitorScheduler`] owns one alert bus and at most one background
//! worker. The worker runs every check in order, prunes expired alerts and
//! sleeps for the configured interval. Stopping is cooperative: a watch
//! channel is checked once per iteration and raced against every sleep, so
//! a tick in progress always completes. A worker that outlives the stop
//! timeout is kept as draining, and no new worker starts until it exits.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::checks::{CheckContext, CheckOutcome, CHECKS};
use super::error::MonitorError;
use super::interval::MonitorInterval;
use super::observations::ObservationLog;
use crate::config::Config;
use crate::metrics;
use crate::notifications::subscribers::panic_message;
use crate::notifications::{
    Alert, AlertBus, AlertFilter, AlertKind, AlertSubscriber, AlertThresholds, Severity,
};
use crate::report::{DailyReport, EntityTrend, ReportGenerator};
use crate::source::MetricSource;

/// Summary of one round of checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Outcome of every check that ran to completion, in run order
    pub checks: Vec<CheckOutcome>,
    /// Checks that panicked or had every reading fail
    pub failed_checks: Vec<String>,
    /// Alerts removed by retention pruning
    pub pruned: usize,
}

impl TickSummary {
    /// Alerts published during the tick
    pub fn alerts_published(&self) -> usize {
        self.checks.iter().map(|c| c.alerts.len()).sum()
    }
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub running: bool,
    /// Active interval label, e.g. "frequent"
    pub interval: Option<String>,
    pub period_secs: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    /// A stopped worker is still finishing its last tick
    pub draining: bool,
    pub ticks: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Name of the metric source being polled
    pub source: String,
    pub watched_entities: usize,
    pub stored_alerts: usize,
    pub subscribers: usize,
}

/// State shared between the scheduler handle and its worker
struct MonitorContext {
    source: Arc<dyn MetricSource>,
    bus: Arc<AlertBus>,
    observations: Arc<ObservationLog>,
    thresholds: AlertThresholds,
    config: Config,
    ticks: AtomicU64,
    last_tick_at: Mutex<Option<DateTime<Utc>>>,
    #[cfg(test)]
    failing_ticks: std::sync::atomic::AtomicUsize,
}

impl MonitorContext {
    async fn tick(&self) -> TickSummary {
        let _timer = metrics::start_tick_timer();
        let started_at = Utc::now();
        let ctx = CheckContext {
            source: self.source.as_ref(),
            bus: &self.bus,
            thresholds: &self.thresholds,
            observations: &self.observations,
            watch_list: &self.config.watch_list,
        };

        let mut checks = Vec::with_capacity(CHECKS.len());
        let mut failed_checks = Vec::new();

        for spec in CHECKS.iter() {
            match AssertUnwindSafe(spec.run(&ctx)).catch_unwind().await {
                Ok(outcome) => {
                    let failed = outcome.is_failure();
                    metrics::record_check_run(spec.source_label, failed);
                    if failed {
                        let err = MonitorError::check_failed(spec.name, "every reading failed");
                        tracing::warn!(check = spec.name, error = %err, "Check produced no readings");
                        failed_checks.push(spec.name.to_string());
                    }
                    checks.push(outcome);
                }
                Err(panic) => {
                    let err = MonitorError::check_panicked(spec.name, panic_message(&panic));
                    metrics::record_check_run(spec.source_label, true);
                    tracing::error!(check = spec.name, error = %err, "Check aborted");
                    failed_checks.push(spec.name.to_string());
                }
            }
        }

        #[cfg(test)]
        self.fail_if_requested();

        let retention = chrono::Duration::try_hours(self.config.monitor.alert_retention_hours.max(0));
        let pruned = retention.map_or(0, |age| self.bus.prune_older_than(age));

        let finished_at = Utc::now();
        self.ticks.fetch_add(1, Ordering::Relaxed);
        *self.last_tick_at.lock() = Some(finished_at);

        let summary = TickSummary {
            started_at,
            finished_at,
            checks,
            failed_checks,
            pruned,
        };
        tracing::info!(
            alerts = summary.alerts_published(),
            failed = summary.failed_checks.len(),
            pruned,
            "Monitor tick completed"
        );
        summary
    }

    /// Panic once per pending request, after the checks have run
    #[cfg(test)]
    fn fail_if_requested(&self) {
        let pending = self
            .failing_ticks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            panic!("retention pass failed");
        }
    }
}

/// Handle to a running worker
struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
    label: String,
    period: Duration,
    started_at: DateTime<Utc>,
}

/// Owner of the monitor loop and its alert bus
pub struct MonitorScheduler {
    ctx: Arc<MonitorContext>,
    reports: ReportGenerator,
    worker: Mutex<Option<Worker>>,
    /// Worker that missed the stop timeout and has not exited yet
    draining: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorScheduler {
    /// Create a scheduler reading from `source`
    pub fn new(config: Config, source: Arc<dyn MetricSource>) -> Self {
        let bus = Arc::new(AlertBus::new(config.monitor.alert_capacity));
        let observations = Arc::new(ObservationLog::new(config.monitor.history_len));
        let analyzer = config.analysis.analyzer();

        let reports = ReportGenerator::new(
            bus.clone(),
            source.clone(),
            observations.clone(),
            analyzer,
            config.watch_list.clone(),
            config.report.clone(),
        );

        let ctx = MonitorContext {
            source,
            bus,
            observations,
            thresholds: config.thresholds.clone(),
            config,
            ticks: AtomicU64::new(0),
            last_tick_at: Mutex::new(None),
            #[cfg(test)]
            failing_ticks: std::sync::atomic::AtomicUsize::new(0),
        };

        Self {
            ctx: Arc::new(ctx),
            reports,
            worker: Mutex::new(None),
            draining: Mutex::new(None),
        }
    }

    /// Create a scheduler with default configuration
    pub fn with_defaults(source: Arc<dyn MetricSource>) -> Self {
        Self::new(Config::default(), source)
    }

    /// Start the loop at a named interval
    ///
    /// Returns false when already running, while a previous worker is still
    /// draining, when the period is zero, or when called outside a tokio
    /// runtime.
    pub fn start(&self, interval: MonitorInterval) -> bool {
        let period = self.ctx.config.monitor.intervals.duration(interval);
        self.spawn_worker(interval.as_str().to_string(), period)
    }

    /// Start the loop at an interval given by name, unknown names meaning `frequent`
    pub fn start_named(&self, name: &str) -> bool {
        self.start(MonitorInterval::resolve(name))
    }

    /// Start the loop with an explicit period
    pub fn start_every(&self, period: Duration) -> bool {
        self.spawn_worker(format!("{}ms", period.as_millis()), period)
    }

    fn spawn_worker(&self, label: String, period: Duration) -> bool {
        if period.is_zero() {
            let err = MonitorError::InvalidInterval {
                reason: format!("period for '{label}' must be greater than zero"),
            };
            tracing::error!(error = %err, "Monitor not started");
            return false;
        }

        let mut worker = self.worker.lock();
        if worker.is_some() {
            tracing::warn!("Monitor already running");
            return false;
        }

        {
            let mut draining = self.draining.lock();
            if draining.as_ref().is_some_and(|h| !h.is_finished()) {
                tracing::warn!(interval = %label, "Previous monitor worker still draining");
                return false;
            }
            *draining = None;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(error = %MonitorError::NoRuntime, cause = %e, "Monitor not started");
                return false;
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let recovery = self.ctx.config.recovery_delay();
        let handle = runtime.spawn(run_loop(self.ctx.clone(), period, recovery, shutdown_rx));

        *worker = Some(Worker {
            shutdown,
            handle,
            label: label.clone(),
            period,
            started_at: Utc::now(),
        });
        metrics::set_monitor_running(true);

        tracing::info!(
            interval = %label,
            period_secs = period.as_secs_f64(),
            entities = self.ctx.config.watch_list.len(),
            source = self.ctx.source.name(),
            "Monitor started"
        );
        true
    }

    /// Stop the loop, waiting up to the configured timeout
    ///
    /// A no-op when not running. If the worker does not exit in time it is
    /// kept as draining and stops at its next cancellation check; starting
    /// again is refused until then.
    pub async fn stop(&self) {
        let worker = self.worker.lock().take();
        let Some(Worker {
            shutdown,
            mut handle,
            ..
        }) = worker
        else {
            tracing::debug!("Monitor not running");
            return;
        };

        let _ = shutdown.send(true);
        let timeout = self.ctx.config.stop_timeout();

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => tracing::info!("Monitor stopped"),
            Ok(Err(e)) => {
                let err = MonitorError::WorkerJoin {
                    reason: e.to_string(),
                };
                tracing::error!(error = %err, "Monitor worker failed");
            }
            Err(_) => {
                let err = MonitorError::StopTimeout {
                    waited_ms: timeout.as_millis() as u64,
                };
                tracing::warn!(error = %err, "Monitor worker still draining");
                *self.draining.lock() = Some(handle);
            }
        }
        metrics::set_monitor_running(false);
    }

    /// Whether a worker is active
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Register a plain alert callback
    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        self.ctx.bus.subscribers().register_callback(callback);
    }

    /// Register a named subscriber
    pub fn register_subscriber(&self, subscriber: Arc<dyn AlertSubscriber>) {
        self.ctx.bus.subscribers().register(subscriber);
    }

    /// Alerts from the last `within_hours` hours, newest first
    ///
    /// Negative hours select nothing; windows beyond the representable range
    /// select every stored alert.
    pub fn get_current_alerts(&self, severity: Option<Severity>, within_hours: i64) -> Vec<Alert> {
        let filter = AlertFilter {
            severity,
            ..AlertFilter::last_hours(within_hours)
        };
        self.ctx.bus.snapshot(&filter)
    }

    /// The scheduler's alert bus
    pub fn bus(&self) -> &Arc<AlertBus> {
        &self.ctx.bus
    }

    /// Run one round of checks on the calling task
    pub async fn run_once(&self) -> TickSummary {
        self.ctx.tick().await
    }

    /// Build the daily report
    pub async fn generate_daily_report(&self) -> DailyReport {
        let status = self.status();
        self.reports.generate(&status).await
    }

    /// Trend analysis for one entity over its newest `samples` readings
    ///
    /// The entity need not be on the watch-list; without source history
    /// the monitor's own observations are used.
    pub async fn analyze_entity_trends(
        &self,
        entity_id: &str,
        samples: usize,
    ) -> crate::error::Result<EntityTrend> {
        self.reports.entity_trend(entity_id, samples).await
    }

    /// Publish a synthetic alert and confirm it reached the bus
    pub fn test_system(&self) -> bool {
        let bus = &self.ctx.bus;
        let result = catch_unwind(AssertUnwindSafe(|| {
            let alert = Alert::builder(AlertKind::Test, Severity::Low, "テストアラート")
                .id(format!("test_{}", uuid::Uuid::new_v4().simple()))
                .entity("TEST001")
                .description("システム動作確認用のテストアラートです")
                .source("test")
                .with("test", true)
                .build();
            let id = alert.id.clone();
            bus.publish(alert);
            bus.contains(&id)
        }));

        match result {
            Ok(true) => {
                tracing::info!("Monitor self-test passed");
                true
            }
            Ok(false) => {
                tracing::error!("Monitor self-test failed: alert not stored");
                false
            }
            Err(panic) => {
                tracing::error!(panic = %panic_message(&panic), "Monitor self-test failed");
                false
            }
        }
    }

    /// Current scheduler status
    pub fn status(&self) -> MonitorStatus {
        let worker = self.worker.lock();
        MonitorStatus {
            running: worker.is_some(),
            interval: worker.as_ref().map(|w| w.label.clone()),
            period_secs: worker.as_ref().map(|w| w.period.as_secs()),
            started_at: worker.as_ref().map(|w| w.started_at),
            draining: self
                .draining
                .lock()
                .as_ref()
                .is_some_and(|h| !h.is_finished()),
            ticks: self.ctx.ticks.load(Ordering::Relaxed),
            last_tick_at: *self.ctx.last_tick_at.lock(),
            source: self.ctx.source.name().to_string(),
            watched_entities: self.ctx.config.watch_list.len(),
            stored_alerts: self.ctx.bus.len(),
            subscribers: self.ctx.bus.subscribers().len(),
        }
    }

    /// Configuration the scheduler was built with
    pub fn config(&self) -> &Config {
        &self.ctx.config
    }
}

impl Drop for MonitorScheduler {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.shutdown.send(true);
            tracing::debug!("Monitor dropped while running; worker signalled to stop");
        }
    }
}

impl std::fmt::Debug for MonitorScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorScheduler")
            .field("status", &self.status())
            .finish()
    }
}

async fn run_loop(
    ctx: Arc<MonitorContext>,
    period: Duration,
    recovery: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(period_secs = period.as_secs_f64(), "Monitor loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let delay = match AssertUnwindSafe(ctx.tick()).catch_unwind().await {
            Ok(_) => period,
            Err(panic) => {
                let err = MonitorError::TickPanicked {
                    reason: panic_message(&panic),
                };
                metrics::record_loop_recovery();
                tracing::error!(
                    error = %err,
                    detail = %err.localized_desc(),
                    recovery_secs = recovery.as_secs_f64(),
                    "Monitor tick failed, recovering"
                );
                recovery
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Monitor loop stopped");
}
