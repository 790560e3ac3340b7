//! Common test utilities

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use seikyoku::config::Config;
use seikyoku::models::{MetricKind, WatchList};
use seikyoku::notifications::{Alert, AlertKind, Severity};
use seikyoku::source::{MetricSource, SourceError, SourceResult};

/// Behaviour of one scripted series
#[derive(Debug, Clone)]
enum Script {
    /// Values returned in order; the last one repeats
    Values(VecDeque<f64>),
    /// Always fails
    Fail,
    /// Always panics
    Panic,
}

/// Source driven by per-series scripts; unscripted series are unavailable
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<(String, MetricKind), Script>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Decrements the in-flight count even when a script panics
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script successive readings for a series
    pub fn values(self, entity: &str, kind: MetricKind, values: &[f64]) -> Self {
        self.scripts.lock().insert(
            (entity.to_string(), kind),
            Script::Values(values.iter().copied().collect()),
        );
        self
    }

    pub fn failing(self, entity: &str, kind: MetricKind) -> Self {
        self.scripts
            .lock()
            .insert((entity.to_string(), kind), Script::Fail);
        self
    }

    pub fn panicking(self, entity: &str, kind: MetricKind) -> Self {
        self.scripts
            .lock()
            .insert((entity.to_string(), kind), Script::Panic);
        self
    }

    /// Sleep this long before every reading
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of readings ever fetched at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next(&self, entity: &str, kind: MetricKind) -> SourceResult<f64> {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(&(entity.to_string(), kind)) {
            Some(Script::Values(values)) => {
                let value = if values.len() > 1 {
                    values.pop_front()
                } else {
                    values.front().copied()
                };
                value.ok_or_else(|| SourceError::Unavailable("script exhausted".into()))
            }
            Some(Script::Fail) => Err(SourceError::Unavailable(format!("{entity}/{kind} down"))),
            Some(Script::Panic) => {
                drop(scripts);
                panic!("scripted panic for {entity}/{kind}");
            }
            None => Err(SourceError::NotFound {
                entity: entity.to_string(),
                metric: kind,
            }),
        }
    }
}

#[async_trait]
impl MetricSource for ScriptedSource {
    async fn fetch_metric(&self, entity_id: &str, kind: MetricKind) -> SourceResult<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next(entity_id, kind)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Config watching the given entities, with a short stop timeout
#[allow(dead_code)]
pub fn test_config(entities: &[&str]) -> Config {
    let mut config = Config::default();
    config.watch_list = WatchList::new(entities.iter().copied());
    config.monitor.stop_timeout_ms = 1000;
    config.monitor.recovery_delay_secs = 1;
    config
}

/// Alert created `hours_ago` hours in the past
#[allow(dead_code)]
pub fn alert_hours_ago(id: &str, severity: Severity, hours_ago: i64) -> Alert {
    Alert::builder(AlertKind::SupportChange, severity, format!("alert {id}"))
        .id(id)
        .created_at(chrono::Utc::now() - chrono::Duration::hours(hours_ago))
        .build()
}
