//! Daily situation report
//!
//! A report combines the monitor status, recent alerts, per-entity trend
//! analysis for the watch-list and a list of key developments. Every part is
//! built independently: an error or panic while building one part turns
//! that part into a [`ReportSection::Failed`] marker and the rest of the
//! report is still produced.

use chrono::{DateTime, NaiveDate, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::analytics::trends::{validate_samples, TrendError};
use crate::analytics::{TrendAnalysis, TrendAnalyzer, TrendDirection, TrendMetric};
use crate::config::ReportConfig;
use crate::error::Result;
use crate::models::{MetricKind, WatchList};
use crate::monitor::observations::ObservationLog;
use crate::monitor::MonitorStatus;
use crate::notifications::subscribers::panic_message;
use crate::notifications::{Alert, AlertBus, AlertFilter, Severity};
use crate::source::MetricSource;

/// A notable development listed in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Development {
    pub headline: String,
    pub impact: Severity,
    /// Entities the development concerns
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// One independently built part of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSection<T> {
    Ok(T),
    Failed { error: String },
}

impl<T> ReportSection<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Section content, if it was built
    pub fn as_ok(&self) -> Option<&T> {
        match self {
            Self::Ok(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }

    /// Failure message, if the section failed
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Ok(_) => None,
            Self::Failed { error } => Some(error),
        }
    }
}

/// Alert counts per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl SeverityCounts {
    pub fn from_alerts(alerts: &[Alert]) -> Self {
        alerts.iter().fold(Self::default(), |mut counts, alert| {
            match alert.severity {
                Severity::Low => counts.low += 1,
                Severity::Medium => counts.medium += 1,
                Severity::High => counts.high += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high
    }
}

/// How busy the alert stream has been
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertFrequency {
    /// No medium or high alerts
    Quiet,
    Normal,
    /// More than two medium/high alerts per watched entity
    Elevated,
}

impl AlertFrequency {
    pub fn classify(counts: &SeverityCounts, watched_entities: usize) -> Self {
        let significant = counts.medium + counts.high;
        if significant == 0 {
            Self::Quiet
        } else if significant > 2 * watched_entities.max(1) {
            Self::Elevated
        } else {
            Self::Normal
        }
    }
}

/// Monitor status and alert statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallSummary {
    /// "active" or "inactive"
    pub monitoring_status: String,
    pub interval: Option<String>,
    pub watched_entities: usize,
    /// Alerts currently held by the bus
    pub queued_alerts: usize,
    /// Alerts inside the report window, by severity
    pub window_alerts: SeverityCounts,
    pub alert_frequency: AlertFrequency,
    pub last_update: DateTime<Utc>,
}

/// Trend output for one metric of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTrend {
    pub analysis: TrendAnalysis,
    /// First-versus-last summary, absent with fewer than two samples
    pub trend: Option<TrendMetric>,
    /// Positions of anomalous samples
    pub anomalies: Vec<usize>,
    pub samples: Vec<f64>,
}

/// Trend output for every metric of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTrend {
    pub entity_id: String,
    pub metrics: BTreeMap<MetricKind, MetricTrend>,
}

/// Daily situation report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub report_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub overall_summary: ReportSection<OverallSummary>,
    pub entity_trends: BTreeMap<String, ReportSection<EntityTrend>>,
    pub recent_alerts: ReportSection<Vec<Alert>>,
    pub key_developments: ReportSection<Vec<Development>>,
}

/// Builds [`DailyReport`]s from the monitor's shared state
pub struct ReportGenerator {
    bus: Arc<AlertBus>,
    source: Arc<dyn MetricSource>,
    observations: Arc<ObservationLog>,
    analyzer: TrendAnalyzer,
    watch_list: WatchList,
    config: ReportConfig,
}

impl ReportGenerator {
    pub fn new(
        bus: Arc<AlertBus>,
        source: Arc<dyn MetricSource>,
        observations: Arc<ObservationLog>,
        analyzer: TrendAnalyzer,
        watch_list: WatchList,
        config: ReportConfig,
    ) -> Self {
        Self {
            bus,
            source,
            observations,
            analyzer,
            watch_list,
            config,
        }
    }

    /// Assemble a report for the current moment
    pub async fn generate(&self, status: &MonitorStatus) -> DailyReport {
        let generated_at = Utc::now();
        let window = AlertFilter::last_hours(self.config.alert_window_hours);

        let recent_alerts = section("recent_alerts", async { Ok(self.bus.snapshot(&window)) }).await;

        let overall_summary = section("overall_summary", async {
            Ok(self.summarize(status, recent_alerts.as_ok().map(Vec::as_slice)))
        })
        .await;

        let mut entity_trends = BTreeMap::new();
        for entity in self.watch_list.iter() {
            let trend = section(
                "entity_trend",
                self.entity_trend(entity, self.config.trend_samples),
            )
            .await;
            entity_trends.insert(entity.to_string(), trend);
        }

        let key_developments = section("key_developments", async {
            Ok(self.developments(recent_alerts.as_ok().map(Vec::as_slice), &entity_trends))
        })
        .await;

        let report = DailyReport {
            report_date: generated_at.date_naive(),
            generated_at,
            overall_summary,
            entity_trends,
            recent_alerts,
            key_developments,
        };

        tracing::info!(
            date = %report.report_date,
            entities = report.entity_trends.len(),
            alerts = report.recent_alerts.as_ok().map_or(0, Vec::len),
            "Daily report generated"
        );
        report
    }

    fn summarize(&self, status: &MonitorStatus, alerts: Option<&[Alert]>) -> OverallSummary {
        let counts = alerts.map(SeverityCounts::from_alerts).unwrap_or_default();
        OverallSummary {
            monitoring_status: if status.running { "active" } else { "inactive" }.to_string(),
            interval: status.interval.clone(),
            watched_entities: self.watch_list.len(),
            queued_alerts: self.bus.len(),
            window_alerts: counts,
            alert_frequency: AlertFrequency::classify(&counts, self.watch_list.len()),
            last_update: Utc::now(),
        }
    }

    /// Trend, summary and anomalies for every metric of one entity
    ///
    /// Uses at most the newest `samples` readings per metric. Fewer than two
    /// requested samples is an error; a metric with too little history is
    /// reported with an insufficient-data analysis instead.
    pub async fn entity_trend(&self, entity: &str, samples: usize) -> Result<EntityTrend> {
        if samples < 2 {
            return Err(TrendError::InsufficientData(2, samples).into());
        }
        let limit = samples;
        let mut metrics = BTreeMap::new();

        for kind in MetricKind::all() {
            let samples = self.samples(entity, kind, limit).await;
            validate_samples(&samples)?;

            let trend = MetricTrend {
                analysis: self.analyzer.analyze_values(kind, &samples),
                trend: TrendMetric::from_series(kind, &samples, limit),
                anomalies: self.analyzer.detect_anomalies(&samples),
                samples,
            };
            metrics.insert(kind, trend);
        }

        Ok(EntityTrend {
            entity_id: entity.to_string(),
            metrics,
        })
    }

    /// Source history when available, else the monitor's own observations
    async fn samples(&self, entity: &str, kind: MetricKind, limit: usize) -> Vec<f64> {
        match self.source.fetch_history(entity, kind, limit).await {
            Ok(history) if !history.is_empty() => {
                let skip = history.len().saturating_sub(limit);
                history.into_iter().skip(skip).collect()
            }
            Ok(_) => self.observations.values(entity, kind, limit),
            Err(e) => {
                tracing::warn!(
                    entity,
                    metric = %kind,
                    error = %e,
                    "History unavailable, using observation log"
                );
                self.observations.values(entity, kind, limit)
            }
        }
    }

    fn developments(
        &self,
        alerts: Option<&[Alert]>,
        trends: &BTreeMap<String, ReportSection<EntityTrend>>,
    ) -> Vec<Development> {
        let mut developments = self.config.narratives.clone();

        for alert in alerts.unwrap_or_default() {
            if alert.severity == Severity::High {
                developments.push(Development {
                    headline: alert.title.clone(),
                    impact: Severity::High,
                    entities: alert.entity_ref.iter().cloned().collect(),
                    description: alert.description.clone(),
                });
            }
        }

        for (entity, section) in trends {
            let Some(trend) = section.as_ok() else {
                continue;
            };
            for (kind, metric) in &trend.metrics {
                if let Some(development) = self.metric_development(entity, *kind, metric) {
                    developments.push(development);
                }
            }
        }

        developments
    }

    fn metric_development(
        &self,
        entity: &str,
        kind: MetricKind,
        metric: &MetricTrend,
    ) -> Option<Development> {
        let latest = metric.samples.len().checked_sub(1)?;
        if metric.anomalies.contains(&latest) {
            return Some(Development {
                headline: format!("{entity}の{}に異常値", kind.japanese_name()),
                impact: Severity::Medium,
                entities: vec![entity.to_string()],
                description: format!(
                    "直近値 {:.3} が過去{}件の平均 {:.3} から大きく外れています",
                    metric.samples[latest],
                    metric.samples.len(),
                    metric.analysis.mean
                ),
            });
        }

        let strong = 2.0 * self.analyzer.slope_threshold(kind);
        if metric.analysis.direction.is_moving() && metric.analysis.slope.abs() >= strong {
            let movement = match metric.analysis.direction {
                TrendDirection::Rising => "上昇",
                _ => "低下",
            };
            return Some(Development {
                headline: format!("{entity}の{}が{movement}傾向", kind.japanese_name()),
                impact: Severity::Low,
                entities: vec![entity.to_string()],
                description: format!(
                    "傾き {:+.3} / サンプル ({}件)",
                    metric.analysis.slope, metric.analysis.samples
                ),
            });
        }

        None
    }
}

/// Build one section, turning errors and panics into a failure marker
async fn section<T, F>(name: &str, build: F) -> ReportSection<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(build).catch_unwind().await {
        Ok(Ok(value)) => ReportSection::Ok(value),
        Ok(Err(e)) => {
            tracing::warn!(section = name, error = %e, "Report section failed");
            ReportSection::Failed {
                error: e.to_string(),
            }
        }
        Err(panic) => {
            let reason = panic_message(&panic);
            tracing::error!(section = name, panic = %reason, "Report section panicked");
            ReportSection::Failed {
                error: format!("panicked: {reason}"),
            }
        }
    }
}
