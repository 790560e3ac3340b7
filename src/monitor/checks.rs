//! Check routines run by the monitor loop
//!
//! Each check reads one or more metrics for its targets, compares every
//! reading with the previous one, and publishes an alert when the change
//! reaches the configured threshold. A source failure only skips the
//! affected entity/metric pair.

use serde::{Deserialize, Serialize};

use super::observations::ObservationLog;
use crate::metrics;
use crate::models::{ChangeMeasure, MetricKind, WatchList, NATIONAL_SCOPE};
use crate::notifications::{Alert, AlertBus, AlertKind, AlertThresholds};
use crate::source::{ensure_finite, MetricSource, SourceResult};

/// Static description of one check routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckSpec {
    /// Check name used in logs and tick summaries
    pub name: &'static str,
    /// `source` label stamped on the alerts it publishes
    pub source_label: &'static str,
    pub alert_kind: AlertKind,
    /// Metrics read per target, in order
    pub metrics: &'static [MetricKind],
    /// Also read the national figure before the watch-list
    pub include_national: bool,
}

/// Checks in the order a tick runs them
pub const CHECKS: [CheckSpec; 5] = [
    CheckSpec {
        name: "support-rate",
        source_label: "support_monitor",
        alert_kind: AlertKind::SupportChange,
        metrics: &[MetricKind::SupportRate, MetricKind::RecognitionRate],
        include_national: false,
    },
    CheckSpec {
        name: "poll-release",
        source_label: "poll_monitor",
        alert_kind: AlertKind::PollRelease,
        metrics: &[MetricKind::PollMargin],
        include_national: true,
    },
    CheckSpec {
        name: "media-coverage",
        source_label: "media_monitor",
        alert_kind: AlertKind::MediaCoverage,
        metrics: &[MetricKind::MediaCoverage],
        include_national: false,
    },
    CheckSpec {
        name: "campaign-activity",
        source_label: "activity_monitor",
        alert_kind: AlertKind::CampaignActivity,
        metrics: &[MetricKind::CampaignActivity],
        include_national: false,
    },
    CheckSpec {
        name: "social-sentiment",
        source_label: "sentiment_monitor",
        alert_kind: AlertKind::SocialSentiment,
        metrics: &[MetricKind::SocialSentiment],
        include_national: false,
    },
];

/// Everything a check needs, borrowed from the monitor
pub struct CheckContext<'a> {
    pub source: &'a dyn MetricSource,
    pub bus: &'a AlertBus,
    pub thresholds: &'a AlertThresholds,
    pub observations: &'a ObservationLog,
    pub watch_list: &'a WatchList,
}

/// Result of one check over all its targets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check: String,
    /// Entity/metric pairs compared
    pub evaluated: usize,
    /// Pairs skipped because the source failed
    pub skipped: usize,
    /// Pairs seen for the first time (no previous value)
    pub first_seen: usize,
    /// Ids of alerts published
    pub alerts: Vec<String>,
}

impl CheckOutcome {
    /// Every pair was skipped
    pub fn is_failure(&self) -> bool {
        self.skipped > 0 && self.evaluated == 0 && self.first_seen == 0
    }
}

impl CheckSpec {
    /// Look up a check by name or source label
    pub fn find(name: &str) -> Option<&'static CheckSpec> {
        CHECKS
            .iter()
            .find(|c| c.name == name || c.source_label == name)
    }

    /// Entity ids this check reads, national scope first when enabled
    pub fn targets<'w>(&self, watch_list: &'w WatchList) -> Vec<&'w str> {
        let national = self.include_national.then_some(NATIONAL_SCOPE);
        national.into_iter().chain(watch_list.iter()).collect()
    }

    /// Run the check over every target
    pub async fn run(&self, ctx: &CheckContext<'_>) -> CheckOutcome {
        let mut outcome = CheckOutcome {
            check: self.name.to_string(),
            ..Default::default()
        };

        for entity in self.targets(ctx.watch_list) {
            for &kind in self.metrics {
                match self.evaluate(ctx, entity, kind).await {
                    Ok(Evaluation::FirstSeen) => outcome.first_seen += 1,
                    Ok(Evaluation::Compared(alert)) => {
                        outcome.evaluated += 1;
                        if let Some(alert) = alert {
                            outcome.alerts.push(alert.id.clone());
                            ctx.bus.publish(alert);
                        }
                    }
                    Err(e) => {
                        outcome.skipped += 1;
                        metrics::record_source_error(kind.as_str());
                        tracing::warn!(
                            check = self.name,
                            source = ctx.source.name(),
                            entity,
                            metric = %kind,
                            error = %e,
                            detail = %e.localized_desc(),
                            "Skipping reading after source error"
                        );
                    }
                }
            }
        }

        tracing::debug!(
            check = self.name,
            evaluated = outcome.evaluated,
            skipped = outcome.skipped,
            alerts = outcome.alerts.len(),
            "Check finished"
        );
        outcome
    }

    async fn evaluate(
        &self,
        ctx: &CheckContext<'_>,
        entity: &str,
        kind: MetricKind,
    ) -> SourceResult<Evaluation> {
        let current = ensure_finite(kind, ctx.source.fetch_metric(entity, kind).await?)?;

        let reported = match ctx.source.fetch_previous(entity, kind).await {
            Ok(previous) => previous.filter(|v| v.is_finite()),
            Err(e) => {
                tracing::debug!(entity, metric = %kind, error = %e, "Previous reading unavailable");
                None
            }
        };
        let logged = ctx.observations.record(entity, kind, current);

        let Some(previous) = reported.or(logged) else {
            return Ok(Evaluation::FirstSeen);
        };

        let assessment = ctx.thresholds.assess(kind, previous, current);
        let Some(severity) = assessment.severity else {
            return Ok(Evaluation::Compared(None));
        };

        let rising = current >= previous;
        let scope = if entity == NATIONAL_SCOPE { "全国" } else { entity };
        let movement = match (kind.measure(), rising) {
            (ChangeMeasure::Ratio, _) => "急増",
            (ChangeMeasure::Absolute, true) => "上昇",
            (ChangeMeasure::Absolute, false) => "低下",
        };

        let mut builder = Alert::builder(
            self.alert_kind,
            severity,
            format!("{scope}の{}が{movement}", kind.japanese_name()),
        )
        .source(self.source_label)
        .description(describe(kind, previous, current, assessment.magnitude, assessment.threshold))
        .with("metric", kind.as_str())
        .with("previous", previous)
        .with("current", current)
        .with("change", assessment.magnitude)
        .with("delta", current - previous)
        .with("threshold", assessment.threshold)
        .with("direction", if rising { "up" } else { "down" });

        if entity != NATIONAL_SCOPE {
            builder = builder.entity(entity);
        }

        Ok(Evaluation::Compared(Some(builder.build())))
    }
}

enum Evaluation {
    FirstSeen,
    Compared(Option<Alert>),
}

fn describe(kind: MetricKind, previous: f64, current: f64, magnitude: f64, threshold: f64) -> String {
    match kind.measure() {
        ChangeMeasure::Absolute => format!(
            "{}: {:.1}% → {:.1}% (変化 {:+.1}pt, 閾値 {:.1}pt)",
            kind.japanese_name(),
            previous * 100.0,
            current * 100.0,
            (current - previous) * 100.0,
            threshold * 100.0
        ),
        ChangeMeasure::Ratio => format!(
            "{}: {:.0} → {:.0} (前回比 {:.2}倍, 閾値 {:.2}倍)",
            kind.japanese_name(),
            previous,
            current,
            magnitude,
            threshold
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{AlertFilter, Severity};
    use crate::source::SourceError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Source answering from a fixed table; missing pairs are unavailable
    struct TableSource {
        current: HashMap<(String, MetricKind), f64>,
        previous: HashMap<(String, MetricKind), f64>,
    }

    impl TableSource {
        fn new() -> Self {
            Self {
                current: HashMap::new(),
                previous: HashMap::new(),
            }
        }

        fn reading(mut self, entity: &str, kind: MetricKind, previous: f64, current: f64) -> Self {
            self.previous.insert((entity.to_string(), kind), previous);
            self.current.insert((entity.to_string(), kind), current);
            self
        }
    }

    #[async_trait]
    impl MetricSource for TableSource {
        async fn fetch_metric(&self, entity_id: &str, kind: MetricKind) -> SourceResult<f64> {
            self.current
                .get(&(entity_id.to_string(), kind))
                .copied()
                .ok_or_else(|| SourceError::Unavailable(format!("{entity_id}/{kind}")))
        }

        async fn fetch_previous(&self, entity_id: &str, kind: MetricKind) -> SourceResult<Option<f64>> {
            Ok(self.previous.get(&(entity_id.to_string(), kind)).copied())
        }
    }

    struct Fixture {
        bus: AlertBus,
        thresholds: AlertThresholds,
        observations: ObservationLog,
        watch_list: WatchList,
    }

    impl Fixture {
        fn new(entities: &[&str]) -> Self {
            Self {
                bus: AlertBus::new(100),
                thresholds: AlertThresholds::default(),
                observations: ObservationLog::new(10),
                watch_list: WatchList::new(entities.iter().copied()),
            }
        }

        fn ctx<'a>(&'a self, source: &'a dyn MetricSource) -> CheckContext<'a> {
            CheckContext {
                source,
                bus: &self.bus,
                thresholds: &self.thresholds,
                observations: &self.observations,
                watch_list: &self.watch_list,
            }
        }
    }

    #[test]
    fn test_check_order_and_labels() {
        let names: Vec<_> = CHECKS.iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec![
                "support-rate",
                "poll-release",
                "media-coverage",
                "campaign-activity",
                "social-sentiment"
            ]
        );
        assert_eq!(CheckSpec::find("poll_monitor").map(|c| c.name), Some("poll-release"));
    }

    #[test]
    fn test_targets_include_national_first() {
        let watch_list = WatchList::new(["13001", "27001"]);
        let poll = CheckSpec::find("poll-release").unwrap();
        assert_eq!(poll.targets(&watch_list), vec!["national", "13001", "27001"]);

        let support = CheckSpec::find("support-rate").unwrap();
        assert_eq!(support.targets(&watch_list), vec!["13001", "27001"]);
    }

    #[tokio::test]
    async fn test_support_change_publishes_medium_alert() {
        let fixture = Fixture::new(&["13001"]);
        let source = TableSource::new()
            .reading("13001", MetricKind::SupportRate, 0.40, 0.45)
            .reading("13001", MetricKind::RecognitionRate, 0.60, 0.61);

        let outcome = CHECKS[0].run(&fixture.ctx(&source)).await;
        assert_eq!(outcome.evaluated, 2);
        assert_eq!(outcome.alerts.len(), 1);

        let alerts = fixture.bus.snapshot(&AlertFilter::default());
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.kind, AlertKind::SupportChange);
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.source, "support_monitor");
        assert_eq!(alert.entity_ref.as_deref(), Some("13001"));
        assert_eq!(alert.payload_f64("previous"), Some(0.40));
        assert_eq!(alert.payload_f64("current"), Some(0.45));
        assert_eq!(alert.payload_str("direction"), Some("up"));
        assert_eq!(alert.payload_str("metric"), Some("support_rate"));
    }

    #[tokio::test]
    async fn test_national_poll_alert_has_no_entity() {
        let fixture = Fixture::new(&[]);
        let source = TableSource::new().reading(NATIONAL_SCOPE, MetricKind::PollMargin, 0.10, 0.01);

        let outcome = CheckSpec::find("poll-release")
            .unwrap()
            .run(&fixture.ctx(&source))
            .await;
        assert_eq!(outcome.alerts.len(), 1);

        let alert = &fixture.bus.snapshot(&AlertFilter::default())[0];
        assert_eq!(alert.kind, AlertKind::PollRelease);
        assert_eq!(alert.severity, Severity::High);
        assert!(alert.entity_ref.is_none());
        assert_eq!(alert.payload_str("direction"), Some("down"));
    }

    #[tokio::test]
    async fn test_source_error_skips_entity_only() {
        let fixture = Fixture::new(&["13001", "13025"]);
        let source = TableSource::new().reading("13025", MetricKind::SocialSentiment, 0.0, 0.4);

        let outcome = CheckSpec::find("social-sentiment")
            .unwrap()
            .run(&fixture.ctx(&source))
            .await;
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.evaluated, 1);
        assert_eq!(outcome.alerts.len(), 1);
        assert!(!outcome.is_failure());
    }

    #[tokio::test]
    async fn test_all_targets_failing_is_failure() {
        let fixture = Fixture::new(&["13001"]);
        let source = TableSource::new();

        let outcome = CHECKS[2].run(&fixture.ctx(&source)).await;
        assert!(outcome.is_failure());
        assert!(fixture.bus.is_empty());
    }

    /// Source with no notion of a previous reading
    struct Sequence(parking_lot::Mutex<Vec<f64>>);

    #[async_trait]
    impl MetricSource for Sequence {
        async fn fetch_metric(&self, _entity_id: &str, _kind: MetricKind) -> SourceResult<f64> {
            let mut values = self.0.lock();
            if values.is_empty() {
                Err(SourceError::Timeout)
            } else {
                Ok(values.remove(0))
            }
        }
    }

    #[tokio::test]
    async fn test_observation_log_supplies_previous() {
        let fixture = Fixture::new(&["40001"]);
        let source = Sequence(parking_lot::Mutex::new(vec![10.0, 35.0]));
        let media = CheckSpec::find("media-coverage").unwrap();

        let first = media.run(&fixture.ctx(&source)).await;
        assert_eq!(first.first_seen, 1);
        assert!(first.alerts.is_empty());

        // 35 / 10 = 3.5x against a 2.0x spike threshold
        let second = media.run(&fixture.ctx(&source)).await;
        assert_eq!(second.alerts.len(), 1);
        let alert = &fixture.bus.snapshot(&AlertFilter::default())[0];
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.payload_f64("previous"), Some(10.0));
        assert!((alert.payload_f64("change").unwrap() - 3.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_non_finite_reading_is_skipped() {
        let fixture = Fixture::new(&["13001"]);
        let source = TableSource::new().reading("13001", MetricKind::CampaignActivity, 1.0, f64::NAN);

        let outcome = CheckSpec::find("campaign-activity")
            .unwrap()
            .run(&fixture.ctx(&source))
            .await;
        assert_eq!(outcome.skipped, 1);
        assert!(fixture.bus.is_empty());
    }
}
