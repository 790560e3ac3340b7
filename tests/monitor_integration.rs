//! Integration tests for the monitor system
//!
//! These tests drive the public API end to end:
//! - Scheduler lifecycle and loop resilience
//! - Alert bus ordering, filtering and windows
//! - Check routines against a scripted source
//! - Daily report assembly

mod common;

use common::{alert_hours_ago, test_config, ScriptedSource};
use proptest::prelude::*;
use seikyoku::analytics::{TrendAnalyzer, TrendDirection};
use seikyoku::models::{MetricKind, NATIONAL_SCOPE};
use seikyoku::monitor::{MonitorInterval, MonitorScheduler};
use seikyoku::notifications::{
    Alert, AlertBus, AlertFilter, AlertKind, AlertSubscriber, Severity, SubscriberError,
    SubscriberResult,
};
use seikyoku::report::ReportSection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Poll `condition` every 10ms until it holds or `limit` elapses
async fn wait_until<F: Fn() -> bool>(limit: Duration, condition: F) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

struct Failing;

impl AlertSubscriber for Failing {
    fn on_alert(&self, _alert: &Alert) -> SubscriberResult {
        Err(SubscriberError::Rejected("downstream closed".into()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_start_stop_idempotent() {
    let scheduler = MonitorScheduler::new(test_config(&["13001"]), Arc::new(ScriptedSource::new()));

    assert!(scheduler.start(MonitorInterval::RealTime));
    assert!(!scheduler.start(MonitorInterval::Daily));
    assert!(scheduler.is_running());
    assert_eq!(scheduler.status().interval.as_deref(), Some("real_time"));
    assert_eq!(scheduler.status().source, "scripted");

    scheduler.stop().await;
    assert!(!scheduler.is_running());
    scheduler.stop().await;
    assert!(!scheduler.is_running());

    // Restart after a stop is allowed
    assert!(scheduler.start_named("hourly-ish"));
    assert_eq!(scheduler.status().interval.as_deref(), Some("frequent"));
    scheduler.stop().await;
}

#[tokio::test]
async fn test_first_tick_runs_immediately() {
    let source = Arc::new(ScriptedSource::new().values("13001", MetricKind::SupportRate, &[0.4]));
    let scheduler = MonitorScheduler::new(test_config(&["13001"]), source.clone());

    assert!(scheduler.start(MonitorInterval::Daily));
    let ticked = wait_until(Duration::from_secs(2), || scheduler.status().ticks >= 1).await;
    scheduler.stop().await;

    assert!(ticked, "first tick should not wait a full day");
    assert!(source.calls() > 0);
}

#[tokio::test]
async fn test_stop_bounded_by_timeout() {
    let source = ScriptedSource::new()
        .values("13001", MetricKind::SupportRate, &[0.4])
        .with_delay(Duration::from_millis(400));
    let mut config = test_config(&["13001"]);
    config.monitor.stop_timeout_ms = 100;
    let scheduler = MonitorScheduler::new(config, Arc::new(source));

    assert!(scheduler.start_every(Duration::from_millis(10)));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    scheduler.stop().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_restart_refused_while_worker_drains() {
    let source = Arc::new(
        ScriptedSource::new()
            .values("13001", MetricKind::SupportRate, &[0.4])
            .with_delay(Duration::from_millis(300)),
    );
    let mut config = test_config(&["13001"]);
    config.monitor.stop_timeout_ms = 50;
    let scheduler = MonitorScheduler::new(config, source.clone());

    assert!(scheduler.start_every(Duration::from_millis(10)));
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The worker is mid-fetch and outlives the stop timeout
    scheduler.stop().await;
    assert!(!scheduler.is_running());
    assert!(scheduler.status().draining);
    assert!(!scheduler.start_every(Duration::from_millis(10)));
    assert!(!scheduler.start(MonitorInterval::RealTime));

    let drained = wait_until(Duration::from_secs(10), || !scheduler.status().draining).await;
    assert!(drained, "old worker should finish its tick and exit");

    assert!(scheduler.start_every(Duration::from_millis(10)));
    tokio::time::sleep(Duration::from_millis(400)).await;
    scheduler.stop().await;

    assert_eq!(source.max_in_flight(), 1);
}

#[tokio::test]
async fn test_loop_survives_panicking_checks() {
    let source = ScriptedSource::new()
        .panicking("13001", MetricKind::SupportRate)
        .panicking(NATIONAL_SCOPE, MetricKind::PollMargin)
        .failing("13001", MetricKind::MediaCoverage);
    let scheduler = MonitorScheduler::new(test_config(&["13001"]), Arc::new(source));

    assert!(scheduler.start_every(Duration::from_millis(20)));
    let ticked = wait_until(Duration::from_secs(3), || scheduler.status().ticks >= 3).await;
    assert!(scheduler.is_running());
    scheduler.stop().await;

    assert!(ticked, "loop should keep ticking past check panics");
}

// ============================================================================
// Check Tests
// ============================================================================

#[tokio::test]
async fn test_support_change_publishes_medium_alert() {
    let source = ScriptedSource::new().values("13001", MetricKind::SupportRate, &[0.40, 0.45]);
    let scheduler = MonitorScheduler::new(test_config(&["13001"]), Arc::new(source));

    let first = scheduler.run_once().await;
    assert_eq!(first.alerts_published(), 0);

    let second = scheduler.run_once().await;
    assert_eq!(second.alerts_published(), 1);

    let alerts = scheduler.get_current_alerts(None, 24);
    assert_eq!(alerts.len(), 1);

    let alert = &alerts[0];
    assert_eq!(alert.kind, AlertKind::SupportChange);
    assert_eq!(alert.severity, Severity::Medium);
    assert_eq!(alert.entity_ref.as_deref(), Some("13001"));
    assert_eq!(alert.source, "support_monitor");
    assert!((alert.payload_f64("previous").unwrap() - 0.40).abs() < 1e-12);
    assert!((alert.payload_f64("current").unwrap() - 0.45).abs() < 1e-12);
    assert_eq!(alert.payload_str("direction"), Some("up"));
}

#[tokio::test]
async fn test_large_poll_move_is_high_and_national() {
    let source = ScriptedSource::new().values(NATIONAL_SCOPE, MetricKind::PollMargin, &[0.10, 0.00]);
    let scheduler = MonitorScheduler::new(test_config(&[]), Arc::new(source));

    scheduler.run_once().await;
    scheduler.run_once().await;

    let alerts = scheduler.get_current_alerts(Some(Severity::High), 24);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::PollRelease);
    assert!(alerts[0].entity_ref.is_none());
    assert_eq!(alerts[0].payload_str("direction"), Some("down"));
}

#[tokio::test]
async fn test_source_failures_skip_pairs_only() {
    let source = ScriptedSource::new()
        .failing("13001", MetricKind::SupportRate)
        .values("13025", MetricKind::SupportRate, &[0.30, 0.40]);
    let scheduler = MonitorScheduler::new(test_config(&["13001", "13025"]), Arc::new(source));

    scheduler.run_once().await;
    let summary = scheduler.run_once().await;

    let support = summary
        .checks
        .iter()
        .find(|c| c.check == "support-rate")
        .unwrap();
    assert_eq!(support.evaluated, 1);
    assert!(support.skipped >= 1);
    assert!(!summary.failed_checks.contains(&"support-rate".to_string()));

    let alerts = scheduler.get_current_alerts(None, 24);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].entity_ref.as_deref(), Some("13025"));
}

// ============================================================================
// Subscriber Isolation Tests
// ============================================================================

#[tokio::test]
async fn test_panicking_callback_does_not_block_next() {
    let source = ScriptedSource::new().values("13001", MetricKind::SupportRate, &[0.40, 0.50]);
    let scheduler = MonitorScheduler::new(test_config(&["13001"]), Arc::new(source));

    let delivered = Arc::new(AtomicUsize::new(0));
    scheduler.register_callback(|_alert| panic!("subscriber exploded"));
    scheduler.register_subscriber(Arc::new(Failing));
    let counter = delivered.clone();
    scheduler.register_callback(move |_alert| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    scheduler.run_once().await;
    scheduler.run_once().await;

    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.get_current_alerts(None, 24).len(), 1);
}

#[tokio::test]
async fn test_panicking_callback_inside_loop() {
    let source = ScriptedSource::new().values("13001", MetricKind::SupportRate, &[0.40, 0.50]);
    let scheduler = MonitorScheduler::new(test_config(&["13001"]), Arc::new(source));

    let delivered = Arc::new(AtomicUsize::new(0));
    scheduler.register_callback(|_alert| panic!("subscriber exploded"));
    let counter = delivered.clone();
    scheduler.register_callback(move |_alert| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(scheduler.start_every(Duration::from_millis(20)));
    let got = wait_until(Duration::from_secs(3), || delivered.load(Ordering::SeqCst) >= 1).await;
    let more_ticks = wait_until(Duration::from_secs(3), || scheduler.status().ticks >= 4).await;
    scheduler.stop().await;

    assert!(got);
    assert!(more_ticks, "loop should continue after a subscriber panic");
}

// ============================================================================
// Alert Query Tests
// ============================================================================

#[tokio::test]
async fn test_window_excludes_old_alerts() {
    let scheduler = MonitorScheduler::new(test_config(&[]), Arc::new(ScriptedSource::new()));
    scheduler
        .bus()
        .publish(alert_hours_ago("old", Severity::Medium, 25));

    assert!(scheduler.get_current_alerts(None, 24).is_empty());
    let wider = scheduler.get_current_alerts(None, 26);
    assert_eq!(wider.len(), 1);
    assert_eq!(wider[0].id, "old");
}

#[tokio::test]
async fn test_severity_filter() {
    let scheduler = MonitorScheduler::new(test_config(&[]), Arc::new(ScriptedSource::new()));
    let bus = scheduler.bus();
    bus.publish(alert_hours_ago("a", Severity::Low, 1));
    bus.publish(alert_hours_ago("b", Severity::High, 2));
    bus.publish(alert_hours_ago("c", Severity::High, 3));
    bus.publish(alert_hours_ago("d", Severity::Medium, 4));

    let high = scheduler.get_current_alerts(Some(Severity::High), 24);
    let ids: Vec<_> = high.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);

    assert_eq!(scheduler.get_current_alerts(None, 24).len(), 4);
    // Reads are non-destructive
    assert_eq!(bus.len(), 4);
}

#[tokio::test]
async fn test_oversized_and_negative_windows() {
    let scheduler = MonitorScheduler::new(test_config(&[]), Arc::new(ScriptedSource::new()));
    let bus = scheduler.bus();
    bus.publish(alert_hours_ago("recent", Severity::High, 1));
    bus.publish(alert_hours_ago("decade", Severity::Medium, 24 * 365 * 10));

    assert_eq!(scheduler.get_current_alerts(None, i64::MAX).len(), 2);
    assert_eq!(scheduler.get_current_alerts(None, 10_000_000_000).len(), 2);
    assert_eq!(
        scheduler.get_current_alerts(Some(Severity::High), i64::MAX).len(),
        1
    );
    assert!(scheduler.get_current_alerts(None, -24).is_empty());
    assert!(scheduler.get_current_alerts(None, i64::MIN).is_empty());
}

#[tokio::test]
async fn test_huge_retention_prunes_nothing() {
    let mut config = test_config(&[]);
    config.monitor.alert_retention_hours = i64::MAX;
    let scheduler = MonitorScheduler::new(config, Arc::new(ScriptedSource::new()));
    scheduler
        .bus()
        .publish(alert_hours_ago("old", Severity::Low, 24 * 365));

    let summary = scheduler.run_once().await;
    assert_eq!(summary.pruned, 0);
    assert!(scheduler.bus().contains("old"));
}

proptest! {
    #[test]
    fn prop_snapshot_is_newest_first(offsets in prop::collection::vec(0i64..(23 * 60), 1..40)) {
        let bus = AlertBus::new(100);
        for (i, minutes) in offsets.iter().enumerate() {
            let alert = Alert::builder(AlertKind::MediaCoverage, Severity::Medium, "spike")
                .id(format!("a{i}"))
                .created_at(chrono::Utc::now() - chrono::Duration::minutes(*minutes))
                .build();
            bus.publish(alert);
        }

        let alerts = bus.snapshot(&AlertFilter::last_hours(24));
        prop_assert_eq!(alerts.len(), offsets.len());
        for pair in alerts.windows(2) {
            prop_assert!(pair[0].created_at >= pair[1].created_at);
        }
    }

    #[test]
    fn prop_severity_filter_is_exact(levels in prop::collection::vec(0usize..3, 0..30)) {
        let bus = AlertBus::new(100);
        for (i, level) in levels.iter().enumerate() {
            let severity = Severity::all()[*level];
            bus.publish(
                Alert::builder(AlertKind::SocialSentiment, severity, "shift")
                    .id(format!("s{i}"))
                    .build(),
            );
        }

        for severity in Severity::all() {
            let filtered = bus.snapshot(&AlertFilter::default().with_severity(severity));
            prop_assert!(filtered.iter().all(|a| a.severity == severity));
            let expected = levels.iter().filter(|l| Severity::all()[**l] == severity).count();
            prop_assert_eq!(filtered.len(), expected);
        }
    }
}

// ============================================================================
// Self-Test and Report Tests
// ============================================================================

#[tokio::test]
async fn test_system_publishes_test_alert() {
    let scheduler = MonitorScheduler::new(test_config(&[]), Arc::new(ScriptedSource::new()));
    assert!(scheduler.test_system());

    let alerts = scheduler.get_current_alerts(Some(Severity::Low), 1);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Test);
    assert_eq!(alerts[0].entity_ref.as_deref(), Some("TEST001"));
    assert_eq!(alerts[0].source, "test");
}

#[tokio::test]
async fn test_report_on_empty_engine() {
    let scheduler = MonitorScheduler::new(test_config(&[]), Arc::new(ScriptedSource::new()));
    let report = scheduler.generate_daily_report().await;

    let summary = report.overall_summary.as_ok().unwrap();
    assert_eq!(summary.monitoring_status, "inactive");
    assert_eq!(summary.watched_entities, 0);
    assert_eq!(summary.window_alerts.total(), 0);
    assert!(report.entity_trends.is_empty());
    assert!(report.recent_alerts.as_ok().unwrap().is_empty());
    assert!(report.key_developments.as_ok().unwrap().is_empty());

    let json = serde_json::to_value(&report).unwrap();
    assert!(json.get("overall_summary").is_some());
}

#[tokio::test]
async fn test_report_uses_observed_history() {
    let source = ScriptedSource::new().values(
        "13001",
        MetricKind::SupportRate,
        &[0.30, 0.36, 0.42, 0.48, 0.54, 0.60],
    );
    let scheduler = MonitorScheduler::new(test_config(&["13001"]), Arc::new(source));
    for _ in 0..6 {
        scheduler.run_once().await;
    }

    let report = scheduler.generate_daily_report().await;
    let trend = match &report.entity_trends["13001"] {
        ReportSection::Ok(trend) => trend,
        ReportSection::Failed { error } => panic!("entity trend failed: {error}"),
    };

    let support = &trend.metrics[&MetricKind::SupportRate];
    assert_eq!(support.samples.len(), 6);
    assert_eq!(support.analysis.direction, TrendDirection::Rising);

    let developments = report.key_developments.as_ok().unwrap();
    assert!(developments
        .iter()
        .any(|d| d.entities == vec!["13001".to_string()] && d.headline.contains("上昇傾向")));
}

#[tokio::test]
async fn test_analyze_entity_trends_on_demand() {
    let source = ScriptedSource::new().values(
        "27001",
        MetricKind::SupportRate,
        &[0.50, 0.45, 0.40, 0.35, 0.30],
    );
    let scheduler = MonitorScheduler::new(test_config(&["27001"]), Arc::new(source));
    for _ in 0..5 {
        scheduler.run_once().await;
    }

    let trend = scheduler.analyze_entity_trends("27001", 7).await.unwrap();
    let support = &trend.metrics[&MetricKind::SupportRate];
    assert_eq!(support.samples.len(), 5);
    assert_eq!(support.analysis.direction, TrendDirection::Falling);

    let narrow = scheduler.analyze_entity_trends("27001", 2).await.unwrap();
    assert_eq!(narrow.metrics[&MetricKind::SupportRate].samples, vec![0.35, 0.30]);

    // Entities never observed still get a per-metric breakdown
    let unknown = scheduler.analyze_entity_trends("99999", 7).await.unwrap();
    assert!(unknown.metrics.values().all(|m| m.samples.is_empty()));

    assert!(scheduler.analyze_entity_trends("27001", 0).await.is_err());
}

// ============================================================================
// Trend Properties
// ============================================================================

#[test]
fn test_spike_flagged_as_anomaly() {
    let analyzer = TrendAnalyzer::default();
    assert_eq!(analyzer.detect_anomalies(&[10.0, 10.0, 10.0, 10.0, 100.0]), vec![4]);
    assert!(analyzer
        .detect_anomalies(&[10.0, 11.0, 9.0, 10.0, 10.0])
        .is_empty());
}

#[test]
fn test_short_series_is_insufficient() {
    let analyzer = TrendAnalyzer::default();
    let result = analyzer.analyze_values(MetricKind::SupportRate, &[0.4]);
    assert_eq!(result.direction, TrendDirection::InsufficientData);
}
