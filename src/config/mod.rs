//! Configuration management for the election monitor
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Every section has defaults, so a file only
//! needs to name the values it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::analytics::trends::validate_threshold;
use crate::analytics::TrendAnalyzer;
use crate::models::{ChangeMeasure, MetricKind, WatchList};
use crate::monitor::interval::{IntervalTable, MonitorInterval};
use crate::notifications::AlertThresholds;
use crate::report::Development;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Monitor loop configuration
    pub monitor: MonitorConfig,

    /// Alert thresholds per metric kind
    pub thresholds: AlertThresholds,

    /// Trend and anomaly analysis parameters
    pub analysis: AnalysisConfig,

    /// Entities that receive per-entity checks and report sections
    pub watch_list: WatchList,

    /// Daily report configuration
    pub report: ReportConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Monitor loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval used when none is given to `start`
    pub default_interval: MonitorInterval,

    /// Seconds per named interval
    pub intervals: IntervalTable,

    /// Sleep after a failed tick before the loop retries
    pub recovery_delay_secs: u64,

    /// How long `stop` waits for the worker to exit
    pub stop_timeout_ms: u64,

    /// Maximum alerts held by the alert bus
    pub alert_capacity: usize,

    /// Alerts older than this are pruned after each tick
    pub alert_retention_hours: i64,

    /// Readings remembered per entity/metric by the observation log
    pub history_len: usize,
}

/// Trend and anomaly analysis parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Slope threshold for rates and scores
    pub rate_slope_threshold: f64,

    /// Slope threshold for coverage and activity volumes
    pub volume_slope_threshold: f64,

    /// z-score at or beyond which a sample is anomalous
    pub z_threshold: f64,
}

/// Daily report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Samples per entity/metric used for trend sections
    pub trend_samples: usize,

    /// Window of recent alerts included in the report
    pub alert_window_hours: i64,

    /// Static narratives always listed under key developments
    pub narratives: Vec<Development>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(interval) = env_parse::<MonitorInterval>("SEIKYOKU_INTERVAL") {
            config.monitor.default_interval = interval;
        }
        if let Some(secs) = env_parse("SEIKYOKU_RECOVERY_DELAY_SECS") {
            config.monitor.recovery_delay_secs = secs;
        }
        if let Some(ms) = env_parse("SEIKYOKU_STOP_TIMEOUT_MS") {
            config.monitor.stop_timeout_ms = ms;
        }
        if let Some(capacity) = env_parse("SEIKYOKU_ALERT_CAPACITY") {
            config.monitor.alert_capacity = capacity;
        }
        if let Some(hours) = env_parse("SEIKYOKU_ALERT_RETENTION_HOURS") {
            config.monitor.alert_retention_hours = hours;
        }
        if let Some(z) = env_parse("SEIKYOKU_Z_THRESHOLD") {
            config.analysis.z_threshold = z;
        }
        if let Some(samples) = env_parse("SEIKYOKU_TREND_SAMPLES") {
            config.report.trend_samples = samples;
        }

        if let Ok(list) = std::env::var("SEIKYOKU_WATCH_LIST") {
            config.watch_list = WatchList::new(list.split(',').map(str::trim));
        }

        if let Ok(level) = std::env::var("SEIKYOKU_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("SEIKYOKU_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.monitor
            .intervals
            .validate()
            .map_err(|e| anyhow::anyhow!(e))?;

        if self.monitor.alert_capacity == 0 {
            anyhow::bail!("alert_capacity must be greater than 0");
        }

        if self.monitor.alert_retention_hours <= 0 {
            anyhow::bail!("alert_retention_hours must be positive");
        }

        if self.monitor.history_len < 2 {
            anyhow::bail!("history_len must be at least 2");
        }

        self.thresholds.validate().map_err(|e| anyhow::anyhow!(e))?;

        for (name, value) in [
            ("rate_slope_threshold", self.analysis.rate_slope_threshold),
            ("volume_slope_threshold", self.analysis.volume_slope_threshold),
            ("z_threshold", self.analysis.z_threshold),
        ] {
            validate_threshold(value).with_context(|| format!("{name} must be positive"))?;
        }

        if self.report.trend_samples < 2 {
            anyhow::bail!("trend_samples must be at least 2");
        }

        if self.watch_list.is_empty() {
            tracing::warn!("Watch list is empty; only national checks will run");
        }

        Ok(())
    }

    /// Recovery sleep after a failed tick
    #[must_use]
    pub fn recovery_delay(&self) -> Duration {
        Duration::from_secs(self.monitor.recovery_delay_secs)
    }

    /// Bounded wait used by `stop`
    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.monitor.stop_timeout_ms)
    }
}

impl AnalysisConfig {
    /// Build a trend analyzer from these parameters
    #[must_use]
    pub fn analyzer(&self) -> TrendAnalyzer {
        let thresholds: HashMap<MetricKind, f64> = MetricKind::all()
            .into_iter()
            .map(|kind| {
                let threshold = match kind.measure() {
                    ChangeMeasure::Ratio => self.volume_slope_threshold,
                    ChangeMeasure::Absolute => self.rate_slope_threshold,
                };
                (kind, threshold)
            })
            .collect();

        TrendAnalyzer::new(thresholds, self.rate_slope_threshold, self.z_threshold)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment variable");
            None
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_interval: MonitorInterval::Frequent,
            intervals: IntervalTable::default(),
            recovery_delay_secs: 60,
            stop_timeout_ms: 5000,
            alert_capacity: 1000,
            alert_retention_hours: 72,
            history_len: 48,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rate_slope_threshold: 0.02,
            volume_slope_threshold: 1.0,
            z_threshold: 2.0,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            trend_samples: 7,
            alert_window_hours: 24,
            narratives: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}
