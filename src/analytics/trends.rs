//! Time-series trend analysis and z-score anomaly detection
//!
//! This module provides functionality for:
//! - Fitting an ordinary least-squares slope to a sample series
//! - Classifying trend direction with per-metric slope thresholds
//! - Measuring volatility as the population variance
//! - Flagging anomalous samples by z-score
//! - Summarising a current/previous pair as a [`TrendMetric`]

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use thiserror::Error;

use crate::models::MetricKind;

/// Minimum number of samples before anomaly detection has any power
pub const MIN_ANOMALY_SAMPLES: usize = 5;

/// Deadband applied to `change_rate` when classifying a [`TrendMetric`]
pub const CHANGE_RATE_DEADBAND: f64 = 0.01;

/// Tolerance used when comparing a z-score with its threshold
const Z_TOLERANCE: f64 = 1e-9;

/// Errors that can occur during trend analysis
#[derive(Debug, Error)]
pub enum TrendError {
    #[error("Insufficient data points: need at least {0}, got {1}")]
    InsufficientData(usize, usize),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(f64),

    #[error("Non-finite sample at position {0}")]
    NonFiniteSample(usize),
}

/// Result type for trend analysis operations
pub type TrendResult<T> = Result<T, TrendError>;

/// Trend direction indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Increasing beyond the threshold
    Rising,

    /// No significant change
    Stable,

    /// Decreasing beyond the threshold
    Falling,

    /// Fewer than two samples
    InsufficientData,
}

impl TrendDirection {
    /// Classify a value against a symmetric threshold
    ///
    /// # Classification
    /// - `value > threshold`: Rising
    /// - `value < -threshold`: Falling
    /// - otherwise: Stable
    #[must_use]
    pub fn classify(value: f64, threshold: f64) -> Self {
        if value > threshold {
            Self::Rising
        } else if value < -threshold {
            Self::Falling
        } else {
            Self::Stable
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Stable => "stable",
            Self::Falling => "falling",
            Self::InsufficientData => "insufficient_data",
        }
    }

    /// Whether this direction indicates movement
    pub fn is_moving(&self) -> bool {
        matches!(self, Self::Rising | Self::Falling)
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of [`TrendAnalyzer::analyze`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    /// OLS slope of value against index
    pub slope: f64,

    /// Classified direction
    pub direction: TrendDirection,

    /// Population variance of the values
    pub volatility: f64,

    /// Arithmetic mean of the values
    pub mean: f64,

    /// Number of samples analysed
    pub samples: usize,
}

impl TrendAnalysis {
    fn insufficient(samples: usize, mean: f64) -> Self {
        Self {
            slope: 0.0,
            direction: TrendDirection::InsufficientData,
            volatility: 0.0,
            mean,
            samples,
        }
    }
}

/// Current-versus-previous summary of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendMetric {
    pub metric_name: String,
    pub current_value: f64,
    pub previous_value: f64,

    /// `(current - previous) / previous`, or 0 when previous is 0
    pub change_rate: f64,

    /// Direction of `change_rate` against a ±1% deadband
    pub direction: TrendDirection,

    /// Heuristic confidence (0.0 - 1.0)
    pub confidence: f64,

    /// Description of the sample span, e.g. "7samples"
    pub window: String,
}

impl TrendMetric {
    /// Build a trend metric from two readings
    #[must_use]
    pub fn compute(
        metric_name: impl Into<String>,
        current_value: f64,
        previous_value: f64,
        confidence: f64,
        window: impl Into<String>,
    ) -> Self {
        let change_rate = if previous_value == 0.0 {
            0.0
        } else {
            (current_value - previous_value) / previous_value
        };

        Self {
            metric_name: metric_name.into(),
            current_value,
            previous_value,
            change_rate,
            direction: TrendDirection::classify(change_rate, CHANGE_RATE_DEADBAND),
            confidence: confidence.clamp(0.0, 1.0),
            window: window.into(),
        }
    }

    /// Build a trend metric spanning a sample series (first vs. last sample)
    ///
    /// Confidence is the metric's base confidence scaled by how much of the
    /// requested window the series actually covers.
    #[must_use]
    pub fn from_series(kind: MetricKind, values: &[f64], requested: usize) -> Option<Self> {
        let (first, last) = match values {
            [] | [_] => return None,
            [first, .., last] => (*first, *last),
        };

        let coverage = if requested == 0 {
            1.0
        } else {
            (values.len() as f64 / requested as f64).min(1.0)
        };

        Some(Self::compute(
            kind.as_str(),
            last,
            first,
            kind.base_confidence() * coverage,
            format!("{}samples", values.len()),
        ))
    }
}

/// Trend analyzer with per-metric slope thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAnalyzer {
    /// Slope threshold per metric kind
    slope_thresholds: HashMap<MetricKind, f64>,

    /// Fallback slope threshold
    default_slope_threshold: f64,

    /// z-score at or beyond which a sample is anomalous
    z_threshold: f64,
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(default_slope_thresholds(), 0.02, 2.0)
    }
}

/// Default slope thresholds: 0.02 for rates and scores, 1.0 for volumes
pub fn default_slope_thresholds() -> HashMap<MetricKind, f64> {
    MetricKind::all()
        .into_iter()
        .map(|kind| {
            let threshold = match kind {
                MetricKind::MediaCoverage | MetricKind::CampaignActivity => 1.0,
                _ => 0.02,
            };
            (kind, threshold)
        })
        .collect()
}

impl TrendAnalyzer {
    /// Create a new trend analyzer
    ///
    /// # Arguments
    /// * `slope_thresholds` - Per-metric slope thresholds
    /// * `default_slope_threshold` - Threshold for metrics missing from the map
    /// * `z_threshold` - Default z-score cutoff for anomaly detection
    #[must_use]
    pub fn new(
        slope_thresholds: HashMap<MetricKind, f64>,
        default_slope_threshold: f64,
        z_threshold: f64,
    ) -> Self {
        Self {
            slope_thresholds,
            default_slope_threshold,
            z_threshold,
        }
    }

    /// Slope threshold used for a metric kind
    #[must_use]
    pub fn slope_threshold(&self, kind: MetricKind) -> f64 {
        self.slope_thresholds
            .get(&kind)
            .copied()
            .unwrap_or(self.default_slope_threshold)
    }

    /// Configured z-score cutoff
    #[must_use]
    pub fn z_threshold(&self) -> f64 {
        self.z_threshold
    }

    /// Analyze `(index, value)` samples for a metric kind
    #[must_use]
    pub fn analyze(&self, kind: MetricKind, samples: &[(f64, f64)]) -> TrendAnalysis {
        analyze_with_threshold(samples, self.slope_threshold(kind))
    }

    /// Analyze a plain value series, using positions as the index
    #[must_use]
    pub fn analyze_values(&self, kind: MetricKind, values: &[f64]) -> TrendAnalysis {
        let samples = indexed(values);
        self.analyze(kind, &samples)
    }

    /// Detect anomalies with the configured z-score cutoff
    #[must_use]
    pub fn detect_anomalies(&self, values: &[f64]) -> Vec<usize> {
        detect_anomalies(values, self.z_threshold)
    }
}

/// Pair each value with its position
pub fn indexed(values: &[f64]) -> Vec<(f64, f64)> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64, *v))
        .collect()
}

/// Analyze samples against an explicit slope threshold
///
/// Fewer than two samples yields [`TrendDirection::InsufficientData`] with a
/// zero slope.
#[must_use]
pub fn analyze_with_threshold(samples: &[(f64, f64)], slope_threshold: f64) -> TrendAnalysis {
    let values: Vec<f64> = samples.iter().map(|(_, y)| *y).collect();

    if samples.len() < 2 {
        let mean = values.first().copied().unwrap_or(0.0);
        return TrendAnalysis::insufficient(samples.len(), mean);
    }

    let slope = least_squares_slope(samples);
    let mean = values.iter().mean();
    let volatility = values.iter().population_variance();

    TrendAnalysis {
        slope,
        direction: TrendDirection::classify(slope, slope_threshold),
        volatility,
        mean,
        samples: samples.len(),
    }
}

/// Ordinary least-squares slope of y against x
///
/// Returns 0 when every x is identical.
#[must_use]
pub fn least_squares_slope(points: &[(f64, f64)]) -> f64 {
    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|(x, _)| x).sum();
    let sum_y: f64 = points.iter().map(|(_, y)| y).sum();
    let sum_xy: f64 = points.iter().map(|(x, y)| x * y).sum();
    let sum_x2: f64 = points.iter().map(|(x, _)| x * x).sum();

    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }

    (n * sum_xy - sum_x * sum_y) / denominator
}

/// Flag samples whose z-score reaches `z_threshold`
///
/// Uses the population standard deviation floored at `f64::EPSILON`. With
/// fewer than [`MIN_ANOMALY_SAMPLES`] samples nothing is flagged.
#[must_use]
pub fn detect_anomalies(values: &[f64], z_threshold: f64) -> Vec<usize> {
    if values.len() < MIN_ANOMALY_SAMPLES {
        return Vec::new();
    }

    z_scores(values)
        .into_iter()
        .enumerate()
        .filter(|(_, z)| z.abs() + Z_TOLERANCE >= z_threshold)
        .map(|(i, _)| i)
        .collect()
}

/// z-score of every value against the series mean and population stddev
#[must_use]
pub fn z_scores(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    let mean = values.iter().mean();
    let std_dev = values.iter().population_std_dev().max(f64::EPSILON);

    values.iter().map(|v| (v - mean) / std_dev).collect()
}

/// Accept only finite, positive thresholds
pub fn validate_threshold(value: f64) -> TrendResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(TrendError::InvalidThreshold(value))
    }
}

/// Reject series containing NaN or infinite values
pub fn validate_samples(values: &[f64]) -> TrendResult<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(pos) => Err(TrendError::NonFiniteSample(pos)),
        None => Ok(()),
    }
}
