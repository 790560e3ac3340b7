//! Alert threshold policy
//!
//! Maps each metric kind to the minimum change magnitude that is worth an
//! alert, and classifies magnitudes into severities. The defaults are
//! hand-tuned and meant to be overridden through configuration.

use serde::{Deserialize, Serialize};

use super::Severity;
use crate::models::{ChangeMeasure, MetricKind};

/// Minimum change magnitude per metric kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Absolute support-rate move (0.03 = 3 points)
    pub support_rate_change: f64,
    /// Absolute recognition-rate move
    pub recognition_change: f64,
    /// Absolute move of the leading poll margin
    pub poll_margin_change: f64,
    /// Coverage ratio against the previous reading (2.0 = doubled)
    pub media_coverage_spike: f64,
    /// Activity ratio against the previous reading
    pub campaign_activity_spike: f64,
    /// Absolute sentiment move
    pub social_sentiment_change: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            support_rate_change: 0.03,
            recognition_change: 0.05,
            poll_margin_change: 0.04,
            media_coverage_spike: 2.0,
            campaign_activity_spike: 1.5,
            social_sentiment_change: 0.15,
        }
    }
}

/// Outcome of comparing two readings against the policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeAssessment {
    /// Measured magnitude (absolute delta or ratio)
    pub magnitude: f64,
    /// Threshold it was compared against
    pub threshold: f64,
    /// `None` when the magnitude is below the threshold
    pub severity: Option<Severity>,
}

impl AlertThresholds {
    /// Threshold configured for a metric kind
    pub fn threshold_for(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::SupportRate => self.support_rate_change,
            MetricKind::RecognitionRate => self.recognition_change,
            MetricKind::PollMargin => self.poll_margin_change,
            MetricKind::MediaCoverage => self.media_coverage_spike,
            MetricKind::CampaignActivity => self.campaign_activity_spike,
            MetricKind::SocialSentiment => self.social_sentiment_change,
        }
    }

    /// Classify a magnitude against a threshold
    ///
    /// `High` at twice the threshold or more, `Medium` at the threshold or
    /// more, otherwise no alert.
    pub fn classify(magnitude: f64, threshold: f64) -> Option<Severity> {
        // Small tolerance so 0.45 - 0.40 still counts as a 0.05 move
        const EPS: f64 = 1e-9;
        if magnitude + EPS >= 2.0 * threshold {
            Some(Severity::High)
        } else if magnitude + EPS >= threshold {
            Some(Severity::Medium)
        } else {
            None
        }
    }

    /// Measure the change between two readings of a metric
    pub fn magnitude(kind: MetricKind, previous: f64, current: f64) -> f64 {
        match kind.measure() {
            ChangeMeasure::Absolute => (current - previous).abs(),
            ChangeMeasure::Ratio => current / previous.max(1.0),
        }
    }

    /// Assess a pair of readings
    pub fn assess(&self, kind: MetricKind, previous: f64, current: f64) -> ChangeAssessment {
        let magnitude = Self::magnitude(kind, previous, current);
        let threshold = self.threshold_for(kind);
        ChangeAssessment {
            magnitude,
            threshold,
            severity: Self::classify(magnitude, threshold),
        }
    }

    /// Validate that every threshold is a positive finite number
    pub fn validate(&self) -> Result<(), String> {
        for kind in MetricKind::all() {
            let value = self.threshold_for(kind);
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("threshold for {kind} must be positive, got {value}"));
            }
        }
        Ok(())
    }
}
