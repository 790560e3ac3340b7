//! Alert model, alert store and subscriber fan-out
//!
//! This module turns significant metric movements into immutable [`Alert`]
//! records, keeps them in a bounded in-memory [`AlertBus`], and fans every
//! published alert out to registered subscribers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   publish    ┌──────────────────────────┐
//! │  check routine  │ ───────────▶ │        AlertBus          │
//! └─────────────────┘              │  - bounded ring buffer   │
//!                                  │  - snapshot reads        │
//!                                  │  - age-based pruning     │
//!                                  └────────────┬─────────────┘
//!                                               │ dispatch (same call)
//!                                  ┌────────────▼─────────────┐
//!                                  │   SubscriberRegistry     │
//!                                  │  - copy-on-read list     │
//!                                  │  - per-callback isolation│
//!                                  └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use seikyoku::notifications::{Alert, AlertBus, AlertKind, Severity};
//!
//! let bus = AlertBus::new(1000);
//! bus.subscribers().register_callback(|alert| println!("{}", alert.title));
//!
//! let alert = Alert::builder(AlertKind::PollRelease, Severity::Medium, "New national poll")
//!     .source("poll_monitor")
//!     .build();
//! bus.publish(alert);
//! ```

pub mod bus;
pub mod subscribers;
pub mod thresholds;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::i18n::t;

// Re-exports
pub use bus::{AlertBus, AlertFilter};
pub use subscribers::{
    AlertSubscriber, DispatchReport, SubscriberError, SubscriberRegistry, SubscriberResult,
};
pub use thresholds::AlertThresholds;

/// Opaque key → value payload attached to an alert
pub type AlertPayload = BTreeMap<String, serde_json::Value>;

/// Severity level of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational, e.g. pipeline self-tests
    Low,
    /// Change met the threshold
    Medium,
    /// Change reached twice the threshold
    High,
}

impl Severity {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Get localized label
    pub fn localized_desc(&self) -> String {
        match self {
            Self::Low => t!("severity.low").to_string(),
            Self::Medium => t!("severity.medium").to_string(),
            Self::High => t!("severity.high").to_string(),
        }
    }

    /// Get all severities from lowest to highest
    pub fn all() -> [Self; 3] {
        [Self::Low, Self::Medium, Self::High]
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// What kind of movement an alert reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SupportChange,
    PollRelease,
    MediaCoverage,
    CampaignActivity,
    SocialSentiment,
    /// Synthetic alert published by the self-test
    Test,
}

impl AlertKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SupportChange => "support_change",
            Self::PollRelease => "poll_release",
            Self::MediaCoverage => "media_coverage",
            Self::CampaignActivity => "campaign_activity",
            Self::SocialSentiment => "social_sentiment",
            Self::Test => "test",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable alert record
///
/// Alerts are assembled with [`AlertBuilder`]; once published to an
/// [`AlertBus`] consumers only ever see clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert identifier
    pub id: String,
    /// Kind of movement reported
    pub kind: AlertKind,
    /// Severity level
    pub severity: Severity,
    /// Watched entity this alert concerns, `None` for national alerts
    pub entity_ref: Option<String>,
    /// Short headline
    pub title: String,
    /// Human-readable detail
    pub description: String,
    /// Numeric before/after/delta and other context
    pub payload: AlertPayload,
    /// When the alert was created
    pub created_at: DateTime<Utc>,
    /// Check that produced the alert
    pub source: String,
}

impl Alert {
    /// Start building an alert
    pub fn builder(kind: AlertKind, severity: Severity, title: impl Into<String>) -> AlertBuilder {
        AlertBuilder {
            id: None,
            kind,
            severity,
            entity_ref: None,
            title: title.into(),
            description: String::new(),
            payload: AlertPayload::new(),
            created_at: None,
            source: String::from("manual"),
        }
    }

    /// Look up a numeric payload value
    pub fn payload_f64(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(serde_json::Value::as_f64)
    }

    /// Look up a string payload value
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(serde_json::Value::as_str)
    }

    /// Get age of the alert
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }

    /// Format alert for display
    pub fn format_message(&self) -> String {
        format!(
            "[{severity}] {title}\n{description}\nEntity: {entity}\nSource: {source}\nCreated: {created}",
            severity = self.severity.as_str().to_uppercase(),
            title = self.title,
            description = self.description,
            entity = self.entity_ref.as_deref().unwrap_or("national"),
            source = self.source,
            created = self.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}

/// Builder for [`Alert`]
#[derive(Debug, Clone)]
pub struct AlertBuilder {
    id: Option<String>,
    kind: AlertKind,
    severity: Severity,
    entity_ref: Option<String>,
    title: String,
    description: String,
    payload: AlertPayload,
    created_at: Option<DateTime<Utc>>,
    source: String,
}

impl AlertBuilder {
    /// Use a caller-supplied id instead of a generated one
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn entity(mut self, entity_ref: impl Into<String>) -> Self {
        self.entity_ref = Some(entity_ref.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Add a payload entry
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Override the creation timestamp
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Finish the alert
    ///
    /// Generated ids take the form `{source}_{entity}_{uuid}`.
    pub fn build(self) -> Alert {
        let id = self.id.unwrap_or_else(|| {
            format!(
                "{}_{}_{}",
                self.source,
                self.entity_ref.as_deref().unwrap_or("national"),
                Uuid::new_v4().simple()
            )
        });

        Alert {
            id,
            kind: self.kind,
            severity: self.severity,
            entity_ref: self.entity_ref,
            title: self.title,
            description: self.description,
            payload: self.payload,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            source: self.source,
        }
    }
}
