//! Metric source boundary
//!
//! The monitor never collects raw figures itself. Every reading comes from a
//! [`MetricSource`], which may be slow or fail; failures are reported per
//! call and the monitor skips that entity/metric for the tick.

pub mod simulated;

use async_trait::async_trait;
use thiserror::Error;

use crate::i18n::t;
use crate::models::MetricKind;

pub use simulated::SimulatedSource;

/// Errors a metric source can report
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Backend could not be reached or answered with an error
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// No data exists for this entity/metric pair
    #[error("No {metric} data for entity {entity}")]
    NotFound { entity: String, metric: MetricKind },

    /// Backend returned a value that is not a usable number
    #[error("Invalid {metric} value: {value}")]
    InvalidValue { metric: MetricKind, value: f64 },

    /// Request timed out
    #[error("Source request timed out")]
    Timeout,
}

impl SourceError {
    /// Check if a later attempt may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }

    /// Get localized description for the error
    pub fn localized_desc(&self) -> String {
        match self {
            Self::Unavailable(reason) => t!("errors.source.unavailable", reason = reason).to_string(),
            Self::NotFound { entity, metric } => t!(
                "errors.source.not_found",
                entity = entity,
                metric = metric.localized_name()
            )
            .to_string(),
            Self::InvalidValue { metric, value } => t!(
                "errors.source.invalid_value",
                metric = metric.localized_name(),
                value = value
            )
            .to_string(),
            Self::Timeout => t!("errors.source.timeout").to_string(),
        }
    }
}

/// Result type for metric source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Supplier of current and historical readings
///
/// Only [`fetch_metric`](MetricSource::fetch_metric) is required. Sources
/// that know the previous reading or keep history can override the other
/// two; otherwise the monitor falls back to its own observation log.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Current reading for an entity
    async fn fetch_metric(&self, entity_id: &str, kind: MetricKind) -> SourceResult<f64>;

    /// Reading immediately preceding the current one, if the source knows it
    async fn fetch_previous(&self, _entity_id: &str, _kind: MetricKind) -> SourceResult<Option<f64>> {
        Ok(None)
    }

    /// Up to `limit` most recent readings, oldest first
    async fn fetch_history(
        &self,
        _entity_id: &str,
        _kind: MetricKind,
        _limit: usize,
    ) -> SourceResult<Vec<f64>> {
        Ok(Vec::new())
    }

    /// Source name used in logs
    fn name(&self) -> &str {
        "metric-source"
    }
}

/// Reject readings that are not finite numbers
pub fn ensure_finite(kind: MetricKind, value: f64) -> SourceResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SourceError::InvalidValue {
            metric: kind,
            value,
        })
    }
}
