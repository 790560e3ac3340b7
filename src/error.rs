//! Unified error handling for the seikyoku crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while maintaining the ability to use
//! domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`SeikyokuErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use seikyoku::error::{Error, SeikyokuErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying: {}", err.localized_desc());
//!     } else {
//!         eprintln!("Fatal error: {}", err);
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

use crate::i18n::t;

// Re-export domain-specific errors for convenience
pub use crate::analytics::TrendError;
pub use crate::monitor::error::MonitorError;
pub use crate::notifications::SubscriberError;
pub use crate::source::SourceError;

/// Common trait for all seikyoku error types
pub trait SeikyokuErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get localized description for user-facing messages
    fn localized_desc(&self) -> String;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Metric source failures
    Source,
    /// Trend and anomaly computation errors
    Analysis,
    /// Subscriber delivery errors
    Dispatch,
    /// Monitor loop and lifecycle errors
    Scheduler,
    /// Configuration and validation errors
    Config,
    /// File and serialization errors
    Io,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get localized description for the category
    pub fn localized_desc(&self) -> String {
        match self {
            Self::Source => t!("errors.category.source").to_string(),
            Self::Analysis => t!("errors.category.analysis").to_string(),
            Self::Dispatch => t!("errors.category.dispatch").to_string(),
            Self::Scheduler => t!("errors.category.scheduler").to_string(),
            Self::Config => t!("errors.category.config").to_string(),
            Self::Io => t!("errors.category.io").to_string(),
            Self::Other => t!("errors.category.other").to_string(),
        }
    }
}

/// Unified error type for the seikyoku crate
#[derive(Error, Debug)]
pub enum Error {
    /// Metric source errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Monitor lifecycle and loop errors
    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    /// Trend analysis errors
    #[error("Trend error: {0}")]
    Trend(#[from] TrendError),

    /// Subscriber errors
    #[error("Subscriber error: {0}")]
    Subscriber(#[from] SubscriberError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SeikyokuErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Source(e) => e.is_recoverable(),
            Self::Monitor(e) => e.is_recoverable(),
            Self::Trend(_) => false,
            Self::Subscriber(_) => true, // next alert is delivered independently
            Self::Io(_) => true,         // I/O errors are often transient
            Self::Json(_) | Self::Toml(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn localized_desc(&self) -> String {
        match self {
            Self::Source(e) => e.localized_desc(),
            Self::Monitor(e) => e.localized_desc(),
            Self::Trend(e) => format!("{}: {e}", self.category().localized_desc()),
            Self::Subscriber(e) => format!("{}: {e}", self.category().localized_desc()),
            Self::Io(e) => format!("{}: {e}", self.category().localized_desc()),
            Self::Json(e) => t!("errors.json", detail = e).to_string(),
            Self::Toml(e) => t!("errors.toml", detail = e).to_string(),
            Self::Config(msg) => format!("{}: {msg}", self.category().localized_desc()),
            Self::Other { context, .. } => context.clone(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Source(_) => ErrorCategory::Source,
            Self::Monitor(_) => ErrorCategory::Scheduler,
            Self::Trend(_) => ErrorCategory::Analysis,
            Self::Subscriber(_) => ErrorCategory::Dispatch,
            Self::Io(_) | Self::Json(_) => ErrorCategory::Io,
            Self::Toml(_) | Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let source_err = Error::Source(SourceError::Timeout);
        assert_eq!(source_err.category(), ErrorCategory::Source);

        let trend_err = Error::Trend(TrendError::InvalidThreshold(-1.0));
        assert_eq!(trend_err.category(), ErrorCategory::Analysis);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::Source(SourceError::Timeout).is_recoverable());
        assert!(!Error::Monitor(MonitorError::NoRuntime).is_recoverable());
        assert!(Error::Monitor(MonitorError::check_failed("media_monitor", "x")).is_recoverable());
    }

    #[test]
    fn test_localized_desc() {
        let err = Error::Source(SourceError::Timeout);
        assert_eq!(err.localized_desc(), t!("errors.source.timeout"));

        let config = Error::Config("bad interval".into());
        let desc = config.localized_desc();
        assert!(desc.starts_with(&*ErrorCategory::Config.localized_desc()));
        assert!(desc.ends_with("bad interval"));
    }

    #[test]
    fn test_category_descriptions_are_translated() {
        for category in [ErrorCategory::Source, ErrorCategory::Scheduler, ErrorCategory::Other] {
            let desc = category.localized_desc();
            assert!(!desc.is_empty());
            assert!(!desc.starts_with("errors."), "missing translation: {desc}");
        }
    }

    #[test]
    fn test_error_conversion() {
        let unified: Error = SubscriberError::Rejected("muted".into()).into();
        assert!(matches!(unified, Error::Subscriber(_)));
        assert_eq!(unified.category(), ErrorCategory::Dispatch);
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("interval must be positive");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: Error = toml_err.into();
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
    }
}
