//! Error types for the monitor module

use std::fmt;

use crate::i18n::t;

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Monitor-specific errors
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorError {
    /// Interval name not present in the interval table
    UnknownInterval {
        name: String,
    },

    /// Interval of zero length
    InvalidInterval {
        reason: String,
    },

    /// `start` called outside a tokio runtime
    NoRuntime,

    /// A check routine returned an error
    CheckFailed {
        check: String,
        reason: String,
    },

    /// A check routine panicked
    CheckPanicked {
        check: String,
        reason: String,
    },

    /// The loop body itself panicked
    TickPanicked {
        reason: String,
    },

    /// Worker did not exit within the stop timeout
    StopTimeout {
        waited_ms: u64,
    },

    /// Worker task ended abnormally
    WorkerJoin {
        reason: String,
    },
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownInterval { name } => {
                write!(
                    f,
                    "Unknown interval '{}'. Valid options: real_time, frequent, regular, daily",
                    name
                )
            }
            Self::InvalidInterval { reason } => {
                write!(f, "Invalid interval: {}", reason)
            }
            Self::NoRuntime => {
                write!(f, "No tokio runtime available to spawn the monitor worker")
            }
            Self::CheckFailed { check, reason } => {
                write!(f, "Check '{}' failed: {}", check, reason)
            }
            Self::CheckPanicked { check, reason } => {
                write!(f, "Check '{}' panicked: {}", check, reason)
            }
            Self::TickPanicked { reason } => {
                write!(f, "Monitor tick panicked: {}", reason)
            }
            Self::StopTimeout { waited_ms } => {
                write!(f, "Monitor worker did not stop within {}ms", waited_ms)
            }
            Self::WorkerJoin { reason } => {
                write!(f, "Monitor worker ended abnormally: {}", reason)
            }
        }
    }
}

impl std::error::Error for MonitorError {}

impl MonitorError {
    /// Create an unknown interval error
    pub fn unknown_interval(name: impl Into<String>) -> Self {
        Self::UnknownInterval { name: name.into() }
    }

    /// Create a check failure error
    pub fn check_failed(check: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CheckFailed {
            check: check.into(),
            reason: reason.into(),
        }
    }

    /// Create a check panic error
    pub fn check_panicked(check: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CheckPanicked {
            check: check.into(),
            reason: reason.into(),
        }
    }

    /// Get localized description for the error
    pub fn localized_desc(&self) -> String {
        let desc = match self {
            Self::UnknownInterval { name } => t!("errors.monitor.unknown_interval", name = name),
            Self::InvalidInterval { reason } => {
                t!("errors.monitor.invalid_interval", reason = reason)
            }
            Self::NoRuntime => t!("errors.monitor.no_runtime"),
            Self::CheckFailed { check, reason } => {
                t!("errors.monitor.check_failed", check = check, reason = reason)
            }
            Self::CheckPanicked { check, reason } => {
                t!("errors.monitor.check_panicked", check = check, reason = reason)
            }
            Self::TickPanicked { reason } => t!("errors.monitor.tick_panicked", reason = reason),
            Self::StopTimeout { waited_ms } => {
                t!("errors.monitor.stop_timeout", waited_ms = waited_ms)
            }
            Self::WorkerJoin { reason } => t!("errors.monitor.worker_join", reason = reason),
        };
        desc.to_string()
    }

    /// Check if the error is recoverable
    ///
    /// The loop keeps running after any of these.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CheckFailed { .. } | Self::CheckPanicked { .. } | Self::TickPanicked { .. }
        )
    }
}
