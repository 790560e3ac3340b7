//! seikyoku - Election situation monitor
//!
//! Samples slowly-changing election signals (support rates, polls, media
//! coverage, campaign activity, social sentiment), turns significant moves
//! into alerts, and produces daily trend reports.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Metric kinds and the watch-list
//! - [`source`] - Metric source boundary and a simulated source
//! - [`analytics`] - Trend estimation and anomaly detection
//! - [`notifications`] - Alerts, the alert bus and subscribers
//! - [`monitor`] - Background loop and check routines
//! - [`report`] - Daily report generation
//! - [`metrics`] - Prometheus metrics
//! - [`i18n`] - Localized error and label text
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use seikyoku::config::Config;
//! use seikyoku::monitor::{MonitorInterval, MonitorScheduler};
//! use seikyoku::source::SimulatedSource;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let scheduler = MonitorScheduler::new(config, Arc::new(SimulatedSource::new(42)));
//!     scheduler.register_callback(|alert| println!("{}", alert.title));
//!     scheduler.start(MonitorInterval::RealTime);
//!     let report = scheduler.generate_daily_report().await;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     scheduler.stop().await;
//!     Ok(())
//! }
//! ```

// Initialize rust-i18n at crate root level
rust_i18n::i18n!("locales", fallback = "en");

pub mod analytics;
pub mod config;
pub mod error;
pub mod i18n;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod notifications;
pub mod report;
pub mod source;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result, SeikyokuErrorTrait};
    pub use crate::models::{MetricKind, WatchList};
    pub use crate::monitor::{MonitorInterval, MonitorScheduler, MonitorStatus, TickSummary};
    pub use crate::notifications::{Alert, AlertBus, AlertKind, AlertSubscriber, Severity};
    pub use crate::report::DailyReport;
    pub use crate::source::{MetricSource, SimulatedSource, SourceError};
}

// Direct re-exports for convenience
pub use models::{MetricKind, WatchList};
pub use monitor::MonitorScheduler;
