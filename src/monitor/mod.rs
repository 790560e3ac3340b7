//! Monitor loop and check routines
//!
//! # Architecture
//!
//! ```text
//! MonitorScheduler ──spawn──▶ worker task
//!        │                      │ every interval:
//!        │                      │   support-rate → poll-release → media-coverage
//!        │                      │   → campaign-activity → social-sentiment
//!        │                      │   → prune expired alerts
//!        │                      ▼
//!        └──── owns ──────▶ AlertBus ──▶ SubscriberRegistry
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use seikyoku::monitor::{MonitorInterval, MonitorScheduler};
//! use seikyoku::source::SimulatedSource;
//!
//! let scheduler = MonitorScheduler::with_defaults(Arc::new(SimulatedSource::new(42)));
//! scheduler.register_callback(|alert| println!("{}", alert.format_message()));
//! scheduler.start(MonitorInterval::RealTime);
//! // ...
//! scheduler.stop().await;
//! ```

pub mod checks;
pub mod error;
pub mod interval;
pub mod observations;
pub mod scheduler;

// Re-exports
pub use checks::{CheckOutcome, CheckSpec, CHECKS};
pub use error::{MonitorError, MonitorResult};
pub use interval::{IntervalTable, MonitorInterval};
pub use observations::{Observation, ObservationLog};
pub use scheduler::{MonitorScheduler, MonitorStatus, TickSummary};
