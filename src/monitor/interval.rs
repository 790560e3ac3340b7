//! Monitoring cadence presets

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::error::MonitorError;

/// Named monitoring cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorInterval {
    /// Every 5 minutes by default
    RealTime,
    /// Every 30 minutes by default
    Frequent,
    /// Hourly by default
    Regular,
    /// Once a day by default
    Daily,
}

impl MonitorInterval {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RealTime => "real_time",
            Self::Frequent => "frequent",
            Self::Regular => "regular",
            Self::Daily => "daily",
        }
    }

    /// Get all intervals from shortest to longest
    pub fn all() -> [Self; 4] {
        [Self::RealTime, Self::Frequent, Self::Regular, Self::Daily]
    }

    /// Parse an interval name, falling back to `Frequent` for unknown names
    pub fn resolve(name: &str) -> Self {
        name.parse().unwrap_or_else(|e: MonitorError| {
            tracing::warn!(interval = name, error = %e, "Falling back to frequent interval");
            Self::Frequent
        })
    }
}

impl Default for MonitorInterval {
    fn default() -> Self {
        Self::Frequent
    }
}

impl fmt::Display for MonitorInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MonitorInterval {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "real_time" | "realtime" => Ok(Self::RealTime),
            "frequent" => Ok(Self::Frequent),
            "regular" => Ok(Self::Regular),
            "daily" => Ok(Self::Daily),
            _ => Err(MonitorError::unknown_interval(s)),
        }
    }
}

/// Seconds per named interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalTable {
    pub real_time_secs: u64,
    pub frequent_secs: u64,
    pub regular_secs: u64,
    pub daily_secs: u64,
}

impl Default for IntervalTable {
    fn default() -> Self {
        Self {
            real_time_secs: 300,
            frequent_secs: 1800,
            regular_secs: 3600,
            daily_secs: 86400,
        }
    }
}

impl IntervalTable {
    /// Sleep between ticks for an interval
    #[must_use]
    pub fn duration(&self, interval: MonitorInterval) -> Duration {
        let secs = match interval {
            MonitorInterval::RealTime => self.real_time_secs,
            MonitorInterval::Frequent => self.frequent_secs,
            MonitorInterval::Regular => self.regular_secs,
            MonitorInterval::Daily => self.daily_secs,
        };
        Duration::from_secs(secs)
    }

    /// Validate that every interval is non-zero
    pub fn validate(&self) -> Result<(), MonitorError> {
        for interval in MonitorInterval::all() {
            if self.duration(interval).is_zero() {
                return Err(MonitorError::InvalidInterval {
                    reason: format!("{interval} must be greater than 0 seconds"),
                });
            }
        }
        Ok(())
    }
}
