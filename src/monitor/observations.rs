//! Bounded per-series memory of fetched readings
//!
//! Used as the previous-value fallback when a source cannot say what its
//! last reading was, and as trend input for reports when the source keeps
//! no history of its own.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::models::MetricKind;

/// One fetched reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

/// Thread-safe ring of observations per (entity, metric)
#[derive(Debug)]
pub struct ObservationLog {
    series: Mutex<HashMap<(String, MetricKind), VecDeque<Observation>>>,
    capacity: usize,
}

impl ObservationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            series: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Append a reading, returning the one recorded before it
    pub fn record(&self, entity_id: &str, kind: MetricKind, value: f64) -> Option<f64> {
        let mut series = self.series.lock();
        let ring = series
            .entry((entity_id.to_string(), kind))
            .or_insert_with(VecDeque::new);

        let previous = ring.back().map(|o| o.value);
        if ring.len() >= self.capacity {
            ring.pop_front();
        }
        ring.push_back(Observation {
            value,
            observed_at: Utc::now(),
        });
        previous
    }

    /// Most recent reading
    pub fn last(&self, entity_id: &str, kind: MetricKind) -> Option<f64> {
        self.series
            .lock()
            .get(&(entity_id.to_string(), kind))
            .and_then(|ring| ring.back())
            .map(|o| o.value)
    }

    /// Up to `limit` most recent values, oldest first
    pub fn values(&self, entity_id: &str, kind: MetricKind, limit: usize) -> Vec<f64> {
        self.series
            .lock()
            .get(&(entity_id.to_string(), kind))
            .map(|ring| {
                ring.iter()
                    .skip(ring.len().saturating_sub(limit))
                    .map(|o| o.value)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of tracked series
    pub fn series_count(&self) -> usize {
        self.series.lock().len()
    }
}

impl Default for ObservationLog {
    fn default() -> Self {
        Self::new(48)
    }
}
