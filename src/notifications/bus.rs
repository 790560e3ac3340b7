//! Bounded in-memory alert store
//!
//! Alerts live in a lock-protected ring buffer. Each entry carries a
//! monotonic sequence number; reads iterate the buffer in place and never
//! remove anything, so a reader can neither lose nor reorder alerts for
//! other readers. Publishing into a full buffer evicts the oldest entry.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

use super::subscribers::{DispatchReport, SubscriberRegistry};
use super::{Alert, Severity};
use crate::metrics;

/// Default number of alerts retained by a bus
pub const DEFAULT_CAPACITY: usize = 1000;

/// Filter for [`AlertBus::snapshot`]
#[derive(Debug, Clone, Copy)]
pub struct AlertFilter {
    /// Only alerts with this exact severity
    pub severity: Option<Severity>,
    /// Only alerts created within this long of now; `None` is unbounded
    pub within: Option<Duration>,
}

impl AlertFilter {
    /// Alerts of any severity from the last `hours` hours
    ///
    /// Negative hours count as zero. A window too large to represent has
    /// no lower bound.
    pub fn last_hours(hours: i64) -> Self {
        Self {
            severity: None,
            within: Duration::try_hours(hours.max(0)),
        }
    }

    /// Alerts of any age
    pub fn all() -> Self {
        Self {
            severity: None,
            within: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Oldest creation time still inside the window
    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.within.and_then(|w| now.checked_sub_signed(w))
    }

    fn matches(&self, alert: &Alert, cutoff: Option<DateTime<Utc>>) -> bool {
        cutoff.map_or(true, |c| alert.created_at >= c)
            && self.severity.map_or(true, |s| alert.severity == s)
    }
}

impl Default for AlertFilter {
    fn default() -> Self {
        Self::last_hours(24)
    }
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    alert: Alert,
}

#[derive(Debug, Default)]
struct Ring {
    entries: VecDeque<Entry>,
    next_seq: u64,
    evicted: u64,
}

/// Thread-safe alert store with synchronous subscriber dispatch
pub struct AlertBus {
    ring: RwLock<Ring>,
    capacity: usize,
    subscribers: Arc<SubscriberRegistry>,
}

impl AlertBus {
    /// Create a bus with its own subscriber registry
    pub fn new(capacity: usize) -> Self {
        Self::with_subscribers(capacity, Arc::new(SubscriberRegistry::new()))
    }

    /// Create a bus that dispatches to an existing registry
    pub fn with_subscribers(capacity: usize, subscribers: Arc<SubscriberRegistry>) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: RwLock::new(Ring {
                entries: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                ..Default::default()
            }),
            capacity,
            subscribers,
        }
    }

    /// Registry alerts are dispatched to
    pub fn subscribers(&self) -> &Arc<SubscriberRegistry> {
        &self.subscribers
    }

    /// Store an alert and deliver it to every subscriber
    ///
    /// Delivery completes before this returns. Subscribers run after the
    /// store lock is released, so they may read the bus themselves.
    pub fn publish(&self, alert: Alert) -> DispatchReport {
        let size = {
            let mut ring = self.ring.write();
            if ring.entries.len() >= self.capacity {
                ring.entries.pop_front();
                ring.evicted += 1;
            }
            let seq = ring.next_seq;
            ring.next_seq += 1;
            ring.entries.push_back(Entry {
                seq,
                alert: alert.clone(),
            });
            ring.entries.len()
        };

        metrics::record_alert_published(alert.kind.as_str(), alert.severity.as_str());
        metrics::update_alert_queue_size(size);

        tracing::info!(
            alert_id = %alert.id,
            kind = %alert.kind,
            severity = %alert.severity,
            entity = alert.entity_ref.as_deref().unwrap_or("national"),
            "Alert published: {}",
            alert.title
        );

        self.subscribers.dispatch(&alert)
    }

    /// Alerts matching the filter, newest first
    ///
    /// Alerts with equal timestamps are ordered by publication, most recent
    /// first.
    pub fn snapshot(&self, filter: &AlertFilter) -> Vec<Alert> {
        let cutoff = filter.cutoff(Utc::now());

        let mut selected: Vec<(DateTime<Utc>, u64, Alert)> = {
            let ring = self.ring.read();
            ring.entries
                .iter()
                .filter(|e| filter.matches(&e.alert, cutoff))
                .map(|e| (e.alert.created_at, e.seq, e.alert.clone()))
                .collect()
        };

        selected.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        selected.into_iter().map(|(_, _, alert)| alert).collect()
    }

    /// Whether an alert with this id is currently stored
    pub fn contains(&self, alert_id: &str) -> bool {
        self.ring.read().entries.iter().any(|e| e.alert.id == alert_id)
    }

    /// Remove alerts created more than `age` ago, returning how many went
    ///
    /// An age reaching past the earliest representable time removes nothing.
    pub fn prune_older_than(&self, age: Duration) -> usize {
        let Some(cutoff) = Utc::now().checked_sub_signed(age) else {
            return 0;
        };
        let (removed, size) = {
            let mut ring = self.ring.write();
            let before = ring.entries.len();
            ring.entries.retain(|e| e.alert.created_at >= cutoff);
            (before - ring.entries.len(), ring.entries.len())
        };

        if removed > 0 {
            metrics::update_alert_queue_size(size);
            tracing::debug!(removed, remaining = size, "Pruned expired alerts");
        }
        removed
    }

    /// Number of stored alerts
    pub fn len(&self) -> usize {
        self.ring.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of stored alerts
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total alerts ever published to this bus
    pub fn total_published(&self) -> u64 {
        self.ring.read().next_seq
    }

    /// Alerts dropped because the buffer was full
    pub fn evicted(&self) -> u64 {
        self.ring.read().evicted
    }
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for AlertBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertBus")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
