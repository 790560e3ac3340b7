//! Subscriber registry for synchronous alert fan-out
//!
//! Subscribers are invoked in registration order on the publishing thread.
//! The list is copied before each dispatch, so registering a subscriber while
//! an alert is being delivered is safe; the newcomer only sees later alerts.
//! A subscriber that returns an error or panics is logged and skipped, the
//! remaining subscribers still receive the alert.

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::Alert;
use crate::metrics;

/// Result type for subscriber callbacks
pub type SubscriberResult = Result<(), SubscriberError>;

/// Errors a subscriber may report back to the registry
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    /// Subscriber refused the alert
    #[error("Alert rejected: {0}")]
    Rejected(String),

    /// Downstream delivery failed
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Subscriber panicked while handling the alert
    #[error("Subscriber panicked: {0}")]
    Panicked(String),
}

/// Receiver of published alerts
///
/// Implemented for any `Fn(&Alert) -> SubscriberResult`, so closures can be
/// registered directly.
pub trait AlertSubscriber: Send + Sync {
    /// Subscriber name used in logs
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Handle one alert
    fn on_alert(&self, alert: &Alert) -> SubscriberResult;
}

impl<F> AlertSubscriber for F
where
    F: Fn(&Alert) -> SubscriberResult + Send + Sync,
{
    fn on_alert(&self, alert: &Alert) -> SubscriberResult {
        self(alert)
    }
}

/// Infallible callback adapter used by [`SubscriberRegistry::register_callback`]
struct Callback<F> {
    name: String,
    f: F,
}

impl<F> AlertSubscriber for Callback<F>
where
    F: Fn(&Alert) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_alert(&self, alert: &Alert) -> SubscriberResult {
        (self.f)(alert);
        Ok(())
    }
}

/// Outcome of dispatching one alert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscribers that handled the alert
    pub delivered: usize,
    /// Subscribers that failed or panicked
    pub failed: usize,
}

/// Ordered list of alert subscribers
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<Vec<Arc<dyn AlertSubscriber>>>,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber
    pub fn register(&self, subscriber: Arc<dyn AlertSubscriber>) {
        let mut subscribers = self.subscribers.write();
        subscribers.push(subscriber);
        tracing::debug!(count = subscribers.len(), "Alert subscriber registered");
    }

    /// Register a plain callback
    pub fn register_callback<F>(&self, f: F)
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        let name = format!("callback-{}", self.len() + 1);
        self.register(Arc::new(Callback { name, f }));
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an alert to every subscriber registered at call time
    pub fn dispatch(&self, alert: &Alert) -> DispatchReport {
        let snapshot: Vec<Arc<dyn AlertSubscriber>> = self.subscribers.read().clone();
        let mut report = DispatchReport::default();

        for subscriber in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| subscriber.on_alert(alert)))
                .unwrap_or_else(|panic| Err(SubscriberError::Panicked(panic_message(&panic))));

            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    metrics::record_subscriber_failure();
                    tracing::error!(
                        subscriber = subscriber.name(),
                        alert_id = %alert.id,
                        error = %e,
                        "Alert subscriber failed"
                    );
                }
            }
        }

        report
    }
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("non-string panic payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{AlertKind, Severity};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_alert() -> Alert {
        Alert::builder(AlertKind::Test, Severity::Low, "test").build()
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = SubscriberRegistry::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            registry.register_callback(move |_| order.lock().push(i));
        }

        let report = registry.dispatch(&sample_alert());
        assert_eq!(report.delivered, 3);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_failing_subscriber_is_isolated() {
        let registry = SubscriberRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        registry.register(Arc::new(|_: &Alert| -> SubscriberResult {
            Err(SubscriberError::Delivery("webhook down".to_string()))
        }));
        let counter = hits.clone();
        registry.register_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let report = registry.dispatch(&sample_alert());
        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let registry = SubscriberRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        registry.register_callback(|_| panic!("subscriber exploded"));
        let counter = hits.clone();
        registry.register_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..3 {
            let report = registry.dispatch(&sample_alert());
            assert_eq!(report.failed, 1);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_register_during_dispatch() {
        let registry = Arc::new(SubscriberRegistry::new());
        let inner = registry.clone();

        registry.register_callback(move |_| {
            inner.register_callback(|_| {});
        });

        let report = registry.dispatch(&sample_alert());
        assert_eq!(report.delivered, 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_panic_message() {
        let payload = catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(&payload), "boom");
    }
}
