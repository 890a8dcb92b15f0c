//! Metrics reporter trait and implementations.

use std::sync::Mutex;

use super::MetricEvent;

/// Trait for reporting metrics events from write operations.
///
/// Implementations of this trait receive metric events as they occur and can forward them to
/// monitoring systems like Prometheus, DataDog, etc.
pub trait MetricsReporter: Send + Sync + std::fmt::Debug {
    /// Report a metric event.
    fn report(&self, event: MetricEvent);
}

/// A reporter that keeps every event in memory. Mostly useful in tests.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<MetricEvent>>,
}

impl CollectingReporter {
    /// A snapshot of the events reported so far, in order.
    pub fn events(&self) -> Vec<MetricEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl MetricsReporter for CollectingReporter {
    fn report(&self, event: MetricEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
