//! Metrics collection for snaptable write operations.
//!
//! Every write call is assigned a unique operation ID ([`MetricId`]) when it starts, and every
//! event the call emits references that ID so reporters can correlate the events of one call.
//!
//! # Example: Implementing a Custom MetricsReporter
//!
//! ```
//! use snaptable::metrics::{MetricsReporter, MetricEvent};
//!
//! #[derive(Debug)]
//! struct LoggingReporter;
//!
//! impl MetricsReporter for LoggingReporter {
//!     fn report(&self, event: MetricEvent) {
//!         match event {
//!             MetricEvent::CommitCompleted { transaction_id, num_records, duration, .. } => {
//!                 println!("Committed {transaction_id}: {num_records} records in {duration:?}");
//!             }
//!             MetricEvent::CommitAborted { transaction_id, error_count, .. } => {
//!                 println!("Aborted {transaction_id}: {error_count} failed records");
//!             }
//!             _ => {}
//!         }
//!     }
//! }
//! ```
//!
//! # Storage Metrics
//!
//! The default storage handler emits `StorageListCompleted`, `StorageReadCompleted`,
//! `StorageWriteCompleted` and `StorageDeleteCompleted` events when the `DefaultEngine` is given a
//! reporter. These are not tied to a write call.

mod events;
mod reporter;

pub use events::{MetricEvent, MetricId};
pub use reporter::{CollectingReporter, MetricsReporter};
