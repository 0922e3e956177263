//! pulsestream: real-time fitness sensor metrics with TTL retention.
//!
//! Records flow from the [`ingest`] generator (or a JSON-lines import) into a
//! [`storage::MetricStore`]. The [`retention`] manager keeps the store bounded,
//! and the [`query`] service answers dashboard lookups, falling back to
//! simulated data when the store is empty or unreachable.

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod query;
pub mod retention;
pub mod shutdown;
pub mod storage;

// Re-export commonly used types
pub use error::{Error, Result};
pub use metrics::{MetricRecord, MetricType};
pub use query::{DataSource, QueryService, Sourced};
pub use retention::{RetentionManager, RetentionPolicy};
pub use storage::{MetricStore, StorageBackendType};
