//! Storage backends for sensor metric records.
//!
//! This module provides two backend implementations:
//! - `duckdb`: embedded SQL table with a composite `(user_id, metric_type, timestamp)` index
//! - `memory`: in-process index keyed by `(user_id, metric_type)`, used by tests and scratch runs
//!
//! [`offline::OfflineBackend`] stands in for a store that failed to open.
//!
//! Each backend implements the [`MetricStore`] trait, so the ingestion
//! generator, the query service and the retention manager can all be handed
//! an `Arc<dyn MetricStore>` without knowing which engine sits underneath.
//! Standing TTL rules are enforced by a per-backend [`ttl::ExpirationTask`].

pub mod duckdb;
pub mod memory;
pub mod offline;
pub mod ttl;

use self::{duckdb::DuckDbBackend, memory::MemoryBackend, offline::OfflineBackend};
use crate::error::{Error, Result};
use crate::metrics::{MetricRecord, MetricType};
use crate::retention::RetentionPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::warn;

/// Default cadence of the background expiration task.
pub const DEFAULT_TTL_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Result of a batch append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Records persisted by this call
    pub inserted: u64,
    /// Records refused as malformed; the rest of the batch still went in
    pub rejected: u64,
}

/// What `ensure_retention` did to the standing expiration rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlChange {
    /// No rule existed; one is now active
    Installed,
    /// A rule with a different window was replaced
    Updated { previous: Duration },
    /// The same window was already active
    Unchanged,
}

/// Storage contract for metric records.
#[async_trait]
pub trait MetricStore: Send + Sync + 'static {
    /// Initialize the backend (tables, indexes, persisted TTL rules).
    async fn init(&self) -> Result<()>;

    /// Append a batch of records.
    ///
    /// Malformed records are rejected one by one and counted. A backend
    /// failure fails the whole call; records written before the failure may
    /// remain.
    async fn append(&self, records: Vec<MetricRecord>) -> Result<AppendOutcome>;

    /// Latest record per requested metric type. Every requested type is a key.
    async fn query_latest_by_type(
        &self,
        user_id: &str,
        metric_types: &[MetricType],
    ) -> Result<BTreeMap<MetricType, Option<MetricRecord>>>;

    /// Most recent records for a user, newest first, at most `limit`.
    async fn query_recent(
        &self,
        user_id: &str,
        metric_type: Option<MetricType>,
        limit: usize,
    ) -> Result<Vec<MetricRecord>>;

    /// Total number of stored records.
    async fn count(&self) -> Result<u64>;

    /// Record count per metric type, zero entries included.
    async fn count_by_type(&self) -> Result<BTreeMap<MetricType, u64>>;

    /// Timestamp of the oldest stored record.
    async fn oldest_timestamp(&self) -> Result<Option<DateTime<Utc>>>;

    /// Delete every record with `timestamp < cutoff`.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Install or update the standing expiration rule.
    async fn ensure_retention(&self, policy: RetentionPolicy) -> Result<TtlChange>;

    /// Window of the currently installed expiration rule.
    fn retention_window(&self) -> Option<Duration>;
}

/// Split a batch into persistable records and a rejected count.
pub(crate) fn partition_valid(records: Vec<MetricRecord>) -> (Vec<MetricRecord>, u64) {
    let mut rejected = 0;
    let valid = records
        .into_iter()
        .filter(|record| match record.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!("Rejecting record: {}", e);
                rejected += 1;
                false
            }
        })
        .collect();
    (valid, rejected)
}

/// Map of every metric type to zero, filled in by `count_by_type`.
pub(crate) fn empty_type_counts() -> BTreeMap<MetricType, u64> {
    MetricType::ALL.iter().map(|t| (*t, 0)).collect()
}

#[derive(Clone)]
pub enum StorageBackendType {
    DuckDb(DuckDbBackend),
    Memory(MemoryBackend),
    Offline(OfflineBackend),
}

impl StorageBackendType {
    /// Build a backend from an engine name, connection string and options.
    ///
    /// Recognized options: `ttl_check_interval_secs`.
    pub fn new_with_options(
        engine: &str,
        connection_string: &str,
        options: &HashMap<String, String>,
    ) -> Result<Self> {
        let check_interval = options
            .get("ttl_check_interval_secs")
            .map(|s| {
                s.parse::<u64>().map_err(|_| {
                    Error::Config(format!("invalid ttl_check_interval_secs: {}", s))
                })
            })
            .transpose()?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TTL_CHECK_INTERVAL);

        match engine {
            "duckdb" => Ok(StorageBackendType::DuckDb(
                DuckDbBackend::open(connection_string)?.with_ttl_check_interval(check_interval),
            )),
            "memory" => Ok(StorageBackendType::Memory(
                MemoryBackend::new().with_ttl_check_interval(check_interval),
            )),
            other => Err(Error::Config(format!("Invalid engine type: {}", other))),
        }
    }

    /// Backend that fails every call with `StoreUnavailable(reason)`.
    pub fn offline(reason: impl Into<String>) -> Self {
        StorageBackendType::Offline(OfflineBackend::new(reason))
    }

    /// Offline stand-in for a store that failed to open or initialize with `err`.
    pub fn offline_after(err: Error) -> Self {
        Self::offline(err.into_message())
    }
}

impl AsRef<dyn MetricStore> for StorageBackendType {
    fn as_ref(&self) -> &(dyn MetricStore + 'static) {
        match self {
            StorageBackendType::DuckDb(backend) => backend,
            StorageBackendType::Memory(backend) => backend,
            StorageBackendType::Offline(backend) => backend,
        }
    }
}

#[async_trait]
impl MetricStore for StorageBackendType {
    async fn init(&self) -> Result<()> {
        self.as_ref().init().await
    }

    async fn append(&self, records: Vec<MetricRecord>) -> Result<AppendOutcome> {
        self.as_ref().append(records).await
    }

    async fn query_latest_by_type(
        &self,
        user_id: &str,
        metric_types: &[MetricType],
    ) -> Result<BTreeMap<MetricType, Option<MetricRecord>>> {
        self.as_ref().query_latest_by_type(user_id, metric_types).await
    }

    async fn query_recent(
        &self,
        user_id: &str,
        metric_type: Option<MetricType>,
        limit: usize,
    ) -> Result<Vec<MetricRecord>> {
        self.as_ref().query_recent(user_id, metric_type, limit).await
    }

    async fn count(&self) -> Result<u64> {
        self.as_ref().count().await
    }

    async fn count_by_type(&self) -> Result<BTreeMap<MetricType, u64>> {
        self.as_ref().count_by_type().await
    }

    async fn oldest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        self.as_ref().oldest_timestamp().await
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.as_ref().delete_older_than(cutoff).await
    }

    async fn ensure_retention(&self, policy: RetentionPolicy) -> Result<TtlChange> {
        self.as_ref().ensure_retention(policy).await
    }

    fn retention_window(&self) -> Option<Duration> {
        self.as_ref().retention_window()
    }
}
