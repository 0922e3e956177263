//! Stand-in for a store that could not be opened.
//!
//! Every call fails with [`Error::StoreUnavailable`] carrying the original
//! connect error, so read paths can still run and report the outage through
//! their usual notice and fallback handling.

use super::{AppendOutcome, MetricStore, TtlChange};
use crate::error::{Error, Result};
use crate::metrics::{MetricRecord, MetricType};
use crate::retention::RetentionPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OfflineBackend {
    reason: Arc<str>,
}

impl OfflineBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Arc::from(reason.into()),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    fn unavailable<T>(&self) -> Result<T> {
        Err(Error::StoreUnavailable(self.reason.to_string()))
    }
}

#[async_trait]
impl MetricStore for OfflineBackend {
    async fn init(&self) -> Result<()> {
        self.unavailable()
    }

    async fn append(&self, _records: Vec<MetricRecord>) -> Result<AppendOutcome> {
        self.unavailable()
    }

    async fn query_latest_by_type(
        &self,
        _user_id: &str,
        _metric_types: &[MetricType],
    ) -> Result<BTreeMap<MetricType, Option<MetricRecord>>> {
        self.unavailable()
    }

    async fn query_recent(
        &self,
        _user_id: &str,
        _metric_type: Option<MetricType>,
        _limit: usize,
    ) -> Result<Vec<MetricRecord>> {
        self.unavailable()
    }

    async fn count(&self) -> Result<u64> {
        self.unavailable()
    }

    async fn count_by_type(&self) -> Result<BTreeMap<MetricType, u64>> {
        self.unavailable()
    }

    async fn oldest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        self.unavailable()
    }

    async fn delete_older_than(&self, _cutoff: DateTime<Utc>) -> Result<u64> {
        self.unavailable()
    }

    async fn ensure_retention(&self, _policy: RetentionPolicy) -> Result<TtlChange> {
        self.unavailable()
    }

    fn retention_window(&self) -> Option<Duration> {
        None
    }
}
