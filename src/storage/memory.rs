//! In-process metric store.
//!
//! Records are indexed per `(user_id, metric_type)` in timestamp-ordered maps,
//! plus one global time index that makes count, oldest-record and age-based
//! deletes cheap. A single reader/writer lock guards both indexes, so readers
//! never observe a record that is half inserted or half deleted.

use crate::error::Result;
use crate::metrics::{timestamp_from_micros, truncate_to_micros, MetricRecord, MetricType};
use crate::retention::RetentionPolicy;
use crate::storage::ttl::ExpirationTask;
use crate::storage::{
    empty_type_counts, partition_valid, AppendOutcome, MetricStore, TtlChange,
    DEFAULT_TTL_CHECK_INTERVAL,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Ordering key: timestamp in microseconds, then insertion sequence.
type SeriesKey = (i64, u64);

#[derive(Default)]
struct MemoryIndex {
    series: HashMap<String, HashMap<MetricType, BTreeMap<SeriesKey, MetricRecord>>>,
    by_time: BTreeMap<SeriesKey, (String, MetricType)>,
    next_seq: u64,
}

impl MemoryIndex {
    fn insert(&mut self, mut record: MetricRecord) {
        record.timestamp = truncate_to_micros(record.timestamp);
        let key = (record.timestamp_micros(), self.next_seq);
        self.next_seq += 1;

        self.by_time
            .insert(key, (record.user_id.clone(), record.metric_type));
        self.series
            .entry(record.user_id.clone())
            .or_default()
            .entry(record.metric_type)
            .or_default()
            .insert(key, record);
    }

    fn delete_older_than(&mut self, cutoff_micros: i64) -> u64 {
        let kept = self.by_time.split_off(&(cutoff_micros, 0));
        let expired = std::mem::replace(&mut self.by_time, kept);

        for (key, (user_id, metric_type)) in &expired {
            if let Some(per_user) = self.series.get_mut(user_id) {
                if let Some(series) = per_user.get_mut(metric_type) {
                    series.remove(key);
                    if series.is_empty() {
                        per_user.remove(metric_type);
                    }
                }
                if per_user.is_empty() {
                    self.series.remove(user_id);
                }
            }
        }

        expired.len() as u64
    }
}

/// Memory-backed [`MetricStore`].
#[derive(Clone)]
pub struct MemoryBackend {
    index: Arc<RwLock<MemoryIndex>>,
    expiration: Arc<Mutex<Option<ExpirationTask>>>,
    check_interval: Duration,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            index: Arc::new(RwLock::new(MemoryIndex::default())),
            expiration: Arc::new(Mutex::new(None)),
            check_interval: DEFAULT_TTL_CHECK_INTERVAL,
        }
    }

    /// How often an installed TTL rule purges expired records.
    pub fn with_ttl_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    fn purge_weak(index: &Weak<RwLock<MemoryIndex>>, cutoff: DateTime<Utc>) -> Option<u64> {
        let index = index.upgrade()?;
        let deleted = index.write().delete_older_than(cutoff.timestamp_micros());
        Some(deleted)
    }
}

#[async_trait]
impl MetricStore for MemoryBackend {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn append(&self, records: Vec<MetricRecord>) -> Result<AppendOutcome> {
        let (valid, rejected) = partition_valid(records);
        let inserted = valid.len() as u64;

        let mut index = self.index.write();
        for record in valid {
            index.insert(record);
        }

        Ok(AppendOutcome { inserted, rejected })
    }

    async fn query_latest_by_type(
        &self,
        user_id: &str,
        metric_types: &[MetricType],
    ) -> Result<BTreeMap<MetricType, Option<MetricRecord>>> {
        let index = self.index.read();
        let per_user = index.series.get(user_id);

        Ok(metric_types
            .iter()
            .map(|metric_type| {
                let latest = per_user
                    .and_then(|series| series.get(metric_type))
                    .and_then(|series| series.values().next_back())
                    .cloned();
                (*metric_type, latest)
            })
            .collect())
    }

    async fn query_recent(
        &self,
        user_id: &str,
        metric_type: Option<MetricType>,
        limit: usize,
    ) -> Result<Vec<MetricRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let index = self.index.read();
        let Some(per_user) = index.series.get(user_id) else {
            return Ok(Vec::new());
        };

        let mut candidates: Vec<(&SeriesKey, &MetricRecord)> = match metric_type {
            Some(metric_type) => per_user
                .get(&metric_type)
                .map(|series| series.iter().rev().take(limit).collect())
                .unwrap_or_default(),
            None => per_user
                .values()
                .flat_map(|series| series.iter().rev().take(limit))
                .collect(),
        };

        candidates.sort_by(|a, b| b.0.cmp(a.0));
        candidates.truncate(limit);
        Ok(candidates.into_iter().map(|(_, r)| r.clone()).collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.index.read().by_time.len() as u64)
    }

    async fn count_by_type(&self) -> Result<BTreeMap<MetricType, u64>> {
        let index = self.index.read();
        let mut counts = empty_type_counts();
        for per_user in index.series.values() {
            for (metric_type, series) in per_user {
                *counts.entry(*metric_type).or_default() += series.len() as u64;
            }
        }
        Ok(counts)
    }

    async fn oldest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let index = self.index.read();
        index
            .by_time
            .keys()
            .next()
            .map(|(micros, _)| timestamp_from_micros(*micros))
            .transpose()
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        Ok(self.index.write().delete_older_than(cutoff.timestamp_micros()))
    }

    async fn ensure_retention(&self, policy: RetentionPolicy) -> Result<TtlChange> {
        let mut expiration = self.expiration.lock();
        if let Some(task) = expiration.as_ref() {
            if task.policy() == policy {
                return Ok(TtlChange::Unchanged);
            }
            let previous = task.policy().window();
            task.update(policy);
            return Ok(TtlChange::Updated { previous });
        }

        let index = Arc::downgrade(&self.index);
        *expiration = Some(ExpirationTask::spawn(
            policy,
            self.check_interval,
            move |cutoff| {
                let deleted = Self::purge_weak(&index, cutoff);
                async move { deleted.map(Ok) }
            },
        ));
        Ok(TtlChange::Installed)
    }

    fn retention_window(&self) -> Option<Duration> {
        self.expiration.lock().as_ref().map(|task| task.policy().window())
    }
}
