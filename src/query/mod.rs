//! Query layer over a [`MetricStore`].
//!
//! Every answer is wrapped in [`Sourced`], which records whether the data came
//! from the store ([`DataSource::Live`]) or was synthesized by the
//! [`DemoDataSupplier`] ([`DataSource::Simulated`]). Lookups are two-tiered:
//! the store first, then the supplier when the store failed or had nothing for
//! the user. Failures never escape this layer; they become a `notice` the
//! presentation side shows next to the data.

pub mod fallback;

pub use fallback::DemoDataSupplier;

use crate::metrics::{MetricRecord, MetricType};
use crate::storage::MetricStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Where a result set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Live,
    Simulated,
}

/// A result tagged with its provenance and an optional operator-visible notice.
#[derive(Debug, Clone, Serialize)]
pub struct Sourced<T> {
    pub data: T,
    pub source: DataSource,
    pub notice: Option<String>,
}

impl<T> Sourced<T> {
    fn live(data: T) -> Self {
        Self {
            data,
            source: DataSource::Live,
            notice: None,
        }
    }

    fn simulated(data: T, notice: String) -> Self {
        Self {
            data,
            source: DataSource::Simulated,
            notice: Some(notice),
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.source == DataSource::Simulated
    }
}

/// Global store introspection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_records: u64,
    pub oldest_timestamp: Option<DateTime<Utc>>,
    /// Age of the oldest record at query time
    #[serde(with = "duration_secs")]
    pub oldest_record_age: Option<Duration>,
    pub per_type: BTreeMap<MetricType, u64>,
    #[serde(with = "duration_secs")]
    pub retention_window: Option<Duration>,
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }
}

pub type LatestByType = BTreeMap<MetricType, Option<MetricRecord>>;

pub struct QueryService {
    store: Arc<dyn MetricStore>,
    fallback: Option<DemoDataSupplier>,
}

impl QueryService {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self {
            store,
            fallback: None,
        }
    }

    /// Enable the synthetic second tier.
    pub fn with_fallback(mut self, supplier: DemoDataSupplier) -> Self {
        self.fallback = Some(supplier);
        self
    }

    /// Latest record per metric type for `user_id`.
    pub async fn latest_by_type(
        &self,
        user_id: &str,
        metric_types: &[MetricType],
    ) -> Sourced<LatestByType> {
        let failure = match self.store.query_latest_by_type(user_id, metric_types).await {
            Ok(latest) if latest.values().any(Option::is_some) => return Sourced::live(latest),
            Ok(latest) => {
                if self.fallback.is_none() {
                    return Sourced::live(latest);
                }
                format!("no stored metrics for {}", user_id)
            }
            Err(e) => {
                warn!("Latest-value query for {} failed: {}", user_id, e);
                format!("metric store unavailable: {}", e)
            }
        };

        match &self.fallback {
            Some(supplier) => Sourced::simulated(
                supplier.latest(user_id, metric_types),
                format!("{}; showing simulated values", failure),
            ),
            None => Sourced {
                data: metric_types.iter().map(|t| (*t, None)).collect(),
                source: DataSource::Live,
                notice: Some(failure),
            },
        }
    }

    /// Most recent records for `user_id`, newest first.
    pub async fn recent(
        &self,
        user_id: &str,
        metric_type: Option<MetricType>,
        limit: usize,
    ) -> Sourced<Vec<MetricRecord>> {
        let failure = match self.store.query_recent(user_id, metric_type, limit).await {
            Ok(records) if !records.is_empty() || limit == 0 => return Sourced::live(records),
            Ok(records) => {
                if self.fallback.is_none() {
                    return Sourced::live(records);
                }
                format!("no stored metrics for {}", user_id)
            }
            Err(e) => {
                warn!("Recent-records query for {} failed: {}", user_id, e);
                format!("metric store unavailable: {}", e)
            }
        };

        match &self.fallback {
            Some(supplier) => Sourced::simulated(
                supplier.recent(user_id, metric_type, limit),
                format!("{}; showing simulated values", failure),
            ),
            None => Sourced {
                data: Vec::new(),
                source: DataSource::Live,
                notice: Some(failure),
            },
        }
    }

    /// Total records, oldest record age, per-type counts and TTL window.
    ///
    /// Never synthesized: an unreachable store yields zeros with a notice.
    pub async fn stats(&self) -> Sourced<StoreStats> {
        match self.collect_stats().await {
            Ok(stats) => Sourced::live(stats),
            Err(e) => {
                warn!("Store introspection failed: {}", e);
                Sourced {
                    data: StoreStats {
                        per_type: crate::storage::empty_type_counts(),
                        retention_window: self.store.retention_window(),
                        ..StoreStats::default()
                    },
                    source: DataSource::Live,
                    notice: Some(format!("metric store unavailable: {}", e)),
                }
            }
        }
    }

    async fn collect_stats(&self) -> crate::error::Result<StoreStats> {
        let total_records = self.store.count().await?;
        let oldest_timestamp = self.store.oldest_timestamp().await?;
        let per_type = self.store.count_by_type().await?;
        let oldest_record_age = oldest_timestamp
            .map(|oldest| (Utc::now() - oldest).to_std().unwrap_or(Duration::ZERO));

        Ok(StoreStats {
            total_records,
            oldest_timestamp,
            oldest_record_age,
            per_type,
            retention_window: self.store.retention_window(),
        })
    }
}
