//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use pulsestream_core::metrics::{MetricRecord, MetricType};
use pulsestream_core::storage::duckdb::DuckDbBackend;
use pulsestream_core::storage::memory::MemoryBackend;
use pulsestream_core::storage::MetricStore;
use std::sync::Arc;

pub fn record(
    user_id: &str,
    metric_type: MetricType,
    value: f64,
    timestamp: DateTime<Utc>,
) -> MetricRecord {
    MetricRecord::new(
        user_id,
        metric_type,
        value,
        timestamp,
        format!("band-{}", user_id),
        "test-session",
    )
}

/// `count` heart-rate records for `user_id`, one second apart, ending now.
pub fn heart_rate_series(user_id: &str, count: usize) -> Vec<MetricRecord> {
    let now = Utc::now();
    (0..count)
        .map(|i| {
            record(
                user_id,
                MetricType::HeartRate,
                60.0 + (i % 40) as f64,
                now - Duration::seconds(i as i64),
            )
        })
        .collect()
}

/// Every backend the contract tests run against, initialized.
pub async fn backends() -> Vec<(&'static str, Arc<dyn MetricStore>)> {
    let memory: Arc<dyn MetricStore> = Arc::new(MemoryBackend::new());
    let duckdb: Arc<dyn MetricStore> =
        Arc::new(DuckDbBackend::new_in_memory().expect("in-memory duckdb"));
    let stores = vec![("memory", memory), ("duckdb", duckdb)];
    for (_, store) in &stores {
        store.init().await.unwrap();
    }
    stores
}

/// Backends with a short TTL check interval.
pub async fn fast_ttl_backends(check: std::time::Duration) -> Vec<(&'static str, Arc<dyn MetricStore>)> {
    let memory: Arc<dyn MetricStore> = Arc::new(MemoryBackend::new().with_ttl_check_interval(check));
    let duckdb: Arc<dyn MetricStore> = Arc::new(
        DuckDbBackend::new_in_memory()
            .expect("in-memory duckdb")
            .with_ttl_check_interval(check),
    );
    let stores = vec![("memory", memory), ("duckdb", duckdb)];
    for (_, store) in &stores {
        store.init().await.unwrap();
    }
    stores
}
