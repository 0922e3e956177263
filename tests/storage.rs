mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{backends, fast_ttl_backends, heart_rate_series, record};
use pulsestream_core::metrics::MetricType;
use pulsestream_core::retention::RetentionPolicy;
use pulsestream_core::storage::duckdb::DuckDbBackend;
use pulsestream_core::storage::{MetricStore, TtlChange};
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn test_append_increases_count() {
    for (name, store) in backends().await {
        let mut expected = 0;
        for n in [0usize, 1, 2000] {
            let outcome = store.append(heart_rate_series("user-0001", n)).await.unwrap();
            assert_eq!(outcome.inserted, n as u64, "{name}");
            assert_eq!(outcome.rejected, 0, "{name}");
            expected += n as u64;
            assert_eq!(store.count().await.unwrap(), expected, "{name}");
        }
    }
}

#[tokio::test]
async fn test_round_trip_preserves_value_and_timestamp() {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 15).unwrap() + Duration::microseconds(123_456);
    for (name, store) in backends().await {
        let written = record("user-0007", MetricType::CaloriesBurned, 7.25, at);
        store.append(vec![written.clone()]).await.unwrap();

        let recent = store
            .query_recent("user-0007", Some(MetricType::CaloriesBurned), 1)
            .await
            .unwrap();
        assert_eq!(recent, vec![written], "{name}");
    }
}

#[tokio::test]
async fn test_latest_by_type_returns_newest() {
    let t1 = Utc::now() - Duration::minutes(3);
    let t2 = t1 + Duration::minutes(1);
    let t3 = t2 + Duration::minutes(1);

    for (name, store) in backends().await {
        // Out of order on purpose.
        store
            .append(vec![
                record("user-0002", MetricType::Steps, 20.0, t2),
                record("user-0002", MetricType::Steps, 30.0, t3),
                record("user-0002", MetricType::Steps, 10.0, t1),
                record("user-0002", MetricType::HeartRate, 70.0, t1),
            ])
            .await
            .unwrap();

        let latest = store
            .query_latest_by_type("user-0002", &MetricType::ALL)
            .await
            .unwrap();
        assert_eq!(latest.len(), 4, "{name}");
        let steps = latest[&MetricType::Steps].as_ref().unwrap();
        assert_eq!(steps.value, 30.0, "{name}");
        assert_eq!(steps.timestamp, record("x", MetricType::Steps, 0.0, t3).timestamp);
        assert_eq!(latest[&MetricType::HeartRate].as_ref().unwrap().value, 70.0);
        assert!(latest[&MetricType::CaloriesBurned].is_none(), "{name}");
        assert!(latest[&MetricType::ActiveMinutes].is_none(), "{name}");
    }
}

#[tokio::test]
async fn test_recent_ordering_and_limits() {
    let now = Utc::now();
    for (name, store) in backends().await {
        let mut batch = Vec::new();
        for i in 0..10 {
            let metric_type = MetricType::ALL[i % 4];
            batch.push(record("user-0003", metric_type, i as f64, now - Duration::seconds(i as i64)));
        }
        batch.push(record("user-0004", MetricType::HeartRate, 99.0, now));
        store.append(batch).await.unwrap();

        let all = store.query_recent("user-0003", None, 20).await.unwrap();
        assert_eq!(all.len(), 10, "{name}");
        assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp), "{name}");
        assert!(all.iter().all(|r| r.user_id == "user-0003"), "{name}");

        let top = store.query_recent("user-0003", None, 3).await.unwrap();
        let values: Vec<f64> = top.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0], "{name}");

        let heart = store
            .query_recent("user-0003", Some(MetricType::HeartRate), 20)
            .await
            .unwrap();
        assert_eq!(heart.len(), 3, "{name}");

        assert!(store.query_recent("user-0003", None, 0).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_unknown_user_is_empty() {
    for (name, store) in backends().await {
        let recent = store
            .query_recent("user-9999", Some(MetricType::HeartRate), 20)
            .await
            .unwrap();
        assert!(recent.is_empty(), "{name}");

        let latest = store
            .query_latest_by_type("user-9999", &MetricType::ALL)
            .await
            .unwrap();
        assert!(latest.values().all(Option::is_none), "{name}");
        assert!(store.oldest_timestamp().await.unwrap().is_none(), "{name}");
    }
}

#[tokio::test]
async fn test_malformed_records_rejected_individually() {
    let now = Utc::now();
    for (name, store) in backends().await {
        let outcome = store
            .append(vec![
                record("user-0001", MetricType::HeartRate, 72.0, now),
                record("user-0001", MetricType::HeartRate, f64::NAN, now),
                record("", MetricType::Steps, 10.0, now),
                record("user-0001", MetricType::Steps, 10.0, now),
            ])
            .await
            .unwrap();
        assert_eq!(outcome.inserted, 2, "{name}");
        assert_eq!(outcome.rejected, 2, "{name}");
        assert_eq!(store.count().await.unwrap(), 2, "{name}");
    }
}

#[tokio::test]
async fn test_count_by_type_and_oldest() {
    let now = Utc::now();
    for (name, store) in backends().await {
        store
            .append(vec![
                record("user-0001", MetricType::HeartRate, 72.0, now - Duration::hours(2)),
                record("user-0001", MetricType::HeartRate, 73.0, now),
                record("user-0002", MetricType::ActiveMinutes, 2.0, now - Duration::hours(1)),
            ])
            .await
            .unwrap();

        let counts = store.count_by_type().await.unwrap();
        assert_eq!(counts[&MetricType::HeartRate], 2, "{name}");
        assert_eq!(counts[&MetricType::ActiveMinutes], 1, "{name}");
        assert_eq!(counts[&MetricType::Steps], 0, "{name}");

        let oldest = store.oldest_timestamp().await.unwrap().unwrap();
        assert_eq!(
            oldest,
            record("x", MetricType::Steps, 0.0, now - Duration::hours(2)).timestamp,
            "{name}"
        );
    }
}

#[tokio::test]
async fn test_delete_older_than_removes_only_expired() {
    let now = Utc::now();
    for (name, store) in backends().await {
        store
            .append(vec![
                record("user-0001", MetricType::HeartRate, 1.0, now - Duration::days(10)),
                record("user-0001", MetricType::HeartRate, 2.0, now - Duration::days(6)),
                record("user-0001", MetricType::HeartRate, 3.0, now - Duration::hours(1)),
            ])
            .await
            .unwrap();

        let deleted = store.delete_older_than(now - Duration::days(7)).await.unwrap();
        assert_eq!(deleted, 1, "{name}");

        let left = store.query_recent("user-0001", None, 10).await.unwrap();
        let values: Vec<f64> = left.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![3.0, 2.0], "{name}");

        // A record exactly at the cutoff is kept.
        let cutoff = left[1].timestamp;
        assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 0, "{name}");
    }
}

#[tokio::test]
async fn test_ensure_retention_is_idempotent() {
    for (name, store) in backends().await {
        let week = RetentionPolicy::default();
        assert_eq!(store.ensure_retention(week).await.unwrap(), TtlChange::Installed, "{name}");
        assert_eq!(store.ensure_retention(week).await.unwrap(), TtlChange::Unchanged, "{name}");
        assert_eq!(store.retention_window(), Some(week.window()), "{name}");

        let two_days = RetentionPolicy::from_days(2).unwrap();
        assert_eq!(
            store.ensure_retention(two_days).await.unwrap(),
            TtlChange::Updated {
                previous: week.window()
            },
            "{name}"
        );
        assert_eq!(store.retention_window(), Some(two_days.window()), "{name}");
    }
}

#[tokio::test]
async fn test_ttl_rule_expires_records_without_manual_purge() {
    let now = Utc::now();
    for (name, store) in fast_ttl_backends(std::time::Duration::from_millis(50)).await {
        store
            .append(vec![
                record("user-0001", MetricType::HeartRate, 1.0, now - Duration::days(3)),
                record("user-0001", MetricType::HeartRate, 2.0, now),
            ])
            .await
            .unwrap();

        store
            .ensure_retention(RetentionPolicy::from_days(1).unwrap())
            .await
            .unwrap();

        let mut remaining = store.count().await.unwrap();
        for _ in 0..40 {
            if remaining == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            remaining = store.count().await.unwrap();
        }
        assert_eq!(remaining, 1, "{name}");
    }
}

#[tokio::test]
async fn test_concurrent_appends() {
    for (name, store) in backends().await {
        let mut handles = Vec::new();
        for writer in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let user_id = format!("user-{:04}", writer);
                store.append(heart_rate_series(&user_id, 100)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.count().await.unwrap(), 800, "{name}");
    }
}

#[tokio::test]
async fn test_sweeps_run_alongside_appends_and_reads() {
    let now = Utc::now();
    let cutoff = now - Duration::days(7);

    for (name, store) in backends().await {
        let mut writers = Vec::new();
        for writer in 0..4 {
            let store = Arc::clone(&store);
            writers.push(tokio::spawn(async move {
                let user_id = format!("user-{:04}", writer);
                let mut inserted = 0u64;
                for round in 0..10i64 {
                    let batch: Vec<_> = (0..20i64)
                        .map(|i| {
                            // Even rows are already expired.
                            let age = if i % 2 == 0 {
                                Duration::days(10) + Duration::seconds(round * 20 + i)
                            } else {
                                Duration::seconds(round * 20 + i)
                            };
                            record(&user_id, MetricType::ALL[(i % 4) as usize], i as f64, now - age)
                        })
                        .collect();
                    inserted += store.append(batch).await.unwrap().inserted;
                    tokio::task::yield_now().await;
                }
                inserted
            }));
        }

        let sweeper = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut deleted = 0u64;
                for _ in 0..20 {
                    deleted += store.delete_older_than(cutoff).await.unwrap();
                    tokio::task::yield_now().await;
                }
                deleted
            })
        };

        let mut readers = Vec::new();
        for reader in 0..4 {
            let store = Arc::clone(&store);
            readers.push(tokio::spawn(async move {
                let user_id = format!("user-{:04}", reader);
                for _ in 0..20 {
                    for r in store.query_recent(&user_id, None, 50).await.unwrap() {
                        r.validate().unwrap();
                        assert_eq!(r.user_id, user_id);
                        assert_eq!(r.device_id, format!("band-{}", user_id));
                        assert_eq!(r.session_id, "test-session");
                    }
                    let latest = store
                        .query_latest_by_type(&user_id, &MetricType::ALL)
                        .await
                        .unwrap();
                    for (metric_type, r) in latest {
                        if let Some(r) = r {
                            assert_eq!(r.metric_type, metric_type);
                            assert_eq!(r.device_id, format!("band-{}", user_id));
                        }
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        let mut inserted = 0u64;
        for writer in writers {
            inserted += writer.await.unwrap();
        }
        for reader in readers {
            reader.await.unwrap();
        }
        let mut deleted = sweeper.await.unwrap();
        deleted += store.delete_older_than(cutoff).await.unwrap();

        assert_eq!(inserted, 800, "{name}");
        assert_eq!(deleted, 400, "{name}");
        assert_eq!(store.count().await.unwrap(), inserted - deleted, "{name}");
        let oldest = store.oldest_timestamp().await.unwrap().unwrap();
        assert!(oldest >= cutoff, "{name}");
    }
}

#[tokio::test]
async fn test_duckdb_records_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.duckdb");
    let path = path.to_str().unwrap();

    {
        let backend = DuckDbBackend::open(path).unwrap();
        backend.init().await.unwrap();
        backend.append(heart_rate_series("user-0001", 25)).await.unwrap();
    }

    let reopened = DuckDbBackend::open(path).unwrap();
    reopened.init().await.unwrap();
    assert_eq!(reopened.count().await.unwrap(), 25);
}
