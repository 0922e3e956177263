mod common;

use chrono::{Duration, Utc};
use common::{backends, record};
use pulsestream_core::metrics::{baseline_for, range_for, MetricType};
use pulsestream_core::query::fallback::SIMULATED_DEVICE;
use pulsestream_core::query::{DataSource, DemoDataSupplier, QueryService};
use pulsestream_core::retention::RetentionPolicy;
use pulsestream_core::storage::{MetricStore, StorageBackendType};
use std::sync::Arc;

fn offline() -> Arc<StorageBackendType> {
    Arc::new(StorageBackendType::offline("connection refused"))
}

#[tokio::test]
async fn test_empty_store_falls_back_to_simulated() {
    for (name, store) in backends().await {
        let service = QueryService::new(store).with_fallback(DemoDataSupplier::default());

        let recent = service
            .recent("user-9999", Some(MetricType::HeartRate), 20)
            .await;
        assert_eq!(recent.source, DataSource::Simulated, "{name}");
        assert_eq!(recent.data.len(), 20, "{name}");
        assert!(recent.notice.is_some(), "{name}");
        let range = range_for(MetricType::HeartRate, baseline_for("user-9999"));
        for r in &recent.data {
            assert_eq!(r.device_id, SIMULATED_DEVICE);
            assert!(range.contains(r.value));
        }

        let latest = service.latest_by_type("user-9999", &MetricType::ALL).await;
        assert!(latest.is_simulated(), "{name}");
        assert!(latest.data.values().all(Option::is_some), "{name}");
    }
}

#[tokio::test]
async fn test_stored_data_is_live() {
    let now = Utc::now();
    for (name, store) in backends().await {
        store
            .append(vec![record("user-0005", MetricType::Steps, 42.0, now)])
            .await
            .unwrap();
        let service = QueryService::new(store).with_fallback(DemoDataSupplier::default());

        let recent = service.recent("user-0005", None, 20).await;
        assert_eq!(recent.source, DataSource::Live, "{name}");
        assert!(recent.notice.is_none(), "{name}");
        assert_eq!(recent.data.len(), 1, "{name}");

        // Partially populated users are not topped up with simulated values.
        let latest = service.latest_by_type("user-0005", &MetricType::ALL).await;
        assert_eq!(latest.source, DataSource::Live, "{name}");
        assert_eq!(latest.data[&MetricType::Steps].as_ref().unwrap().value, 42.0);
        assert!(latest.data[&MetricType::HeartRate].is_none(), "{name}");
    }
}

#[tokio::test]
async fn test_unreachable_store_falls_back_with_notice() {
    let service = QueryService::new(offline()).with_fallback(DemoDataSupplier::default());

    let recent = service.recent("user-0001", None, 8).await;
    assert!(recent.is_simulated());
    assert_eq!(recent.data.len(), 8);
    assert!(recent.notice.as_deref().unwrap().contains("unavailable"));

    let latest = service.latest_by_type("user-0001", &[MetricType::HeartRate]).await;
    assert!(latest.is_simulated());
    assert_eq!(latest.data.len(), 1);
}

#[tokio::test]
async fn test_unreachable_store_without_fallback_is_empty() {
    let service = QueryService::new(offline());

    let recent = service.recent("user-0001", None, 8).await;
    assert_eq!(recent.source, DataSource::Live);
    assert!(recent.data.is_empty());
    assert!(recent.notice.is_some());

    let latest = service.latest_by_type("user-0001", &MetricType::ALL).await;
    assert_eq!(latest.source, DataSource::Live);
    assert_eq!(latest.data.len(), 4);
    assert!(latest.data.values().all(Option::is_none));
    assert!(latest.notice.is_some());
}

#[tokio::test]
async fn test_stats_never_simulated() {
    let service = QueryService::new(offline()).with_fallback(DemoDataSupplier::default());
    let stats = service.stats().await;
    assert_eq!(stats.source, DataSource::Live);
    assert_eq!(stats.data.total_records, 0);
    assert!(stats.data.oldest_timestamp.is_none());
    assert!(stats.notice.is_some());
}

#[tokio::test]
async fn test_stats_reports_totals_and_ttl() {
    let now = Utc::now();
    for (name, store) in backends().await {
        store
            .append(vec![
                record("user-0001", MetricType::HeartRate, 70.0, now - Duration::hours(3)),
                record("user-0002", MetricType::Steps, 12.0, now),
            ])
            .await
            .unwrap();
        store.ensure_retention(RetentionPolicy::default()).await.unwrap();

        let stats = QueryService::new(store).stats().await;
        assert!(stats.notice.is_none(), "{name}");
        assert_eq!(stats.data.total_records, 2, "{name}");
        assert_eq!(stats.data.per_type[&MetricType::HeartRate], 1, "{name}");
        assert_eq!(stats.data.per_type[&MetricType::ActiveMinutes], 0, "{name}");
        let age = stats.data.oldest_record_age.unwrap();
        assert!(age >= std::time::Duration::from_secs(3 * 3600 - 1), "{name}");
        assert_eq!(
            stats.data.retention_window,
            Some(RetentionPolicy::default().window()),
            "{name}"
        );

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["source"], "live");
        assert_eq!(json["data"]["per_type"]["heart_rate"], 1);
        assert_eq!(json["data"]["retention_window"], 7 * 86_400);
    }
}
