//! Synthetic stand-in data for when the store has nothing to show.
//!
//! Values follow the same per-user ranges as the ingestion generator but are
//! drawn fresh on every call and never persisted. Callers wrap them in
//! [`super::Sourced`] with [`super::DataSource::Simulated`].

use crate::metrics::{baseline_for, range_for, MetricRecord, MetricType};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

/// Device id carried by every synthesized record.
pub const SIMULATED_DEVICE: &str = "simulated";

#[derive(Debug, Clone)]
pub struct DemoDataSupplier {
    /// Spacing between points of a synthesized trend
    sample_spacing: Duration,
}

impl Default for DemoDataSupplier {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl DemoDataSupplier {
    pub fn new(sample_spacing: Duration) -> Self {
        Self { sample_spacing }
    }

    fn synthesize(&self, user_id: &str, metric_type: MetricType, at: DateTime<Utc>) -> MetricRecord {
        let range = range_for(metric_type, baseline_for(user_id));
        let value = range.sample(&mut rand::thread_rng());
        MetricRecord::new(
            user_id,
            metric_type,
            value,
            at,
            SIMULATED_DEVICE,
            format!("simulated-{}", user_id),
        )
    }

    /// One synthesized "latest" record per requested type.
    pub fn latest(
        &self,
        user_id: &str,
        metric_types: &[MetricType],
    ) -> BTreeMap<MetricType, Option<MetricRecord>> {
        let now = Utc::now();
        metric_types
            .iter()
            .map(|metric_type| (*metric_type, Some(self.synthesize(user_id, *metric_type, now))))
            .collect()
    }

    /// A synthesized trend of `limit` points, newest first.
    ///
    /// Without a metric type the types are interleaved, one per step.
    pub fn recent(
        &self,
        user_id: &str,
        metric_type: Option<MetricType>,
        limit: usize,
    ) -> Vec<MetricRecord> {
        let now = Utc::now();
        let spacing = chrono::Duration::from_std(self.sample_spacing)
            .unwrap_or_else(|_| chrono::Duration::seconds(1));

        (0..limit)
            .map(|step| {
                let metric_type =
                    metric_type.unwrap_or(MetricType::ALL[step % MetricType::ALL.len()]);
                let at = now - spacing * i32::try_from(step).unwrap_or(i32::MAX);
                self.synthesize(user_id, metric_type, at)
            })
            .collect()
    }
}
