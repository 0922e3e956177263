//! Per-user value ranges for synthetic sensor data.
//!
//! Each user gets a stable baseline derived from their identifier and every
//! metric type maps that baseline onto its own inclusive range. Generated
//! values therefore stay plausible and roughly stable per user across calls.

use super::MetricType;
use rand::Rng;

/// Inclusive integer range a metric value is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricRange {
    pub low: u32,
    pub high: u32,
}

impl MetricRange {
    fn new(low: u32, high: u32) -> Self {
        Self {
            low,
            high: high.max(low),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= f64::from(self.low) && value <= f64::from(self.high)
    }

    /// Draw a uniform integer value from the range.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        f64::from(rng.gen_range(self.low..=self.high))
    }
}

/// Numeric suffix of an identifier like `user-0042`.
///
/// Identifiers without trailing digits fall back to the byte sum of the id so
/// the baseline stays deterministic.
fn numeric_suffix(user_id: &str) -> u64 {
    let digits: String = user_id
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    match digits.parse::<u64>() {
        Ok(n) => n,
        Err(_) => user_id.bytes().map(u64::from).sum(),
    }
}

/// Baseline in `[60, 99]` derived from the user identifier.
pub fn baseline_for(user_id: &str) -> u32 {
    // mod 40 keeps the cast lossless
    (numeric_suffix(user_id) % 40) as u32 + 60
}

/// Inclusive value range for `metric_type` given a user baseline.
pub fn range_for(metric_type: MetricType, base: u32) -> MetricRange {
    match metric_type {
        MetricType::HeartRate => MetricRange::new(base, base + 20),
        MetricType::Steps => MetricRange::new(base.saturating_sub(40), base),
        MetricType::CaloriesBurned => MetricRange::new((base / 15).max(1), base / 8),
        MetricType::ActiveMinutes => MetricRange::new((base / 30).max(1), base / 20),
    }
}
