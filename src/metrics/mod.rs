//! Sensor metric records.
//!
//! A [`MetricRecord`] is one timestamped observation for one user and one
//! [`MetricType`]. Records are immutable once written: stores only ever
//! append, read or delete them whole.

pub mod ranges;

use crate::error::{Error, Result};
use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use ranges::{baseline_for, range_for, MetricRange};

/// The closed set of sensor metrics a deployment understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// Beats per minute
    HeartRate,
    /// Steps taken during the sampling interval
    Steps,
    /// Kilocalories burned during the sampling interval
    CaloriesBurned,
    /// Active minutes
    ActiveMinutes,
}

impl MetricType {
    pub const ALL: [MetricType; 4] = [
        MetricType::HeartRate,
        MetricType::Steps,
        MetricType::CaloriesBurned,
        MetricType::ActiveMinutes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::HeartRate => "heart_rate",
            MetricType::Steps => "steps",
            MetricType::CaloriesBurned => "calories_burned",
            MetricType::ActiveMinutes => "active_minutes",
        }
    }

    /// Display unit used by the dashboard.
    pub fn unit(&self) -> &'static str {
        match self {
            MetricType::HeartRate => "bpm",
            MetricType::Steps => "steps",
            MetricType::CaloriesBurned => "kcal",
            MetricType::ActiveMinutes => "min",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "heart_rate" => Ok(MetricType::HeartRate),
            "steps" => Ok(MetricType::Steps),
            "calories_burned" => Ok(MetricType::CaloriesBurned),
            "active_minutes" => Ok(MetricType::ActiveMinutes),
            other => Err(Error::MalformedRecord(format!(
                "unknown metric type '{}'",
                other
            ))),
        }
    }
}

/// A single sensor observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Roster user this observation belongs to
    pub user_id: String,
    /// Which sensor metric was measured
    pub metric_type: MetricType,
    /// Measured value, unit depends on `metric_type`
    pub value: f64,
    /// When the measurement was taken (not when it was stored)
    pub timestamp: DateTime<Utc>,
    /// Provenance: emitting device
    pub device_id: String,
    /// Provenance: emitting session
    pub session_id: String,
}

impl MetricRecord {
    pub fn new(
        user_id: impl Into<String>,
        metric_type: MetricType,
        value: f64,
        timestamp: DateTime<Utc>,
        device_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            metric_type,
            value,
            timestamp: truncate_to_micros(timestamp),
            device_id: device_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Check the fields a store refuses to persist.
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(Error::MalformedRecord("empty user_id".into()));
        }
        if !self.value.is_finite() {
            return Err(Error::MalformedRecord(format!(
                "non-finite value for {} of {}",
                self.metric_type, self.user_id
            )));
        }
        if self.device_id.is_empty() || self.session_id.is_empty() {
            return Err(Error::MalformedRecord(format!(
                "missing provenance on {} record of {}",
                self.metric_type, self.user_id
            )));
        }
        Ok(())
    }

    /// Timestamp as microseconds since the Unix epoch, the storage key precision.
    pub fn timestamp_micros(&self) -> i64 {
        self.timestamp.timestamp_micros()
    }
}

/// Drop sub-microsecond precision so values survive every backend unchanged.
pub fn truncate_to_micros(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.trunc_subsecs(6)
}

/// Convert stored microseconds back into a UTC instant.
pub fn timestamp_from_micros(micros: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_micros(micros)
        .single()
        .ok_or_else(|| Error::Storage(format!("timestamp out of range: {}", micros)))
}

/// Loosely-typed record as it arrives from an external feed or import file.
///
/// Every field is optional so that a bad line can be reported instead of
/// failing the whole import.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMetricRecord {
    pub user_id: Option<String>,
    pub metric_type: Option<String>,
    pub value: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub device_id: Option<String>,
    pub session_id: Option<String>,
}

impl TryFrom<RawMetricRecord> for MetricRecord {
    type Error = Error;

    fn try_from(raw: RawMetricRecord) -> Result<Self> {
        let user_id = raw
            .user_id
            .ok_or_else(|| Error::MalformedRecord("missing user_id".into()))?;
        let metric_type = raw
            .metric_type
            .ok_or_else(|| Error::MalformedRecord("missing metric_type".into()))?
            .parse::<MetricType>()?;
        let value = raw
            .value
            .ok_or_else(|| Error::MalformedRecord("missing value".into()))?;
        let timestamp = raw
            .timestamp
            .ok_or_else(|| Error::MalformedRecord("missing timestamp".into()))?;

        let record = MetricRecord {
            user_id,
            metric_type,
            value,
            timestamp: truncate_to_micros(timestamp),
            device_id: raw.device_id.unwrap_or_else(|| "unknown".to_string()),
            session_id: raw.session_id.unwrap_or_else(|| "unknown".to_string()),
        };
        record.validate()?;
        Ok(record)
    }
}
