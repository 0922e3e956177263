use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SECS_PER_DAY: u64 = 86_400;

/// Longest window accepted for a retention rule.
pub const MAX_RETENTION_DAYS: u64 = 3650;

/// Default retention window in days.
pub const DEFAULT_RETENTION_DAYS: u64 = 7;

/// A validated retention window.
///
/// Construction fails for zero or oversized windows, so a policy that exists
/// can always be turned into a cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    window: Duration,
}

impl RetentionPolicy {
    pub fn new(window: Duration) -> Result<Self> {
        if window.is_zero() {
            return Err(Error::RetentionMisconfiguration(
                "retention window must be positive".into(),
            ));
        }
        if window > Duration::from_secs(MAX_RETENTION_DAYS * SECS_PER_DAY) {
            return Err(Error::RetentionMisconfiguration(format!(
                "retention window {:?} exceeds {} days",
                window, MAX_RETENTION_DAYS
            )));
        }
        Ok(Self { window })
    }

    /// Policy from an operator-supplied day count.
    pub fn from_days(days: i64) -> Result<Self> {
        if days <= 0 {
            return Err(Error::RetentionMisconfiguration(format!(
                "days to keep must be positive, got {}",
                days
            )));
        }
        let days = u64::try_from(days).map_err(|_| {
            Error::RetentionMisconfiguration(format!("days to keep out of range: {}", days))
        })?;
        Self::new(Duration::from_secs(days.saturating_mul(SECS_PER_DAY)))
    }

    pub fn from_secs(secs: u64) -> Result<Self> {
        Self::new(Duration::from_secs(secs))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records strictly older than the returned instant are expired at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        // The window is bounded by MAX_RETENTION_DAYS, well inside chrono's range.
        match chrono::Duration::from_std(self.window) {
            Ok(window) => now - window,
            Err(_) => DateTime::<Utc>::MIN_UTC,
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(DEFAULT_RETENTION_DAYS * SECS_PER_DAY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_seven_days() {
        assert_eq!(
            RetentionPolicy::default().window(),
            Duration::from_secs(7 * 86_400)
        );
    }

    #[test]
    fn test_rejects_non_positive() {
        assert!(matches!(
            RetentionPolicy::new(Duration::ZERO),
            Err(Error::RetentionMisconfiguration(_))
        ));
        assert!(matches!(
            RetentionPolicy::from_days(0),
            Err(Error::RetentionMisconfiguration(_))
        ));
        assert!(matches!(
            RetentionPolicy::from_days(-3),
            Err(Error::RetentionMisconfiguration(_))
        ));
    }

    #[test]
    fn test_rejects_oversized() {
        assert!(RetentionPolicy::from_days(MAX_RETENTION_DAYS as i64).is_ok());
        assert!(RetentionPolicy::from_days(MAX_RETENTION_DAYS as i64 + 1).is_err());
    }

    #[test]
    fn test_cutoff() {
        let now = Utc::now();
        let policy = RetentionPolicy::from_days(7).unwrap();
        assert_eq!(now - policy.cutoff(now), chrono::Duration::days(7));
    }
}
