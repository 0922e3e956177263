//! Retention management for stored metric records.
//!
//! Two mechanisms coexist:
//! - a standing TTL rule installed in the store with [`RetentionManager::ensure_retention`]
//! - an on-demand sweep ([`RetentionManager::sweep`], [`RetentionManager::purge_days`])
//!
//! A sweep after the TTL rule has already reclaimed records simply finds
//! fewer (or zero) records to delete.

pub mod policy;

pub use policy::{RetentionPolicy, DEFAULT_RETENTION_DAYS, MAX_RETENTION_DAYS};

use crate::error::Result;
use crate::storage::{MetricStore, TtlChange};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Lifecycle of the standing expiration rule for one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionState {
    Uninitialized,
    TtlInstalled { window: Duration },
}

/// Outcome of an on-demand sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub cutoff: DateTime<Utc>,
    pub deleted: u64,
}

pub struct RetentionManager {
    store: Arc<dyn MetricStore>,
    state: Mutex<RetentionState>,
}

impl RetentionManager {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        let state = match store.retention_window() {
            Some(window) => RetentionState::TtlInstalled { window },
            None => RetentionState::Uninitialized,
        };
        Self {
            store,
            state: Mutex::new(state),
        }
    }

    pub fn state(&self) -> RetentionState {
        *self.state.lock()
    }

    /// Install or update the store's standing TTL rule.
    ///
    /// Repeating the call with the same window is a no-op.
    pub async fn ensure_retention(&self, policy: RetentionPolicy) -> Result<TtlChange> {
        let change = self.store.ensure_retention(policy).await?;
        match change {
            TtlChange::Installed => info!("Installed retention rule: {:?}", policy.window()),
            TtlChange::Updated { previous } => info!(
                "Updated retention rule: {:?} -> {:?}",
                previous,
                policy.window()
            ),
            TtlChange::Unchanged => {}
        }

        *self.state.lock() = RetentionState::TtlInstalled {
            window: policy.window(),
        };
        Ok(change)
    }

    /// Install `policy` only when the store has no standing rule yet.
    ///
    /// A rule the store already armed in `init()` wins over `policy`.
    pub async fn ensure_default_retention(&self, policy: RetentionPolicy) -> Result<TtlChange> {
        let Some(window) = self.store.retention_window() else {
            return self.ensure_retention(policy).await;
        };
        if window != policy.window() {
            info!(
                "Keeping stored retention rule {:?} over configured default {:?}",
                window,
                policy.window()
            );
        }
        *self.state.lock() = RetentionState::TtlInstalled { window };
        Ok(TtlChange::Unchanged)
    }

    /// Delete records older than `policy`'s window as of now.
    ///
    /// Store failures are logged and reported as zero deletions.
    pub async fn sweep(&self, policy: RetentionPolicy) -> SweepReport {
        let cutoff = policy.cutoff(Utc::now());
        let deleted = match self.store.delete_older_than(cutoff).await {
            Ok(deleted) => {
                info!("Swept {} records older than {}", deleted, cutoff);
                deleted
            }
            Err(e) => {
                warn!("Retention sweep failed, nothing deleted: {}", e);
                0
            }
        };
        SweepReport { cutoff, deleted }
    }

    /// Operator purge entry point: keep `days_to_keep` days, return the deleted count.
    ///
    /// Non-positive day counts fail before the store is touched.
    pub async fn purge_days(&self, days_to_keep: i64) -> Result<u64> {
        let policy = RetentionPolicy::from_days(days_to_keep)?;
        Ok(self.sweep(policy).await.deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::memory::MemoryBackend;

    #[tokio::test]
    async fn test_state_transitions() {
        let manager = RetentionManager::new(Arc::new(MemoryBackend::new()));
        assert_eq!(manager.state(), RetentionState::Uninitialized);

        let week = RetentionPolicy::default();
        assert_eq!(manager.ensure_retention(week).await.unwrap(), TtlChange::Installed);
        assert_eq!(manager.ensure_retention(week).await.unwrap(), TtlChange::Unchanged);
        assert_eq!(
            manager.state(),
            RetentionState::TtlInstalled {
                window: week.window()
            }
        );

        let day = RetentionPolicy::from_days(1).unwrap();
        assert_eq!(
            manager.ensure_retention(day).await.unwrap(),
            TtlChange::Updated {
                previous: week.window()
            }
        );
    }

    #[tokio::test]
    async fn test_default_retention_defers_to_armed_rule() {
        let store = Arc::new(MemoryBackend::new());
        let week = RetentionPolicy::default();
        let month = RetentionPolicy::from_days(30).unwrap();

        let manager = RetentionManager::new(store.clone());
        assert_eq!(
            manager.ensure_default_retention(week).await.unwrap(),
            TtlChange::Installed
        );
        manager.ensure_retention(month).await.unwrap();

        let reopened = RetentionManager::new(store.clone());
        assert_eq!(
            reopened.ensure_default_retention(week).await.unwrap(),
            TtlChange::Unchanged
        );
        assert_eq!(store.retention_window(), Some(month.window()));
        assert_eq!(
            reopened.state(),
            RetentionState::TtlInstalled {
                window: month.window()
            }
        );
    }

    #[tokio::test]
    async fn test_purge_rejects_non_positive_days() {
        let manager = RetentionManager::new(Arc::new(MemoryBackend::new()));
        assert!(matches!(
            manager.purge_days(0).await,
            Err(Error::RetentionMisconfiguration(_))
        ));
        assert!(matches!(
            manager.purge_days(-1).await,
            Err(Error::RetentionMisconfiguration(_))
        ));
    }
}
