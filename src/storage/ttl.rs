//! Background expiration task backing standing TTL rules.
//!
//! Neither backend has a native document TTL, so each one owns an
//! [`ExpirationTask`] that periodically deletes records older than the
//! installed window. Expired records are therefore gone at most one check
//! interval after they expire.

use crate::error::Result;
use crate::retention::RetentionPolicy;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

/// Handle to a running expiration loop. Dropping it stops the loop.
pub struct ExpirationTask {
    policy_tx: watch::Sender<RetentionPolicy>,
    handle: JoinHandle<()>,
}

impl ExpirationTask {
    /// Spawn the expiration loop.
    ///
    /// `purge` receives the cutoff and returns `None` once the backend it
    /// purges has been dropped, which ends the loop.
    pub fn spawn<F, Fut>(policy: RetentionPolicy, check_interval: Duration, purge: F) -> Self
    where
        F: Fn(DateTime<Utc>) -> Fut + Send + 'static,
        Fut: Future<Output = Option<Result<u64>>> + Send + 'static,
    {
        let (policy_tx, mut policy_rx) = watch::channel(policy);

        let handle = tokio::spawn(async move {
            info!(
                "Starting expiration task: window {:?}, check every {:?}",
                policy.window(),
                check_interval
            );

            let mut interval = time::interval(check_interval);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    changed = policy_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let policy = *policy_rx.borrow_and_update();
                let cutoff = policy.cutoff(Utc::now());
                match purge(cutoff).await {
                    None => break,
                    Some(Ok(0)) => {}
                    Some(Ok(deleted)) => {
                        debug!("Expired {} records older than {}", deleted, cutoff);
                    }
                    Some(Err(e)) => {
                        warn!("Expiration pass failed: {}", e);
                    }
                }
            }

            debug!("Expiration task stopped");
        });

        Self { policy_tx, handle }
    }

    pub fn policy(&self) -> RetentionPolicy {
        *self.policy_tx.borrow()
    }

    /// Swap the active window; the loop runs a pass with it immediately.
    pub fn update(&self, policy: RetentionPolicy) {
        self.policy_tx.send_replace(policy);
    }
}

impl Drop for ExpirationTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
