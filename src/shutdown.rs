//! Signal handling for graceful shutdown.
//!
//! The coordinator publishes a single `bool` on a watch channel: `false`
//! while running, `true` once SIGTERM or SIGINT (Ctrl+C) arrives. Long-running
//! loops (ingestion, dashboard watch) hold a receiver and check it between
//! iterations.

use tokio::sync::watch;
use tracing::{info, warn};

pub struct ShutdownCoordinator {
    shutdown_tx: watch::Sender<bool>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    /// The coordinator doesn't listen for signals until `run()` is called.
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self { shutdown_tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Request shutdown programmatically.
    pub fn trigger(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Wait for a shutdown signal, then notify every receiver.
    ///
    /// Spawn this as a task. If no signal handler can be installed the task
    /// parks forever instead of dropping the sender, so receivers never see
    /// a spurious shutdown.
    pub async fn run(self) {
        if wait_for_signal().await {
            self.trigger();
            info!("Shutdown requested");
        } else {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> bool {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, initiating graceful shutdown");
            true
        }
        received = wait_for_ctrl_c() => received,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> bool {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> bool {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            true
        }
        Err(e) => {
            warn!("Failed to listen for Ctrl+C: {}", e);
            false
        }
    }
}
