//! Configuration management for pulsestream.
//!
//! This module provides configuration handling through multiple sources:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/pulsestream/config.toml`)
//! 3. User-specified configuration file
//! 4. Environment variables (`PULSESTREAM_<SECTION>__<KEY>`)
//! 5. Command-line arguments
//!
//! Configuration options are loaded in order of precedence, with later sources
//! overriding earlier ones.
//!
//! # Environment Variables
//!
//! - `PULSESTREAM_STORAGE__ENGINE` - Storage engine (`duckdb` or `memory`)
//! - `PULSESTREAM_STORAGE__CONNECTION` - DuckDB file path or `:memory:`
//! - `PULSESTREAM_RETENTION__WINDOW_DAYS` - Standing TTL window
//! - `PULSESTREAM_DASHBOARD__REFRESH_INTERVAL_SECS` - Watch loop cadence

use crate::error::{Error, Result};
use crate::ingest::{GeneratorOptions, Roster};
use crate::metrics::MetricType;
use crate::retention::{RetentionManager, RetentionPolicy};
use crate::storage::{MetricStore, StorageBackendType};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Allowed dashboard refresh cadence, in seconds.
pub const REFRESH_INTERVAL_RANGE: std::ops::RangeInclusive<u64> = 5..=30;

/// Configuration overrides shared by every subcommand
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Configuration file path
    #[arg(short, long, global = true, env = "PULSESTREAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Storage engine type (duckdb, memory)
    #[arg(long, global = true)]
    pub engine: Option<String>,

    /// Storage engine connection string
    #[arg(long, global = true)]
    pub connection: Option<String>,

    /// Storage engine options (key=value)
    #[arg(long = "engine-options", global = true)]
    pub engine_options: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub storage: StorageSettings,
    pub retention: RetentionSettings,
    pub ingest: IngestSettings,
    pub dashboard: DashboardSettings,
    pub logging: LoggingSettings,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Storage engine type
    pub engine: String,
    /// Connection string
    pub connection: String,
    /// Engine-specific options
    #[serde(default)]
    pub options: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSettings {
    pub window_days: i64,
    /// Install the standing TTL rule when the store is opened
    #[serde(default = "default_true")]
    pub ttl_enabled: bool,
    pub check_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    pub tick_interval_ms: u64,
    pub roster_size: usize,
    /// JSON roster; a generated roster of `roster_size` users is used when unset
    #[serde(default)]
    pub roster_file: Option<PathBuf>,
    #[serde(default = "default_metric_types")]
    pub metric_types: Vec<MetricType>,
    pub batch_size: usize,
    pub seed_window_secs: u64,
    pub seed_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSettings {
    pub refresh_interval_secs: u64,
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    pub recent_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    /// Extra `EnvFilter` directives, e.g. `pulsestream_core::storage=debug`
    #[serde(default)]
    pub filter: Option<String>,
    /// Also write logs to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_metric_types() -> Vec<MetricType> {
    MetricType::ALL.to_vec()
}

impl Settings {
    /// Load configuration from all sources
    pub fn load(args: &ConfigArgs) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name("/etc/pulsestream/config.toml").required(false));

        // Load user config if specified
        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("PULSESTREAM")
                .prefix_separator("_")
                .separator("__"),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;

        // Override with command line args
        if let Some(engine) = &args.engine {
            settings.storage.engine = engine.clone();
        }
        if let Some(connection) = &args.connection {
            settings.storage.connection = connection.clone();
        }
        for opt in &args.engine_options {
            let (key, value) = opt
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("expected key=value, got {}", opt)))?;
            settings
                .storage
                .options
                .insert(key.to_string(), value.to_string());
        }
        if let Some(level) = &args.log_level {
            settings.logging.level = level.clone();
        }

        Ok(settings)
    }

    /// Reject values the rest of the crate cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !REFRESH_INTERVAL_RANGE.contains(&self.dashboard.refresh_interval_secs) {
            return Err(Error::Config(format!(
                "dashboard.refresh_interval_secs must be within {}..={}, got {}",
                REFRESH_INTERVAL_RANGE.start(),
                REFRESH_INTERVAL_RANGE.end(),
                self.dashboard.refresh_interval_secs
            )));
        }
        if self.dashboard.recent_limit == 0 {
            return Err(Error::Config("dashboard.recent_limit must be positive".into()));
        }
        if self.ingest.tick_interval_ms == 0 {
            return Err(Error::Config("ingest.tick_interval_ms must be positive".into()));
        }
        if self.ingest.batch_size == 0 {
            return Err(Error::Config("ingest.batch_size must be positive".into()));
        }
        if self.ingest.seed_interval_secs == 0 {
            return Err(Error::Config("ingest.seed_interval_secs must be positive".into()));
        }
        if self.ingest.metric_types.is_empty() {
            return Err(Error::Config("ingest.metric_types must not be empty".into()));
        }
        if self.retention.check_interval_secs == 0 {
            return Err(Error::Config(
                "retention.check_interval_secs must be positive".into(),
            ));
        }
        self.retention.policy()?;
        Ok(())
    }

    /// Open the configured storage backend (not yet initialized).
    pub fn storage_backend(&self) -> Result<StorageBackendType> {
        let mut options = self.storage.options.clone();
        options
            .entry("ttl_check_interval_secs".to_string())
            .or_insert_with(|| self.retention.check_interval_secs.to_string());
        StorageBackendType::new_with_options(
            &self.storage.engine,
            &self.storage.connection,
            &options,
        )
    }

    /// Open and initialize the configured store for a write path.
    ///
    /// With `retention.ttl_enabled`, the configured window is installed only
    /// when the store did not re-arm a rule of its own in `init()`. Changing
    /// a stored rule takes an explicit `ensure_retention`.
    pub async fn open_store(&self) -> Result<Arc<StorageBackendType>> {
        let store = Arc::new(self.storage_backend()?);
        store.init().await?;

        if self.retention.ttl_enabled {
            RetentionManager::new(store.clone())
                .ensure_default_retention(self.retention.policy()?)
                .await?;
        }
        Ok(store)
    }

    /// Open the store for a read path, substituting an offline stand-in on failure.
    pub async fn open_store_for_reads(&self) -> Arc<StorageBackendType> {
        let store = match self.storage_backend() {
            Ok(store) => store,
            Err(e) => {
                warn!("Metric store unavailable, continuing without it: {}", e);
                return Arc::new(StorageBackendType::offline_after(e));
            }
        };
        if let Err(e) = store.init().await {
            warn!("Metric store unavailable, continuing without it: {}", e);
            return Arc::new(StorageBackendType::offline_after(e));
        }
        Arc::new(store)
    }
}

impl RetentionSettings {
    pub fn policy(&self) -> Result<RetentionPolicy> {
        RetentionPolicy::from_days(self.window_days)
    }
}

impl IngestSettings {
    pub fn generator_options(&self) -> GeneratorOptions {
        GeneratorOptions {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            metric_types: self.metric_types.clone(),
            batch_size: self.batch_size,
        }
    }

    /// Roster from `roster_file`, or a generated one of `size` users.
    pub fn roster(&self, size: Option<usize>) -> Result<Roster> {
        match &self.roster_file {
            Some(path) => Roster::from_json_file(path),
            None => Ok(Roster::generated(size.unwrap_or(self.roster_size))),
        }
    }

    pub fn seed_window(&self) -> Duration {
        Duration::from_secs(self.seed_window_secs)
    }

    pub fn seed_interval(&self) -> Duration {
        Duration::from_secs(self.seed_interval_secs)
    }
}

impl DashboardSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}
