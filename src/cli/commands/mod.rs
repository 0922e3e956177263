pub mod ingest;
pub mod query;
pub mod retention;

pub use ingest::{ImportCommand, IngestCommand, SeedCommand};
pub use query::{LatestCommand, RecentCommand, StatusCommand, WatchCommand};
pub use retention::{PurgeCommand, RetentionCommand};

use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the synthetic ingestion generator
    Ingest(IngestCommand),
    /// Seed a window of historical records
    Seed(SeedCommand),
    /// Import records from a JSON-lines file
    Import(ImportCommand),
    /// Delete records older than N days
    Purge(PurgeCommand),
    /// Install or update the standing TTL rule
    Retention(RetentionCommand),
    /// Show store totals, oldest record age and TTL window
    Status(StatusCommand),
    /// Latest value per metric type for a user
    Latest(LatestCommand),
    /// Most recent records for a user
    Recent(RecentCommand),
    /// Live dashboard for a user
    Watch(WatchCommand),
}
