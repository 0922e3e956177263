//! Command-line interface module.
//!
//! This module provides the CLI functionality for:
//! - Running the ingestion generator and seeding history
//! - Importing JSON-lines records
//! - Retention management (TTL rule, manual purge)
//! - Queries and the live dashboard

pub mod commands;
pub mod handlers;

pub use commands::Commands;
pub use handlers::{
    handle_import, handle_ingest, handle_latest, handle_purge, handle_recent, handle_retention,
    handle_seed, handle_status, handle_watch,
};
