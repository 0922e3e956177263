//! pulsestream binary.
//!
//! Entry point for the fitness metrics store: ingestion, retention and
//! dashboard queries over a DuckDB or in-memory backend.

use anyhow::{Context, Result};
use clap::Parser;
use pulsestream_core::{
    cli::{self, Commands},
    config::{ConfigArgs, LoggingSettings, Settings},
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Install the global subscriber. The returned guard must outlive `main`'s work.
fn init_logging(logging: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let directives = match &logging.filter {
        Some(filter) => format!("{},{}", logging.level, filter),
        None => logging.level.clone(),
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::builder().parse_lossy(&directives));

    match &logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .context("logging.file must name a file")?;
            let file_appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .init();

            info!("File logging enabled to {}", path.display());
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(&cli.config).context("Failed to load configuration")?;
    settings
        .validate()
        .context("Configuration validation failed")?;

    let _log_guard = init_logging(&settings.logging)?;
    info!("pulsestream v{} starting up", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Ingest(cmd) => cli::handle_ingest(settings, cmd).await,
        Commands::Seed(cmd) => cli::handle_seed(settings, cmd).await,
        Commands::Import(cmd) => cli::handle_import(settings, cmd).await,
        Commands::Purge(cmd) => cli::handle_purge(settings, cmd).await,
        Commands::Retention(cmd) => cli::handle_retention(settings, cmd).await,
        Commands::Status(cmd) => cli::handle_status(settings, cmd).await,
        Commands::Latest(cmd) => cli::handle_latest(settings, cmd).await,
        Commands::Recent(cmd) => cli::handle_recent(settings, cmd).await,
        Commands::Watch(cmd) => cli::handle_watch(settings, cmd).await,
    }
}
