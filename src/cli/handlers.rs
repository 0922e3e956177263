use crate::{
    cli::commands::{
        ImportCommand, IngestCommand, LatestCommand, PurgeCommand, RecentCommand,
        RetentionCommand, SeedCommand, StatusCommand, WatchCommand,
    },
    config::{Settings, REFRESH_INTERVAL_RANGE},
    dashboard::{self, Dashboard},
    ingest::{import_jsonl, IngestGenerator, StopReason},
    metrics::MetricType,
    query::{DemoDataSupplier, QueryService},
    retention::{RetentionManager, RetentionPolicy},
    shutdown::ShutdownCoordinator,
    storage::{MetricStore, StorageBackendType, TtlChange},
};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

async fn open_store(settings: &Settings) -> Result<Arc<StorageBackendType>> {
    settings
        .open_store()
        .await
        .context("Failed to open metric store")
}

fn query_service(settings: &Settings, store: Arc<StorageBackendType>) -> QueryService {
    let service = QueryService::new(store);
    if settings.dashboard.fallback_enabled {
        service.with_fallback(DemoDataSupplier::default())
    } else {
        service
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

pub async fn handle_ingest(settings: Settings, cmd: IngestCommand) -> Result<()> {
    let store = open_store(&settings).await?;
    let roster = settings
        .ingest
        .roster(cmd.users)
        .context("Failed to load roster")?;
    let generator = IngestGenerator::new(
        store.clone(),
        roster,
        settings.ingest.generator_options(),
    );

    if cmd.seed {
        let seeded = generator
            .seed_history(settings.ingest.seed_window(), settings.ingest.seed_interval())
            .await
            .context("Failed to seed history")?;
        println!("Seeded {} records in {} batches", seeded.records, seeded.batches);
    }

    let coordinator = ShutdownCoordinator::new();
    let shutdown = coordinator.subscribe();
    tokio::spawn(coordinator.run());

    let summary = match cmd.watch {
        Some(user_id) => {
            let view = Dashboard::new(
                query_service(&settings, store),
                user_id,
                settings.ingest.metric_types.clone(),
                settings.dashboard.recent_limit,
                settings.dashboard.refresh_interval(),
            );
            let (summary, frames) = view
                .watch_ingest(&mut io::stdout(), &generator, shutdown, cmd.ticks)
                .await?;
            info!("Dashboard stopped after {} refreshes", frames);
            summary
        }
        None => generator.run(shutdown, cmd.ticks).await,
    };
    println!(
        "Ingested {} records in {} batches ({} rejected) over {:.1}s",
        summary.records,
        summary.batches,
        summary.rejected,
        summary.elapsed.as_secs_f64()
    );

    match summary.stop_reason {
        StopReason::StoreFailure(msg) => anyhow::bail!("Ingestion aborted: {}", msg),
        StopReason::Cancelled | StopReason::TickLimit => Ok(()),
    }
}

pub async fn handle_seed(settings: Settings, cmd: SeedCommand) -> Result<()> {
    let store = open_store(&settings).await?;
    let roster = settings
        .ingest
        .roster(cmd.users)
        .context("Failed to load roster")?;
    let generator = IngestGenerator::new(store, roster, settings.ingest.generator_options());

    let window = cmd
        .window_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| settings.ingest.seed_window());
    let interval = cmd
        .interval_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| settings.ingest.seed_interval());
    if interval.is_zero() {
        anyhow::bail!("--interval-secs must be positive");
    }

    let summary = generator
        .seed_history(window, interval)
        .await
        .context("Failed to seed history")?;
    println!(
        "Seeded {} records in {} batches ({} rejected)",
        summary.records, summary.batches, summary.rejected
    );
    Ok(())
}

pub async fn handle_import(settings: Settings, cmd: ImportCommand) -> Result<()> {
    let store = open_store(&settings).await?;
    let file = File::open(&cmd.file)
        .with_context(|| format!("Failed to open {}", cmd.file.display()))?;

    let summary = import_jsonl(&*store, BufReader::new(file), settings.ingest.batch_size)
        .await
        .context("Import failed")?;
    info!(
        "Imported {} of {} lines from {}",
        summary.inserted,
        summary.lines,
        cmd.file.display()
    );
    println!(
        "Imported {} records ({} rejected) in {} batches",
        summary.inserted, summary.rejected, summary.batches
    );
    Ok(())
}

pub async fn handle_purge(settings: Settings, cmd: PurgeCommand) -> Result<()> {
    // Validate before touching the store.
    RetentionPolicy::from_days(cmd.days)?;

    let store = open_store(&settings).await?;
    let deleted = RetentionManager::new(store).purge_days(cmd.days).await?;
    println!("{}", deleted);
    Ok(())
}

pub async fn handle_retention(settings: Settings, cmd: RetentionCommand) -> Result<()> {
    let policy = match cmd.days {
        Some(days) => RetentionPolicy::from_days(days)?,
        None => settings.retention.policy()?,
    };

    let store = Arc::new(
        settings
            .storage_backend()
            .context("Failed to open metric store")?,
    );
    store
        .init()
        .await
        .context("Failed to initialize metric store")?;

    let change = RetentionManager::new(store)
        .ensure_retention(policy)
        .await
        .context("Failed to install retention rule")?;
    let window_days = policy.window().as_secs() / 86_400;
    match change {
        TtlChange::Installed => println!("Installed TTL rule: {} days", window_days),
        TtlChange::Updated { previous } => println!(
            "Updated TTL rule: {} -> {} days",
            previous.as_secs() / 86_400,
            window_days
        ),
        TtlChange::Unchanged => println!("TTL rule unchanged: {} days", window_days),
    }
    Ok(())
}

pub async fn handle_status(settings: Settings, cmd: StatusCommand) -> Result<()> {
    let store = settings.open_store_for_reads().await;
    let stats = QueryService::new(store).stats().await;
    if cmd.json {
        print_json(&stats)
    } else {
        print!("{}", dashboard::render_stats(&stats));
        Ok(())
    }
}

pub async fn handle_latest(settings: Settings, cmd: LatestCommand) -> Result<()> {
    let store = settings.open_store_for_reads().await;
    let latest = query_service(&settings, store)
        .latest_by_type(&cmd.user_id, &settings.ingest.metric_types)
        .await;
    if cmd.json {
        print_json(&latest)
    } else {
        print!("{}", dashboard::render_latest(&cmd.user_id, &latest, Utc::now()));
        Ok(())
    }
}

pub async fn handle_recent(settings: Settings, cmd: RecentCommand) -> Result<()> {
    let metric_type = cmd
        .metric
        .as_deref()
        .map(str::parse::<MetricType>)
        .transpose()?;
    let limit = cmd.limit.unwrap_or(settings.dashboard.recent_limit);

    let store = settings.open_store_for_reads().await;
    let recent = query_service(&settings, store)
        .recent(&cmd.user_id, metric_type, limit)
        .await;
    if cmd.json {
        print_json(&recent)
    } else {
        print!("{}", dashboard::render_recent(&cmd.user_id, &recent));
        Ok(())
    }
}

pub async fn handle_watch(settings: Settings, cmd: WatchCommand) -> Result<()> {
    let refresh_secs = cmd
        .interval
        .unwrap_or(settings.dashboard.refresh_interval_secs);
    if !REFRESH_INTERVAL_RANGE.contains(&refresh_secs) {
        anyhow::bail!(
            "Refresh interval must be within {}..={} seconds",
            REFRESH_INTERVAL_RANGE.start(),
            REFRESH_INTERVAL_RANGE.end()
        );
    }

    let store = settings.open_store_for_reads().await;
    let view = Dashboard::new(
        query_service(&settings, store),
        cmd.user_id,
        settings.ingest.metric_types.clone(),
        settings.dashboard.recent_limit,
        Duration::from_secs(refresh_secs),
    );

    let coordinator = ShutdownCoordinator::new();
    let shutdown = coordinator.subscribe();
    tokio::spawn(coordinator.run());

    let frames = view.watch(&mut io::stdout(), shutdown, None).await?;
    info!("Dashboard stopped after {} refreshes", frames);
    Ok(())
}
