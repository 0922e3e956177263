//! Terminal dashboard for one user.
//!
//! Each refresh queries the [`QueryService`] for the latest value per metric
//! type and a short recent-history list, renders both as text, then waits for
//! the refresh interval. Renders never overlap. Store failures and simulated
//! data show up as tagged, non-fatal notices.

use crate::error::Result;
use crate::ingest::{IngestGenerator, IngestSummary};
use crate::metrics::{MetricRecord, MetricType};
use crate::query::{LatestByType, QueryService, Sourced, StoreStats};
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::io::Write;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::debug;

fn source_tag<T>(sourced: &Sourced<T>) -> &'static str {
    if sourced.is_simulated() {
        "[SIMULATED]"
    } else {
        "[LIVE]"
    }
}

fn push_notice<T>(out: &mut String, sourced: &Sourced<T>) {
    if let Some(notice) = &sourced.notice {
        let _ = writeln!(out, "  ! {}", notice);
    }
}

fn format_value(record: &MetricRecord) -> String {
    format!("{:.1} {}", record.value, record.metric_type.unit())
}

fn format_age(now: DateTime<Utc>, at: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{}s ago", secs),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}

/// Latest-value panel.
pub fn render_latest(user_id: &str, latest: &Sourced<LatestByType>, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} latest metrics for {}", source_tag(latest), user_id);
    for (metric_type, record) in &latest.data {
        match record {
            Some(record) => {
                let _ = writeln!(
                    out,
                    "  {:<16} {:>14}  {}",
                    metric_type.as_str(),
                    format_value(record),
                    format_age(now, record.timestamp)
                );
            }
            None => {
                let _ = writeln!(out, "  {:<16} {:>14}", metric_type.as_str(), "-");
            }
        }
    }
    push_notice(&mut out, latest);
    out
}

/// Recent-history panel, newest first.
pub fn render_recent(user_id: &str, recent: &Sourced<Vec<MetricRecord>>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} recent records for {}",
        source_tag(recent),
        recent.data.len(),
        user_id
    );
    for record in &recent.data {
        let _ = writeln!(
            out,
            "  {}  {:<16} {:>14}  {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            record.metric_type.as_str(),
            format_value(record),
            record.device_id
        );
    }
    push_notice(&mut out, recent);
    out
}

/// Store status panel.
pub fn render_stats(stats: &Sourced<StoreStats>) -> String {
    let mut out = String::new();
    let data = &stats.data;
    let _ = writeln!(out, "total records:     {}", data.total_records);
    match (data.oldest_timestamp, data.oldest_record_age) {
        (Some(oldest), Some(age)) => {
            let _ = writeln!(out, "oldest record:     {} ({}s old)", oldest, age.as_secs());
        }
        _ => {
            let _ = writeln!(out, "oldest record:     -");
        }
    }
    match data.retention_window {
        Some(window) => {
            let _ = writeln!(
                out,
                "ttl window:        {}d ({}s)",
                window.as_secs() / 86_400,
                window.as_secs()
            );
        }
        None => {
            let _ = writeln!(out, "ttl window:        not installed");
        }
    }
    for (metric_type, count) in &data.per_type {
        let _ = writeln!(out, "  {:<16} {}", metric_type.as_str(), count);
    }
    push_notice(&mut out, stats);
    out
}

pub struct Dashboard {
    queries: QueryService,
    user_id: String,
    metric_types: Vec<MetricType>,
    recent_limit: usize,
    refresh_interval: Duration,
}

impl Dashboard {
    pub fn new(
        queries: QueryService,
        user_id: impl Into<String>,
        metric_types: Vec<MetricType>,
        recent_limit: usize,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            queries,
            user_id: user_id.into(),
            metric_types,
            recent_limit,
            refresh_interval,
        }
    }

    /// Query and render one full frame.
    pub async fn render_frame(&self) -> String {
        let now = Utc::now();
        let latest = self
            .queries
            .latest_by_type(&self.user_id, &self.metric_types)
            .await;
        let recent = self
            .queries
            .recent(&self.user_id, None, self.recent_limit)
            .await;

        let mut frame = format!("== {} ==\n", now.format("%Y-%m-%d %H:%M:%S UTC"));
        frame.push_str(&render_latest(&self.user_id, &latest, now));
        frame.push('\n');
        frame.push_str(&render_recent(&self.user_id, &recent));
        frame
    }

    /// Render-then-wait until `shutdown` flips or `max_frames` are drawn.
    ///
    /// Returns the number of frames written.
    pub async fn watch<W: Write>(
        &self,
        out: &mut W,
        mut shutdown: watch::Receiver<bool>,
        max_frames: Option<u64>,
    ) -> Result<u64> {
        let mut frames = 0u64;
        loop {
            if *shutdown.borrow() || max_frames.is_some_and(|max| frames >= max) {
                break;
            }

            let frame = self.render_frame().await;
            writeln!(out, "{}", frame)?;
            out.flush()?;
            frames += 1;
            debug!("Rendered dashboard frame {} for {}", frames, self.user_id);

            if max_frames.is_some_and(|max| frames >= max) {
                break;
            }
            tokio::select! {
                _ = time::sleep(self.refresh_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        Ok(frames)
    }

    /// Run `generator` and this dashboard side by side until ingestion stops.
    ///
    /// Both share one store, so the dashboard reads the records the generator
    /// appends. `shutdown` stops the generator between ticks; the dashboard
    /// stops once the generator has.
    pub async fn watch_ingest<W: Write>(
        &self,
        out: &mut W,
        generator: &IngestGenerator,
        shutdown: watch::Receiver<bool>,
        max_ticks: Option<u64>,
    ) -> Result<(IngestSummary, u64)> {
        let (done_tx, done_rx) = watch::channel(false);
        let ingest = async {
            let summary = generator.run(shutdown, max_ticks).await;
            done_tx.send_replace(true);
            summary
        };
        let (summary, frames) = tokio::join!(ingest, self.watch(out, done_rx, None));
        Ok((summary, frames?))
    }
}
