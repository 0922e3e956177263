//! Ingestion path: synthetic load generator, historical seeding and file import.
//!
//! The generator is one sequential loop. Each tick it builds one record per
//! (roster user, metric type), appends the whole batch in a single store call
//! and logs its throughput. Record synthesis is pure computation; only the
//! append touches the store.

pub mod import;
pub mod roster;

pub use import::{import_jsonl, ImportSummary};
pub use roster::{Roster, RosterEntry};

use crate::error::{Error, Result};
use crate::metrics::{baseline_for, range_for, MetricRecord, MetricType};
use crate::storage::MetricStore;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time;
use tracing::{error, info};

/// Generator tuning knobs.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Nominal duration of one tick of the continuous loop
    pub tick_interval: Duration,
    /// Metric types emitted per user per tick
    pub metric_types: Vec<MetricType>,
    /// Maximum records per append call when seeding
    pub batch_size: usize,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            metric_types: MetricType::ALL.to_vec(),
            batch_size: 2000,
        }
    }
}

/// Throughput of one appended batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchReport {
    pub batch: u64,
    pub records: u64,
    pub rejected: u64,
    pub elapsed: Duration,
    pub records_per_sec: f64,
}

/// Why the continuous loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    TickLimit,
    StoreFailure(String),
}

/// Final counters of a continuous run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub batches: u64,
    pub records: u64,
    pub rejected: u64,
    pub elapsed: Duration,
    pub stop_reason: StopReason,
}

/// Counters of a one-shot historical seed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub batches: u64,
    pub records: u64,
    pub rejected: u64,
}

fn records_per_sec(records: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        records as f64 / secs
    } else {
        records as f64
    }
}

pub struct IngestGenerator {
    store: Arc<dyn MetricStore>,
    roster: Roster,
    options: GeneratorOptions,
    session_id: String,
}

impl IngestGenerator {
    pub fn new(store: Arc<dyn MetricStore>, roster: Roster, options: GeneratorOptions) -> Self {
        let session_id = format!("gen-{:08x}", rand::random::<u32>());
        Self {
            store,
            roster,
            options,
            session_id,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Records emitted per tick.
    pub fn records_per_tick(&self) -> usize {
        self.roster.len() * self.options.metric_types.len()
    }

    fn synthesize<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        user_id: &str,
        metric_type: MetricType,
        at: DateTime<Utc>,
    ) -> MetricRecord {
        let value = range_for(metric_type, baseline_for(user_id)).sample(rng);
        MetricRecord::new(
            user_id,
            metric_type,
            value,
            at,
            format!("sim-{}-{}", metric_type, user_id),
            self.session_id.clone(),
        )
    }

    /// One record per (user, metric type), all stamped `at`.
    pub fn build_batch(&self, at: DateTime<Utc>) -> Vec<MetricRecord> {
        let mut rng = rand::thread_rng();
        let mut batch = Vec::with_capacity(self.records_per_tick());
        for user_id in self.roster.user_ids() {
            for metric_type in &self.options.metric_types {
                batch.push(self.synthesize(&mut rng, user_id, *metric_type, at));
            }
        }
        batch
    }

    /// Build and append a single batch.
    pub async fn tick(&self, batch: u64) -> Result<BatchReport> {
        let started = Instant::now();
        let records = self.build_batch(Utc::now());
        let outcome = self.store.append(records).await?;
        let elapsed = started.elapsed();

        Ok(BatchReport {
            batch,
            records: outcome.inserted,
            rejected: outcome.rejected,
            elapsed,
            records_per_sec: records_per_sec(outcome.inserted, elapsed),
        })
    }

    /// Run ticks until `shutdown` flips to true, the tick limit is reached or
    /// an append fails.
    ///
    /// The stop signal is only honoured between ticks; an in-flight batch is
    /// always completed (or failed) first. A tick whose append overruns the
    /// tick interval is followed immediately by the next one.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
        max_ticks: Option<u64>,
    ) -> IngestSummary {
        let started = Instant::now();
        let mut batches = 0u64;
        let mut records = 0u64;
        let mut rejected = 0u64;

        info!(
            "Starting ingestion: {} users x {} metric types every {:?} (session {})",
            self.roster.len(),
            self.options.metric_types.len(),
            self.options.tick_interval,
            self.session_id
        );

        let stop_reason = loop {
            if *shutdown.borrow() {
                break StopReason::Cancelled;
            }
            if max_ticks.is_some_and(|max| batches >= max) {
                break StopReason::TickLimit;
            }

            let tick_started = Instant::now();
            match self.tick(batches + 1).await {
                Ok(report) => {
                    batches += 1;
                    records += report.records;
                    rejected += report.rejected;
                    info!(
                        batch = report.batch,
                        records = report.records,
                        rejected = report.rejected,
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        "Batch appended: {:.0} records/sec",
                        report.records_per_sec
                    );
                }
                Err(e) => {
                    error!("Batch {} failed, stopping ingestion: {}", batches + 1, e);
                    break StopReason::StoreFailure(e.to_string());
                }
            }

            let remaining = self
                .options
                .tick_interval
                .saturating_sub(tick_started.elapsed());
            if remaining.is_zero() {
                continue;
            }
            tokio::select! {
                _ = time::sleep(remaining) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break StopReason::Cancelled;
                    }
                }
            }
        };

        let summary = IngestSummary {
            batches,
            records,
            rejected,
            elapsed: started.elapsed(),
            stop_reason,
        };
        info!(
            "Ingestion stopped ({:?}): {} batches, {} records, {} rejected in {:?}",
            summary.stop_reason, summary.batches, summary.records, summary.rejected, summary.elapsed
        );
        summary
    }

    /// Seed a historical window ending now.
    ///
    /// Each (user, metric type) gets one record per `interval`, jittered
    /// randomly within the interval but never past the end of the window.
    /// Records are generated and appended `batch_size` at a time, so memory
    /// use does not grow with the window.
    pub async fn seed_history(&self, window: Duration, interval: Duration) -> Result<SeedSummary> {
        let now = Utc::now();
        let window_start = chrono::Duration::from_std(window)
            .ok()
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(|| {
                Error::Config(format!("seed window of {:?} is out of range", window))
            })?;
        let window_us = (now - window_start).num_microseconds().ok_or_else(|| {
            Error::Config(format!("seed window of {:?} is out of range", window))
        })?;
        let interval_us = i64::try_from(interval.as_micros())
            .ok()
            .filter(|us| *us > 0)
            .ok_or_else(|| {
                Error::Config(format!("seed interval of {:?} is out of range", interval))
            })?;

        let steps = (window_us / interval_us).max(1);
        let jitter_us = interval_us.min(window_us).max(1);
        let batch_size = self.options.batch_size.max(1);

        let mut rng = StdRng::from_entropy();
        let mut summary = SeedSummary::default();
        let mut chunk = Vec::new();
        for user_id in self.roster.user_ids() {
            for metric_type in &self.options.metric_types {
                for step in 0..steps {
                    let offset_us = interval_us * step + rng.gen_range(0..jitter_us);
                    let at = window_start + chrono::Duration::microseconds(offset_us);
                    chunk.push(self.synthesize(&mut rng, user_id, *metric_type, at));
                    if chunk.len() >= batch_size {
                        self.append_seed_chunk(std::mem::take(&mut chunk), &mut summary)
                            .await?;
                    }
                }
            }
        }
        if !chunk.is_empty() {
            self.append_seed_chunk(chunk, &mut summary).await?;
        }

        Ok(summary)
    }

    async fn append_seed_chunk(
        &self,
        chunk: Vec<MetricRecord>,
        summary: &mut SeedSummary,
    ) -> Result<()> {
        let started = Instant::now();
        let outcome = self.store.append(chunk).await?;
        summary.batches += 1;
        summary.records += outcome.inserted;
        summary.rejected += outcome.rejected;
        info!(
            "Seed batch {}: {} records ({:.0} records/sec)",
            summary.batches,
            outcome.inserted,
            records_per_sec(outcome.inserted, started.elapsed())
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryBackend;

    #[test]
    fn test_build_batch_shape_and_ranges() {
        let generator = IngestGenerator::new(
            Arc::new(MemoryBackend::new()),
            Roster::generated(5),
            GeneratorOptions::default(),
        );
        let now = Utc::now();
        let batch = generator.build_batch(now);
        assert_eq!(batch.len(), 20);
        for record in &batch {
            let range = range_for(record.metric_type, baseline_for(&record.user_id));
            assert!(range.contains(record.value));
            assert_eq!(record.session_id, generator.session_id());
            record.validate().unwrap();
        }
    }

    #[test]
    fn test_records_per_sec_handles_zero_elapsed() {
        assert_eq!(records_per_sec(10, Duration::ZERO), 10.0);
        assert_eq!(records_per_sec(10, Duration::from_secs(2)), 5.0);
    }
}
