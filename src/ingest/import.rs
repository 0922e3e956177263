//! Batch import of newline-delimited JSON metric records.
//!
//! Each non-blank line is one [`RawMetricRecord`]. Lines that fail to decode
//! or validate are counted as rejected and skipped; everything else is
//! appended in chunks of `batch_size`.

use crate::error::Result;
use crate::metrics::{MetricRecord, RawMetricRecord};
use crate::storage::MetricStore;
use std::io::BufRead;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Non-blank lines read
    pub lines: u64,
    pub inserted: u64,
    pub rejected: u64,
    pub batches: u64,
}

fn decode_line(line: &str) -> Result<MetricRecord> {
    let raw: RawMetricRecord = serde_json::from_str(line)?;
    MetricRecord::try_from(raw)
}

async fn flush(
    store: &dyn MetricStore,
    pending: &mut Vec<MetricRecord>,
    summary: &mut ImportSummary,
) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let outcome = store.append(std::mem::take(pending)).await?;
    summary.batches += 1;
    summary.inserted += outcome.inserted;
    summary.rejected += outcome.rejected;
    debug!("Imported batch {}: {} records", summary.batches, outcome.inserted);
    Ok(())
}

/// Stream `reader` into `store`. Read and store failures abort the import.
pub async fn import_jsonl<R: BufRead>(
    store: &dyn MetricStore,
    reader: R,
    batch_size: usize,
) -> Result<ImportSummary> {
    let batch_size = batch_size.max(1);
    let mut summary = ImportSummary::default();
    let mut pending = Vec::with_capacity(batch_size);

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.lines += 1;

        match decode_line(line) {
            Ok(record) => pending.push(record),
            Err(e) => {
                warn!("Skipping line {}: {}", index + 1, e);
                summary.rejected += 1;
            }
        }

        if pending.len() >= batch_size {
            flush(store, &mut pending, &mut summary).await?;
        }
    }
    flush(store, &mut pending, &mut summary).await?;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryBackend;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_import_skips_bad_lines() {
        let input = r#"{"user_id":"user-0001","metric_type":"heart_rate","value":72.0,"timestamp":"2024-05-01T10:00:00Z","device_id":"band-1","session_id":"s-1"}

{"user_id":"user-0001","metric_type":"steps","value":12.0,"timestamp":"2024-05-01T10:00:01Z"}
{"user_id":"user-0001","metric_type":"sleep_hours","value":7.0,"timestamp":"2024-05-01T10:00:02Z"}
not json
{"metric_type":"steps","value":3.0,"timestamp":"2024-05-01T10:00:03Z"}
"#;
        let store = MemoryBackend::new();
        let summary = import_jsonl(&store, Cursor::new(input), 1).await.unwrap();

        assert_eq!(summary.lines, 5);
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.rejected, 3);
        assert_eq!(summary.batches, 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
