use crate::error::{Error, Result};
use crate::metrics::{timestamp_from_micros, MetricRecord, MetricType};
use crate::retention::RetentionPolicy;
use crate::storage::ttl::ExpirationTask;
use crate::storage::{
    empty_type_counts, partition_valid, AppendOutcome, MetricStore, TtlChange,
    DEFAULT_TTL_CHECK_INTERVAL,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{params, Config, Connection};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

const SELECT_COLUMNS: &str =
    "user_id, metric_type, value, recorded_at_us, device_id, session_id";

const DEFAULT_RULE: &str = "default";

type RawRow = (String, String, f64, i64, String, String);

fn read_row(row: &duckdb::Row<'_>) -> duckdb::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn into_record(raw: RawRow) -> Result<MetricRecord> {
    let (user_id, metric_type, value, recorded_at_us, device_id, session_id) = raw;
    let metric_type = metric_type
        .parse::<MetricType>()
        .map_err(|e| Error::Storage(format!("Corrupt metric_type column: {e}")))?;

    Ok(MetricRecord {
        user_id,
        metric_type,
        value,
        timestamp: timestamp_from_micros(recorded_at_us)?,
        device_id,
        session_id,
    })
}

/// DuckDB-based metric store.
///
/// One connection behind an async mutex; every write runs in a transaction,
/// so readers see whole records or nothing.
#[derive(Clone)]
pub struct DuckDbBackend {
    conn: Arc<Mutex<Connection>>,
    expiration: Arc<parking_lot::Mutex<Option<ExpirationTask>>>,
    check_interval: Duration,
}

impl DuckDbBackend {
    /// Open (or create) a database. `:memory:` opens a private in-memory database.
    pub fn open(connection_string: &str) -> Result<Self> {
        let conn = if connection_string.is_empty() || connection_string == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open_with_flags(connection_string, Config::default())
        }
        .map_err(|e| {
            Error::StoreUnavailable(format!("cannot open '{connection_string}': {e}"))
        })?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS metric_records (
                user_id VARCHAR NOT NULL,
                metric_type VARCHAR NOT NULL,
                value DOUBLE NOT NULL,
                recorded_at_us BIGINT NOT NULL,
                device_id VARCHAR NOT NULL,
                session_id VARCHAR NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_metric_records_lookup
                ON metric_records(user_id, metric_type, recorded_at_us);
            CREATE INDEX IF NOT EXISTS idx_metric_records_time
                ON metric_records(recorded_at_us);
            CREATE TABLE IF NOT EXISTS retention_policy (
                rule VARCHAR PRIMARY KEY,
                window_secs BIGINT NOT NULL,
                updated_at_us BIGINT NOT NULL
            );
            "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to create tables: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            expiration: Arc::new(parking_lot::Mutex::new(None)),
            check_interval: DEFAULT_TTL_CHECK_INTERVAL,
        })
    }

    pub fn new_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// How often an installed TTL rule purges expired records.
    pub fn with_ttl_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    async fn delete_with(conn: &Mutex<Connection>, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = conn.lock().await;
        let deleted = conn
            .execute(
                "DELETE FROM metric_records WHERE recorded_at_us < ?",
                params![cutoff.timestamp_micros()],
            )
            .map_err(|e| Error::Storage(format!("Failed to delete expired records: {e}")))?;
        Ok(deleted as u64)
    }

    async fn load_policy(&self) -> Result<Option<i64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT window_secs FROM retention_policy WHERE rule = ?")
            .map_err(|e| Error::Storage(format!("Failed to prepare statement: {e}")))?;
        let mut rows = stmt
            .query_map(params![DEFAULT_RULE], |row| row.get::<_, i64>(0))
            .map_err(|e| Error::Storage(format!("Failed to execute query: {e}")))?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    async fn persist_policy(&self, policy: RetentionPolicy) -> Result<()> {
        let window_secs = i64::try_from(policy.window().as_secs()).unwrap_or(i64::MAX);
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO retention_policy (rule, window_secs, updated_at_us) VALUES (?, ?, ?)",
            params![DEFAULT_RULE, window_secs, Utc::now().timestamp_micros()],
        )
        .map_err(|e| Error::Storage(format!("Failed to store retention policy: {e}")))?;
        Ok(())
    }

    fn arm_expiration(&self, policy: RetentionPolicy) -> TtlChange {
        let mut expiration = self.expiration.lock();
        if let Some(task) = expiration.as_ref() {
            if task.policy() == policy {
                return TtlChange::Unchanged;
            }
            let previous = task.policy().window();
            task.update(policy);
            return TtlChange::Updated { previous };
        }

        let conn = Arc::downgrade(&self.conn);
        *expiration = Some(ExpirationTask::spawn(
            policy,
            self.check_interval,
            move |cutoff| {
                let conn = conn.clone();
                async move {
                    let conn = conn.upgrade()?;
                    Some(Self::delete_with(&conn, cutoff).await)
                }
            },
        ));
        TtlChange::Installed
    }
}

#[async_trait]
impl MetricStore for DuckDbBackend {
    async fn init(&self) -> Result<()> {
        // Re-arm a rule persisted by an earlier process.
        if let Some(window_secs) = self.load_policy().await? {
            match u64::try_from(window_secs)
                .map_err(|_| Error::RetentionMisconfiguration(format!("stored window {window_secs}s")))
                .and_then(RetentionPolicy::from_secs)
            {
                Ok(policy) => {
                    info!("Restoring retention rule: {:?}", policy.window());
                    self.arm_expiration(policy);
                }
                Err(e) => warn!("Ignoring stored retention rule: {}", e),
            }
        }
        Ok(())
    }

    async fn append(&self, records: Vec<MetricRecord>) -> Result<AppendOutcome> {
        let (valid, rejected) = partition_valid(records);
        if valid.is_empty() {
            return Ok(AppendOutcome { inserted: 0, rejected });
        }

        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Storage(format!("Failed to start transaction: {e}")))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO metric_records (user_id, metric_type, value, recorded_at_us, device_id, session_id) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .map_err(|e| Error::Storage(format!("Failed to prepare statement: {e}")))?;

            for record in &valid {
                stmt.execute(params![
                    record.user_id,
                    record.metric_type.as_str(),
                    record.value,
                    record.timestamp_micros(),
                    record.device_id,
                    record.session_id,
                ])
                .map_err(|e| Error::Storage(format!("Failed to insert record: {e}")))?;
            }
        }

        tx.commit()
            .map_err(|e| Error::Storage(format!("Failed to commit transaction: {e}")))?;

        Ok(AppendOutcome {
            inserted: valid.len() as u64,
            rejected,
        })
    }

    async fn query_latest_by_type(
        &self,
        user_id: &str,
        metric_types: &[MetricType],
    ) -> Result<BTreeMap<MetricType, Option<MetricRecord>>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM metric_records \
                 WHERE user_id = ? AND metric_type = ? \
                 ORDER BY recorded_at_us DESC LIMIT 1"
            ))
            .map_err(|e| Error::Storage(format!("Failed to prepare statement: {e}")))?;

        let mut latest = BTreeMap::new();
        for metric_type in metric_types {
            let mut rows = stmt
                .query_map(params![user_id, metric_type.as_str()], read_row)
                .map_err(|e| Error::Storage(format!("Failed to execute query: {e}")))?;
            let record = match rows.next() {
                Some(row) => Some(into_record(row?)?),
                None => None,
            };
            latest.insert(*metric_type, record);
        }

        Ok(latest)
    }

    async fn query_recent(
        &self,
        user_id: &str,
        metric_type: Option<MetricType>,
        limit: usize,
    ) -> Result<Vec<MetricRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().await;
        let raw_rows = match metric_type {
            Some(metric_type) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM metric_records \
                         WHERE user_id = ? AND metric_type = ? \
                         ORDER BY recorded_at_us DESC LIMIT {limit}"
                    ))
                    .map_err(|e| Error::Storage(format!("Failed to prepare statement: {e}")))?;
                let rows = stmt
                    .query_map(params![user_id, metric_type.as_str()], read_row)
                    .map_err(|e| Error::Storage(format!("Failed to execute query: {e}")))?;
                rows.collect::<duckdb::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM metric_records \
                         WHERE user_id = ? \
                         ORDER BY recorded_at_us DESC LIMIT {limit}"
                    ))
                    .map_err(|e| Error::Storage(format!("Failed to prepare statement: {e}")))?;
                let rows = stmt
                    .query_map(params![user_id], read_row)
                    .map_err(|e| Error::Storage(format!("Failed to execute query: {e}")))?;
                rows.collect::<duckdb::Result<Vec<_>>>()?
            }
        };

        raw_rows.into_iter().map(into_record).collect()
    }

    async fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM metric_records", params![], |row| row.get(0))
            .map_err(|e| Error::Storage(format!("Failed to count records: {e}")))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn count_by_type(&self) -> Result<BTreeMap<MetricType, u64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT metric_type, COUNT(*) FROM metric_records GROUP BY metric_type")
            .map_err(|e| Error::Storage(format!("Failed to prepare statement: {e}")))?;
        let rows = stmt
            .query_map(params![], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| Error::Storage(format!("Failed to execute query: {e}")))?;

        let mut counts = empty_type_counts();
        for row in rows {
            let (metric_type, count) = row?;
            let metric_type = metric_type
                .parse::<MetricType>()
                .map_err(|e| Error::Storage(format!("Corrupt metric_type column: {e}")))?;
            counts.insert(metric_type, u64::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }

    async fn oldest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().await;
        let oldest: Option<i64> = conn
            .query_row("SELECT MIN(recorded_at_us) FROM metric_records", params![], |row| {
                row.get(0)
            })
            .map_err(|e| Error::Storage(format!("Failed to read oldest record: {e}")))?;
        oldest.map(timestamp_from_micros).transpose()
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        Self::delete_with(&self.conn, cutoff).await
    }

    async fn ensure_retention(&self, policy: RetentionPolicy) -> Result<TtlChange> {
        if self.retention_window() == Some(policy.window()) {
            return Ok(TtlChange::Unchanged);
        }
        self.persist_policy(policy).await?;
        Ok(self.arm_expiration(policy))
    }

    fn retention_window(&self) -> Option<Duration> {
        self.expiration.lock().as_ref().map(|task| task.policy().window())
    }
}
