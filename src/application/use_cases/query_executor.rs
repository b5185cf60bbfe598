//! Bounded execution of validated SQL.
//!
//! Each statement runs inside a `READ ONLY` transaction with a
//! transaction-local `statement_timeout`. If the caller drops the future
//! while the statement is in flight, the backend is cancelled with
//! `pg_cancel_backend` instead of being left running.

use super::sql_validator::ValidatedSql;
use crate::domain::error::PipelineError;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgPool, PgRow};
use sqlx::{Column, Connection, Postgres, Row};
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// PostgreSQL `query_canceled`, raised when `statement_timeout` fires.
const QUERY_CANCELED: &str = "57014";

/// Extra client-side wait beyond the server timeout before giving up.
const CLIENT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum RowMode {
    #[default]
    Rows,
    /// Count rows without materializing them.
    CountOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub statement_timeout: Duration,
    /// Rows beyond the cap are discarded and the result flagged truncated.
    pub max_rows: Option<usize>,
    pub mode: RowMode,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            statement_timeout: Duration::from_secs(30),
            max_rows: Some(1000),
            mode: RowMode::Rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, serde_json::Value>>,
    pub row_count: usize,
    /// Set when the row cap cut the result short.
    pub truncated: bool,
    pub execution_time_ms: u64,
}

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Errors are `ExecutionTimeout` or `Execution` carrying the database
    /// message verbatim.
    async fn execute(
        &self,
        sql: &ValidatedSql,
        limits: &ExecutionLimits,
    ) -> Result<QueryResult, PipelineError>;
}

pub struct PgQueryExecutor {
    pool: PgPool,
}

impl PgQueryExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn run(
        &self,
        sql: &ValidatedSql,
        limits: &ExecutionLimits,
    ) -> Result<QueryResult, PipelineError> {
        let started = Instant::now();

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| PipelineError::Execution(format!("Failed to acquire connection: {}", e)))?;

        let pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
            .fetch_one(&mut *conn)
            .await
            .map_err(map_db_error(limits))?;

        let mut guard = CancelOnDrop::new(self.pool.clone(), pid, conn);
        let outcome = match guard.connection() {
            Some(conn) => run_read_only(conn, sql, limits).await,
            None => Err(PipelineError::Execution("Connection already released".to_string())),
        };
        // Completed either way; the connection can go back to the pool.
        guard.release();

        let mut result = outcome?;
        result.execution_time_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }
}

async fn run_read_only(
    conn: &mut PgConnection,
    sql: &ValidatedSql,
    limits: &ExecutionLimits,
) -> Result<QueryResult, PipelineError> {
    let timeout_ms = limits.statement_timeout.as_millis().max(1);

    let mut tx = conn.begin().await.map_err(map_db_error(limits))?;
    sqlx::query("SET TRANSACTION READ ONLY")
        .execute(&mut *tx)
        .await
        .map_err(map_db_error(limits))?;
    sqlx::query(&format!("SET LOCAL statement_timeout = {}", timeout_ms))
        .execute(&mut *tx)
        .await
        .map_err(map_db_error(limits))?;

    let mut collector = RowCollector::new(limits);
    {
        let mut stream = sqlx::query(sql.sql()).fetch(&mut *tx);
        while let Some(row) = stream.try_next().await.map_err(map_db_error(limits))? {
            if !collector.accept_with(|| (column_names(&row), row_to_json(&row))) {
                break;
            }
        }
    }

    if let Err(e) = tx.rollback().await {
        warn!("Rollback of read-only transaction failed: {}", e);
    }

    Ok(collector.finish())
}

/// Folds streamed rows into a `QueryResult` under the row cap and mode.
struct RowCollector {
    mode: RowMode,
    max_rows: Option<usize>,
    result: QueryResult,
}

impl RowCollector {
    fn new(limits: &ExecutionLimits) -> Self {
        Self {
            mode: limits.mode,
            max_rows: limits.max_rows,
            result: QueryResult::default(),
        }
    }

    /// Takes one row, converting it only when it is kept. Returns false once
    /// the cap is exceeded and the stream should stop.
    fn accept_with<F>(&mut self, convert: F) -> bool
    where
        F: FnOnce() -> (Vec<String>, HashMap<String, serde_json::Value>),
    {
        if self.mode == RowMode::CountOnly {
            self.result.row_count += 1;
            return true;
        }
        if self.max_rows.map_or(false, |cap| self.result.rows.len() >= cap) {
            self.result.truncated = true;
            return false;
        }
        let (columns, row) = convert();
        if self.result.columns.is_empty() {
            self.result.columns = columns;
        }
        self.result.rows.push(row);
        true
    }

    fn finish(mut self) -> QueryResult {
        if self.mode == RowMode::Rows {
            self.result.row_count = self.result.rows.len();
        }
        self.result
    }
}

/// Bounds `run` on the client side. The future is dropped on expiry, which
/// fires its cancel guard.
async fn with_client_deadline<F>(limits: &ExecutionLimits, run: F) -> Result<QueryResult, PipelineError>
where
    F: Future<Output = Result<QueryResult, PipelineError>>,
{
    let timeout_ms = limits.statement_timeout.as_millis() as u64;
    tokio::time::timeout(limits.statement_timeout + CLIENT_GRACE, run)
        .await
        .map_err(|_| PipelineError::ExecutionTimeout { timeout_ms })?
}

#[async_trait]
impl SqlExecutor for PgQueryExecutor {
    async fn execute(
        &self,
        sql: &ValidatedSql,
        limits: &ExecutionLimits,
    ) -> Result<QueryResult, PipelineError> {
        // The server-side timeout normally fires first; this bounds a stuck
        // network round trip.
        let result = with_client_deadline(limits, self.run(sql, limits)).await;

        match &result {
            Ok(r) => info!(
                "Executed query: {} rows in {}ms{}",
                r.row_count,
                r.execution_time_ms,
                if r.truncated { " (truncated)" } else { "" }
            ),
            Err(e) => warn!("Query execution failed [{}]: {}", e.kind(), e),
        }
        result
    }
}

fn map_db_error(limits: &ExecutionLimits) -> impl Fn(sqlx::Error) -> PipelineError {
    let timeout_ms = limits.statement_timeout.as_millis() as u64;
    move |e: sqlx::Error| match &e {
        sqlx::Error::Database(db) => classify_database_error(db.code().as_deref(), db.message(), timeout_ms),
        _ => PipelineError::Execution(e.to_string()),
    }
}

/// Server-side cancellation is the statement timeout; every other database
/// error keeps its message verbatim.
fn classify_database_error(code: Option<&str>, message: &str, timeout_ms: u64) -> PipelineError {
    if code == Some(QUERY_CANCELED) {
        return PipelineError::ExecutionTimeout { timeout_ms };
    }
    PipelineError::Execution(message.to_string())
}

/// Owns the connection while a statement runs. Dropped before `release`,
/// it detaches the connection from the pool, cancels its backend and closes
/// it, so a half-finished statement is never handed to another request.
struct CancelOnDrop {
    pool: PgPool,
    pid: i32,
    conn: Option<PoolConnection<Postgres>>,
}

impl CancelOnDrop {
    fn new(pool: PgPool, pid: i32, conn: PoolConnection<Postgres>) -> Self {
        Self {
            pool,
            pid,
            conn: Some(conn),
        }
    }

    fn connection(&mut self) -> Option<&mut PgConnection> {
        self.conn.as_deref_mut()
    }

    fn release(&mut self) {
        self.conn.take();
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let conn = conn.detach();
        let pool = self.pool.clone();
        let pid = self.pid;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match sqlx::query_scalar::<_, bool>("SELECT pg_cancel_backend($1)")
                        .bind(pid)
                        .fetch_one(&pool)
                        .await
                    {
                        Ok(cancelled) => info!("Cancelled abandoned statement on backend {}: {}", pid, cancelled),
                        Err(e) => warn!("Failed to cancel backend {}: {}", pid, e),
                    }
                    if let Err(e) = conn.close().await {
                        debug!("Closing cancelled connection failed: {}", e);
                    }
                });
            }
            Err(_) => warn!("No runtime available to cancel backend {}", pid),
        }
    }
}

fn column_names(row: &PgRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

fn row_to_json(row: &PgRow) -> HashMap<String, serde_json::Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| (column.name().to_string(), extract_column_value(row, i)))
        .collect()
}

/// Maps a column to JSON by trying common PostgreSQL types in turn.
/// Unsupported types come back as null.
fn extract_column_value(row: &PgRow, index: usize) -> serde_json::Value {
    use serde_json::Value;

    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(index) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bigdecimal::BigDecimal>, _>(index) {
        return v.map(|d| decimal_to_json(&d)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(index) {
        return v
            .and_then(|n| serde_json::Number::from_f64(n as f64))
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index) {
        return v
            .map(|dt| Value::String(dt.to_rfc3339()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return v
            .map(|dt| Value::String(dt.to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
        return v
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(index) {
        return v.unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<String>>, _>(index) {
        return v
            .map(|items| Value::Array(items.into_iter().map(Value::String).collect()))
            .unwrap_or(Value::Null);
    }

    Value::Null
}

/// `numeric` becomes a JSON number when it survives the trip through f64,
/// otherwise its exact decimal string.
fn decimal_to_json(value: &bigdecimal::BigDecimal) -> serde_json::Value {
    let text = value.to_string();
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::String(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_decimal_to_json() {
        let avg = bigdecimal::BigDecimal::from_str("6250000.0000000000").unwrap();
        assert_eq!(decimal_to_json(&avg), serde_json::json!(6250000.0));

        let small = bigdecimal::BigDecimal::from_str("0.25").unwrap();
        assert_eq!(decimal_to_json(&small), serde_json::json!(0.25));
    }

    #[test]
    fn test_default_limits() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.statement_timeout, Duration::from_secs(30));
        assert_eq!(limits.max_rows, Some(1000));
        assert_eq!(limits.mode, RowMode::Rows);
    }

    fn limits_with_cap(max_rows: Option<usize>, mode: RowMode) -> ExecutionLimits {
        ExecutionLimits {
            max_rows,
            mode,
            ..ExecutionLimits::default()
        }
    }

    fn collect(count: usize, limits: &ExecutionLimits) -> (QueryResult, usize) {
        let mut collector = RowCollector::new(limits);
        let mut converted = 0;
        for n in 0..count {
            let keep_going = collector.accept_with(|| {
                converted += 1;
                (
                    vec!["n".to_string()],
                    HashMap::from([("n".to_string(), serde_json::json!(n))]),
                )
            });
            if !keep_going {
                break;
            }
        }
        (collector.finish(), converted)
    }

    #[test]
    fn test_row_cap_boundaries() {
        let limits = limits_with_cap(Some(3), RowMode::Rows);

        let (under, _) = collect(2, &limits);
        assert_eq!(under.row_count, 2);
        assert!(!under.truncated);

        let (exact, _) = collect(3, &limits);
        assert_eq!(exact.row_count, 3);
        assert!(!exact.truncated);

        let (over, converted) = collect(4, &limits);
        assert_eq!(over.row_count, 3);
        assert_eq!(over.rows.len(), 3);
        assert!(over.truncated);
        assert_eq!(converted, 3);
        assert_eq!(over.columns, vec!["n".to_string()]);
        assert_eq!(over.rows[2]["n"], serde_json::json!(2));
    }

    #[test]
    fn test_uncapped_rows_are_all_kept() {
        let (result, _) = collect(2500, &limits_with_cap(None, RowMode::Rows));
        assert_eq!(result.row_count, 2500);
        assert!(!result.truncated);
    }

    #[test]
    fn test_count_only_ignores_cap_and_skips_conversion() {
        let (result, converted) = collect(5, &limits_with_cap(Some(2), RowMode::CountOnly));
        assert_eq!(result.row_count, 5);
        assert!(result.rows.is_empty());
        assert!(result.columns.is_empty());
        assert!(!result.truncated);
        assert_eq!(converted, 0);
    }

    #[test]
    fn test_query_canceled_maps_to_timeout() {
        let err = classify_database_error(Some(QUERY_CANCELED), "canceling statement due to statement timeout", 1500);
        assert_eq!(err, PipelineError::ExecutionTimeout { timeout_ms: 1500 });
        assert_eq!(err.kind(), "ExecutionTimeout");
    }

    #[test]
    fn test_other_database_errors_keep_message() {
        let err = classify_database_error(Some("42P01"), r#"relation "nope" does not exist"#, 1500);
        assert_eq!(err, PipelineError::Execution(r#"relation "nope" does not exist"#.to_string()));
        assert_eq!(classify_database_error(None, "boom", 10), PipelineError::Execution("boom".to_string()));
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_deadline_times_out_and_drops_inflight_run() {
        let limits = ExecutionLimits {
            statement_timeout: Duration::from_millis(500),
            ..ExecutionLimits::default()
        };
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        let stuck = async move {
            let _flag = flag;
            std::future::pending::<Result<QueryResult, PipelineError>>().await
        };

        let err = with_client_deadline(&limits, stuck).await.unwrap_err();
        assert_eq!(err, PipelineError::ExecutionTimeout { timeout_ms: 500 });
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_deadline_passes_through_results() {
        let limits = ExecutionLimits::default();
        let ok = with_client_deadline(&limits, async { Ok(QueryResult::default()) }).await;
        assert!(ok.is_ok());
        let err = with_client_deadline(&limits, async {
            Err(PipelineError::Execution("bad".to_string()))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "ExecutionError");
    }

    #[test]
    fn test_client_errors_map_to_execution_error() {
        let limits = ExecutionLimits {
            statement_timeout: Duration::from_millis(1500),
            ..ExecutionLimits::default()
        };
        let err = map_db_error(&limits)(sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), "ExecutionError");
        assert!(matches!(err, PipelineError::Execution(_)));
    }
}
