use crate::domain::error::{AppError, Result};
use crate::domain::ports::HistorySink;
use crate::domain::text2sql_entities::QueryHistoryRecord;
use async_trait::async_trait;

use super::entities::QueryHistoryEntity;
use super::PgText2SqlRepository;

#[async_trait]
impl HistorySink for PgText2SqlRepository {
    async fn append(&self, record: &QueryHistoryRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO query_history (
                natural_language_query, generated_sql, execution_success,
                execution_time_ms, result_count, error_message, created_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&record.natural_language_query)
        .bind(&record.generated_sql)
        .bind(record.execution_success)
        .bind(record.execution_time_ms)
        .bind(record.result_count)
        .bind(&record.error_message)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to log query: {}", e)))?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<QueryHistoryRecord>> {
        let rows = sqlx::query_as::<_, QueryHistoryEntity>(
            "SELECT natural_language_query, generated_sql, execution_success,
                    execution_time_ms, result_count, error_message, created_at
             FROM query_history
             ORDER BY created_at DESC, id DESC
             LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to load query history: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}
