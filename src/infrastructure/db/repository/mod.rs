//! PostgreSQL implementation of the storage ports.

use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::DatabaseConfig;
use crate::infrastructure::db::connection::connect_pool;
use sqlx::postgres::PgPool;

mod entities;
mod examples;
mod history;
mod metadata;

pub struct PgText2SqlRepository {
    pool: PgPool,
}

impl PgText2SqlRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        Ok(Self::new(connect_pool(config).await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Row count of one of the pipeline's own tables.
    pub(crate) async fn count_rows(&self, table: SeededTable) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to count {}: {}", table.as_str(), e))
            })
    }
}

/// Tables the seeder fills; keeps the table name out of caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SeededTable {
    TableDescriptions,
    ColumnDescriptions,
    TermMappings,
    QueryExamples,
}

impl SeededTable {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            SeededTable::TableDescriptions => "table_descriptions",
            SeededTable::ColumnDescriptions => "column_descriptions",
            SeededTable::TermMappings => "term_mappings",
            SeededTable::QueryExamples => "query_examples",
        }
    }
}

/// `%text%` for a case-insensitive `LIKE`, with wildcards in the input
/// escaped.
pub(crate) fn like_pattern(text: &str) -> String {
    let escaped = text
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Sales"), "%sales%");
        assert_eq!(like_pattern("100%_off"), "%100\\%\\_off%");
    }
}
