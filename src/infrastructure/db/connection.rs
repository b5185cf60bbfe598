use crate::application::use_cases::sql_validator::split_statements;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::DatabaseConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{error, info};

const TEXT2SQL_SCHEMA: &str = include_str!("../../../resources/text2sql/schema.sql");

pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let options = config.connect_options()?;

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect_with(options)
        .await
        .map_err(|e| {
            error!("Failed to connect to PostgreSQL: {}", e);
            AppError::DatabaseError(format!("Failed to connect to PostgreSQL: {}", e))
        })
}

/// Creates the pipeline tables when missing. Safe to run on every start.
pub async fn init_db(pool: &PgPool) -> Result<()> {
    apply_schema(pool).await?;

    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Database health check failed: {}", e)))?;

    info!("Text2SQL schema ready");
    Ok(())
}

async fn apply_schema(pool: &PgPool) -> Result<()> {
    for statement in schema_statements() {
        sqlx::query(&statement)
            .execute(pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to apply schema statement: {}", e))
            })?;
    }
    Ok(())
}

fn schema_statements() -> Vec<String> {
    split_statements(TEXT2SQL_SCHEMA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_are_idempotent_ddl() {
        let statements = schema_statements();
        assert_eq!(statements.len(), 8);
        for statement in &statements {
            let upper = statement.to_uppercase();
            assert!(
                upper.starts_with("CREATE TABLE IF NOT EXISTS")
                    || upper.starts_with("CREATE INDEX IF NOT EXISTS")
                    || upper.starts_with("CREATE UNIQUE INDEX IF NOT EXISTS"),
                "not idempotent: {}",
                statement
            );
        }
    }

    #[test]
    fn test_schema_comments_are_not_statements() {
        assert!(schema_statements()
            .iter()
            .all(|s| !s.trim_start().starts_with("--")));
    }
}
