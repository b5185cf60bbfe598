use crate::domain::error::{AppError, Result};
use crate::domain::ports::ExampleBank;
use crate::domain::text2sql_entities::{ExampleStats, QueryExample, QueryExampleInput};
use async_trait::async_trait;
use validator::Validate;

use super::entities::{ExampleStatsEntity, QueryExampleEntity};
use super::{like_pattern, PgText2SqlRepository};

const EXAMPLE_COLUMNS: &str = "id, natural_language_query, sql_query, query_category, difficulty, \
     success_rate, usage_count, embedding, tags";

#[async_trait]
impl ExampleBank for PgText2SqlRepository {
    /// Similarity is computed in the database so only `k` rows travel back.
    /// A zero-length vector scores 0, as it does in process.
    async fn nearest_examples(&self, query_embedding: &[f32], k: usize) -> Result<Vec<QueryExample>> {
        if k == 0 || query_embedding.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM (
                SELECT q.*,
                       COALESCE(
                           (SELECT SUM(p.a::float8 * p.b::float8)
                            FROM unnest(q.embedding, $1::real[]) AS p(a, b))
                           / NULLIF(
                               sqrt((SELECT SUM(u.a::float8 * u.a::float8) FROM unnest(q.embedding) AS u(a)))
                               * sqrt((SELECT SUM(v.b::float8 * v.b::float8) FROM unnest($1::real[]) AS v(b))),
                               0),
                           0) AS similarity
                FROM query_examples q
                WHERE q.embedding IS NOT NULL
                  AND cardinality(q.embedding) = cardinality($1::real[])
             ) ranked
             ORDER BY similarity DESC, success_rate DESC, usage_count ASC, id ASC
             LIMIT $2",
            EXAMPLE_COLUMNS
        );
        let rows = sqlx::query_as::<_, QueryExampleEntity>(&sql)
            .bind(query_embedding)
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to load nearest examples: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    /// One UPDATE evaluates the new mean from the row it locks, so
    /// concurrent outcomes serialize on the row instead of overwriting each
    /// other.
    async fn record_outcome(&self, example_id: i64, success: bool) -> Result<ExampleStats> {
        let observation: f64 = if success { 1.0 } else { 0.0 };
        let row = sqlx::query_as::<_, ExampleStatsEntity>(
            "UPDATE query_examples
             SET success_rate = LEAST(1.0, GREATEST(0.0,
                    (success_rate * usage_count + $2) / (usage_count + 1))),
                 usage_count = usage_count + 1,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING id, success_rate, usage_count",
        )
        .bind(example_id)
        .bind(observation)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update example stats: {}", e)))?;

        row.map(|r| r.into())
            .ok_or_else(|| AppError::NotFound(format!("Example not found: {}", example_id)))
    }

    async fn get_example(&self, example_id: i64) -> Result<Option<QueryExample>> {
        let sql = format!("SELECT {} FROM query_examples WHERE id = $1", EXAMPLE_COLUMNS);
        let row = sqlx::query_as::<_, QueryExampleEntity>(&sql)
            .bind(example_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch example: {}", e)))?;

        Ok(row.map(|r| r.into()))
    }

    async fn insert_example(&self, input: &QueryExampleInput) -> Result<i64> {
        input
            .validate()
            .map_err(|e| AppError::ValidationError(format!("Invalid example: {}", e)))?;

        sqlx::query_scalar::<_, i64>(
            "INSERT INTO query_examples (
                natural_language_query, sql_query, query_category, difficulty, tags, embedding
             )
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(&input.natural_language_query)
        .bind(&input.sql_query)
        .bind(&input.category)
        .bind(input.difficulty.as_str())
        .bind(&input.tags)
        .bind(&input.embedding)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert example: {}", e)))
    }

    async fn search_examples(
        &self,
        text: Option<&str>,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QueryExample>> {
        let pattern = text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(like_pattern);
        let sql = format!(
            "SELECT {} FROM query_examples
             WHERE ($1::text IS NULL
                    OR LOWER(natural_language_query) LIKE $1
                    OR LOWER(sql_query) LIKE $1)
               AND ($2::text IS NULL OR LOWER(query_category) = LOWER($2))
             ORDER BY success_rate DESC, usage_count DESC, id ASC
             LIMIT $3",
            EXAMPLE_COLUMNS
        );
        let rows = sqlx::query_as::<_, QueryExampleEntity>(&sql)
            .bind(pattern)
            .bind(category)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to search examples: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn categories(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT query_category FROM query_examples
             WHERE query_category IS NOT NULL
             ORDER BY query_category",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list categories: {}", e)))
    }

    async fn examples_missing_embedding(&self) -> Result<Vec<(i64, String)>> {
        sqlx::query_as::<_, (i64, String)>(
            "SELECT id, natural_language_query FROM query_examples
             WHERE embedding IS NULL
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to list examples without embeddings: {}", e))
        })
    }

    async fn set_embedding(&self, example_id: i64, embedding: &[f32]) -> Result<()> {
        let result = sqlx::query(
            "UPDATE query_examples SET embedding = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(example_id)
        .bind(embedding.to_vec())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to store embedding: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Example not found: {}", example_id)));
        }
        Ok(())
    }
}
