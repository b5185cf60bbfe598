use crate::domain::error::{AppError, Result};
use crate::domain::ports::{MetadataStore, TableScope};
use crate::domain::text2sql_entities::{ColumnDescription, TableDescription, TermMapping};
use async_trait::async_trait;

use super::entities::{ColumnDescriptionEntity, TableDescriptionEntity, TermMappingEntity};
use super::{like_pattern, PgText2SqlRepository};

/// Lowercased table list for `= ANY($1)`, or `None` for every table.
fn scope_filter(scope: &TableScope) -> Option<Vec<String>> {
    match scope {
        TableScope::All => None,
        TableScope::Tables(tables) => Some(tables.iter().map(|t| t.to_lowercase()).collect()),
    }
}

const TERM_COLUMNS: &str = "id, business_term, technical_terms, synonyms, category, description";

impl PgText2SqlRepository {
    pub async fn upsert_table_description(&self, table: &TableDescription) -> Result<()> {
        sqlx::query(
            "INSERT INTO table_descriptions (table_name, display_name, description, business_purpose, related_tables)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (table_name) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                description = EXCLUDED.description,
                business_purpose = EXCLUDED.business_purpose,
                related_tables = EXCLUDED.related_tables,
                updated_at = NOW()",
        )
        .bind(&table.table_name)
        .bind(&table.display_name)
        .bind(&table.description)
        .bind(&table.business_purpose)
        .bind(&table.related_tables)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to save table description: {}", e)))?;
        Ok(())
    }

    pub async fn upsert_column_description(&self, column: &ColumnDescription) -> Result<()> {
        sqlx::query(
            "INSERT INTO column_descriptions (
                table_name, column_name, display_name, description, business_meaning,
                data_type, is_nullable, is_primary_key, example_values, related_columns
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (table_name, column_name) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                description = EXCLUDED.description,
                business_meaning = EXCLUDED.business_meaning,
                data_type = EXCLUDED.data_type,
                is_nullable = EXCLUDED.is_nullable,
                is_primary_key = EXCLUDED.is_primary_key,
                example_values = EXCLUDED.example_values,
                related_columns = EXCLUDED.related_columns,
                updated_at = NOW()",
        )
        .bind(&column.table_name)
        .bind(&column.column_name)
        .bind(&column.display_name)
        .bind(&column.description)
        .bind(&column.business_meaning)
        .bind(&column.data_type)
        .bind(column.is_nullable)
        .bind(column.is_primary_key)
        .bind(&column.example_values)
        .bind(&column.related_columns)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to save column description: {}", e)))?;
        Ok(())
    }

    pub async fn insert_term_mapping(&self, mapping: &TermMapping) -> Result<i64> {
        mapping.check()?;
        let id: i32 = sqlx::query_scalar(
            "INSERT INTO term_mappings (business_term, technical_terms, synonyms, category, description)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(&mapping.business_term)
        .bind(&mapping.technical_terms)
        .bind(&mapping.synonyms)
        .bind(&mapping.category)
        .bind(&mapping.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert term mapping: {}", e)))?;
        Ok(id as i64)
    }
}

#[async_trait]
impl MetadataStore for PgText2SqlRepository {
    async fn table_descriptions(&self, scope: &TableScope) -> Result<Vec<TableDescription>> {
        let rows = sqlx::query_as::<_, TableDescriptionEntity>(
            "SELECT table_name, display_name, description, business_purpose, related_tables
             FROM table_descriptions
             WHERE $1::text[] IS NULL OR LOWER(table_name) = ANY($1)
             ORDER BY table_name",
        )
        .bind(scope_filter(scope))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to load table descriptions: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    /// Physical type, nullability and primary-key flags come from the live
    /// catalog when the table exists there, otherwise from the stored
    /// description.
    async fn column_descriptions(&self, scope: &TableScope) -> Result<Vec<ColumnDescription>> {
        let rows = sqlx::query_as::<_, ColumnDescriptionEntity>(
            "SELECT
                cd.table_name,
                cd.column_name,
                cd.display_name,
                cd.description,
                cd.business_meaning,
                COALESCE(c.data_type::text, cd.data_type) AS data_type,
                COALESCE(c.is_nullable::text = 'YES', cd.is_nullable) AS is_nullable,
                (cd.is_primary_key OR EXISTS (
                    SELECT 1
                    FROM information_schema.table_constraints tc
                    JOIN information_schema.key_column_usage kcu
                      ON tc.constraint_name = kcu.constraint_name
                     AND tc.table_schema = kcu.table_schema
                    WHERE tc.constraint_type = 'PRIMARY KEY'
                      AND kcu.table_schema = 'public'
                      AND kcu.table_name::text = cd.table_name
                      AND kcu.column_name::text = cd.column_name
                )) AS is_primary_key,
                cd.example_values,
                cd.related_columns
             FROM column_descriptions cd
             LEFT JOIN information_schema.columns c
               ON c.table_schema = 'public'
              AND c.table_name::text = cd.table_name
              AND c.column_name::text = cd.column_name
             WHERE $1::text[] IS NULL OR LOWER(cd.table_name) = ANY($1)
             ORDER BY cd.table_name, cd.column_name",
        )
        .bind(scope_filter(scope))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to load column descriptions: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn term_mappings(&self) -> Result<Vec<TermMapping>> {
        let sql = format!(
            "SELECT {} FROM term_mappings ORDER BY business_term",
            TERM_COLUMNS
        );
        let rows = sqlx::query_as::<_, TermMappingEntity>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to load term mappings: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn find_term(&self, business_term: &str) -> Result<Option<TermMapping>> {
        let sql = format!(
            "SELECT {} FROM term_mappings WHERE LOWER(business_term) = LOWER($1)",
            TERM_COLUMNS
        );
        let row = sqlx::query_as::<_, TermMappingEntity>(&sql)
            .bind(business_term.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to look up term: {}", e)))?;

        Ok(row.map(|r| r.into()))
    }

    async fn search_terms(
        &self,
        text: Option<&str>,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TermMapping>> {
        let pattern = text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(like_pattern);
        let sql = format!(
            "SELECT {} FROM term_mappings
             WHERE ($1::text IS NULL
                    OR LOWER(business_term) LIKE $1
                    OR LOWER(array_to_string(technical_terms, ' ')) LIKE $1
                    OR LOWER(array_to_string(synonyms, ' ')) LIKE $1
                    OR LOWER(COALESCE(description, '')) LIKE $1)
               AND ($2::text IS NULL OR LOWER(category) = LOWER($2))
             ORDER BY business_term
             LIMIT $3",
            TERM_COLUMNS
        );
        let rows = sqlx::query_as::<_, TermMappingEntity>(&sql)
            .bind(pattern)
            .bind(category)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to search term mappings: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn term_categories(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM term_mappings
             WHERE category IS NOT NULL
             ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list term categories: {}", e)))
    }

    async fn column_description(&self, table_name: &str, column_name: &str) -> Result<Option<ColumnDescription>> {
        let row = sqlx::query_as::<_, ColumnDescriptionEntity>(
            "SELECT table_name, column_name, display_name, description, business_meaning,
                    data_type, is_nullable, is_primary_key, example_values, related_columns
             FROM column_descriptions
             WHERE LOWER(table_name) = LOWER($1) AND LOWER(column_name) = LOWER($2)",
        )
        .bind(table_name.trim())
        .bind(column_name.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to load column description: {}", e)))?;

        Ok(row.map(|r| r.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_filter_lowercases() {
        assert_eq!(scope_filter(&TableScope::All), None);
        assert_eq!(
            scope_filter(&TableScope::Tables(vec!["Employees".to_string()])),
            Some(vec!["employees".to_string()])
        );
    }
}
