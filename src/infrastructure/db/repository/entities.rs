use crate::domain::text2sql_entities::{
    ColumnDescription, Difficulty, ExampleStats, QueryExample, QueryHistoryRecord,
    TableDescription, TermMapping,
};
use chrono::{DateTime, Utc};

#[derive(sqlx::FromRow)]
pub(super) struct TableDescriptionEntity {
    table_name: String,
    display_name: Option<String>,
    description: Option<String>,
    business_purpose: Option<String>,
    related_tables: Vec<String>,
}

impl From<TableDescriptionEntity> for TableDescription {
    fn from(entity: TableDescriptionEntity) -> Self {
        Self {
            table_name: entity.table_name,
            display_name: entity.display_name,
            description: entity.description,
            business_purpose: entity.business_purpose,
            related_tables: entity.related_tables,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct ColumnDescriptionEntity {
    table_name: String,
    column_name: String,
    display_name: Option<String>,
    description: Option<String>,
    business_meaning: Option<String>,
    data_type: Option<String>,
    is_nullable: Option<bool>,
    is_primary_key: bool,
    example_values: Vec<String>,
    related_columns: Vec<String>,
}

impl From<ColumnDescriptionEntity> for ColumnDescription {
    fn from(entity: ColumnDescriptionEntity) -> Self {
        Self {
            table_name: entity.table_name,
            column_name: entity.column_name,
            display_name: entity.display_name,
            description: entity.description,
            business_meaning: entity.business_meaning,
            data_type: entity.data_type,
            is_nullable: entity.is_nullable,
            is_primary_key: entity.is_primary_key,
            example_values: entity.example_values,
            related_columns: entity.related_columns,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct TermMappingEntity {
    id: i32,
    business_term: String,
    technical_terms: Vec<String>,
    synonyms: Vec<String>,
    category: Option<String>,
    description: Option<String>,
}

impl From<TermMappingEntity> for TermMapping {
    fn from(entity: TermMappingEntity) -> Self {
        Self {
            id: entity.id as i64,
            business_term: entity.business_term,
            technical_terms: entity.technical_terms,
            synonyms: entity.synonyms,
            category: entity.category,
            description: entity.description,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct QueryExampleEntity {
    id: i64,
    natural_language_query: String,
    sql_query: String,
    query_category: Option<String>,
    difficulty: String,
    success_rate: f64,
    usage_count: i64,
    embedding: Option<Vec<f32>>,
    tags: Vec<String>,
}

impl From<QueryExampleEntity> for QueryExample {
    fn from(entity: QueryExampleEntity) -> Self {
        Self {
            id: entity.id,
            natural_language_query: entity.natural_language_query,
            sql_query: entity.sql_query,
            category: entity.query_category,
            difficulty: Difficulty::from(entity.difficulty),
            success_rate: entity.success_rate,
            usage_count: entity.usage_count,
            embedding: entity.embedding,
            tags: entity.tags,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct ExampleStatsEntity {
    id: i64,
    success_rate: f64,
    usage_count: i64,
}

impl From<ExampleStatsEntity> for ExampleStats {
    fn from(entity: ExampleStatsEntity) -> Self {
        Self {
            example_id: entity.id,
            success_rate: entity.success_rate,
            usage_count: entity.usage_count,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct QueryHistoryEntity {
    natural_language_query: String,
    generated_sql: Option<String>,
    execution_success: bool,
    execution_time_ms: i64,
    result_count: Option<i64>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<QueryHistoryEntity> for QueryHistoryRecord {
    fn from(entity: QueryHistoryEntity) -> Self {
        Self {
            natural_language_query: entity.natural_language_query,
            generated_sql: entity.generated_sql,
            execution_success: entity.execution_success,
            execution_time_ms: entity.execution_time_ms,
            result_count: entity.result_count,
            error_message: entity.error_message,
            created_at: entity.created_at,
        }
    }
}
