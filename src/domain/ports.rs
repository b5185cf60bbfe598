//! Storage contracts the pipeline depends on.
//!
//! The pipeline owns none of this state; implementations live in
//! `infrastructure::db` (PostgreSQL and in-memory).

use crate::domain::error::Result;
use crate::domain::text2sql_entities::{
    ColumnDescription, ExampleStats, QueryExample, QueryExampleInput, QueryHistoryRecord,
    TableDescription, TermMapping,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which tables a schema lookup covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TableScope {
    #[default]
    All,
    Tables(Vec<String>),
}

impl TableScope {
    /// Case-insensitive membership test.
    pub fn includes(&self, table_name: &str) -> bool {
        match self {
            TableScope::All => true,
            TableScope::Tables(tables) => tables.iter().any(|t| t.eq_ignore_ascii_case(table_name)),
        }
    }
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn table_descriptions(&self, scope: &TableScope) -> Result<Vec<TableDescription>>;

    async fn column_descriptions(&self, scope: &TableScope) -> Result<Vec<ColumnDescription>>;

    async fn term_mappings(&self) -> Result<Vec<TermMapping>>;

    /// Case-insensitive lookup on `business_term`.
    async fn find_term(&self, business_term: &str) -> Result<Option<TermMapping>>;

    /// Case-insensitive substring search over the business term, technical
    /// terms, synonyms and description, ordered by business term.
    async fn search_terms(
        &self,
        text: Option<&str>,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TermMapping>>;

    async fn term_categories(&self) -> Result<Vec<String>>;

    async fn column_description(&self, table_name: &str, column_name: &str) -> Result<Option<ColumnDescription>>;
}

#[async_trait]
pub trait ExampleBank: Send + Sync {
    /// Up to `k` embedded examples with the query's dimension, nearest
    /// first by cosine similarity, ties by success_rate desc, usage_count
    /// asc, id asc.
    async fn nearest_examples(&self, query_embedding: &[f32], k: usize) -> Result<Vec<QueryExample>>;

    /// Applies the incremental-mean update as one atomic operation and
    /// returns the stored result.
    async fn record_outcome(&self, example_id: i64, success: bool) -> Result<ExampleStats>;

    async fn get_example(&self, example_id: i64) -> Result<Option<QueryExample>>;

    async fn insert_example(&self, input: &QueryExampleInput) -> Result<i64>;

    /// Case-insensitive substring search over the NL and SQL text, ordered
    /// by success_rate desc then usage_count desc.
    async fn search_examples(
        &self,
        text: Option<&str>,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QueryExample>>;

    async fn categories(&self) -> Result<Vec<String>>;

    /// `(id, natural_language_query)` of examples stored without an embedding.
    async fn examples_missing_embedding(&self) -> Result<Vec<(i64, String)>>;

    async fn set_embedding(&self, example_id: i64, embedding: &[f32]) -> Result<()>;
}

#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn append(&self, record: &QueryHistoryRecord) -> Result<()>;

    async fn recent(&self, limit: usize) -> Result<Vec<QueryHistoryRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_membership_is_case_insensitive() {
        let scope = TableScope::Tables(vec!["Employees".to_string()]);
        assert!(scope.includes("employees"));
        assert!(!scope.includes("departments"));
        assert!(TableScope::All.includes("anything"));
    }
}
