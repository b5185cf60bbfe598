//! Process-local stores implementing the storage ports.
//!
//! Used by the test suite and for running the pipeline without a database.
//! Each store can be switched to "unavailable" to simulate an outage.

use crate::application::use_cases::example_retriever::rank_examples;
use crate::application::use_cases::feedback_updater::incremental_mean;
use crate::domain::error::{AppError, Result};
use crate::domain::ports::{ExampleBank, HistorySink, MetadataStore, TableScope};
use crate::domain::text2sql_entities::{
    ColumnDescription, ExampleStats, QueryExample, QueryExampleInput, QueryHistoryRecord,
    TableDescription, TermMapping,
};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use validator::Validate;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn check_available(flag: &AtomicBool, store: &str) -> Result<()> {
    if flag.load(Ordering::SeqCst) {
        return Err(AppError::DatabaseError(format!("{} is unavailable", store)));
    }
    Ok(())
}

#[derive(Default)]
pub struct InMemoryMetadataStore {
    tables: Mutex<Vec<TableDescription>>,
    columns: Mutex<Vec<ColumnDescription>>,
    terms: Mutex<Vec<TermMapping>>,
    unavailable: AtomicBool,
    terms_unavailable: AtomicBool,
}

impl InMemoryMetadataStore {
    pub fn add_table(&self, table: TableDescription) {
        let mut tables = lock(&self.tables);
        tables.retain(|t| !t.table_name.eq_ignore_ascii_case(&table.table_name));
        tables.push(table);
    }

    pub fn add_column(&self, column: ColumnDescription) {
        let mut columns = lock(&self.columns);
        columns.retain(|c| {
            !(c.table_name.eq_ignore_ascii_case(&column.table_name)
                && c.column_name.eq_ignore_ascii_case(&column.column_name))
        });
        columns.push(column);
    }

    pub fn add_term(&self, mut term: TermMapping) {
        let mut terms = lock(&self.terms);
        if term.id == 0 {
            term.id = terms.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        }
        terms.push(term);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fails only the term reads; schema descriptions stay readable.
    pub fn set_terms_unavailable(&self, unavailable: bool) {
        self.terms_unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_terms(&self) -> Result<()> {
        check_available(&self.unavailable, "metadata store")?;
        check_available(&self.terms_unavailable, "term mappings")
    }
}

fn term_matches(term: &TermMapping, needle: &str) -> bool {
    term.business_term.to_lowercase().contains(needle)
        || term
            .technical_terms
            .iter()
            .chain(term.synonyms.iter())
            .any(|t| t.to_lowercase().contains(needle))
        || term
            .description
            .as_deref()
            .map_or(false, |d| d.to_lowercase().contains(needle))
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn table_descriptions(&self, scope: &TableScope) -> Result<Vec<TableDescription>> {
        check_available(&self.unavailable, "metadata store")?;
        let mut tables: Vec<TableDescription> = lock(&self.tables)
            .iter()
            .filter(|t| scope.includes(&t.table_name))
            .cloned()
            .collect();
        tables.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        Ok(tables)
    }

    async fn column_descriptions(&self, scope: &TableScope) -> Result<Vec<ColumnDescription>> {
        check_available(&self.unavailable, "metadata store")?;
        let mut columns: Vec<ColumnDescription> = lock(&self.columns)
            .iter()
            .filter(|c| scope.includes(&c.table_name))
            .cloned()
            .collect();
        columns.sort_by(|a, b| {
            a.table_name
                .cmp(&b.table_name)
                .then_with(|| a.column_name.cmp(&b.column_name))
        });
        Ok(columns)
    }

    async fn term_mappings(&self) -> Result<Vec<TermMapping>> {
        self.check_terms()?;
        let mut terms = lock(&self.terms).clone();
        terms.sort_by(|a, b| a.business_term.cmp(&b.business_term));
        Ok(terms)
    }

    async fn find_term(&self, business_term: &str) -> Result<Option<TermMapping>> {
        self.check_terms()?;
        let needle = business_term.trim().to_lowercase();
        Ok(lock(&self.terms)
            .iter()
            .find(|t| t.business_term.to_lowercase() == needle)
            .cloned())
    }

    async fn search_terms(
        &self,
        text: Option<&str>,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TermMapping>> {
        self.check_terms()?;
        let needle = text
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty());
        let mut found: Vec<TermMapping> = lock(&self.terms)
            .iter()
            .filter(|t| needle.as_deref().map_or(true, |n| term_matches(t, n)))
            .filter(|t| {
                category.map_or(true, |c| {
                    t.category
                        .as_deref()
                        .map_or(false, |tc| tc.eq_ignore_ascii_case(c))
                })
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.business_term.cmp(&b.business_term));
        found.truncate(limit);
        Ok(found)
    }

    async fn term_categories(&self) -> Result<Vec<String>> {
        self.check_terms()?;
        let categories: BTreeSet<String> = lock(&self.terms)
            .iter()
            .filter_map(|t| t.category.clone())
            .collect();
        Ok(categories.into_iter().collect())
    }

    async fn column_description(&self, table_name: &str, column_name: &str) -> Result<Option<ColumnDescription>> {
        check_available(&self.unavailable, "metadata store")?;
        Ok(lock(&self.columns)
            .iter()
            .find(|c| {
                c.table_name.eq_ignore_ascii_case(table_name.trim())
                    && c.column_name.eq_ignore_ascii_case(column_name.trim())
            })
            .cloned())
    }
}

/// Example bank guarded by a single mutex, so every statistics update is a
/// complete read-modify-write.
#[derive(Default)]
pub struct InMemoryExampleBank {
    examples: Mutex<Vec<QueryExample>>,
    unavailable: AtomicBool,
}

impl InMemoryExampleBank {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        lock(&self.examples).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ExampleBank for InMemoryExampleBank {
    async fn nearest_examples(&self, query_embedding: &[f32], k: usize) -> Result<Vec<QueryExample>> {
        check_available(&self.unavailable, "example bank")?;
        let embedded: Vec<QueryExample> = lock(&self.examples)
            .iter()
            .filter(|e| e.embedding.is_some())
            .cloned()
            .collect();
        Ok(rank_examples(query_embedding, embedded, k, None)
            .into_iter()
            .map(|scored| scored.example)
            .collect())
    }

    async fn record_outcome(&self, example_id: i64, success: bool) -> Result<ExampleStats> {
        check_available(&self.unavailable, "example bank")?;
        let mut examples = lock(&self.examples);
        let example = examples
            .iter_mut()
            .find(|e| e.id == example_id)
            .ok_or_else(|| AppError::NotFound(format!("Example not found: {}", example_id)))?;

        example.success_rate = incremental_mean(example.success_rate, example.usage_count, success);
        example.usage_count += 1;

        Ok(ExampleStats {
            example_id,
            success_rate: example.success_rate,
            usage_count: example.usage_count,
        })
    }

    async fn get_example(&self, example_id: i64) -> Result<Option<QueryExample>> {
        check_available(&self.unavailable, "example bank")?;
        Ok(lock(&self.examples)
            .iter()
            .find(|e| e.id == example_id)
            .cloned())
    }

    async fn insert_example(&self, input: &QueryExampleInput) -> Result<i64> {
        check_available(&self.unavailable, "example bank")?;
        input
            .validate()
            .map_err(|e| AppError::ValidationError(format!("Invalid example: {}", e)))?;

        let mut examples = lock(&self.examples);
        let id = examples.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        examples.push(QueryExample {
            id,
            natural_language_query: input.natural_language_query.clone(),
            sql_query: input.sql_query.clone(),
            category: input.category.clone(),
            difficulty: input.difficulty,
            success_rate: 1.0,
            usage_count: 0,
            embedding: input.embedding.clone(),
            tags: input.tags.clone(),
        });
        Ok(id)
    }

    async fn search_examples(
        &self,
        text: Option<&str>,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QueryExample>> {
        check_available(&self.unavailable, "example bank")?;
        let needle = text.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty());

        let mut found: Vec<QueryExample> = lock(&self.examples)
            .iter()
            .filter(|e| match &needle {
                Some(n) => {
                    e.natural_language_query.to_lowercase().contains(n)
                        || e.sql_query.to_lowercase().contains(n)
                }
                None => true,
            })
            .filter(|e| match category {
                Some(c) => e
                    .category
                    .as_deref()
                    .is_some_and(|ec| ec.eq_ignore_ascii_case(c)),
                None => true,
            })
            .cloned()
            .collect();

        found.sort_by(|a, b| {
            b.success_rate
                .total_cmp(&a.success_rate)
                .then_with(|| b.usage_count.cmp(&a.usage_count))
                .then_with(|| a.id.cmp(&b.id))
        });
        found.truncate(limit);
        Ok(found)
    }

    async fn categories(&self) -> Result<Vec<String>> {
        check_available(&self.unavailable, "example bank")?;
        let categories: BTreeSet<String> = lock(&self.examples)
            .iter()
            .filter_map(|e| e.category.clone())
            .collect();
        Ok(categories.into_iter().collect())
    }

    async fn examples_missing_embedding(&self) -> Result<Vec<(i64, String)>> {
        check_available(&self.unavailable, "example bank")?;
        Ok(lock(&self.examples)
            .iter()
            .filter(|e| e.embedding.is_none())
            .map(|e| (e.id, e.natural_language_query.clone()))
            .collect())
    }

    async fn set_embedding(&self, example_id: i64, embedding: &[f32]) -> Result<()> {
        check_available(&self.unavailable, "example bank")?;
        let mut examples = lock(&self.examples);
        let example = examples
            .iter_mut()
            .find(|e| e.id == example_id)
            .ok_or_else(|| AppError::NotFound(format!("Example not found: {}", example_id)))?;
        example.embedding = Some(embedding.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryHistorySink {
    records: Mutex<Vec<QueryHistoryRecord>>,
    unavailable: AtomicBool,
}

impl InMemoryHistorySink {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every record in insertion order.
    pub fn records(&self) -> Vec<QueryHistoryRecord> {
        lock(&self.records).clone()
    }
}

#[async_trait]
impl HistorySink for InMemoryHistorySink {
    async fn append(&self, record: &QueryHistoryRecord) -> Result<()> {
        check_available(&self.unavailable, "history sink")?;
        lock(&self.records).push(record.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<QueryHistoryRecord>> {
        check_available(&self.unavailable, "history sink")?;
        Ok(lock(&self.records).iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_insert_defaults_and_search_order() {
        let bank = InMemoryExampleBank::default();
        let a = bank
            .insert_example(&QueryExampleInput::new("직원 목록", "SELECT * FROM employees"))
            .await
            .unwrap();
        let b = bank
            .insert_example(
                &QueryExampleInput::new("지역별 매출", "SELECT region FROM sales").with_category("sales"),
            )
            .await
            .unwrap();

        let example = bank.get_example(a).await.unwrap().unwrap();
        assert_eq!(example.success_rate, 1.0);
        assert_eq!(example.usage_count, 0);

        bank.record_outcome(a, false).await.unwrap();
        let found = bank.search_examples(Some("SELECT"), None, 10).await.unwrap();
        let ids: Vec<i64> = found.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b, a]);

        let by_category = bank.search_examples(None, Some("SALES"), 10).await.unwrap();
        assert_eq!(by_category.len(), 1);
        assert_eq!(bank.categories().await.unwrap(), vec!["sales".to_string()]);
    }

    #[tokio::test]
    async fn test_insert_rejects_empty_text() {
        let bank = InMemoryExampleBank::default();
        assert!(bank
            .insert_example(&QueryExampleInput::new("", "SELECT 1"))
            .await
            .is_err());
        assert!(bank.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_backfill_queries() {
        let bank = InMemoryExampleBank::default();
        let id = bank
            .insert_example(&QueryExampleInput::new("count", "SELECT COUNT(*) FROM sales"))
            .await
            .unwrap();
        assert!(bank.nearest_examples(&[0.1, 0.2], 3).await.unwrap().is_empty());
        assert_eq!(bank.examples_missing_embedding().await.unwrap(), vec![(id, "count".to_string())]);

        bank.set_embedding(id, &[0.1, 0.2]).await.unwrap();
        assert_eq!(bank.nearest_examples(&[0.1, 0.2], 3).await.unwrap().len(), 1);
        assert!(bank.set_embedding(id + 1, &[0.1]).await.is_err());
    }

    #[tokio::test]
    async fn test_find_term_is_case_insensitive() {
        let store = InMemoryMetadataStore::default();
        store.add_term(TermMapping::new("Revenue", &["sales.total_amount"]).unwrap());
        assert!(store.find_term("revenue").await.unwrap().is_some());
        assert!(store.find_term("profit").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_recent_is_newest_first() {
        let sink = InMemoryHistorySink::default();
        for question in ["first", "second", "third"] {
            sink.append(&QueryHistoryRecord {
                natural_language_query: question.to_string(),
                generated_sql: None,
                execution_success: false,
                execution_time_ms: 0,
                result_count: None,
                error_message: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        let recent = sink.recent(2).await.unwrap();
        assert_eq!(recent[0].natural_language_query, "third");
        assert_eq!(recent[1].natural_language_query, "second");
    }
}
