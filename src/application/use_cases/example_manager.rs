//! Curation of the few-shot example bank.

use super::embedding_service::EmbeddingProvider;
use super::sql_validator::check_read_only;
use crate::domain::error::{AppError, Result};
use crate::domain::ports::ExampleBank;
use crate::domain::text2sql_entities::{QueryExample, QueryExampleInput};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkAddReport {
    pub added: Vec<i64>,
    /// Input position and reason for every rejected entry.
    pub failed: Vec<(usize, String)>,
}

pub struct ExampleManager {
    bank: Arc<dyn ExampleBank>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl ExampleManager {
    pub fn new(bank: Arc<dyn ExampleBank>) -> Self {
        Self {
            bank,
            embedder: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Stores a curated pair. The SQL must be a single read-only statement;
    /// it is stored in its extracted form. When an embedder is configured
    /// and the input carries no vector, one is computed. An embedding
    /// failure stores the example without a vector so a later backfill can
    /// pick it up.
    pub async fn add_example(&self, input: &QueryExampleInput) -> Result<i64> {
        input
            .validate()
            .map_err(|e| AppError::ValidationError(format!("Invalid example: {}", e)))?;
        let sql = check_read_only(&input.sql_query)
            .map_err(|e| AppError::ValidationError(format!("Invalid example SQL: {}", e)))?;

        let mut prepared = input.clone();
        prepared.sql_query = sql;

        if prepared.embedding.is_none() {
            if let Some(embedder) = &self.embedder {
                match embedder.embed(&prepared.natural_language_query).await {
                    Ok(vector) => prepared.embedding = Some(vector),
                    Err(e) => warn!(
                        "Storing example without embedding ('{}'): {}",
                        prepared.natural_language_query, e
                    ),
                }
            }
        }

        let id = self.bank.insert_example(&prepared).await?;
        info!("Added example {} ({:?})", id, prepared.category);
        Ok(id)
    }

    /// Adds each entry independently; one bad entry does not stop the rest.
    pub async fn add_examples(&self, inputs: &[QueryExampleInput]) -> BulkAddReport {
        let mut report = BulkAddReport::default();
        for (index, input) in inputs.iter().enumerate() {
            match self.add_example(input).await {
                Ok(id) => report.added.push(id),
                Err(e) => {
                    warn!("Bulk add skipped entry {}: {}", index, e);
                    report.failed.push((index, e.to_string()));
                }
            }
        }
        info!(
            "Bulk add finished: {} added, {} failed",
            report.added.len(),
            report.failed.len()
        );
        report
    }

    pub async fn get_example(&self, example_id: i64) -> Result<QueryExample> {
        self.bank
            .get_example(example_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Example not found: {}", example_id)))
    }

    /// Keyword search over question and SQL text, best performers first.
    pub async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<QueryExample>> {
        self.bank.search_examples(Some(keyword), None, limit).await
    }

    pub async fn top_examples(&self, category: Option<&str>, limit: usize) -> Result<Vec<QueryExample>> {
        self.bank.search_examples(None, category, limit).await
    }

    pub async fn categories(&self) -> Result<Vec<String>> {
        self.bank.categories().await
    }

    /// Computes embeddings for examples stored without one. Returns how many
    /// were filled in; individual failures are logged and skipped.
    pub async fn backfill_embeddings(&self) -> Result<usize> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            AppError::ConfigError("No embedding provider configured for backfill".to_string())
        })?;

        let pending = self.bank.examples_missing_embedding().await?;
        if pending.is_empty() {
            return Ok(0);
        }
        info!("Backfilling embeddings for {} examples", pending.len());

        let mut filled = 0usize;
        for (id, question) in pending {
            let vector = match embedder.embed(&question).await {
                Ok(vector) => vector,
                Err(e) => {
                    warn!("Failed to embed example {}: {}", id, e);
                    continue;
                }
            };
            match self.bank.set_embedding(id, &vector).await {
                Ok(()) => filled += 1,
                Err(e) => warn!("Failed to store embedding for example {}: {}", id, e),
            }
        }
        Ok(filled)
    }
}
