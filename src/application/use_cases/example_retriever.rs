//! Nearest-neighbour search over the example bank.
//!
//! The bank returns its `k` nearest embedded examples; they are re-scored
//! here so the threshold and reported similarity use one formula. Ranking
//! is similarity desc, then success_rate desc, then usage_count asc (under-exercised
//! examples first), then id asc so the order is total.

use super::embedding_service::cosine_similarity;
use crate::domain::error::PipelineError;
use crate::domain::ports::ExampleBank;
use crate::domain::text2sql_entities::QueryExample;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredExample {
    pub example: QueryExample,
    /// Cosine similarity in `[-1, 1]`.
    pub similarity: f32,
}

fn rank_order(a: &ScoredExample, b: &ScoredExample) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| b.example.success_rate.total_cmp(&a.example.success_rate))
        .then_with(|| a.example.usage_count.cmp(&b.example.usage_count))
        .then_with(|| a.example.id.cmp(&b.example.id))
}

/// Scores and orders candidates, returning at most `k`. Examples without an
/// embedding, or with one of a different length than the query, are not
/// candidates.
pub fn rank_examples(
    query_embedding: &[f32],
    candidates: Vec<QueryExample>,
    k: usize,
    min_similarity: Option<f32>,
) -> Vec<ScoredExample> {
    if k == 0 || query_embedding.is_empty() {
        return Vec::new();
    }

    let mut skipped = 0usize;
    let mut scored: Vec<ScoredExample> = candidates
        .into_iter()
        .filter_map(|example| {
            let embedding = example.embedding.as_deref()?;
            if embedding.len() != query_embedding.len() {
                skipped += 1;
                return None;
            }
            let similarity = cosine_similarity(query_embedding, embedding);
            if !similarity.is_finite() {
                skipped += 1;
                return None;
            }
            Some(ScoredExample {
                example,
                similarity,
            })
        })
        .filter(|s| min_similarity.map_or(true, |min| s.similarity >= min))
        .collect();

    if skipped > 0 {
        warn!("Skipped {} examples with unusable embeddings", skipped);
    }

    scored.sort_by(rank_order);
    scored.truncate(k);
    scored
}

pub struct ExampleRetriever {
    bank: Arc<dyn ExampleBank>,
    top_k: usize,
    min_similarity: Option<f32>,
}

impl ExampleRetriever {
    pub fn new(bank: Arc<dyn ExampleBank>) -> Self {
        Self {
            bank,
            top_k: DEFAULT_TOP_K,
            min_similarity: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: Option<f32>) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn retrieve(&self, query_embedding: &[f32]) -> Result<Vec<ScoredExample>, PipelineError> {
        self.retrieve_k(query_embedding, self.top_k).await
    }

    /// An empty bank yields an empty list. Store failures surface as
    /// `Retrieval`, which callers treat as "no examples".
    pub async fn retrieve_k(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredExample>, PipelineError> {
        if k == 0 || query_embedding.is_empty() {
            return Ok(Vec::new());
        }
        let candidates = self
            .bank
            .nearest_examples(query_embedding, k)
            .await
            .map_err(|e| PipelineError::Retrieval(e.to_string()))?;
        let fetched = candidates.len();

        let ranked = rank_examples(query_embedding, candidates, k, self.min_similarity);
        debug!(
            "Retrieved {} of {} nearest examples (top similarity {:?})",
            ranked.len(),
            fetched,
            ranked.first().map(|s| s.similarity)
        );
        Ok(ranked)
    }
}
