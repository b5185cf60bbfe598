use crate::domain::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Business vocabulary entry mapping a user-facing term to schema identifiers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
pub struct TermMapping {
    pub id: i64,
    #[validate(length(min = 1, message = "business_term must not be empty"))]
    pub business_term: String,
    #[validate(length(min = 1, message = "at least one technical term is required"))]
    pub technical_terms: Vec<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl TermMapping {
    pub fn new(business_term: &str, technical_terms: &[&str]) -> Result<Self> {
        let mapping = Self {
            id: 0,
            business_term: business_term.trim().to_string(),
            technical_terms: technical_terms
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            synonyms: Vec::new(),
            category: None,
            description: None,
        };
        mapping.check()?;
        Ok(mapping)
    }

    pub fn with_synonyms(mut self, synonyms: &[&str]) -> Self {
        self.synonyms = synonyms
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Enforces the non-empty invariants on rows coming back from storage.
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| AppError::ValidationError(format!("Invalid term mapping: {}", e)))?;
        if self.business_term.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Invalid term mapping: business_term must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// The business term followed by its synonyms.
    pub fn surface_forms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.business_term.as_str()).chain(self.synonyms.iter().map(|s| s.as_str()))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TableDescription {
    pub table_name: String,
    /// Human-readable or localized alias, e.g. "직원" for `employees`.
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub business_purpose: Option<String>,
    #[serde(default)]
    pub related_tables: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ColumnDescription {
    pub table_name: String,
    pub column_name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub business_meaning: Option<String>,
    pub data_type: Option<String>,
    pub is_nullable: Option<bool>,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub example_values: Vec<String>,
    #[serde(default)]
    pub related_columns: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl From<String> for Difficulty {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "hard" => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }
}

/// A stored natural-language/SQL pair used as a few-shot example.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QueryExample {
    pub id: i64,
    pub natural_language_query: String,
    pub sql_query: String,
    pub category: Option<String>,
    pub difficulty: Difficulty,
    /// Always within `0.0..=1.0`.
    pub success_rate: f64,
    pub usage_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct QueryExampleInput {
    #[validate(length(min = 1, message = "natural_language_query must not be empty"))]
    pub natural_language_query: String,
    #[validate(length(min = 1, message = "sql_query must not be empty"))]
    pub sql_query: String,
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl QueryExampleInput {
    pub fn new(natural_language_query: &str, sql_query: &str) -> Self {
        Self {
            natural_language_query: natural_language_query.trim().to_string(),
            sql_query: sql_query.trim().to_string(),
            category: None,
            difficulty: Difficulty::Medium,
            tags: Vec::new(),
            embedding: None,
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Success statistics of one example after a feedback update.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ExampleStats {
    pub example_id: i64,
    pub success_rate: f64,
    pub usage_count: i64,
}

/// Append-only audit row, one per pipeline request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QueryHistoryRecord {
    pub natural_language_query: String,
    pub generated_sql: Option<String>,
    pub execution_success: bool,
    pub execution_time_ms: i64,
    pub result_count: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
