//! Read side of the business lexicon and column descriptions.

use crate::domain::error::{AppError, Result};
use crate::domain::ports::{MetadataStore, TableScope};
use crate::domain::text2sql_entities::{ColumnDescription, TermMapping};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_TERM_SEARCH_LIMIT: usize = 10;

pub struct LexiconManager {
    metadata: Arc<dyn MetadataStore>,
}

impl LexiconManager {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Substring search over terms, technical names, synonyms and
    /// descriptions. A blank keyword lists terms in the category.
    pub async fn search(&self, keyword: &str, category: Option<&str>, limit: usize) -> Result<Vec<TermMapping>> {
        let category = category.map(str::trim).filter(|c| !c.is_empty());
        let found = self
            .metadata
            .search_terms(Some(keyword), category, limit)
            .await?;
        debug!("Term search '{}' matched {} terms", keyword, found.len());
        Ok(found)
    }

    pub async fn categories(&self) -> Result<Vec<String>> {
        self.metadata.term_categories().await
    }

    pub async fn get_term(&self, business_term: &str) -> Result<TermMapping> {
        self.metadata
            .find_term(business_term)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Term not found: {}", business_term)))
    }

    pub async fn column_description(&self, table_name: &str, column_name: &str) -> Result<ColumnDescription> {
        self.metadata
            .column_description(table_name, column_name)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No description for {}.{}", table_name, column_name))
            })
    }

    /// Every stored column description, ordered by table then column.
    pub async fn all_column_descriptions(&self) -> Result<Vec<ColumnDescription>> {
        self.metadata.column_descriptions(&TableScope::All).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::memory::InMemoryMetadataStore;

    fn column(table: &str, name: &str, description: &str) -> ColumnDescription {
        ColumnDescription {
            table_name: table.to_string(),
            column_name: name.to_string(),
            display_name: None,
            description: Some(description.to_string()),
            business_meaning: None,
            data_type: Some("integer".to_string()),
            is_nullable: Some(false),
            is_primary_key: false,
            example_values: Vec::new(),
            related_columns: Vec::new(),
        }
    }

    fn lexicon() -> (Arc<InMemoryMetadataStore>, LexiconManager) {
        let store = Arc::new(InMemoryMetadataStore::default());
        store.add_term(
            TermMapping::new("급여", &["employees.salary"])
                .unwrap()
                .with_synonyms(&["연봉", "월급"])
                .with_category("hr")
                .with_description("직원 급여"),
        );
        store.add_term(
            TermMapping::new("매출", &["sales.total_amount"])
                .unwrap()
                .with_synonyms(&["revenue"])
                .with_category("sales"),
        );
        store.add_term(
            TermMapping::new("부서", &["departments"])
                .unwrap()
                .with_category("hr")
                .with_description("부서 정보"),
        );
        store.add_term(TermMapping::new("프로젝트", &["projects"]).unwrap());
        store.add_column(column("employees", "salary", "연간 급여"));
        store.add_column(column("departments", "budget", "부서 예산"));
        (store.clone(), LexiconManager::new(store))
    }

    #[tokio::test]
    async fn test_search_matches_every_text_field() {
        let (_, lexicon) = lexicon();

        let by_technical = lexicon.search("SALARY", None, 10).await.unwrap();
        assert_eq!(by_technical.len(), 1);
        assert_eq!(by_technical[0].business_term, "급여");

        let by_synonym = lexicon.search("Revenue", None, 10).await.unwrap();
        assert_eq!(by_synonym[0].business_term, "매출");

        let by_description = lexicon.search("정보", None, 10).await.unwrap();
        assert_eq!(by_description.len(), 1);
        assert_eq!(by_description[0].business_term, "부서");
    }

    #[tokio::test]
    async fn test_search_filters_category_and_limits() {
        let (_, lexicon) = lexicon();

        let hr: Vec<String> = lexicon
            .search("", Some("HR"), 10)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.business_term)
            .collect();
        assert_eq!(hr, vec!["급여".to_string(), "부서".to_string()]);

        assert_eq!(lexicon.search("", None, 2).await.unwrap().len(), 2);
        assert_eq!(lexicon.search("", Some("  "), 10).await.unwrap().len(), 4);
        assert!(lexicon.search("nothing-like-this", None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_categories_are_distinct_and_sorted() {
        let (_, lexicon) = lexicon();
        assert_eq!(
            lexicon.categories().await.unwrap(),
            vec!["hr".to_string(), "sales".to_string()]
        );
    }

    #[tokio::test]
    async fn test_get_term_and_column_lookups() {
        let (_, lexicon) = lexicon();

        assert_eq!(
            lexicon.get_term("급여").await.unwrap().technical_terms,
            vec!["employees.salary".to_string()]
        );
        assert!(matches!(
            lexicon.get_term("없는 용어").await.unwrap_err(),
            AppError::NotFound(_)
        ));

        let salary = lexicon.column_description("Employees", "SALARY").await.unwrap();
        assert_eq!(salary.description.as_deref(), Some("연간 급여"));
        assert!(matches!(
            lexicon.column_description("employees", "bonus").await.unwrap_err(),
            AppError::NotFound(_)
        ));

        let all: Vec<String> = lexicon
            .all_column_descriptions()
            .await
            .unwrap()
            .into_iter()
            .map(|c| format!("{}.{}", c.table_name, c.column_name))
            .collect();
        assert_eq!(all, vec!["departments.budget".to_string(), "employees.salary".to_string()]);
    }

    #[tokio::test]
    async fn test_term_outage_surfaces_as_error() {
        let (store, lexicon) = lexicon();
        store.set_terms_unavailable(true);
        assert!(matches!(
            lexicon.search("급여", None, 10).await.unwrap_err(),
            AppError::DatabaseError(_)
        ));
        assert!(lexicon.categories().await.is_err());
        // Column descriptions do not depend on the lexicon.
        assert!(lexicon.column_description("employees", "salary").await.is_ok());
    }
}
