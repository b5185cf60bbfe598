//! Business vocabulary resolution.
//!
//! Finds every business term and synonym occurring in a question and
//! attaches the technical identifiers it maps to. When one surface form
//! belongs to several mappings all of them are kept; the generator sees the
//! full candidate set.

use crate::domain::error::Result;
use crate::domain::ports::MetadataStore;
use crate::domain::text2sql_entities::TermMapping;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermCandidate {
    pub business_term: String,
    pub technical_terms: Vec<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl From<&TermMapping> for TermCandidate {
    fn from(mapping: &TermMapping) -> Self {
        Self {
            business_term: mapping.business_term.clone(),
            technical_terms: mapping.technical_terms.clone(),
            category: mapping.category.clone(),
            description: mapping.description.clone(),
        }
    }
}

/// One surface form found in the question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermMatch {
    /// The form as configured (term or synonym).
    pub surface_form: String,
    /// Char offset of the first occurrence in the question.
    pub position: usize,
    pub candidates: Vec<TermCandidate>,
}

impl TermMatch {
    pub fn is_ambiguous(&self) -> bool {
        self.candidates.len() > 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TermAnnotation {
    pub matches: Vec<TermMatch>,
}

impl TermAnnotation {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Table names implied by the technical terms (`table.column` or a bare
    /// table name), lowercased.
    pub fn referenced_tables(&self) -> BTreeSet<String> {
        self.matches
            .iter()
            .flat_map(|m| m.candidates.iter())
            .flat_map(|c| c.technical_terms.iter())
            .filter_map(|t| t.split('.').next())
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

pub struct TermMapper {
    mappings: Vec<TermMapping>,
}

impl TermMapper {
    pub fn new(mappings: Vec<TermMapping>) -> Self {
        Self { mappings }
    }

    /// Loads the vocabulary, skipping rows that violate the mapping
    /// invariants.
    pub async fn load(store: &dyn MetadataStore) -> Result<Self> {
        let rows = store.term_mappings().await?;
        let total = rows.len();
        let mappings: Vec<TermMapping> = rows
            .into_iter()
            .filter(|m| match m.check() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Skipping term mapping '{}': {}", m.business_term, e);
                    false
                }
            })
            .collect();
        debug!("Loaded {} of {} term mappings", mappings.len(), total);
        Ok(Self::new(mappings))
    }

    /// Case-insensitive lookup by business term, falling back to synonyms.
    pub fn lookup(&self, term: &str) -> Option<&TermMapping> {
        let term = term.trim();
        self.mappings
            .iter()
            .find(|m| m.business_term.to_lowercase() == term.to_lowercase())
            .or_else(|| {
                self.mappings.iter().find(|m| {
                    m.synonyms
                        .iter()
                        .any(|s| s.to_lowercase() == term.to_lowercase())
                })
            })
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn annotate(&self, question: &str) -> TermAnnotation {
        let haystack: Vec<char> = question.to_lowercase().chars().collect();
        let mut matches: Vec<TermMatch> = Vec::new();

        for mapping in &self.mappings {
            for form in mapping.surface_forms() {
                let needle: Vec<char> = form.trim().to_lowercase().chars().collect();
                let Some(position) = find_bounded(&haystack, &needle) else {
                    continue;
                };
                let candidate = TermCandidate::from(mapping);

                match matches
                    .iter_mut()
                    .find(|m| m.surface_form.to_lowercase() == form.trim().to_lowercase())
                {
                    Some(existing) => {
                        if !existing
                            .candidates
                            .iter()
                            .any(|c| c.business_term == candidate.business_term)
                        {
                            existing.candidates.push(candidate);
                        }
                    }
                    None => matches.push(TermMatch {
                        surface_form: form.trim().to_string(),
                        position,
                        candidates: vec![candidate],
                    }),
                }
            }
        }

        matches.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then_with(|| a.surface_form.cmp(&b.surface_form))
        });
        for m in &mut matches {
            m.candidates
                .sort_by(|a, b| a.business_term.cmp(&b.business_term));
        }

        if !matches.is_empty() {
            debug!(
                "Matched {} business terms ({} ambiguous)",
                matches.len(),
                matches.iter().filter(|m| m.is_ambiguous()).count()
            );
        }

        TermAnnotation { matches }
    }
}

/// First occurrence of `needle` whose edges do not sit inside an ASCII word.
/// Hangul particles attached to a term (e.g. "매출은") still match.
fn find_bounded(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';

    (0..=haystack.len() - needle.len()).find(|&start| {
        if haystack[start..start + needle.len()] != *needle {
            return false;
        }
        let end = start + needle.len();
        let left_ok = !is_word(needle[0]) || start == 0 || !is_word(haystack[start - 1]);
        let right_ok =
            !is_word(needle[needle.len() - 1]) || end == haystack.len() || !is_word(haystack[end]);
        left_ok && right_ok
    })
}
