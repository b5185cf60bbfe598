//! Few-shot prompt assembly under a token budget.
//!
//! Pure and deterministic. When the rendered prompt is over budget, content
//! is shed in this order until it fits:
//!
//! 1. lowest-ranked examples
//! 2. schema entries not referenced by a remaining example or mapped term
//! 3. the remaining schema entries
//! 4. the business-term section
//!
//! The question itself is never shortened. If the bare question still does
//! not fit, the request is returned flagged `over_budget`.

use super::example_retriever::ScoredExample;
use super::schema_context::{SchemaContext, TableContext};
use super::sql_validator::referenced_tables;
use super::term_mapper::{TermAnnotation, TermMatch};
use crate::shared::token_counter::TokenCounter;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write;

pub const DEFAULT_MAX_PROMPT_TOKENS: usize = 3000;

const SYSTEM_PROMPT: &str = "You are a PostgreSQL expert who translates business questions into SQL.\n\
Rules:\n\
- Write exactly one read-only SELECT statement. Common table expressions are allowed.\n\
- Use only the tables and columns listed in the schema.\n\
- Never modify data or schema.\n\
- When a business term lists several candidate mappings, pick the one that fits the question.";

/// A fully rendered generation request plus a record of what was kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    /// Examples present in the prompt, in rank order.
    pub included_examples: Vec<ScoredExample>,
    pub included_tables: Vec<String>,
    pub dropped_example_ids: Vec<i64>,
    pub dropped_tables: Vec<String>,
    pub terms_included: bool,
    pub estimated_tokens: usize,
    pub over_budget: bool,
}

impl GenerationRequest {
    /// The highest-ranked example that made it into the prompt.
    pub fn top_example_id(&self) -> Option<i64> {
        self.included_examples.first().map(|s| s.example.id)
    }
}

pub struct PromptAssembler {
    max_prompt_tokens: usize,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PROMPT_TOKENS)
    }
}

impl PromptAssembler {
    pub fn new(max_prompt_tokens: usize) -> Self {
        Self { max_prompt_tokens }
    }

    pub fn assemble(
        &self,
        question: &str,
        terms: &TermAnnotation,
        schema: &SchemaContext,
        examples: &[ScoredExample],
    ) -> GenerationRequest {
        let mut kept_examples: Vec<ScoredExample> = examples.to_vec();
        let mut kept_tables: Vec<TableContext> = schema.tables.clone();
        let mut include_terms = !terms.is_empty();
        let mut dropped_example_ids = Vec::new();
        let mut dropped_tables = Vec::new();

        loop {
            let user = render_user(question, terms, include_terms, &kept_tables, &kept_examples);
            let estimated = TokenCounter::estimate_prompt_tokens(SYSTEM_PROMPT, &user);

            if TokenCounter::fits_in_budget(estimated, self.max_prompt_tokens) {
                return self.finish(
                    user,
                    estimated,
                    false,
                    kept_examples,
                    kept_tables,
                    include_terms,
                    dropped_example_ids,
                    dropped_tables,
                );
            }

            if let Some(dropped) = kept_examples.pop() {
                dropped_example_ids.push(dropped.example.id);
                continue;
            }

            let relevant = relevant_tables(terms, &kept_examples);
            if let Some(idx) = next_table_to_drop(&kept_tables, &relevant) {
                dropped_tables.push(kept_tables.remove(idx).table.table_name);
                continue;
            }

            if include_terms {
                include_terms = false;
                continue;
            }

            return self.finish(
                user,
                estimated,
                true,
                kept_examples,
                kept_tables,
                include_terms,
                dropped_example_ids,
                dropped_tables,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        user: String,
        estimated_tokens: usize,
        over_budget: bool,
        included_examples: Vec<ScoredExample>,
        tables: Vec<TableContext>,
        terms_included: bool,
        dropped_example_ids: Vec<i64>,
        dropped_tables: Vec<String>,
    ) -> GenerationRequest {
        if over_budget {
            tracing::warn!(
                "Prompt needs ~{} tokens with only the question left (budget {})",
                estimated_tokens,
                self.max_prompt_tokens
            );
        } else if !dropped_example_ids.is_empty() || !dropped_tables.is_empty() {
            tracing::debug!(
                "Prompt trimmed to budget: dropped examples {:?}, tables {:?}",
                dropped_example_ids,
                dropped_tables
            );
        }

        GenerationRequest {
            system: SYSTEM_PROMPT.to_string(),
            user,
            included_examples,
            included_tables: tables.into_iter().map(|t| t.table.table_name).collect(),
            dropped_example_ids,
            dropped_tables,
            terms_included,
            estimated_tokens,
            over_budget,
        }
    }
}

/// Irrelevant tables go first, then the rest. Within each group the last
/// table by name goes first.
fn next_table_to_drop(tables: &[TableContext], relevant: &BTreeSet<String>) -> Option<usize> {
    if tables.is_empty() {
        return None;
    }
    let is_relevant = |t: &TableContext| relevant.contains(&t.name().to_lowercase());

    tables
        .iter()
        .enumerate()
        .rev()
        .find(|(_, t)| !is_relevant(t))
        .or_else(|| tables.iter().enumerate().next_back())
        .map(|(idx, _)| idx)
}

fn render_user(
    question: &str,
    terms: &TermAnnotation,
    include_terms: bool,
    tables: &[TableContext],
    examples: &[ScoredExample],
) -> String {
    let mut prompt = String::new();

    if !tables.is_empty() {
        let _ = writeln!(prompt, "## Schema\n");
        for table in tables {
            let _ = writeln!(prompt, "{}", table.render());
        }
    }

    if include_terms && !terms.is_empty() {
        let _ = writeln!(prompt, "## Business Terms\n");
        for m in &terms.matches {
            let _ = writeln!(prompt, "- {}", render_term(m));
        }
        let _ = writeln!(prompt);
    }

    if !examples.is_empty() {
        let _ = writeln!(prompt, "## Examples\n");
        for (idx, scored) in examples.iter().enumerate() {
            let _ = writeln!(
                prompt,
                "### Example {} (similarity {:.2})",
                idx + 1,
                scored.similarity
            );
            let _ = writeln!(prompt, "**Question:** {}", scored.example.natural_language_query);
            let _ = writeln!(prompt, "**SQL:** {}\n", scored.example.sql_query);
        }
    }

    let _ = writeln!(prompt, "## Task");
    let _ = writeln!(prompt, "Generate a SQL query for: {}\n", question);
    let _ = writeln!(prompt, "## Output Format");
    let _ = write!(
        prompt,
        "Provide only the SQL query without explanation or markdown formatting."
    );

    prompt
}

fn render_term(m: &TermMatch) -> String {
    let describe = |c: &super::term_mapper::TermCandidate| {
        let mut s = format!("{} → {}", c.business_term, c.technical_terms.join(", "));
        if let Some(category) = c.category.as_deref().filter(|s| !s.is_empty()) {
            let _ = write!(s, " ({})", category);
        }
        s
    };

    if m.is_ambiguous() {
        format!(
            "\"{}\" is ambiguous, candidates: {}",
            m.surface_form,
            m.candidates.iter().map(describe).collect::<Vec<_>>().join(" | ")
        )
    } else {
        let joined: Vec<String> = m.candidates.iter().map(describe).collect();
        format!("\"{}\": {}", m.surface_form, joined.join(" | "))
    }
}

/// Tables the prompt content depends on: those named by a term's technical
/// identifiers or read by an example's SQL.
pub fn relevant_tables(terms: &TermAnnotation, examples: &[ScoredExample]) -> BTreeSet<String> {
    let mut tables = terms.referenced_tables();
    for scored in examples {
        tables.extend(referenced_tables(&scored.example.sql_query));
    }
    tables
}
