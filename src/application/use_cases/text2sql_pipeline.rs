//! Per-request orchestration of the Text2SQL flow.
//!
//! `Init → ContextGathering → Generating → Validating → Executing →
//! FeedbackRecording → Done`. Schema lookup and generation failures end the
//! run as `Failed`; a validation rejection or execution failure still
//! completes. Every run appends exactly one history record.

use super::embedding_service::EmbeddingProvider;
use super::example_retriever::{ExampleRetriever, ScoredExample, DEFAULT_TOP_K};
use super::feedback_updater::FeedbackUpdater;
use super::prompt_assembler::{GenerationRequest, PromptAssembler, DEFAULT_MAX_PROMPT_TOKENS};
use super::query_executor::{ExecutionLimits, QueryResult, SqlExecutor};
use super::schema_context::{SchemaContext, SchemaContextBuilder};
use super::sql_validator::{SqlValidator, ValidatedSql};
use super::term_mapper::{TermAnnotation, TermMapper};
use crate::domain::error::{PipelineError, Result, ValidationErrorKind};
use crate::domain::llm_config::LLMConfig;
use crate::domain::ports::{ExampleBank, HistorySink, MetadataStore, TableScope};
use crate::domain::text2sql_entities::{ExampleStats, QueryHistoryRecord};
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::response::extract_sql;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineStage {
    Init,
    ContextGathering,
    Generating,
    Validating,
    Executing,
    FeedbackRecording,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Completion {
    Success,
    ValidationRejected(ValidationErrorKind),
    ExecutionFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PipelineOutcome {
    Completed(Completion),
    /// Carries the kind of the fatal error.
    Failed(&'static str),
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Completed(Completion::Success))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub min_similarity: Option<f32>,
    pub max_prompt_tokens: usize,
    pub generation_timeout: Duration,
    pub limits: ExecutionLimits,
    pub max_concurrent_generations: usize,
    /// Empty means "every table the metadata store describes".
    pub allowed_tables: Vec<String>,
    pub table_scope: TableScope,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_similarity: None,
            max_prompt_tokens: DEFAULT_MAX_PROMPT_TOKENS,
            generation_timeout: Duration::from_secs(60),
            limits: ExecutionLimits::default(),
            max_concurrent_generations: 4,
            allowed_tables: Vec::new(),
            table_scope: TableScope::All,
        }
    }
}

/// Collaborators the pipeline is wired with.
pub struct PipelineComponents {
    pub metadata: Arc<dyn MetadataStore>,
    pub examples: Arc<dyn ExampleBank>,
    pub history: Arc<dyn HistorySink>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn LLMClient>,
    pub executor: Arc<dyn SqlExecutor>,
}

#[derive(Debug, Serialize)]
pub struct PipelineResponse {
    pub request_id: String,
    pub question: String,
    pub outcome: PipelineOutcome,
    /// Stages entered, in order.
    pub stages: Vec<PipelineStage>,
    /// Statement text extracted from the generator answer.
    pub generated_sql: Option<String>,
    pub validated_sql: Option<ValidatedSql>,
    pub result: Option<QueryResult>,
    pub error: Option<PipelineError>,
    /// Non-fatal failures the run degraded around.
    pub degraded: Vec<PipelineError>,
    pub terms: TermAnnotation,
    pub example_ids: Vec<i64>,
    /// Example credited with the outcome.
    pub feedback_example_id: Option<i64>,
    pub elapsed_ms: u64,
    /// Pending statistics update, if one was started.
    #[serde(skip)]
    pub feedback: Option<JoinHandle<Option<ExampleStats>>>,
}

impl PipelineResponse {
    fn new(request_id: String, question: &str) -> Self {
        Self {
            request_id,
            question: question.to_string(),
            outcome: PipelineOutcome::Failed("Incomplete"),
            stages: vec![PipelineStage::Init],
            generated_sql: None,
            validated_sql: None,
            result: None,
            error: None,
            degraded: Vec::new(),
            terms: TermAnnotation::default(),
            example_ids: Vec::new(),
            feedback_example_id: None,
            elapsed_ms: 0,
            feedback: None,
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!("Stage {:?}", stage);
        self.stages.push(stage);
    }

    fn fail(mut self, error: PipelineError) -> Self {
        self.outcome = PipelineOutcome::Failed(error.kind());
        self.error = Some(error);
        self
    }

    pub fn history_record(&self) -> QueryHistoryRecord {
        QueryHistoryRecord {
            natural_language_query: self.question.clone(),
            generated_sql: self.generated_sql.clone(),
            execution_success: self.outcome.is_success(),
            execution_time_ms: self
                .result
                .as_ref()
                .map(|r| r.execution_time_ms)
                .unwrap_or(self.elapsed_ms) as i64,
            result_count: self.result.as_ref().map(|r| r.row_count as i64),
            error_message: self.error.as_ref().map(|e| e.to_string()),
            created_at: Utc::now(),
        }
    }
}

pub struct Text2SqlPipeline {
    metadata: Arc<dyn MetadataStore>,
    history: Arc<dyn HistorySink>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn LLMClient>,
    executor: Arc<dyn SqlExecutor>,
    schema_builder: SchemaContextBuilder,
    retriever: ExampleRetriever,
    assembler: PromptAssembler,
    feedback: FeedbackUpdater,
    llm_config: LLMConfig,
    settings: PipelineSettings,
    generation_permits: Semaphore,
}

impl Text2SqlPipeline {
    pub fn new(components: PipelineComponents, llm_config: LLMConfig, settings: PipelineSettings) -> Self {
        let retriever = ExampleRetriever::new(components.examples.clone())
            .with_top_k(settings.top_k)
            .with_min_similarity(settings.min_similarity);

        Self {
            schema_builder: SchemaContextBuilder::new(components.metadata.clone()),
            feedback: FeedbackUpdater::new(components.examples),
            assembler: PromptAssembler::new(settings.max_prompt_tokens),
            generation_permits: Semaphore::new(settings.max_concurrent_generations.max(1)),
            metadata: components.metadata,
            history: components.history,
            embedder: components.embedder,
            generator: components.generator,
            executor: components.executor,
            retriever,
            llm_config,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs one question end to end. Never returns an error: fatal failures
    /// are reported through `PipelineOutcome::Failed`.
    pub async fn run(&self, question: &str) -> PipelineResponse {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("text2sql", request_id = %request_id);
        self.run_request(request_id, question).instrument(span).await
    }

    pub async fn recent_history(&self, limit: usize) -> Result<Vec<QueryHistoryRecord>> {
        self.history.recent(limit).await
    }

    async fn run_request(&self, request_id: String, question: &str) -> PipelineResponse {
        let started = Instant::now();
        let mut response = PipelineResponse::new(request_id, question);
        info!("Received question ({} chars)", question.chars().count());

        response.enter(PipelineStage::ContextGathering);
        let (terms, schema, examples) = tokio::join!(
            self.annotate_terms(question),
            self.schema_builder.build(&self.settings.table_scope),
            self.retrieve_examples(question),
        );

        response.terms = terms.unwrap_or_else(|e| {
            warn!("[{}] continuing without term annotations: {}", e.kind(), e);
            response.degraded.push(e);
            TermAnnotation::default()
        });
        let examples = examples.unwrap_or_else(|e| {
            warn!("[{}] continuing with zero examples: {}", e.kind(), e);
            response.degraded.push(e);
            Vec::new()
        });
        let schema = match schema {
            Ok(schema) => schema,
            Err(e) => return self.finish(response.fail(e), started).await,
        };

        let request = self
            .assembler
            .assemble(question, &response.terms, &schema, &examples);
        if request.over_budget {
            warn!(
                "Prompt exceeds budget even after trimming ({} tokens)",
                request.estimated_tokens
            );
        }
        response.example_ids = request
            .included_examples
            .iter()
            .map(|s| s.example.id)
            .collect();
        response.feedback_example_id = request.top_example_id();

        response.enter(PipelineStage::Generating);
        let answer = match self.generate(&request).await {
            Ok(answer) => answer,
            Err(e) => return self.finish(response.fail(e), started).await,
        };
        let extracted = extract_sql(&answer);
        response.generated_sql = (!extracted.is_empty()).then_some(extracted);

        response.enter(PipelineStage::Validating);
        let validated = match self.validator_for(&schema).validate(&answer) {
            Ok(validated) => validated,
            Err(rejection) => {
                info!("Generated SQL rejected: {}", rejection);
                response.outcome =
                    PipelineOutcome::Completed(Completion::ValidationRejected(rejection.kind));
                response.error = Some(PipelineError::Validation(rejection));
                return self.record_feedback(response, false, started).await;
            }
        };
        response.generated_sql = Some(validated.sql().to_string());

        response.enter(PipelineStage::Executing);
        let success = match self.executor.execute(&validated, &self.settings.limits).await {
            Ok(result) => {
                response.result = Some(result);
                response.outcome = PipelineOutcome::Completed(Completion::Success);
                true
            }
            Err(e) => {
                response.outcome = PipelineOutcome::Completed(Completion::ExecutionFailed);
                response.error = Some(e);
                false
            }
        };
        response.validated_sql = Some(validated);

        self.record_feedback(response, success, started).await
    }

    async fn annotate_terms(&self, question: &str) -> std::result::Result<TermAnnotation, PipelineError> {
        let mapper = TermMapper::load(self.metadata.as_ref())
            .await
            .map_err(|e| PipelineError::TermLookup(e.to_string()))?;
        Ok(mapper.annotate(question))
    }

    async fn retrieve_examples(&self, question: &str) -> std::result::Result<Vec<ScoredExample>, PipelineError> {
        let embedding = self
            .embedder
            .embed(question)
            .await
            .map_err(|e| PipelineError::Retrieval(format!("Embedding failed: {}", e)))?;
        self.retriever.retrieve(&embedding).await
    }

    async fn generate(&self, request: &GenerationRequest) -> std::result::Result<String, PipelineError> {
        let _permit = self
            .generation_permits
            .acquire()
            .await
            .map_err(|e| PipelineError::Generation(format!("Generation slots closed: {}", e)))?;

        let timeout = self.settings.generation_timeout;
        let call = self
            .generator
            .generate(&self.llm_config, &request.system, &request.user);
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(answer)) => {
                debug!("Generator answered with {} chars", answer.len());
                Ok(answer)
            }
            Ok(Err(e)) => Err(PipelineError::Generation(e.to_string())),
            Err(_) => Err(PipelineError::Generation(format!(
                "No response within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    fn validator_for(&self, schema: &SchemaContext) -> SqlValidator {
        if self.settings.allowed_tables.is_empty() {
            SqlValidator::new(schema.table_names())
        } else {
            SqlValidator::new(&self.settings.allowed_tables)
        }
    }

    async fn record_feedback(
        &self,
        mut response: PipelineResponse,
        success: bool,
        started: Instant,
    ) -> PipelineResponse {
        response.enter(PipelineStage::FeedbackRecording);
        response.feedback = self
            .feedback
            .spawn_record(response.feedback_example_id, success);
        response.enter(PipelineStage::Done);
        self.finish(response, started).await
    }

    async fn finish(&self, mut response: PipelineResponse, started: Instant) -> PipelineResponse {
        response.elapsed_ms = started.elapsed().as_millis() as u64;

        if let Err(e) = self.history.append(&response.history_record()).await {
            warn!("Failed to append query history: {}", e);
        }

        match &response.error {
            Some(e) if e.is_fatal() => warn!(
                "Request failed [{}] after {}ms: {}",
                e.kind(),
                response.elapsed_ms,
                e
            ),
            _ => info!(
                "Request finished {:?} in {}ms",
                response.outcome, response.elapsed_ms
            ),
        }
        response
    }
}
