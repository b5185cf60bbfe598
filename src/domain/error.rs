use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Serialize, Deserialize)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("LLM error: {0}")]
    LLMError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Reasons the SQL gate refuses generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationErrorKind {
    DisallowedStatement,
    MultipleStatements,
    UnknownTable,
    ForbiddenKeyword,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorKind::DisallowedStatement => "DisallowedStatement",
            ValidationErrorKind::MultipleStatements => "MultipleStatements",
            ValidationErrorKind::UnknownTable => "UnknownTable",
            ValidationErrorKind::ForbiddenKeyword => "ForbiddenKeyword",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejection produced by the SQL validator.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct SqlValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl SqlValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Error kinds surfaced by a pipeline run.
///
/// Only `SchemaLookup` and `Generation` abort a request. Term lookup,
/// retrieval and feedback failures degrade the result, validation and execution failures
/// are recorded as data.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PipelineError {
    #[error("Schema lookup failed: {0}")]
    SchemaLookup(String),
    #[error("Term lookup failed: {0}")]
    TermLookup(String),
    #[error("Example retrieval failed: {0}")]
    Retrieval(String),
    #[error("SQL generation failed: {0}")]
    Generation(String),
    #[error("SQL rejected: {0}")]
    Validation(SqlValidationError),
    #[error("Statement cancelled after {timeout_ms}ms")]
    ExecutionTimeout { timeout_ms: u64 },
    #[error("{0}")]
    Execution(String),
    #[error("Feedback update failed: {0}")]
    FeedbackUpdate(String),
}

impl PipelineError {
    /// Stable identifier used in logs and history rows.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SchemaLookup(_) => "SchemaLookupError",
            PipelineError::TermLookup(_) => "TermLookupError",
            PipelineError::Retrieval(_) => "RetrievalError",
            PipelineError::Generation(_) => "GenerationError",
            PipelineError::Validation(_) => "ValidationError",
            PipelineError::ExecutionTimeout { .. } => "ExecutionTimeout",
            PipelineError::Execution(_) => "ExecutionError",
            PipelineError::FeedbackUpdate(_) => "FeedbackUpdateError",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::SchemaLookup(_) | PipelineError::Generation(_)
        )
    }

    pub fn validation_kind(&self) -> Option<ValidationErrorKind> {
        match self {
            PipelineError::Validation(err) => Some(err.kind),
            _ => None,
        }
    }
}

impl From<SqlValidationError> for PipelineError {
    fn from(err: SqlValidationError) -> Self {
        PipelineError::Validation(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_includes_kind() {
        let err = SqlValidationError::new(
            ValidationErrorKind::UnknownTable,
            "table 'salaries' is not allowed",
        );
        assert_eq!(
            err.to_string(),
            "UnknownTable: table 'salaries' is not allowed"
        );
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(PipelineError::SchemaLookup("down".into()).is_fatal());
        assert!(PipelineError::Generation("timeout".into()).is_fatal());
        assert!(!PipelineError::Retrieval("no embedder".into()).is_fatal());
        assert!(!PipelineError::TermLookup("lexicon down".into()).is_fatal());
        assert!(!PipelineError::Execution("syntax error".into()).is_fatal());
        assert!(!PipelineError::ExecutionTimeout { timeout_ms: 10 }.is_fatal());
    }

    #[test]
    fn test_execution_error_is_verbatim() {
        let err = PipelineError::Execution("column \"salry\" does not exist".into());
        assert_eq!(err.to_string(), "column \"salry\" does not exist");
        assert_eq!(err.kind(), "ExecutionError");
    }
}
