use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;
use uuid::Uuid;

use crate::retry::GenerationAttempt;

// Enum for handling the failures the binary and the orchestration layer can surface.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Proposal error: {0}")]
    Propose(#[from] ProposeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),

    #[error("Logger error: {0}")]
    Logger(String),

    #[error("Invalid user address: {0}")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    // The template references a key the state does not hold.
    #[error("Missing template variable: {0}")]
    MissingVariable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorKind {
    MalformedJson,
    UnknownType,
    SchemaMismatch,
    OutcomeCount,
    DeadlineNotFuture,
}

// A candidate proposal was rejected. Every kind is recoverable by generating again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub field: Option<String>,
    pub detail: String,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            field: None,
            detail: detail.into(),
        }
    }

    pub fn malformed_json(detail: impl Into<String>) -> Self {
        Self::new(ValidationErrorKind::MalformedJson, detail)
    }

    pub fn unknown_type(detail: impl Into<String>) -> Self {
        Self::new(ValidationErrorKind::UnknownType, detail)
    }

    pub fn schema_mismatch(field: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: ValidationErrorKind::SchemaMismatch,
            field: Some(field.to_string()),
            detail: format!("field '{}': {}", field, detail.into()),
        }
    }

    pub fn outcome_count(detail: impl Into<String>) -> Self {
        Self {
            kind: ValidationErrorKind::OutcomeCount,
            field: Some("outcomes".to_string()),
            detail: detail.into(),
        }
    }

    pub fn deadline_not_future(detail: impl Into<String>) -> Self {
        Self {
            kind: ValidationErrorKind::DeadlineNotFuture,
            field: Some("deadline".to_string()),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Generation backend unavailable: {0}")]
    Unavailable(String),

    #[error("Generation backend timed out")]
    Timeout,
}

// What went wrong in a single generate-then-validate round.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum ProposeError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Invalid session state: {0}")]
    State(#[from] SessionError),

    #[error("Exhausted {} attempts, last error: {last_error}", .attempts.len())]
    ExhaustedRetries {
        last_error: AttemptError,
        attempts: Vec<GenerationAttempt>,
    },

    #[error("Cancelled after {} attempts", .attempts.len())]
    Cancelled { attempts: Vec<GenerationAttempt> },
}

impl ProposeError {
    // Attempt history for diagnostics; empty for configuration failures.
    pub fn attempts(&self) -> &[GenerationAttempt] {
        match self {
            ProposeError::ExhaustedRetries { attempts, .. }
            | ProposeError::Cancelled { attempts } => attempts,
            ProposeError::Template(_) | ProposeError::State(_) => &[],
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(Uuid),

    #[error("Missing required state key: {0}")]
    MissingKey(String),

    #[error("Invalid 'today' reference date: {0}")]
    InvalidToday(String),

    #[error("Session {0} already reached a terminal state")]
    AlreadyFinished(Uuid),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
