//! Error types for examforge.
//!
//! `ProviderError` describes failures of an LLM backend. It lives in
//! `examforge-core` so the model resolver can downcast and classify failures
//! for fallback decisions. `ExamError` is the error every public operation of
//! this crate returns.

use thiserror::Error;

use crate::model::ExamStatus;

/// Errors that can occur when interacting with an LLM backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The backend rejected the call because a quota or rate limit was hit.
    #[error("quota exceeded for {model}: {message}")]
    QuotaExceeded { model: String, message: String },

    /// The requested model does not exist (or is no longer served).
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

/// How the fallback engine treats a failed generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Quota or rate limit: back off, then try the next candidate.
    Quota,
    /// The model identity is unknown: refresh discovery, then continue.
    ModelNotFound,
    /// Anything else: surface immediately.
    Fatal,
}

impl ProviderError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::QuotaExceeded { .. } => FailureKind::Quota,
            ProviderError::ModelNotFound(_) => FailureKind::ModelNotFound,
            ProviderError::ApiError { status: 429, .. } => FailureKind::Quota,
            ProviderError::ApiError { status: 404, .. } => FailureKind::ModelNotFound,
            _ => FailureKind::Fatal,
        }
    }
}

impl FailureKind {
    /// Classify an arbitrary backend error.
    ///
    /// Typed `ProviderError`s are classified by variant. Anything else falls
    /// back to the textual signatures vendors put in their error bodies.
    pub fn classify(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<ProviderError>() {
            Some(ProviderError::ApiError { status, message }) => match status {
                429 => FailureKind::Quota,
                404 => FailureKind::ModelNotFound,
                _ => Self::from_signature(message),
            },
            Some(provider) => provider.kind(),
            None => Self::from_signature(&format!("{err:#}")),
        }
    }

    fn from_signature(message: &str) -> Self {
        let lower = message.to_lowercase();
        let quota = ["429", "resource_exhausted", "quota", "rate limit", "rate-limit"];
        let not_found = ["404", "not_found", "not found", "is not supported for generatecontent"];
        if quota.iter().any(|sig| lower.contains(sig)) {
            FailureKind::Quota
        } else if not_found.iter().any(|sig| lower.contains(sig)) {
            FailureKind::ModelNotFound
        } else {
            FailureKind::Fatal
        }
    }
}

/// Errors returned by examforge operations.
#[derive(Debug, Error)]
pub enum ExamError {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unsupported board: {0} (expected CBSE, ICSE or WBBSE)")]
    UnsupportedBoard(String),

    #[error("unsupported class: {0} (expected 6 to 12)")]
    UnsupportedClass(u8),

    /// A pattern table failed validation while loading.
    #[error("invalid exam pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Every candidate model was tried and none succeeded.
    #[error("all models exhausted (tried: {}): {last_error}", attempted.join(", "))]
    ModelsExhausted {
        attempted: Vec<String>,
        last_error: String,
    },

    /// A non-retryable failure from the generation backend.
    #[error("generation failed on {model}: {source:#}")]
    Generation {
        model: String,
        #[source]
        source: anyhow::Error,
    },

    /// The model response could not be turned into structured data.
    #[error("failed to parse model response: {reason}\n--- response excerpt ---\n{excerpt}")]
    ResponseParse { reason: String, excerpt: String },

    /// The response parsed but does not have the expected shape.
    #[error("invalid paper structure: {0}")]
    InvalidStructure(String),

    /// A lifecycle transition was requested from the wrong status.
    #[error("cannot {action} exam in status {status}")]
    StateTransition {
        action: &'static str,
        status: ExamStatus,
    },

    /// The current question has no qualifying answer yet.
    #[error("cannot proceed: {0}")]
    ProgressionBlocked(String),

    #[error("answers are locked: exam is {0}")]
    AnswerLocked(ExamStatus),

    #[error("invalid answer: {0}")]
    InvalidAnswer(String),

    #[error("upload rejected: {0}")]
    UploadRejected(String),

    /// A mutation would leave the exam record inconsistent.
    #[error("exam invariant violated: {0}")]
    InvariantViolation(String),

    /// Optimistic concurrency check failed.
    #[error("concurrent update on exam {0}, retry the request")]
    Conflict(uuid::Uuid),

    #[error("evaluation failed after {attempts} attempt(s): {last_error}")]
    EvaluationFailed { attempts: u32, last_error: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("blob storage error: {0}")]
    Blob(String),
}

impl ExamError {
    /// Errors caused by the caller's input or by the exam's current state.
    /// These are never retried.
    pub fn is_rejected_precondition(&self) -> bool {
        matches!(
            self,
            ExamError::UnsupportedBoard(_)
                | ExamError::UnsupportedClass(_)
                | ExamError::InvalidRequest(_)
                | ExamError::StateTransition { .. }
                | ExamError::ProgressionBlocked(_)
                | ExamError::AnswerLocked(_)
                | ExamError::InvalidAnswer(_)
                | ExamError::UploadRejected(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ExamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_classify_by_variant() {
        let quota: anyhow::Error = ProviderError::QuotaExceeded {
            model: "m".into(),
            message: "slow down".into(),
        }
        .into();
        assert_eq!(FailureKind::classify(&quota), FailureKind::Quota);

        let missing: anyhow::Error = ProviderError::ModelNotFound("m".into()).into();
        assert_eq!(FailureKind::classify(&missing), FailureKind::ModelNotFound);

        let auth: anyhow::Error = ProviderError::AuthenticationFailed("bad key".into()).into();
        assert_eq!(FailureKind::classify(&auth), FailureKind::Fatal);
    }

    #[test]
    fn untyped_errors_classify_by_signature() {
        let quota = anyhow::anyhow!("429 RESOURCE_EXHAUSTED: You exceeded your current quota");
        assert_eq!(FailureKind::classify(&quota), FailureKind::Quota);

        let missing = anyhow::anyhow!("404 NOT_FOUND: models/gemini-0.1 is not found");
        assert_eq!(FailureKind::classify(&missing), FailureKind::ModelNotFound);

        let logic = anyhow::anyhow!("index out of bounds");
        assert_eq!(FailureKind::classify(&logic), FailureKind::Fatal);
    }

    #[test]
    fn api_error_status_codes_classify() {
        let err = ProviderError::ApiError {
            status: 429,
            message: "busy".into(),
        };
        assert_eq!(err.kind(), FailureKind::Quota);
        let err = ProviderError::ApiError {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(err.kind(), FailureKind::Fatal);
    }

    #[test]
    fn exhaustion_lists_attempted_models() {
        let err = ExamError::ModelsExhausted {
            attempted: vec!["a".into(), "b".into()],
            last_error: "quota".into(),
        };
        assert_eq!(err.to_string(), "all models exhausted (tried: a, b): quota");
    }

    #[test]
    fn precondition_grouping() {
        assert!(ExamError::ProgressionBlocked("x".into()).is_rejected_precondition());
        assert!(ExamError::UnsupportedClass(5).is_rejected_precondition());
        assert!(!ExamError::Store("x".into()).is_rejected_precondition());
    }
}
