//! Error types for the analysis pipeline and document Q&A

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::types::StageKind;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline and Q&A errors
#[derive(Debug, Error)]
pub enum Error {
    /// Extracted text was empty or whitespace-only
    #[error("Document contains no extractable text")]
    EmptyDocument,

    /// Any other rejected input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Capability timeout, rate limit, or unavailable upstream
    #[error("Transient capability error: {0}")]
    Transient(String),

    /// A single stage attempt exceeded its time budget
    #[error("Stage '{stage}' timed out after {secs}s")]
    StageTimeout { stage: StageKind, secs: u64 },

    /// The text-generation reply could not be parsed into the stage's structure
    #[error("Malformed output from {stage} agent: {message}")]
    MalformedAgentOutput { stage: StageKind, message: String },

    /// No vector index exists for the document
    #[error("No passage index for document {0}")]
    IndexNotFound(Uuid),

    /// Index is write-once
    #[error("Passage index for document {0} is already built")]
    IndexAlreadyBuilt(Uuid),

    /// Q&A issued before the document reached Parsed
    #[error("Document {0} has not been indexed yet")]
    DocumentNotIndexed(Uuid),

    /// Unknown document id
    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    /// Report requested for a pipeline that is not Completed
    #[error("Report for document {0} is not available")]
    ReportUnavailable(Uuid),

    /// State machine violation
    #[error("Invalid pipeline transition: {0}")]
    InvalidTransition(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Non-transient LLM error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Non-transient embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// SQLite persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a malformed-output error
    pub fn malformed(stage: StageKind, message: impl Into<String>) -> Self {
        Self::MalformedAgentOutput {
            stage,
            message: message.into(),
        }
    }

    /// Create a transient error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the retry policy may attempt the operation again
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transient(_) | Error::StageTimeout { .. } => true,
            Error::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }

    /// Failure text safe to show to end users; never includes upstream diagnostics
    pub fn public_reason(&self, stage: StageKind) -> String {
        let stage = stage.display_name();
        match self {
            Error::Transient(_) | Error::StageTimeout { .. } | Error::Http(_) => format!(
                "The {} stage could not be completed because the analysis service was unavailable. Please try again later.",
                stage
            ),
            Error::MalformedAgentOutput { .. } => format!(
                "The {} stage produced a result that could not be understood.",
                stage
            ),
            Error::Embedding(_) | Error::IndexAlreadyBuilt(_) => format!(
                "The document could not be indexed during the {} stage.",
                stage
            ),
            _ => format!("The {} stage failed due to an internal error.", stage),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::EmptyDocument => (
                StatusCode::BAD_REQUEST,
                "empty_document",
                self.to_string(),
            ),
            Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg.clone()),
            Error::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            Error::IndexNotFound(_) | Error::DocumentNotIndexed(_) => (
                StatusCode::CONFLICT,
                "document_not_indexed",
                self.to_string(),
            ),
            Error::ReportUnavailable(_) => (
                StatusCode::CONFLICT,
                "report_unavailable",
                self.to_string(),
            ),
            Error::InvalidTransition(msg) => {
                (StatusCode::CONFLICT, "invalid_transition", msg.clone())
            }
            Error::Transient(_) | Error::StageTimeout { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "capability_unavailable",
                "The analysis service is temporarily unavailable".to_string(),
            ),
            Error::Http(_) => (
                StatusCode::BAD_GATEWAY,
                "http_error",
                "Upstream request failed".to_string(),
            ),
            Error::Config(msg) => (StatusCode::BAD_REQUEST, "config_error", msg.clone()),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::MalformedAgentOutput { .. }
            | Error::Llm(_)
            | Error::Embedding(_)
            | Error::IndexAlreadyBuilt(_)
            | Error::Storage(_)
            | Error::Io(_)
            | Error::Internal(_) => {
                tracing::error!("Request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::transient("rate limited").is_transient());
        assert!(Error::StageTimeout {
            stage: StageKind::AnalyzeRisk,
            secs: 5
        }
        .is_transient());
        assert!(!Error::malformed(StageKind::Summarize, "missing summary").is_transient());
        assert!(!Error::EmptyDocument.is_transient());
    }

    #[test]
    fn test_public_reason_hides_diagnostics() {
        let err = Error::transient("HTTP 503 from http://10.0.0.4:11434/api/generate");
        let reason = err.public_reason(StageKind::AnalyzeRisk);
        assert!(reason.contains("risk analysis"));
        assert!(!reason.contains("10.0.0.4"));
        assert!(!reason.contains("503"));
    }
}
