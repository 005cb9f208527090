//! Question answering request and response types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed reply when no passage clears the relevance threshold
pub const INSUFFICIENT_INFORMATION_ANSWER: &str =
    "The document does not contain sufficient information to answer this question.";

/// One prior exchange supplied by the caller; never stored server-side
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// Question about a single indexed document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    /// Document to answer from
    pub document_id: Uuid,

    /// Free-form question
    pub question: String,

    /// Prior turns to include in the prompt (default: none)
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

impl AskRequest {
    /// Create a request without history
    pub fn new(document_id: Uuid, question: impl Into<String>) -> Self {
        Self {
            document_id,
            question: question.into(),
            history: Vec::new(),
        }
    }

    /// Attach prior turns
    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }
}

/// Grounded answer with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    /// Passages the answer was generated from, in rank order
    pub passage_ids: Vec<Uuid>,
    /// False when the fixed insufficient-information reply was returned
    pub grounded: bool,
    pub asked_at: chrono::DateTime<chrono::Utc>,
}

impl Answer {
    /// Answer built from retrieved passages
    pub fn grounded(question: String, answer: String, passage_ids: Vec<Uuid>) -> Self {
        Self {
            question,
            answer,
            passage_ids,
            grounded: true,
            asked_at: chrono::Utc::now(),
        }
    }

    /// The fixed reply with empty provenance
    pub fn insufficient(question: String) -> Self {
        Self {
            question,
            answer: INSUFFICIENT_INFORMATION_ANSWER.to_string(),
            passage_ids: Vec::new(),
            grounded: false,
            asked_at: chrono::Utc::now(),
        }
    }
}
