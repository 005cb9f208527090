//! Document and passage types with byte-offset tracking for provenance

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A submitted document and its segmented passages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: Uuid,
    /// Original filename or caller-supplied label
    pub title: String,
    /// SHA-256 of the raw text
    pub content_hash: String,
    /// Raw extracted text
    pub raw_text: String,
    /// Ordered passages
    pub passages: Vec<Passage>,
    /// Submission timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Document {
    /// Create a document from already-segmented text
    pub fn new(id: Uuid, title: String, raw_text: String, passages: Vec<Passage>) -> Self {
        Self {
            id,
            title,
            content_hash: content_hash(&raw_text),
            raw_text,
            passages,
            created_at: chrono::Utc::now(),
        }
    }

    /// Look up a passage by ID
    pub fn passage(&self, passage_id: &Uuid) -> Option<&Passage> {
        self.passages.iter().find(|p| &p.id == passage_id)
    }
}

/// A contiguous span of document text; the unit of retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Stable passage ID (derived from document ID and ordinal)
    pub id: Uuid,
    /// Parent document ID
    pub document_id: Uuid,
    /// Ordinal within the document
    pub index: u32,
    /// Byte offsets into the raw text (`text == raw[start..end]`)
    pub start: usize,
    pub end: usize,
    /// Passage text
    pub text: String,
    /// Embedding vector, set once by the indexer
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub embedding: Option<Vec<f32>>,
}

impl Passage {
    /// Create a passage; the ID is deterministic for a given document and ordinal
    pub fn new(document_id: Uuid, index: u32, start: usize, end: usize, text: String) -> Self {
        Self {
            id: passage_id(&document_id, index),
            document_id,
            index,
            start,
            end,
            text,
            embedding: None,
        }
    }

    /// Copy of this passage carrying its vector
    pub fn with_embedding(&self, embedding: Vec<f32>) -> Self {
        Self {
            embedding: Some(embedding),
            ..self.clone()
        }
    }
}

/// Deterministic passage ID
pub fn passage_id(document_id: &Uuid, index: u32) -> Uuid {
    Uuid::new_v5(document_id, format!("passage:{}", index).as_bytes())
}

/// Hex SHA-256 of document text
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
