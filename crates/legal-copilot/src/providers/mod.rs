//! Provider abstractions for text generation and embeddings
//!
//! The pipeline and Q&A reach both capabilities only through these traits, so
//! Ollama, the offline hashing embedder, and test doubles are interchangeable.

pub mod embedding;
pub mod llm;
pub mod local;
pub mod ollama;

pub use embedding::EmbeddingProvider;
pub use llm::LlmProvider;
pub use local::{HashEmbedder, HASH_RELEVANCE_FLOOR};
pub use ollama::{OllamaEmbedder, OllamaLlm};
