//! Ollama-based providers for embeddings and LLM
//!
//! Wraps the OllamaClient to implement the provider traits.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::generation::OllamaClient;

use super::embedding::EmbeddingProvider;
use super::llm::LlmProvider;

/// Ollama embedding provider using nomic-embed-text or similar models
pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    dimensions: usize,
    batch_size: usize,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder
    pub fn new(config: &LlmConfig, dimensions: usize, batch_size: usize) -> Result<Self> {
        Ok(Self::from_client(
            Arc::new(OllamaClient::new(config)?),
            dimensions,
            batch_size,
        ))
    }

    /// Create from existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>, dimensions: usize, batch_size: usize) -> Self {
        Self {
            client,
            dimensions,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.client.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::embedding("Ollama returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.client.embed_batch(batch).await?);
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Ollama LLM provider for stage agents and Q&A
pub struct OllamaLlm {
    client: Arc<OllamaClient>,
    model: String,
}

impl OllamaLlm {
    /// Create a new Ollama LLM provider
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self::from_client(Arc::new(OllamaClient::new(config)?)))
    }

    /// Create from existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>) -> Self {
        let model = client.generate_model().to_string();
        Self { client, model }
    }
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.client.generate(prompt, false).await
    }

    async fn generate_structured(&self, prompt: &str) -> Result<String> {
        self.client.generate(prompt, true).await
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
