//! LLM provider trait for stage agents and question answering

use async_trait::async_trait;
use crate::error::Result;

/// Trait for text generation
///
/// Implementations:
/// - `OllamaLlm`: Local Ollama server (llama3.1, phi3, etc.)
///
/// Errors must be classified: timeouts, rate limits, and unavailable upstreams are
/// reported as [`crate::Error::Transient`] so the stage retry policy can repeat them.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate free-form text for a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate a reply expected to be a JSON document
    ///
    /// Default implementation calls `generate`; callers still extract the JSON.
    async fn generate_structured(&self, prompt: &str) -> Result<String> {
        self.generate(prompt).await
    }

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
