//! Ollama HTTP client for generation and embeddings
//!
//! Each call is a single attempt. Failures are classified so the stage retry policy
//! can decide what to repeat: timeouts, connection failures, 429 and 5xx responses
//! are transient; everything else is not.

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// Ollama API client
pub struct OllamaClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: LlmConfig,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_ctx: usize,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn generate_model(&self) -> &str {
        &self.config.generate_model
    }

    pub fn embed_model(&self) -> &str {
        &self.config.embed_model
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.config.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Generate a completion
    ///
    /// `json_mode` asks Ollama to constrain the reply to a JSON document.
    pub async fn generate(&self, prompt: &str, json_mode: bool) -> Result<String> {
        let url = format!("{}/api/generate", self.config.base_url);
        let request = GenerateRequest {
            model: &self.config.generate_model,
            prompt,
            stream: false,
            format: if json_mode { "json" } else { "" },
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_ctx: self.config.context_size,
            },
        };

        tracing::debug!(
            "Generating with model {} ({} prompt bytes)",
            self.config.generate_model,
            prompt.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(classify_send_error)?;
        let response = check_status(response, "Generation").await?;

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::llm(format!("Failed to parse generation response: {}", e)))?;

        Ok(generated.response)
    }

    /// Embed a batch of texts in one request
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.config.base_url);
        let request = EmbedRequest {
            model: &self.config.embed_model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(classify_send_error)?;
        let response = check_status(response, "Embedding").await?;

        let embedded: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Failed to parse embedding response: {}", e)))?;

        if embedded.embeddings.len() != texts.len() {
            return Err(Error::embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embedded.embeddings.len()
            )));
        }

        Ok(embedded.embeddings)
    }
}

fn classify_send_error(err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() {
        Error::transient(format!("Ollama request failed: {}", err))
    } else {
        Error::Http(err)
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{} failed: HTTP {} - {}", what, status, body);
    if is_transient_status(status) {
        Err(Error::transient(message))
    } else {
        Err(Error::llm(message))
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..LlmConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        let err = client.generate("hello", false).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {}", err);
        assert!(!client.health_check().await.unwrap());
    }
}
