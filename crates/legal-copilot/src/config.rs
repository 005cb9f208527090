//! Configuration for the legal copilot service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable naming a TOML config file
pub const CONFIG_ENV_VAR: &str = "LEGAL_COPILOT_CONFIG";

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CopilotConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Passage segmentation
    pub chunking: ChunkingConfig,
    /// Ollama/LLM configuration
    pub llm: LlmConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Stage retry and timeout policy
    pub pipeline: PipelineConfig,
    /// Question answering retrieval
    pub retrieval: RetrievalConfig,
    /// Durable state
    pub storage: StorageConfig,
}

impl CopilotConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `LEGAL_COPILOT_CONFIG` if set, otherwise defaults
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be positive".to_string()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(
                "chunking.chunk_overlap must be smaller than chunk_size".to_string(),
            ));
        }
        if self.pipeline.max_attempts == 0 {
            return Err(Error::Config("pipeline.max_attempts must be at least 1".to_string()));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be at least 1".to_string()));
        }
        if let Some(min_relevance) = self.retrieval.min_relevance {
            if !(-1.0..=1.0).contains(&min_relevance) {
                return Err(Error::Config(
                    "retrieval.min_relevance must be within [-1, 1]".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum request body in bytes (default: 20MB)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_body_size: 20 * 1024 * 1024,
        }
    }
}

/// Passage segmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum passage length in bytes
    pub chunk_size: usize,
    /// Bytes of trailing sentences repeated at the start of the next passage
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Embedding model name
    pub embed_model: String,
    /// Generation model name
    pub generate_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
    /// Context window size (tokens)
    pub context_size: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            generate_model: "llama3.1:8b".to_string(),
            temperature: 0.2,
            timeout_secs: 120,
            context_size: 8192,
        }
    }
}

/// Which embedding capability to inject
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Ollama `/api/embed`
    #[default]
    Ollama,
    /// Offline feature hashing
    Hash,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    /// Vector dimensions (768 for nomic-embed-text)
    pub dimensions: usize,
    /// Passages per embedding request
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Ollama,
            dimensions: 768,
            batch_size: 32,
        }
    }
}

/// Stage retry and timeout policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Attempts per stage, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: u32,
    pub max_backoff_ms: u64,
    /// Time budget for a single stage attempt
    pub stage_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2,
            max_backoff_ms: 8000,
            stage_timeout_secs: 180,
        }
    }
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

/// Retrieval configuration for question answering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages retrieved per question
    pub top_k: usize,
    /// Minimum cosine similarity for a passage to be used
    ///
    /// Unset means the embedding backend's own floor (0.25 for Ollama, 0.1 for hash).
    pub min_relevance: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_relevance: None,
        }
    }
}

/// Durable state configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let database_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("legal-copilot")
            .join("pipeline.db");

        Self { database_path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CopilotConfig::default();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.pipeline.max_attempts, 3);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.min_relevance, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[pipeline]\nmax_attempts = 5\n\n[embeddings]\nprovider = \"hash\"\ndimensions = 256\n\n[retrieval]\nmin_relevance = 0.3"
        )
        .unwrap();

        let config = CopilotConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pipeline.max_attempts, 5);
        assert_eq!(config.pipeline.initial_backoff_ms, 500);
        assert_eq!(config.embeddings.provider, EmbeddingBackend::Hash);
        assert_eq!(config.embeddings.dimensions, 256);
        assert_eq!(config.retrieval.min_relevance, Some(0.3));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let mut config = CopilotConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
