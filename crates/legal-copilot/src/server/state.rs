//! Application state for the copilot server

use serde::Serialize;
use std::sync::Arc;

use crate::config::{CopilotConfig, EmbeddingBackend};
use crate::error::Result;
use crate::generation::OllamaClient;
use crate::index::PassageIndex;
use crate::pipeline::Orchestrator;
use crate::providers::{EmbeddingProvider, HashEmbedder, LlmProvider, OllamaEmbedder, OllamaLlm};
use crate::qa::RetrievalQa;
use crate::storage::PipelineDb;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: CopilotConfig,
    orchestrator: Orchestrator,
    qa: RetrievalQa,
    llm_provider: Arc<dyn LlmProvider>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
}

/// Capability health as reported by `/ready`
#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub llm: bool,
    pub embeddings: bool,
}

impl AppState {
    /// Open storage and connect the configured capabilities
    pub fn new(config: CopilotConfig) -> Result<Self> {
        tracing::info!(
            "Initializing application state (database: {})",
            config.storage.database_path.display()
        );
        let db = Arc::new(PipelineDb::new(&config.storage.database_path)?);

        let ollama = Arc::new(OllamaClient::new(&config.llm)?);
        let llm_provider: Arc<dyn LlmProvider> =
            Arc::new(OllamaLlm::from_client(Arc::clone(&ollama)));
        tracing::info!("Ollama client initialized (generation: {})", ollama.generate_model());

        let embedding_provider: Arc<dyn EmbeddingProvider> = match config.embeddings.provider {
            EmbeddingBackend::Ollama => {
                tracing::info!("Using Ollama embeddings ({})", ollama.embed_model());
                Arc::new(OllamaEmbedder::from_client(
                    ollama,
                    config.embeddings.dimensions,
                    config.embeddings.batch_size,
                ))
            }
            EmbeddingBackend::Hash => {
                tracing::info!(
                    "Using offline hash embeddings ({} dimensions)",
                    config.embeddings.dimensions
                );
                Arc::new(HashEmbedder::new(config.embeddings.dimensions))
            }
        };

        Ok(Self::from_parts(config, db, llm_provider, embedding_provider))
    }

    /// Assemble state from already-built capabilities
    pub fn from_parts(
        config: CopilotConfig,
        db: Arc<PipelineDb>,
        llm_provider: Arc<dyn LlmProvider>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let index = Arc::new(PassageIndex::new(Arc::clone(&embedding_provider)));
        let orchestrator =
            Orchestrator::from_config(&config, db, index, Arc::clone(&llm_provider));
        let qa = RetrievalQa::new(
            orchestrator.clone(),
            Arc::clone(&llm_provider),
            &config.retrieval,
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                orchestrator,
                qa,
                llm_provider,
                embedding_provider,
            }),
        }
    }

    pub fn config(&self) -> &CopilotConfig {
        &self.inner.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.inner.orchestrator
    }

    pub fn qa(&self) -> &RetrievalQa {
        &self.inner.qa
    }

    pub fn llm_provider(&self) -> &Arc<dyn LlmProvider> {
        &self.inner.llm_provider
    }

    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.inner.embedding_provider
    }

    /// Probe both capabilities; an error counts as unavailable
    pub async fn readiness(&self) -> Readiness {
        let llm = self.inner.llm_provider.health_check().await.unwrap_or(false);
        let embeddings = self
            .inner
            .embedding_provider
            .health_check()
            .await
            .unwrap_or(false);

        Readiness {
            ready: llm && embeddings,
            llm,
            embeddings,
        }
    }
}
