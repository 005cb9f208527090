//! Legal copilot server binary
//!
//! Run with: cargo run -p legal-copilot --bin legal-copilot-server

use legal_copilot::{config::CopilotConfig, server::CopilotServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "legal_copilot=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CopilotConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - LLM model: {}", config.llm.generate_model);
    tracing::info!(
        "  - Embeddings: {:?} ({} dimensions)",
        config.embeddings.provider,
        config.embeddings.dimensions
    );
    tracing::info!(
        "  - Chunk size: {} (overlap {})",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );
    tracing::info!("  - Database: {}", config.storage.database_path.display());

    let server = CopilotServer::new(config)?;

    let readiness = server.state().readiness().await;
    if !readiness.ready {
        tracing::warn!(
            "Capabilities not ready (llm: {}, embeddings: {}); stages will retry and fail until they are",
            readiness.llm,
            readiness.embeddings
        );
    }

    let recovered = server.state().orchestrator().recover().await?;
    tracing::info!(
        "Restored {} pipelines, resumed {}",
        recovered.restored,
        recovered.resumed
    );

    tracing::info!("API: http://{}/api/info", server.address());
    server.start().await?;

    Ok(())
}
