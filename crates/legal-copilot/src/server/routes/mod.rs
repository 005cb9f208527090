//! API routes for the copilot server

pub mod documents;
pub mod query;

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_body_size: usize) -> Router<AppState> {
    Router::new()
        // Pipeline
        .route(
            "/documents",
            post(documents::submit_document).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/documents", get(documents::list_documents))
        .route("/documents/:id", get(documents::get_document))
        .route("/documents/:id/events", get(documents::document_events))
        .route("/documents/:id/report", get(documents::get_report))
        .route("/documents/:id/cancel", post(documents::cancel_document))
        // Q&A
        .route("/ask", post(query::ask))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "legal-copilot",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Staged legal document analysis with progress streaming and grounded Q&A",
        "models": {
            "llm": state.llm_provider().model(),
            "embeddings": state.embedding_provider().name(),
            "dimensions": state.embedding_provider().dimensions(),
        },
        "pipelines": state.orchestrator().db().get_stats().ok(),
        "retrieval": {
            "top_k": state.qa().top_k(),
            "min_relevance": state.qa().min_relevance(),
        },
        "endpoints": {
            "POST /api/documents": "Submit document text for analysis",
            "GET /api/documents": "List pipelines",
            "GET /api/documents/:id": "Pipeline state and stage results",
            "GET /api/documents/:id/events": "Progress events (Server-Sent Events, honours Last-Event-ID)",
            "GET /api/documents/:id/report": "Final report (409 until completed)",
            "POST /api/documents/:id/cancel": "Cancel processing",
            "POST /api/ask": "Ask a question about an indexed document"
        }
    }))
}
