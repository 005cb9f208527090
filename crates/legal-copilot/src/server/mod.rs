//! HTTP server for the legal copilot

pub mod routes;
pub mod state;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::CopilotConfig;
use crate::error::{Error, Result};
use state::{AppState, Readiness};

/// Copilot HTTP server
pub struct CopilotServer {
    config: CopilotConfig,
    state: AppState,
}

impl CopilotServer {
    /// Create a server with capabilities built from configuration
    pub fn new(config: CopilotConfig) -> Result<Self> {
        let state = AppState::new(config.clone())?;
        Ok(Self { config, state })
    }

    /// Create a server around existing state
    pub fn with_state(state: AppState) -> Self {
        Self {
            config: state.config().clone(),
            state,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness))
            .nest("/api", routes::api_routes(self.config.server.max_body_size))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.server.enable_cors {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            router
        }
    }

    /// Start the server
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = self.router();

        tracing::info!("Starting legal copilot on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Readiness check endpoint: both capabilities must answer
async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let report = state.readiness().await;
    let status = if report.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HashEmbedder;
    use crate::storage::PipelineDb;
    use crate::test_support::{sample_document, shared, ScriptedLlm, CONTRACT};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use futures::StreamExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn server() -> CopilotServer {
        let mut config = CopilotConfig::default();
        config.chunking.chunk_size = 120;
        config.chunking.chunk_overlap = 0;
        config.pipeline.initial_backoff_ms = 1;

        let (_, llm) = shared(ScriptedLlm::happy_path());
        let state = AppState::from_parts(
            config,
            Arc::new(PipelineDb::in_memory().unwrap()),
            llm,
            Arc::new(HashEmbedder::new(256)),
        );
        CopilotServer::with_state(state)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn submit_and_finish(server: &CopilotServer) -> Uuid {
        let response = server
            .router()
            .oneshot(post_json(
                "/api/documents",
                serde_json::json!({ "text": CONTRACT, "title": "MSA" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = body_json(response).await;
        assert_eq!(body["state"], "uploaded");
        let id: Uuid = body["document_id"].as_str().unwrap().parse().unwrap();
        assert_eq!(
            body["events_url"].as_str().unwrap(),
            format!("/api/documents/{}/events", id)
        );

        let events = server.state().orchestrator().subscribe(id, 0).unwrap();
        tokio::time::timeout(Duration::from_secs(10), events.collect::<Vec<_>>())
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let server = server();
        let response = server
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = server
            .router()
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["ready"], true);
    }

    #[tokio::test]
    async fn test_info_reports_effective_relevance_floor() {
        let server = server();
        let response = server
            .router()
            .oneshot(Request::get("/api/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["models"]["embeddings"], "hash");
        assert_eq!(body["retrieval"]["top_k"], 5);
        let floor = body["retrieval"]["min_relevance"].as_f64().unwrap();
        assert!((floor - 0.1).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_empty_submission_is_bad_request() {
        let server = server();
        let response = server
            .router()
            .oneshot(post_json("/api/documents", serde_json::json!({ "text": "   " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["type"], "empty_document");
        assert!(server.state().orchestrator().is_empty());
    }

    #[tokio::test]
    async fn test_report_and_questions() {
        let server = server();
        let id = submit_and_finish(&server).await;

        let response = server
            .router()
            .oneshot(
                Request::get(format!("/api/documents/{}/report", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let markdown = body["markdown"].as_str().unwrap();
        assert!(markdown.contains("\n## Executive Summary\n"));
        assert_eq!(body["report"]["sections"].as_array().unwrap().len(), 8);

        let response = server
            .router()
            .oneshot(post_json(
                "/api/ask",
                serde_json::json!({
                    "document_id": id,
                    "question": "Can either party terminate this agreement?"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["grounded"], true);
        assert!(!body["passage_ids"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_report_conflicts_until_completed() {
        let server = server();
        let document = sample_document();
        let id = document.id;
        server.state().orchestrator().start(document).unwrap();

        let response = server
            .router()
            .oneshot(
                Request::get(format!("/api/documents/{}/report", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = server
            .router()
            .oneshot(post_json(
                "/api/ask",
                serde_json::json!({ "document_id": id, "question": "Who signs?" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            body_json(response).await["error"]["type"],
            "document_not_indexed"
        );
    }

    #[tokio::test]
    async fn test_events_resume_after_last_event_id() {
        let server = server();
        let id = submit_and_finish(&server).await;

        let response = server
            .router()
            .oneshot(
                Request::get(format!("/api/documents/{}/events", id))
                    .header("Last-Event-ID", "3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("id: 3\n"));
        assert!(text.contains("id: 4\n"));
        assert!(text.contains("event: completed\n"));
    }

    #[tokio::test]
    async fn test_unknown_document_is_not_found() {
        let server = server();
        let response = server
            .router()
            .oneshot(
                Request::get(format!("/api/documents/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
