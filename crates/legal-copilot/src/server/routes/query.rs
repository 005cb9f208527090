//! Grounded question answering endpoint

use axum::{extract::State, Json};
use std::time::Instant;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{Answer, AskRequest};

/// POST /api/ask - Answer a question from one document's passages
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<Answer>> {
    let start = Instant::now();
    let document_id = request.document_id;

    tracing::info!("Question on document {}: \"{}\"", document_id, request.question);

    let answer = state.qa().ask(request).await?;

    tracing::info!(
        "Answered in {:?} ({} passages, grounded: {})",
        start.elapsed(),
        answer.passage_ids.len(),
        answer.grounded
    );

    Ok(Json(answer))
}
