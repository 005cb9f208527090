//! Document submission, progress streaming, and report endpoints

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::pipeline::{PipelineSnapshot, PipelineSummary, SubmitRequest};
use crate::server::state::AppState;
use crate::types::{PipelineState, ProgressEvent, Report};

/// Body of POST /api/documents
#[derive(Debug, Deserialize)]
pub struct SubmitDocumentRequest {
    /// Extracted document text
    pub text: String,
    /// Filename or label shown in the report
    #[serde(default)]
    pub title: Option<String>,
    /// Reuse an existing pipeline instead of starting a new one
    #[serde(default)]
    pub document_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SubmitDocumentResponse {
    pub document_id: Uuid,
    pub state: PipelineState,
    pub events_url: String,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub document_id: Uuid,
    pub state: PipelineState,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub report: Report,
    pub markdown: String,
}

/// POST /api/documents - Start analysis of a document
pub async fn submit_document(
    State(state): State<AppState>,
    Json(request): Json<SubmitDocumentRequest>,
) -> Result<(StatusCode, Json<SubmitDocumentResponse>)> {
    tracing::info!(
        "Submission: {} bytes, title {:?}",
        request.text.len(),
        request.title
    );

    let submission = state
        .orchestrator()
        .submit(SubmitRequest {
            text: request.text,
            title: request.title,
            document_id: request.document_id,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitDocumentResponse {
            document_id: submission.document_id,
            state: submission.state,
            events_url: format!("/api/documents/{}/events", submission.document_id),
        }),
    ))
}

/// GET /api/documents - List pipelines
pub async fn list_documents(State(state): State<AppState>) -> Json<Vec<PipelineSummary>> {
    Json(state.orchestrator().list())
}

/// GET /api/documents/:id - Pipeline state and recorded stage results
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineSnapshot>> {
    Ok(Json(state.orchestrator().snapshot(id)?))
}

/// GET /api/documents/:id/events - Progress as Server-Sent Events
///
/// Replays from the start, or from just after `Last-Event-ID` when reconnecting.
pub async fn document_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let from = headers
        .get("last-event-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|last| last.saturating_add(1))
        .unwrap_or(0);

    let events = state
        .orchestrator()
        .subscribe(id, from)?
        .map(|event| Ok(to_sse_event(&event)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &ProgressEvent) -> Event {
    let sse = Event::default()
        .id(event.sequence.to_string())
        .event(event.state.as_str());
    match sse.json_data(event) {
        Ok(sse) => sse,
        Err(err) => {
            tracing::error!("Failed to encode event {}: {}", event.sequence, err);
            Event::default()
                .id(event.sequence.to_string())
                .event("error")
                .data("event could not be encoded")
        }
    }
}

/// GET /api/documents/:id/report - Final report, once completed
pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportResponse>> {
    let report = state
        .orchestrator()
        .report(id)?
        .ok_or(Error::ReportUnavailable(id))?;
    let markdown = report.to_markdown();

    Ok(Json(ReportResponse { report, markdown }))
}

/// POST /api/documents/:id/cancel - Request cancellation
pub async fn cancel_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StateResponse>> {
    let new_state = state.orchestrator().cancel(id)?;
    Ok(Json(StateResponse {
        document_id: id,
        state: new_state,
    }))
}
