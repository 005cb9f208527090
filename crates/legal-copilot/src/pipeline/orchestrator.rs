//! Drives each document through the stage sequence
//!
//! Stages of one document run strictly one at a time under that document's step lock;
//! different documents run concurrently and share nothing mutable except the
//! registry. Every transition is persisted together with its stage result and event
//! before it becomes visible in memory.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::BoxStream;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::agents::{AgentContext, StageAgents};
use crate::config::CopilotConfig;
use crate::error::{Error, Result};
use crate::index::PassageIndex;
use crate::ingestion::Segmenter;
use crate::providers::LlmProvider;
use crate::storage::{PipelineDb, StoredPipeline};
use crate::types::{
    Document, PipelineState, ProgressEvent, Report, StageKind, StagePayload, StageResult,
};

use super::events::EventLog;
use super::retry::RetryPolicy;
use super::transitions::{transition_from, Transition};

/// Failure reason recorded for cancelled pipelines
pub const CANCELLED_REASON: &str = "Processing was cancelled";

/// Title used when the caller does not supply one
const UNTITLED: &str = "Untitled document";

/// New document for analysis
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub text: String,
    pub title: Option<String>,
    /// Resubmitting an existing id returns that pipeline instead of starting over
    pub document_id: Option<Uuid>,
}

/// Handle returned by [`Orchestrator::submit`]
pub struct Submission {
    pub document_id: Uuid,
    pub state: PipelineState,
    /// Progress events from sequence 0
    pub events: BoxStream<'static, ProgressEvent>,
}

/// One row of [`Orchestrator::list`]
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub document_id: Uuid,
    pub title: String,
    pub state: PipelineState,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Full status of one pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub document_id: Uuid,
    pub title: String,
    pub state: PipelineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub passage_count: usize,
    pub results: Vec<StageResult>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of [`Orchestrator::recover`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryStats {
    pub restored: usize,
    pub resumed: usize,
    pub indexes_restored: usize,
}

/// In-memory state of one document
struct Pipeline {
    document: Arc<Document>,
    state: RwLock<PipelineState>,
    results: RwLock<Vec<StageResult>>,
    failure_reason: RwLock<Option<String>>,
    events: Arc<EventLog>,
    step: tokio::sync::Mutex<()>,
    cancel_requested: AtomicBool,
    running: AtomicBool,
}

impl Pipeline {
    fn new(
        document: Document,
        state: PipelineState,
        results: Vec<StageResult>,
        failure_reason: Option<String>,
        events: EventLog,
    ) -> Self {
        Self {
            document: Arc::new(document),
            state: RwLock::new(state),
            results: RwLock::new(results),
            failure_reason: RwLock::new(failure_reason),
            events: Arc::new(events),
            step: tokio::sync::Mutex::new(()),
            cancel_requested: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    fn state(&self) -> PipelineState {
        *self.state.read()
    }

    fn results(&self) -> Vec<StageResult> {
        self.results.read().clone()
    }

    fn id(&self) -> Uuid {
        self.document.id
    }
}

/// Clears the running flag when a run loop ends, even if its task is dropped
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Pipeline orchestrator
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    db: Arc<PipelineDb>,
    index: Arc<PassageIndex>,
    agents: StageAgents,
    segmenter: Segmenter,
    retry: RetryPolicy,
    pipelines: DashMap<Uuid, Arc<Pipeline>>,
}

impl Orchestrator {
    pub fn new(
        db: Arc<PipelineDb>,
        index: Arc<PassageIndex>,
        agents: StageAgents,
        segmenter: Segmenter,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                db,
                index,
                agents,
                segmenter,
                retry,
                pipelines: DashMap::new(),
            }),
        }
    }

    /// Orchestrator with the default agents for one text-generation provider
    pub fn from_config(
        config: &CopilotConfig,
        db: Arc<PipelineDb>,
        index: Arc<PassageIndex>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        let agents = StageAgents::new(llm, Arc::clone(&index), Arc::clone(&db));
        Self::new(
            db,
            index,
            agents,
            Segmenter::from_config(&config.chunking),
            RetryPolicy::from_config(&config.pipeline),
        )
    }

    pub fn index(&self) -> &Arc<PassageIndex> {
        &self.inner.index
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    pub fn db(&self) -> &Arc<PipelineDb> {
        &self.inner.db
    }

    /// Segment, start, and run a document in the background
    ///
    /// Input errors are returned before any pipeline state exists.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Submission> {
        if let Some(existing) = request
            .document_id
            .and_then(|id| self.inner.pipelines.get(&id).map(|p| Arc::clone(p.value())))
        {
            tracing::info!("Document {} already submitted", existing.id());
            return Ok(Submission {
                document_id: existing.id(),
                state: existing.state(),
                events: existing.events.subscribe(0),
            });
        }

        let document_id = request.document_id.unwrap_or_else(Uuid::new_v4);
        let passages = self.inner.segmenter.segment(document_id, &request.text)?;
        let title = request
            .title
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        let document = Document::new(document_id, title, request.text, passages);
        let state = self.start(document)?;
        let events = self.subscribe(document_id, 0)?;
        self.spawn_run(document_id);

        Ok(Submission {
            document_id,
            state,
            events,
        })
    }

    /// Create the pipeline in Uploaded; an existing pipeline is left unchanged
    pub fn start(&self, document: Document) -> Result<PipelineState> {
        let document_id = document.id;
        match self.inner.pipelines.entry(document_id) {
            Entry::Occupied(existing) => Ok(existing.get().state()),
            Entry::Vacant(slot) => {
                let event = ProgressEvent::state(document_id, PipelineState::Uploaded);
                self.inner.db.insert_document(&document, &event)?;

                tracing::info!(
                    "Document {} uploaded: '{}' ({} passages)",
                    document_id,
                    document.title,
                    document.passages.len()
                );

                slot.insert(Arc::new(Pipeline::new(
                    document,
                    PipelineState::Uploaded,
                    Vec::new(),
                    None,
                    EventLog::from_events(vec![event]),
                )));
                Ok(PipelineState::Uploaded)
            }
        }
    }

    /// Execute the next stage; terminal pipelines are returned unchanged
    pub async fn advance(&self, document_id: Uuid) -> Result<PipelineState> {
        let pipeline = self.pipeline(document_id)?;
        let _step = pipeline.step.lock().await;
        self.advance_locked(&pipeline).await
    }

    async fn advance_locked(&self, pipeline: &Pipeline) -> Result<PipelineState> {
        let state = pipeline.state();
        if state.is_terminal() {
            return Ok(state);
        }
        if pipeline.cancel_requested.load(Ordering::SeqCst) {
            tracing::info!("Document {} cancelled in state {}", pipeline.id(), state);
            self.fail(pipeline, None, CANCELLED_REASON.to_string());
            return Ok(PipelineState::Failed);
        }

        let transition = transition_from(state).ok_or_else(|| {
            Error::InvalidTransition(format!("no stage leaves state {}", state))
        })?;

        let ctx = AgentContext::new(Arc::clone(&pipeline.document), pipeline.results());
        let prepared = transition
            .check(&ctx.results)
            .and_then(|_| self.inner.agents.get(transition.stage));
        let agent = match prepared {
            Ok(agent) => agent,
            Err(err) => return Ok(self.fail_stage(pipeline, transition.stage, err)),
        };

        tracing::info!(
            "Document {}: running {} stage",
            pipeline.id(),
            transition.stage
        );
        let outcome = self
            .inner
            .retry
            .run_stage(transition.stage, || agent.run(&ctx))
            .await;

        match outcome {
            Ok(payload) => Ok(self.record(pipeline, transition, payload)),
            Err(err) => Ok(self.fail_stage(pipeline, transition.stage, err)),
        }
    }

    /// Persist and publish a completed stage
    fn record(
        &self,
        pipeline: &Pipeline,
        transition: &Transition,
        payload: StagePayload,
    ) -> PipelineState {
        let document_id = pipeline.id();
        let result = StageResult::new(transition.stage, payload);
        let report = match &result.payload {
            StagePayload::Report(report) => Some(report.clone()),
            _ => None,
        };
        let event = pipeline.events.stamp(ProgressEvent::stage_completed(
            document_id,
            transition.to,
            transition.stage,
            result.payload.digest(),
            report,
        ));

        if let Err(err) = self
            .inner
            .db
            .commit_transition(document_id, &result, transition.to, &event)
        {
            return self.fail_stage(pipeline, transition.stage, err);
        }

        pipeline.results.write().push(result);
        *pipeline.state.write() = transition.to;
        tracing::info!(
            "Document {}: {} -> {} ({})",
            document_id,
            transition.from,
            transition.to,
            event.digest.as_deref().unwrap_or_default()
        );
        pipeline.events.push(event);

        transition.to
    }

    fn fail_stage(&self, pipeline: &Pipeline, stage: StageKind, err: Error) -> PipelineState {
        tracing::error!(
            "Document {}: {} stage failed: {}",
            pipeline.id(),
            stage,
            err
        );
        self.fail(pipeline, Some(stage), err.public_reason(stage));
        PipelineState::Failed
    }

    /// Move to Failed; memory is updated even if the write fails
    fn fail(&self, pipeline: &Pipeline, stage: Option<StageKind>, reason: String) {
        let document_id = pipeline.id();
        let event = pipeline
            .events
            .stamp(ProgressEvent::failed(document_id, stage, reason.clone()));

        if let Err(err) = self.inner.db.mark_failed(document_id, &reason, &event) {
            tracing::error!("Failed to persist failure of document {}: {}", document_id, err);
        }

        *pipeline.failure_reason.write() = Some(reason);
        *pipeline.state.write() = PipelineState::Failed;
        pipeline.events.push(event);
    }

    /// Advance until terminal; a second concurrent call returns immediately
    pub async fn run(&self, document_id: Uuid) -> Result<PipelineState> {
        let pipeline = self.pipeline(document_id)?;
        if pipeline.running.swap(true, Ordering::SeqCst) {
            return Ok(pipeline.state());
        }
        let _guard = RunGuard(&pipeline.running);

        loop {
            let state = self.advance(document_id).await?;
            if state.is_terminal() {
                return Ok(state);
            }
        }
    }

    /// Run on the tokio runtime without waiting
    pub fn spawn_run(&self, document_id: Uuid) {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            if let Err(err) = orchestrator.run(document_id).await {
                tracing::error!("Pipeline run for document {} ended: {}", document_id, err);
            }
        });
    }

    /// Request cooperative cancellation
    ///
    /// A stage already in flight is allowed to finish and is recorded; the pipeline
    /// fails before the next stage starts. An idle pipeline fails immediately.
    pub fn cancel(&self, document_id: Uuid) -> Result<PipelineState> {
        let pipeline = self.pipeline(document_id)?;
        let state = pipeline.state();
        if state.is_terminal() {
            return Ok(state);
        }

        pipeline.cancel_requested.store(true, Ordering::SeqCst);
        let outcome = match pipeline.step.try_lock() {
            Ok(_step) => {
                let state = pipeline.state();
                if state.is_terminal() {
                    return Ok(state);
                }
                tracing::info!("Document {} cancelled while idle", document_id);
                self.fail(&pipeline, None, CANCELLED_REASON.to_string());
                Ok(PipelineState::Failed)
            }
            Err(_) => {
                tracing::info!("Cancellation requested for document {}", document_id);
                if !pipeline.running.load(Ordering::SeqCst) {
                    self.spawn_run(document_id);
                }
                Ok(pipeline.state())
            }
        };
        outcome
    }

    pub fn state(&self, document_id: Uuid) -> Result<PipelineState> {
        Ok(self.pipeline(document_id)?.state())
    }

    pub fn failure_reason(&self, document_id: Uuid) -> Result<Option<String>> {
        Ok(self.pipeline(document_id)?.failure_reason.read().clone())
    }

    /// Results recorded so far, in stage order
    pub fn stage_results(&self, document_id: Uuid) -> Result<Vec<StageResult>> {
        Ok(self.pipeline(document_id)?.results())
    }

    /// The report, only once the pipeline is Completed
    pub fn report(&self, document_id: Uuid) -> Result<Option<Report>> {
        let pipeline = self.pipeline(document_id)?;
        if pipeline.state() != PipelineState::Completed {
            return Ok(None);
        }
        let report = pipeline.results.read().iter().find_map(|r| match &r.payload {
            StagePayload::Report(report) => Some(report.clone()),
            _ => None,
        });
        Ok(report)
    }

    pub fn document(&self, document_id: Uuid) -> Result<Arc<Document>> {
        Ok(Arc::clone(&self.pipeline(document_id)?.document))
    }

    pub fn snapshot(&self, document_id: Uuid) -> Result<PipelineSnapshot> {
        let pipeline = self.pipeline(document_id)?;
        let failure_reason = pipeline.failure_reason.read().clone();
        Ok(PipelineSnapshot {
            document_id,
            title: pipeline.document.title.clone(),
            state: pipeline.state(),
            failure_reason,
            passage_count: pipeline.document.passages.len(),
            results: pipeline.results(),
            created_at: pipeline.document.created_at,
        })
    }

    /// All pipelines, oldest first
    pub fn list(&self) -> Vec<PipelineSummary> {
        let mut pipelines: Vec<PipelineSummary> = self
            .inner
            .pipelines
            .iter()
            .map(|entry| PipelineSummary {
                document_id: *entry.key(),
                title: entry.document.title.clone(),
                state: entry.state(),
                created_at: entry.document.created_at,
            })
            .collect();
        pipelines.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        pipelines
    }

    /// Progress events from `from_sequence` onward; ends after the terminal event
    pub fn subscribe(
        &self,
        document_id: Uuid,
        from_sequence: u64,
    ) -> Result<BoxStream<'static, ProgressEvent>> {
        Ok(self.pipeline(document_id)?.events.subscribe(from_sequence))
    }

    /// Reload persisted pipelines and resume the unfinished ones
    pub async fn recover(&self) -> Result<RecoveryStats> {
        let stored = self.inner.db.load_pipelines()?;
        let mut stats = RecoveryStats::default();

        for pipeline in stored {
            let document_id = pipeline.document.id;
            if self.inner.pipelines.contains_key(&document_id) {
                continue;
            }
            if self.restore_index(&pipeline) {
                stats.indexes_restored += 1;
            }

            let StoredPipeline {
                mut document,
                state,
                failure_reason,
                results,
                events,
            } = pipeline;
            for passage in document.passages.iter_mut() {
                passage.embedding = None;
            }

            self.inner.pipelines.insert(
                document_id,
                Arc::new(Pipeline::new(
                    document,
                    state,
                    results,
                    failure_reason,
                    EventLog::from_events(events),
                )),
            );
            stats.restored += 1;

            if !state.is_terminal() {
                tracing::info!("Resuming document {} from state {}", document_id, state);
                self.spawn_run(document_id);
                stats.resumed += 1;
            }
        }

        tracing::info!(
            "Recovered {} pipelines ({} resumed, {} indexes restored)",
            stats.restored,
            stats.resumed,
            stats.indexes_restored
        );
        Ok(stats)
    }

    fn restore_index(&self, pipeline: &StoredPipeline) -> bool {
        let document = &pipeline.document;
        let has_vectors = !document.passages.is_empty()
            && document.passages.iter().all(|p| p.embedding.is_some());
        if !has_vectors || self.inner.index.contains(&document.id) {
            return false;
        }

        match self
            .inner
            .index
            .restore(document.id, document.passages.clone())
        {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!("Could not restore index for document {}: {}", document.id, err);
                false
            }
        }
    }

    /// Number of known pipelines
    pub fn len(&self) -> usize {
        self.inner.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.pipelines.is_empty()
    }

    fn pipeline(&self, document_id: Uuid) -> Result<Arc<Pipeline>> {
        self.inner
            .pipelines
            .get(&document_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::DocumentNotFound(document_id))
    }
}
