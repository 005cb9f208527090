//! Retrieval-based question answering over one indexed document

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::index::ScoredPassage;
use crate::pipeline::{Orchestrator, RetryPolicy};
use crate::providers::LlmProvider;
use crate::types::{Answer, AskRequest, PipelineState};

/// Answers questions from a document's passages only
///
/// Stateless between calls: any conversation history comes in with the request.
#[derive(Clone)]
pub struct RetrievalQa {
    orchestrator: Orchestrator,
    llm: Arc<dyn LlmProvider>,
    retry: RetryPolicy,
    top_k: usize,
    min_relevance: f32,
}

impl RetrievalQa {
    pub fn new(
        orchestrator: Orchestrator,
        llm: Arc<dyn LlmProvider>,
        config: &RetrievalConfig,
    ) -> Self {
        let retry = orchestrator.retry_policy().clone();
        let min_relevance = config
            .min_relevance
            .unwrap_or_else(|| orchestrator.index().relevance_floor());
        Self {
            orchestrator,
            llm,
            retry,
            top_k: config.top_k.max(1),
            min_relevance,
        }
    }

    /// Passages retrieved per question
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Similarity a passage needs before it is used as context
    pub fn min_relevance(&self) -> f32 {
        self.min_relevance
    }

    pub async fn ask(&self, request: AskRequest) -> Result<Answer> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("Question must not be empty".to_string()));
        }

        let document_id = request.document_id;
        let state = self.orchestrator.state(document_id)?;
        let index = self.orchestrator.index();
        let indexed = state.is_indexed()
            || (state == PipelineState::Failed && index.contains(&document_id));
        if !indexed {
            return Err(Error::DocumentNotIndexed(document_id));
        }

        let hits = self
            .retry
            .run_named("question embedding", || {
                index.query(document_id, question, self.top_k)
            })
            .await?;

        let relevant: Vec<ScoredPassage> = hits
            .into_iter()
            .filter(|hit| hit.score >= self.min_relevance)
            .collect();

        if relevant.is_empty() {
            tracing::debug!(
                "No passage of document {} reached relevance {:.2}",
                document_id,
                self.min_relevance
            );
            return Ok(Answer::insufficient(question.to_string()));
        }

        let context = PromptBuilder::build_context(&relevant);
        let prompt = PromptBuilder::grounded_answer(question, &context, &request.history);
        let reply = self
            .retry
            .run_named("grounded answer", || self.llm.generate(&prompt))
            .await?;

        let reply = reply.trim();
        if reply.is_empty() {
            return Ok(Answer::insufficient(question.to_string()));
        }

        tracing::info!(
            "Answered question on document {} from {} passages",
            document_id,
            relevant.len()
        );

        Ok(Answer::grounded(
            question.to_string(),
            reply.to_string(),
            relevant.iter().map(|hit| hit.passage.id).collect(),
        ))
    }
}
