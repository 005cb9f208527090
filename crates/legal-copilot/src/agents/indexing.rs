use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::index::PassageIndex;
use crate::storage::PipelineDb;
use crate::types::{StageKind, StagePayload};

use super::{AgentContext, StageAgent};

/// Embeds the document's passages and persists their vectors
pub struct IndexingStage {
    index: Arc<PassageIndex>,
    db: Arc<PipelineDb>,
}

impl IndexingStage {
    pub fn new(index: Arc<PassageIndex>, db: Arc<PipelineDb>) -> Self {
        Self { index, db }
    }
}

#[async_trait]
impl StageAgent for IndexingStage {
    fn stage(&self) -> StageKind {
        StageKind::Index
    }

    async fn run(&self, ctx: &AgentContext) -> Result<StagePayload> {
        let document = &ctx.document;

        // Already published by an earlier attempt or restored from disk
        if let Some(summary) = self.index.summary(&document.id) {
            return Ok(StagePayload::Indexed(summary));
        }

        let (summary, embedded) = self.index.index(document.id, &document.passages).await?;
        self.db.save_passage_vectors(document.id, &embedded)?;

        Ok(StagePayload::Indexed(summary))
    }
}
