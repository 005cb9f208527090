//! Per-document passage index for similarity search
//!
//! Each document gets its own immutable vector set, published atomically once every
//! passage has been embedded. Queries only ever see complete indexes and never cross
//! document boundaries.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::types::{IndexSummary, Passage};

/// Search result with passage and similarity
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    /// The retrieved passage
    pub passage: Passage,
    /// Cosine similarity (-1.0 to 1.0, higher is better)
    pub score: f32,
}

/// Embedded passages of one document
#[derive(Debug)]
struct DocumentVectors {
    dimensions: usize,
    passages: Vec<Passage>,
}

/// Write-once passage indexes keyed by document
pub struct PassageIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    documents: DashMap<Uuid, Arc<DocumentVectors>>,
}

impl PassageIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            documents: DashMap::new(),
        }
    }

    /// Embed and publish a document's passages
    ///
    /// Returns the passages with their vectors attached so the caller can persist them.
    pub async fn index(
        &self,
        document_id: Uuid,
        passages: &[Passage],
    ) -> Result<(IndexSummary, Vec<Passage>)> {
        if self.contains(&document_id) {
            return Err(Error::IndexAlreadyBuilt(document_id));
        }
        if passages.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Document {} has no passages to index",
                document_id
            )));
        }

        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != passages.len() {
            return Err(Error::embedding(format!(
                "Expected {} vectors, got {}",
                passages.len(),
                vectors.len()
            )));
        }

        let embedded: Vec<Passage> = passages
            .iter()
            .zip(vectors)
            .map(|(p, v)| p.with_embedding(v))
            .collect();

        let summary = self.publish(document_id, embedded.clone())?;
        tracing::info!(
            "Indexed document {} ({} passages, {} dimensions, {})",
            document_id,
            summary.passage_count,
            summary.dimensions,
            self.embedder.name()
        );

        Ok((summary, embedded))
    }

    /// Re-publish persisted vectors without recomputing them
    pub fn restore(&self, document_id: Uuid, passages: Vec<Passage>) -> Result<IndexSummary> {
        if passages.iter().any(|p| p.embedding.is_none()) {
            return Err(Error::embedding(format!(
                "Stored passages for document {} are missing vectors",
                document_id
            )));
        }
        self.publish(document_id, passages)
    }

    /// Whether an index exists for the document
    pub fn contains(&self, document_id: &Uuid) -> bool {
        self.documents.contains_key(document_id)
    }

    /// Passage count and dimensions of a published index
    pub fn summary(&self, document_id: &Uuid) -> Option<IndexSummary> {
        self.documents.get(document_id).map(|entry| IndexSummary {
            passage_count: entry.passages.len(),
            dimensions: entry.dimensions,
        })
    }

    /// Minimum useful similarity for the configured embedder
    pub fn relevance_floor(&self) -> f32 {
        self.embedder.relevance_floor()
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Top-k passages of one document by cosine similarity
    ///
    /// Results are ordered by descending score; ties go to the earlier passage.
    pub async fn query(
        &self,
        document_id: Uuid,
        text: &str,
        k: usize,
    ) -> Result<Vec<ScoredPassage>> {
        let vectors = self
            .documents
            .get(&document_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::IndexNotFound(document_id))?;

        let query = self.embedder.embed(text).await?;
        if query.len() != vectors.dimensions {
            return Err(Error::embedding(format!(
                "Query vector has {} dimensions, index has {}",
                query.len(),
                vectors.dimensions
            )));
        }

        let mut scored: Vec<ScoredPassage> = vectors
            .passages
            .iter()
            .filter_map(|p| {
                p.embedding.as_deref().map(|v| ScoredPassage {
                    score: cosine_similarity(&query, v),
                    passage: p.clone(),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.passage.index.cmp(&b.passage.index))
        });
        scored.truncate(k);

        tracing::debug!(
            "Query on document {} returned {} passages (top score {:?})",
            document_id,
            scored.len(),
            scored.first().map(|s| s.score)
        );

        Ok(scored)
    }

    fn publish(&self, document_id: Uuid, passages: Vec<Passage>) -> Result<IndexSummary> {
        let dimensions = passages
            .first()
            .and_then(|p| p.embedding.as_ref())
            .map(Vec::len)
            .unwrap_or(0);
        if dimensions == 0 {
            return Err(Error::embedding("Embedding vectors are empty"));
        }
        if passages
            .iter()
            .any(|p| p.embedding.as_ref().map(Vec::len) != Some(dimensions))
        {
            return Err(Error::embedding(format!(
                "Inconsistent vector dimensions for document {}",
                document_id
            )));
        }

        let summary = IndexSummary {
            passage_count: passages.len(),
            dimensions,
        };

        match self.documents.entry(document_id) {
            Entry::Occupied(_) => Err(Error::IndexAlreadyBuilt(document_id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(DocumentVectors {
                    dimensions,
                    passages,
                }));
                Ok(summary)
            }
        }
    }
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let dot: f32 = left.iter().zip(right).map(|(l, r)| l * r).sum();
    let left_norm = left.iter().map(|v| v * v).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|v| v * v).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::Segmenter;
    use crate::providers::HashEmbedder;

    const CONTRACT: &str = "Either party may terminate this Agreement with thirty days written notice. \
        The Supplier shall deliver the goods to the Buyer's warehouse. \
        The Receiving Party shall keep all Confidential Information secret.";

    fn index() -> PassageIndex {
        PassageIndex::new(Arc::new(HashEmbedder::new(256)))
    }

    fn passages(document_id: Uuid) -> Vec<Passage> {
        Segmenter::new(80, 0).segment(document_id, CONTRACT).unwrap()
    }

    #[tokio::test]
    async fn test_query_ranks_relevant_passage_first() {
        let index = index();
        let doc = Uuid::new_v4();
        let (summary, embedded) = index.index(doc, &passages(doc)).await.unwrap();
        assert_eq!(summary.passage_count, 3);
        assert_eq!(summary.dimensions, 256);
        assert!(embedded.iter().all(|p| p.embedding.is_some()));

        let results = index
            .query(doc, "Can either party terminate this agreement?", 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].passage.text.contains("terminate"));
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_index_is_write_once() {
        let index = index();
        let doc = Uuid::new_v4();
        index.index(doc, &passages(doc)).await.unwrap();
        let err = index.index(doc, &passages(doc)).await.unwrap_err();
        assert!(matches!(err, Error::IndexAlreadyBuilt(id) if id == doc));
    }

    #[tokio::test]
    async fn test_unknown_document() {
        let err = index().query(Uuid::new_v4(), "anything", 3).await.unwrap_err();
        assert!(matches!(err, Error::IndexNotFound(_)));
    }

    #[tokio::test]
    async fn test_results_never_cross_documents() {
        let index = index();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        index.index(a, &passages(a)).await.unwrap();
        index.index(b, &passages(b)).await.unwrap();

        let results = index.query(a, "confidential information", 10).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.passage.document_id == a));
    }

    #[tokio::test]
    async fn test_ties_break_by_passage_order() {
        let index = PassageIndex::new(Arc::new(HashEmbedder::new(8)));
        let doc = Uuid::new_v4();
        let same = vec![1.0_f32, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let stored: Vec<Passage> = (0..3)
            .map(|i| Passage::new(doc, i, 0, 1, "x".to_string()).with_embedding(same.clone()))
            .collect();
        index.restore(doc, stored).unwrap();

        let results = index.query(doc, "", 3).await.unwrap();
        let order: Vec<u32> = results.iter().map(|r| r.passage.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_restore_requires_vectors() {
        let doc = Uuid::new_v4();
        let err = index().restore(doc, passages(doc)).unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
