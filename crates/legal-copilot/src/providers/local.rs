//! Offline embedding provider using feature hashing
//!
//! Each content word is cut down to a crude stem, and the stem plus its character
//! trigrams are hashed into a fixed number of signed buckets. Inflected forms such as
//! "termination" and "terminate" share most of their features. The result is
//! L2-normalized and deterministic across runs and machines, so persisted vectors stay
//! valid after a restart.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::Result;

use super::embedding::EmbeddingProvider;

/// Minimum bucket count
const MIN_DIMENSIONS: usize = 8;

/// Relevance floor for hashed vectors
///
/// Lexical overlap between a short question and a passage rarely scores above 0.3,
/// so the floor sits well below the one used for neural embeddings.
pub const HASH_RELEVANCE_FLOOR: f32 = 0.1;

/// Words that carry no retrieval signal
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "if", "in", "is", "it", "its", "of", "on", "or", "the", "this", "that", "to", "what", "when",
    "which", "who", "will", "with",
];

/// Suffixes stripped by `stem`, longest first within each family
const SUFFIXES: &[&str] = &[
    "ational", "ation", "ition", "ality", "ments", "ment", "ings", "ing", "ions", "ion", "ness",
    "ies", "ial", "ate", "ity", "ed", "es", "al", "ly", "s", "e",
];

/// Deterministic hashing embedder
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(MIN_DIMENSIONS),
        }
    }

    /// Embed text synchronously
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0_f32; self.dimensions];

        for word in text.unicode_words() {
            let word = word.to_lowercase();
            if STOP_WORDS.contains(&word.as_str()) {
                continue;
            }
            let stem = stem(&word);
            self.add_feature(&mut vector, &format!("w:{}", stem));

            let padded: Vec<char> = format!("<{}>", stem).chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                self.add_feature(&mut vector, &format!("c:{}", gram));
            }
        }

        normalize(&mut vector);
        vector
    }

    fn add_feature(&self, vector: &mut [f32], token: &str) {
        let hash = stable_hash(token);
        let index = (hash % self.dimensions as u64) as usize;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        let weight = 1.0 + (((hash >> 48) & 0xFF) as f32 / 255.0);
        vector[index] += sign * weight;
    }
}

/// Strip the first matching suffix, keeping at least three bytes of the word
fn stem(word: &str) -> &str {
    SUFFIXES
        .iter()
        .find(|suffix| word.ends_with(*suffix) && word.len() - suffix.len() >= 3)
        .map(|suffix| &word[..word.len() - suffix.len()])
        .unwrap_or(word)
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn relevance_floor(&self) -> f32 {
        HASH_RELEVANCE_FLOOR
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "hash"
    }
}

fn stable_hash(token: &str) -> u64 {
    let digest = Sha256::digest(token.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed_text("Either party may terminate this Agreement.");
        let b = embedder.embed_text("Either party may terminate this Agreement.");
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similar_text_scores_higher() {
        let embedder = HashEmbedder::new(256);
        let query = embedder.embed_text("Can either party terminate this agreement?");
        let termination = embedder.embed_text("Either party may terminate this Agreement with notice.");
        let payment = embedder.embed_text("Invoices are payable within sixty days of receipt.");
        assert!(dot(&query, &termination) > dot(&query, &payment));
    }

    #[test]
    fn test_inflections_share_features() {
        assert_eq!(stem("termination"), "termin");
        assert_eq!(stem("terminate"), "termin");
        assert_eq!(stem("fee"), "fee");

        let embedder = HashEmbedder::new(256);
        let query = embedder.embed_text("What are the termination terms?");
        let termination = embedder.embed_text(
            "Either party may terminate this Agreement with thirty days written notice to the other party.",
        );
        let confidentiality = embedder.embed_text(
            "The Receiving Party shall keep all Confidential Information strictly confidential for five years.",
        );
        assert!(dot(&query, &termination) >= HASH_RELEVANCE_FLOOR);
        assert!(dot(&query, &termination) > dot(&query, &confidentiality));
    }

    #[test]
    fn test_stop_words_only_is_zero_vector() {
        let embedder = HashEmbedder::new(32);
        assert!(embedder.embed_text("What is it?").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(16);
        assert!(embedder.embed_text("   ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_batch_matches_single() {
        let embedder = HashEmbedder::new(64);
        let texts = vec!["notice period".to_string(), "governing law".to_string()];
        let batch = tokio_test::block_on(embedder.embed_batch(&texts)).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], embedder.embed_text("governing law"));
    }
}
