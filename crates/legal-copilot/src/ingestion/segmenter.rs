//! Sentence-aware segmentation with byte-offset tracking

use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::Passage;

/// Splits raw text into ordered passages of bounded size
///
/// Passages are packed from whole sentences where possible; a sentence longer than
/// `chunk_size` is broken at word boundaries, and a single over-long word at grapheme
/// boundaries. Consecutive passages share up to `overlap` bytes of trailing sentences.
#[derive(Debug, Clone)]
pub struct Segmenter {
    /// Maximum passage size in bytes
    chunk_size: usize,
    /// Overlap between consecutive passages in bytes
    overlap: usize,
}

/// Byte range of one packing unit in the raw text
type Unit = (usize, usize);

impl Segmenter {
    /// Create a new segmenter
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Segment a document's text
    ///
    /// Identical text always yields identical boundaries. Empty or whitespace-only text
    /// is rejected with [`Error::EmptyDocument`].
    pub fn segment(&self, document_id: Uuid, text: &str) -> Result<Vec<Passage>> {
        if text.trim().is_empty() {
            return Err(Error::EmptyDocument);
        }

        let units = self.units(text);
        let mut passages = Vec::new();
        let mut i = 0usize;

        while i < units.len() {
            let window_start = units[i].0;
            let mut j = i + 1;
            while j < units.len() && units[j].1 - window_start <= self.chunk_size {
                j += 1;
            }
            let window_end = units[j - 1].1;

            if let Some((start, end)) = trimmed(text, window_start, window_end) {
                passages.push(Passage::new(
                    document_id,
                    passages.len() as u32,
                    start,
                    end,
                    text[start..end].to_string(),
                ));
            }

            if j == units.len() {
                break;
            }

            // Back up over trailing units that fit in the overlap, always moving forward
            let mut k = j;
            while k - 1 > i && window_end - units[k - 1].0 <= self.overlap {
                k -= 1;
            }
            i = k;
        }

        tracing::debug!(
            "Segmented document {} into {} passages ({} bytes)",
            document_id,
            passages.len(),
            text.len()
        );

        Ok(passages)
    }

    /// Contiguous units covering the text, none longer than `chunk_size`
    fn units(&self, text: &str) -> Vec<Unit> {
        let mut units = Vec::new();
        for (offset, sentence) in text.split_sentence_bound_indices() {
            if sentence.len() <= self.chunk_size {
                units.push((offset, offset + sentence.len()));
            } else {
                self.split_oversized(text, offset, offset + sentence.len(), &mut units);
            }
        }
        units
    }

    /// Break an over-long sentence at word boundaries
    fn split_oversized(&self, text: &str, start: usize, end: usize, units: &mut Vec<Unit>) {
        let mut piece_start = start;

        for (offset, word) in text[start..end].split_word_bound_indices() {
            let word_start = start + offset;
            let word_end = word_start + word.len();

            if word_end - piece_start <= self.chunk_size {
                continue;
            }
            if word_start > piece_start {
                units.push((piece_start, word_start));
            }
            piece_start = word_start;

            if word.len() > self.chunk_size {
                piece_start = self.split_graphemes(text, word_start, word_end, units);
            }
        }

        if end > piece_start {
            units.push((piece_start, end));
        }
    }

    /// Break an over-long word at grapheme boundaries; returns the start of the remainder
    fn split_graphemes(
        &self,
        text: &str,
        start: usize,
        end: usize,
        units: &mut Vec<Unit>,
    ) -> usize {
        let mut piece_start = start;
        for (offset, grapheme) in text[start..end].grapheme_indices(true) {
            let grapheme_end = start + offset + grapheme.len();
            if grapheme_end - piece_start > self.chunk_size {
                let split_at = start + offset;
                if split_at > piece_start {
                    units.push((piece_start, split_at));
                    piece_start = split_at;
                }
            }
        }
        piece_start
    }
}

/// Trim surrounding whitespace from `text[start..end]`, returning adjusted offsets
fn trimmed(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let body = slice.trim();
    if body.is_empty() {
        return None;
    }
    let lead = slice.len() - slice.trim_start().len();
    Some((start + lead, start + lead + body.len()))
}
