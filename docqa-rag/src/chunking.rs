//! Text chunking.
//!
//! [`RecursiveChunker`] splits text hierarchically (paragraphs, lines, words,
//! then characters) and merges the pieces back into chunks of at most
//! `chunk_size` characters, carrying up to `chunk_overlap` characters of
//! trailing context from one chunk into the next.

use std::collections::VecDeque;

/// A strategy for splitting text into ordered spans.
pub trait Chunker: Send + Sync {
    /// Split `text` into chunks, in document order.
    ///
    /// Returns an empty `Vec` if `text` is empty or whitespace. Returned chunks are
    /// trimmed and never empty.
    fn split(&self, text: &str) -> Vec<String>;
}

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splits text hierarchically: paragraphs, then lines, words and characters.
///
/// Lengths are measured in characters, so multi-byte text is never split
/// inside a code point.
///
/// # Example
///
/// ```rust
/// use docqa_rag::chunking::{Chunker, RecursiveChunker};
///
/// let chunker = RecursiveChunker::new(12, 4);
/// let chunks = chunker.split("alpha beta gamma delta");
/// assert!(chunks.iter().all(|c| c.chars().count() <= 12));
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size: chunk_size.max(1), chunk_overlap }
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // Pick the first separator present in the text; "" always matches.
        let (index, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map(|(i, sep)| (i, *sep))
            .unwrap_or((separators.len(), ""));
        let finer = separators.get(index + 1..).unwrap_or_default();

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).map(str::to_string).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, finer));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }
        chunks
    }

    /// Join pieces with `separator` into chunks no longer than `chunk_size`,
    /// starting each new chunk with as much of the previous tail as fits in the overlap.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joined_len = |window: &VecDeque<&str>, total: usize| {
                total + len + if window.is_empty() { 0 } else { sep_len }
            };

            if joined_len(&window, total) > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &window, separator);
                while total > self.chunk_overlap
                    || (total > 0 && joined_len(&window, total) > self.chunk_size)
                {
                    let Some(front) = window.pop_front() else { break };
                    total -= char_len(front) + if window.is_empty() { 0 } else { sep_len };
                }
            }

            total += len + if window.is_empty() { 0 } else { sep_len };
            window.push_back(piece);
        }

        push_trimmed(&mut chunks, &window, separator);
        chunks
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn push_trimmed(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

impl Chunker for RecursiveChunker {
    fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split_recursive(text, &SEPARATORS)
    }
}
