//! Page chunking.
//!
//! Text is first split semantically with `semchunk-rs` so windows end on paragraph, sentence or
//! word boundaries, then a sliding overlap is prepended from the previous window. Window and
//! overlap are measured either in characters or in `cl100k_base` tokens.

use crate::config::{ChunkUnit, Config};
use semchunk_rs::Chunker;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::cl100k_base;

use super::loader::LoadedPage;

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Errors raised while configuring the chunker.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Chunk size must be at least one unit.
    #[error("Chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer could not be loaded.
    #[error("Failed to load tokenizer: {0}")]
    Tokenizer(#[source] anyhow::Error),
}

/// Chunk cut from one loaded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageChunk {
    /// 0-based page the chunk came from.
    pub source_page: u32,
    /// Chunk text.
    pub text: String,
}

/// Reusable overlapping-window splitter.
#[derive(Clone)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
    counter: TokenCounter,
}

impl TextChunker {
    /// Build a chunker with an explicit window, overlap, and unit.
    pub fn new(chunk_size: usize, overlap: usize, unit: ChunkUnit) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        let counter = match unit {
            ChunkUnit::Chars => char_counter(),
            ChunkUnit::Tokens => tiktoken_counter()?,
        };
        Ok(Self {
            chunk_size,
            overlap,
            counter,
        })
    }

    /// Build the chunker described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, ChunkingError> {
        Self::new(config.chunk_size, config.chunk_overlap, config.chunk_unit)
    }

    /// Split `text` into overlapping windows. Whitespace-only input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // Base windows leave room for the overlap so the final chunk stays within the window.
        let overlap = self.overlap.min(self.chunk_size.saturating_sub(1));
        let window = self.chunk_size - overlap;
        let counter_for_chunker = self.counter.clone();
        let chunker = Chunker::new(
            window,
            Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
        );
        let base_chunks = fit_to_window(chunker.chunk(text), window, &self.counter);
        apply_overlap(base_chunks, self.chunk_size, overlap, &self.counter)
            .into_iter()
            .filter(|chunk| !chunk.trim().is_empty())
            .collect()
    }

    /// Chunk every page independently, keeping page order. Chunks never span pages.
    pub fn chunk_pages(&self, pages: &[LoadedPage]) -> Vec<PageChunk> {
        pages
            .iter()
            .flat_map(|page| {
                self.chunk(&page.text)
                    .into_iter()
                    .map(move |text| PageChunk {
                        source_page: page.index,
                        text,
                    })
            })
            .collect()
    }

    /// Size of `text` in this chunker's unit.
    pub fn measure(&self, text: &str) -> usize {
        self.counter.as_ref()(text)
    }
}

fn char_counter() -> TokenCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

fn tiktoken_counter() -> Result<TokenCounter, ChunkingError> {
    let encoding = Arc::new(cl100k_base().map_err(ChunkingError::Tokenizer)?);
    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

/// Re-pack splitter output so no window exceeds `window` units.
///
/// The splitter may admit one split past its budget when no prefix fits exactly. The overflow
/// is carried into the start of the following window.
fn fit_to_window(chunks: Vec<String>, window: usize, counter: &TokenCounter) -> Vec<String> {
    let mut packed = Vec::with_capacity(chunks.len());
    let mut carry = String::new();

    for chunk in chunks {
        let mut current = if carry.is_empty() {
            chunk
        } else {
            format!("{carry} {}", chunk.trim_start())
        };

        let mut overflowed = false;
        while counter.as_ref()(&current) > window {
            let (head, tail) = split_at_budget(&current, window, counter);
            if head.is_empty() {
                break;
            }
            packed.push(head);
            current = tail;
            overflowed = true;
        }

        if overflowed {
            carry = current;
        } else {
            packed.push(current);
            carry = String::new();
        }
    }

    if !carry.trim().is_empty() {
        packed.push(carry);
    }
    packed
}

/// Longest prefix within `budget`, cut at whitespace when possible, and the remainder.
fn split_at_budget(text: &str, budget: usize, counter: &TokenCounter) -> (String, String) {
    let fits = |end: usize| counter.as_ref()(text[..end].trim_end()) <= budget;

    let breaks: Vec<usize> = text
        .char_indices()
        .filter(|(offset, ch)| *offset > 0 && ch.is_whitespace())
        .map(|(offset, _)| offset)
        .collect();
    let fitting_breaks = breaks.partition_point(|&end| fits(end));
    let cut = if fitting_breaks > 0 {
        breaks[fitting_breaks - 1]
    } else {
        let ends: Vec<usize> = text
            .char_indices()
            .skip(1)
            .map(|(offset, _)| offset)
            .collect();
        match ends.partition_point(|&end| fits(end)) {
            0 => return (String::new(), text.to_string()),
            fitting => ends[fitting - 1],
        }
    };

    (
        text[..cut].trim_end().to_string(),
        text[cut..].trim_start().to_string(),
    )
}

/// Apply a limited overlap between the tail of the previous chunk and the current one.
///
/// Ensures the resulting overlapped chunk does not exceed `chunk_size` by trimming from the
/// start as needed.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    counter: &TokenCounter,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if effective_overlap == 0 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;

    for current in chunks {
        let chunk = match previous.as_deref() {
            Some(prev) => {
                build_overlapped_chunk(prev, &current, effective_overlap, chunk_size, counter)
            }
            None => current.clone(),
        };
        overlapped.push(chunk);
        previous = Some(current);
    }

    overlapped
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    counter: &TokenCounter,
) -> String {
    let tail = tail_within_limit(previous, overlap, counter);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);

    if !tail.is_empty() {
        combined.push_str(tail);
        if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
            combined.push(' ');
        }
    }

    combined.push_str(current);
    trim_to_budget(&combined, chunk_size, counter)
}

/// Longest suffix of `text` (left-trimmed) that fits in `limit` units.
fn tail_within_limit<'a>(text: &'a str, limit: usize, counter: &TokenCounter) -> &'a str {
    if limit == 0 {
        return "";
    }
    longest_fitting_suffix(text, limit, counter)
}

fn trim_to_budget(text: &str, budget: usize, counter: &TokenCounter) -> String {
    if budget == 0 {
        return String::new();
    }
    longest_fitting_suffix(text, budget, counter).to_string()
}

/// Suffix size only shrinks as the start offset moves right, so the first fitting offset is
/// found by bisection over char boundaries.
fn longest_fitting_suffix<'a>(text: &'a str, limit: usize, counter: &TokenCounter) -> &'a str {
    let offsets: Vec<usize> = text.char_indices().map(|(offset, _)| offset).collect();
    let first_fitting =
        offsets.partition_point(|&offset| counter.as_ref()(text[offset..].trim_start()) > limit);

    offsets
        .get(first_fitting)
        .map_or("", |&offset| text[offset..].trim_start())
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}
