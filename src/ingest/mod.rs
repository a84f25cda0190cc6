//! Document ingestion: load → per-page format/translate → chunk → embed → index.
//!
//! [`IngestionPipeline`] drives one document through its status state machine and
//! [`IngestWorker`] runs pipelines off the request path with bounded concurrency.

pub mod chunking;
pub mod loader;
mod pipeline;
mod worker;

pub use chunking::{ChunkingError, PageChunk, TextChunker};
pub use loader::{LoadError, LoadedPage, PageLoader, PdfLoader};
pub use pipeline::{IngestError, IngestOutcome, IngestionPipeline};
pub use worker::IngestWorker;

use std::fmt::Display;

/// Message stored on a freshly uploaded document.
pub const QUEUED_MESSAGE: &str = "Queued for processing...";
/// Message stored when a worker picks the document up.
pub const STARTING_MESSAGE: &str = "Starting PDF processing...";
/// Message stored while the file is parsed.
pub const LOADING_MESSAGE: &str = "Loading PDF...";
/// Message stored while chunks are embedded and written.
pub const INDEXING_MESSAGE: &str = "Indexing documents...";
/// Message stored on success.
pub const COMPLETED_MESSAGE: &str = "Completed";
/// Message stored when the pipeline task panicked.
pub const PANIC_MESSAGE: &str = "Error: ingestion worker panicked";

/// Progress narration for the per-page stage; `page` is 1-based.
pub fn page_progress_message(page: u32, total: usize) -> String {
    format!("Processing & Translating page {page} of {total}...")
}

/// Message stored when ingestion fails with `error`.
pub fn failure_message(error: &impl Display) -> String {
    format!("Error: {error}")
}
