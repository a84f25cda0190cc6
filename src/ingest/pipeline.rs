use super::{
    COMPLETED_MESSAGE, INDEXING_MESSAGE, LOADING_MESSAGE, STARTING_MESSAGE, failure_message,
    page_progress_message,
    chunking::TextChunker,
    loader::{LoadError, LoadedPage, PageLoader},
};
use crate::{
    index::{ChunkMetadata, IndexError, IndexGateway, IndexItem, chunk_key},
    llm::{LanguageModel, prompts},
    metrics::IngestMetrics,
    models::{Document, DocumentPage, DocumentStatus},
    store::{Repository, StoreError},
};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Fatal ingestion errors; any of these ends the document in `failed`.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The file could not be read as a PDF.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// A status or page write failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Embedding or vector writes failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Summary of a successful ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Page rows created.
    pub pages: usize,
    /// Chunks written to the vector index.
    pub chunks: usize,
}

/// Coordinates one document's trip from uploaded file to indexed pages.
///
/// Construct once at startup and share through an `Arc`; it holds only shared client handles.
pub struct IngestionPipeline {
    repository: Arc<dyn Repository>,
    loader: Arc<dyn PageLoader>,
    llm: Arc<dyn LanguageModel>,
    index: IndexGateway,
    chunker: TextChunker,
    target_language: String,
    metrics: Arc<IngestMetrics>,
}

impl IngestionPipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        repository: Arc<dyn Repository>,
        loader: Arc<dyn PageLoader>,
        llm: Arc<dyn LanguageModel>,
        index: IndexGateway,
        chunker: TextChunker,
        target_language: String,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            repository,
            loader,
            llm,
            index,
            chunker,
            target_language,
            metrics,
        }
    }

    /// Ingest a document end to end.
    ///
    /// Failures are persisted as `failed` with an `Error: ...` message before being returned,
    /// so callers only need to log them.
    pub async fn run(&self, document_id: Uuid) -> Result<IngestOutcome, IngestError> {
        let document = self.repository.find_document(document_id).await?;
        tracing::info!(
            document_id = %document.id,
            project_id = %document.project_id,
            name = %document.name,
            "Starting ingestion"
        );

        match self.process(&document).await {
            Ok(outcome) => {
                self.metrics.record_processed(outcome.chunks as u64);
                tracing::info!(
                    document_id = %document.id,
                    pages = outcome.pages,
                    chunks = outcome.chunks,
                    "Ingestion completed"
                );
                Ok(outcome)
            }
            Err(error) => {
                tracing::error!(document_id = %document.id, error = %error, "Ingestion failed");
                self.mark_failed(document.id, failure_message(&error)).await;
                Err(error)
            }
        }
    }

    /// Persist a terminal `failed` status. Logs instead of failing when the row is gone.
    pub async fn mark_failed(&self, document_id: Uuid, message: String) {
        self.metrics.record_failed();
        if let Err(error) = self
            .repository
            .update_document_status(document_id, DocumentStatus::Failed, Some(message))
            .await
        {
            tracing::warn!(
                document_id = %document_id,
                error = %error,
                "Could not persist failed status"
            );
        }
    }

    async fn process(&self, document: &Document) -> Result<IngestOutcome, IngestError> {
        self.set_progress(document.id, STARTING_MESSAGE.to_string())
            .await?;

        self.set_progress(document.id, LOADING_MESSAGE.to_string())
            .await?;
        let pages = self.loader.load(&document.file).await?;
        tracing::debug!(document_id = %document.id, pages = pages.len(), "PDF loaded");

        self.transform_pages(document, &pages).await?;

        self.set_progress(document.id, INDEXING_MESSAGE.to_string())
            .await?;
        let chunks = self.index_pages(document, &pages).await?;

        self.repository
            .update_document_status(
                document.id,
                DocumentStatus::Processed,
                Some(COMPLETED_MESSAGE.to_string()),
            )
            .await?;

        Ok(IngestOutcome {
            pages: pages.len(),
            chunks,
        })
    }

    async fn set_progress(&self, document_id: Uuid, message: String) -> Result<(), StoreError> {
        self.repository
            .update_document_status(document_id, DocumentStatus::Processing, Some(message))
            .await
    }

    /// Format and translate each page in order, persisting one page row per source page.
    async fn transform_pages(
        &self,
        document: &Document,
        pages: &[LoadedPage],
    ) -> Result<(), IngestError> {
        let total = pages.len();

        for page in pages {
            let page_number = page.index + 1;
            self.set_progress(document.id, page_progress_message(page_number, total))
                .await?;

            let original_text = match self.llm.complete(&prompts::format_page(&page.text)).await {
                Ok(formatted) => prompts::strip_code_fences(&formatted),
                Err(error) => {
                    tracing::warn!(
                        document_id = %document.id,
                        page = page_number,
                        error = %error,
                        "Formatting failed; keeping raw page text"
                    );
                    page.text.clone()
                }
            };

            let translated_text = match self
                .llm
                .complete(&prompts::translate_page(
                    &original_text,
                    &self.target_language,
                ))
                .await
            {
                Ok(translated) => prompts::strip_code_fences(&translated),
                Err(error) => {
                    tracing::warn!(
                        document_id = %document.id,
                        page = page_number,
                        error = %error,
                        "Translation failed; storing empty translation"
                    );
                    String::new()
                }
            };

            self.repository
                .create_page(DocumentPage {
                    id: Uuid::new_v4(),
                    document_id: document.id,
                    page_number,
                    original_text,
                    translated_text,
                })
                .await?;
        }

        Ok(())
    }

    /// Chunk the raw loaded text, embed every chunk in one batch, and upsert the result.
    async fn index_pages(
        &self,
        document: &Document,
        pages: &[LoadedPage],
    ) -> Result<usize, IngestError> {
        let chunks = self.chunker.chunk_pages(pages);
        if chunks.is_empty() {
            tracing::info!(document_id = %document.id, "No extractable text; skipping indexing");
            return Ok(0);
        }

        let document_id = document.id.to_string();
        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.index.embed(texts).await?;

        let items: Vec<_> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(sequence, (chunk, embedding))| IndexItem {
                id: chunk_key(&document_id, sequence),
                embedding,
                text: chunk.text,
                metadata: ChunkMetadata {
                    document_id: document_id.clone(),
                    source_page: chunk.source_page,
                    name: document.name.clone(),
                },
            })
            .collect();

        let count = items.len();
        let project_key = document.project_id.to_string();
        self.index.upsert(&project_key, items).await?;

        // Chunks must not outlive their document row.
        match self.repository.find_document(document.id).await {
            Ok(_) => {}
            Err(error @ StoreError::NotFound { .. }) => {
                tracing::warn!(
                    document_id = %document.id,
                    chunks = count,
                    "Document deleted during ingestion; removing its chunks"
                );
                self.index
                    .delete_by_document(&project_key, &document_id)
                    .await?;
                return Err(error.into());
            }
            Err(error) => return Err(error.into()),
        }

        tracing::debug!(document_id = %document.id, chunks = count, "Chunks indexed");
        Ok(count)
    }
}
