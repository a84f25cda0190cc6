use super::{PANIC_MESSAGE, pipeline::IngestionPipeline};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Runs ingestion pipelines in the background with bounded concurrency.
///
/// Each submission gets its own supervising task. The pipeline itself runs in a nested task so a
/// panic surfaces as a `JoinError` and is persisted as a `failed` status instead of leaving the
/// document stuck in `processing`.
#[derive(Clone)]
pub struct IngestWorker {
    pipeline: Arc<IngestionPipeline>,
    permits: Arc<Semaphore>,
}

impl IngestWorker {
    /// Create a worker allowing at most `concurrency` ingestions at once.
    pub fn new(pipeline: Arc<IngestionPipeline>, concurrency: usize) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Queue a document for ingestion and return immediately.
    pub fn submit(&self, document_id: Uuid) -> JoinHandle<()> {
        let pipeline = self.pipeline.clone();
        let permits = self.permits.clone();

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(error) => {
                    tracing::error!(document_id = %document_id, error = %error, "Ingestion pool closed");
                    pipeline
                        .mark_failed(document_id, super::failure_message(&error))
                        .await;
                    return;
                }
            };

            let task = tokio::spawn({
                let pipeline = pipeline.clone();
                async move { pipeline.run(document_id).await }
            });

            match task.await {
                Ok(Ok(outcome)) => {
                    tracing::debug!(
                        document_id = %document_id,
                        pages = outcome.pages,
                        chunks = outcome.chunks,
                        "Ingestion task finished"
                    );
                }
                Ok(Err(error)) => {
                    tracing::debug!(document_id = %document_id, error = %error, "Ingestion task ended in failure");
                }
                Err(join_error) => {
                    tracing::error!(
                        document_id = %document_id,
                        panicked = join_error.is_panic(),
                        error = %join_error,
                        "Ingestion task aborted"
                    );
                    pipeline
                        .mark_failed(document_id, PANIC_MESSAGE.to_string())
                        .await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkUnit;
    use crate::embedding::HashEmbedder;
    use crate::index::{IndexGateway, MemoryVectorStore};
    use crate::ingest::TextChunker;
    use crate::metrics::IngestMetrics;
    use crate::models::{Document, DocumentStatus, Project};
    use crate::store::{MemoryRepository, Repository};
    use crate::test_support::{FnModel, StaticLoader};
    use std::path::PathBuf;

    async fn setup(llm: FnModel) -> (IngestWorker, Arc<MemoryRepository>, Document) {
        let repository = Arc::new(MemoryRepository::new());
        let project = repository
            .create_project(Project::new(Uuid::new_v4(), "History".into(), None))
            .await
            .expect("project");
        let document = repository
            .create_document(Document::queued(
                project.id,
                PathBuf::from("rome.pdf"),
                "rome.pdf".into(),
            ))
            .await
            .expect("document");

        let pipeline = IngestionPipeline::new(
            repository.clone(),
            Arc::new(StaticLoader::pages(&["Rome was founded.", "Empire fell."])),
            Arc::new(llm),
            IndexGateway::new(
                Arc::new(MemoryVectorStore::new()),
                Arc::new(HashEmbedder::new(32)),
            ),
            TextChunker::new(1000, 200, ChunkUnit::Chars).expect("chunker"),
            "Korean".into(),
            Arc::new(IngestMetrics::new()),
        );
        (IngestWorker::new(Arc::new(pipeline), 2), repository, document)
    }

    #[tokio::test]
    async fn submitted_document_is_processed_in_background() {
        let (worker, repository, document) = setup(FnModel::constant("text")).await;

        worker.submit(document.id).await.expect("supervisor");

        let stored = repository.find_document(document.id).await.expect("document");
        assert_eq!(stored.status, DocumentStatus::Processed);
        assert_eq!(repository.list_pages(document.id).await.expect("pages").len(), 2);
    }

    #[tokio::test]
    async fn panicking_pipeline_is_persisted_as_failed() {
        let (worker, repository, document) =
            setup(FnModel::new(|_| panic!("model exploded"))).await;

        worker.submit(document.id).await.expect("supervisor");

        let stored = repository.find_document(document.id).await.expect("document");
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert_eq!(stored.processing_message.as_deref(), Some(PANIC_MESSAGE));
    }
}
