//! End-to-end flows over the public API with in-process backends and scripted collaborators.

use async_trait::async_trait;
use lectern::config::ChunkUnit;
use lectern::embedding::HashEmbedder;
use lectern::index::{IndexGateway, MemoryVectorStore};
use lectern::ingest::{
    IngestError, IngestionPipeline, LoadError, LoadedPage, PageLoader, TextChunker,
};
use lectern::llm::{LanguageModel, LlmError};
use lectern::metrics::IngestMetrics;
use lectern::models::{Document, DocumentStatus, Message, Project, QuizType};
use lectern::quiz::QuizGenerator;
use lectern::rag::{AnswerEngine, FALLBACK_ANSWER};
use lectern::store::{MemoryRepository, Repository};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

struct Pages(Vec<&'static str>);

#[async_trait]
impl PageLoader for Pages {
    async fn load(&self, path: &Path) -> Result<Vec<LoadedPage>, LoadError> {
        if self.0.is_empty() {
            return Err(LoadError::NoPages(path.to_path_buf()));
        }
        Ok(self
            .0
            .iter()
            .enumerate()
            .map(|(index, text)| LoadedPage {
                index: index as u32,
                text: text.to_string(),
            })
            .collect())
    }
}

/// Formats by echoing the raw text after the `Raw Text:` marker, fails every translation, and
/// answers questions with a fixed cited sentence.
struct ScriptedModel;

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        if let Some((_, raw)) = prompt.split_once("Raw Text:") {
            return Ok(format!("# Page\n{}", raw.trim()));
        }
        if prompt.contains("Markdown Text:") {
            return Err(LlmError::GenerationFailed("translation offline".into()));
        }
        if prompt.contains("multiple-choice questions") {
            return Ok(r#"[{"question_text": "What powers the cell?", "options": ["Mitochondria", "Ribosome", "Nucleus", "Vacuole"], "answer": "Mitochondria"}]"#.into());
        }
        Ok("Mitochondria produce ATP.".into())
    }
}

struct World {
    repository: Arc<MemoryRepository>,
    index: IndexGateway,
    metrics: Arc<IngestMetrics>,
    project: Project,
}

impl World {
    async fn new() -> Self {
        let repository = Arc::new(MemoryRepository::new());
        let project = repository
            .create_project(Project::new(Uuid::new_v4(), "Biology".into(), None))
            .await
            .expect("project");
        Self {
            repository,
            index: IndexGateway::new(
                Arc::new(MemoryVectorStore::new()),
                Arc::new(HashEmbedder::new(96)),
            ),
            metrics: Arc::new(IngestMetrics::new()),
            project,
        }
    }

    fn pipeline(&self, pages: Vec<&'static str>) -> IngestionPipeline {
        IngestionPipeline::new(
            self.repository.clone(),
            Arc::new(Pages(pages)),
            Arc::new(ScriptedModel),
            self.index.clone(),
            TextChunker::new(200, 40, ChunkUnit::Chars).expect("chunker"),
            "English".into(),
            self.metrics.clone(),
        )
    }

    async fn upload(&self, name: &str) -> Document {
        self.repository
            .create_document(Document::queued(
                self.project.id,
                PathBuf::from(name),
                name.into(),
            ))
            .await
            .expect("document")
    }
}

#[tokio::test]
async fn three_page_document_is_answerable_then_deletable() {
    let world = World::new().await;
    let document = world.upload("cells.pdf").await;

    let outcome = world
        .pipeline(vec![
            "Mitochondria produce ATP, the energy currency of the cell.",
            "Ribosomes assemble proteins from amino acids.",
            "The nucleus stores genetic material.",
        ])
        .run(document.id)
        .await
        .expect("ingestion");
    assert_eq!(outcome.pages, 3);

    let stored = world
        .repository
        .find_document(document.id)
        .await
        .expect("document");
    assert_eq!(stored.status, DocumentStatus::Processed);
    assert_eq!(stored.processing_message.as_deref(), Some("Completed"));

    let pages = world.repository.list_pages(document.id).await.expect("pages");
    assert_eq!(
        pages.iter().map(|page| page.page_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(pages[0].original_text.starts_with("# Page"));
    assert!(pages.iter().all(|page| page.translated_text.is_empty()));

    let project_key = world.project.id.to_string();
    let document_key = document.id.to_string();
    let indexed = world
        .index
        .count_document_chunks(&project_key, &document_key)
        .await
        .expect("count");
    assert_eq!(indexed, outcome.chunks);
    assert!(indexed >= 3);

    let engine = AnswerEngine::new(world.index.clone(), Arc::new(ScriptedModel), "English".into());
    let answer = engine
        .get_answer(world.project.id, "What produces ATP?")
        .await;
    assert_eq!(answer.answer, "Mitochondria produce ATP.");
    assert!(!answer.sources.is_empty());
    for source in &answer.sources {
        assert_eq!(source.document_id, document_key);
        assert!((1..=3).contains(&source.page));
        assert!(source.content_snippet.ends_with("..."));
    }

    world
        .repository
        .create_message(Message::assistant(
            world.project.id,
            answer.answer.clone(),
            answer.sources.clone(),
        ))
        .await
        .expect("message");

    world
        .index
        .delete_by_document(&project_key, &document_key)
        .await
        .expect("delete vectors");
    world
        .repository
        .delete_document(document.id)
        .await
        .expect("delete document");

    assert_eq!(
        world
            .index
            .count_document_chunks(&project_key, &document_key)
            .await
            .expect("count"),
        0
    );
    assert!(world.repository.list_pages(document.id).await.expect("pages").is_empty());
    assert_eq!(
        engine
            .get_answer(world.project.id, "What produces ATP?")
            .await
            .answer,
        FALLBACK_ANSWER
    );

    let snapshot = world.metrics.snapshot();
    assert_eq!(snapshot.documents_processed, 1);
    assert_eq!(snapshot.chunks_indexed, outcome.chunks as u64);
}

#[tokio::test]
async fn unreadable_document_fails_without_pages_or_vectors() {
    let world = World::new().await;
    let document = world.upload("broken.pdf").await;

    let error = world
        .pipeline(Vec::new())
        .run(document.id)
        .await
        .expect_err("load must fail");
    assert!(matches!(error, IngestError::Load(LoadError::NoPages(_))));

    let stored = world
        .repository
        .find_document(document.id)
        .await
        .expect("document");
    assert_eq!(stored.status, DocumentStatus::Failed);
    assert!(
        stored
            .processing_message
            .as_deref()
            .is_some_and(|message| message.starts_with("Error: "))
    );
    assert!(world.repository.list_pages(document.id).await.expect("pages").is_empty());
    assert_eq!(
        world
            .index
            .count_document_chunks(&world.project.id.to_string(), &document.id.to_string())
            .await
            .expect("count"),
        0
    );
    assert_eq!(world.metrics.snapshot().documents_failed, 1);
}

#[tokio::test]
async fn project_delete_cascades_to_everything_it_owns() {
    let world = World::new().await;
    let document = world.upload("cells.pdf").await;
    world
        .pipeline(vec!["Mitochondria produce ATP."])
        .run(document.id)
        .await
        .expect("ingestion");

    let generator = QuizGenerator::new(
        world.repository.clone(),
        world.index.clone(),
        Arc::new(ScriptedModel),
        "English".into(),
    );
    let quiz = generator
        .generate_quiz(world.project.id, 1, QuizType::MultipleChoice)
        .await
        .expect("quiz");
    assert_eq!(quiz.questions[0].answer, "Mitochondria");

    world
        .repository
        .create_message(Message::user(world.project.id, "hello".into()))
        .await
        .expect("message");

    let project_key = world.project.id.to_string();
    world
        .index
        .delete_by_document(&project_key, &document.id.to_string())
        .await
        .expect("delete vectors");
    world
        .index
        .delete_namespace(&project_key)
        .await
        .expect("drop namespace");
    let removal = world
        .repository
        .delete_project(world.project.id)
        .await
        .expect("delete project");

    assert_eq!(removal.documents.len(), 1);
    assert!(world.repository.find_document(document.id).await.is_err());
    assert!(world.repository.list_pages(document.id).await.expect("pages").is_empty());
    assert!(world.repository.list_messages(world.project.id).await.expect("messages").is_empty());
    assert!(world.repository.list_quizzes(world.project.id).await.expect("quizzes").is_empty());
    assert!(
        generator
            .generate_quiz(world.project.id, 1, QuizType::MultipleChoice)
            .await
            .is_none()
    );
}
