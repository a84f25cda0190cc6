//! Relational store seam.
//!
//! The ingestion pipeline, answer engine, and quiz generator only need CRUD with cascade
//! semantics: deleting a project drops its documents, messages, and quizzes; deleting a document
//! drops its pages. [`Repository`] captures exactly that surface so a SQL backend can replace
//! [`MemoryRepository`] without touching the callers. Identifiers are minted by the entity
//! constructors in [`crate::models`], never by the store.

use crate::models::{
    Document, DocumentPage, DocumentStatus, Message, Project, Quiz, Role,
};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Errors returned by repository operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Requested row does not exist (or is not visible to the caller).
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `document`.
        entity: &'static str,
        /// Identifier that failed to resolve.
        id: Uuid,
    },
    /// Write violated a uniqueness or referential constraint.
    #[error("Constraint violated: {0}")]
    Conflict(String),
}

impl StoreError {
    fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

/// Rows removed by a project cascade that still own external resources.
#[derive(Debug, Default)]
pub struct ProjectRemoval {
    /// Documents whose files and vectors must be cleaned up by the caller.
    pub documents: Vec<Document>,
}

/// CRUD surface over projects and everything they own.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Persist a new project.
    async fn create_project(&self, project: Project) -> Result<Project, StoreError>;

    /// Fetch a project, filtered by owner.
    async fn get_project(&self, owner_id: Uuid, project_id: Uuid) -> Result<Project, StoreError>;

    /// List projects belonging to `owner_id`, oldest first.
    async fn list_projects(&self, owner_id: Uuid) -> Result<Vec<Project>, StoreError>;

    /// Delete a project and cascade to its documents, pages, messages, and quizzes.
    async fn delete_project(&self, project_id: Uuid) -> Result<ProjectRemoval, StoreError>;

    /// Persist a new document; its project must exist.
    async fn create_document(&self, document: Document) -> Result<Document, StoreError>;

    /// Fetch a document scoped to its project.
    async fn get_document(
        &self,
        project_id: Uuid,
        document_id: Uuid,
    ) -> Result<Document, StoreError>;

    /// Fetch a document by identifier alone.
    async fn find_document(&self, document_id: Uuid) -> Result<Document, StoreError>;

    /// List documents of a project, oldest first.
    async fn list_documents(&self, project_id: Uuid) -> Result<Vec<Document>, StoreError>;

    /// Update status and progress narration of a document.
    async fn update_document_status(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
        message: Option<String>,
    ) -> Result<(), StoreError>;

    /// Delete a document and its pages, returning the removed row.
    async fn delete_document(&self, document_id: Uuid) -> Result<Document, StoreError>;

    /// Persist a page; `(document_id, page_number)` must be unique.
    async fn create_page(&self, page: DocumentPage) -> Result<(), StoreError>;

    /// List pages of a document ordered by page number.
    async fn list_pages(&self, document_id: Uuid) -> Result<Vec<DocumentPage>, StoreError>;

    /// Persist a chat message.
    async fn create_message(&self, message: Message) -> Result<Message, StoreError>;

    /// List messages of a project in creation order.
    async fn list_messages(&self, project_id: Uuid) -> Result<Vec<Message>, StoreError>;

    /// Most recent assistant message of a project, if any.
    async fn last_assistant_message(&self, project_id: Uuid)
    -> Result<Option<Message>, StoreError>;

    /// Persist a quiz together with its questions in one step.
    async fn create_quiz(&self, quiz: Quiz) -> Result<Quiz, StoreError>;

    /// List quizzes of a project, newest first.
    async fn list_quizzes(&self, project_id: Uuid) -> Result<Vec<Quiz>, StoreError>;

    /// Fetch one quiz with its questions.
    async fn get_quiz(&self, project_id: Uuid, quiz_id: Uuid) -> Result<Quiz, StoreError>;
}

#[derive(Default)]
struct Tables {
    projects: Vec<Project>,
    documents: Vec<Document>,
    pages: Vec<DocumentPage>,
    messages: Vec<Message>,
    quizzes: Vec<Quiz>,
}

impl Tables {
    fn project_exists(&self, project_id: Uuid) -> bool {
        self.projects.iter().any(|project| project.id == project_id)
    }
}

/// Process-local repository. Each call holds the table lock for its whole duration, which makes
/// every operation (including cascades and quiz creation) atomic.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_project(&self, project: Project) -> Result<Project, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.project_exists(project.id) {
            return Err(StoreError::Conflict(format!("project {} exists", project.id)));
        }
        tables.projects.push(project.clone());
        Ok(project)
    }

    async fn get_project(&self, owner_id: Uuid, project_id: Uuid) -> Result<Project, StoreError> {
        let tables = self.tables.read().await;
        tables
            .projects
            .iter()
            .find(|project| project.id == project_id && project.owner_id == owner_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("project", project_id))
    }

    async fn list_projects(&self, owner_id: Uuid) -> Result<Vec<Project>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .projects
            .iter()
            .filter(|project| project.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn delete_project(&self, project_id: Uuid) -> Result<ProjectRemoval, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.project_exists(project_id) {
            return Err(StoreError::not_found("project", project_id));
        }

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut tables.documents)
            .into_iter()
            .partition(|document| document.project_id == project_id);
        tables.documents = kept;
        tables
            .pages
            .retain(|page| !removed.iter().any(|document| document.id == page.document_id));
        tables.messages.retain(|message| message.project_id != project_id);
        tables.quizzes.retain(|quiz| quiz.project_id != project_id);
        tables.projects.retain(|project| project.id != project_id);

        Ok(ProjectRemoval { documents: removed })
    }

    async fn create_document(&self, document: Document) -> Result<Document, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.project_exists(document.project_id) {
            return Err(StoreError::not_found("project", document.project_id));
        }
        tables.documents.push(document.clone());
        Ok(document)
    }

    async fn get_document(
        &self,
        project_id: Uuid,
        document_id: Uuid,
    ) -> Result<Document, StoreError> {
        let tables = self.tables.read().await;
        tables
            .documents
            .iter()
            .find(|document| document.id == document_id && document.project_id == project_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("document", document_id))
    }

    async fn find_document(&self, document_id: Uuid) -> Result<Document, StoreError> {
        let tables = self.tables.read().await;
        tables
            .documents
            .iter()
            .find(|document| document.id == document_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("document", document_id))
    }

    async fn list_documents(&self, project_id: Uuid) -> Result<Vec<Document>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .documents
            .iter()
            .filter(|document| document.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn update_document_status(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
        message: Option<String>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let document = tables
            .documents
            .iter_mut()
            .find(|document| document.id == document_id)
            .ok_or_else(|| StoreError::not_found("document", document_id))?;
        document.status = status;
        document.processing_message = message;
        Ok(())
    }

    async fn delete_document(&self, document_id: Uuid) -> Result<Document, StoreError> {
        let mut tables = self.tables.write().await;
        let position = tables
            .documents
            .iter()
            .position(|document| document.id == document_id)
            .ok_or_else(|| StoreError::not_found("document", document_id))?;
        let removed = tables.documents.remove(position);
        tables.pages.retain(|page| page.document_id != document_id);
        Ok(removed)
    }

    async fn create_page(&self, page: DocumentPage) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables
            .documents
            .iter()
            .any(|document| document.id == page.document_id)
        {
            return Err(StoreError::not_found("document", page.document_id));
        }
        if tables.pages.iter().any(|existing| {
            existing.document_id == page.document_id && existing.page_number == page.page_number
        }) {
            return Err(StoreError::Conflict(format!(
                "page {} of document {} exists",
                page.page_number, page.document_id
            )));
        }
        tables.pages.push(page);
        Ok(())
    }

    async fn list_pages(&self, document_id: Uuid) -> Result<Vec<DocumentPage>, StoreError> {
        let tables = self.tables.read().await;
        let mut pages: Vec<_> = tables
            .pages
            .iter()
            .filter(|page| page.document_id == document_id)
            .cloned()
            .collect();
        pages.sort_by_key(|page| page.page_number);
        Ok(pages)
    }

    async fn create_message(&self, message: Message) -> Result<Message, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.project_exists(message.project_id) {
            return Err(StoreError::not_found("project", message.project_id));
        }
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, project_id: Uuid) -> Result<Vec<Message>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .iter()
            .filter(|message| message.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn last_assistant_message(
        &self,
        project_id: Uuid,
    ) -> Result<Option<Message>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .iter()
            .rev()
            .find(|message| message.project_id == project_id && message.role == Role::Assistant)
            .cloned())
    }

    async fn create_quiz(&self, quiz: Quiz) -> Result<Quiz, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.project_exists(quiz.project_id) {
            return Err(StoreError::not_found("project", quiz.project_id));
        }
        if quiz.questions.iter().any(|question| question.quiz_id != quiz.id) {
            return Err(StoreError::Conflict(format!(
                "question does not belong to quiz {}",
                quiz.id
            )));
        }
        tables.quizzes.push(quiz.clone());
        Ok(quiz)
    }

    async fn list_quizzes(&self, project_id: Uuid) -> Result<Vec<Quiz>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .quizzes
            .iter()
            .rev()
            .filter(|quiz| quiz.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn get_quiz(&self, project_id: Uuid, quiz_id: Uuid) -> Result<Quiz, StoreError> {
        let tables = self.tables.read().await;
        tables
            .quizzes
            .iter()
            .find(|quiz| quiz.id == quiz_id && quiz.project_id == project_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("quiz", quiz_id))
    }
}
