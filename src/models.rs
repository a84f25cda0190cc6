//! Entities persisted by the relational store and returned by the HTTP surface.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use time::OffsetDateTime;
use uuid::Uuid;

/// Workspace owning documents, chat history, and quizzes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    /// Project identifier.
    pub id: Uuid,
    /// Owning user.
    pub owner_id: Uuid,
    /// Display title.
    pub title: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last modification time.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Project {
    /// Build a new project owned by `owner_id`.
    pub fn new(owner_id: Uuid, title: String, description: Option<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title,
            description,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lifecycle of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Accepted but not yet picked up by a worker.
    Queued,
    /// Ingestion is running.
    Processing,
    /// Pages and chunks are available.
    Processed,
    /// Ingestion aborted; see the processing message.
    Failed,
}

impl DocumentStatus {
    /// Whether the ingestion pipeline will no longer touch the document.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Uploaded PDF tracked through ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// Document identifier.
    pub id: Uuid,
    /// Owning project.
    pub project_id: Uuid,
    /// Location of the raw upload in file storage.
    #[serde(skip)]
    pub file: PathBuf,
    /// Display name, usually the uploaded file name.
    pub name: String,
    /// Current ingestion status.
    pub status: DocumentStatus,
    /// Human-readable progress narration.
    pub processing_message: Option<String>,
    /// Upload time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Document {
    /// Build a document that is waiting for ingestion.
    pub fn queued(project_id: Uuid, file: PathBuf, name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            file,
            name,
            status: DocumentStatus::Queued,
            processing_message: Some(crate::ingest::QUEUED_MESSAGE.to_string()),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// One formatted and translated page of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentPage {
    /// Page identifier.
    pub id: Uuid,
    /// Owning document.
    pub document_id: Uuid,
    /// 1-based page number, unique per document.
    pub page_number: u32,
    /// Formatted text, or the raw extraction when formatting failed.
    pub original_text: String,
    /// Translation; empty when translation failed.
    pub translated_text: String,
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Question typed by the user.
    User,
    /// Generated answer.
    Assistant,
}

/// Citation attached to an assistant answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Document the cited chunk belongs to.
    pub document_id: String,
    /// 1-based page of the cited chunk.
    pub page: u32,
    /// Document display name.
    pub name: String,
    /// Leading excerpt of the cited chunk.
    pub content_snippet: String,
}

/// Chat message stored per project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// Message identifier.
    pub id: Uuid,
    /// Owning project.
    pub project_id: Uuid,
    /// Message author.
    pub role: Role,
    /// Message body.
    pub content: String,
    /// Citations, populated only for assistant messages.
    pub sources: Vec<Source>,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Message {
    /// Build a user message.
    pub fn user(project_id: Uuid, content: String) -> Self {
        Self::new(project_id, Role::User, content, Vec::new())
    }

    /// Build an assistant message carrying its citations.
    pub fn assistant(project_id: Uuid, content: String, sources: Vec<Source>) -> Self {
        Self::new(project_id, Role::Assistant, content, sources)
    }

    fn new(project_id: Uuid, role: Role, content: String, sources: Vec<Source>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            role,
            content,
            sources,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Kind of generated study material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizType {
    /// Four-option questions with a single correct answer.
    #[default]
    #[serde(alias = "MULTIPLE_CHOICE")]
    MultipleChoice,
    /// Term/definition pairs.
    #[serde(alias = "FLASHCARD")]
    Flashcard,
}

/// Generated quiz with its ordered questions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quiz {
    /// Quiz identifier.
    pub id: Uuid,
    /// Owning project.
    pub project_id: Uuid,
    /// Display title.
    pub title: String,
    /// Kind of questions contained.
    pub quiz_type: QuizType,
    /// Questions in the order the model produced them.
    pub questions: Vec<Question>,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Single quiz question or flashcard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question {
    /// Question identifier.
    pub id: Uuid,
    /// Owning quiz.
    pub quiz_id: Uuid,
    /// Question text, or the term for flashcards.
    pub question_text: String,
    /// Answer options; empty for flashcards.
    pub options: Vec<String>,
    /// Correct option, or the definition for flashcards.
    pub answer: String,
}
