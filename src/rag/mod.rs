//! Retrieval-augmented answering and follow-up question suggestions.
//!
//! Both entry points recover at the call boundary: retrieval or generation failures turn into
//! fixed fallback payloads, never errors.

pub mod context;

use crate::index::{IndexError, IndexGateway};
use crate::llm::{LanguageModel, LlmError, prompts};
use crate::models::Source;
use crate::store::StoreError;
use context::{format_context, join_texts};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Chunks retrieved for an answer.
pub const ANSWER_TOP_K: usize = 10;
/// Chunks retrieved for suggestions.
pub const SUGGESTION_TOP_K: usize = 5;
/// Retrieval query used when there is no previous answer to follow up on.
pub const DEFAULT_SUGGESTION_QUERY: &str = "summary overview main topics";
/// Reply returned whenever an answer cannot be produced.
pub const FALLBACK_ANSWER: &str = "Sorry, an error occurred while generating the answer.";
/// Suggestions shown while the project has nothing indexed.
pub const NO_DOCUMENT_SUGGESTIONS: [&str; 3] = [
    "Upload a document and I can suggest questions.",
    "What are the main points of this document?",
    "Ask for a summary of the document.",
];
/// Suggestions shown when generation fails.
pub const FAILED_SUGGESTIONS: [&str; 3] = [
    "Could not generate suggested questions.",
    "Ask for a summary of the document.",
    "What are the key ideas?",
];
/// Used to pad short model output up to three suggestions.
pub const GENERIC_SUGGESTIONS: [&str; 3] = [
    "What are the main points of this document?",
    "Can you summarize the document?",
    "What are the key terms and their definitions?",
];

/// Internal failures of retrieval-backed generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Retrieval failed, including the project having no index yet.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// The model call failed.
    #[error(transparent)]
    Llm(#[from] LlmError),
    /// Retrieval returned nothing usable.
    #[error("No indexed content available")]
    EmptyContext,
    /// Model output was not the requested JSON.
    #[error("Model output could not be parsed: {0}")]
    Parse(String),
    /// Persisting the generated content failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Answer text plus the citations backing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// Model answer, or [`FALLBACK_ANSWER`].
    pub answer: String,
    /// Sources in retrieval order; empty on fallback.
    pub sources: Vec<Source>,
}

impl Answer {
    fn fallback() -> Self {
        Self {
            answer: FALLBACK_ANSWER.to_string(),
            sources: Vec::new(),
        }
    }
}

/// Answers questions from a project's indexed chunks.
#[derive(Clone)]
pub struct AnswerEngine {
    index: IndexGateway,
    llm: Arc<dyn LanguageModel>,
    target_language: String,
}

impl AnswerEngine {
    /// Create an engine answering in `target_language`.
    pub fn new(index: IndexGateway, llm: Arc<dyn LanguageModel>, target_language: String) -> Self {
        Self {
            index,
            llm,
            target_language,
        }
    }

    /// Answer `query` from the project's top chunks. Never fails.
    pub async fn get_answer(&self, project_id: Uuid, query: &str) -> Answer {
        match self.try_answer(project_id, query).await {
            Ok(answer) => answer,
            Err(error) => {
                tracing::warn!(project_id = %project_id, error = %error, "Answer generation failed; returning fallback");
                Answer::fallback()
            }
        }
    }

    async fn try_answer(&self, project_id: Uuid, query: &str) -> Result<Answer, GenerationError> {
        let chunks = self
            .index
            .query(&project_id.to_string(), query, ANSWER_TOP_K)
            .await?;
        if chunks.is_empty() {
            return Err(GenerationError::EmptyContext);
        }

        let context = format_context(&chunks);
        tracing::debug!(project_id = %project_id, chunks = chunks.len(), "Context retrieved");

        let prompt = prompts::grounded_answer(&context.text, query, &self.target_language);
        let answer = self.llm.complete(&prompt).await?;

        Ok(Answer {
            answer: answer.trim().to_string(),
            sources: context.sources,
        })
    }

    /// Suggest exactly three follow-up questions. Never fails.
    ///
    /// `last_message` is the latest assistant reply, if any; otherwise a generic overview query
    /// drives retrieval.
    pub async fn generate_suggested_questions(
        &self,
        project_id: Uuid,
        last_message: Option<&str>,
    ) -> Vec<String> {
        match self.try_suggest(project_id, last_message).await {
            Ok(questions) => questions,
            Err(GenerationError::EmptyContext | GenerationError::Index(IndexError::IndexNotFound(_))) => {
                owned(&NO_DOCUMENT_SUGGESTIONS)
            }
            Err(error) => {
                tracing::warn!(project_id = %project_id, error = %error, "Suggestion generation failed; returning fallback");
                owned(&FAILED_SUGGESTIONS)
            }
        }
    }

    async fn try_suggest(
        &self,
        project_id: Uuid,
        last_message: Option<&str>,
    ) -> Result<Vec<String>, GenerationError> {
        let query = last_message
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .unwrap_or(DEFAULT_SUGGESTION_QUERY);

        let chunks = self
            .index
            .query(&project_id.to_string(), query, SUGGESTION_TOP_K)
            .await?;
        let context = join_texts(&chunks);
        if context.trim().is_empty() {
            return Err(GenerationError::EmptyContext);
        }

        let raw = self
            .llm
            .complete(&prompts::suggested_questions(&context, &self.target_language))
            .await?;
        let parsed: Vec<String> = serde_json::from_str(&prompts::strip_code_fences(&raw))
            .map_err(|error| GenerationError::Parse(error.to_string()))?;

        Ok(normalize_suggestions(parsed))
    }
}

/// Keep the first three non-empty suggestions and pad from [`GENERIC_SUGGESTIONS`].
fn normalize_suggestions(parsed: Vec<String>) -> Vec<String> {
    let mut questions: Vec<String> = parsed
        .into_iter()
        .map(|question| question.trim().to_string())
        .filter(|question| !question.is_empty())
        .take(3)
        .collect();

    for generic in GENERIC_SUGGESTIONS {
        if questions.len() >= 3 {
            break;
        }
        if !questions.iter().any(|question| question == generic) {
            questions.push(generic.to_string());
        }
    }
    questions
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}
