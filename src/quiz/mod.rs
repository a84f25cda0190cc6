//! Quiz and flashcard generation from a project's indexed content.

use crate::index::IndexGateway;
use crate::llm::{LanguageModel, prompts};
use crate::models::{Question, Quiz, QuizType};
use crate::rag::GenerationError;
use crate::rag::context::join_texts;
use crate::store::Repository;
use serde::Deserialize;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// Chunks sampled as quiz material.
pub const QUIZ_TOP_K: usize = 15;
/// Retrieval query used to sample broadly relevant material.
pub const QUIZ_QUERY: &str = "important key concepts and definitions summary";
/// Questions requested when the caller does not say.
pub const DEFAULT_QUESTION_COUNT: usize = 5;
/// Upper bound on requested questions.
pub const MAX_QUESTION_COUNT: usize = 20;

const MULTIPLE_CHOICE_OPTIONS: usize = 4;

/// Clamp a requested question count into `1..=MAX_QUESTION_COUNT`.
pub fn clamp_question_count(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_QUESTION_COUNT)
        .clamp(1, MAX_QUESTION_COUNT)
}

/// Title shown for a generated quiz.
pub fn quiz_title(quiz_type: QuizType, count: usize) -> String {
    match quiz_type {
        QuizType::MultipleChoice => format!("Generated Quiz ({count} Questions)"),
        QuizType::Flashcard => format!("Generated Flashcards ({count} Questions)"),
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedItem {
    question_text: String,
    #[serde(default)]
    options: Vec<String>,
    answer: String,
}

/// Generates and persists quizzes.
#[derive(Clone)]
pub struct QuizGenerator {
    repository: Arc<dyn Repository>,
    index: IndexGateway,
    llm: Arc<dyn LanguageModel>,
    target_language: String,
}

impl QuizGenerator {
    /// Create a generator writing questions in `target_language`.
    pub fn new(
        repository: Arc<dyn Repository>,
        index: IndexGateway,
        llm: Arc<dyn LanguageModel>,
        target_language: String,
    ) -> Self {
        Self {
            repository,
            index,
            llm,
            target_language,
        }
    }

    /// Generate a quiz of `num_questions` items. Returns `None` on any failure; nothing is
    /// persisted in that case.
    pub async fn generate_quiz(
        &self,
        project_id: Uuid,
        num_questions: usize,
        quiz_type: QuizType,
    ) -> Option<Quiz> {
        match self.try_generate(project_id, num_questions, quiz_type).await {
            Ok(quiz) => {
                tracing::info!(
                    project_id = %project_id,
                    quiz_id = %quiz.id,
                    questions = quiz.questions.len(),
                    "Quiz generated"
                );
                Some(quiz)
            }
            Err(error) => {
                tracing::warn!(project_id = %project_id, error = %error, "Quiz generation failed");
                None
            }
        }
    }

    async fn try_generate(
        &self,
        project_id: Uuid,
        num_questions: usize,
        quiz_type: QuizType,
    ) -> Result<Quiz, GenerationError> {
        let chunks = self
            .index
            .query(&project_id.to_string(), QUIZ_QUERY, QUIZ_TOP_K)
            .await?;
        let context = join_texts(&chunks);
        if context.trim().is_empty() {
            return Err(GenerationError::EmptyContext);
        }

        let prompt = match quiz_type {
            QuizType::MultipleChoice => {
                prompts::multiple_choice_quiz(&context, num_questions, &self.target_language)
            }
            QuizType::Flashcard => {
                prompts::flashcards(&context, num_questions, &self.target_language)
            }
        };
        let raw = self.llm.complete(&prompt).await?;
        let items: Vec<GeneratedItem> = serde_json::from_str(&prompts::strip_code_fences(&raw))
            .map_err(|error| GenerationError::Parse(error.to_string()))?;
        if items.is_empty() {
            return Err(GenerationError::Parse("model returned no questions".into()));
        }

        let quiz_id = Uuid::new_v4();
        let questions = items
            .into_iter()
            .enumerate()
            .map(|(position, item)| build_question(quiz_id, quiz_type, position, item))
            .collect::<Result<Vec<_>, _>>()?;

        let quiz = Quiz {
            id: quiz_id,
            project_id,
            title: quiz_title(quiz_type, questions.len()),
            quiz_type,
            questions,
            created_at: OffsetDateTime::now_utc(),
        };
        Ok(self.repository.create_quiz(quiz).await?)
    }
}

fn build_question(
    quiz_id: Uuid,
    quiz_type: QuizType,
    position: usize,
    item: GeneratedItem,
) -> Result<Question, GenerationError> {
    let invalid = |reason: &str| GenerationError::Parse(format!("item {position}: {reason}"));

    if item.question_text.trim().is_empty() {
        return Err(invalid("empty question_text"));
    }
    if item.answer.trim().is_empty() {
        return Err(invalid("empty answer"));
    }

    let options = match quiz_type {
        QuizType::MultipleChoice => {
            if item.options.len() != MULTIPLE_CHOICE_OPTIONS {
                return Err(invalid("expected exactly 4 options"));
            }
            if !item.options.contains(&item.answer) {
                return Err(invalid("answer is not one of the options"));
            }
            item.options
        }
        QuizType::Flashcard => Vec::new(),
    };

    Ok(Question {
        id: Uuid::new_v4(),
        quiz_id,
        question_text: item.question_text,
        options,
        answer: item.answer,
    })
}
