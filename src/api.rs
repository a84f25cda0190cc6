//! HTTP surface for Lectern.
//!
//! A single Axum router exposes account, project, document, chat, and quiz endpoints under
//! `/api`. Project-scoped routes resolve the caller from `Authorization: Bearer <token>` (or the
//! `auth_token` cookie set at registration) and answer 404 for projects the caller does not own.
//!
//! Uploads return `202 Accepted` immediately; ingestion continues on the background worker and
//! its progress is visible through the document's `status` and `processing_message`.

use crate::auth::{AuthError, AuthService, User};
use crate::files::{FileStore, FileStoreError};
use crate::index::{IndexError, IndexGateway};
use crate::ingest::IngestWorker;
use crate::metrics::{IngestMetrics, MetricsSnapshot};
use crate::models::{Document, DocumentPage, Message, Project, Quiz, QuizType};
use crate::quiz::{QuizGenerator, clamp_question_count};
use crate::rag::AnswerEngine;
use crate::store::{Repository, StoreError};
use axum::{
    Json, Router, async_trait,
    extract::{
        DefaultBodyLimit, FromRequestParts, Multipart, Path, State, multipart::MultipartError,
    },
    http::{StatusCode, header, request::Parts},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const AUTH_COOKIE: &str = "auth_token";
const AUTH_COOKIE_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 30;
const QUIZ_FAILED_MESSAGE: &str = "Failed to generate quiz. Ensure documents are uploaded.";
const DOCUMENT_IN_FLIGHT_MESSAGE: &str = "Document is still being processed";

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Relational store.
    pub repository: Arc<dyn Repository>,
    /// Account registry.
    pub auth: Arc<AuthService>,
    /// Raw upload storage.
    pub files: FileStore,
    /// Vector index used for cleanup on deletes.
    pub index: IndexGateway,
    /// Background ingestion worker.
    pub worker: IngestWorker,
    /// Chat answers and suggestions.
    pub answers: AnswerEngine,
    /// Quiz generation.
    pub quizzes: QuizGenerator,
    /// Ingestion counters.
    pub metrics: Arc<IngestMetrics>,
    /// Request body cap for document uploads.
    pub max_upload_bytes: usize,
}

/// Build the HTTP router exposing the full API surface.
pub fn create_router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);
    Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/metrics", get(get_metrics))
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/:project_id",
            get(get_project).delete(delete_project),
        )
        .route(
            "/api/projects/:project_id/documents",
            get(list_documents)
                .post(upload_document)
                .layer(upload_limit),
        )
        .route(
            "/api/projects/:project_id/documents/:document_id",
            delete(delete_document),
        )
        .route(
            "/api/projects/:project_id/documents/:document_id/pages",
            get(list_pages),
        )
        .route(
            "/api/projects/:project_id/messages",
            get(list_messages).post(create_message),
        )
        .route(
            "/api/projects/:project_id/suggested-questions",
            get(suggested_questions),
        )
        .route(
            "/api/projects/:project_id/quizzes",
            get(list_quizzes).post(create_quiz),
        )
        .route("/api/projects/:project_id/quizzes/:quiz_id", get(get_quiz))
        .with_state(state)
}

/// Caller identity resolved from the bearer token or auth cookie.
struct Owner(Uuid);

#[async_trait]
impl FromRequestParts<AppState> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = bearer_token(parts)
            .or_else(|| cookie_token(parts))
            .ok_or(ApiError::from(AuthError::InvalidToken))?;
        Ok(Owner(state.auth.resolve(&token).await?))
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let accepted = scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token");
    (accepted && !token.trim().is_empty()).then(|| token.trim().to_string())
}

fn cookie_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            pair.trim()
                .strip_prefix(AUTH_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
                .map(str::to_string)
        })
        .filter(|token| !token.is_empty())
}

async fn owned_project(state: &AppState, owner: Uuid, project_id: Uuid) -> Result<Project, ApiError> {
    Ok(state.repository.get_project(owner, project_id).await?)
}

#[derive(Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    token: String,
    user: User,
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    let session = state
        .auth
        .register(&request.email, &request.username, &request.password)
        .await?;
    let cookie = format!(
        "{AUTH_COOKIE}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={AUTH_COOKIE_MAX_AGE_SECS}",
        session.token
    );

    Ok((
        StatusCode::CREATED,
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(RegisterResponse {
            token: session.token,
            user: session.user,
        }),
    )
        .into_response())
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user_id: Uuid,
    username: String,
    email: String,
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let session = state.auth.login(&request.username, &request.password).await?;
    Ok(Json(LoginResponse {
        token: session.token,
        user_id: session.user.id,
        username: session.user.username,
        email: session.user.email,
    }))
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn list_projects(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Result<Json<Vec<Project>>, ApiError> {
    Ok(Json(state.repository.list_projects(owner).await?))
}

#[derive(Deserialize)]
struct CreateProjectRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
}

async fn create_project(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Title is required".into()));
    }
    let project = state
        .repository
        .create_project(Project::new(owner, title.to_string(), request.description))
        .await?;
    tracing::info!(project_id = %project.id, owner_id = %owner, "Project created");
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(owned_project(&state, owner, project_id).await?))
}

/// Delete a project after clearing its vectors. Per-document vector failures are logged and do
/// not block the delete.
async fn delete_project(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let project = owned_project(&state, owner, project_id).await?;
    let namespace = project.id.to_string();

    for document in state.repository.list_documents(project.id).await? {
        if let Err(error) = state
            .index
            .delete_by_document(&namespace, &document.id.to_string())
            .await
        {
            tracing::warn!(document_id = %document.id, error = %error, "Could not remove document vectors");
        }
    }
    if let Err(error) = state.index.delete_namespace(&namespace).await {
        tracing::warn!(project_id = %project.id, error = %error, "Could not drop project collection");
    }

    let removal = state.repository.delete_project(project.id).await?;
    for document in &removal.documents {
        if let Err(error) = state.files.delete(&document.file).await {
            tracing::warn!(document_id = %document.id, error = %error, "Could not remove upload");
        }
    }

    tracing::info!(
        project_id = %project.id,
        documents = removal.documents.len(),
        "Project deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn list_documents(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let project = owned_project(&state, owner, project_id).await?;
    Ok(Json(state.repository.list_documents(project.id).await?))
}

/// Store the uploaded PDF, create a queued document, and hand it to the worker.
async fn upload_document(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(project_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let project = owned_project(&state, owner, project_id).await?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        upload = Some((name, bytes));
        break;
    }
    let (name, bytes) = upload.ok_or_else(|| ApiError::BadRequest("No file provided".into()))?;
    if !name.to_ascii_lowercase().ends_with(".pdf") {
        return Err(ApiError::BadRequest("Only PDF files are supported".into()));
    }

    let path = state.files.save(project.id, &name, &bytes).await?;
    let document = match state
        .repository
        .create_document(Document::queued(project.id, path.clone(), name))
        .await
    {
        Ok(document) => document,
        Err(error) => {
            if let Err(cleanup) = state.files.delete(&path).await {
                tracing::warn!(path = %path.display(), error = %cleanup, "Could not remove orphaned upload");
            }
            return Err(error.into());
        }
    };

    tracing::info!(
        document_id = %document.id,
        project_id = %project.id,
        bytes = bytes.len(),
        "Document accepted for ingestion"
    );
    state.worker.submit(document.id);
    Ok((StatusCode::ACCEPTED, Json(document)))
}

/// Remove a document's vectors, then its file, then its row. Documents still ingesting answer 409.
async fn delete_document(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path((project_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let project = owned_project(&state, owner, project_id).await?;
    let document = state
        .repository
        .get_document(project.id, document_id)
        .await?;
    if !document.status.is_terminal() {
        return Err(ApiError::Conflict(DOCUMENT_IN_FLIGHT_MESSAGE.into()));
    }

    let namespace = project.id.to_string();
    let document_key = document.id.to_string();
    let chunks = state
        .index
        .count_document_chunks(&namespace, &document_key)
        .await?;
    state
        .index
        .delete_by_document(&namespace, &document_key)
        .await?;
    state.files.delete(&document.file).await?;
    state.repository.delete_document(document.id).await?;

    tracing::info!(
        document_id = %document.id,
        project_id = %project.id,
        chunks,
        "Document deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn list_pages(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path((project_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<DocumentPage>>, ApiError> {
    let project = owned_project(&state, owner, project_id).await?;
    let document = state
        .repository
        .get_document(project.id, document_id)
        .await?;
    Ok(Json(state.repository.list_pages(document.id).await?))
}

async fn list_messages(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let project = owned_project(&state, owner, project_id).await?;
    Ok(Json(state.repository.list_messages(project.id).await?))
}

#[derive(Deserialize)]
struct CreateMessageRequest {
    #[serde(default)]
    content: String,
}

/// Record the question, answer it, and return the assistant reply.
async fn create_message(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(project_id): Path<Uuid>,
    Json(request): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let project = owned_project(&state, owner, project_id).await?;
    if request.content.trim().is_empty() {
        return Err(ApiError::BadRequest("Content is required".into()));
    }

    state
        .repository
        .create_message(Message::user(project.id, request.content.clone()))
        .await?;
    let answer = state.answers.get_answer(project.id, &request.content).await;
    let reply = state
        .repository
        .create_message(Message::assistant(project.id, answer.answer, answer.sources))
        .await?;

    Ok((StatusCode::CREATED, Json(reply)))
}

async fn suggested_questions(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<String>>, ApiError> {
    let project = owned_project(&state, owner, project_id).await?;
    let last = state.repository.last_assistant_message(project.id).await?;
    let questions = state
        .answers
        .generate_suggested_questions(project.id, last.as_ref().map(|m| m.content.as_str()))
        .await;
    Ok(Json(questions))
}

async fn list_quizzes(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Quiz>>, ApiError> {
    let project = owned_project(&state, owner, project_id).await?;
    Ok(Json(state.repository.list_quizzes(project.id).await?))
}

#[derive(Deserialize, Default)]
struct CreateQuizRequest {
    #[serde(default)]
    num_questions: Option<usize>,
    #[serde(default)]
    quiz_type: QuizType,
}

async fn create_quiz(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(project_id): Path<Uuid>,
    Json(request): Json<CreateQuizRequest>,
) -> Result<(StatusCode, Json<Quiz>), ApiError> {
    let project = owned_project(&state, owner, project_id).await?;
    let count = clamp_question_count(request.num_questions);

    match state
        .quizzes
        .generate_quiz(project.id, count, request.quiz_type)
        .await
    {
        Some(quiz) => Ok((StatusCode::CREATED, Json(quiz))),
        None => Err(ApiError::Internal(QUIZ_FAILED_MESSAGE.into())),
    }
}

async fn get_quiz(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path((project_id, quiz_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Quiz>, ApiError> {
    let project = owned_project(&state, owner, project_id).await?;
    Ok(Json(state.repository.get_quiz(project.id, quiz_id).await?))
}

/// Error returned by handlers, rendered as `{"error": message}`.
#[derive(Debug, Error)]
enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { .. } => ApiError::NotFound(error.to_string()),
            StoreError::Conflict(message) => ApiError::Conflict(message),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::MissingField(_) => ApiError::BadRequest(error.to_string()),
            AuthError::UsernameTaken(_) => ApiError::Conflict(error.to_string()),
            AuthError::InvalidCredentials | AuthError::InvalidToken => {
                ApiError::Unauthorized(error.to_string())
            }
            AuthError::Hashing(_) => ApiError::Internal(error.to_string()),
        }
    }
}

impl From<FileStoreError> for ApiError {
    fn from(error: FileStoreError) -> Self {
        match error {
            FileStoreError::InvalidName(_) => ApiError::BadRequest(error.to_string()),
            FileStoreError::Io(_) => ApiError::Internal(error.to_string()),
        }
    }
}

impl From<IndexError> for ApiError {
    fn from(error: IndexError) -> Self {
        ApiError::Internal(error.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(error.body_text())
        } else {
            ApiError::BadRequest(error.body_text())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkUnit;
    use crate::embedding::HashEmbedder;
    use crate::index::MemoryVectorStore;
    use crate::ingest::{IngestionPipeline, TextChunker};
    use crate::models::DocumentStatus;
    use crate::store::MemoryRepository;
    use crate::test_support::{FnModel, StaticLoader};
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    const BOUNDARY: &str = "lectern-test-boundary";

    struct Harness {
        app: Router,
        state: AppState,
        _uploads: tempfile::TempDir,
    }

    fn scripted_model() -> FnModel {
        FnModel::new(|prompt| {
            let reply = if prompt.contains("multiple-choice questions") {
                r#"[{"question_text": "Who founded Rome?", "options": ["Romulus", "Remus", "Caesar", "Nero"], "answer": "Romulus"}]"#
            } else if prompt.contains("follow-up questions") {
                r#"["Who was Remus?", "When did Rome fall?", "What is a legion?"]"#
            } else if prompt.contains("[Question]:") {
                "Rome was founded by Romulus [Document ID: x, Page: 1]."
            } else {
                "page text"
            };
            Ok(reply.to_string())
        })
    }

    fn harness(llm: FnModel) -> Harness {
        let uploads = tempfile::tempdir().expect("tempdir");
        let repository: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let llm: Arc<dyn crate::llm::LanguageModel> = Arc::new(llm);
        let index = IndexGateway::new(
            Arc::new(MemoryVectorStore::new()),
            Arc::new(HashEmbedder::new(64)),
        );
        let metrics = Arc::new(IngestMetrics::new());
        let pipeline = IngestionPipeline::new(
            repository.clone(),
            Arc::new(StaticLoader::pages(&[
                "Rome was founded by Romulus.",
                "The empire later split in two.",
            ])),
            llm.clone(),
            index.clone(),
            TextChunker::new(1000, 200, ChunkUnit::Chars).expect("chunker"),
            "English".into(),
            metrics.clone(),
        );

        let state = AppState {
            repository: repository.clone(),
            auth: Arc::new(AuthService::new()),
            files: FileStore::new(uploads.path()),
            index: index.clone(),
            worker: IngestWorker::new(Arc::new(pipeline), 2),
            answers: AnswerEngine::new(index.clone(), llm.clone(), "English".into()),
            quizzes: QuizGenerator::new(repository, index, llm, "English".into()),
            metrics,
            max_upload_bytes: 8 * 1024 * 1024,
        };
        Harness {
            app: create_router(state.clone()),
            state,
            _uploads: uploads,
        }
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        read(app.clone().oneshot(request).await.expect("response")).await
    }

    async fn read(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    async fn upload(app: &Router, token: &str, project_id: &str, name: &str) -> (StatusCode, Value) {
        upload_content(app, token, project_id, name, b"%PDF-1.5 fake").await
    }

    async fn upload_content(
        app: &Router,
        token: &str,
        project_id: &str,
        name: &str,
        content: &[u8],
    ) -> (StatusCode, Value) {
        let mut body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
             Content-Type: application/pdf\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/projects/{project_id}/documents"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request");
        read(app.clone().oneshot(request).await.expect("response")).await
    }

    async fn register(app: &Router, username: &str) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/register",
            None,
            Some(json!({
                "email": format!("{username}@example.com"),
                "username": username,
                "password": "secret"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["token"].as_str().expect("token").to_string()
    }

    async fn create_project(app: &Router, token: &str) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/projects",
            Some(token),
            Some(json!({"title": "Rome"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().expect("project id").to_string()
    }

    async fn wait_until_terminal(state: &AppState, document_id: Uuid) -> Document {
        for _ in 0..200 {
            let document = state
                .repository
                .find_document(document_id)
                .await
                .expect("document");
            if document.status.is_terminal() {
                return document;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("document {document_id} never finished ingesting");
    }

    #[tokio::test]
    async fn register_login_and_project_crud() {
        let harness = harness(scripted_model());
        let token = register(&harness.app, "ada").await;

        let (status, login) = send(
            &harness.app,
            Method::POST,
            "/api/login",
            None,
            Some(json!({"username": "ada", "password": "secret"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(login["token"], token.as_str());
        assert_eq!(login["username"], "ada");

        let project_id = create_project(&harness.app, &token).await;
        let (status, projects) =
            send(&harness.app, Method::GET, "/api/projects", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(projects.as_array().map(Vec::len), Some(1));

        let (status, _) = send(
            &harness.app,
            Method::GET,
            &format!("/api/projects/{project_id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &harness.app,
            Method::POST,
            "/api/projects",
            Some(&token),
            Some(json!({"title": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Title is required");
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized_and_foreign_project_is_not_found() {
        let harness = harness(scripted_model());
        let (status, _) = send(&harness.app, Method::GET, "/api/projects", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let owner = register(&harness.app, "ada").await;
        let intruder = register(&harness.app, "eve").await;
        let project_id = create_project(&harness.app, &owner).await;

        for uri in [
            format!("/api/projects/{project_id}"),
            format!("/api/projects/{project_id}/documents"),
            format!("/api/projects/{project_id}/messages"),
            format!("/api/projects/{project_id}/quizzes"),
        ] {
            let (status, _) = send(&harness.app, Method::GET, &uri, Some(&intruder), None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn cookie_token_is_accepted() {
        let harness = harness(scripted_model());
        let token = register(&harness.app, "ada").await;

        let request = Request::builder()
            .uri("/api/projects")
            .header(header::COOKIE, format!("theme=dark; auth_token={token}"))
            .body(Body::empty())
            .expect("request");
        let response = harness.app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn upload_is_accepted_then_processed_and_deleted() {
        let harness = harness(scripted_model());
        let token = register(&harness.app, "ada").await;
        let project_id = create_project(&harness.app, &token).await;

        let (status, body) = upload(&harness.app, &token, &project_id, "notes.txt").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Only PDF files are supported");

        let (status, document) = upload(&harness.app, &token, &project_id, "rome.pdf").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(document["name"], "rome.pdf");
        let document_id: Uuid = document["id"]
            .as_str()
            .and_then(|id| id.parse().ok())
            .expect("document id");

        let finished = wait_until_terminal(&harness.state, document_id).await;
        assert_eq!(finished.status, DocumentStatus::Processed);
        assert_eq!(finished.processing_message.as_deref(), Some("Completed"));

        let (status, pages) = send(
            &harness.app,
            Method::GET,
            &format!("/api/projects/{project_id}/documents/{document_id}/pages"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let numbers: Vec<_> = pages
            .as_array()
            .expect("pages")
            .iter()
            .map(|page| page["page_number"].as_u64())
            .collect();
        assert_eq!(numbers, vec![Some(1), Some(2)]);

        let (status, _) = send(
            &harness.app,
            Method::DELETE,
            &format!("/api/projects/{project_id}/documents/{document_id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(
            harness
                .state
                .index
                .count_document_chunks(&project_id, &document_id.to_string())
                .await
                .expect("count"),
            0
        );
        assert!(!finished.file.exists());

        let (_, documents) = send(
            &harness.app,
            Method::GET,
            &format!("/api/projects/{project_id}/documents"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(documents, json!([]));
    }

    #[tokio::test]
    async fn multi_megabyte_upload_is_accepted_and_limit_is_enforced() {
        let harness = harness(scripted_model());
        let token = register(&harness.app, "ada").await;
        let project_id = create_project(&harness.app, &token).await;

        let large = vec![b'x'; 3 * 1024 * 1024];
        let (status, document) =
            upload_content(&harness.app, &token, &project_id, "big.pdf", &large).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let document_id: Uuid = document["id"]
            .as_str()
            .and_then(|id| id.parse().ok())
            .expect("document id");
        let finished = wait_until_terminal(&harness.state, document_id).await;
        assert_eq!(finished.status, DocumentStatus::Processed);

        let oversized = vec![b'x'; harness.state.max_upload_bytes + 1];
        let (status, _) =
            upload_content(&harness.app, &token, &project_id, "huge.pdf", &oversized).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn deleting_document_mid_ingestion_is_rejected() {
        let harness = harness(scripted_model());
        let token = register(&harness.app, "ada").await;
        let project_id = create_project(&harness.app, &token).await;
        let project_uuid: Uuid = project_id.parse().expect("project id");

        let queued = harness
            .state
            .repository
            .create_document(Document::queued(
                project_uuid,
                std::path::PathBuf::from("uploads/pending.pdf"),
                "pending.pdf".into(),
            ))
            .await
            .expect("document");

        let (status, body) = send(
            &harness.app,
            Method::DELETE,
            &format!("/api/projects/{project_id}/documents/{}", queued.id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], DOCUMENT_IN_FLIGHT_MESSAGE);
        assert!(harness.state.repository.find_document(queued.id).await.is_ok());
    }

    #[tokio::test]
    async fn chat_suggestions_and_quizzes() {
        let harness = harness(scripted_model());
        let token = register(&harness.app, "ada").await;
        let project_id = create_project(&harness.app, &token).await;

        let (_, document) = upload(&harness.app, &token, &project_id, "rome.pdf").await;
        let document_id: Uuid = document["id"]
            .as_str()
            .and_then(|id| id.parse().ok())
            .expect("document id");
        wait_until_terminal(&harness.state, document_id).await;

        let messages_uri = format!("/api/projects/{project_id}/messages");
        let (status, body) = send(
            &harness.app,
            Method::POST,
            &messages_uri,
            Some(&token),
            Some(json!({"content": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Content is required");

        let (status, reply) = send(
            &harness.app,
            Method::POST,
            &messages_uri,
            Some(&token),
            Some(json!({"content": "Who founded Rome?"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(reply["role"], "assistant");
        let sources = reply["sources"].as_array().expect("sources");
        assert!(!sources.is_empty());
        assert_eq!(sources[0]["document_id"], document_id.to_string());

        let (_, history) = send(&harness.app, Method::GET, &messages_uri, Some(&token), None).await;
        let roles: Vec<_> = history
            .as_array()
            .expect("messages")
            .iter()
            .map(|message| message["role"].clone())
            .collect();
        assert_eq!(roles, vec![json!("user"), json!("assistant")]);

        let (status, suggestions) = send(
            &harness.app,
            Method::GET,
            &format!("/api/projects/{project_id}/suggested-questions"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(suggestions.as_array().map(Vec::len), Some(3));

        let quizzes_uri = format!("/api/projects/{project_id}/quizzes");
        let (status, quiz) = send(
            &harness.app,
            Method::POST,
            &quizzes_uri,
            Some(&token),
            Some(json!({"num_questions": 1, "quiz_type": "MULTIPLE_CHOICE"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(quiz["title"], "Generated Quiz (1 Questions)");
        assert_eq!(quiz["questions"][0]["answer"], "Romulus");

        let quiz_id = quiz["id"].as_str().expect("quiz id");
        let (status, detail) = send(
            &harness.app,
            Method::GET,
            &format!("{quizzes_uri}/{quiz_id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["questions"].as_array().map(Vec::len), Some(1));

        let (_, listed) = send(&harness.app, Method::GET, &quizzes_uri, Some(&token), None).await;
        assert_eq!(listed.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn quiz_failure_is_reported_as_server_error() {
        let harness = harness(scripted_model());
        let token = register(&harness.app, "ada").await;
        let project_id = create_project(&harness.app, &token).await;

        let (status, body) = send(
            &harness.app,
            Method::POST,
            &format!("/api/projects/{project_id}/quizzes"),
            Some(&token),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], QUIZ_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn deleting_project_drops_collection_and_uploads() {
        let harness = harness(scripted_model());
        let token = register(&harness.app, "ada").await;
        let project_id = create_project(&harness.app, &token).await;

        let (_, document) = upload(&harness.app, &token, &project_id, "rome.pdf").await;
        let document_id: Uuid = document["id"]
            .as_str()
            .and_then(|id| id.parse().ok())
            .expect("document id");
        let finished = wait_until_terminal(&harness.state, document_id).await;

        let (status, _) = send(
            &harness.app,
            Method::DELETE,
            &format!("/api/projects/{project_id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!finished.file.exists());

        let (status, _) = send(
            &harness.app,
            Method::GET,
            &format!("/api/projects/{project_id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(
            harness
                .state
                .repository
                .find_document(document_id)
                .await
                .is_err()
        );
        assert_eq!(
            harness
                .state
                .index
                .count_document_chunks(&project_id, &document_id.to_string())
                .await
                .expect("count"),
            0
        );
    }
}
