//! Text-generation providers behind a single `complete(prompt)` seam.
//!
//! Both backends issue one non-streaming HTTP request per call at temperature zero and hold no
//! per-call state, so a single instance is shared by every pipeline and request handler.

pub mod prompts;

use crate::config::{Config, LlmProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by text-generation providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider was not configured or could not be reached.
    #[error("Language model unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by text-generation providers.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a single-turn prompt and return the raw model text.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Build the language model selected by `config`.
pub fn build_language_model(config: &Config) -> Result<Arc<dyn LanguageModel>, LlmError> {
    tracing::debug!(
        provider = ?config.llm_provider,
        model = %config.llm_model,
        "Building language model client"
    );

    let model: Arc<dyn LanguageModel> = match config.llm_provider {
        LlmProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                LlmError::ProviderUnavailable("OPENAI_API_KEY is not set".into())
            })?;
            Arc::new(OpenAiChatClient {
                http: http_client()?,
                base_url: config.openai_base_url.clone(),
                api_key,
                model: config.llm_model.clone(),
            })
        }
        LlmProvider::Ollama => Arc::new(OllamaGenerateClient {
            http: http_client()?,
            base_url: config.ollama_url.clone(),
            model: config.llm_model.clone(),
        }),
    };
    Ok(model)
}

fn http_client() -> Result<Client, LlmError> {
    Client::builder()
        .user_agent("lectern/llm")
        .build()
        .map_err(|error| LlmError::ProviderUnavailable(error.to_string()))
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatClient {
    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let payload = json!({
            "model": self.model,
            "temperature": 0.0,
            "messages": [
                { "role": "user", "content": prompt }
            ]
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LlmError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::GenerationFailed(format!(
                "OpenAI returned {status}: {body}"
            )));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            LlmError::InvalidResponse(format!("failed to decode OpenAI response: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".into()))
    }
}

/// Ollama `/api/generate` client.
pub struct OllamaGenerateClient {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

impl OllamaGenerateClient {
    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LanguageModel for OllamaGenerateClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": 0.0,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LlmError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LlmError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            LlmError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(LlmError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn ollama_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let client = OllamaGenerateClient {
            http: Client::new(),
            base_url: server.base_url(),
            model: "llama3".into(),
        };

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"stream": false}"#);
                then.status(200).json_body(json!({
                    "response": "## Heading",
                    "done": true
                }));
            })
            .await;

        let text = client.complete("Format this").await.expect("completion");

        mock.assert();
        assert_eq!(text, "## Heading");
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        let client = OllamaGenerateClient {
            http: Client::new(),
            base_url: server.base_url(),
            model: "llama3".into(),
        };

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let error = client.complete("Format this").await.expect_err("error");
        assert!(matches!(error, LlmError::GenerationFailed(message) if message.contains("500")));
    }

    #[tokio::test]
    async fn openai_client_returns_first_choice() {
        let server = MockServer::start_async().await;
        let client = OpenAiChatClient {
            http: Client::new(),
            base_url: server.base_url(),
            api_key: "sk-test".into(),
            model: "gpt-4o".into(),
        };

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .json_body_partial(r#"{"model": "gpt-4o", "temperature": 0.0}"#);
                then.status(200).json_body(json!({
                    "choices": [
                        { "index": 0, "message": { "role": "assistant", "content": "Answer" } }
                    ]
                }));
            })
            .await;

        let text = client.complete("Question").await.expect("completion");

        mock.assert();
        assert_eq!(text, "Answer");
    }

    #[tokio::test]
    async fn openai_client_rejects_empty_choices() {
        let server = MockServer::start_async().await;
        let client = OpenAiChatClient {
            http: Client::new(),
            base_url: server.base_url(),
            api_key: "sk-test".into(),
            model: "gpt-4o".into(),
        };

        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client.complete("Question").await.expect_err("no choices");
        assert!(matches!(error, LlmError::InvalidResponse(_)));
    }
}
