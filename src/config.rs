use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_QDRANT_URL: &str = "http://127.0.0.1:6333";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Lectern server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Backend holding the per-project vector collections.
    pub vector_store: VectorStoreKind,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Provider answering formatting, translation, answer, and quiz prompts.
    pub llm_provider: LlmProvider,
    /// Generation model identifier passed to the provider.
    pub llm_model: String,
    /// API key for OpenAI-compatible endpoints.
    pub openai_api_key: Option<String>,
    /// Base URL for OpenAI-compatible endpoints.
    pub openai_base_url: String,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: String,
    /// Natural language used for translations, answers, and generated quizzes.
    pub target_language: String,
    /// Chunk window size measured in `chunk_unit`.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks measured in `chunk_unit`.
    pub chunk_overlap: usize,
    /// Unit used to measure chunk windows.
    pub chunk_unit: ChunkUnit,
    /// Directory receiving uploaded files.
    pub upload_dir: PathBuf,
    /// Largest accepted upload request body, in bytes.
    pub max_upload_bytes: usize,
    /// Maximum number of ingestions running at once.
    pub ingest_concurrency: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Backends able to hold the vector index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreKind {
    /// Remote Qdrant instance reached over HTTP.
    Qdrant,
    /// Process-local store, lost on restart.
    Memory,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic hashing embedder for offline runs.
    Hash,
}

/// Supported text-generation backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Hosted OpenAI chat completions API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

/// Unit used when measuring chunk windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkUnit {
    /// Unicode scalar values.
    Chars,
    /// `cl100k_base` tokens.
    Tokens,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            vector_store: parse_or("VECTOR_STORE", VectorStoreKind::Qdrant)?,
            qdrant_url: load_env_or("QDRANT_URL", DEFAULT_QDRANT_URL),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_provider: parse_or("EMBEDDING_PROVIDER", EmbeddingProvider::OpenAI)?,
            embedding_model: load_env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
            embedding_dimension: parse_or("EMBEDDING_DIMENSION", 1536)?,
            llm_provider: parse_or("LLM_PROVIDER", LlmProvider::OpenAI)?,
            llm_model: load_env_or("LLM_MODEL", "gpt-4o"),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_base_url: load_env_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            ollama_url: load_env_or("OLLAMA_URL", DEFAULT_OLLAMA_URL),
            target_language: load_env_or("TARGET_LANGUAGE", "Korean"),
            chunk_size: parse_or("CHUNK_SIZE", 1000)?,
            chunk_overlap: parse_or("CHUNK_OVERLAP", 200)?,
            chunk_unit: parse_or("CHUNK_UNIT", ChunkUnit::Chars)?,
            upload_dir: PathBuf::from(load_env_or("UPLOAD_DIR", "uploads")),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            ingest_concurrency: parse_or("INGEST_CONCURRENCY", 2)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP".into()));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.ingest_concurrency == 0 {
            return Err(ConfigError::InvalidValue("INGEST_CONCURRENCY".into()));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidValue("MAX_UPLOAD_BYTES".into()));
        }
        let needs_openai = self.embedding_provider == EmbeddingProvider::OpenAI
            || self.llm_provider == LlmProvider::OpenAI;
        if needs_openai && self.openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".into()));
        }
        Ok(())
    }
}

fn load_env_or(key: &str, default: &str) -> String {
    load_env_optional(key).unwrap_or_else(|| default.to_string())
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl std::str::FromStr for VectorStoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for ChunkUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chars" | "characters" => Ok(Self::Chars),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        vector_store = ?config.vector_store,
        qdrant_url = %config.qdrant_url,
        embedding_provider = ?config.embedding_provider,
        llm_provider = ?config.llm_provider,
        llm_model = %config.llm_model,
        target_language = %config.target_language,
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        max_upload_bytes = config.max_upload_bytes,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        vector_store: VectorStoreKind::Memory,
        qdrant_url: DEFAULT_QDRANT_URL.into(),
        qdrant_api_key: None,
        embedding_provider: EmbeddingProvider::Hash,
        embedding_model: "hash".into(),
        embedding_dimension: 64,
        llm_provider: LlmProvider::Ollama,
        llm_model: "llama3".into(),
        openai_api_key: None,
        openai_base_url: DEFAULT_OPENAI_BASE_URL.into(),
        ollama_url: DEFAULT_OLLAMA_URL.into(),
        target_language: "Korean".into(),
        chunk_size: 1000,
        chunk_overlap: 200,
        chunk_unit: ChunkUnit::Chars,
        upload_dir: PathBuf::from("uploads"),
        max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        ingest_concurrency: 2,
        server_port: None,
    }
}
