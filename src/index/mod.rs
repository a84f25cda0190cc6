//! Per-project vector index.
//!
//! [`IndexGateway`] owns the namespacing rules (`project_{id}` collections, deterministic point
//! ids, idempotent deletes) and query embedding. The [`VectorStore`] seam beneath it only speaks
//! in collections and points, so the Qdrant backend and the in-process backend stay small.

mod memory;
mod qdrant;

pub use memory::MemoryVectorStore;
pub use qdrant::QdrantStore;

use crate::config::{Config, VectorStoreKind};
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The project has no collection yet; callers treat this as "nothing indexed".
    #[error("Index not found: {0}")]
    IndexNotFound(String),
    /// Query or chunk embedding failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Vector length disagrees with the collection.
    #[error("Vector dimension mismatch: expected {expected}, received {actual}")]
    DimensionMismatch {
        /// Dimension the collection was created with.
        expected: usize,
        /// Dimension of the rejected vector.
        actual: usize,
    },
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Metadata attached to every indexed chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Owning document.
    pub document_id: String,
    /// 0-based page the chunk was cut from.
    pub source_page: u32,
    /// Document display name.
    pub name: String,
}

/// Chunk ready to be written, with its embedding already computed.
#[derive(Debug, Clone)]
pub struct IndexItem {
    /// Deterministic chunk key, `doc_{document_id}_chunk_{i}`.
    pub id: String,
    /// Embedding of `text`.
    pub embedding: Vec<f32>,
    /// Chunk text.
    pub text: String,
    /// Citation metadata.
    pub metadata: ChunkMetadata,
}

/// Payload persisted alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Deterministic chunk key.
    pub chunk_id: String,
    /// Owning document.
    pub document_id: String,
    /// 0-based source page.
    pub source_page: u32,
    /// Document display name.
    pub name: String,
    /// Chunk text.
    pub text: String,
    /// SHA-256 of `text`.
    pub chunk_hash: String,
}

/// Point as handed to a [`VectorStore`].
#[derive(Debug, Clone)]
pub struct StoredPoint {
    /// UUIDv5 derived from the chunk key.
    pub id: Uuid,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Stored payload.
    pub payload: ChunkPayload,
}

/// Chunk returned from a similarity query.
///
/// Metadata fields are optional because payloads written by other tools may lack them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RetrievedChunk {
    /// Chunk text.
    #[serde(default)]
    pub text: String,
    /// Owning document, if recorded.
    #[serde(default)]
    pub document_id: Option<String>,
    /// 0-based source page, if recorded.
    #[serde(default)]
    pub source_page: Option<u32>,
    /// Document display name, if recorded.
    #[serde(default)]
    pub name: Option<String>,
    /// Similarity score computed by the store.
    #[serde(skip)]
    pub score: f32,
}

/// Collection/point operations implemented by vector backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection with cosine distance when it does not exist yet.
    async fn ensure_collection(&self, collection: &str, dimension: usize)
    -> Result<(), IndexError>;

    /// Insert or overwrite points by id.
    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<StoredPoint>,
    ) -> Result<(), IndexError>;

    /// Return the `limit` nearest points; [`IndexError::IndexNotFound`] for a missing collection.
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError>;

    /// Remove every point tagged with `document_id`; a missing collection is not an error.
    async fn delete_by_document(&self, collection: &str, document_id: &str)
    -> Result<(), IndexError>;

    /// Count points tagged with `document_id`; a missing collection counts as zero.
    async fn count_by_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<usize, IndexError>;

    /// Drop the collection; a missing collection is not an error.
    async fn drop_collection(&self, collection: &str) -> Result<(), IndexError>;
}

/// Build the vector backend selected by `config`.
pub fn build_vector_store(config: &Config) -> Result<Arc<dyn VectorStore>, IndexError> {
    let store: Arc<dyn VectorStore> = match config.vector_store {
        VectorStoreKind::Qdrant => Arc::new(QdrantStore::new(
            &config.qdrant_url,
            config.qdrant_api_key.clone(),
        )?),
        VectorStoreKind::Memory => Arc::new(MemoryVectorStore::new()),
    };
    Ok(store)
}

/// Collection name holding a project's chunks.
pub fn collection_name(project_id: &str) -> String {
    format!("project_{project_id}")
}

/// Deterministic chunk key for the `index`-th chunk of a document.
pub fn chunk_key(document_id: &str, index: usize) -> String {
    format!("doc_{document_id}_chunk_{index}")
}

/// Backend point id for a chunk key.
pub fn point_id(chunk_key: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_key.as_bytes())
}

/// Hex-encoded SHA-256 of chunk text.
pub fn hash_chunk(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Namespaced index shared by ingestion, answering, and quiz generation.
#[derive(Clone)]
pub struct IndexGateway {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
}

impl IndexGateway {
    /// Combine a vector backend with the embedding client used for chunks and queries.
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self { store, embedder }
    }

    /// Embed a batch of chunk texts in one provider call.
    pub async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, IndexError> {
        Ok(self.embedder.generate_embeddings(texts).await?)
    }

    /// Insert or overwrite chunks in the project's collection, creating it on first write.
    pub async fn upsert(&self, project_id: &str, items: Vec<IndexItem>) -> Result<(), IndexError> {
        if items.is_empty() {
            return Ok(());
        }

        let collection = collection_name(project_id);
        let dimension = self.embedder.dimension();
        if let Some(item) = items.iter().find(|item| item.embedding.len() != dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: item.embedding.len(),
            });
        }

        self.store.ensure_collection(&collection, dimension).await?;

        let points: Vec<_> = items
            .into_iter()
            .map(|item| StoredPoint {
                id: point_id(&item.id),
                vector: item.embedding,
                payload: ChunkPayload {
                    chunk_hash: hash_chunk(&item.text),
                    chunk_id: item.id,
                    document_id: item.metadata.document_id,
                    source_page: item.metadata.source_page,
                    name: item.metadata.name,
                    text: item.text,
                },
            })
            .collect();

        let count = points.len();
        self.store.upsert_points(&collection, points).await?;
        tracing::debug!(collection = %collection, points = count, "Chunks upserted");
        Ok(())
    }

    /// Embed `query_text` and return the `k` nearest chunks of the project.
    pub async fn query(
        &self,
        project_id: &str,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        let collection = collection_name(project_id);
        let mut vectors = self.embed(vec![query_text.to_string()]).await?;
        let vector = vectors.pop().ok_or_else(|| {
            EmbeddingClientError::InvalidResponse("no embedding returned for query".into())
        })?;
        let dimension = self.embedder.dimension();
        if vector.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
        self.store.search(&collection, vector, k).await
    }

    /// Remove every chunk of a document. Idempotent.
    pub async fn delete_by_document(
        &self,
        project_id: &str,
        document_id: &str,
    ) -> Result<(), IndexError> {
        let collection = collection_name(project_id);
        self.store.delete_by_document(&collection, document_id).await?;
        tracing::debug!(collection = %collection, document_id, "Document chunks deleted");
        Ok(())
    }

    /// Drop the project's whole collection. Idempotent.
    pub async fn delete_namespace(&self, project_id: &str) -> Result<(), IndexError> {
        let collection = collection_name(project_id);
        self.store.drop_collection(&collection).await?;
        tracing::debug!(collection = %collection, "Collection dropped");
        Ok(())
    }

    /// Exact number of chunks stored for a document.
    pub async fn count_document_chunks(
        &self,
        project_id: &str,
        document_id: &str,
    ) -> Result<usize, IndexError> {
        self.store
            .count_by_document(&collection_name(project_id), document_id)
            .await
    }
}
