#![deny(missing_docs)]

//! Core library for Lectern, a document workspace that ingests PDFs into a per-project vector
//! index and answers questions and builds quizzes from them.

/// HTTP routing and REST handlers.
pub mod api;
/// Account registration and token resolution.
pub mod auth;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Local storage for uploaded files.
pub mod files;
/// Per-project vector index gateway and backends.
pub mod index;
/// Document ingestion pipeline and background worker.
pub mod ingest;
/// Text-generation client abstraction and prompt templates.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Entities shared by the store and the HTTP surface.
pub mod models;
/// Quiz and flashcard generation.
pub mod quiz;
/// Retrieval-augmented answers and suggestions.
pub mod rag;
/// Relational store abstraction and in-memory implementation.
pub mod store;

#[cfg(test)]
mod test_support;
