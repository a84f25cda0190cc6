//! Fakes shared by unit tests.

use crate::ingest::{LoadError, LoadedPage, PageLoader};
use crate::llm::{LanguageModel, LlmError};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Loader returning fixed pages, or a load error when built with [`StaticLoader::failing`].
pub(crate) struct StaticLoader {
    pages: Option<Vec<String>>,
}

impl StaticLoader {
    pub(crate) fn pages(pages: &[&str]) -> Self {
        Self {
            pages: Some(pages.iter().map(|page| page.to_string()).collect()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self { pages: None }
    }
}

#[async_trait]
impl PageLoader for StaticLoader {
    async fn load(&self, path: &Path) -> Result<Vec<LoadedPage>, LoadError> {
        match &self.pages {
            Some(pages) => Ok(pages
                .iter()
                .enumerate()
                .map(|(index, text)| LoadedPage {
                    index: index as u32,
                    text: text.clone(),
                })
                .collect()),
            None => Err(LoadError::NoPages(path.to_path_buf())),
        }
    }
}

type Responder = dyn Fn(&str) -> Result<String, LlmError> + Send + Sync;

/// Language model answering through a closure and counting calls.
pub(crate) struct FnModel {
    respond: Box<Responder>,
    calls: AtomicUsize,
}

impl FnModel {
    pub(crate) fn new<F>(respond: F) -> Self
    where
        F: Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
        }
    }

    /// Model that always returns `text`.
    pub(crate) fn constant(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Model that always fails.
    pub(crate) fn failing() -> Self {
        Self::new(|_| Err(LlmError::GenerationFailed("model offline".into())))
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for FnModel {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(prompt)
    }
}
