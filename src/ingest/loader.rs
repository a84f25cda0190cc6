//! Per-page PDF text extraction.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that make a document unreadable.
#[derive(Debug, Error)]
pub enum LoadError {
    /// File is missing, unreadable, or not a valid PDF.
    #[error("Failed to load PDF {}: {source}", path.display())]
    Unreadable {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying parser error.
        #[source]
        source: lopdf::Error,
    },
    /// PDF parsed but contains no pages.
    #[error("PDF {} contains no pages", .0.display())]
    NoPages(PathBuf),
    /// Extraction task was cancelled or panicked.
    #[error("PDF extraction interrupted: {0}")]
    Interrupted(String),
}

/// Raw text of one page as extracted from the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPage {
    /// 0-based position in the document.
    pub index: u32,
    /// Extracted text; may be empty for image-only pages.
    pub text: String,
}

/// Source of per-page document text.
#[async_trait]
pub trait PageLoader: Send + Sync {
    /// Extract every page of the file at `path`, in page order.
    async fn load(&self, path: &Path) -> Result<Vec<LoadedPage>, LoadError>;
}

/// `lopdf`-backed PDF loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfLoader;

impl PdfLoader {
    /// Create a loader.
    pub const fn new() -> Self {
        Self
    }

    fn extract(path: &Path) -> Result<Vec<LoadedPage>, LoadError> {
        let document = lopdf::Document::load(path).map_err(|source| LoadError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let pages = document.get_pages();
        if pages.is_empty() {
            return Err(LoadError::NoPages(path.to_path_buf()));
        }

        Ok(pages
            .keys()
            .enumerate()
            .map(|(index, &page_number)| {
                let text = document
                    .extract_text(&[page_number])
                    .unwrap_or_else(|error| {
                        tracing::warn!(
                            path = %path.display(),
                            page = page_number,
                            error = %error,
                            "Page text extraction failed; treating page as empty"
                        );
                        String::new()
                    });
                LoadedPage {
                    index: index as u32,
                    text,
                }
            })
            .collect())
    }
}

#[async_trait]
impl PageLoader for PdfLoader {
    async fn load(&self, path: &Path) -> Result<Vec<LoadedPage>, LoadError> {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::extract(&owned))
            .await
            .map_err(|error| LoadError::Interrupted(error.to_string()))?
    }
}

/// Build an uncompressed PDF with one text line per page.
#[cfg(test)]
pub(crate) fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let encoded = content.encode().expect("encode content");
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize pdf");
    bytes
}
