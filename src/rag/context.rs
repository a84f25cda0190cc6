//! Context assembly: citation tags, source snippets, and the joined context block.

use crate::index::RetrievedChunk;
use crate::models::Source;

const SNIPPET_CHARS: usize = 100;
const UNKNOWN_DOCUMENT_ID: &str = "unknown";
const UNKNOWN_DOCUMENT_NAME: &str = "Unknown Document";

/// Context block handed to the model together with its parallel citation list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CitedContext {
    /// Chunks, each prefixed with its citation tag, separated by blank lines.
    pub text: String,
    /// One source per chunk, in retrieval order.
    pub sources: Vec<Source>,
}

/// Inline citation tag; `page` is 1-based.
pub fn citation_tag(document_id: &str, page: u32) -> String {
    format!("[Document ID: {document_id}, Page: {page}]")
}

/// First 100 characters of `text` followed by `...`.
pub fn snippet(text: &str) -> String {
    let mut excerpt: String = text.chars().take(SNIPPET_CHARS).collect();
    excerpt.push_str("...");
    excerpt
}

/// Build the cited context block. Retrieval order is preserved and nothing is deduplicated.
pub fn format_context(chunks: &[RetrievedChunk]) -> CitedContext {
    let mut context = CitedContext::default();

    for chunk in chunks {
        let document_id = chunk
            .document_id
            .clone()
            .unwrap_or_else(|| UNKNOWN_DOCUMENT_ID.to_string());
        let page = chunk.source_page.unwrap_or(0) + 1;
        let name = chunk
            .name
            .clone()
            .unwrap_or_else(|| UNKNOWN_DOCUMENT_NAME.to_string());

        context.text.push_str(&citation_tag(&document_id, page));
        context.text.push(' ');
        context.text.push_str(&chunk.text);
        context.text.push_str("\n\n");

        context.sources.push(Source {
            document_id,
            page,
            name,
            content_snippet: snippet(&chunk.text),
        });
    }

    context
}

/// Plain concatenation of chunk texts, used where citations are not needed.
pub fn join_texts(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
