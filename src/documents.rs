//! Document context for user messages.
//!
//! Uploaded documents are turned into text by a [`DocumentExtractor`],
//! concatenated under per-file headers, capped at a fixed number of characters
//! and placed ahead of the next user query.  The query is introduced by
//! [`QUERY_MARKER`] so [`display_query`] can recover it for display.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Introduces the document context in a composed message.
pub const CONTEXT_HEADER: &str = "Context from uploaded documents:";

/// Separates the document context from the literal query.
pub const QUERY_MARKER: &str = "User Query:";

/// Default cap on the context, in characters.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 30_000;

/// Turns a file into plain text.
pub trait DocumentExtractor {
    /// Returns `Ok(None)` when the file yields no usable text.
    fn extract(&self, path: &Path) -> Result<Option<String>>;
}

/// Reads UTF-8 text files verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl DocumentExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<Option<String>> {
        let bytes = fs::read(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        match String::from_utf8(bytes) {
            Ok(text) if !text.trim().is_empty() => Ok(Some(text)),
            Ok(_) => Ok(None),
            Err(_) => {
                tracing::debug!(path = %path.display(), "skipping non-UTF-8 document");
                Ok(None)
            }
        }
    }
}

/// A named document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Display name, usually the file name.
    pub name: String,
    /// Extracted text.
    pub text: String,
}

/// Documents waiting to be attached to the next user message.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    documents: Vec<Document>,
    max_chars: usize,
}

impl Default for DocumentContext {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTEXT_CHARS)
    }
}

impl DocumentContext {
    /// Create an empty context capped at `max_chars` characters.
    pub fn new(max_chars: usize) -> Self {
        Self {
            documents: Vec::new(),
            max_chars,
        }
    }

    /// The character cap.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Change the character cap.
    pub fn set_max_chars(&mut self, max_chars: usize) {
        self.max_chars = max_chars;
    }

    /// Add a document.
    pub fn push(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.documents.push(Document {
            name: name.into(),
            text: text.into(),
        });
    }

    /// Extract `path` with `extractor` and add it.
    ///
    /// Returns false when the extractor produced no text.
    pub fn attach_file(&mut self, path: &Path, extractor: &dyn DocumentExtractor) -> Result<bool> {
        let Some(text) = extractor.extract(path)? else {
            return Ok(false);
        };
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.push(name, text);
        Ok(true)
    }

    /// The pending documents.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// True when no document is pending.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Drop every pending document.
    pub fn clear(&mut self) {
        self.documents.clear();
    }

    /// The concatenated, capped context text, or `None` with no documents.
    pub fn render(&self) -> Option<String> {
        if self.documents.is_empty() {
            return None;
        }
        let mut context = String::new();
        for document in &self.documents {
            context.push_str("--- ");
            context.push_str(&document.name);
            context.push_str(" ---\n");
            context.push_str(&document.text);
            context.push('\n');
        }
        Some(truncate_chars(&context, self.max_chars).to_string())
    }

    /// The message to send for `query`: the query alone with no documents,
    /// otherwise the context followed by the marker and the query.
    pub fn compose(&self, query: &str) -> String {
        match self.render() {
            Some(context) => format!("{CONTEXT_HEADER}\n{context}\n\n{QUERY_MARKER} {query}"),
            None => query.to_string(),
        }
    }
}

/// The literal query in a possibly context-bearing message.
pub fn display_query(content: &str) -> &str {
    if !content.starts_with(CONTEXT_HEADER) {
        return content;
    }
    let separator = format!("\n\n{QUERY_MARKER} ");
    match content.rfind(&separator) {
        Some(idx) => &content[idx + separator.len()..],
        None => content,
    }
}

/// The first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_without_documents_is_identity() {
        let context = DocumentContext::default();
        assert_eq!(context.compose("summarize"), "summarize");
        assert_eq!(display_query("summarize"), "summarize");
    }

    #[test]
    fn compose_with_documents() {
        let mut context = DocumentContext::default();
        context.push("a.txt", "alpha");
        context.push("b.txt", "beta");
        let message = context.compose("compare them");
        assert_eq!(
            message,
            "Context from uploaded documents:\n--- a.txt ---\nalpha\n--- b.txt ---\nbeta\n\n\nUser Query: compare them"
        );
        assert_eq!(display_query(&message), "compare them");
    }

    #[test]
    fn context_is_truncated_to_limit() {
        let mut context = DocumentContext::new(50);
        context.push("long.txt", "x".repeat(500));
        let rendered = context.render().unwrap();
        assert_eq!(rendered.chars().count(), 50);
        assert!(rendered.starts_with("--- long.txt ---\n"));

        let message = context.compose("summarize");
        assert!(message.contains(&format!("{rendered}\n\n{QUERY_MARKER} summarize")));
        assert_eq!(display_query(&message), "summarize");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hé", 10), "hé");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn marker_inside_document_does_not_leak() {
        let mut context = DocumentContext::default();
        context.push("notes.txt", "an aside\n\nUser Query: not this one");
        let message = context.compose("the real question");
        assert_eq!(display_query(&message), "the real question");
    }

    #[test]
    fn plain_query_mentioning_marker_is_shown_whole() {
        let text = "What does \"User Query: x\" mean?";
        assert_eq!(display_query(text), text);
    }

    #[test]
    fn plain_text_extractor_reads_files() {
        let dir = std::env::temp_dir().join(format!("parley-docs-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let good = dir.join("notes.txt");
        fs::write(&good, "hello notes").unwrap();
        let empty = dir.join("empty.txt");
        fs::write(&empty, "   ").unwrap();
        let binary = dir.join("blob.bin");
        fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();

        let mut context = DocumentContext::default();
        assert!(context.attach_file(&good, &PlainTextExtractor).unwrap());
        assert!(!context.attach_file(&empty, &PlainTextExtractor).unwrap());
        assert!(!context.attach_file(&binary, &PlainTextExtractor).unwrap());
        assert!(context.attach_file(&dir.join("missing.txt"), &PlainTextExtractor).is_err());
        assert_eq!(context.documents().len(), 1);
        assert_eq!(context.documents()[0].name, "notes.txt");

        fs::remove_dir_all(&dir).unwrap();
    }
}
