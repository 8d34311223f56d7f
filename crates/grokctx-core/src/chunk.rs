//! Token-budget-aware text chunker.
//!
//! Splits document text into [`Chunk`]s that describe byte ranges of the
//! source. Chunking happens in two passes:
//!
//! 1. [`Chunker::split_on_delimiter`] cuts the text after every delimiter
//!    (a paragraph break by default). The delimiter stays attached to the
//!    chunk it ends, and the trailing remainder becomes its own chunk, so
//!    concatenating the chunks in offset order reproduces the text exactly.
//! 2. [`Chunker::split_to_budget`] recursively cuts any chunk whose token
//!    count exceeds the limit into `ceil(tokens / limit)` equal byte
//!    segments until every leaf fits.
//!
//! There is no sentence or semantic awareness: a long run of text is cut at
//! byte positions (snapped back to UTF-8 character boundaries).
//!
//! Each chunk carries a SHA-256 of its document-prefixed text, which the
//! store uses as its identity for dedup.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use grokctx_core::chunk::Chunker;
//! use grokctx_core::tokenizer::ApproxTokenizer;
//!
//! let chunker = Chunker::new(Arc::new(ApproxTokenizer::default()));
//! let chunks = chunker.chunks_from_text(Some("notes.md"), "Hello.\n\nWorld.", 100);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].offset, 8);
//! ```

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::models::Chunk;
use crate::tokenizer::Tokenizer;

/// Paragraph break.
pub const DEFAULT_DELIMITER: &str = "\n\n";

/// Splits text into token-bounded chunks using an injected tokenizer.
#[derive(Clone)]
pub struct Chunker {
    tokenizer: Arc<dyn Tokenizer>,
    delimiter: String,
}

impl Chunker {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer,
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        let delimiter = delimiter.into();
        if !delimiter.is_empty() {
            self.delimiter = delimiter;
        }
        self
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Token count of a chunk's attached text, cached on the chunk.
    ///
    /// A chunk without attached text counts as zero tokens.
    pub fn token_count(&self, chunk: &mut Chunk) -> usize {
        if let Some(count) = chunk.token_count {
            return count;
        }
        let count = chunk
            .text
            .as_deref()
            .map(|t| self.tokenizer.count_tokens(t))
            .unwrap_or(0);
        chunk.token_count = Some(count);
        count
    }

    /// Cut `text` after every occurrence of the delimiter.
    ///
    /// Offsets are absolute byte offsets into `text`. An empty text yields
    /// no chunks.
    pub fn split_on_delimiter(&self, document: Option<&str>, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut start = 0;
        for (i, _) in text.match_indices(self.delimiter.as_str()) {
            let end = i + self.delimiter.len();
            chunks.push(new_chunk(document, start, &text[start..end]));
            start = end;
        }
        if start < text.len() {
            chunks.push(new_chunk(document, start, &text[start..]));
        }
        chunks
    }

    /// Split a chunk until every piece is within `token_limit` tokens.
    ///
    /// A chunk already within budget comes back unchanged. Otherwise its
    /// byte range is divided into `ceil(tokens / token_limit)` segments of
    /// equal size (the last one absorbs the remainder) and each segment is
    /// processed again. Uses an explicit work stack, so pathological input
    /// cannot exhaust the call stack. Pieces come back in offset order.
    ///
    /// A segment that cannot be divided further (a single character) is
    /// returned as is even if it is over budget. A zero limit disables
    /// splitting.
    pub fn split_to_budget(&self, chunk: Chunk, token_limit: usize) -> Vec<Chunk> {
        if token_limit == 0 {
            return vec![chunk];
        }

        let mut leaves = Vec::new();
        let mut pending = vec![chunk];

        while let Some(mut chunk) = pending.pop() {
            let tokens = self.token_count(&mut chunk);
            if tokens <= token_limit {
                leaves.push(chunk);
                continue;
            }

            let text = chunk.text.as_deref().unwrap_or_default();
            let segments = segment_bounds(text, tokens.div_ceil(token_limit));
            if segments.len() < 2 {
                debug!(
                    document = %chunk.document,
                    offset = chunk.offset,
                    tokens,
                    token_limit,
                    "chunk cannot be split further"
                );
                leaves.push(chunk);
                continue;
            }

            let document = (!chunk.document.is_empty()).then_some(chunk.document.as_str());
            for (start, end) in segments.into_iter().rev() {
                pending.push(new_chunk(
                    document,
                    chunk.offset + start,
                    &text[start..end],
                ));
            }
        }

        leaves
    }

    /// Delimiter split followed by a budget split of every piece.
    pub fn chunks_from_text(
        &self,
        document: Option<&str>,
        text: &str,
        token_limit: usize,
    ) -> Vec<Chunk> {
        self.split_on_delimiter(document, text)
            .into_iter()
            .flat_map(|c| self.split_to_budget(c, token_limit))
            .collect()
    }

    /// Split free-standing text into strings of at most `token_limit` tokens.
    pub fn strings_from_text(&self, text: &str, token_limit: usize) -> Vec<String> {
        self.chunks_from_text(None, text, token_limit)
            .into_iter()
            .filter_map(|c| c.text)
            .collect()
    }
}

/// Identity hash of a chunk: SHA-256 over `"from <document>:\n<text>\n"`.
///
/// Prefixing the document path keeps identical paragraphs in different
/// documents distinct.
pub fn chunk_hash(document: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(header_text(document, text).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Text prefixed with its document header, as sent to the embedder.
pub fn header_text(document: &str, text: &str) -> String {
    format!("from {}:\n{}\n", document, text)
}

/// Build a chunk over `text` at `offset`. Chunks without a document get
/// no hash.
pub fn new_chunk(document: Option<&str>, offset: usize, text: &str) -> Chunk {
    Chunk {
        document: document.unwrap_or_default().to_string(),
        offset,
        length: text.len(),
        hash: document.map(|d| chunk_hash(d, text)).unwrap_or_default(),
        embedding: None,
        token_count: None,
        stale: false,
        text: Some(text.to_string()),
    }
}

/// Byte ranges dividing `text` into `n` roughly equal segments, cut on
/// character boundaries. Empty segments are dropped.
fn segment_bounds(text: &str, n: usize) -> Vec<(usize, usize)> {
    let n = n.max(1);
    let size = text.len().div_ceil(n).max(1);
    let mut bounds = Vec::with_capacity(n);
    for i in 0..n {
        let start = snap_to_char_boundary(text, i * size);
        let end = snap_to_char_boundary(text, ((i + 1) * size).min(text.len()));
        if end > start {
            bounds.push((start, end));
        }
    }
    bounds
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
pub(crate) fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
