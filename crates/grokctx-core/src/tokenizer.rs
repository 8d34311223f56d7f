//! Token counting abstraction.
//!
//! Every budget in the crate is expressed in tokens of an injected
//! [`Tokenizer`]. Implementations must be deterministic: the same text must
//! always produce the same count, since counts are cached per chunk.

/// Counts the tokens in a piece of text.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// Approximate characters-per-token ratio used when no model tokenizer is
/// configured.
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

/// Character-ratio tokenizer: `ceil(chars / chars_per_token)`.
///
/// Cheap and dependency-free. Any non-empty text counts as at least one
/// token, and a text never counts more tokens than it has characters, so
/// splitting always converges.
#[derive(Debug, Clone)]
pub struct ApproxTokenizer {
    chars_per_token: usize,
}

impl ApproxTokenizer {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for ApproxTokenizer {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl Tokenizer for ApproxTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}
