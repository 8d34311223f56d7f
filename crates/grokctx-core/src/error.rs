//! Typed errors raised by the core.
//!
//! Functions in this crate return `anyhow::Result`; the variants below are
//! the conditions a caller may want to match on, recoverable through
//! `anyhow::Error::downcast_ref::<StoreError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The persisted store was written by a newer build. There is no
    /// downgrade path.
    #[error("store is version {store}, but this build understands up to {code}; upgrade grokctx")]
    StoreNewerThanCode { store: String, code: String },

    /// A historical schema version has no registered transition.
    #[error("no migration registered from store version {version}")]
    UnknownMigrationStep { version: String },

    #[error("invalid schema version {0:?}")]
    InvalidVersion(String),

    #[error("malformed store: {0}")]
    MalformedStore(#[from] serde_json::Error),

    #[error("document {path} is outside the store root {root}")]
    DocumentOutsideRoot { path: PathBuf, root: PathBuf },

    /// The final prompt alone exceeds the summarization budget.
    #[error("prompt is {prompt_tokens} tokens, which exceeds the budget of {budget}")]
    PromptTooLarge { prompt_tokens: usize, budget: usize },

    /// A compression round did not reduce the history's token count.
    #[error("summarization stalled: {before} tokens before compression, {after} after")]
    SummarizationStalled { before: usize, after: usize },
}
