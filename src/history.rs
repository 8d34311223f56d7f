//! Chat history files.
//!
//! A chat file is one JSON header line followed by the transcript:
//!
//! ```text
//! {"Sysmsg":"You are a helpful assistant.","Version":"3.0.0"}
//! USER:
//! What does the store lock protect?
//!
//! AI:
//! Cross-process access to the store file.
//!
//! ```
//!
//! The transcript is plain text so that the file can itself be added to
//! the store and retrieved from like any other document.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use grokctx_core::chat::{self, SummaryMode, Summarizer};
use grokctx_core::chunk::header_text;
use grokctx_core::embedding::Provider;
use grokctx_core::models::ChatMessage;
use grokctx_core::search::{self, ContextOptions};
use grokctx_core::store::ChunkStore;
use grokctx_core::tokenizer::Tokenizer;
use grokctx_core::STORE_VERSION;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::session::save_atomic;

/// How much context a chat turn sends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ContextLevel {
    /// The prompt alone.
    None,
    /// The chat history and the prompt.
    Recent,
    /// Retrieval from the chat file itself, the history, and the prompt.
    #[default]
    Chat,
    /// Retrieval from the whole store, the history, and the prompt.
    All,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Header {
    #[serde(default)]
    sysmsg: String,
    #[serde(default)]
    version: String,
}

/// A conversation persisted in a chat file.
#[derive(Debug)]
pub struct ChatHistory {
    pub sysmsg: String,
    path: PathBuf,
    messages: Vec<ChatMessage>,
}

impl ChatHistory {
    /// Open `path`, or start an empty history if it does not exist.
    ///
    /// `sysmsg`, when given, replaces the stored system message.
    pub fn open(path: &Path, sysmsg: Option<&str>, default_sysmsg: &str) -> Result<Self> {
        let mut history = if path.exists() {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read chat file {}", path.display()))?;
            let (first, rest) = text.split_once('\n').unwrap_or((text.as_str(), ""));
            let header: Header = serde_json::from_str(first)
                .with_context(|| format!("invalid chat file header in {}", path.display()))?;
            debug!(chat = %path.display(), version = %header.version, "opened chat history");
            Self {
                sysmsg: header.sysmsg,
                path: path.to_path_buf(),
                messages: chat::parse(rest),
            }
        } else {
            Self {
                sysmsg: String::new(),
                path: path.to_path_buf(),
                messages: Vec::new(),
            }
        };
        if let Some(s) = sysmsg {
            history.sysmsg = s.to_string();
        }
        if history.sysmsg.is_empty() {
            history.sysmsg = default_sysmsg.to_string();
        }
        Ok(history)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Write the history. An existing file is first copied to a
    /// timestamped sibling, whose path is returned.
    pub fn save(&self) -> Result<Option<PathBuf>> {
        let backup = if self.path.exists() {
            let dest = timestamped(&self.path);
            fs::copy(&self.path, &dest)
                .with_context(|| format!("failed to back up chat file to {}", dest.display()))?;
            Some(dest)
        } else {
            None
        };

        let header = Header {
            sysmsg: self.sysmsg.clone(),
            version: STORE_VERSION.to_string(),
        };
        let mut out = serde_json::to_string(&header)?;
        out.push('\n');
        out.push_str(&chat::render(&self.messages));
        save_atomic(&self.path, out.as_bytes())?;
        Ok(backup)
    }
}

/// `dir/name-YYYYmmdd-HHMMSS.ext`
fn timestamped(path: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, stamp, ext.to_string_lossy()),
        None => format!("{}-{}", stem, stamp),
    };
    path.with_file_name(name)
}

/// Settings for one chat turn.
#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub context_level: ContextLevel,
    /// Budget for retrieved context and summarized history. `0` means half
    /// the context window.
    pub token_limit: usize,
    pub context_window: usize,
    pub summary_mode: SummaryMode,
}

impl ChatOptions {
    fn budget(&self) -> usize {
        if self.token_limit > 0 {
            self.token_limit
        } else {
            self.context_window / 2
        }
    }
}

/// Token counts of a chat turn.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub response: String,
    /// Tokens before summarization.
    pub peak_tokens: usize,
    /// Tokens sent to the provider.
    pub final_tokens: usize,
}

/// Append each file to `prompt` as a `from <path>:` block.
pub fn include_files(prompt: &str, files: &[PathBuf]) -> Result<String> {
    let mut out = prompt.to_string();
    for file in files {
        let text = fs::read_to_string(file)
            .with_context(|| format!("could not read input file {}", file.display()))?;
        out.push_str("\n\n");
        out.push_str(&header_text(&file.display().to_string(), &text));
    }
    Ok(out)
}

/// Add the chat file to the store so later turns can retrieve from it.
///
/// A chat file outside the store root is skipped with a warning.
pub async fn add_to_store(history: &ChatHistory, store: &mut ChunkStore, provider: &dyn Provider) -> Result<bool> {
    if store.rel_path(history.path()).is_err() {
        warn!(chat = %history.path().display(), "chat file is outside the store, not adding");
        return Ok(false);
    }
    store.add_document(provider, history.path()).await
}

/// Send `prompt` with as much history and context as the options allow,
/// and append the prompt and reply to `history`.
///
/// `input_files` are appended to the prompt before summarization. The
/// history records the prompt without them.
pub async fn continue_chat(
    history: &mut ChatHistory,
    store: &mut ChunkStore,
    provider: &dyn Provider,
    tokenizer: &dyn Tokenizer,
    prompt: &str,
    input_files: &[PathBuf],
    opts: ChatOptions,
) -> Result<ChatReply> {
    let budget = opts.budget();
    let request = include_files(prompt, input_files)?;
    let mut messages = Vec::new();

    let files = match opts.context_level {
        ContextLevel::Chat => Some(store.rel_path(history.path()).map(|p| vec![p]).unwrap_or_default()),
        _ => None,
    };
    if opts.context_level >= ContextLevel::Chat {
        let ctx_opts = ContextOptions {
            files,
            ..ContextOptions::default()
        };
        let context = search::context(store, provider, prompt, budget, &ctx_opts).await?;
        debug!(bytes = context.len(), "retrieved chat context");
        if !context.is_empty() {
            messages.push(ChatMessage::user(context));
            messages.push(ChatMessage::ai("I understand the context."));
        }
    }
    if opts.context_level >= ContextLevel::Recent {
        messages.extend(history.messages().iter().cloned());
    }
    messages.push(ChatMessage::user(request.as_str()));

    // low context levels never ask the provider to summarize
    let mode = if opts.context_level <= ContextLevel::Recent {
        SummaryMode::Truncate
    } else {
        opts.summary_mode
    };
    let summarizer = Summarizer::new(tokenizer, provider, mode);
    let peak_tokens = summarizer.count(&messages);
    let messages = summarizer.summarize(&request, messages, budget).await?;
    let final_tokens = summarizer.count(&messages);

    info!(tokens = final_tokens, model = provider.model_name(), "sending chat");
    let response = provider.complete(&history.sysmsg, &messages).await?;

    history.push(ChatMessage::user(prompt));
    history.push(ChatMessage::ai(response.clone()));

    Ok(ChatReply {
        response,
        peak_tokens,
        final_tokens,
    })
}
