//! Configuration parsing and validation.
//!
//! grokctx is configured via a TOML file. Every section is optional and
//! falls back to defaults, so a missing file is equivalent to
//! [`Config::minimal`].
//!
//! # Example Configuration
//!
//! ```toml
//! [store]
//! name = ".grok"
//!
//! [chunking]
//! embedding_token_limit = 1000
//!
//! [tokenizer]
//! kind = "approx"          # or "huggingface" with the hf-tokenizer feature
//! chars_per_token = 4
//!
//! [provider]
//! kind = "openai"          # or "disabled"
//! base_url = "https://api.openai.com/v1"
//! embedding_model = "text-embedding-3-small"
//! chat_model = "gpt-4o"
//! context_window = 128000
//!
//! [chat]
//! context_level = "chat"   # none | recent | chat | all
//! summary_mode = "compress"
//!
//! [logging]
//! level = "warn"
//! ```
//!
//! The OpenAI API key is read from `OPENAI_API_KEY`, never from the file.

use anyhow::{Context, Result};
use grokctx_core::chat::SummaryMode;
use grokctx_core::chunk::DEFAULT_DELIMITER;
use grokctx_core::tokenizer::DEFAULT_CHARS_PER_TOKEN;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::history::ContextLevel;

/// File looked up in the current directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "grokctx.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub tokenizer: TokenizerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Built-in defaults, used when no configuration file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Store file name, created in the directory passed to `grok init`.
    #[serde(default = "default_store_name")]
    pub name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: default_store_name(),
        }
    }
}

fn default_store_name() -> String {
    ".grok".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Largest chunk, in tokens, sent to the embedding model.
    #[serde(default = "default_embedding_token_limit")]
    pub embedding_token_limit: usize,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            embedding_token_limit: default_embedding_token_limit(),
            delimiter: default_delimiter(),
        }
    }
}

fn default_embedding_token_limit() -> usize {
    1000
}
fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenizerConfig {
    /// `approx` (characters per token) or `huggingface`.
    #[serde(default = "default_tokenizer_kind")]
    pub kind: String,
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
    /// `tokenizer.json` for the `huggingface` kind.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            kind: default_tokenizer_kind(),
            chars_per_token: default_chars_per_token(),
            path: None,
        }
    }
}

fn default_tokenizer_kind() -> String {
    "approx".to_string()
}
fn default_chars_per_token() -> usize {
    DEFAULT_CHARS_PER_TOKEN
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// `openai` or `disabled`.
    #[serde(default = "default_provider_kind")]
    pub kind: String,
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Token limit of the chat model. Retrieval and summarization budgets
    /// are derived from it.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            base_url: default_base_url(),
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            context_window: default_context_window(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn is_enabled(&self) -> bool {
        self.kind != "disabled"
    }
}

fn default_provider_kind() -> String {
    "openai".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o".to_string()
}
fn default_context_window() -> usize {
    128_000
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// System message for new chat files.
    #[serde(default = "default_sysmsg")]
    pub sysmsg: String,
    #[serde(default)]
    pub context_level: ContextLevel,
    /// Token budget for the summarized history. `0` means half the
    /// context window.
    #[serde(default)]
    pub prompt_token_limit: usize,
    #[serde(default)]
    pub summary_mode: SummaryMode,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            sysmsg: default_sysmsg(),
            context_level: ContextLevel::default(),
            prompt_token_limit: 0,
            summary_mode: SummaryMode::default(),
        }
    }
}

fn default_sysmsg() -> String {
    "You are a helpful assistant.".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Load and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if given, else [`DEFAULT_CONFIG_FILE`] from the current
/// directory if it exists, else [`Config::minimal`].
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.exists() {
                load_config(default)
            } else {
                Ok(Config::minimal())
            }
        }
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.store.name.is_empty() {
        anyhow::bail!("store.name must not be empty");
    }

    if config.chunking.embedding_token_limit == 0 {
        anyhow::bail!("chunking.embedding_token_limit must be > 0");
    }
    if config.chunking.delimiter.is_empty() {
        anyhow::bail!("chunking.delimiter must not be empty");
    }

    match config.tokenizer.kind.as_str() {
        "approx" => {
            if config.tokenizer.chars_per_token == 0 {
                anyhow::bail!("tokenizer.chars_per_token must be > 0");
            }
        }
        "huggingface" => {
            if config.tokenizer.path.is_none() {
                anyhow::bail!("tokenizer.path must be specified when kind is 'huggingface'");
            }
        }
        other => anyhow::bail!(
            "Unknown tokenizer kind: '{}'. Must be approx or huggingface.",
            other
        ),
    }

    match config.provider.kind.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.provider.is_enabled() {
        if config.provider.batch_size == 0 {
            anyhow::bail!("provider.batch_size must be > 0");
        }
        if config.provider.context_window == 0 {
            anyhow::bail!("provider.context_window must be > 0");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("grokctx.toml");
        fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let (_tmp, path) = write_config("");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.store.name, ".grok");
        assert_eq!(cfg.chunking.embedding_token_limit, 1000);
        assert_eq!(cfg.chunking.delimiter, "\n\n");
        assert_eq!(cfg.provider.kind, "openai");
        assert_eq!(cfg.chat.context_level, ContextLevel::Chat);
        assert_eq!(cfg.chat.summary_mode, SummaryMode::Compress);
        assert_eq!(cfg.logging.level, "warn");
    }

    #[test]
    fn test_sections_parse() {
        let (_tmp, path) = write_config(
            r#"
[chunking]
embedding_token_limit = 200

[provider]
kind = "disabled"
context_window = 8000

[chat]
context_level = "all"
summary_mode = "truncate"
prompt_token_limit = 3000
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.chunking.embedding_token_limit, 200);
        assert!(!cfg.provider.is_enabled());
        assert_eq!(cfg.provider.context_window, 8000);
        assert_eq!(cfg.chat.context_level, ContextLevel::All);
        assert_eq!(cfg.chat.summary_mode, SummaryMode::Truncate);
        assert_eq!(cfg.chat.prompt_token_limit, 3000);
    }

    #[test]
    fn test_zero_token_limit_rejected() {
        let (_tmp, path) = write_config("[chunking]\nembedding_token_limit = 0\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("embedding_token_limit"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let (_tmp, path) = write_config("[provider]\nkind = \"carrier-pigeon\"\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn test_huggingface_requires_path() {
        let (_tmp, path) = write_config("[tokenizer]\nkind = \"huggingface\"\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("tokenizer.path"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(load_or_default(Some(&tmp.path().join("nope.toml"))).is_err());
    }
}
