//! Deterministic stand-ins for tests.
//!
//! Compiled for this crate's unit tests and, through the `testing`
//! feature, for integration tests of dependent crates.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::Provider;
use crate::models::ChatMessage;
use crate::tokenizer::Tokenizer;

/// Counts whitespace-separated words.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Dimension of [`MockProvider`] embeddings.
pub const MOCK_DIMS: usize = 64;

type Completion = dyn Fn(&str, &[ChatMessage]) -> String + Send + Sync;

/// In-process provider.
///
/// Embeddings are bag-of-words vectors: each lowercase alphanumeric word is
/// hashed into one of [`MOCK_DIMS`] buckets, so texts that share words are
/// similar. The default completion returns the first half (by characters)
/// of the last message, which makes summarization shrink every round.
pub struct MockProvider {
    completion: Box<Completion>,
    embed_calls: AtomicUsize,
    embedded: Mutex<Vec<String>>,
    completions: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_completion(|_, messages| {
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            let half = last.chars().count() / 2;
            last.chars().take(half).collect()
        })
    }

    pub fn with_completion<F>(f: F) -> Self
    where
        F: Fn(&str, &[ChatMessage]) -> String + Send + Sync + 'static,
    {
        Self {
            completion: Box::new(f),
            embed_calls: AtomicUsize::new(0),
            embedded: Mutex::new(Vec::new()),
            completions: Mutex::new(Vec::new()),
        }
    }

    /// Number of `embed` calls so far.
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Every text passed to `embed`, in call order.
    pub fn embedded_texts(&self) -> Vec<String> {
        self.embedded.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Every `(sysmsg, messages)` passed to `complete`, in call order.
    pub fn completions(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.completions.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn vector(text: &str) -> Option<Vec<f32>> {
        if text.is_empty() {
            return None;
        }
        let mut v = vec![0.0f32; MOCK_DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            v[bucket(&word.to_lowercase())] += 1.0;
        }
        Some(v)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// FNV-1a, folded into a bucket index.
fn bucket(word: &str) -> usize {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x100000001b3);
    }
    (h % MOCK_DIMS as u64) as usize
}

#[async_trait]
impl Provider for MockProvider {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.embedded.lock() {
            seen.extend(texts.iter().cloned());
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    async fn complete(&self, sysmsg: &str, messages: &[ChatMessage]) -> Result<String> {
        if let Ok(mut seen) = self.completions.lock() {
            seen.push((sysmsg.to_string(), messages.to_vec()));
        }
        Ok((self.completion)(sysmsg, messages))
    }
}
