//! Completion/embedding provider trait and vector utilities.
//!
//! The core never talks to a network service directly. Callers inject a
//! [`Provider`]; concrete HTTP implementations live in the `grokctx` app
//! crate. Provider errors are passed through unmodified and the core does
//! not retry them.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::ChatMessage;

/// Hosted model access: text embeddings and chat completion.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the model identifier used for completions.
    fn model_name(&self) -> &str;

    /// Embed a batch of texts. Returns exactly one entry per input, in
    /// input order; empty inputs map to `None`.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>>;

    /// Complete a conversation under a system message.
    async fn complete(&self, sysmsg: &str, messages: &[ChatMessage]) -> Result<String>;
}

/// Embed a single text.
pub async fn embed_one(provider: &dyn Provider, text: &str) -> Result<Option<Vec<f32>>> {
    let mut out = provider.embed(&[text.to_string()]).await?;
    if out.len() != 1 {
        bail!("provider returned {} embeddings for 1 input", out.len());
    }
    Ok(out.remove(0))
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, and
/// zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Element-wise mean of a set of equal-length vectors.
///
/// Vectors whose length differs from the first one are ignored. Returns an
/// empty vector for empty input.
pub fn mean_vector(vectors: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let dims = first.len();
    let mut mean = vec![0.0f32; dims];
    let mut n = 0usize;
    for v in vectors.iter().filter(|v| v.len() == dims) {
        for (m, x) in mean.iter_mut().zip(v) {
            *m += x;
        }
        n += 1;
    }
    for m in &mut mean {
        *m /= n as f32;
    }
    mean
}
