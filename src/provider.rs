//! Hosted model providers.
//!
//! Implements [`Provider`] for:
//! - **[`DisabledProvider`]**: returns errors; used when `provider.kind = "disabled"`.
//! - **[`OpenAIProvider`]**: an OpenAI-compatible HTTP API (`/embeddings`
//!   and `/chat/completions`) with batching, retry, and backoff.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Use [`create_provider`] to build the configured provider.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use grokctx_core::embedding::Provider;
use grokctx_core::models::{ChatMessage, Role};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ProviderConfig;

/// Build the provider named by `config.kind`.
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn Provider>> {
    match config.kind.as_str() {
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "disabled" => Ok(Box::new(DisabledProvider)),
        other => bail!("Unknown provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// A provider that always returns errors.
pub struct DisabledProvider;

#[async_trait]
impl Provider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        bail!("Provider is disabled; set provider.kind = \"openai\" to embed documents")
    }

    async fn complete(&self, _sysmsg: &str, _messages: &[ChatMessage]) -> Result<String> {
        bail!("Provider is disabled; set provider.kind = \"openai\" to run completions")
    }
}

// ============ OpenAI Provider ============

/// Provider for the OpenAI API or any server exposing the same endpoints.
///
/// The API key is read from `OPENAI_API_KEY` when a request is made, so
/// commands that never reach the provider work without it.
pub struct OpenAIProvider {
    client: reqwest::Client,
    base_url: String,
    embedding_model: String,
    chat_model: String,
    batch_size: usize,
    max_retries: u32,
}

impl OpenAIProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }

    /// POST `body` to `endpoint` with retry/backoff.
    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value> {
        let api_key =
            std::env::var("OPENAI_API_KEY").map_err(|_| anyhow!("OPENAI_API_KEY not set"))?;
        let url = format!("{}/{}", self.base_url, endpoint);

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(endpoint, attempt, delay_secs = delay.as_secs(), "retrying provider request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429): fail
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Provider request failed after retries")))
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.chat_model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        // empty inputs are rejected by the API; they map to None
        let nonempty: Vec<usize> = (0..texts.len()).filter(|&i| !texts[i].is_empty()).collect();

        for batch in nonempty.chunks(self.batch_size) {
            let input: Vec<&str> = batch.iter().map(|&i| texts[i].as_str()).collect();
            debug!(count = input.len(), model = %self.embedding_model, "embedding batch");
            let body = json!({
                "model": self.embedding_model,
                "input": input,
            });
            let json = self.post("embeddings", &body).await?;
            let vectors = parse_embedding_response(&json)?;
            if vectors.len() != batch.len() {
                bail!(
                    "Invalid OpenAI response: {} embeddings for {} inputs",
                    vectors.len(),
                    batch.len()
                );
            }
            for (&i, v) in batch.iter().zip(vectors) {
                out[i] = Some(v);
            }
        }
        Ok(out)
    }

    async fn complete(&self, sysmsg: &str, messages: &[ChatMessage]) -> Result<String> {
        let body = json!({
            "model": self.chat_model,
            "messages": chat_messages(sysmsg, messages),
        });
        debug!(messages = messages.len(), model = %self.chat_model, "requesting completion");
        let json = self.post("chat/completions", &body).await?;
        parse_completion_response(&json)
    }
}

fn chat_messages(sysmsg: &str, messages: &[ChatMessage]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if !sysmsg.is_empty() {
        out.push(json!({ "role": "system", "content": sysmsg }));
    }
    for msg in messages {
        let role = match msg.role {
            Role::User => "user",
            Role::Ai => "assistant",
        };
        out.push(json!({ "role": role, "content": msg.content }));
    }
    out
}

/// Extract `data[].embedding` arrays, ordered by `data[].index`.
fn parse_embedding_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }

    // Sort by index to ensure order matches input
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_completion_response(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}
