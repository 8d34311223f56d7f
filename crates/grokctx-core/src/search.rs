//! Similarity ranking and token-budgeted context packing.
//!
//! Retrieval is a linear scan: every chunk's stored embedding is compared
//! to the query embedding with [`cosine_similarity`], and the results are
//! stably sorted by descending score so ties keep store order.
//!
//! # Packing
//!
//! [`pack`] is greedy first-fit in two phases:
//!
//! | Phase | Unit | Stops |
//! |-------|------|-------|
//! | 1 | stored chunks, by rank | after the chunk that pushes the total past the limit |
//! | 2 | phase-1 chunks re-split to the limit | before the piece that would exceed the limit |
//!
//! Phase 1 deliberately overshoots by one chunk. Phase 2 then splits that
//! candidate so the part of it that fits can still be used. The selection
//! is not globally optimal and callers may depend on its exact order.

use anyhow::Result;
use tracing::debug;

use crate::embedding::{cosine_similarity, embed_one, Provider};
use crate::models::Chunk;
use crate::store::{ChunkStore, TextOptions};

/// A chunk index into [`ChunkStore::chunks`] with its similarity score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredChunk {
    pub index: usize,
    pub score: f32,
}

/// Rendering options for [`context`].
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub with_headers: bool,
    pub with_line_numbers: bool,
    /// Restrict retrieval to these document keys. `None` searches all.
    pub files: Option<Vec<String>>,
}

/// Score every chunk against `query` and sort by descending similarity.
///
/// With `files` set, only chunks of those documents are considered. Chunks
/// without an embedding score `0.0`.
pub fn rank(store: &ChunkStore, query: &[f32], files: Option<&[String]>) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = store
        .chunks()
        .iter()
        .enumerate()
        .filter(|(_, c)| files.map_or(true, |f| f.iter().any(|name| *name == c.document)))
        .map(|(index, c)| ScoredChunk {
            index,
            score: c
                .embedding
                .as_deref()
                .map(|e| cosine_similarity(query, e))
                .unwrap_or(0.0),
        })
        .collect();
    // sort_by is stable
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

/// Select ranked chunks within `token_limit` tokens.
///
/// Returned chunks carry their text and may be sub-chunks of stored
/// chunks. A zero limit selects nothing.
pub fn pack(store: &mut ChunkStore, ranked: &[ScoredChunk], token_limit: usize) -> Result<Vec<Chunk>> {
    if token_limit == 0 {
        return Ok(Vec::new());
    }

    let mut total = 0;
    let mut candidates = Vec::new();
    for scored in ranked {
        let Some(count) = store.token_count(scored.index)? else {
            continue;
        };
        total += count;
        candidates.push(scored.index);
        if total > token_limit {
            break;
        }
    }

    let mut selected = Vec::new();
    total = 0;
    'outer: for index in candidates {
        let mut chunk = store.chunks()[index].clone();
        let text = store.chunk_text(&chunk, TextOptions::default())?;
        if text.is_empty() {
            continue;
        }
        chunk.text = Some(text);
        chunk.token_count = None;
        for mut piece in store.chunker().split_to_budget(chunk, token_limit) {
            total += store.chunker().token_count(&mut piece);
            if total > token_limit {
                break 'outer;
            }
            selected.push(piece);
        }
    }

    debug!(
        ranked = ranked.len(),
        selected = selected.len(),
        tokens = total.min(token_limit),
        "packed context"
    );
    Ok(selected)
}

/// Embed `query` and return the packed chunks most similar to it.
///
/// A query the provider cannot embed (empty text) retrieves nothing.
pub async fn retrieve(
    store: &mut ChunkStore,
    provider: &dyn Provider,
    query: &str,
    token_limit: usize,
    files: Option<&[String]>,
) -> Result<Vec<Chunk>> {
    if token_limit == 0 {
        return Ok(Vec::new());
    }
    let Some(embedding) = embed_one(provider, query).await? else {
        return Ok(Vec::new());
    };
    let ranked = rank(store, &embedding, files);
    pack(store, &ranked, token_limit)
}

/// Retrieve and concatenate the rendered text of the best-matching chunks.
pub async fn context(
    store: &mut ChunkStore,
    provider: &dyn Provider,
    query: &str,
    token_limit: usize,
    opts: &ContextOptions,
) -> Result<String> {
    let chunks = retrieve(store, provider, query, token_limit, opts.files.as_deref()).await?;
    let text_opts = TextOptions {
        with_header: opts.with_headers,
        with_line_numbers: opts.with_line_numbers,
    };
    let mut out = String::new();
    for chunk in &chunks {
        out.push_str(&store.chunk_text(chunk, text_opts)?);
    }
    debug!(chunks = chunks.len(), "using chunks as context");
    Ok(out)
}
