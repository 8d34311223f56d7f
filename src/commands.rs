//! Retrieval-augmented operations behind the `grok` subcommands.
//!
//! Each function takes an open [`ChunkStore`] and a [`Provider`] and
//! returns the text to print; locking, refresh and save are handled by the
//! caller.

use anyhow::{bail, Result};
use grokctx_core::embedding::{cosine_similarity, embed_one, mean_vector, Provider};
use grokctx_core::models::ChatMessage;
use grokctx_core::search::{self, ContextOptions};
use grokctx_core::store::ChunkStore;
use grokctx_core::tokenizer::Tokenizer;
use tracing::debug;

pub const SYSMSG_CHAT: &str = "You are an expert knowledgable in the provided context.  I will provide you with context, then you will respond with an acknowledgement, then I will ask you a question about the context, then you will provide me with an answer.";

pub const SYSMSG_REVISE: &str = "You are an expert knowledgable in the provided context.  I will provide you with context, then you will respond with an acknowledgement, then I will provide you with a block of text.  You will revise the block of text based on the information in the context, maintaining the same style, vocabulary, and reading level.";

pub const SYSMSG_CONTINUE: &str = "You are an expert knowledgable in the provided context.  I will provide you with context, then you will respond with an acknowledgement, then I will provide you with a block of text.  You will continue the block of text based on the information in the context, maintaining the same style, vocabulary, and reading level.";

/// Options shared by the retrieval-augmented commands.
#[derive(Debug, Clone, Default)]
pub struct RagOptions {
    /// Tokens in the model's context window.
    pub context_window: usize,
    /// Ask the model without context first and keep its answer in the
    /// conversation.
    pub global: bool,
    pub context: ContextOptions,
}

/// Complete `question` with `context` inserted as a prior exchange.
pub async fn answer_with_rag(
    provider: &dyn Provider,
    sysmsg: &str,
    question: &str,
    context: &str,
    global: bool,
) -> Result<String> {
    let mut messages = Vec::new();
    if global {
        let first = provider
            .complete(sysmsg, &[ChatMessage::user(question)])
            .await?;
        messages.push(ChatMessage::user(question));
        messages.push(ChatMessage::ai(first));
    }
    if !context.is_empty() {
        messages.push(ChatMessage::user(format!("Context:\n\n{}", context)));
        messages.push(ChatMessage::ai("Great! I've read the context."));
    }
    messages.push(ChatMessage::user(question));
    provider.complete(sysmsg, &messages).await
}

/// Answer a question from the store. Context may use half the window,
/// less the question itself.
pub async fn answer(
    store: &mut ChunkStore,
    provider: &dyn Provider,
    question: &str,
    opts: &RagOptions,
) -> Result<String> {
    let question_tokens = store.chunker().tokenizer().count_tokens(question);
    let budget = (opts.context_window / 2).saturating_sub(question_tokens);
    let context = search::context(store, provider, question, budget, &opts.context).await?;
    debug!(budget, context_bytes = context.len(), "answering question");
    answer_with_rag(provider, SYSMSG_CHAT, question, &context, opts.global).await
}

/// Revise `input` using store context.
///
/// With `sysmsg_in`, the first paragraph of `input` is the system message
/// and is echoed ahead of the revised text.
pub async fn revise(
    store: &mut ChunkStore,
    provider: &dyn Provider,
    input: &str,
    sysmsg_in: bool,
    opts: &RagOptions,
) -> Result<String> {
    let input_tokens = store.chunker().tokenizer().count_tokens(input);
    let (sysmsg, text) = if sysmsg_in {
        match input.split_once("\n\n") {
            Some((first, rest)) => (first.to_string(), rest.to_string()),
            None => bail!("input must contain at least two paragraphs"),
        }
    } else {
        (SYSMSG_REVISE.to_string(), input.to_string())
    };

    let budget = (opts.context_window / 2).saturating_sub(input_tokens);
    let context = search::context(store, provider, &text, budget, &opts.context).await?;
    let resp = answer_with_rag(provider, &sysmsg, &text, &context, opts.global).await?;
    if sysmsg_in {
        Ok(format!("{}\n\n{}", sysmsg, resp))
    } else {
        Ok(resp)
    }
}

/// Continue `input` using store context. Context may use 40% of the
/// window, less the system message and input.
pub async fn continue_text(
    store: &mut ChunkStore,
    provider: &dyn Provider,
    input: &str,
    opts: &RagOptions,
) -> Result<String> {
    let tokenizer = store.chunker().tokenizer();
    let overhead = tokenizer.count_tokens(SYSMSG_CONTINUE) + tokenizer.count_tokens(input);
    let budget = (opts.context_window * 2 / 5).saturating_sub(overhead);
    let context = search::context(store, provider, input, budget, &opts.context).await?;
    answer_with_rag(provider, SYSMSG_CONTINUE, input, &context, opts.global).await
}

/// Send `input` under `sysmsg` with no retrieved context.
pub async fn msg(
    provider: &dyn Provider,
    tokenizer: &dyn Tokenizer,
    sysmsg: &str,
    input: &str,
    context_window: usize,
) -> Result<String> {
    let tokens = tokenizer.count_tokens(sysmsg) + tokenizer.count_tokens(input);
    if tokens > context_window {
        bail!("token count {} exceeds token limit {}", tokens, context_window);
    }
    answer_with_rag(provider, sysmsg, input, "", false).await
}

/// Embedding of `text` as pretty-printed JSON.
pub async fn embed_json(provider: &dyn Provider, text: &str) -> Result<String> {
    let Some(vector) = embed_one(provider, text).await? else {
        bail!("cannot embed empty text");
    };
    Ok(serde_json::to_string_pretty(&vector)?)
}

/// Cosine similarity of each of `texts` to `reference`.
///
/// Texts longer than the embedding limit are split, embedded piecewise and
/// averaged.
pub async fn similarity(
    store: &ChunkStore,
    provider: &dyn Provider,
    reference: &str,
    texts: &[String],
) -> Result<Vec<f32>> {
    let reference = text_vector(store, provider, reference).await?;
    let mut out = Vec::with_capacity(texts.len());
    for text in texts {
        let v = text_vector(store, provider, text).await?;
        out.push(cosine_similarity(&reference, &v));
    }
    Ok(out)
}

async fn text_vector(store: &ChunkStore, provider: &dyn Provider, text: &str) -> Result<Vec<f32>> {
    let pieces = store
        .chunker()
        .strings_from_text(text, store.embedding_token_limit());
    let vectors: Vec<Vec<f32>> = provider.embed(&pieces).await?.into_iter().flatten().collect();
    Ok(mean_vector(&vectors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use grokctx_core::chunk::Chunker;
    use grokctx_core::models::Role;
    use grokctx_core::testing::{MockProvider, WhitespaceTokenizer};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn rag(window: usize) -> RagOptions {
        RagOptions {
            context_window: window,
            ..RagOptions::default()
        }
    }

    async fn store_with(tmp: &TempDir, files: &[(&str, &str)], provider: &MockProvider) -> ChunkStore {
        let mut store = ChunkStore::new(tmp.path(), Chunker::new(Arc::new(WhitespaceTokenizer)), 100);
        for (name, body) in files {
            let path = tmp.path().join(name);
            fs::write(&path, body).unwrap();
            store.add_document(provider, &path).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_answer_with_rag_message_layout() {
        let provider = MockProvider::with_completion(|_, _| "r".to_string());
        answer_with_rag(&provider, "sys", "q", "ctx", true).await.unwrap();
        let calls = provider.completions();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, vec![ChatMessage::user("q")]);
        let sent = &calls[1].1;
        assert_eq!(
            sent,
            &vec![
                ChatMessage::user("q"),
                ChatMessage::ai("r"),
                ChatMessage::user("Context:\n\nctx"),
                ChatMessage::ai("Great! I've read the context."),
                ChatMessage::user("q"),
            ]
        );
    }

    #[tokio::test]
    async fn test_answer_uses_store_context() {
        let tmp = TempDir::new().unwrap();
        let provider = MockProvider::with_completion(|_, _| "blue".to_string());
        let mut store = store_with(
            &tmp,
            &[("sky.md", "the sky is blue"), ("grass.md", "the grass is green")],
            &provider,
        )
        .await;

        let resp = answer(&mut store, &provider, "what color is the sky", &rag(1000)).await.unwrap();
        assert_eq!(resp, "blue");
        let (sysmsg, sent) = provider.completions().pop().unwrap();
        assert_eq!(sysmsg, SYSMSG_CHAT);
        assert!(sent[0].content.starts_with("Context:\n\n"));
        assert!(sent[0].content.contains("sky is blue"));
        assert_eq!(sent.last().unwrap().content, "what color is the sky");
    }

    #[tokio::test]
    async fn test_answer_without_budget_has_no_context() {
        let tmp = TempDir::new().unwrap();
        let provider = MockProvider::with_completion(|_, _| "?".to_string());
        let mut store = store_with(&tmp, &[("a.md", "alpha beta")], &provider).await;
        answer(&mut store, &provider, "alpha", &rag(0)).await.unwrap();
        let (_, sent) = provider.completions().pop().unwrap();
        assert_eq!(sent, vec![ChatMessage::user("alpha")]);
    }

    #[tokio::test]
    async fn test_revise_with_sysmsg_in() {
        let tmp = TempDir::new().unwrap();
        let provider = MockProvider::with_completion(|_, _| "better text".to_string());
        let mut store = store_with(&tmp, &[], &provider).await;

        let out = revise(&mut store, &provider, "be terse\n\nsome text", true, &rag(1000))
            .await
            .unwrap();
        assert_eq!(out, "be terse\n\nbetter text");
        let (sysmsg, sent) = provider.completions().pop().unwrap();
        assert_eq!(sysmsg, "be terse");
        assert_eq!(sent.last().unwrap().content, "some text");

        let err = revise(&mut store, &provider, "one paragraph", true, &rag(1000)).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_continue_uses_continue_sysmsg() {
        let tmp = TempDir::new().unwrap();
        let provider = MockProvider::with_completion(|_, _| "and then".to_string());
        let mut store = store_with(&tmp, &[], &provider).await;
        let out = continue_text(&mut store, &provider, "once upon a time", &rag(1000)).await.unwrap();
        assert_eq!(out, "and then");
        assert_eq!(provider.completions()[0].0, SYSMSG_CONTINUE);
    }

    #[tokio::test]
    async fn test_msg_rejects_oversized_input() {
        let provider = MockProvider::with_completion(|_, _| "ok".to_string());
        let out = msg(&provider, &WhitespaceTokenizer, "sys", "hello there", 10).await.unwrap();
        assert_eq!(out, "ok");
        let (_, sent) = provider.completions().pop().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].role, Role::User);

        assert!(msg(&provider, &WhitespaceTokenizer, "sys", "a b c d e f", 5).await.is_err());
    }

    #[tokio::test]
    async fn test_embed_json() {
        let provider = MockProvider::new();
        let json = embed_json(&provider, "hello world").await.unwrap();
        let parsed: Vec<f32> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), grokctx_core::testing::MOCK_DIMS);
        assert!(json.contains('\n'));
        assert!(embed_json(&provider, "").await.is_err());
    }

    #[tokio::test]
    async fn test_similarity_orders_related_text_higher() {
        let tmp = TempDir::new().unwrap();
        let provider = MockProvider::new();
        let store = store_with(&tmp, &[], &provider).await;
        let scores = similarity(
            &store,
            &provider,
            "cats purr and cats sleep",
            &["cats sleep and purr".to_string(), "stock market report".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[0] > scores[1]);
        assert!(scores[0] > 0.9);
    }
}
