//! Chat transcript format and token-budgeted history summarization.
//!
//! # Format
//!
//! A transcript is a sequence of blocks:
//!
//! ```text
//! USER:
//! How do I rotate the logs?
//!
//! AI:
//! Send SIGHUP to the daemon.
//!
//! ```
//!
//! A role marker is a line consisting of a role token and a colon. Tokens
//! are normalized by [`Role::from_token`]: `USER` is the user, anything
//! else is the AI. Text before the first marker belongs to the user.
//!
//! # Summarization
//!
//! [`Summarizer::summarize`] shrinks a conversation until it fits a token
//! budget. Each round splits the history before the final prompt at the
//! first message that would cross half the total, cuts that message in two
//! with [`split_at`], and replaces everything before the cut with a single
//! user message holding a provider-written summary in transcript form (or
//! drops it, in [`SummaryMode::Truncate`]). The final message is never
//! touched. Halving the older span every round keeps the
//! number of rounds logarithmic in how far the conversation overshoots.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chunk::snap_to_char_boundary;
use crate::embedding::Provider;
use crate::error::StoreError;
use crate::models::{ChatMessage, Role};
use crate::tokenizer::Tokenizer;

/// System message for the one-sentence topic of the triggering prompt.
pub const SYSMSG_TOPIC: &str = "Summarize the topic in one sentence.";

/// System message for compressing a span of history about `topic`.
pub fn summarize_sysmsg(topic: &str) -> String {
    format!(
        "You are an editor. Rewrite the chat history to make it about half as long, \
         focusing on the following topic. Your answer must be in the same chat format. \
         Please include the AI: and USER: headers in your response.\n\nTopic:\n{}\n",
        topic
    )
}

/// Render messages as transcript blocks. Messages with blank content are
/// skipped.
pub fn render(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for msg in messages {
        if msg.content.trim().is_empty() {
            continue;
        }
        out.push_str(&format!("{}:\n{}\n\n", msg.role, msg.content));
    }
    out
}

/// Parse transcript text into messages.
pub fn parse(text: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    let mut current: Option<(Role, Vec<&str>)> = None;

    for line in text.split('\n') {
        if let Some((role, inline)) = role_marker(line) {
            if let Some((role, lines)) = current.take() {
                messages.push(finish(role, &lines));
            }
            let mut lines = Vec::new();
            if !inline.is_empty() {
                lines.push(inline);
            }
            current = Some((role, lines));
            continue;
        }
        current
            .get_or_insert_with(|| (Role::User, Vec::new()))
            .1
            .push(line);
    }
    if let Some((role, lines)) = current {
        messages.push(finish(role, &lines));
    }
    messages
}

fn finish(role: Role, lines: &[&str]) -> ChatMessage {
    ChatMessage::new(role, lines.join("\n").trim_end_matches('\n'))
}

fn role_marker(line: &str) -> Option<(Role, &str)> {
    let (token, rest) = line.split_once(':')?;
    let known = matches!(
        token.to_ascii_lowercase().as_str(),
        "user" | "ai" | "assistant"
    );
    let shouting = !token.is_empty() && token.bytes().all(|b| b.is_ascii_uppercase());
    if known || shouting {
        Some((Role::from_token(token), rest.trim()))
    } else {
        None
    }
}

/// Cut `text` so that the left part has about `target` tokens.
///
/// Binary search over byte positions starting at the midpoint, halving the
/// step each time. Best effort: the result is the last cut once the step
/// reaches zero, or the first exact hit.
pub fn split_at(tokenizer: &dyn Tokenizer, text: &str, target: usize) -> (String, String) {
    let mut middle = snap_to_char_boundary(text, text.len() / 2);
    let mut step = text.len() / 4;
    loop {
        let count = tokenizer.count_tokens(&text[..middle]);
        if step == 0 || count == target {
            break;
        }
        if count > target {
            middle = middle.saturating_sub(step);
        } else {
            middle = (middle + step).min(text.len());
        }
        middle = snap_to_char_boundary(text, middle);
        step /= 2;
    }
    (text[..middle].to_string(), text[middle..].to_string())
}

/// How a summarizer disposes of the older half of a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    /// Ask the provider to rewrite it at about half the length.
    #[default]
    Compress,
    /// Drop it.
    Truncate,
}

/// Shrinks conversations to a token budget.
pub struct Summarizer<'a> {
    tokenizer: &'a dyn Tokenizer,
    provider: &'a dyn Provider,
    mode: SummaryMode,
}

impl<'a> Summarizer<'a> {
    pub fn new(tokenizer: &'a dyn Tokenizer, provider: &'a dyn Provider, mode: SummaryMode) -> Self {
        Self {
            tokenizer,
            provider,
            mode,
        }
    }

    /// Token count of the rendered transcript.
    pub fn count(&self, messages: &[ChatMessage]) -> usize {
        self.tokenizer.count_tokens(&render(messages))
    }

    pub fn fits(&self, messages: &[ChatMessage], budget: usize) -> bool {
        self.count(messages) <= budget
    }

    /// Summarize `messages` until they fit `budget`.
    ///
    /// The conversation must end with `prompt`; if it does not, `prompt` is
    /// appended as a user message. That final message is returned
    /// byte-identical. Fails with [`StoreError::PromptTooLarge`] if the
    /// prompt alone cannot fit, and with
    /// [`StoreError::SummarizationStalled`] if a round does not shrink the
    /// conversation.
    pub async fn summarize(
        &self,
        prompt: &str,
        mut messages: Vec<ChatMessage>,
        budget: usize,
    ) -> Result<Vec<ChatMessage>> {
        if messages.last().map_or(true, |m| m.content != prompt) {
            messages.push(ChatMessage::user(prompt));
        }

        let mut total = self.count(&messages);
        if total <= budget {
            return Ok(messages);
        }

        let prompt_tokens = self.count(&messages[messages.len() - 1..]);
        if prompt_tokens > budget {
            return Err(StoreError::PromptTooLarge {
                prompt_tokens,
                budget,
            }
            .into());
        }

        info!(tokens = total, budget, mode = ?self.mode, "summarizing chat history");
        let mut topic: Option<String> = None;
        let mut rounds = 0usize;

        while total > budget {
            rounds += 1;
            let (first, second) = self.split_history(messages, total);

            let mut next = match self.mode {
                SummaryMode::Truncate => Vec::new(),
                SummaryMode::Compress => {
                    let topic = match &topic {
                        Some(t) => t.clone(),
                        None => {
                            let t = self
                                .provider
                                .complete(SYSMSG_TOPIC, &[ChatMessage::user(prompt)])
                                .await?;
                            topic = Some(t.clone());
                            t
                        }
                    };
                    let response = self
                        .provider
                        .complete(
                            &summarize_sysmsg(&topic),
                            &[ChatMessage::user(render(&first))],
                        )
                        .await?;
                    vec![ChatMessage::user(response)]
                }
            };
            next.extend(second);

            let after = self.count(&next);
            debug!(round = rounds, before = total, after, "summarization round");
            if after >= total {
                return Err(StoreError::SummarizationStalled {
                    before: total,
                    after,
                }
                .into());
            }
            messages = next;
            total = after;
        }

        info!(tokens = total, rounds, "chat history summarized");
        Ok(messages)
    }

    /// Split into the span to summarize and the span to keep verbatim.
    ///
    /// The split point is the first message before the final prompt whose
    /// content would push the running count past `total / 2`. That message
    /// is cut in two with [`split_at`]. If no message crosses the target,
    /// everything before the prompt is summarized.
    ///
    /// The summarized span always covers half the conversation, so each
    /// round shrinks the total by a constant factor and the number of
    /// rounds is logarithmic in `total / budget`.
    fn split_history(
        &self,
        mut messages: Vec<ChatMessage>,
        total: usize,
    ) -> (Vec<ChatMessage>, Vec<ChatMessage>) {
        let last = messages.len() - 1;
        let target = total / 2;

        let mut running = 0;
        let mut crossing = None;
        for (i, msg) in messages[..last].iter().enumerate() {
            let count = self.tokenizer.count_tokens(&msg.content);
            if running + count > target {
                crossing = Some(i);
                break;
            }
            running += count;
        }

        let Some(i) = crossing else {
            let second = messages.split_off(last);
            return (messages, second);
        };

        let mut second = messages.split_off(i + 1);
        let remaining = target - running;
        if remaining > 0 {
            let (head, tail) = split_at(self.tokenizer, &messages[i].content, remaining);
            if !head.is_empty() && !tail.is_empty() {
                let role = messages[i].role;
                messages[i] = ChatMessage::new(role, head);
                second.insert(0, ChatMessage::new(role, tail));
            }
        }
        (messages, second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockProvider, WhitespaceTokenizer};

    fn words(n: usize, tag: &str) -> String {
        (0..n).map(|i| format!("{}{}", tag, i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_render_skips_blank_messages() {
        let msgs = vec![
            ChatMessage::user("hi"),
            ChatMessage::ai("   "),
            ChatMessage::ai("hello"),
        ];
        assert_eq!(render(&msgs), "USER:\nhi\n\nAI:\nhello\n\n");
    }

    #[test]
    fn test_parse_blocks() {
        let msgs = parse("USER:\nfirst line\nsecond line\n\nAI:\nreply\n\n");
        assert_eq!(
            msgs,
            vec![
                ChatMessage::user("first line\nsecond line"),
                ChatMessage::ai("reply"),
            ]
        );
        assert_eq!(parse(&render(&msgs)), msgs);
    }

    #[test]
    fn test_parse_preamble_is_user() {
        let msgs = parse("some preamble\nAI: inline reply\nmore\n");
        assert_eq!(
            msgs,
            vec![
                ChatMessage::user("some preamble"),
                ChatMessage::ai("inline reply\nmore"),
            ]
        );
    }

    #[test]
    fn test_parse_role_tokens() {
        let msgs = parse("user:\na\nassistant:\nb\nSYSTEM:\nc\nNote: not a marker\n");
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[1].role, Role::Ai);
        assert_eq!(msgs[2].role, Role::Ai);
        assert_eq!(msgs[2].content, "c\nNote: not a marker");
    }

    #[test]
    fn test_split_at_targets_token_count() {
        let text = words(16, "w");
        let (left, right) = split_at(&WhitespaceTokenizer, &text, 8);
        assert_eq!(format!("{}{}", left, right), text);
        let n = WhitespaceTokenizer.count_tokens(&left);
        assert!((6..=10).contains(&n), "left half has {} tokens", n);
    }

    #[test]
    fn test_split_at_multibyte() {
        let text = "é".repeat(33);
        let (left, right) = split_at(&WhitespaceTokenizer, &text, 1);
        assert_eq!(format!("{}{}", left, right), text);
    }

    #[tokio::test]
    async fn test_fitting_history_is_unchanged() {
        let provider = MockProvider::new();
        let s = Summarizer::new(&WhitespaceTokenizer, &provider, SummaryMode::Compress);
        let msgs = vec![ChatMessage::user("hello"), ChatMessage::ai("hi there")];
        let out = s.summarize("what now", msgs.clone(), 100).await.unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[..2], msgs[..]);
        assert_eq!(out[2], ChatMessage::user("what now"));
        assert!(provider.completions().is_empty());
    }

    #[tokio::test]
    async fn test_summarize_converges_and_preserves_prompt() {
        let provider = MockProvider::new();
        let s = Summarizer::new(&WhitespaceTokenizer, &provider, SummaryMode::Compress);
        let mut msgs = Vec::new();
        for i in 0..20 {
            msgs.push(ChatMessage::user(words(20, &format!("q{}x", i))));
            msgs.push(ChatMessage::ai(words(20, &format!("a{}x", i))));
        }
        let prompt = "how do the pieces fit together?".to_string();
        msgs.push(ChatMessage::user(prompt.clone()));
        let before = s.count(&msgs);
        assert!(before > 100);

        let out = s.summarize(&prompt, msgs, 100).await.unwrap();
        assert!(s.fits(&out, 100));
        assert_eq!(out.last().unwrap().content, prompt);
        assert_eq!(out.last().unwrap().role, Role::User);

        let calls = provider.completions();
        assert_eq!(calls[0].0, SYSMSG_TOPIC);
        assert_eq!(
            calls.iter().filter(|(sys, _)| sys == SYSMSG_TOPIC).count(),
            1
        );
        assert!(calls.len() < before);
    }

    #[tokio::test]
    async fn test_rounds_are_logarithmic_in_overshoot() {
        for (pairs, budget) in [(20, 100), (100, 100), (100, 400)] {
            let provider = MockProvider::new();
            let s = Summarizer::new(&WhitespaceTokenizer, &provider, SummaryMode::Compress);
            let mut msgs = Vec::new();
            for i in 0..pairs {
                msgs.push(ChatMessage::user(words(20, &format!("q{}x", i))));
                msgs.push(ChatMessage::ai(words(20, &format!("a{}x", i))));
            }
            let prompt = "what did we decide?";
            msgs.push(ChatMessage::user(prompt));
            let before = s.count(&msgs);

            let out = s.summarize(prompt, msgs, budget).await.unwrap();
            assert!(s.fits(&out, budget));

            // one completion names the topic, the rest are rounds
            let rounds = provider.completions().len() - 1;
            let ratio = before as f64 / budget as f64;
            let bound = (ratio.ln() / (4.0f64 / 3.0).ln()).ceil() as usize + 4;
            assert!(
                rounds <= bound,
                "{} tokens into {} took {} rounds, expected at most {}",
                before,
                budget,
                rounds,
                bound
            );
        }
    }

    #[tokio::test]
    async fn test_truncate_mode_makes_no_provider_calls() {
        let provider = MockProvider::new();
        let s = Summarizer::new(&WhitespaceTokenizer, &provider, SummaryMode::Truncate);
        let msgs: Vec<ChatMessage> = (0..10).map(|i| ChatMessage::ai(words(30, &format!("m{}x", i)))).collect();
        let out = s.summarize("final question", msgs, 50).await.unwrap();
        assert!(s.fits(&out, 50));
        assert_eq!(out.last().unwrap(), &ChatMessage::user("final question"));
        assert!(provider.completions().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_too_large() {
        let provider = MockProvider::new();
        let s = Summarizer::new(&WhitespaceTokenizer, &provider, SummaryMode::Compress);
        let prompt = words(50, "p");
        let err = s.summarize(&prompt, vec![], 10).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::PromptTooLarge { budget: 10, .. })
        ));
    }

    #[tokio::test]
    async fn test_non_shrinking_provider_is_reported() {
        // echoes the span it was asked to compress
        let provider =
            MockProvider::with_completion(|_, msgs| msgs.last().map(|m| m.content.clone()).unwrap_or_default());
        let s = Summarizer::new(&WhitespaceTokenizer, &provider, SummaryMode::Compress);
        let msgs: Vec<ChatMessage> = (0..6).map(|i| ChatMessage::user(words(20, &format!("m{}x", i)))).collect();
        let err = s.summarize("go", msgs, 30).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::SummarizationStalled { .. })
        ));
    }
}
