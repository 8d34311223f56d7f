//! # grokctx
//!
//! A retrieval-augmented context engine for chatting with a large language
//! model about a local collection of documents.
//!
//! Documents are split into token-bounded chunks, embedded, and kept in a
//! single JSON store file at the root of the project. Questions are
//! answered by ranking chunks against the question's embedding and packing
//! the best ones into the model's token budget. Long chat histories are
//! summarized until they fit.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌────────────┐
//! │  Documents  │──▶│ Chunk+Embed │──▶│ .grok JSON  │
//! │  (project)  │   │  (core)     │   │ (locked)    │
//! └─────────────┘   └─────────────┘   └─────┬──────┘
//!                                           │
//!                        ┌──────────────────┤
//!                        ▼                  ▼
//!                  ┌───────────┐      ┌───────────┐
//!                  │ rank+pack │      │ chat file │
//!                  │  (q/ctx)  │      │ summarize │
//!                  └───────────┘      └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! grok init                     # create .grok in the current directory
//! grok add README.md docs/*.md  # chunk and embed documents
//! grok q "how is the store locked?"
//! grok chat notes.chat -p "summarize the design"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`lock`] | Cross-process shared/exclusive store lock |
//! | [`session`] | Store lifecycle: lock, load, migrate, save |
//! | [`history`] | Chat files and chat turns |
//! | [`commands`] | Question answering, revision, similarity |
//! | [`provider`] | OpenAI-compatible HTTP provider |
//! | [`tokenizer`] | Tokenizer selection |

pub mod commands;
pub mod config;
pub mod history;
pub mod lock;
pub mod logging;
pub mod provider;
pub mod session;
pub mod tokenizer;
