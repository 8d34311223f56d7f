//! # grokctx core
//!
//! The algorithms behind grokctx: token-budgeted chunking, a
//! content-addressed chunk store, similarity-ranked context retrieval,
//! token-precise chat-history summarization, and store schema migration.
//!
//! The crate holds no process-wide state. A [`tokenizer::Tokenizer`] and an
//! [`embedding::Provider`] are injected by the caller; everything else is
//! plain data owned by a [`store::ChunkStore`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Documents, chunks, chat messages |
//! | [`tokenizer`] | Token counting abstraction |
//! | [`chunk`] | Delimiter and token-budget splitting |
//! | [`store`] | Content-addressed chunk store with GC |
//! | [`search`] | Ranking and budget-constrained packing |
//! | [`chat`] | Chat text format and history summarization |
//! | [`migrate`] | Store schema version upgrades |
//! | [`embedding`] | Provider trait and vector math |
//! | [`error`] | Typed error taxonomy |

pub mod chat;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod migrate;
pub mod models;
pub mod search;
pub mod store;
pub mod tokenizer;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::StoreError;

/// Schema version written by this build of the store.
pub const STORE_VERSION: &str = "3.0.0";
