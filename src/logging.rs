//! Logging setup for the `grok` binary.
//!
//! Diagnostics go through `tracing` to stderr so that stdout carries only
//! command output (answers, listings, JSON). `RUST_LOG` overrides the
//! configured level, e.g. `RUST_LOG=grokctx_core=debug`.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Fails if one is already installed.
pub fn init(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {}", e))
}
