//! Tokenizer construction from configuration.
//!
//! | `tokenizer.kind` | Implementation |
//! |------------------|----------------|
//! | `approx` | [`ApproxTokenizer`], `ceil(chars / chars_per_token)` |
//! | `huggingface` | a `tokenizer.json` loaded with the `tokenizers` crate (feature `hf-tokenizer`) |

use std::sync::Arc;

use anyhow::{bail, Result};
use grokctx_core::tokenizer::{ApproxTokenizer, Tokenizer};

use crate::config::TokenizerConfig;

pub fn create_tokenizer(config: &TokenizerConfig) -> Result<Arc<dyn Tokenizer>> {
    match config.kind.as_str() {
        "approx" => Ok(Arc::new(ApproxTokenizer::new(config.chars_per_token))),
        #[cfg(feature = "hf-tokenizer")]
        "huggingface" => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("tokenizer.path required for huggingface"))?;
            Ok(Arc::new(hf::HfTokenizer::from_file(path, config.chars_per_token)?))
        }
        #[cfg(not(feature = "hf-tokenizer"))]
        "huggingface" => bail!("huggingface tokenizer requires --features hf-tokenizer"),
        other => bail!("Unknown tokenizer kind: {}", other),
    }
}

#[cfg(feature = "hf-tokenizer")]
mod hf {
    use std::path::Path;

    use anyhow::{anyhow, Result};
    use grokctx_core::tokenizer::{ApproxTokenizer, Tokenizer};
    use tracing::warn;

    /// Model tokenizer. Falls back to the character estimate for text it
    /// fails to encode, since counting must not fail.
    pub struct HfTokenizer {
        inner: tokenizers::Tokenizer,
        fallback: ApproxTokenizer,
    }

    impl HfTokenizer {
        pub fn from_file(path: &Path, chars_per_token: usize) -> Result<Self> {
            let inner = tokenizers::Tokenizer::from_file(path)
                .map_err(|e| anyhow!("failed to load tokenizer {}: {}", path.display(), e))?;
            Ok(Self {
                inner,
                fallback: ApproxTokenizer::new(chars_per_token),
            })
        }
    }

    impl Tokenizer for HfTokenizer {
        fn count_tokens(&self, text: &str) -> usize {
            match self.inner.encode(text, false) {
                Ok(encoding) => encoding.len(),
                Err(e) => {
                    warn!(error = %e, "tokenizer failed, estimating");
                    self.fallback.count_tokens(text)
                }
            }
        }
    }
}
