//! Token counting over a frozen encoding.

use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Counts tokens for strings under the `cl100k_base` encoding.
///
/// Deterministic and safe for concurrent use; construction loads the
/// embedded encoding tables once. If the tables fail to load the counter
/// falls back to a character estimate (~4 chars per token).
pub struct TokenCounter {
    bpe: Option<CoreBPE>,
}

impl TokenCounter {
    /// Build a counter for the frozen encoding.
    pub fn new() -> Self {
        match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Self { bpe: Some(bpe) },
            Err(e) => {
                warn!(error = %e, "cl100k_base unavailable; using character estimate");
                Self { bpe: None }
            }
        }
    }

    /// Count tokens in `text`. Empty input counts as zero.
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => (text.len() / 4).max(1),
        }
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}
