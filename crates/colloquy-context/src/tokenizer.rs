//! Tokenizer collaborator interface.

use crate::error::ContextError;

/// Converts text into a token count.
///
/// Implementations wrap a real BPE tokenizer or a service call. Failures
/// must be reported, not guessed around: the context window manager
/// propagates them so an invalid request is never assembled.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> Result<usize, ContextError>;
}

impl<F> Tokenizer for F
where
    F: Fn(&str) -> Result<usize, ContextError> + Send + Sync,
{
    fn count_tokens(&self, text: &str) -> Result<usize, ContextError> {
        self(text)
    }
}

/// Character-ratio estimate, used when no real encoding is loaded.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicTokenizer {
    chars_per_token: usize,
}

impl Default for HeuristicTokenizer {
    fn default() -> Self {
        Self { chars_per_token: 4 }
    }
}

impl HeuristicTokenizer {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Tokenizer for HeuristicTokenizer {
    fn count_tokens(&self, text: &str) -> Result<usize, ContextError> {
        let chars = text.chars().count();
        Ok(chars.div_ceil(self.chars_per_token))
    }
}
