//! Error types for context window management.

use colloquy_core::error::ColloquyError;

/// Errors from the context window manager.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("tokenizer unavailable: {0}")]
    TokenizerUnavailable(String),
    #[error("token precount failed: {0}")]
    Precount(String),
}

impl From<ContextError> for ColloquyError {
    fn from(err: ContextError) -> Self {
        ColloquyError::Tokenizer(err.to_string())
    }
}
