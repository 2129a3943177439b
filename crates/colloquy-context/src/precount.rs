//! Background token precounting.
//!
//! Counting tokens for a long message can take a noticeable amount of time,
//! so the driver may start the count as soon as the text is known and apply
//! the result later. The write-back is idempotent: if the foreground path
//! already counted the message, applying the handle overwrites the cache
//! with the same value.

use std::sync::Arc;

use colloquy_core::types::Message;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::ContextError;
use crate::tokenizer::Tokenizer;

/// Spawns token counts on the blocking thread pool.
#[derive(Clone)]
pub struct TokenPrecounter {
    tokenizer: Arc<dyn Tokenizer>,
}

impl TokenPrecounter {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }

    /// Start counting `text` in the background.
    ///
    /// Returns `None` for empty text. Must be called from within a Tokio
    /// runtime.
    pub fn spawn(&self, text: &str) -> Option<PrecountHandle> {
        if text.is_empty() {
            return None;
        }
        let tokenizer = Arc::clone(&self.tokenizer);
        let text = text.to_string();
        let handle = tokio::task::spawn_blocking(move || tokenizer.count_tokens(&text));
        Some(PrecountHandle { handle })
    }
}

/// A pending background token count.
pub struct PrecountHandle {
    handle: JoinHandle<Result<usize, ContextError>>,
}

impl PrecountHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the count.
    pub async fn join(self) -> Result<usize, ContextError> {
        self.handle
            .await
            .map_err(|e| ContextError::Precount(e.to_string()))?
    }

    /// Wait for the count and cache it on `message`.
    pub async fn apply(self, message: &mut Message) -> Result<usize, ContextError> {
        let tokens = self.join().await?;
        if let Some(existing) = message.tokens {
            debug!(existing, tokens, "Overwriting token count computed in the foreground");
        }
        message.tokens = Some(tokens);
        Ok(tokens)
    }
}
