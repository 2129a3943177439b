//! Context window management for Colloquy.
//!
//! Decides which messages of a conversation fit the model's token budget
//! this turn, caching per-message token counts computed by an external
//! tokenizer, optionally ahead of time on a background worker.

pub mod error;
pub mod precount;
pub mod tokenizer;
pub mod window;

pub use error::ContextError;
pub use precount::{PrecountHandle, TokenPrecounter};
pub use tokenizer::{HeuristicTokenizer, Tokenizer};
pub use window::{select_active, ContextSummary, ContextWindowManager};
