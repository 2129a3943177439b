use thiserror::Error;

/// Top-level error type for the Colloquy workspace.
///
/// Component crates define their own error types and convert into
/// `ColloquyError` where they cross into the driver, so that `?` works
/// across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ColloquyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    #[error("Session lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for ColloquyError {
    fn from(err: toml::de::Error) -> Self {
        ColloquyError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ColloquyError {
    fn from(err: toml::ser::Error) -> Self {
        ColloquyError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ColloquyError {
    fn from(err: serde_json::Error) -> Self {
        ColloquyError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Colloquy operations.
pub type Result<T> = std::result::Result<T, ColloquyError>;
