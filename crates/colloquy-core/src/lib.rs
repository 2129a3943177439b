pub mod config;
pub mod error;
pub mod registry;
pub mod types;

pub use config::ColloquyConfig;
pub use error::{ColloquyError, Result};
pub use registry::{SessionHandle, SessionRegistry, TurnGate};
pub use types::*;
