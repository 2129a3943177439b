//! Composition root for the colloquy resilience layer.
//!
//! [`driver::TurnDriver`] wires the context window manager, the retry
//! controller, the circuit breaker and JSON repair into one per-turn flow.
//! The `colloquy` binary exposes the individual components on the command
//! line for inspection.

pub mod cli;
pub mod commands;
pub mod driver;
pub mod logging;

pub use driver::{TurnDriver, TurnReport};
