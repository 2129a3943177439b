//! Colloquy binary.
//!
//! Exposes the resilience components as offline subcommands:
//! - `repair`: recover truncated JSON or tool-call arguments
//! - `classify`: match a tool error against the pattern catalog
//! - `timeouts`: show resolved provider timeouts
//! - `context`: compute the active context of a message list

use clap::Parser;
use colloquy_app::cli::CliArgs;
use colloquy_app::{commands, logging};
use colloquy_core::config::ColloquyConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config first: it supplies the default log level.
    let config_file = args.resolve_config_path();
    let config_exists = config_file.exists();
    let config = if config_exists {
        ColloquyConfig::load(&config_file)?
    } else {
        ColloquyConfig::default()
    };

    logging::init_tracing(&args.resolve_log_level(&config));
    tracing::debug!(
        path = %config_file.display(),
        found = config_exists,
        "Configuration resolved"
    );

    let output = commands::run(&args.command, &config)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
