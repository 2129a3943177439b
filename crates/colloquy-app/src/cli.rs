//! CLI argument definitions for the colloquy binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colloquy_core::ColloquyConfig;

/// Colloquy: inspect the conversational resilience layer from the shell.
#[derive(Parser, Debug)]
#[command(name = "colloquy", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Repair truncated JSON read from a file, or stdin when FILE is "-".
    Repair {
        #[arg(default_value = "-")]
        input: String,

        /// Treat the input as tool-call arguments and recover code fields.
        #[arg(long = "tool-args")]
        tool_args: bool,
    },

    /// Classify a tool error message against the error pattern catalog.
    Classify { text: String },

    /// Show the resolved connection timeouts for a provider.
    Timeouts { provider: Option<String> },

    /// Compute the active context for a JSON list of messages.
    Context {
        file: PathBuf,

        /// Override `context.max_input_tokens`.
        #[arg(long = "max-input-tokens")]
        max_input_tokens: Option<usize>,

        /// Override `context.context_size`.
        #[arg(long = "context-size")]
        context_size: Option<usize>,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > COLLOQUY_CONFIG env var > ~/.colloquy/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("COLLOQUY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config: &ColloquyConfig) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config.general.log_level.clone())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".colloquy").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".colloquy").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repair_defaults_to_stdin() {
        let args = CliArgs::try_parse_from(["colloquy", "repair"]).unwrap();
        assert_eq!(
            args.command,
            Command::Repair {
                input: "-".to_string(),
                tool_args: false
            }
        );
    }

    #[test]
    fn test_parse_repair_with_file_and_flag() {
        let args =
            CliArgs::try_parse_from(["colloquy", "repair", "payload.json", "--tool-args"]).unwrap();
        assert_eq!(
            args.command,
            Command::Repair {
                input: "payload.json".to_string(),
                tool_args: true
            }
        );
    }

    #[test]
    fn test_parse_context_overrides() {
        let args = CliArgs::try_parse_from([
            "colloquy",
            "context",
            "messages.json",
            "--max-input-tokens",
            "500",
        ])
        .unwrap();
        match args.command {
            Command::Context {
                file,
                max_input_tokens,
                context_size,
            } => {
                assert_eq!(file, PathBuf::from("messages.json"));
                assert_eq!(max_input_tokens, Some(500));
                assert_eq!(context_size, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "colloquy",
            "timeouts",
            "claude",
            "--config",
            "/tmp/c.toml",
            "-l",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/c.toml"));
        assert_eq!(args.resolve_log_level(&ColloquyConfig::default()), "debug");
    }

    #[test]
    fn test_log_level_falls_back_to_config() {
        let args = CliArgs::try_parse_from(["colloquy", "classify", "ERROR: x"]).unwrap();
        let mut config = ColloquyConfig::default();
        config.general.log_level = "warn".to_string();
        assert_eq!(args.resolve_log_level(&config), "warn");
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(CliArgs::try_parse_from(["colloquy"]).is_err());
    }
}
