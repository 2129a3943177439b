//! Subcommand implementations. Each returns a JSON document for stdout.

use std::io::Read;
use std::path::Path;

use colloquy_breaker::{detect_pattern, suggestion_for, ERROR_PREFIX};
use colloquy_context::{ContextWindowManager, HeuristicTokenizer};
use colloquy_core::{ColloquyConfig, ErrorTrackingState, Message, Result, Role};
use colloquy_network::ProviderTimeouts;
use colloquy_repair::{repair, repair_tool_arguments};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::cli::Command;

/// Dispatch a parsed subcommand.
pub fn run(command: &Command, config: &ColloquyConfig) -> Result<Value> {
    match command {
        Command::Repair { input, tool_args } => {
            let text = read_input(input)?;
            Ok(repair_text(&text, *tool_args))
        }
        Command::Classify { text } => Ok(classify(text)),
        Command::Timeouts { provider } => Ok(timeouts(config, provider.as_deref())),
        Command::Context {
            file,
            max_input_tokens,
            context_size,
        } => {
            let text = std::fs::read_to_string(file)?;
            let mut manager = ContextWindowManager::from_config(&config.context);
            if let Some(max) = max_input_tokens {
                manager.max_input_tokens = *max;
            }
            if let Some(size) = context_size {
                manager.context_size = *size;
            }
            context(&manager, &text)
        }
    }
}

/// Read a file, or stdin for "-".
fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(Path::new(input))?)
    }
}

pub fn repair_text(text: &str, tool_args: bool) -> Value {
    if tool_args {
        repair_tool_arguments(text)
    } else {
        repair(text).into_value()
    }
}

pub fn classify(text: &str) -> Value {
    let category = detect_pattern(text);
    let suggestion = suggestion_for(category, &ErrorTrackingState::default());
    json!({
        "tracked": text.starts_with(ERROR_PREFIX),
        "category": category.map(|c| c.to_string()),
        "suggestion": suggestion,
    })
}

pub fn timeouts(config: &ColloquyConfig, provider: Option<&str>) -> Value {
    let resolved = ProviderTimeouts::from_settings(&config.timeouts).for_provider(provider);
    json!({
        "provider": provider.unwrap_or("default"),
        "open_secs": resolved.open.as_secs(),
        "read_secs": resolved.read.as_secs(),
        "write_secs": resolved.write.as_secs(),
    })
}

/// A message as accepted on the command line.
#[derive(Debug, Deserialize)]
struct MessageInput {
    role: Role,
    text: String,
    #[serde(default)]
    tokens: Option<usize>,
}

/// Select the active suffix of a JSON message list with the heuristic tokenizer.
pub fn context(manager: &ContextWindowManager, text: &str) -> Result<Value> {
    let inputs: Vec<MessageInput> = serde_json::from_str(text)?;
    let mut messages: Vec<Message> = inputs
        .into_iter()
        .map(|input| {
            let mut message = Message::new(input.role, input.text);
            message.tokens = input.tokens;
            message
        })
        .collect();

    let summary = manager.select_active(&mut messages, &HeuristicTokenizer::default())?;
    let active: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.active)
        .map(|(i, _)| i)
        .collect();
    let tokens: Vec<Option<usize>> = messages.iter().map(|m| m.tokens).collect();

    Ok(json!({
        "summary": serde_json::to_value(&summary)?,
        "active_indices": active,
        "tokens": tokens,
    }))
}
