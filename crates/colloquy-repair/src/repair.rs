use serde_json::{json, Map, Value};
use tracing::{debug, warn};

/// Marker keys used when a failure is rendered as a JSON object.
const FAILED_KEY: &str = "_json_repair_failed";
const LENGTH_KEY: &str = "_original_length";
const ERROR_KEY: &str = "_error";

/// Why a repair attempt gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("JSON repair failed ({original_length} chars): {error_message}")]
pub struct RepairFailure {
    /// Length of the input, in characters.
    pub original_length: usize,
    pub error_message: String,
}

impl RepairFailure {
    /// The failure as `{"_json_repair_failed": true, "_original_length": n, "_error": msg}`.
    pub fn to_value(&self) -> Value {
        json!({
            FAILED_KEY: true,
            LENGTH_KEY: self.original_length,
            ERROR_KEY: self.error_message,
        })
    }
}

/// Result of [`repair`]. Callers must check for `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum RepairOutcome {
    Parsed(Value),
    Failed(RepairFailure),
}

impl RepairOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, RepairOutcome::Failed(_))
    }

    pub fn parsed(&self) -> Option<&Value> {
        match self {
            RepairOutcome::Parsed(value) => Some(value),
            RepairOutcome::Failed(_) => None,
        }
    }

    /// Flatten into a single JSON value, rendering failures as a marker object.
    pub fn into_value(self) -> Value {
        match self {
            RepairOutcome::Parsed(value) => value,
            RepairOutcome::Failed(failure) => failure.to_value(),
        }
    }

    /// Whether `value` is a failure marker produced by [`RepairOutcome::into_value`].
    pub fn is_failure_marker(value: &Value) -> bool {
        value.get(FAILED_KEY).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Parse `raw`, closing whatever a truncated stream left open.
///
/// Missing or empty input yields an empty object. Valid JSON is returned
/// as-is. Otherwise an open string is closed, then open objects and arrays
/// are closed innermost first, and the result is parsed again.
pub fn repair<'a>(raw: impl Into<Option<&'a str>>) -> RepairOutcome {
    let text = match raw.into() {
        Some(text) if !text.is_empty() => text,
        _ => return RepairOutcome::Parsed(Value::Object(Map::new())),
    };

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return RepairOutcome::Parsed(value);
    }

    let repaired = close_open_structures(text);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            debug!(
                category = "app",
                original_len = text.len(),
                repaired_len = repaired.len(),
                "Repaired truncated JSON"
            );
            RepairOutcome::Parsed(value)
        }
        Err(e) => {
            warn!(category = "app", error = %e, "JSON repair failed");
            RepairOutcome::Failed(RepairFailure {
                original_length: text.chars().count(),
                error_message: e.to_string(),
            })
        }
    }
}

/// Append the quote and closers needed to balance `text`.
fn close_open_structures(text: &str) -> String {
    let mut in_string = false;
    let mut escaped = false;
    let mut stack: Vec<char> = Vec::new();

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    let mut repaired = String::with_capacity(text.len() + stack.len() + 1);
    repaired.push_str(text);
    if in_string {
        // a dangling backslash would escape the closing quote
        if escaped {
            repaired.pop();
        }
        repaired.push('"');
    }
    repaired.extend(stack.iter().rev());
    repaired
}
