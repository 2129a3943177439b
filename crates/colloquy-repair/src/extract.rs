//! Field-level recovery for code execution tool arguments.

use std::str::Chars;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::repair::repair;

/// Appended to a `code` or `command` value that ran to the end of the input.
pub const TRUNCATION_MARKER: &str = "\n# [Code may have been truncated]";

/// Fields whose truncated values get the [`TRUNCATION_MARKER`].
const CODE_FIELDS: [&str; 2] = ["code", "command"];

static FIELD_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([A-Za-z_][A-Za-z0-9_]*)"\s*:\s*""#).expect("Invalid field start regex")
});

/// Recover string arguments from a code execution tool call.
///
/// Valid JSON objects are returned unchanged. Otherwise each `"key": "value"`
/// pair is read in order, with JSON escapes decoded. A value with no closing
/// quote takes the rest of the input, and for `code` and `command` the
/// truncation marker is appended.
pub fn extract_code_execution_params(text: &str) -> Map<String, Value> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        return map;
    }

    let mut params = Map::new();
    let mut pos = 0;

    while let Some(caps) = FIELD_START.captures_at(text, pos) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let key = key.as_str();
        let value_start = whole.end();
        let rest = &text[value_start..];

        match find_closing_quote(rest) {
            Some(end) => {
                params
                    .entry(key)
                    .or_insert_with(|| Value::String(unescape(&rest[..end])));
                pos = value_start + end + 1;
            }
            None => {
                let mut value = unescape(rest);
                if CODE_FIELDS.contains(&key) {
                    value.push_str(TRUNCATION_MARKER);
                }
                debug!(category = "app", field = key, "Recovered truncated tool argument");
                params.entry(key).or_insert(Value::String(value));
                break;
            }
        }
    }

    params
}

/// Alias used by the script runner tool.
pub fn extract_run_script_params(text: &str) -> Map<String, Value> {
    extract_code_execution_params(text)
}

/// Alias used by the code runner tool.
pub fn extract_run_code_params(text: &str) -> Map<String, Value> {
    extract_code_execution_params(text)
}

/// Recover the arguments of a streamed tool call.
///
/// Invalid input that carries a `code` or `command` field goes through the
/// field extractor so the truncation marker reaches the executor. Everything
/// else goes through [`repair`].
pub fn repair_tool_arguments(text: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return value;
    }

    let extracted = extract_code_execution_params(text);
    if CODE_FIELDS.iter().any(|f| extracted.contains_key(*f)) {
        return Value::Object(extracted);
    }

    repair(text).into_value()
}

/// Byte offset of the first unescaped `"` in `s`.
fn find_closing_quote(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return Some(i);
        }
    }
    None
}

/// Decode JSON string escapes. Unknown escapes keep the escaped character.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('u') => match read_hex4(&mut chars) {
                Some(high @ 0xD800..=0xDBFF) => {
                    let mut lookahead = chars.clone();
                    let low = match (lookahead.next(), lookahead.next()) {
                        (Some('\\'), Some('u')) => {
                            read_hex4(&mut lookahead).filter(|low| (0xDC00..=0xDFFF).contains(low))
                        }
                        _ => None,
                    };
                    match low {
                        Some(low) => {
                            chars = lookahead;
                            let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                            out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                        }
                        None => out.push(char::REPLACEMENT_CHARACTER),
                    }
                }
                Some(code) => out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)),
                None => out.push('u'),
            },
            Some(other) => out.push(other),
            None => {}
        }
    }

    out
}

/// Consume four hex digits from `chars`. Leaves `chars` untouched when
/// fewer than four follow.
fn read_hex4(chars: &mut Chars<'_>) -> Option<u32> {
    let mut lookahead = chars.clone();
    let mut value = 0;
    for _ in 0..4 {
        value = value * 16 + lookahead.next()?.to_digit(16)?;
    }
    *chars = lookahead;
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn get<'a>(params: &'a Map<String, Value>, key: &str) -> &'a str {
        params.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    // ---- Valid input ----

    #[test]
    fn test_valid_code_params() {
        let params = extract_code_execution_params(r#"{"code": "print(\"Hello\")", "extension": "py"}"#);
        assert_eq!(get(&params, "code"), r#"print("Hello")"#);
        assert_eq!(get(&params, "extension"), "py");
    }

    #[test]
    fn test_valid_command_params() {
        let params = extract_code_execution_params(r##"{"command": "ls -la", "code": "#!/bin/bash"}"##);
        assert_eq!(get(&params, "command"), "ls -la");
        assert_eq!(get(&params, "code"), "#!/bin/bash");
    }

    #[test]
    fn test_newlines_and_quotes_preserved() {
        let params = extract_code_execution_params(r#"{"code": "line1\nline2\nline3"}"#);
        assert_eq!(get(&params, "code"), "line1\nline2\nline3");

        let params = extract_code_execution_params(r#"{"code": "print(\"Hello, World!\")"}"#);
        assert_eq!(get(&params, "code"), r#"print("Hello, World!")"#);
    }

    // ---- Truncated input ----

    #[test]
    fn test_truncated_code_gets_marker() {
        let params = extract_code_execution_params(
            r#"{"code": "def long_function():\n    print(\"This is a very long"#,
        );
        let code = get(&params, "code");
        assert!(code.starts_with("def long_function():\n    print(\"This is a very long"));
        assert!(code.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_severely_truncated_code() {
        let params = extract_code_execution_params(
            r#"{"code": "import sys\nimport os\n\ndef main():\n    "#,
        );
        let code = get(&params, "code");
        assert!(code.contains("import sys"));
        assert!(code.contains("def main():"));
    }

    #[test]
    fn test_multiple_params_with_truncated_tail() {
        let params = extract_code_execution_params(
            r#"{"command": "python", "code": "print(1)", "extension": "py"#,
        );
        assert_eq!(get(&params, "command"), "python");
        assert_eq!(get(&params, "code"), "print(1)");
        assert_eq!(get(&params, "extension"), "py");
    }

    #[test]
    fn test_raw_newlines_in_truncated_code() {
        let raw = "{\"code\": \"import matplotlib.pyplot as plt\nimport numpy as np\n\n\
                   x = np.linspace(0, 10, 100)\nplt.figure(figsize=(10, 6))\nplt.savefig('sine_";
        let params = extract_code_execution_params(raw);
        let code = get(&params, "code");
        assert!(code.contains("import matplotlib"));
        assert!(code.contains("# [Code may have been truncated]"));
    }

    #[test]
    fn test_no_fields() {
        assert!(extract_code_execution_params("not json").is_empty());
    }

    #[test]
    fn test_unicode_escape() {
        let params = extract_code_execution_params(r#"{"code": "caf\u00e9", "x": 1"#);
        assert_eq!(get(&params, "code"), "café");
    }

    #[test]
    fn test_surrogate_pair_in_truncated_code() {
        let params = extract_code_execution_params(r#"{"code": "print('\ud83d\ude00')"#);
        assert_eq!(
            get(&params, "code"),
            format!("print('\u{1F600}'){TRUNCATION_MARKER}")
        );
    }

    #[test]
    fn test_surrogate_pair_in_closed_value() {
        let params = extract_code_execution_params(r#"{"code": "x = '\ud83d\ude00'", "n": 1"#);
        assert_eq!(get(&params, "code"), "x = '\u{1F600}'");
    }

    #[test]
    fn test_lone_surrogate_becomes_replacement_char() {
        let params = extract_code_execution_params(r#"{"code": "a\ud83dz", "n": 1"#);
        assert_eq!(get(&params, "code"), "a\u{FFFD}z");
    }

    #[test]
    fn test_short_unicode_escape_kept_literally() {
        let params = extract_code_execution_params(r#"{"code": "\u12", "n": 1"#);
        assert_eq!(get(&params, "code"), "u12");
    }

    // ---- Aliases ----

    #[test]
    fn test_aliases_delegate() {
        let raw = r#"{"code": "test"}"#;
        let expected = extract_code_execution_params(raw);
        assert_eq!(extract_run_script_params(raw), expected);
        assert_eq!(extract_run_code_params(raw), expected);
        assert_eq!(get(&expected, "code"), "test");
    }

    // ---- Tool argument recovery ----

    #[test]
    fn test_repair_tool_arguments_valid() {
        assert_eq!(
            repair_tool_arguments(r#"{"code": "x = 1"}"#),
            json!({"code": "x = 1"})
        );
    }

    #[test]
    fn test_repair_tool_arguments_prefers_extractor_for_code() {
        let value = repair_tool_arguments(r#"{"code": "print('hi')\nprint('th"#);
        let code = value["code"].as_str().unwrap();
        assert!(code.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_repair_tool_arguments_falls_back_to_repair() {
        assert_eq!(
            repair_tool_arguments(r#"{"query": "rust", "limit": [1, 2"#),
            json!({"query": "rust", "limit": [1, 2]})
        );
    }

    #[test]
    fn test_repair_tool_arguments_failure_marker() {
        let value = repair_tool_arguments("This is not JSON at all");
        assert_eq!(value["_json_repair_failed"], true);
    }

    // ---- Helpers ----

    #[test]
    fn test_find_closing_quote_skips_escapes() {
        assert_eq!(find_closing_quote(r#"ab\"cd"ef"#), Some(6));
        assert_eq!(find_closing_quote(r#"ab\\"#), None);
        assert_eq!(find_closing_quote(r#"ab\\"x"#), Some(4));
    }
}
