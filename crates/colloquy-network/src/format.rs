//! User-facing error message formatting.
//!
//! [`format_network_error`] produces the message of an exhausted retry and
//! is used by the retry controller. The remaining formatters are library
//! API for the outer driver, which owns the provider response and tool
//! execution surfaces:
//! - [`format_provider_error`] for an error payload returned by a provider
//!   (rate limit and credential wording get their own category)
//! - [`format_tool_error`] for a tool that failed outright
//! - [`format_validation_error`] for rejected user input
//!
//! The turn driver leaves non-retryable provider errors unmodified, so
//! none of these are applied implicitly.

use crate::kind::NetworkErrorKind;

const DEFAULT_PROVIDER: &str = "API";

/// Message shown to the user once retries for `provider` are exhausted.
///
/// `provider` defaults to "API" when missing or blank.
pub fn format_network_error(kind: NetworkErrorKind, message: &str, provider: Option<&str>) -> String {
    let provider = provider
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PROVIDER);

    if kind.is_timeout() {
        format!("Request to {} timed out. Please try again.", provider)
    } else if kind.is_connection() {
        format!(
            "Unable to connect to {}. Please check your internet connection.",
            provider
        )
    } else if kind == NetworkErrorKind::Tls {
        format!("SSL connection error with {}. Please try again.", provider)
    } else {
        format!("Network error occurred: {}", message)
    }
}

/// Broad category shown in brackets at the start of a formatted error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Api,
    Network,
    Validation,
    RateLimit,
    Authentication,
    Tool,
    Unknown,
}

impl ErrorCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Api => "API Error",
            ErrorCategory::Network => "Network Error",
            ErrorCategory::Validation => "Invalid Input",
            ErrorCategory::RateLimit => "Rate Limit",
            ErrorCategory::Authentication => "Authentication Error",
            ErrorCategory::Tool => "Tool Error",
            ErrorCategory::Unknown => "Error",
        }
    }
}

/// `Error: [<label>] - <message>[. <suggestion>][ (Code: <code>)]`
pub fn format_error(
    category: ErrorCategory,
    message: &str,
    suggestion: Option<&str>,
    code: Option<&str>,
) -> String {
    let mut out = format!("Error: [{}] - {}", category.label(), message);
    if let Some(suggestion) = suggestion.filter(|s| !s.is_empty()) {
        out.push_str(". ");
        out.push_str(suggestion);
    }
    if let Some(code) = code.filter(|c| !c.is_empty()) {
        out.push_str(&format!(" (Code: {})", code));
    }
    out
}

/// Format a provider API failure, recognising rate limits and bad credentials.
pub fn format_provider_error(provider: &str, error: &str) -> String {
    let lower = error.to_lowercase();
    let message = format!("{} API error: {}", provider, error);

    let rate_limited = ["rate limit", "too many requests", "429", "quota"]
        .iter()
        .any(|needle| lower.contains(needle));
    let unauthorized = ["unauthorized", "invalid api key", "authentication", "401"]
        .iter()
        .any(|needle| lower.contains(needle));

    if rate_limited {
        format_error(
            ErrorCategory::RateLimit,
            &message,
            Some("Please wait before retrying"),
            None,
        )
    } else if unauthorized {
        format_error(
            ErrorCategory::Authentication,
            &message,
            Some("Check your API key configuration"),
            None,
        )
    } else {
        format_error(ErrorCategory::Api, &message, None, None)
    }
}

pub fn format_tool_error(tool: &str, error: &str) -> String {
    format_error(
        ErrorCategory::Tool,
        &format!("{} failed: {}", tool, error),
        None,
        None,
    )
}

/// A missing field when `value` is `None`, otherwise a rejected value.
pub fn format_validation_error(field: &str, requirement: &str, value: Option<&str>) -> String {
    let message = match value {
        Some(value) => format!("{} has invalid value '{}'", field, value),
        None => format!("{} is required", field),
    };
    format_error(ErrorCategory::Validation, &message, Some(requirement), None)
}
