//! Shared domain types for the conversational resilience layer.
//!
//! These types are used across the component crates: the context window
//! manager reads and annotates [`Message`]s, the error pattern detector
//! writes [`ErrorTrackingState`], and the circuit breaker flips the
//! `stop_retrying` entry of the session [`ParameterMap`].

use std::collections::{HashMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of error records retained per session.
pub const ERROR_HISTORY_CAP: usize = 10;

/// `similar_count` value at which automatic retries stop (third occurrence).
pub const STOP_THRESHOLD: u32 = 2;

/// Parameter map key consulted by the driver before retrying a tool call.
pub const STOP_RETRYING_KEY: &str = "stop_retrying";

/// Generic string-keyed session parameters.
pub type ParameterMap = HashMap<String, serde_json::Value>;

// =============================================================================
// Messages
// =============================================================================

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    /// Web search results injected into the history. Never part of the
    /// active context.
    Search,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Search => write!(f, "search"),
        }
    }
}

/// One turn of conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    /// Cached token count. Set once, never recomputed.
    #[serde(default)]
    pub tokens: Option<usize>,
    /// Whether the message was part of the last computed active context.
    #[serde(default = "default_active")]
    pub active: bool,
    pub created_at: i64,
}

fn default_active() -> bool {
    true
}

impl Message {
    /// Create a new message. Fresh messages start out active.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            tokens: None,
            active: true,
            created_at: Local::now().timestamp(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn search(text: impl Into<String>) -> Self {
        Self::new(Role::Search, text)
    }

    /// Attach a token count computed elsewhere (e.g. by a background precount).
    pub fn with_tokens(mut self, tokens: usize) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn is_search(&self) -> bool {
        self.role == Role::Search
    }
}

// =============================================================================
// Error tracking
// =============================================================================

/// Classification bucket assigned to a tool error by ordered regex matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    Font,
    Module,
    Permission,
    Resource,
    Plotting,
    FileIo,
    /// Catch-all system pattern, identified by its position in the
    /// system pattern list.
    System(usize),
}

impl fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternCategory::Font => write!(f, "font_error"),
            PatternCategory::Module => write!(f, "module_error"),
            PatternCategory::Permission => write!(f, "permission_error"),
            PatternCategory::Resource => write!(f, "resource_error"),
            PatternCategory::Plotting => write!(f, "plotting_error"),
            PatternCategory::FileIo => write!(f, "file_io_error"),
            PatternCategory::System(index) => write!(f, "system_error_{}", index),
        }
    }
}

/// A single recorded tool error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error: String,
    pub function: String,
    pub timestamp: DateTime<Local>,
}

/// Per-session record of recent tool errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorTrackingState {
    /// Most recent errors, oldest first.
    pub history: VecDeque<ErrorRecord>,
    /// Consecutive same-category errors since the last category change.
    pub similar_count: u32,
    pub last_pattern: Option<PatternCategory>,
}

impl ErrorTrackingState {
    /// Append a record, dropping the oldest entries beyond `cap`.
    pub fn push_record(&mut self, record: ErrorRecord, cap: usize) {
        self.history.push_back(record);
        while self.history.len() > cap {
            self.history.pop_front();
        }
    }

    /// The last `n` records, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &ErrorRecord> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip)
    }
}

// =============================================================================
// Session
// =============================================================================

/// Mutable state of one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub messages: Vec<Message>,
    /// `None` until the first tool error is recorded.
    #[serde(default)]
    pub error_tracking: Option<ErrorTrackingState>,
    #[serde(default)]
    pub parameters: ParameterMap,
    pub started_at: i64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
            error_tracking: None,
            parameters: ParameterMap::new(),
            started_at: Local::now().timestamp(),
        }
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Whether the circuit breaker asked the driver to stop retrying.
    pub fn stop_retrying(&self) -> bool {
        self.parameters
            .get(STOP_RETRYING_KEY)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set_stop_retrying(&mut self, stop: bool) {
        self.parameters
            .insert(STOP_RETRYING_KEY.to_string(), serde_json::Value::Bool(stop));
    }

    /// Discard history, error tracking and parameters, keeping the id.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.error_tracking = None;
        self.parameters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: usize) -> ErrorRecord {
        ErrorRecord {
            error: format!("ERROR: {}", n),
            function: format!("function_{}", n),
            timestamp: Local::now(),
        }
    }

    #[test]
    fn test_new_message_is_active_without_tokens() {
        let msg = Message::user("hello");
        assert!(msg.active);
        assert!(msg.tokens.is_none());
        assert_eq!(msg.role, Role::User);
    }

    #[test]
    fn test_with_tokens_caches_count() {
        let msg = Message::assistant("hi").with_tokens(7);
        assert_eq!(msg.tokens, Some(7));
    }

    #[test]
    fn test_search_message_detection() {
        assert!(Message::search("results").is_search());
        assert!(!Message::system("prompt").is_search());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let role: Role = serde_json::from_str("\"search\"").unwrap();
        assert_eq!(role, Role::Search);
    }

    #[test]
    fn test_message_deserialize_defaults() {
        let json = r#"{"id":"550e8400-e29b-41d4-a716-446655440000","role":"user","text":"hi","created_at":0}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(msg.active);
        assert!(msg.tokens.is_none());
    }

    #[test]
    fn test_pattern_category_display() {
        assert_eq!(PatternCategory::Font.to_string(), "font_error");
        assert_eq!(PatternCategory::FileIo.to_string(), "file_io_error");
        assert_eq!(PatternCategory::System(14).to_string(), "system_error_14");
    }

    #[test]
    fn test_push_record_caps_history() {
        let mut state = ErrorTrackingState::default();
        for i in 0..15 {
            state.push_record(record(i), ERROR_HISTORY_CAP);
        }
        assert_eq!(state.history.len(), 10);
        assert_eq!(state.history.front().unwrap().function, "function_5");
        assert_eq!(state.history.back().unwrap().function, "function_14");
    }

    #[test]
    fn test_recent_returns_tail_oldest_first() {
        let mut state = ErrorTrackingState::default();
        for i in 0..5 {
            state.push_record(record(i), ERROR_HISTORY_CAP);
        }
        let recent: Vec<_> = state.recent(3).map(|r| r.function.as_str()).collect();
        assert_eq!(recent, vec!["function_2", "function_3", "function_4"]);

        let all: Vec<_> = state.recent(10).collect();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn test_session_stop_retrying_flag() {
        let mut session = Session::new();
        assert!(!session.stop_retrying());

        session.set_stop_retrying(true);
        assert!(session.stop_retrying());

        session
            .parameters
            .insert(STOP_RETRYING_KEY.to_string(), serde_json::json!("yes"));
        assert!(!session.stop_retrying(), "non-boolean values are ignored");
    }

    #[test]
    fn test_session_clear_keeps_id() {
        let mut session = Session::new();
        let id = session.id;
        session.push_message(Message::user("hi"));
        session.error_tracking = Some(ErrorTrackingState::default());
        session.set_stop_retrying(true);

        session.clear();

        assert_eq!(session.id, id);
        assert!(session.messages.is_empty());
        assert!(session.error_tracking.is_none());
        assert!(session.parameters.is_empty());
    }
}
