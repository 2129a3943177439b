use chrono::Local;
use colloquy_core::config::BreakerConfig;
use colloquy_core::{
    ErrorRecord, ErrorTrackingState, PatternCategory, Session, ERROR_HISTORY_CAP, STOP_THRESHOLD,
};
use serde::Serialize;
use tracing::debug;

use crate::patterns::detect_pattern;
use crate::suggestions::suggestion_for;

/// Outcome of recording one error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: Option<PatternCategory>,
    pub stop: bool,
    pub suggestion: Option<String>,
}

/// Tracks consecutive same-category errors within a session.
#[derive(Debug, Clone)]
pub struct ErrorPatternDetector {
    stop_threshold: u32,
    history_cap: usize,
}

impl Default for ErrorPatternDetector {
    fn default() -> Self {
        Self::new(STOP_THRESHOLD, ERROR_HISTORY_CAP)
    }
}

impl ErrorPatternDetector {
    pub fn new(stop_threshold: u32, history_cap: usize) -> Self {
        Self {
            stop_threshold,
            history_cap: history_cap.max(1),
        }
    }

    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new(config.stop_threshold, config.history_cap)
    }

    pub fn stop_threshold(&self) -> u32 {
        self.stop_threshold
    }

    /// Classify `error` and fold it into `tracking`.
    ///
    /// A repeat of the previous category bumps `similar_count`. Any other
    /// outcome, including no category at all, resets it to zero.
    pub fn record(
        &self,
        tracking: &mut ErrorTrackingState,
        error: &str,
        function: &str,
    ) -> Option<PatternCategory> {
        let current = detect_pattern(error);

        match current {
            Some(category) if tracking.last_pattern == Some(category) => {
                tracking.similar_count += 1;
            }
            _ => {
                tracking.similar_count = 0;
                tracking.last_pattern = current;
            }
        }

        tracking.push_record(
            ErrorRecord {
                error: error.to_string(),
                function: function.to_string(),
                timestamp: Local::now(),
            },
            self.history_cap,
        );

        let pattern = current.map_or_else(|| "none".to_string(), |c| c.to_string());
        debug!(
            category = "app",
            function,
            pattern = %pattern,
            similar_count = tracking.similar_count,
            "Tool error recorded"
        );

        current
    }

    /// Record an error on the session, creating its tracking state if needed.
    pub fn add_error(
        &self,
        session: &mut Session,
        error: &str,
        function: &str,
    ) -> Option<PatternCategory> {
        let tracking = session
            .error_tracking
            .get_or_insert_with(ErrorTrackingState::default);
        self.record(tracking, error, function)
    }

    /// Record an error and report whether retries should stop.
    pub fn record_and_classify(
        &self,
        session: &mut Session,
        error: &str,
        function: &str,
    ) -> Classification {
        let category = self.add_error(session, error, function);
        let stop = self.should_stop_retrying(session);
        let suggestion = if stop { self.suggestion(session) } else { None };
        Classification {
            category,
            stop,
            suggestion,
        }
    }

    pub fn should_stop_retrying(&self, session: &Session) -> bool {
        session
            .error_tracking
            .as_ref()
            .is_some_and(|t| t.similar_count >= self.stop_threshold)
    }

    /// Suggestion for the session's last detected category.
    pub fn suggestion(&self, session: &Session) -> Option<String> {
        let tracking = session.error_tracking.as_ref()?;
        suggestion_for(tracking.last_pattern, tracking)
    }
}
