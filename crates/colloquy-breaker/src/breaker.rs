use colloquy_core::config::BreakerConfig;
use colloquy_core::{Session, STOP_RETRYING_KEY};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detector::ErrorPatternDetector;

/// Tool results beginning with this marker are treated as errors.
pub const ERROR_PREFIX: &str = "ERROR:";

/// Notification pushed to the client when the breaker trips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BreakerEvent {
    Fragment { content: String },
}

impl BreakerEvent {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            BreakerEvent::Fragment { content } => serde_json::json!({
                "type": "fragment",
                "content": content,
            }),
        }
    }
}

/// Observable breaker state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "similar_count", rename_all = "snake_case")]
pub enum BreakerState {
    NoError,
    Tracking(u32),
    Stopped,
}

impl BreakerState {
    /// Whether an error arriving in this state is allowed to trip the breaker.
    pub fn can_trip(&self) -> bool {
        !matches!(self, BreakerState::Stopped)
    }
}

/// Function-result inspector layered over [`ErrorPatternDetector`].
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    detector: ErrorPatternDetector,
}

impl CircuitBreaker {
    pub fn new(detector: ErrorPatternDetector) -> Self {
        Self { detector }
    }

    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new(ErrorPatternDetector::from_config(config))
    }

    pub fn detector(&self) -> &ErrorPatternDetector {
        &self.detector
    }

    /// Inspect a tool result and return whether retries should stop.
    ///
    /// Results without the `ERROR:` prefix leave the session untouched. The
    /// error that trips the breaker sets `stop_retrying` and sends exactly
    /// one fragment to `sink`. Later errors keep the stop in place without
    /// sending again.
    pub fn inspect_function_result(
        &self,
        session: &mut Session,
        result: Option<&str>,
        function: &str,
        sink: Option<&mut dyn FnMut(BreakerEvent)>,
    ) -> bool {
        let Some(error) = result.filter(|r| r.starts_with(ERROR_PREFIX)) else {
            return false;
        };

        let was = self.state(session);
        let classification = self.detector.record_and_classify(session, error, function);

        if !was.can_trip() {
            return true;
        }
        if !classification.stop {
            return false;
        }

        session.set_stop_retrying(true);
        warn!(
            category = "app",
            function,
            pattern = ?classification.category,
            "Repeated tool errors, stopping automatic retries"
        );

        if let (Some(sink), Some(content)) = (sink, classification.suggestion) {
            sink(BreakerEvent::Fragment { content });
        }
        true
    }

    /// Whether the driver should refrain from retrying tool calls.
    pub fn should_stop_for_errors(&self, session: &Session) -> bool {
        session.stop_retrying()
    }

    /// Clear error tracking and the stop flag together.
    ///
    /// Other session parameters are kept. The flag is only rewritten when
    /// it was present.
    pub fn reset_error_tracking(&self, session: &mut Session) {
        session.error_tracking = None;
        if session.parameters.contains_key(STOP_RETRYING_KEY) {
            session.set_stop_retrying(false);
        }
        info!(category = "app", session_id = %session.id, "Error tracking reset");
    }

    pub fn state(&self, session: &Session) -> BreakerState {
        if session.stop_retrying() {
            return BreakerState::Stopped;
        }
        match &session.error_tracking {
            None => BreakerState::NoError,
            Some(tracking) => BreakerState::Tracking(tracking.similar_count),
        }
    }
}
