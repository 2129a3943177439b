//! Error pattern detection and the tool-call circuit breaker.
//!
//! Tool results that start with `ERROR:` are classified against an ordered
//! catalog of error categories. Three consecutive errors in the same
//! category flip the session's `stop_retrying` flag and produce a
//! remediation suggestion for the user.

pub mod breaker;
pub mod detector;
pub mod patterns;
pub mod suggestions;

pub use breaker::{BreakerEvent, BreakerState, CircuitBreaker, ERROR_PREFIX};
pub use detector::{Classification, ErrorPatternDetector};
pub use patterns::{detect_pattern, ErrorPattern, PatternCatalog};
pub use suggestions::suggestion_for;
