//! Network retry controller for provider API calls.
//!
//! Wraps every outbound call with classification-aware retry: transient
//! network failures are retried with exponential backoff and jitter, and
//! everything else propagates on first occurrence. Once retries are
//! exhausted the caller receives a short, provider-named message.

pub mod backoff;
pub mod format;
pub mod kind;
pub mod retry;
pub mod sleeper;
pub mod timeouts;

pub use backoff::BackoffPolicy;
pub use format::{
    format_error, format_network_error, format_provider_error, format_tool_error,
    format_validation_error, ErrorCategory,
};
pub use kind::{classify_message, CallError, ClassifyError, NetworkErrorKind};
pub use retry::{with_retry, RetryAttempt, RetryController, RetryError};
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};
pub use timeouts::{timeout_config_for, ProviderTimeouts, TimeoutConfig};
