use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use colloquy_core::{ColloquyConfig, ColloquyError};
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::format::format_network_error;
use crate::kind::{ClassifyError, NetworkErrorKind};
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::timeouts::{ProviderTimeouts, TimeoutConfig};

/// Context handed to the operation on every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based attempt number.
    pub number: u32,
    /// Total time spent sleeping before this attempt.
    pub elapsed_delay: Duration,
    /// Kind of the failure that triggered this attempt, if any.
    pub previous_error: Option<NetworkErrorKind>,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The failure was not a transient network error and was not retried.
    #[error("{0}")]
    NonRetryable(E),

    /// Every attempt failed with a retryable error.
    #[error("{message}")]
    Exhausted {
        provider: String,
        kind: NetworkErrorKind,
        attempts: u32,
        message: String,
        last_error: E,
    },
}

impl<E> RetryError<E> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// The user-facing message for an exhausted call.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            RetryError::Exhausted { message, .. } => Some(message),
            RetryError::NonRetryable(_) => None,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::NonRetryable(err) => err,
            RetryError::Exhausted { last_error, .. } => last_error,
        }
    }
}

impl<E: Display> From<RetryError<E>> for ColloquyError {
    fn from(err: RetryError<E>) -> Self {
        ColloquyError::Network(err.to_string())
    }
}

/// Runs provider calls with classification-aware retry.
#[derive(Debug, Clone)]
pub struct RetryController<S = TokioSleeper> {
    max_retries: u32,
    policy: BackoffPolicy,
    timeouts: ProviderTimeouts,
    sleeper: S,
}

impl RetryController<TokioSleeper> {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            policy: BackoffPolicy::default(),
            timeouts: ProviderTimeouts::builtin(),
            sleeper: TokioSleeper,
        }
    }

    pub fn from_config(config: &ColloquyConfig) -> Self {
        Self {
            max_retries: config.retry.max_retries,
            policy: BackoffPolicy::from_config(&config.retry),
            timeouts: ProviderTimeouts::from_settings(&config.timeouts),
            sleeper: TokioSleeper,
        }
    }
}

impl Default for RetryController<TokioSleeper> {
    fn default() -> Self {
        Self::new(3)
    }
}

impl<S: Sleeper> RetryController<S> {
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> RetryController<T> {
        RetryController {
            max_retries: self.max_retries,
            policy: self.policy,
            timeouts: self.timeouts,
            sleeper,
        }
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeouts(mut self, timeouts: ProviderTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn timeouts_for(&self, provider: Option<&str>) -> TimeoutConfig {
        self.timeouts.for_provider(provider)
    }

    /// Run `operation`, retrying transient network failures.
    ///
    /// The operation runs at most `max_retries + 1` times. Errors whose
    /// kind is not retryable are returned after the first attempt.
    pub async fn with_retry<T, E, F, Fut>(
        &self,
        provider: Option<&str>,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(RetryAttempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifyError + Display,
    {
        let timeouts = self.timeouts.for_provider(provider);
        self.with_retry_timeouts(provider, timeouts, operation).await
    }

    /// Like [`with_retry`](Self::with_retry), with explicit timeouts in
    /// place of the provider table.
    pub async fn with_retry_timeouts<T, E, F, Fut>(
        &self,
        provider: Option<&str>,
        timeouts: TimeoutConfig,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(RetryAttempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifyError + Display,
    {
        let provider_name = provider
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("API");

        let mut retries = 0u32;
        let mut elapsed_delay = Duration::ZERO;
        let mut previous_error = None;

        loop {
            let attempt = RetryAttempt {
                number: retries + 1,
                elapsed_delay,
                previous_error,
                timeouts,
            };

            let err = match operation(attempt).await {
                Ok(value) => {
                    if retries > 0 {
                        info!(
                            category = "api",
                            provider = provider_name,
                            attempts = retries + 1,
                            "Request succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let kind = err.kind();
            if !kind.is_retryable() {
                if kind == NetworkErrorKind::Parse {
                    error!(
                        category = "api",
                        provider = provider_name,
                        error = %err,
                        "JSON parse error, not retryable"
                    );
                } else {
                    debug!(
                        category = "api",
                        provider = provider_name,
                        kind = %kind,
                        error = %err,
                        "Non-network error, not retrying"
                    );
                }
                return Err(RetryError::NonRetryable(err));
            }

            if retries >= self.max_retries {
                let message = format_network_error(kind, &err.to_string(), Some(provider_name));
                error!(
                    category = "api",
                    provider = provider_name,
                    kind = %kind,
                    attempts = retries + 1,
                    error = %err,
                    "Network retries exhausted"
                );
                return Err(RetryError::Exhausted {
                    provider: provider_name.to_string(),
                    kind,
                    attempts: retries + 1,
                    message,
                    last_error: err,
                });
            }

            retries += 1;
            let delay = self.policy.delay_for(retries);
            warn!(
                category = "api",
                provider = provider_name,
                kind = %kind,
                retry = retries,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Network error, retrying"
            );
            self.sleeper.sleep(delay).await;
            elapsed_delay += delay;
            previous_error = Some(kind);
        }
    }
}

/// Retry `operation` with default backoff and real sleeps.
///
/// `timeout_config` defaults to the provider's built-in timeouts.
pub async fn with_retry<T, E, F, Fut>(
    max_retries: u32,
    provider: Option<&str>,
    timeout_config: Option<TimeoutConfig>,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(RetryAttempt) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ClassifyError + Display,
{
    let controller = RetryController::new(max_retries);
    let timeouts = timeout_config.unwrap_or_else(|| controller.timeouts_for(provider));
    controller
        .with_retry_timeouts(provider, timeouts, operation)
        .await
}
