//! Turn driver: wires context selection, provider retry, the tool-call
//! circuit breaker and argument repair around a session.
//!
//! Turns of one session are serialized by the session's turn gate, held for
//! the whole turn. The session data lock is never held across an await
//! point: a turn takes it to append the user message and snapshot the
//! active context, releases it for the provider call, then takes it again
//! to append the reply.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, MutexGuard};

use colloquy_breaker::{BreakerEvent, BreakerState, CircuitBreaker};
use colloquy_context::{ContextSummary, ContextWindowManager, TokenPrecounter, Tokenizer};
use colloquy_core::{
    ColloquyConfig, ColloquyError, Message, Result, Session, SessionHandle, SessionRegistry,
};
use colloquy_network::{ClassifyError, RetryAttempt, RetryController, Sleeper, TokioSleeper};
use colloquy_repair::{repair_tool_arguments, RepairOutcome};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of one completed turn.
#[derive(Debug)]
pub struct TurnReport {
    pub summary: ContextSummary,
    pub reply: String,
    /// Id of the assistant message appended to the session.
    pub reply_id: Uuid,
    /// Background token count for the reply. Resolves to whether the
    /// count was written back.
    pub precount: Option<JoinHandle<bool>>,
}

pub struct TurnDriver<S: Sleeper = TokioSleeper> {
    registry: Arc<SessionRegistry>,
    context: ContextWindowManager,
    tokenizer: Arc<dyn Tokenizer>,
    precounter: TokenPrecounter,
    retry: RetryController<S>,
    breaker: CircuitBreaker,
}

impl TurnDriver<TokioSleeper> {
    pub fn new(
        config: &ColloquyConfig,
        registry: Arc<SessionRegistry>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self {
            registry,
            context: ContextWindowManager::from_config(&config.context),
            precounter: TokenPrecounter::new(Arc::clone(&tokenizer)),
            tokenizer,
            retry: RetryController::from_config(config),
            breaker: CircuitBreaker::from_config(&config.breaker),
        }
    }
}

impl<S: Sleeper> TurnDriver<S> {
    /// Swap the retry sleeper. Tests use a recording sleeper here.
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> TurnDriver<T> {
        TurnDriver {
            registry: self.registry,
            context: self.context,
            tokenizer: self.tokenizer,
            precounter: self.precounter,
            retry: self.retry.with_sleeper(sleeper),
            breaker: self.breaker,
        }
    }

    pub fn with_context(mut self, context: ContextWindowManager) -> Self {
        self.context = context;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    // =========================================================================
    // Conversation turns
    // =========================================================================

    /// Recompute the active context of a session without adding a message.
    pub fn prepare_context(&self, session_id: Uuid) -> Result<(ContextSummary, Vec<Message>)> {
        let handle = self.registry.get(session_id)?;
        let mut session = lock(&handle)?;
        self.select(&mut session)
    }

    /// Run one user turn against a provider.
    ///
    /// `call` receives the active messages and the attempt context and is
    /// retried on transient network failures. An exhausted retry surfaces
    /// as [`ColloquyError::Network`] carrying the user-facing message; the
    /// user message stays in the history either way.
    pub async fn run_turn<E, F, Fut>(
        &self,
        session_id: Uuid,
        user_text: &str,
        provider: Option<&str>,
        mut call: F,
    ) -> Result<TurnReport>
    where
        F: FnMut(Vec<Message>, RetryAttempt) -> Fut,
        Fut: Future<Output = std::result::Result<String, E>>,
        E: ClassifyError + Display,
    {
        let handle = self.registry.get(session_id)?;
        let gate = self.registry.turn_gate(session_id)?;
        let _turn = gate.lock().await;

        let (summary, active) = {
            let mut session = lock(&handle)?;
            session.push_message(Message::user(user_text));
            self.select(&mut session)?
        };

        let reply = self
            .retry
            .with_retry(provider, |attempt| call(active.clone(), attempt))
            .await?;

        let message = Message::assistant(reply.clone());
        let reply_id = message.id;
        lock(&handle)?.push_message(message);

        info!(
            category = "app",
            session_id = %session_id,
            active_count = summary.active_count,
            active_tokens = summary.active_token_total,
            "Turn completed"
        );

        Ok(TurnReport {
            summary,
            precount: self.schedule_precount(session_id, reply_id, &reply),
            reply,
            reply_id,
        })
    }

    /// Count tokens for `text` in the background and cache the result on
    /// message `message_id`, unless a count is already cached by then.
    pub fn schedule_precount(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        text: &str,
    ) -> Option<JoinHandle<bool>> {
        let pending = self.precounter.spawn(text)?;
        let registry = Arc::clone(&self.registry);

        Some(tokio::spawn(async move {
            let tokens = match pending.join().await {
                Ok(tokens) => tokens,
                Err(e) => {
                    warn!(category = "app", error = %e, "Background token count failed");
                    return false;
                }
            };
            let Ok(handle) = registry.get(session_id) else {
                return false;
            };
            let Ok(mut session) = handle.lock() else {
                return false;
            };
            match session.messages.iter_mut().find(|m| m.id == message_id) {
                Some(message) if message.tokens.is_none() => {
                    message.tokens = Some(tokens);
                    debug!(%message_id, tokens, "Cached precounted tokens");
                    true
                }
                _ => false,
            }
        }))
    }

    fn select(&self, session: &mut Session) -> Result<(ContextSummary, Vec<Message>)> {
        let summary = self
            .context
            .select_active(&mut session.messages, self.tokenizer.as_ref())?;
        let active = session
            .messages
            .iter()
            .filter(|m| m.active)
            .cloned()
            .collect();
        Ok((summary, active))
    }

    // =========================================================================
    // Tool calls
    // =========================================================================

    /// Recover streamed tool-call arguments.
    pub fn parse_tool_arguments(&self, function: &str, raw: &str) -> Value {
        let value = repair_tool_arguments(raw);
        if RepairOutcome::is_failure_marker(&value) {
            warn!(
                category = "app",
                function,
                length = raw.chars().count(),
                "Tool arguments could not be repaired"
            );
        }
        value
    }

    /// Feed a tool result to the circuit breaker.
    ///
    /// Returns whether tool retries should stop. When this result trips the
    /// breaker, the suggestion is sent to the clients of this session only.
    pub fn handle_tool_result(
        &self,
        session_id: Uuid,
        function: &str,
        result: Option<&str>,
    ) -> Result<bool> {
        let handle = self.registry.get(session_id)?;
        let mut session = lock(&handle)?;

        let registry = &self.registry;
        let mut sink = |event: BreakerEvent| {
            match registry.broadcast(session_id, event.to_json()) {
                Ok(reached) => debug!(
                    category = "app",
                    session_id = %session_id,
                    reached,
                    "Breaker suggestion sent"
                ),
                Err(e) => warn!(
                    category = "app",
                    session_id = %session_id,
                    error = %e,
                    "Breaker suggestion not sent"
                ),
            }
        };

        Ok(self
            .breaker
            .inspect_function_result(&mut session, result, function, Some(&mut sink)))
    }

    pub fn should_retry_tools(&self, session_id: Uuid) -> Result<bool> {
        let handle = self.registry.get(session_id)?;
        let session = lock(&handle)?;
        Ok(!self.breaker.should_stop_for_errors(&session))
    }

    /// Clear tool error tracking, e.g. when the user sends a new request.
    pub fn reset_error_tracking(&self, session_id: Uuid) -> Result<()> {
        let handle = self.registry.get(session_id)?;
        let mut session = lock(&handle)?;
        self.breaker.reset_error_tracking(&mut session);
        Ok(())
    }

    pub fn breaker_state(&self, session_id: Uuid) -> Result<BreakerState> {
        let handle = self.registry.get(session_id)?;
        let session = lock(&handle)?;
        Ok(self.breaker.state(&session))
    }
}

fn lock(handle: &SessionHandle) -> Result<MutexGuard<'_, Session>> {
    handle
        .lock()
        .map_err(|e| ColloquyError::LockPoisoned(e.to_string()))
}
