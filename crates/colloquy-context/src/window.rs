//! Active-message selection against a token budget.
//!
//! Walks the conversation from newest to oldest and keeps messages while
//! both the token budget and the message-count bound allow. The result is
//! always a contiguous chronological suffix of the non-search history.

use colloquy_core::config::{ContextConfig, OverBudgetPolicy};
use colloquy_core::types::{Message, Role};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ContextError;
use crate::tokenizer::Tokenizer;

/// Outcome of one active-set computation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextSummary {
    /// Number of messages sent to the model this turn.
    pub active_count: usize,
    /// Sum of token counts over the active messages.
    pub active_token_total: usize,
    /// Whether any message's `active` flag was flipped by this call.
    ///
    /// Fresh messages start out active, so appending a message that fits
    /// the budget leaves this `false`. It turns `true` once older messages
    /// drop out of the window or come back into it.
    pub changed: bool,
    pub total_system_tokens: usize,
    pub total_user_tokens: usize,
    pub total_assistant_tokens: usize,
    /// Tokens across every non-search message, active or not.
    pub total_tokens: usize,
    /// Number of non-search messages considered.
    pub message_count: usize,
}

/// Selects the active suffix of a conversation.
#[derive(Debug, Clone, Copy)]
pub struct ContextWindowManager {
    /// Token budget for the assembled context.
    pub max_input_tokens: usize,
    /// Maximum number of active messages. 0 disables the count bound.
    pub context_size: usize,
    pub over_budget_policy: OverBudgetPolicy,
}

impl ContextWindowManager {
    pub fn new(max_input_tokens: usize, context_size: usize) -> Self {
        Self {
            max_input_tokens,
            context_size,
            over_budget_policy: OverBudgetPolicy::default(),
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            max_input_tokens: config.max_input_tokens,
            context_size: config.context_size,
            over_budget_policy: config.over_budget_policy,
        }
    }

    pub fn with_policy(mut self, policy: OverBudgetPolicy) -> Self {
        self.over_budget_policy = policy;
        self
    }

    /// Recompute the `active` flag of every message.
    ///
    /// Search messages are skipped entirely and always left inactive.
    /// Missing token counts are computed once and cached on the message;
    /// a tokenizer failure aborts the whole computation and leaves the
    /// active flags untouched.
    pub fn select_active(
        &self,
        messages: &mut [Message],
        tokenizer: &dyn Tokenizer,
    ) -> Result<ContextSummary, ContextError> {
        for message in messages.iter_mut().filter(|m| !m.is_search()) {
            if message.tokens.is_none() {
                message.tokens = Some(tokenizer.count_tokens(&message.text)?);
            }
        }

        let candidates: Vec<usize> = messages
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.is_search())
            .map(|(i, _)| i)
            .collect();

        let previous: Vec<bool> = candidates.iter().map(|&i| messages[i].active).collect();
        let mut selected = vec![false; candidates.len()];
        let mut active_count = 0;
        let mut active_token_total = 0;

        for (pos, &idx) in candidates.iter().enumerate().rev() {
            if self.context_size > 0 && active_count >= self.context_size {
                break;
            }
            let tokens = messages[idx].tokens.unwrap_or(0);
            if active_token_total + tokens > self.max_input_tokens {
                if active_count == 0 && self.over_budget_policy == OverBudgetPolicy::IncludeLatest
                {
                    warn!(
                        tokens,
                        max_input_tokens = self.max_input_tokens,
                        "Latest message exceeds the token budget on its own; sending it anyway"
                    );
                    selected[pos] = true;
                    active_count = 1;
                    active_token_total = tokens;
                }
                break;
            }
            selected[pos] = true;
            active_count += 1;
            active_token_total += tokens;
        }

        let changed = previous != selected;
        for (&idx, &active) in candidates.iter().zip(&selected) {
            messages[idx].active = active;
        }
        for message in messages.iter_mut().filter(|m| m.is_search()) {
            message.active = false;
        }

        let mut summary = ContextSummary {
            active_count,
            active_token_total,
            changed,
            message_count: candidates.len(),
            ..Default::default()
        };
        for &idx in &candidates {
            let tokens = messages[idx].tokens.unwrap_or(0);
            summary.total_tokens += tokens;
            match messages[idx].role {
                Role::System => summary.total_system_tokens += tokens,
                Role::User => summary.total_user_tokens += tokens,
                Role::Assistant => summary.total_assistant_tokens += tokens,
                Role::Search => {}
            }
        }

        debug!(
            active_count,
            active_token_total,
            message_count = summary.message_count,
            changed,
            "Context window computed"
        );

        Ok(summary)
    }
}

/// Compute the active set with the default over-budget policy.
pub fn select_active(
    messages: &mut [Message],
    max_input_tokens: usize,
    context_size: usize,
    tokenizer: &dyn Tokenizer,
) -> Result<ContextSummary, ContextError> {
    ContextWindowManager::new(max_input_tokens, context_size).select_active(messages, tokenizer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// One token per whitespace-separated word.
    fn words(text: &str) -> Result<usize, ContextError> {
        Ok(text.split_whitespace().count())
    }

    fn unavailable(_: &str) -> Result<usize, ContextError> {
        Err(ContextError::TokenizerUnavailable("encoding not loaded".to_string()))
    }

    fn msgs(token_counts: &[usize]) -> Vec<Message> {
        token_counts
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                let msg = if i % 2 == 0 {
                    Message::user(format!("message {}", i))
                } else {
                    Message::assistant(format!("message {}", i))
                };
                msg.with_tokens(n)
            })
            .collect()
    }

    fn active_flags(messages: &[Message]) -> Vec<bool> {
        messages.iter().map(|m| m.active).collect()
    }

    // ---- Budget ----

    #[test]
    fn test_all_messages_fit() {
        let mut messages = msgs(&[10, 20, 30]);
        let summary = select_active(&mut messages, 100, 10, &words).unwrap();
        assert_eq!(summary.active_count, 3);
        assert_eq!(summary.active_token_total, 60);
        assert!(!summary.changed);
        assert_eq!(active_flags(&messages), vec![true, true, true]);
    }

    #[test]
    fn test_oldest_messages_dropped_over_budget() {
        let mut messages = msgs(&[50, 30, 40, 20]);
        let summary = select_active(&mut messages, 100, 10, &words).unwrap();
        assert_eq!(summary.active_count, 3);
        assert_eq!(summary.active_token_total, 90);
        assert!(summary.changed);
        assert_eq!(active_flags(&messages), vec![false, true, true, true]);
    }

    #[test]
    fn test_budget_boundary_is_inclusive() {
        let mut messages = msgs(&[40, 60]);
        let summary = select_active(&mut messages, 100, 10, &words).unwrap();
        assert_eq!(summary.active_count, 2);
        assert_eq!(summary.active_token_total, 100);
    }

    #[test]
    fn test_selection_is_contiguous_suffix() {
        // The 5-token message at index 0 would fit on its own, but anything
        // older than the first rejected message must stay inactive.
        let mut messages = msgs(&[5, 80, 30, 40]);
        select_active(&mut messages, 100, 10, &words).unwrap();
        assert_eq!(active_flags(&messages), vec![false, false, true, true]);
    }

    // ---- Message count ----

    #[test]
    fn test_context_size_limits_count() {
        let mut messages = msgs(&[1, 1, 1, 1, 1]);
        let summary = select_active(&mut messages, 100, 2, &words).unwrap();
        assert_eq!(summary.active_count, 2);
        assert_eq!(active_flags(&messages), vec![false, false, false, true, true]);
    }

    #[test]
    fn test_zero_context_size_disables_count_bound() {
        let mut messages = msgs(&[1, 1, 1, 1, 1]);
        let summary = select_active(&mut messages, 100, 0, &words).unwrap();
        assert_eq!(summary.active_count, 5);
    }

    // ---- Over-budget latest message ----

    #[test]
    fn test_single_over_budget_message_included_by_default() {
        let mut messages = msgs(&[10, 500]);
        let summary = select_active(&mut messages, 100, 10, &words).unwrap();
        assert_eq!(summary.active_count, 1);
        assert_eq!(summary.active_token_total, 500);
        assert_eq!(active_flags(&messages), vec![false, true]);
    }

    #[test]
    fn test_single_over_budget_message_excluded_by_policy() {
        let mut messages = msgs(&[10, 500]);
        let manager =
            ContextWindowManager::new(100, 10).with_policy(OverBudgetPolicy::Exclude);
        let summary = manager.select_active(&mut messages, &words).unwrap();
        assert_eq!(summary.active_count, 0);
        assert_eq!(summary.active_token_total, 0);
        assert_eq!(active_flags(&messages), vec![false, false]);
    }

    // ---- Search messages ----

    #[test]
    fn test_search_messages_excluded() {
        let mut messages = vec![
            Message::user("hello there").with_tokens(2),
            Message::search("lots of search results").with_tokens(1000),
            Message::assistant("hi").with_tokens(1),
        ];
        let summary = select_active(&mut messages, 10, 10, &words).unwrap();
        assert_eq!(summary.active_count, 2);
        assert_eq!(summary.active_token_total, 3);
        assert_eq!(summary.message_count, 2);
        assert!(!messages[1].active);
        assert!(messages[0].active && messages[2].active);
    }

    #[test]
    fn test_search_messages_never_tokenized() {
        let calls = AtomicUsize::new(0);
        let counting = |text: &str| -> Result<usize, ContextError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.len())
        };
        let mut messages = vec![Message::search("results"), Message::user("hi")];
        select_active(&mut messages, 100, 10, &counting).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(messages[0].tokens.is_none());
    }

    // ---- Token caching ----

    #[test]
    fn test_token_counts_are_memoized() {
        let calls = AtomicUsize::new(0);
        let counting = |text: &str| -> Result<usize, ContextError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.split_whitespace().count())
        };
        let mut messages = vec![Message::user("one two"), Message::assistant("three")];

        select_active(&mut messages, 100, 10, &counting).unwrap();
        select_active(&mut messages, 100, 10, &counting).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(messages[0].tokens, Some(2));
        assert_eq!(messages[1].tokens, Some(1));
    }

    #[test]
    fn test_tokenizer_failure_propagates() {
        let mut messages = vec![Message::user("hello")];
        let result = select_active(&mut messages, 100, 10, &unavailable);
        assert!(matches!(result, Err(ContextError::TokenizerUnavailable(_))));
        assert!(messages[0].tokens.is_none());
    }

    // ---- Change detection ----

    #[test]
    fn test_second_call_reports_unchanged() {
        let mut messages = msgs(&[50, 30, 40, 20]);
        let first = select_active(&mut messages, 100, 10, &words).unwrap();
        let second = select_active(&mut messages, 100, 10, &words).unwrap();
        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(first.active_count, second.active_count);
    }

    #[test]
    fn test_new_message_shifting_window_reports_change() {
        let mut messages = msgs(&[40, 40]);
        select_active(&mut messages, 100, 10, &words).unwrap();

        messages.push(Message::user("next").with_tokens(40));
        let summary = select_active(&mut messages, 100, 10, &words).unwrap();
        assert!(summary.changed);
        assert_eq!(active_flags(&messages), vec![false, true, true]);
    }

    #[test]
    fn test_appending_message_that_fits_reports_unchanged() {
        let mut messages = msgs(&[10, 10]);
        select_active(&mut messages, 100, 10, &words).unwrap();

        messages.push(Message::user("next").with_tokens(10));
        let summary = select_active(&mut messages, 100, 10, &words).unwrap();
        assert_eq!(summary.active_count, 3);
        assert!(!summary.changed);
    }

    #[test]
    fn test_previously_dropped_message_returning_reports_change() {
        let mut messages = msgs(&[40, 40, 40]);
        select_active(&mut messages, 100, 10, &words).unwrap();
        assert_eq!(active_flags(&messages), vec![false, true, true]);

        let summary = select_active(&mut messages, 200, 10, &words).unwrap();
        assert!(summary.changed);
        assert_eq!(active_flags(&messages), vec![true, true, true]);
    }

    // ---- Statistics ----

    #[test]
    fn test_role_token_totals() {
        let mut messages = vec![
            Message::system("be brief").with_tokens(5),
            Message::user("question").with_tokens(10),
            Message::assistant("answer").with_tokens(20),
            Message::search("web").with_tokens(99),
        ];
        let summary = select_active(&mut messages, 1000, 10, &words).unwrap();
        assert_eq!(summary.total_system_tokens, 5);
        assert_eq!(summary.total_user_tokens, 10);
        assert_eq!(summary.total_assistant_tokens, 20);
        assert_eq!(summary.total_tokens, 35);
        assert_eq!(summary.message_count, 3);
    }

    #[test]
    fn test_empty_history() {
        let mut messages: Vec<Message> = Vec::new();
        let summary = select_active(&mut messages, 100, 10, &words).unwrap();
        assert_eq!(summary, ContextSummary::default());
    }

    // ---- Invariants over many shapes ----

    #[test]
    fn test_budget_invariants_hold_for_varied_histories() {
        let shapes: Vec<Vec<usize>> = vec![
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
            vec![100, 1, 100, 1, 100],
            vec![33, 33, 33, 33],
            vec![250],
            vec![0, 0, 0, 200, 0],
            vec![60, 60, 60, 60, 60, 60],
        ];
        for max in [0usize, 1, 50, 100, 150] {
            for size in [1usize, 2, 3, 10] {
                for shape in &shapes {
                    let mut messages = msgs(shape);
                    let summary = select_active(&mut messages, max, size, &words).unwrap();
                    let flags = active_flags(&messages);

                    let first_active = flags.iter().position(|&a| a);
                    if let Some(start) = first_active {
                        assert!(flags[start..].iter().all(|&a| a), "not a suffix: {:?}", flags);
                    }
                    assert!(summary.active_count <= size);
                    assert!(
                        summary.active_token_total <= max || summary.active_count == 1,
                        "budget exceeded with {} messages",
                        summary.active_count
                    );
                }
            }
        }
    }
}
