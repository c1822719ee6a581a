//! Message History
//!
//! Ordered transcript with running token accounting and a pair-wise
//! truncation policy. The endpoint reports *cumulative* prompt tokens, so
//! each assistant turn's input cost is the delta against the running total;
//! non-assistant messages are paid for when the next usage report arrives.

use crate::message::{Message, Role, TokenUsage};

/// Placeholder shown to the endpoint in place of removed history.
pub const TRUNCATION_NOTICE: &str = "[Earlier history has been truncated.]";

/// Token cost attributed to the truncation notice itself.
const TRUNCATION_NOTICE_TOKENS: u32 = 7;

/// Rough token estimate at ~4 characters per token.
pub(crate) fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4) as u32
}

/// Conversation transcript with token tracking and context management.
///
/// Owned by exactly one session engine; never mutated by two turn loops.
#[derive(Clone, Debug)]
pub struct History {
    system: String,
    messages: Vec<Message>,

    /// Per-assistant-turn (input, output) token ledger, oldest first
    message_tokens: Vec<(u32, u32)>,

    /// system cost + sum of every ledger entry
    total_tokens: u32,

    /// Maximum tokens retained before truncation must run
    context_window_tokens: u32,
}

impl History {
    pub fn new(system: impl Into<String>, context_window_tokens: u32) -> Self {
        let system = system.into();
        let total_tokens = estimate_tokens(&system);
        Self {
            system,
            messages: Vec::new(),
            message_tokens: Vec::new(),
            total_tokens,
            context_window_tokens,
        }
    }

    /// Append a message, updating the token ledger when an assistant
    /// message arrives together with the endpoint's usage report.
    ///
    /// Other roles do not touch the accounting: their cost is captured by
    /// the next assistant usage report, which covers the whole prompt.
    pub fn push(&mut self, message: Message, usage: Option<&TokenUsage>) {
        tracing::debug!(role = %message.role(), "appending message to history");
        let is_assistant = message.role() == Role::Assistant;
        self.messages.push(message);

        if !is_assistant {
            return;
        }
        let Some(usage) = usage else {
            return;
        };

        let before = self.total_tokens;
        if usage.prompt_tokens < before {
            // Cumulative prompt count fell below the running total; the
            // ledger entry is clamped to zero rather than wrapping.
            tracing::warn!(
                prompt_tokens = usage.prompt_tokens,
                running_total = before,
                "usage report below running total"
            );
        }
        let current_turn_input = usage.prompt_tokens.saturating_sub(before);
        self.message_tokens
            .push((current_turn_input, usage.completion_tokens));
        self.total_tokens += current_turn_input + usage.completion_tokens;
    }

    /// Remove oldest message pairs until the transcript fits the context
    /// window again. No-op while under budget; never reduces the
    /// transcript below two messages.
    pub fn truncate(&mut self) {
        if self.total_tokens <= self.context_window_tokens {
            return;
        }

        while !self.message_tokens.is_empty()
            && self.total_tokens > self.context_window_tokens
            && self.messages.len() > 2
        {
            tracing::debug!(
                total_tokens = self.total_tokens,
                budget = self.context_window_tokens,
                "truncating oldest message pair"
            );
            self.remove_oldest_pair();
        }

        if !self.messages.is_empty() && !self.message_tokens.is_empty() {
            self.messages[0] = Message::user(TRUNCATION_NOTICE);

            let (original_input_tokens, output_tokens) = self.message_tokens[0];
            self.message_tokens[0] = (TRUNCATION_NOTICE_TOKENS, output_tokens);
            self.total_tokens = (self.total_tokens + TRUNCATION_NOTICE_TOKENS)
                .saturating_sub(original_input_tokens);
        }
    }

    /// Remove the leading pair plus any orphaned tool continuations, and
    /// retire the oldest ledger entry.
    fn remove_oldest_pair(&mut self) {
        self.messages.remove(0);
        self.messages.remove(0);

        // Leading tool results belong to a tool-call turn that was just
        // removed; sweep them and substitute an empty user placeholder so
        // the transcript still opens with a non-tool role.
        let mut swept_orphans = false;
        while self
            .messages
            .first()
            .is_some_and(|m| m.role() == Role::Tool)
        {
            self.messages.remove(0);
            swept_orphans = true;
        }
        if swept_orphans {
            self.messages.insert(0, Message::user(""));
        }

        if !self.message_tokens.is_empty() {
            let (input_tokens, output_tokens) = self.message_tokens.remove(0);
            self.total_tokens = self.total_tokens.saturating_sub(input_tokens + output_tokens);
        }
    }

    /// Transcript as the literal completion-request payload: the system
    /// message first, then every message in construction order.
    ///
    /// Pure: repeated calls without intervening mutation return identical
    /// output.
    pub fn format_for_completion(&self) -> Vec<Message> {
        let mut result = Vec::with_capacity(self.messages.len() + 1);
        result.push(Message::system(self.system.clone()));
        result.extend(self.messages.iter().cloned());
        result
    }

    /// Messages currently retained (system excluded)
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Running token total (system included)
    pub fn total_tokens(&self) -> u32 {
        self.total_tokens
    }

    /// Number of retained messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt_tokens: u32, completion_tokens: u32) -> TokenUsage {
        TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// 80 characters estimate to 20 tokens.
    fn history_with_system_cost_20(budget: u32) -> History {
        History::new("x".repeat(80), budget)
    }

    fn push_pair(history: &mut History, n: usize, input: u32, output: u32) {
        let before = history.total_tokens();
        history.push(Message::user(format!("question {n}")), None);
        history.push(
            Message::assistant(format!("answer {n}")),
            Some(&usage(before + input, output)),
        );
    }

    #[test]
    fn test_assistant_usage_updates_ledger() {
        let mut history = history_with_system_cost_20(1000);
        push_pair(&mut history, 1, 40, 10);
        assert_eq!(history.total_tokens(), 70);

        // Non-assistant messages leave the accounting untouched.
        history.push(Message::user("more"), None);
        assert_eq!(history.total_tokens(), 70);
    }

    #[test]
    fn test_truncate_is_noop_under_budget() {
        let mut history = history_with_system_cost_20(1000);
        push_pair(&mut history, 1, 40, 10);
        history.truncate();
        assert_eq!(history.len(), 2);
        assert_eq!(history.total_tokens(), 70);
    }

    #[test]
    fn test_truncate_removes_oldest_pairs_and_rewrites_head() {
        let mut history = history_with_system_cost_20(100);
        for n in 1..=3 {
            push_pair(&mut history, n, 40, 10);
        }
        assert_eq!(history.total_tokens(), 170);

        history.truncate();

        // Two pairs removed, head replaced by the truncation notice, and
        // the surviving ledger entry re-costed at the notice's 7 tokens:
        // 170 - 50 - 50 - 40 + 7 = 37.
        assert_eq!(history.total_tokens(), 37);
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[0].content(), TRUNCATION_NOTICE);
        assert_eq!(history.messages()[0].role(), Role::User);
        assert_eq!(history.messages()[1].content(), "answer 3");

        // Idempotent once under budget.
        history.truncate();
        assert_eq!(history.total_tokens(), 37);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_truncate_never_drops_below_two_messages() {
        let mut history = history_with_system_cost_20(10);
        push_pair(&mut history, 1, 500, 100);
        history.truncate();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_truncate_sweeps_orphaned_tool_messages() {
        let mut history = history_with_system_cost_20(100);
        // Tool-call turn: user, assistant (with calls), two tool results.
        history.push(Message::user("weather?"), None);
        history.push(
            Message::assistant_with_calls("", Vec::new()),
            Some(&usage(60, 10)),
        );
        history.push(Message::tool("call_1", "get_weather", "sunny"), None);
        history.push(Message::tool("call_2", "get_weather", "rainy"), None);
        // Follow-up pair that pushes the total over budget.
        push_pair(&mut history, 2, 80, 10);

        history.truncate();

        // The leading pair removal orphans the tool results; they are swept
        // as a unit and the head becomes a non-tool placeholder.
        assert!(history.messages()[0].role() != Role::Tool);
        assert!(
            history
                .messages()
                .iter()
                .all(|m| m.role() != Role::Tool)
        );
    }

    #[test]
    fn test_format_for_completion_is_pure() {
        let mut history = history_with_system_cost_20(1000);
        push_pair(&mut history, 1, 40, 10);

        let first = serde_json::to_string(&history.format_for_completion()).unwrap();
        let second = serde_json::to_string(&history.format_for_completion()).unwrap();
        assert_eq!(first, second);

        let formatted = history.format_for_completion();
        assert_eq!(formatted[0].role(), Role::System);
        assert_eq!(formatted.len(), history.len() + 1);
    }
}
