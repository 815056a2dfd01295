// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-request state shared by the dispatcher and chain-of-thought mode.

/// Upper bound on function calls chained from a single reply.
pub const MAX_NESTED_CALLS: u32 = 3;

/// Everything one request needs to issue follow-up turns.
///
/// Lives for a single `process_message` call, so counters never leak
/// between requests or users.
#[derive(Debug, Clone)]
pub struct RequestState {
    pub user: String,
    pub chat_id: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    cot_rounds: u32,
    max_cot_rounds: u32,
    nested_calls: u32,
}

impl RequestState {
    pub fn new(user: impl Into<String>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            user: user.into(),
            chat_id: None,
            model: model.into(),
            max_tokens,
            cot_rounds: 0,
            max_cot_rounds: 1,
            nested_calls: 0,
        }
    }

    pub fn with_chat_id(mut self, chat_id: Option<String>) -> Self {
        self.chat_id = chat_id;
        self
    }

    /// Caps chain-of-thought rounds; at least one round always runs.
    pub fn with_max_cot_rounds(mut self, rounds: u32) -> Self {
        self.max_cot_rounds = rounds.max(1);
        self
    }

    /// OpenAI models take function results as a `function` turn.
    pub fn is_gpt(&self) -> bool {
        self.model.starts_with("gpt")
    }

    /// Starts a chain-of-thought round, or returns `false` at the cap.
    pub fn begin_cot_round(&mut self) -> bool {
        if self.cot_rounds >= self.max_cot_rounds {
            return false;
        }
        self.cot_rounds += 1;
        true
    }

    pub fn cot_rounds(&self) -> u32 {
        self.cot_rounds
    }

    /// Counts a dispatched function call, or returns `false` at the cap.
    pub fn enter_call(&mut self) -> bool {
        if self.nested_calls >= MAX_NESTED_CALLS {
            return false;
        }
        self.nested_calls += 1;
        true
    }

    /// Resets the nesting counter before an unrelated top-level call.
    pub fn reset_calls(&mut self) {
        self.nested_calls = 0;
    }

    pub fn nested_calls(&self) -> u32 {
        self.nested_calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cot_rounds_are_capped() {
        let mut state = RequestState::new("ada", "gpt-4o", 1000).with_max_cot_rounds(2);
        assert!(state.begin_cot_round());
        assert!(state.begin_cot_round());
        assert!(!state.begin_cot_round());
        assert_eq!(state.cot_rounds(), 2);
    }

    #[test]
    fn zero_rounds_still_runs_once() {
        let mut state = RequestState::new("ada", "gpt-4o", 1000).with_max_cot_rounds(0);
        assert!(state.begin_cot_round());
        assert!(!state.begin_cot_round());
    }

    #[test]
    fn nested_calls_stop_at_three() {
        let mut state = RequestState::new("ada", "claude-3-haiku", 1000);
        for _ in 0..MAX_NESTED_CALLS {
            assert!(state.enter_call());
        }
        assert!(!state.enter_call());
        state.reset_calls();
        assert!(state.enter_call());
        assert!(!state.is_gpt());
    }
}
