// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running token budget for one request.

use mnemo_core::MnemoError;
use serde::Serialize;
use tracing::debug;

/// Largest context window any supported model accepts.
pub const MAX_CONTEXT_TOKENS: i64 = 128_000;

/// Tokens held back from every budget for provider framing.
pub const RESERVED_TOKENS: i64 = 500;

/// One line of the budget trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Debit {
    pub label: String,
    pub tokens: i64,
    /// Remaining budget after this debit.
    pub remaining: i64,
}

/// Remaining-token ledger.
///
/// Debits never fail on their own; the budget may go negative and is checked
/// once with [`TokenBudget::ensure_non_negative`] before the request is sent.
#[derive(Debug, Clone, Serialize)]
pub struct TokenBudget {
    limit: i64,
    used: i64,
    debits: Vec<Debit>,
}

impl TokenBudget {
    pub fn new(max_tokens: i64) -> Self {
        Self {
            limit: max_tokens.min(MAX_CONTEXT_TOKENS) - RESERVED_TOKENS,
            used: 0,
            debits: Vec::new(),
        }
    }

    pub fn debit(&mut self, label: &str, tokens: usize) {
        let tokens = i64::try_from(tokens).unwrap_or(i64::MAX);
        self.used = self.used.saturating_add(tokens);
        let remaining = self.remaining();
        debug!(label, tokens, remaining, "budget debit");
        self.debits.push(Debit {
            label: label.to_string(),
            tokens,
            remaining,
        });
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn used(&self) -> i64 {
        self.used
    }

    pub fn remaining(&self) -> i64 {
        self.limit.saturating_sub(self.used)
    }

    pub fn debits(&self) -> &[Debit] {
        &self.debits
    }

    /// Fails with [`MnemoError::BudgetExceeded`] once the ledger is overdrawn.
    pub fn ensure_non_negative(&self) -> Result<(), MnemoError> {
        let remaining = self.remaining();
        if remaining < 0 {
            tracing::error!(
                remaining,
                used = self.used,
                debits = ?self.debits,
                "token budget exceeded"
            );
            return Err(MnemoError::BudgetExceeded { remaining });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_capped_and_reserved() {
        assert_eq!(TokenBudget::new(8000).limit(), 7500);
        assert_eq!(TokenBudget::new(1_000_000).limit(), 127_500);
    }

    #[test]
    fn debits_are_traced_in_order() {
        let mut budget = TokenBudget::new(1500);
        budget.debit("functions", 100);
        budget.debit("messages", 250);

        assert_eq!(budget.used(), 350);
        assert_eq!(budget.remaining(), 650);
        let labels: Vec<_> = budget.debits().iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, ["functions", "messages"]);
        assert_eq!(budget.debits()[1].remaining, 650);
        assert!(budget.ensure_non_negative().is_ok());
    }

    #[test]
    fn exactly_zero_is_allowed() {
        let mut budget = TokenBudget::new(1000);
        budget.debit("all", 500);
        assert_eq!(budget.remaining(), 0);
        assert!(budget.ensure_non_negative().is_ok());
    }

    #[test]
    fn overdrawn_budget_is_a_client_error() {
        let mut budget = TokenBudget::new(600);
        budget.debit("history", 101);
        let err = budget.ensure_non_negative().unwrap_err();
        assert!(matches!(err, MnemoError::BudgetExceeded { remaining: -1 }));
        assert_eq!(err.status_code(), 400);
    }
}
