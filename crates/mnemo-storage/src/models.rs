// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for the statistics tables.

use serde::Serialize;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub display_name: Option<String>,
}

/// Lifetime totals for one user (`statistics` row).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub user_id: i64,
    pub amount_of_messages: i64,
    pub total_tokens_used: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub voice_usage: f64,
    pub total_spending_count: f64,
    pub total_average_response_time: f64,
}

/// One user's counters for one day (`daily_stats` row).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyStats {
    pub id: i64,
    pub user_id: i64,
    pub timestamp: String,
    pub message_amount: i64,
    pub prompt_tokens: i64,
    pub generation_tokens: i64,
    pub brain_tokens: i64,
    pub spending_count: f64,
    pub total_response_time: f64,
    pub average_response_time: f64,
    pub response_count: i64,
}

/// Increment applied to a user's lifetime token counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TokenDelta {
    pub total_tokens_used: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub voice_usage: f64,
}

/// Lifetime token counters after an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TokenTotals {
    pub total_tokens_used: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub voice_usage: f64,
}

/// Daily columns to add to or overwrite. `None` leaves a column untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyUsage {
    pub message_amount: Option<i64>,
    pub prompt_tokens: Option<i64>,
    pub generation_tokens: Option<i64>,
    pub brain_tokens: Option<i64>,
    pub spending_count: Option<f64>,
    pub total_response_time: Option<f64>,
    pub average_response_time: Option<f64>,
    pub response_count: Option<i64>,
}

impl DailyUsage {
    /// Column/value pairs for the fields that are set.
    pub(crate) fn columns(&self) -> Vec<(&'static str, rusqlite::types::Value)> {
        use rusqlite::types::Value;

        let ints = [
            ("message_amount", self.message_amount),
            ("prompt_tokens", self.prompt_tokens),
            ("generation_tokens", self.generation_tokens),
            ("brain_tokens", self.brain_tokens),
            ("response_count", self.response_count),
        ];
        let reals = [
            ("spending_count", self.spending_count),
            ("total_response_time", self.total_response_time),
            ("average_response_time", self.average_response_time),
        ];

        ints.into_iter()
            .filter_map(|(col, v)| v.map(|v| (col, Value::Integer(v))))
            .chain(
                reals
                    .into_iter()
                    .filter_map(|(col, v)| v.map(|v| (col, Value::Real(v)))),
            )
            .collect()
    }
}

/// Sums across all users.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GlobalStatistics {
    pub total_messages: i64,
    pub total_tokens: i64,
    pub total_prompt_tokens: i64,
    pub total_completion_tokens: i64,
    pub total_voice_usage: f64,
    pub total_spending: f64,
    pub average_response_time: f64,
}

/// A page row: every user, with statistics when they have any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStatisticsRow {
    pub user_id: i64,
    pub username: String,
    pub role: String,
    pub statistics: Option<Statistics>,
}

/// A lifetime statistics row together with its username.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedStatistics {
    pub username: String,
    #[serde(flatten)]
    pub statistics: Statistics,
}
