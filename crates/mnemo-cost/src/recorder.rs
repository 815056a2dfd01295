// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage recorder: turns a completed model call into statistics rows.
//!
//! For each call the recorder updates lifetime token counters, prices the
//! call, adds it to today's row, bumps lifetime spend, and folds the
//! response time into today's running average.

use async_trait::async_trait;
use mnemo_core::{MnemoError, UsageEvent, UsageSink};
use mnemo_storage::queries::statistics;
use mnemo_storage::{Database, DailyUsage, TokenDelta, TokenTotals, round_usd};
use tracing::info;

use crate::pricing::{calculate_cost, get_pricing, price_tokens};

/// What one recorded call did to a user's numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageReport {
    /// Lifetime counters after this call.
    pub totals: TokenTotals,
    /// Cost of this call.
    pub message_cost: f64,
    /// Lifetime prompt plus completion cost at this model's price.
    pub total_cost: f64,
    /// Today's spend including this call.
    pub daily_cost: f64,
    /// Today's average response time in seconds.
    pub average_response_time: f64,
}

/// Records usage events into the statistics tables.
#[derive(Clone)]
pub struct UsageRecorder {
    db: Database,
}

impl UsageRecorder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn record(&self, event: &UsageEvent) -> Result<UsageReport, MnemoError> {
        let user = event.username.as_str();
        let input = i64::from(event.usage.input_tokens);
        let output = i64::from(event.usage.output_tokens);

        let totals = statistics::update_token_usage(
            &self.db,
            user,
            TokenDelta {
                total_tokens_used: input + output,
                prompt_tokens: input,
                completion_tokens: output,
                voice_usage: 0.0,
            },
        )
        .await?;

        let pricing = get_pricing(&event.model);
        let cost = calculate_cost(&event.usage, &pricing).total;
        let total_cost = price_tokens(totals.prompt_tokens, totals.completion_tokens, &pricing).total;

        let daily_before = statistics::daily_stats(&self.db, user)
            .await?
            .map(|row| row.spending_count)
            .unwrap_or(0.0);
        let daily_cost = daily_before + cost;

        let daily = if event.brain {
            DailyUsage {
                brain_tokens: Some(input),
                spending_count: Some(cost),
                ..DailyUsage::default()
            }
        } else {
            DailyUsage {
                prompt_tokens: Some(input),
                generation_tokens: Some(output),
                spending_count: Some(cost),
                ..DailyUsage::default()
            }
        };
        let today = statistics::add_daily_usage(&self.db, user, daily).await?;

        let lifetime_spend = statistics::statistic(&self.db, user)
            .await?
            .map(|row| row.total_spending_count)
            .unwrap_or(0.0);
        statistics::set_total_spending(&self.db, user, round_usd(lifetime_spend + cost)).await?;

        let total_response_time = today.total_response_time + event.elapsed.as_secs_f64();
        let response_count = today.response_count + 1;
        let average_response_time = total_response_time / response_count as f64;
        statistics::replace_daily_usage(
            &self.db,
            user,
            DailyUsage {
                total_response_time: Some(total_response_time),
                average_response_time: Some(average_response_time),
                response_count: Some(response_count),
                ..DailyUsage::default()
            },
        )
        .await?;

        info!(
            user,
            model = %event.model,
            input_tokens = input,
            output_tokens = output,
            brain = event.brain,
            cost,
            daily_cost,
            "usage recorded"
        );

        Ok(UsageReport {
            totals,
            message_cost: cost,
            total_cost,
            daily_cost,
            average_response_time,
        })
    }
}

#[async_trait]
impl UsageSink for UsageRecorder {
    async fn record_usage(&self, event: UsageEvent) -> Result<(), MnemoError> {
        self.record(&event).await.map(|_| ())
    }
}
