// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model price table and per-message cost calculation.
//!
//! Prices are USD per token. Models not in the table are billed at the
//! fallback rate of $10 / $30 per million input / output tokens.

use mnemo_core::TokenUsage;
use mnemo_storage::round_usd;

/// Per-token pricing in USD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_token: f64,
    pub output_per_token: f64,
}

const FALLBACK: ModelPricing = ModelPricing {
    input_per_token: 0.000_01,
    output_per_token: 0.000_03,
};

const PRICE_TABLE: &[(&str, ModelPricing)] = &[
    (
        "gpt-4o",
        ModelPricing {
            input_per_token: 0.000_005,
            output_per_token: 0.000_015,
        },
    ),
    (
        "gpt-4o-mini",
        ModelPricing {
            input_per_token: 0.000_000_15,
            output_per_token: 0.000_000_6,
        },
    ),
    (
        "gpt-4-turbo",
        ModelPricing {
            input_per_token: 0.000_01,
            output_per_token: 0.000_03,
        },
    ),
    (
        "claude-3-5-sonnet-20240620",
        ModelPricing {
            input_per_token: 0.000_003,
            output_per_token: 0.000_015,
        },
    ),
    (
        "claude-3-opus-20240229",
        ModelPricing {
            input_per_token: 0.000_015,
            output_per_token: 0.000_075,
        },
    ),
];

/// Exact-match lookup, falling back to the default rate.
pub fn get_pricing(model: &str) -> ModelPricing {
    PRICE_TABLE
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, pricing)| *pricing)
        .unwrap_or(FALLBACK)
}

/// Models with a listed price.
pub fn priced_models() -> impl Iterator<Item = &'static str> {
    PRICE_TABLE.iter().map(|(name, _)| *name)
}

/// Cost of one call, each side rounded to 5 decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MessageCost {
    pub input: f64,
    pub output: f64,
    pub total: f64,
}

pub fn price_tokens(input_tokens: i64, output_tokens: i64, pricing: &ModelPricing) -> MessageCost {
    let input = round_usd(input_tokens as f64 * pricing.input_per_token);
    let output = round_usd(output_tokens as f64 * pricing.output_per_token);
    MessageCost {
        input,
        output,
        total: round_usd(input + output),
    }
}

pub fn calculate_cost(usage: &TokenUsage, pricing: &ModelPricing) -> MessageCost {
    price_tokens(
        i64::from(usage.input_tokens),
        i64::from(usage.output_tokens),
        pricing,
    )
}
