// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context budgeting and prompt assembly for the Mnemo agent backend.
//!
//! - [`tokens`]: tiktoken-based counting for text and function schemas
//! - [`budget`]: the per-request remaining-token ledger
//! - [`history`]: recent chat history bounded by the `recent` allowance
//! - [`assembler`]: system prompt selection and the final chat payload
//! - [`prompts`]: prompt templates, including the internal brain roles

pub mod assembler;
pub mod budget;
pub mod history;
pub mod prompts;
pub mod tokens;

pub use assembler::{
    ChatPrompt, date_line, episodic_block, full_message, inject_image_description,
    instruction_string, select_system_prompt,
};
pub use budget::{Debit, TokenBudget};
pub use history::{HistoryEntry, RecentHistory, truncate_before_uid};
pub use prompts::BrainRole;
pub use tokens::{ACCOUNTING_MODEL, count, count_functions};
