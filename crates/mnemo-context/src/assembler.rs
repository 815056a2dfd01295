// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt assembly: system prompt selection, the start message, and the
//! final chat payload.

use chrono::NaiveDateTime;
use mnemo_config::UserTimezone;
use mnemo_core::ChatMessage;

use crate::history::HistoryEntry;
use crate::prompts;

/// Setting value that selects the base prompt alone.
pub const SYSTEM_PROMPT_NONE: &str = "None";
/// Setting value that selects the stoic persona.
pub const SYSTEM_PROMPT_STOIC: &str = "stoic";

/// Resolves the `system_prompt` setting to prompt text.
///
/// Any value other than `None` or `stoic` is treated as custom persona text.
pub fn select_system_prompt(setting: &str) -> String {
    match setting {
        SYSTEM_PROMPT_NONE => prompts::SYSTEM_PROMPT.to_string(),
        SYSTEM_PROMPT_STOIC => format!("{}\n{}", prompts::STOIC_SYSTEM_PROMPT, prompts::SYSTEM_PROMPT),
        custom => format!("{custom}\n{}", prompts::SYSTEM_PROMPT),
    }
}

/// Leading date line of the system prompt.
///
/// An explicit timestamp (imported or replayed messages) wins over the
/// current time in the user's timezone.
pub fn date_line(timestamp: Option<NaiveDateTime>, timezone: &UserTimezone) -> String {
    match timestamp {
        Some(ts) => format!("Current date: {}", ts.format("%Y-%m-%d %H:%M:%S")),
        None => timezone.now_iso(),
    }
}

/// `Episodic Memory of {tz}:` block, or empty when there is nothing to show.
pub fn episodic_block(timezone_label: &str, memory: &str) -> String {
    let trimmed = memory.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return String::new();
    }
    format!("Episodic Memory of {timezone_label}:\n{memory}\n")
}

/// Episodic memory, observations, and the notes block when present.
pub fn instruction_string(episodic: &str, observations: &str, notes: Option<&str>) -> String {
    let mut instruction = format!("{episodic}\nObservations:\n{observations}\n");
    if let Some(notes) = notes.filter(|n| !n.is_empty()) {
        instruction.push_str(&prompts::notes(notes));
    }
    instruction
}

/// Start message for the system turn.
pub fn full_message(display_name: &str, fused_memory: &str, instruction: &str) -> String {
    prompts::start_message(display_name, fused_memory, instruction)
}

/// Appends an automatically generated image description to the message.
pub fn inject_image_description(message: &str, description: &str) -> String {
    format!("{message}\nAutomatically generated image description:\n{description}")
}

/// Inputs for the final chat payload.
#[derive(Debug, Clone)]
pub struct ChatPrompt<'a> {
    /// Selected system prompt, without the date line.
    pub system_prompt: &'a str,
    pub date_line: &'a str,
    pub full_message: &'a str,
    pub history: &'a [HistoryEntry],
    pub user_message: &'a str,
}

impl ChatPrompt<'_> {
    /// System turn, bounded history, then the user's message.
    pub fn into_messages(self) -> Vec<ChatMessage> {
        let system = format!(
            "{}\n{}\n{}",
            self.date_line, self.system_prompt, self.full_message
        );
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(self.history.iter().map(|entry| ChatMessage {
            role: entry.role(),
            content: entry.document.clone(),
            name: None,
        }));
        messages.push(ChatMessage::user(self.user_message));
        messages
    }
}
