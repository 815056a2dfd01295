// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recent chat history, bounded by a token allowance.

use mnemo_core::{MemoryRecord, Role};
use tracing::debug;

use crate::prompts::HISTORY_SUFFIX;
use crate::tokens::{ACCOUNTING_MODEL, count};

/// At most this many recent messages are considered.
pub const HISTORY_WINDOW: usize = 100;

/// Allowances at or below this disable history altogether.
pub const MIN_HISTORY_ALLOWANCE: i64 = 100;

/// Author name stored on assistant replies.
pub const ASSISTANT_AUTHOR: &str = "assistant";

/// One stored chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: String,
    pub author: String,
    pub document: String,
    /// Client-side message uid, used to cut history when regenerating.
    pub uid: Option<String>,
}

impl HistoryEntry {
    pub fn role(&self) -> Role {
        if self.author == ASSISTANT_AUTHOR {
            Role::Assistant
        } else {
            Role::User
        }
    }
}

impl From<MemoryRecord> for HistoryEntry {
    fn from(record: MemoryRecord) -> Self {
        let text = |key: &str| {
            record
                .metadata
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        Self {
            author: text("username").unwrap_or_else(|| "user".to_string()),
            uid: text("uid"),
            id: record.id,
            document: record.document,
        }
    }
}

/// Keeps the messages strictly before the one with `uid`.
///
/// When no message matches, the history is returned unchanged.
pub fn truncate_before_uid(entries: Vec<HistoryEntry>, uid: &str) -> Vec<HistoryEntry> {
    match entries.iter().position(|e| e.uid.as_deref() == Some(uid)) {
        Some(index) => entries.into_iter().take(index).collect(),
        None => entries,
    }
}

/// `author: document` per line.
pub fn render(entries: &[HistoryEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.author, e.document))
        .collect::<Vec<_>>()
        .join("\n")
}

/// History that fits the `recent` allowance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecentHistory {
    pub entries: Vec<HistoryEntry>,
    pub rendered: String,
    pub tokens: usize,
}

impl RecentHistory {
    /// Keeps the newest [`HISTORY_WINDOW`] entries, then drops the oldest
    /// until the rendered history fits `allowance`.
    pub fn fit(entries: Vec<HistoryEntry>, allowance: i64) -> Self {
        if allowance <= MIN_HISTORY_ALLOWANCE {
            return Self::default();
        }

        let skip = entries.len().saturating_sub(HISTORY_WINDOW);
        let mut entries: Vec<_> = entries.into_iter().skip(skip).collect();
        let mut rendered = render(&entries);
        let mut tokens = count(&rendered, ACCOUNTING_MODEL);
        debug!(tokens, count = entries.len(), allowance, "recent history");

        while tokens as i64 > allowance && !entries.is_empty() {
            entries.remove(0);
            rendered = render(&entries);
            tokens = count(&rendered, ACCOUNTING_MODEL);
        }
        debug!(tokens, count = entries.len(), "recent history fitted");

        Self {
            entries,
            rendered,
            tokens,
        }
    }

    /// History, the current message, and the reference-only suffix.
    pub fn all_messages(&self, message: &str) -> String {
        format!("{}\n{}{}", self.rendered, message, HISTORY_SUFFIX)
    }
}
