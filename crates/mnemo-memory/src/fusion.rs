// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory fusion: query the memory categories, deduplicate by id, and trim
//! the results to a token allowance.

use std::collections::HashSet;
use std::sync::Arc;

use mnemo_config::UserTimezone;
use mnemo_context::tokens::{ACCOUNTING_MODEL, count};
use mnemo_context::BrainRole;
use mnemo_core::{MemoryClient, MemoryRecord, Metadata, MnemoError, SearchOptions};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::brain::Brain;

/// Short-term store of raw chat messages.
pub const ACTIVE_BRAIN: &str = "active_brain";
/// Episodic memories.
pub const EPISODIC: &str = "episodic";
/// Distance under which two memories count as the same.
pub const SIMILARITY_THRESHOLD: f64 = 0.15;

/// Output budget of query-generation calls.
const BRAIN_MAX_TOKENS: u32 = 100;
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single memory in a fused result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedEntry {
    /// Store id with leading zeros stripped.
    pub id: String,
    pub document: String,
    /// Distance rounded to 3 decimals.
    pub distance: f64,
    /// Creation time prefixed with a space, or empty.
    pub date: String,
}

impl FusedEntry {
    fn numeric_id(&self) -> u64 {
        self.id.parse().unwrap_or(0)
    }
}

/// Rendered memory block with its token cost.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionResult {
    pub rendered: String,
    pub tokens: usize,
    pub entries: Vec<FusedEntry>,
}

/// Strips leading zeros from a store id, keeping a lone `0`.
pub fn short_id(id: &str) -> String {
    let trimmed = id.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// `({id}) {document} (score: {distance})` per line.
pub fn render_scored(entries: &[FusedEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("({}) {} (score: {})", e.id, e.document, e.distance))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `({id}){date} - {document} (score: {distance})` per line.
pub fn render_dated(entries: &[FusedEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("({}){} - {} (score: {})", e.id, e.date, e.document, e.distance))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Union keyed by id: an id already seen is not re-added. Sorted by numeric id.
pub fn merge(a: &[FusedEntry], b: &[FusedEntry]) -> Vec<FusedEntry> {
    let mut seen = HashSet::new();
    let mut merged: Vec<FusedEntry> = a
        .iter()
        .chain(b)
        .filter(|e| seen.insert(e.id.clone()))
        .cloned()
        .collect();
    merged.sort_by_key(FusedEntry::numeric_id);
    merged
}

/// Evicts the most distant entry until the rendering fits `allowance`.
///
/// A non-positive allowance yields the empty set.
pub fn evict_most_distant(
    mut entries: Vec<FusedEntry>,
    allowance: i64,
    render: fn(&[FusedEntry]) -> String,
) -> FusionResult {
    if allowance <= 0 {
        return FusionResult::default();
    }
    let mut rendered = render(&entries);
    let mut tokens = count(&rendered, ACCOUNTING_MODEL);
    while tokens as i64 > allowance && !entries.is_empty() {
        let worst = entries
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.distance.total_cmp(&b.1.distance))
            .map(|(i, _)| i)
            .unwrap_or(0);
        entries.remove(worst);
        rendered = render(&entries);
        tokens = count(&rendered, ACCOUNTING_MODEL);
    }
    FusionResult {
        rendered,
        tokens,
        entries,
    }
}

/// Drops trailing entries until the rendering fits `allowance`.
pub fn drop_trailing(
    mut entries: Vec<FusedEntry>,
    allowance: i64,
    render: fn(&[FusedEntry]) -> String,
) -> FusionResult {
    if allowance <= 0 {
        return FusionResult::default();
    }
    let mut rendered = render(&entries);
    let mut tokens = count(&rendered, ACCOUNTING_MODEL);
    while tokens as i64 > allowance && entries.pop().is_some() {
        rendered = render(&entries);
        tokens = count(&rendered, ACCOUNTING_MODEL);
    }
    FusionResult {
        rendered,
        tokens,
        entries,
    }
}

/// Query lines from a retriever reply; `label: query` lines lose their label.
///
/// A `none` reply means the message itself is the only query.
pub fn parse_queries(reply: &str, message: &str) -> Vec<String> {
    let source = if reply.trim().eq_ignore_ascii_case("none") {
        message
    } else {
        reply
    };
    source
        .lines()
        .map(|line| match line.split_once(':') {
            Some((_, rest)) => rest.trim_start(),
            None => line,
        })
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .collect()
}

fn category_key(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

/// `(category, query)` pairs from `Category: query` lines.
pub fn parse_category_queries(reply: &str) -> Vec<(String, String)> {
    reply
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match line.split_once(": ") {
            Some((category, query)) if !category.trim().is_empty() => {
                Some((category_key(category), query.trim().to_string()))
            }
            _ => {
                warn!(line, "skipping malformed category query");
                None
            }
        })
        .collect()
}

/// One category per non-empty line.
pub fn parse_categories(reply: &str) -> Vec<String> {
    reply
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(category_key)
        .collect()
}

/// Process trace emitted when the user enabled verbose mode.
#[derive(Debug, Default, Serialize)]
struct ProcessTrace<'a> {
    input: &'a str,
    queries: Vec<(String, String)>,
    similar: Vec<(String, f64)>,
    created_new_memory: String,
    before_trim: Vec<FusedEntry>,
    after_trim: Vec<FusedEntry>,
    token_count: usize,
}

/// Per-request memory pipeline for one user.
#[derive(Clone)]
pub struct MemoryFusion {
    store: Arc<dyn MemoryClient>,
    brain: Brain,
    timezone: UserTimezone,
    verbose: bool,
}

impl MemoryFusion {
    pub fn new(store: Arc<dyn MemoryClient>, brain: Brain, timezone: UserTimezone) -> Self {
        Self {
            store,
            brain,
            timezone,
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn store(&self) -> &Arc<dyn MemoryClient> {
        &self.store
    }

    fn entry(&self, record: MemoryRecord) -> FusedEntry {
        let date = record
            .created_at()
            .map(|ts| format!(" {}", self.timezone.format_timestamp(ts, DATE_FORMAT)))
            .unwrap_or_default();
        FusedEntry {
            id: short_id(&record.id),
            document: record.document,
            distance: round3(record.distance),
            date,
        }
    }

    fn emit(&self, user: &str, kind: &str, trace: &ProcessTrace<'_>) {
        if !self.verbose {
            return;
        }
        match serde_json::to_string(trace) {
            Ok(json) => info!(target: "mnemo::memory::trace", user, kind, trace = %json, "memory process"),
            Err(e) => warn!(error = %e, "failed to serialize memory trace"),
        }
    }

    /// Recall from the active brain, storing `message` when nothing similar exists.
    pub async fn process_active_brain(
        &self,
        user: &str,
        message: &str,
        all_messages: &str,
        allowance: i64,
        metadata: Metadata,
    ) -> Result<FusionResult, MnemoError> {
        let mut trace = ProcessTrace {
            input: message,
            ..ProcessTrace::default()
        };

        let similar = self
            .store
            .search(
                ACTIVE_BRAIN,
                message,
                &SearchOptions::within(SIMILARITY_THRESHOLD, 5),
                Some(user),
            )
            .await?;
        if similar.is_empty() {
            self.store
                .create(ACTIVE_BRAIN, message, metadata, Some(user))
                .await?;
            trace.created_new_memory = "yes".into();
        } else {
            trace.similar = similar.iter().map(|m| (m.id.clone(), m.distance)).collect();
            trace.created_new_memory = "no".into();
        }

        let reply = self
            .brain
            .ask(BrainRole::Retriever, all_messages, user, BRAIN_MAX_TOKENS)
            .await?;
        let options = SearchOptions {
            min_distance: 0.0,
            max_distance: 2.0,
            contains_text: None,
            n_results: 15,
        };

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for query in parse_queries(&reply, message) {
            trace.queries.push((ACTIVE_BRAIN.to_string(), query.clone()));
            for record in self
                .store
                .search(ACTIVE_BRAIN, &query, &options, Some(user))
                .await?
            {
                if seen.insert(record.id.clone()) {
                    entries.push(self.entry(record));
                }
            }
        }
        trace.before_trim = entries.clone();

        let mut result = evict_most_distant(entries, allowance, render_scored);
        result.entries.sort_by_key(FusedEntry::numeric_id);
        result.rendered = render_scored(&result.entries);
        result.tokens = count(&result.rendered, ACCOUNTING_MODEL);

        debug!(user, entries = result.entries.len(), tokens = result.tokens, "active brain recall");
        trace.after_trim = result.entries.clone();
        trace.token_count = result.tokens;
        self.emit(user, "active_brain", &trace);
        Ok(result)
    }

    /// Recall from the categorised long-term memory and file the message
    /// under its categories unless it is already known.
    pub async fn process_incoming_memory(
        &self,
        user: &str,
        message: &str,
        allowance: i64,
        metadata: Metadata,
    ) -> Result<FusionResult, MnemoError> {
        let mut trace = ProcessTrace {
            input: message,
            ..ProcessTrace::default()
        };

        let reply = self
            .brain
            .ask(BrainRole::CategoriseQuery, message, user, BRAIN_MAX_TOKENS)
            .await?;
        let source = if reply.trim().eq_ignore_ascii_case("none") {
            message
        } else {
            reply.as_str()
        };
        let parts = parse_category_queries(source);
        if parts.is_empty() {
            warn!(user, "no category queries in reply");
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for (category, query) in &parts {
            trace.queries.push((category.clone(), query.clone()));
            for record in self
                .store
                .search(category, query, &SearchOptions::within(1.0, 10), Some(user))
                .await?
            {
                if seen.insert(record.id.clone()) {
                    entries.push(self.entry(record));
                }
            }
        }
        trace.before_trim = entries.clone();
        let result = drop_trailing(entries, allowance, render_scored);

        let mut similar = Vec::new();
        for (category, _) in &parts {
            similar.extend(
                self.store
                    .search(
                        category,
                        message,
                        &SearchOptions::within(SIMILARITY_THRESHOLD, 10),
                        Some(user),
                    )
                    .await?,
            );
        }

        if similar.is_empty() {
            let reply = self
                .brain
                .ask(BrainRole::Categorise, message, user, BRAIN_MAX_TOKENS)
                .await?;
            let categories = if reply.trim().eq_ignore_ascii_case("none") {
                Vec::new()
            } else {
                parse_categories(&reply)
            };
            for category in &categories {
                self.store
                    .create(category, message, metadata.clone(), Some(user))
                    .await?;
            }
            debug!(user, categories = ?categories, "message filed");
            trace.created_new_memory = format!("yes, categories: {}", categories.join(", "));
        } else {
            trace.similar = similar.iter().map(|m| (m.id.clone(), m.distance)).collect();
            trace.created_new_memory = "no".into();
        }

        trace.after_trim = result.entries.clone();
        trace.token_count = result.tokens;
        self.emit(user, "incoming_memory", &trace);
        Ok(result)
    }

    /// Episodic recall, returned with the label of the user's timezone.
    pub async fn process_episodic_memory(
        &self,
        user: &str,
        message: &str,
        allowance: i64,
    ) -> Result<(FusionResult, String), MnemoError> {
        let records = self
            .store
            .search(EPISODIC, message, &SearchOptions::within(1.0, 10), Some(user))
            .await?;
        let entries: Vec<_> = records.into_iter().map(|r| self.entry(r)).collect();
        let result = drop_trailing(entries, allowance, render_dated);
        debug!(user, entries = result.entries.len(), tokens = result.tokens, "episodic recall");
        Ok((result, self.timezone.label()))
    }

    /// Stores an assistant reply in the active brain unless a similar one exists.
    pub async fn process_assistant_reply(
        &self,
        user: &str,
        content: &str,
        metadata: Metadata,
    ) -> Result<bool, MnemoError> {
        let created = self
            .store
            .create_unique(ACTIVE_BRAIN, content, metadata, SIMILARITY_THRESHOLD, Some(user))
            .await?;
        debug!(user, stored = created.is_some(), "assistant reply");
        Ok(created.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, document: &str, distance: f64) -> FusedEntry {
        FusedEntry {
            id: id.into(),
            document: document.into(),
            distance,
            date: String::new(),
        }
    }

    #[test]
    fn short_ids_keep_single_zero() {
        assert_eq!(short_id("0000000000000042"), "42");
        assert_eq!(short_id("0000000000000000"), "0");
    }

    #[test]
    fn merge_deduplicates_and_sorts_numerically() {
        let a = vec![entry("10", "ten", 0.2), entry("2", "two", 0.1)];
        let b = vec![entry("2", "two again", 0.3), entry("9", "nine", 0.5)];
        let merged = merge(&a, &b);
        let ids: Vec<_> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["2", "9", "10"]);
        assert_eq!(merged[0].document, "two");
    }

    #[test]
    fn eviction_removes_most_distant_first() {
        let entries = vec![
            entry("1", "close memory about tea", 0.1),
            entry("2", "far memory about the weather in spring", 0.9),
            entry("3", "medium memory about coffee", 0.5),
        ];
        let first_two = render_scored(&[entries[0].clone(), entries[2].clone()]);
        let allowance = count(&first_two, ACCOUNTING_MODEL) as i64;
        let result = evict_most_distant(entries, allowance, render_scored);
        let ids: Vec<_> = result.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["1", "3"]);
        assert!(result.tokens as i64 <= allowance);
    }

    #[test]
    fn non_positive_allowance_is_empty() {
        let result = evict_most_distant(vec![entry("1", "x", 0.1)], 0, render_scored);
        assert!(result.entries.is_empty());
        assert_eq!(result.rendered, "");
        let result = drop_trailing(vec![entry("1", "x", 0.1)], -5, render_dated);
        assert!(result.entries.is_empty());
    }

    #[test]
    fn drop_trailing_keeps_head() {
        let entries: Vec<_> = (1..=20).map(|i| entry(&i.to_string(), "some memory text", 0.3)).collect();
        let result = drop_trailing(entries, 30, render_dated);
        assert!(result.tokens <= 30);
        assert_eq!(result.entries.first().map(|e| e.id.as_str()), Some("1"));
    }

    #[test]
    fn renders_both_formats() {
        let mut e = entry("7", "walked the dog", 0.25);
        assert_eq!(render_scored(&[e.clone()]), "(7) walked the dog (score: 0.25)");
        e.date = " 2024-01-02 03:04:05".into();
        assert_eq!(render_dated(&[e]), "(7) 2024-01-02 03:04:05 - walked the dog (score: 0.25)");
    }

    #[test]
    fn query_parsing() {
        assert_eq!(
            parse_queries("subject: tea\nWhat tea do I like?\n\n", "msg"),
            ["tea", "What tea do I like?"]
        );
        assert_eq!(parse_queries("None", "original message"), ["original message"]);
    }

    #[test]
    fn category_query_parsing_skips_malformed_lines() {
        let parsed = parse_category_queries(
            "Personal Information: my birthday\nnot a pair\nProcedural Knowledge: backup steps",
        );
        assert_eq!(
            parsed,
            [
                ("personal_information".to_string(), "my birthday".to_string()),
                ("procedural_knowledge".to_string(), "backup steps".to_string()),
            ]
        );
        assert_eq!(parse_categories("Factual Information\n\nMeta-knowledge"), [
            "factual_information",
            "meta-knowledge"
        ]);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn eviction_ends_within_allowance(
                distances in proptest::collection::vec(0.0f64..2.0, 0..30),
                allowance in -10i64..200,
            ) {
                let entries: Vec<_> = distances
                    .iter()
                    .enumerate()
                    .map(|(i, d)| entry(&i.to_string(), "memory entry with a few words", *d))
                    .collect();
                let result = evict_most_distant(entries, allowance, render_scored);
                if allowance <= 0 {
                    prop_assert!(result.entries.is_empty());
                } else {
                    prop_assert!(result.tokens as i64 <= allowance);
                }
                let mut ids: Vec<_> = result.entries.iter().map(|e| e.id.clone()).collect();
                let before = ids.len();
                ids.dedup();
                prop_assert_eq!(ids.len(), before);
            }
        }
    }
}
