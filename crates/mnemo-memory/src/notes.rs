// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user note files and the LLM-driven note taker.

use std::path::{Path, PathBuf};

use chrono::Utc;
use mnemo_config::{UserPaths, UserTimezone};
use mnemo_context::BrainRole;
use mnemo_core::MnemoError;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::brain::Brain;

/// Attempts at getting parseable actions out of the note taker.
pub const MAX_NOTE_ATTEMPTS: usize = 5;
const NOTETAKER_MAX_TOKENS: u32 = 1000;

/// One action requested by the note taker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteAction {
    pub action: String,
    pub file: String,
    pub content: String,
}

/// Result of applying a batch of actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// All actions ran; `errors` lists the ones that could not be applied.
    Applied { errors: Vec<String> },
    /// A `read` action ended the batch with this file content.
    Read(String),
}

/// Escapes raw newlines inside JSON string literals.
fn escape_newlines_in_strings(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in raw.chars() {
        match c {
            '\n' if in_string => out.push_str("\\n"),
            '\r' if in_string => out.push_str("\\r"),
            '"' if !escaped => {
                in_string = !in_string;
                out.push(c);
            }
            _ => out.push(c),
        }
        escaped = c == '\\' && !escaped;
    }
    out
}

fn action_from(value: &Value) -> Option<NoteAction> {
    let field = |key: &str| match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => Some(String::new()),
        other => Some(other.to_string()),
    };
    Some(NoteAction {
        action: field("action")?,
        file: field("file")?,
        content: field("content")?,
    })
}

/// Parses a note-taker reply into actions.
///
/// The reply may be a list of objects or a single object, with or without
/// the surrounding brackets. Objects missing `action`, `file` or `content`
/// are skipped with a warning.
pub fn parse_note_actions(reply: &str) -> Result<Vec<NoteAction>, serde_json::Error> {
    let mut text = escape_newlines_in_strings(reply.trim());
    if !text.starts_with('[') {
        text.insert(0, '[');
    }
    if !text.ends_with(']') {
        text.push(']');
    }
    let parsed: Value = serde_json::from_str(&text)?;
    let items = match parsed {
        Value::Array(items) => items,
        single => vec![single],
    };
    Ok(items
        .iter()
        .flat_map(|item| match item {
            Value::Array(inner) => inner.clone(),
            other => vec![other.clone()],
        })
        .filter_map(|item| {
            let action = action_from(&item);
            if action.is_none() {
                warn!(item = %item, "note action is missing action, file or content");
            }
            action
        })
        .collect())
}

fn valid_file_name(file: &str) -> bool {
    !file.is_empty()
        && file != "."
        && !file.contains("..")
        && !file.contains('/')
        && !file.contains('\\')
}

/// Note files of one user.
#[derive(Debug, Clone)]
pub struct NoteStore {
    dir: PathBuf,
}

impl NoteStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn for_user(paths: &UserPaths) -> Self {
        Self::new(paths.notes_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Note file names in name order.
    pub async fn list(&self) -> Result<Vec<String>, MnemoError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn read(&self, file: &str) -> Result<Option<String>, MnemoError> {
        if !valid_file_name(file) {
            return Ok(None);
        }
        match tokio::fs::read_to_string(self.dir.join(file)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// `{file}:\n{content}\n\n` for every note.
    pub async fn read_all(&self) -> Result<String, MnemoError> {
        let mut out = String::new();
        for name in self.list().await? {
            let content = self.read(&name).await?.unwrap_or_default();
            out.push_str(&format!("{name}:\n{content}\n\n"));
        }
        Ok(out)
    }

    /// Notes under `--- {file} ---` headers, trimmed.
    pub async fn notes_as_string(&self) -> Result<String, MnemoError> {
        let mut out = String::new();
        for name in self.list().await? {
            let content = self.read(&name).await?.unwrap_or_default();
            out.push_str(&format!("--- {name} ---\n{content}\n\n"));
        }
        Ok(out.trim().to_string())
    }

    async fn append(&self, path: &Path, content: &str) -> Result<(), MnemoError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let non_empty = file.metadata().await?.len() > 0;
        if non_empty && !content.starts_with('\n') {
            file.write_all(b"\n").await?;
        }
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn remove_lines(&self, path: &Path, content: &str) -> Result<(), MnemoError> {
        let existing = tokio::fs::read_to_string(path).await?;
        let kept: String = existing
            .split_inclusive('\n')
            .filter(|line| line.trim_end_matches('\n') != content)
            .collect();
        tokio::fs::write(path, kept).await?;
        Ok(())
    }

    /// Applies actions in order. A `read` ends the batch immediately.
    pub async fn apply(&self, actions: &[NoteAction]) -> Result<ApplyOutcome, MnemoError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut errors = Vec::new();
        for action in actions {
            if action.action != "skip" && !valid_file_name(&action.file) {
                warn!(file = %action.file, "rejected note file name");
                errors.push(format!("Error: Invalid file name {}", action.file));
                continue;
            }
            let path = self.dir.join(&action.file);
            debug!(action = %action.action, file = %action.file, "note action");
            match action.action.as_str() {
                "create" | "update" => tokio::fs::write(&path, &action.content).await?,
                "add" => self.append(&path, &action.content).await?,
                "read" => {
                    return Ok(match self.read(&action.file).await? {
                        Some(content) => ApplyOutcome::Read(content),
                        None => ApplyOutcome::Read("Error: File does not exist".to_string()),
                    });
                }
                "delete" => {
                    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                        errors.push(format!("Error: File {} does not exist", action.file));
                    } else if action.content.is_empty() {
                        tokio::fs::remove_file(&path).await?;
                    } else {
                        self.remove_lines(&path, &action.content).await?;
                    }
                }
                "skip" => {}
                other => {
                    warn!(action = other, "invalid note action");
                    errors.push("Error: Invalid action".to_string());
                }
            }
        }
        Ok(ApplyOutcome::Applied { errors })
    }
}

/// Keeps the user's notes up to date from the conversation.
#[derive(Clone)]
pub struct NoteTaker {
    store: NoteStore,
    brain: Brain,
    timezone: UserTimezone,
    verbose: bool,
}

impl NoteTaker {
    pub fn new(store: NoteStore, brain: Brain, timezone: UserTimezone) -> Self {
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

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    /// Asks the note taker what to change, applies it, and returns all notes.
    pub async fn take_notes(
        &self,
        user: &str,
        content: &str,
        message: &str,
    ) -> Result<String, MnemoError> {
        let notes = self.store.read_all().await?;
        let timestamp = self
            .timezone
            .localize(Utc::now())
            .format("%d/%m/%Y %H:%M:%S");
        let prompt = format!(
            "Current Time: {timestamp}\nCurrent Notes:\n{notes}\n\nRelated messages:\n{content}\n\nLast Message:{message}\n"
        );

        let mut actions = None;
        for attempt in 1..=MAX_NOTE_ATTEMPTS {
            let reply = self
                .brain
                .ask(BrainRole::Notetaker, &prompt, user, NOTETAKER_MAX_TOKENS)
                .await?;
            match parse_note_actions(&reply) {
                Ok(parsed) => {
                    actions = Some(parsed);
                    break;
                }
                Err(e) => warn!(user, attempt, error = %e, "note taker reply is not valid JSON"),
            }
        }
        let Some(actions) = actions else {
            error!(user, attempts = MAX_NOTE_ATTEMPTS, "note taking gave up");
            return self.store.read_all().await;
        };

        let outcome = self.store.apply(&actions).await?;
        if self.verbose {
            let json = serde_json::to_string(&actions).unwrap_or_default();
            info!(target: "mnemo::memory::trace", user, kind = "note_taking", actions = %json, outcome = ?outcome, "note taking");
        }
        match outcome {
            ApplyOutcome::Read(content) => Ok(content),
            ApplyOutcome::Applied { errors } => {
                for e in &errors {
                    warn!(user, error = %e, "note action failed");
                }
                self.store.read_all().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn action(action: &str, file: &str, content: &str) -> NoteAction {
        NoteAction {
            action: action.into(),
            file: file.into(),
            content: content.into(),
        }
    }

    #[test]
    fn parses_list_single_object_and_raw_newlines() {
        let list = parse_note_actions(r#"[{"action": "create", "file": "todo", "content": "a"}]"#).unwrap();
        assert_eq!(list, [action("create", "todo", "a")]);

        let single = parse_note_actions(r#"{"action": "skip", "file": "", "content": ""}"#).unwrap();
        assert_eq!(single.len(), 1);

        let multiline = parse_note_actions(
            "[\n  {\"action\": \"update\", \"file\": \"shop\", \"content\": \"milk\neggs\"}\n]",
        )
        .unwrap();
        assert_eq!(multiline[0].content, "milk\neggs");
    }

    #[test]
    fn incomplete_objects_are_skipped() {
        let parsed = parse_note_actions(r#"[{"action": "add"}, {"action": "add", "file": "f", "content": "x"}]"#).unwrap();
        assert_eq!(parsed, [action("add", "f", "x")]);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_note_actions("I could not decide").is_err());
    }

    #[tokio::test]
    async fn apply_add_create_and_delete() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path().join("notes"));

        store
            .apply(&[
                action("create", "shop", "milk"),
                action("add", "shop", "eggs"),
                action("add", "shop", "bread"),
                action("delete", "shop", "eggs"),
            ])
            .await
            .unwrap();
        assert_eq!(store.read("shop").await.unwrap().unwrap(), "milk\nbread");

        store.apply(&[action("delete", "shop", "")]).await.unwrap();
        assert!(store.read("shop").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_a_missing_note_is_reported_and_the_batch_continues() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path().join("notes"));
        let outcome = store
            .apply(&[
                action("delete", "ghost", ""),
                action("delete", "ghost", "line"),
                action("create", "kept", "yes"),
            ])
            .await
            .unwrap();

        let ApplyOutcome::Applied { errors } = outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!(errors, ["Error: File ghost does not exist"; 2]);
        assert_eq!(store.read("kept").await.unwrap().as_deref(), Some("yes"));
    }

    #[tokio::test]
    async fn read_short_circuits_and_bad_actions_are_collected() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());
        let outcome = store
            .apply(&[
                action("create", "a", "alpha"),
                action("explode", "a", ""),
                action("create", "../escape", "x"),
            ])
            .await
            .unwrap();
        let ApplyOutcome::Applied { errors } = outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!(errors.len(), 2);
        assert!(!dir.path().parent().unwrap().join("escape").exists());

        let outcome = store
            .apply(&[action("read", "a", ""), action("delete", "a", "")])
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Read("alpha".into()));
        assert!(store.read("a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn read_all_and_headers_are_name_ordered() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());
        store
            .apply(&[action("create", "b", "second"), action("create", "a", "first")])
            .await
            .unwrap();
        assert_eq!(store.read_all().await.unwrap(), "a:\nfirst\n\nb:\nsecond\n\n");
        assert_eq!(
            store.notes_as_string().await.unwrap(),
            "--- a ---\nfirst\n\n--- b ---\nsecond"
        );
    }
}
