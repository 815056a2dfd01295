// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user `settings.json` documents.
//!
//! The document is kept as a JSON object so keys written by other clients
//! survive a load/save cycle. Loading self-heals the document against the
//! defaults and writes the healed form back to disk.

use std::collections::BTreeMap;
use std::path::PathBuf;

use mnemo_core::MnemoError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::model::MnemoConfig;
use crate::paths::UserPaths;
use crate::timezone::UserTimezone;

/// Token allowances per prompt section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySettings {
    pub functions: i64,
    pub ltm1: i64,
    pub ltm2: i64,
    pub episodic: i64,
    pub recent: i64,
    pub notes: i64,
    pub input: i64,
    pub output: i64,
    pub max_tokens: i64,
    pub min_tokens: i64,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            functions: 6400,
            ltm1: 2560,
            ltm2: 2560,
            episodic: 2560,
            recent: 2560,
            notes: 2560,
            input: 104_960,
            output: 3840,
            max_tokens: 128_000,
            min_tokens: 500,
        }
    }
}

/// The default settings document for a user.
pub fn default_settings(active_model: &str) -> Map<String, Value> {
    let doc = json!({
        "addons": {},
        "audio": {"voice_input": true, "voice_output": true},
        "avatar": {"avatar": false},
        "language": {"language": "en"},
        "system_prompt": {"system_prompt": "stoic"},
        "cot_enabled": {"cot_enabled": false},
        "verbose": {"verbose": false},
        "timezone": {"timezone": "Auto"},
        "active_model": {"active_model": active_model},
        "memory": MemorySettings::default(),
    });
    match doc {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// JSON kind equality, distinguishing integers from floats.
fn same_kind(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.is_f64() == y.is_f64(),
        _ => std::mem::discriminant(a) == std::mem::discriminant(b),
    }
}

/// Replace missing or mistyped keys with their defaults, one level deep.
///
/// Returns true when anything changed.
pub fn heal(settings: &mut Map<String, Value>, defaults: &Map<String, Value>) -> bool {
    let mut changed = false;
    for (key, default) in defaults {
        match settings.get_mut(key) {
            Some(current) if same_kind(current, default) => {
                if let (Value::Object(current), Value::Object(sub_defaults)) = (current, default) {
                    for (sub_key, sub_default) in sub_defaults {
                        let valid = current
                            .get(sub_key)
                            .is_some_and(|v| same_kind(v, sub_default));
                        if !valid {
                            debug!(key, sub_key, "healing settings sub-key");
                            current.insert(sub_key.clone(), sub_default.clone());
                            changed = true;
                        }
                    }
                }
            }
            _ => {
                debug!(key, "healing settings key");
                settings.insert(key.clone(), default.clone());
                changed = true;
            }
        }
    }
    changed
}

/// Convert a percentage-based memory block to absolute token counts.
///
/// The old format is detected by `ltm1` being a float. Returns true when
/// the block was converted.
pub fn migrate_legacy_memory(settings: &mut Map<String, Value>) -> bool {
    let Some(Value::Object(memory)) = settings.get_mut("memory") else {
        return false;
    };
    if !memory.get("ltm1").is_some_and(Value::is_f64) {
        return false;
    }

    let max_tokens = memory
        .get("max_tokens")
        .and_then(Value::as_f64)
        .unwrap_or(8000.0);
    let fields = [
        ("functions", 0.05),
        ("ltm1", 0.02),
        ("ltm2", 0.02),
        ("episodic", 0.02),
        ("recent", 0.02),
        ("notes", 0.02),
        ("input", 0.82),
        ("output", 0.03),
    ];
    for (field, default_pct) in fields {
        let pct = memory
            .get(field)
            .and_then(Value::as_f64)
            .unwrap_or(default_pct);
        memory.insert(field.to_string(), json!((pct * max_tokens) as i64));
    }
    if let Some(max) = memory.get("max_tokens").and_then(Value::as_f64) {
        memory.insert("max_tokens".to_string(), json!(max as i64));
    }
    debug!(max_tokens, "migrated legacy memory settings");
    true
}

/// A user's settings document with typed accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSettings {
    document: Map<String, Value>,
}

impl UserSettings {
    pub fn from_document(document: Map<String, Value>) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    pub fn into_document(self) -> Map<String, Value> {
        self.document
    }

    fn nested(&self, key: &str) -> Option<&Value> {
        self.document.get(key).and_then(|v| v.get(key))
    }

    fn nested_str(&self, key: &str, default: &'static str) -> &str {
        self.nested(key).and_then(Value::as_str).unwrap_or(default)
    }

    fn nested_bool(&self, key: &str) -> bool {
        self.nested(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn active_model(&self) -> &str {
        self.nested_str("active_model", "gpt-4o")
    }

    pub fn set_active_model(&mut self, model: &str) {
        self.document
            .insert("active_model".into(), json!({"active_model": model}));
    }

    pub fn memory(&self) -> MemorySettings {
        self.document
            .get("memory")
            .cloned()
            .and_then(|v| serde_json::from_value::<PartialMemory>(v).ok())
            .map(PartialMemory::resolve)
            .unwrap_or_default()
    }

    pub fn cot_enabled(&self) -> bool {
        self.nested_bool("cot_enabled")
    }

    pub fn verbose(&self) -> bool {
        self.nested_bool("verbose")
    }

    pub fn system_prompt(&self) -> &str {
        self.nested_str("system_prompt", "stoic")
    }

    pub fn language(&self) -> &str {
        self.nested_str("language", "en")
    }

    pub fn timezone_name(&self) -> &str {
        self.nested_str("timezone", "Auto")
    }

    pub fn timezone(&self) -> UserTimezone {
        UserTimezone::parse(self.timezone_name())
    }

    /// Addon name to enabled flag. Non-boolean entries read as disabled.
    pub fn addons(&self) -> BTreeMap<String, bool> {
        self.document
            .get("addons")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .map(|(k, v)| (k.clone(), v.as_bool().unwrap_or(false)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_addons(&mut self, addons: &BTreeMap<String, bool>) {
        let map: Map<String, Value> = addons
            .iter()
            .map(|(k, v)| (k.clone(), Value::Bool(*v)))
            .collect();
        self.document.insert("addons".into(), Value::Object(map));
    }
}

/// Memory block with every field optional, for tolerant reads.
#[derive(Deserialize)]
struct PartialMemory {
    functions: Option<i64>,
    ltm1: Option<i64>,
    ltm2: Option<i64>,
    episodic: Option<i64>,
    recent: Option<i64>,
    notes: Option<i64>,
    input: Option<i64>,
    output: Option<i64>,
    max_tokens: Option<i64>,
    min_tokens: Option<i64>,
}

impl PartialMemory {
    fn resolve(self) -> MemorySettings {
        let d = MemorySettings::default();
        MemorySettings {
            functions: self.functions.unwrap_or(d.functions),
            ltm1: self.ltm1.unwrap_or(d.ltm1),
            ltm2: self.ltm2.unwrap_or(d.ltm2),
            episodic: self.episodic.unwrap_or(d.episodic),
            recent: self.recent.unwrap_or(d.recent),
            notes: self.notes.unwrap_or(d.notes),
            input: self.input.unwrap_or(d.input),
            output: self.output.unwrap_or(d.output),
            max_tokens: self.max_tokens.unwrap_or(d.max_tokens),
            min_tokens: self.min_tokens.unwrap_or(d.min_tokens),
        }
    }
}

/// Loads and saves settings documents under a users directory.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    users_dir: PathBuf,
    default_model: String,
}

impl SettingsStore {
    pub fn new(users_dir: impl Into<PathBuf>, default_model: impl Into<String>) -> Self {
        Self {
            users_dir: users_dir.into(),
            default_model: default_model.into(),
        }
    }

    pub fn from_config(config: &MnemoConfig) -> Self {
        Self::new(&config.agent.users_dir, config.default_active_model())
    }

    pub fn users_dir(&self) -> &std::path::Path {
        &self.users_dir
    }

    pub fn paths(&self, username: &str) -> UserPaths {
        UserPaths::new(&self.users_dir, username)
    }

    pub fn defaults(&self) -> Map<String, Value> {
        default_settings(&self.default_model)
    }

    /// Load, migrate, heal, and persist a user's settings.
    ///
    /// Missing, empty, or unparseable files yield the defaults.
    pub async fn load(&self, username: &str) -> Result<UserSettings, MnemoError> {
        let paths = self.paths(username);
        tokio::fs::create_dir_all(paths.root()).await?;
        tokio::fs::create_dir_all(paths.data_dir()).await?;

        let settings_file = paths.settings_file();
        let defaults = self.defaults();
        let mut document = match tokio::fs::read_to_string(&settings_file).await {
            Ok(raw) if raw.trim().is_empty() => defaults.clone(),
            Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    warn!(user = username, path = %settings_file.display(), "unreadable settings, using defaults");
                    defaults.clone()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => defaults.clone(),
            Err(e) => return Err(e.into()),
        };

        // Legacy percentages are floats; convert them before healing resets them.
        migrate_legacy_memory(&mut document);
        heal(&mut document, &defaults);

        let settings = UserSettings::from_document(document);
        self.save(username, &settings).await?;
        Ok(settings)
    }

    pub async fn save(&self, username: &str, settings: &UserSettings) -> Result<(), MnemoError> {
        let paths = self.paths(username);
        tokio::fs::create_dir_all(paths.root()).await?;
        let body = serde_json::to_string_pretty(settings.document())?;
        tokio::fs::write(paths.settings_file(), body).await?;
        Ok(())
    }
}
