// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed memory store.
//!
//! Documents are grouped by user namespace and category. Similarity is a
//! lexical cosine distance over lowercase word counts: 0.0 for the same
//! words, 1.0 for no shared words. Ids are row ids rendered as 16-digit
//! zero-padded strings.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use mnemo_core::{
    AdapterType, HealthStatus, MemoryClient, MemoryRecord, Metadata, MnemoError, PluginAdapter,
    SearchOptions,
};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace TEXT NOT NULL,
    category TEXT NOT NULL,
    document TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memories_scope ON memories(namespace, category);
";

fn storage_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> MnemoError {
    MnemoError::Storage {
        source: Box::new(e),
    }
}

fn namespace(user: Option<&str>) -> String {
    user.unwrap_or_default().to_string()
}

/// Renders a row id the way the store hands ids out.
pub fn format_id(id: i64) -> String {
    format!("{id:016}")
}

fn parse_id(id: &str) -> Option<i64> {
    id.trim().parse().ok()
}

fn now_unix() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}

fn word_counts(text: &str) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        *counts.entry(word.to_lowercase()).or_insert(0.0) += 1.0;
    }
    counts
}

/// Cosine distance between the word-count vectors of two texts.
pub fn lexical_distance(a: &str, b: &str) -> f64 {
    let a = word_counts(a);
    let b = word_counts(b);
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    if a.is_empty() || b.is_empty() {
        return 1.0;
    }
    let dot: f64 = a
        .iter()
        .filter_map(|(word, x)| b.get(word).map(|y| x * y))
        .sum();
    let norm = |v: &HashMap<String, f64>| v.values().map(|x| x * x).sum::<f64>().sqrt();
    (1.0 - dot / (norm(&a) * norm(&b))).clamp(0.0, 1.0)
}

/// One entry of an export file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExportedMemory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    category: String,
    document: String,
    #[serde(default)]
    metadata: Metadata,
}

struct Row {
    id: i64,
    category: String,
    document: String,
    metadata: String,
}

fn parse_metadata(id: i64, raw: &str) -> Metadata {
    match serde_json::from_str(raw) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(id, error = %e, "unreadable memory metadata");
            Metadata::new()
        }
    }
}

impl Row {
    fn into_record(self, distance: f64) -> MemoryRecord {
        let metadata = parse_metadata(self.id, &self.metadata);
        MemoryRecord {
            id: format_id(self.id),
            document: self.document,
            metadata,
            distance,
        }
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok(Row {
        id: row.get(0)?,
        category: row.get(1)?,
        document: row.get(2)?,
        metadata: row.get(3)?,
    })
}

/// Memory store kept in its own SQLite database.
#[derive(Clone)]
pub struct SqliteMemoryStore {
    conn: Connection,
}

impl SqliteMemoryStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, MnemoError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(path).await.map_err(MnemoError::storage)?;
        let store = Self { conn };
        store.init().await?;
        info!(path = %path.display(), "memory store opened");
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self, MnemoError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(MnemoError::storage)?;
        let store = Self { conn };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), MnemoError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                conn.execute_batch(SCHEMA)
            })
            .await
            .map_err(storage_err)
    }

    async fn rows(
        &self,
        category: Option<&str>,
        user: Option<&str>,
    ) -> Result<Vec<Row>, MnemoError> {
        let ns = namespace(user);
        let category = category.map(str::to_string);
        self.conn
            .call(move |conn| -> Result<Vec<Row>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, category, document, metadata FROM memories
                     WHERE namespace = ?1 AND (?2 IS NULL OR category = ?2)
                     ORDER BY id",
                )?;
                let rows = stmt
                    .query_map(params![ns, category], read_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)
    }

    async fn insert(
        &self,
        category: &str,
        document: &str,
        mut metadata: Metadata,
        user: Option<&str>,
    ) -> Result<String, MnemoError> {
        let created_at = match metadata.get("created_at").and_then(|v| v.as_f64()) {
            Some(ts) => ts,
            None => {
                let ts = now_unix();
                metadata.insert("created_at".into(), serde_json::json!(ts));
                ts
            }
        };
        let ns = namespace(user);
        let category = category.to_string();
        let document = document.to_string();
        let metadata = serde_json::to_string(&metadata)?;
        let id = self
            .conn
            .call(move |conn| -> Result<i64, rusqlite::Error> {
                conn.execute(
                    "INSERT INTO memories (namespace, category, document, metadata, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![ns, category, document, metadata, created_at],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(storage_err)?;
        Ok(format_id(id))
    }

    async fn delete_ids(&self, ids: Vec<i64>) -> Result<usize, MnemoError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                let tx = conn.transaction()?;
                let mut deleted = 0;
                for id in &ids {
                    deleted += tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(storage_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteMemoryStore {
    fn name(&self) -> &str {
        "sqlite-memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Memory
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemoError> {
        let result = self
            .conn
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
            })
            .await;
        Ok(match result {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }
}

#[async_trait]
impl MemoryClient for SqliteMemoryStore {
    async fn create(
        &self,
        category: &str,
        document: &str,
        metadata: Metadata,
        user: Option<&str>,
    ) -> Result<String, MnemoError> {
        let id = self.insert(category, document, metadata, user).await?;
        debug!(category, id = %id, "memory created");
        Ok(id)
    }

    async fn create_unique(
        &self,
        category: &str,
        document: &str,
        metadata: Metadata,
        similarity: f64,
        user: Option<&str>,
    ) -> Result<Option<String>, MnemoError> {
        let similar = self
            .search(category, document, &SearchOptions::within(similarity, 1), user)
            .await?;
        if !similar.is_empty() {
            return Ok(None);
        }
        self.create(category, document, metadata, user).await.map(Some)
    }

    async fn search(
        &self,
        category: &str,
        query: &str,
        options: &SearchOptions,
        user: Option<&str>,
    ) -> Result<Vec<MemoryRecord>, MnemoError> {
        let rows = self.rows(Some(category), user).await?;
        let mut scored: Vec<(f64, Row)> = rows
            .into_iter()
            .filter(|row| {
                options
                    .contains_text
                    .as_deref()
                    .is_none_or(|needle| row.document.contains(needle))
            })
            .map(|row| (lexical_distance(query, &row.document), row))
            .filter(|(d, _)| *d >= options.min_distance && *d <= options.max_distance)
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.id.cmp(&b.1.id)));
        Ok(scored
            .into_iter()
            .take(options.n_results)
            .map(|(distance, row)| row.into_record(distance))
            .collect())
    }

    async fn get(
        &self,
        category: &str,
        id: &str,
        user: Option<&str>,
    ) -> Result<Option<MemoryRecord>, MnemoError> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        let ns = namespace(user);
        let category = category.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<Row>, rusqlite::Error> {
                conn.query_row(
                    "SELECT id, category, document, metadata FROM memories
                     WHERE id = ?1 AND namespace = ?2 AND category = ?3",
                    params![id, ns, category],
                    read_row,
                )
                .optional()
            })
            .await
            .map_err(storage_err)?;
        Ok(row.map(|r| r.into_record(0.0)))
    }

    async fn update(
        &self,
        category: &str,
        id: &str,
        document: Option<&str>,
        metadata: Metadata,
        user: Option<&str>,
    ) -> Result<(), MnemoError> {
        let Some(existing) = self.get(category, id, user).await? else {
            return Err(MnemoError::NotFound(format!("memory {category}/{id}")));
        };
        let mut merged = existing.metadata;
        merged.extend(metadata);
        let merged = serde_json::to_string(&merged)?;
        let document = document.unwrap_or(&existing.document).to_string();
        let Some(row_id) = parse_id(&existing.id) else {
            return Err(MnemoError::Internal(format!("unparseable memory id {}", existing.id)));
        };
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "UPDATE memories SET document = ?1, metadata = ?2 WHERE id = ?3",
                    params![document, merged, row_id],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn delete(&self, category: &str, id: &str, user: Option<&str>) -> Result<(), MnemoError> {
        match self.get(category, id, user).await? {
            Some(record) => {
                self.delete_ids(parse_id(&record.id).into_iter().collect())
                    .await?;
                Ok(())
            }
            None => Err(MnemoError::NotFound(format!("memory {category}/{id}"))),
        }
    }

    async fn delete_similar(
        &self,
        category: &str,
        content: &str,
        similarity_threshold: f64,
        user: Option<&str>,
    ) -> Result<usize, MnemoError> {
        let cutoff = 1.0 - similarity_threshold;
        let ids: Vec<i64> = self
            .rows(Some(category), user)
            .await?
            .into_iter()
            .filter(|row| lexical_distance(content, &row.document) < cutoff)
            .map(|row| row.id)
            .collect();
        self.delete_ids(ids).await
    }

    async fn count(&self, category: &str, user: Option<&str>) -> Result<usize, MnemoError> {
        let ns = namespace(user);
        let category = category.to_string();
        let n = self
            .conn
            .call(move |conn| -> Result<i64, rusqlite::Error> {
                conn.query_row(
                    "SELECT COUNT(*) FROM memories WHERE namespace = ?1 AND category = ?2",
                    params![ns, category],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(storage_err)?;
        Ok(usize::try_from(n).unwrap_or_default())
    }

    async fn wipe_category(&self, category: &str, user: Option<&str>) -> Result<usize, MnemoError> {
        let ns = namespace(user);
        let category = category.to_string();
        self.conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "DELETE FROM memories WHERE namespace = ?1 AND category = ?2",
                    params![ns, category],
                )
            })
            .await
            .map_err(storage_err)
    }

    async fn wipe_all(&self, user: Option<&str>) -> Result<usize, MnemoError> {
        let ns = namespace(user);
        self.conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute("DELETE FROM memories WHERE namespace = ?1", params![ns])
            })
            .await
            .map_err(storage_err)
    }

    async fn import(&self, path: &Path, user: Option<&str>) -> Result<usize, MnemoError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let entries: Vec<ExportedMemory> = serde_json::from_str(&raw)?;
        let count = entries.len();
        for entry in entries {
            self.insert(&entry.category, &entry.document, entry.metadata, user)
                .await?;
        }
        info!(path = %path.display(), count, "memories imported");
        Ok(count)
    }

    async fn export(&self, path: &Path, user: Option<&str>) -> Result<usize, MnemoError> {
        let entries: Vec<ExportedMemory> = self
            .rows(None, user)
            .await?
            .into_iter()
            .map(|row| ExportedMemory {
                id: Some(format_id(row.id)),
                category: row.category,
                document: row.document,
                metadata: parse_metadata(row.id, &row.metadata),
            })
            .collect();
        let json = serde_json::to_string_pretty(&entries)?;
        tokio::fs::write(path, json).await?;
        info!(path = %path.display(), count = entries.len(), "memories exported");
        Ok(entries.len())
    }

    async fn most_recent(
        &self,
        category: &str,
        n: usize,
        chat_id: Option<&str>,
        user: Option<&str>,
    ) -> Result<Vec<MemoryRecord>, MnemoError> {
        let ns = namespace(user);
        let category = category.to_string();
        let chat_id = chat_id.map(str::to_string);
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let mut rows = self
            .conn
            .call(move |conn| -> Result<Vec<Row>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, category, document, metadata FROM memories
                     WHERE namespace = ?1 AND category = ?2
                       AND (?3 IS NULL OR json_extract(metadata, '$.chat_id') = ?3)
                     ORDER BY id DESC LIMIT ?4",
                )?;
                let rows = stmt
                    .query_map(params![ns, category, chat_id, limit], read_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)?;
        rows.reverse();
        Ok(rows.into_iter().map(|r| r.into_record(0.0)).collect())
    }
}
