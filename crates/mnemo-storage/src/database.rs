// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and migrations.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use mnemo_config::model::StorageConfig;
use mnemo_core::MnemoError;
use rusqlite::OpenFlags;
use tracing::{debug, info};

use crate::migrations;

/// Convert a tokio-rusqlite error into `MnemoError::Storage`.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> MnemoError {
    MnemoError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the relational store.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open the database described by `config` and run pending migrations.
    ///
    /// In production mode the file must already exist, and foreign keys plus
    /// secure deletion are enforced.
    pub async fn open(config: &StorageConfig) -> Result<Self, MnemoError> {
        let path = config.database_path.clone();
        let conn = if config.production {
            if !Path::new(&path).exists() {
                return Err(MnemoError::Config(format!(
                    "production database {path} does not exist"
                )));
            }
            tokio_rusqlite::Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .await
        } else {
            if let Some(parent) = Path::new(&path).parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio_rusqlite::Connection::open(&path).await
        }
        .map_err(|e| MnemoError::Storage {
            source: Box::new(e),
        })?;

        let db = Self { conn };
        db.configure(config.wal_mode, config.production).await?;
        info!(path = %path, production = config.production, "database opened");
        Ok(db)
    }

    /// Open a database file with development defaults.
    pub async fn open_path(path: &str) -> Result<Self, MnemoError> {
        let config = StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        };
        Self::open(&config).await
    }

    /// Open a private in-memory database. Used by tests.
    pub async fn open_in_memory() -> Result<Self, MnemoError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| MnemoError::Storage {
                source: Box::new(e),
            })?;
        let db = Self { conn };
        db.configure(false, false).await?;
        Ok(db)
    }

    async fn configure(&self, wal_mode: bool, production: bool) -> Result<(), MnemoError> {
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                if wal_mode {
                    conn.pragma_update(None, "journal_mode", "WAL")?;
                    conn.pragma_update(None, "synchronous", "NORMAL")?;
                }
                if production {
                    conn.pragma_update(None, "foreign_keys", "ON")?;
                    conn.pragma_update(None, "secure_delete", "ON")?;
                }
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        let applied = self
            .conn
            .call(|conn| migrations::run_migrations(conn))
            .await
            .map_err(|e| match e {
                tokio_rusqlite::Error::Error(e) => e,
                other => MnemoError::Internal(format!("migration connection: {other}")),
            })?;
        debug!(applied = applied.len(), "migrations complete");
        Ok(())
    }

    /// Underlying tokio-rusqlite connection for query modules.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL so the main file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), MnemoError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Names of migrations recorded as executed, oldest first.
    pub async fn applied_migrations(&self) -> Result<Vec<String>, MnemoError> {
        self.conn
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare("SELECT name FROM migrations ORDER BY version")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(map_tr_err)
    }
}
