// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User lookup, creation, and purge.

use mnemo_core::MnemoError;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, error, info};

use crate::database::{Database, map_tr_err};
use crate::models::User;

pub(crate) fn find_id(conn: &Connection, username: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM users WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )
    .optional()
}

/// Id for `username`, inserting the user on first sight.
pub(crate) fn find_or_create_id(conn: &Connection, username: &str) -> rusqlite::Result<i64> {
    if let Some(id) = find_id(conn, username)? {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO users (username) VALUES (?1)",
        params![username],
    )?;
    debug!(user = username, "created user");
    Ok(conn.last_insert_rowid())
}

/// Ensure a user row exists, returning its id.
pub async fn ensure_user(db: &Database, username: &str) -> Result<i64, MnemoError> {
    let username = username.to_string();
    db.connection()
        .call(move |conn| find_or_create_id(conn, &username))
        .await
        .map_err(map_tr_err)
}

/// Id of an existing user.
pub async fn user_id(db: &Database, username: &str) -> Result<Option<i64>, MnemoError> {
    let username = username.to_string();
    db.connection()
        .call(move |conn| find_id(conn, &username))
        .await
        .map_err(map_tr_err)
}

/// Fetch a user by name.
pub async fn get_user(db: &Database, username: &str) -> Result<Option<User>, MnemoError> {
    let username = username.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, username, COALESCE(role, 'user'), display_name
                 FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        role: row.get(2)?,
                        display_name: row.get(3)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Display name for a user, falling back to the username.
pub async fn display_name(db: &Database, username: &str) -> Result<String, MnemoError> {
    let user = get_user(db, username).await?;
    Ok(user
        .and_then(|u| u.display_name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| username.to_string()))
}

pub async fn set_display_name(
    db: &Database,
    username: &str,
    display_name: &str,
) -> Result<(), MnemoError> {
    let username = username.to_string();
    let display_name = display_name.to_string();
    db.connection()
        .call(move |conn| {
            let id = find_or_create_id(conn, &username)?;
            conn.execute(
                "UPDATE users SET display_name = ?1 WHERE id = ?2",
                params![display_name, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Open a chat tab for a user.
pub async fn create_chat_tab(
    db: &Database,
    username: &str,
    chat_id: &str,
    description: &str,
) -> Result<(), MnemoError> {
    let username = username.to_string();
    let chat_id = chat_id.to_string();
    let description = description.to_string();
    db.connection()
        .call(move |conn| {
            let id = find_or_create_id(conn, &username)?;
            conn.execute(
                "INSERT INTO chat_tabs (user_id, chat_id, description) VALUES (?1, ?2, ?3)",
                params![id, chat_id, description],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Number of chat tabs a user has open.
pub async fn chat_tab_count(db: &Database, username: &str) -> Result<i64, MnemoError> {
    let username = username.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT count(*) FROM chat_tabs t JOIN users u ON u.id = t.user_id
                 WHERE u.username = ?1",
                params![username],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Title given to freshly opened chat tabs.
pub const NEW_CHAT: &str = "New Chat";

/// Whether the tab still carries its placeholder title.
pub async fn needs_tab_description(db: &Database, chat_id: &str) -> Result<bool, MnemoError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let description: Option<String> = conn
                .query_row(
                    "SELECT description FROM chat_tabs WHERE chat_id = ?1",
                    params![chat_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(description.is_some_and(|d| d.starts_with(NEW_CHAT)))
        })
        .await
        .map_err(map_tr_err)
}

/// Replace a tab's title. Returns `false` when the tab does not exist.
pub async fn update_tab_description(
    db: &Database,
    chat_id: &str,
    description: &str,
) -> Result<bool, MnemoError> {
    let chat_id = chat_id.to_string();
    let description = description.to_string();
    let updated = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE chat_tabs SET description = ?1 WHERE chat_id = ?2",
                params![description, chat_id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(updated > 0)
}

/// Delete a user's chat tabs, daily stats, and statistics in one transaction.
///
/// Returns `false` when the user is unknown. The user row itself is kept.
pub async fn purge_user(db: &Database, username: &str) -> Result<bool, MnemoError> {
    let name = username.to_string();
    let result = db
        .connection()
        .call(move |conn| -> Result<Option<(usize, usize, usize)>, rusqlite::Error> {
            let Some(id) = find_id(conn, &name)? else {
                return Ok(None);
            };
            // Dropping an uncommitted transaction rolls it back.
            let tx = conn.transaction()?;
            let tabs = tx.execute("DELETE FROM chat_tabs WHERE user_id = ?1", params![id])?;
            let daily = tx.execute("DELETE FROM daily_stats WHERE user_id = ?1", params![id])?;
            let stats = tx.execute("DELETE FROM statistics WHERE user_id = ?1", params![id])?;
            tx.commit()?;
            Ok(Some((tabs, daily, stats)))
        })
        .await;

    match result {
        Ok(Some((tabs, daily, stats))) => {
            info!(user = username, tabs, daily, stats, "purged user data");
            Ok(true)
        }
        Ok(None) => {
            debug!(user = username, "purge skipped, user not found");
            Ok(false)
        }
        Err(e) => {
            error!(user = username, error = %e, "purge failed, rolled back");
            Err(map_tr_err(e))
        }
    }
}
