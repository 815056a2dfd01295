// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifetime and daily usage statistics.
//!
//! Daily rows are keyed by `(user_id, date(timestamp))`. Functions ending in
//! `_at` take the current local time explicitly; the plain versions use the
//! wall clock.

use chrono::{Local, NaiveDateTime};
use mnemo_core::MnemoError;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::debug;

use crate::database::{Database, map_tr_err};
use crate::models::{
    DailyStats, DailyUsage, GlobalStatistics, NamedStatistics, Statistics, TokenDelta,
    TokenTotals, UserStatisticsRow,
};
use crate::queries::users::{find_id, find_or_create_id};
use crate::round_usd;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Voice synthesis price: $15 per million characters.
const VOICE_USD_PER_CHAR: f64 = 15.0 / 1_000_000.0;

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn stamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

const STATISTICS_COLUMNS: &str = "user_id, amount_of_messages, total_tokens_used, prompt_tokens, \
     completion_tokens, voice_usage, total_spending_count, total_average_response_time";

fn statistics_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Statistics> {
    Ok(Statistics {
        user_id: row.get(offset)?,
        amount_of_messages: row.get(offset + 1)?,
        total_tokens_used: row.get(offset + 2)?,
        prompt_tokens: row.get(offset + 3)?,
        completion_tokens: row.get(offset + 4)?,
        voice_usage: row.get(offset + 5)?,
        total_spending_count: row.get(offset + 6)?,
        total_average_response_time: row.get(offset + 7)?,
    })
}

const DAILY_COLUMNS: &str = "id, user_id, timestamp, message_amount, prompt_tokens, \
     generation_tokens, brain_tokens, spending_count, total_response_time, \
     average_response_time, response_count";

fn daily_from_row(row: &Row<'_>) -> rusqlite::Result<DailyStats> {
    Ok(DailyStats {
        id: row.get(0)?,
        user_id: row.get(1)?,
        timestamp: row.get(2)?,
        message_amount: row.get(3)?,
        prompt_tokens: row.get(4)?,
        generation_tokens: row.get(5)?,
        brain_tokens: row.get(6)?,
        spending_count: row.get(7)?,
        total_response_time: row.get(8)?,
        average_response_time: row.get(9)?,
        response_count: row.get(10)?,
    })
}

fn daily_row(conn: &Connection, user_id: i64, day: &str) -> rusqlite::Result<Option<DailyStats>> {
    conn.query_row(
        &format!(
            "SELECT {DAILY_COLUMNS} FROM daily_stats
             WHERE user_id = ?1 AND date(timestamp) = date(?2)
             ORDER BY id LIMIT 1"
        ),
        params![user_id, day],
        daily_from_row,
    )
    .optional()
}

fn lifetime_row(conn: &Connection, user_id: i64) -> rusqlite::Result<Option<Statistics>> {
    conn.query_row(
        &format!("SELECT {STATISTICS_COLUMNS} FROM statistics WHERE user_id = ?1"),
        params![user_id],
        |row| statistics_from_row(row, 0),
    )
    .optional()
}

fn upsert_tokens(conn: &Connection, user_id: i64, delta: TokenDelta) -> rusqlite::Result<TokenTotals> {
    conn.execute(
        "INSERT INTO statistics (user_id, total_tokens_used, prompt_tokens, completion_tokens, voice_usage)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
             total_tokens_used = statistics.total_tokens_used + excluded.total_tokens_used,
             prompt_tokens = statistics.prompt_tokens + excluded.prompt_tokens,
             completion_tokens = statistics.completion_tokens + excluded.completion_tokens,
             voice_usage = statistics.voice_usage + excluded.voice_usage",
        params![
            user_id,
            delta.total_tokens_used,
            delta.prompt_tokens,
            delta.completion_tokens,
            delta.voice_usage,
        ],
    )?;
    conn.query_row(
        "SELECT total_tokens_used, prompt_tokens, completion_tokens, voice_usage
         FROM statistics WHERE user_id = ?1",
        params![user_id],
        |row| {
            Ok(TokenTotals {
                total_tokens_used: row.get(0)?,
                prompt_tokens: row.get(1)?,
                completion_tokens: row.get(2)?,
                voice_usage: row.get(3)?,
            })
        },
    )
}

#[derive(Clone, Copy)]
enum DailyWrite {
    Add,
    Replace,
}

fn write_daily(
    conn: &Connection,
    user_id: i64,
    usage: &DailyUsage,
    mode: DailyWrite,
    at: &str,
) -> rusqlite::Result<DailyStats> {
    let columns = usage.columns();
    if !columns.is_empty() {
        let values: Vec<rusqlite::types::Value> = columns.iter().map(|(_, v)| v.clone()).collect();
        if daily_row(conn, user_id, at)?.is_some() {
            let set_clause = columns
                .iter()
                .enumerate()
                .map(|(i, (col, _))| match mode {
                    DailyWrite::Add => format!("{col} = {col} + ?{}", i + 1),
                    DailyWrite::Replace => format!("{col} = ?{}", i + 1),
                })
                .collect::<Vec<_>>()
                .join(", ");
            let n = columns.len();
            let sql = format!(
                "UPDATE daily_stats SET {set_clause}
                 WHERE user_id = ?{} AND date(timestamp) = date(?{})",
                n + 1,
                n + 2
            );
            let mut bound = values;
            bound.push(user_id.into());
            bound.push(at.to_string().into());
            conn.execute(&sql, params_from_iter(bound))?;
        } else {
            let names = columns.iter().map(|(c, _)| *c).collect::<Vec<_>>().join(", ");
            let placeholders = (0..columns.len())
                .map(|i| format!("?{}", i + 3))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "INSERT INTO daily_stats (user_id, timestamp, {names}) VALUES (?1, ?2, {placeholders})"
            );
            let mut bound: Vec<rusqlite::types::Value> = vec![user_id.into(), at.to_string().into()];
            bound.extend(values);
            conn.execute(&sql, params_from_iter(bound))?;
        }
    }

    match daily_row(conn, user_id, at)? {
        Some(row) => Ok(row),
        None => Ok(DailyStats {
            user_id,
            timestamp: at.to_string(),
            ..DailyStats::default()
        }),
    }
}

/// Add to a user's lifetime token counters, creating the row if needed.
pub async fn update_token_usage(
    db: &Database,
    username: &str,
    delta: TokenDelta,
) -> Result<TokenTotals, MnemoError> {
    let username = username.to_string();
    db.connection()
        .call(move |conn| {
            let id = find_or_create_id(conn, &username)?;
            upsert_tokens(conn, id, delta)
        })
        .await
        .map_err(map_tr_err)
}

/// Bump the daily and lifetime message counters. Returns `(daily, total)`.
pub async fn update_message_count(db: &Database, username: &str) -> Result<(i64, i64), MnemoError> {
    update_message_count_at(db, username, now()).await
}

pub async fn update_message_count_at(
    db: &Database,
    username: &str,
    at: NaiveDateTime,
) -> Result<(i64, i64), MnemoError> {
    let username = username.to_string();
    let at = stamp(at);
    db.connection()
        .call(move |conn| {
            let id = find_or_create_id(conn, &username)?;
            let daily = write_daily(
                conn,
                id,
                &DailyUsage {
                    message_amount: Some(1),
                    ..DailyUsage::default()
                },
                DailyWrite::Add,
                &at,
            )?;
            conn.execute(
                "INSERT INTO statistics (user_id, amount_of_messages) VALUES (?1, 1)
                 ON CONFLICT(user_id) DO UPDATE SET amount_of_messages = statistics.amount_of_messages + 1",
                params![id],
            )?;
            let total: i64 = conn.query_row(
                "SELECT amount_of_messages FROM statistics WHERE user_id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            Ok((daily.message_amount, total))
        })
        .await
        .map_err(map_tr_err)
}

/// Token usage and spend.
///
/// Daily mode returns today's prompt plus generation tokens and spend.
/// Lifetime mode prices prompt and completion tokens at the flat fallback
/// rate and adds voice spend.
pub async fn get_token_usage(
    db: &Database,
    username: &str,
    daily: bool,
) -> Result<(i64, f64), MnemoError> {
    let username = username.to_string();
    let at = stamp(now());
    db.connection()
        .call(move |conn| -> Result<(i64, f64), rusqlite::Error> {
            let Some(id) = find_id(conn, &username)? else {
                return Ok((0, 0.0));
            };
            if daily {
                return Ok(match daily_row(conn, id, &at)? {
                    Some(row) => (
                        row.prompt_tokens + row.generation_tokens,
                        round_usd(row.spending_count),
                    ),
                    None => (0, 0.0),
                });
            }
            Ok(match lifetime_row(conn, id)? {
                Some(row) => {
                    let prompt_cost = round_usd(row.prompt_tokens as f64 * 0.00001);
                    let completion_cost = round_usd(row.completion_tokens as f64 * 0.00003);
                    (
                        row.total_tokens_used,
                        round_usd(prompt_cost + completion_cost + row.voice_usage),
                    )
                }
                None => (0, 0.0),
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Today's row for a user.
pub async fn daily_stats(db: &Database, username: &str) -> Result<Option<DailyStats>, MnemoError> {
    daily_stats_at(db, username, now()).await
}

pub async fn daily_stats_at(
    db: &Database,
    username: &str,
    at: NaiveDateTime,
) -> Result<Option<DailyStats>, MnemoError> {
    let username = username.to_string();
    let at = stamp(at);
    db.connection()
        .call(move |conn| -> Result<Option<DailyStats>, rusqlite::Error> {
            match find_id(conn, &username)? {
                Some(id) => daily_row(conn, id, &at),
                None => Ok(None),
            }
        })
        .await
        .map_err(map_tr_err)
}

async fn daily_write(
    db: &Database,
    username: &str,
    usage: DailyUsage,
    mode: DailyWrite,
    at: NaiveDateTime,
) -> Result<DailyStats, MnemoError> {
    let username = username.to_string();
    let at = stamp(at);
    db.connection()
        .call(move |conn| {
            let id = find_or_create_id(conn, &username)?;
            write_daily(conn, id, &usage, mode, &at)
        })
        .await
        .map_err(map_tr_err)
}

/// Add the set columns to today's row, inserting it if missing.
pub async fn add_daily_usage(
    db: &Database,
    username: &str,
    usage: DailyUsage,
) -> Result<DailyStats, MnemoError> {
    daily_write(db, username, usage, DailyWrite::Add, now()).await
}

pub async fn add_daily_usage_at(
    db: &Database,
    username: &str,
    usage: DailyUsage,
    at: NaiveDateTime,
) -> Result<DailyStats, MnemoError> {
    daily_write(db, username, usage, DailyWrite::Add, at).await
}

/// Overwrite the set columns of today's row, inserting it if missing.
pub async fn replace_daily_usage(
    db: &Database,
    username: &str,
    usage: DailyUsage,
) -> Result<DailyStats, MnemoError> {
    daily_write(db, username, usage, DailyWrite::Replace, now()).await
}

/// Lifetime statistics row for a user.
pub async fn statistic(db: &Database, username: &str) -> Result<Option<Statistics>, MnemoError> {
    let username = username.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Statistics>, rusqlite::Error> {
            match find_id(conn, &username)? {
                Some(id) => lifetime_row(conn, id),
                None => Ok(None),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Set the lifetime spend.
pub async fn set_total_spending(
    db: &Database,
    username: &str,
    total: f64,
) -> Result<(), MnemoError> {
    let username = username.to_string();
    db.connection()
        .call(move |conn| {
            let id = find_or_create_id(conn, &username)?;
            conn.execute(
                "INSERT INTO statistics (user_id, total_spending_count) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET total_spending_count = excluded.total_spending_count",
                params![id, total],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record synthesized speech: characters count as tokens, cost goes to voice.
pub async fn add_voice_usage(
    db: &Database,
    username: &str,
    characters: i64,
) -> Result<TokenTotals, MnemoError> {
    let cost = round_usd(characters as f64 * VOICE_USD_PER_CHAR);
    debug!(user = username, characters, cost, "voice usage");
    update_token_usage(
        db,
        username,
        TokenDelta {
            total_tokens_used: characters,
            voice_usage: cost,
            ..TokenDelta::default()
        },
    )
    .await
}

/// Record a transcription cost.
pub async fn add_whisper_usage(
    db: &Database,
    username: &str,
    cost: f64,
) -> Result<TokenTotals, MnemoError> {
    update_token_usage(
        db,
        username,
        TokenDelta {
            voice_usage: cost,
            ..TokenDelta::default()
        },
    )
    .await
}

/// Sums across every user.
pub async fn global_statistics(db: &Database) -> Result<GlobalStatistics, MnemoError> {
    db.connection()
        .call(|conn| -> Result<GlobalStatistics, rusqlite::Error> {
            conn.query_row(
                "SELECT COALESCE(SUM(amount_of_messages), 0), COALESCE(SUM(total_tokens_used), 0),
                        COALESCE(SUM(prompt_tokens), 0), COALESCE(SUM(completion_tokens), 0),
                        COALESCE(SUM(voice_usage), 0.0), COALESCE(SUM(total_spending_count), 0.0),
                        COALESCE(AVG(total_average_response_time), 0.0)
                 FROM statistics",
                [],
                |row| {
                    Ok(GlobalStatistics {
                        total_messages: row.get(0)?,
                        total_tokens: row.get(1)?,
                        total_prompt_tokens: row.get(2)?,
                        total_completion_tokens: row.get(3)?,
                        total_voice_usage: row.get(4)?,
                        total_spending: row.get(5)?,
                        average_response_time: row.get(6)?,
                    })
                },
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Every lifetime row with its username.
pub async fn all_statistics(db: &Database) -> Result<Vec<NamedStatistics>, MnemoError> {
    db.connection()
        .call(|conn| -> Result<Vec<NamedStatistics>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT u.username, s.user_id, s.amount_of_messages, s.total_tokens_used,
                        s.prompt_tokens, s.completion_tokens, s.voice_usage,
                        s.total_spending_count, s.total_average_response_time
                 FROM statistics s JOIN users u ON u.id = s.user_id
                 ORDER BY s.user_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(NamedStatistics {
                    username: row.get(0)?,
                    statistics: statistics_from_row(row, 1)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// One page of users joined with their statistics. Pages start at 1.
pub async fn statistics_page(
    db: &Database,
    page: u32,
    per_page: u32,
) -> Result<Vec<UserStatisticsRow>, MnemoError> {
    let offset = i64::from(page.max(1) - 1) * i64::from(per_page);
    let limit = i64::from(per_page);
    db.connection()
        .call(move |conn| -> Result<Vec<UserStatisticsRow>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, COALESCE(u.role, 'user'),
                        s.user_id, s.amount_of_messages, s.total_tokens_used, s.prompt_tokens,
                        s.completion_tokens, s.voice_usage, s.total_spending_count,
                        s.total_average_response_time
                 FROM users u LEFT JOIN statistics s ON u.id = s.user_id
                 ORDER BY u.id LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(params![limit, offset], |row| {
                let has_stats: Option<i64> = row.get(3)?;
                Ok(UserStatisticsRow {
                    user_id: row.get(0)?,
                    username: row.get(1)?,
                    role: row.get(2)?,
                    statistics: match has_stats {
                        Some(_) => Some(statistics_from_row(row, 3)?),
                        None => None,
                    },
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// All daily rows for a user, newest first.
pub async fn user_daily_stats(db: &Database, username: &str) -> Result<Vec<DailyStats>, MnemoError> {
    let username = username.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<DailyStats>, rusqlite::Error> {
            let Some(id) = find_id(conn, &username)? else {
                return Ok(Vec::new());
            };
            let mut stmt = conn.prepare(&format!(
                "SELECT {DAILY_COLUMNS} FROM daily_stats WHERE user_id = ?1
                 ORDER BY timestamp DESC, id DESC"
            ))?;
            let rows = stmt.query_map(params![id], daily_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
