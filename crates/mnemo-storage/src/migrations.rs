// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded schema migrations using refinery.
//!
//! SQL files under `migrations/` are compiled into the binary. Each one runs
//! at most once and is recorded by name in the `migrations` table.

use mnemo_core::MnemoError;
use tracing::info;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Table refinery records applied migrations in.
pub const MIGRATION_TABLE: &str = "migrations";

/// Number of migrations compiled into the binary.
pub fn migration_count() -> usize {
    embedded::migrations::runner().get_migrations().len()
}

/// Apply every pending migration, returning the names that ran.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<Vec<String>, MnemoError> {
    let report = embedded::migrations::runner()
        .set_migration_table_name(MIGRATION_TABLE)
        .run(conn)
        .map_err(|e| MnemoError::Storage {
            source: Box::new(e),
        })?;

    let applied: Vec<String> = report
        .applied_migrations()
        .iter()
        .map(|m| m.name().to_string())
        .collect();
    for name in &applied {
        info!(name = %name, "executed migration");
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{Connection, params};

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn creates_all_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        let applied = run_migrations(&mut conn).unwrap();
        assert_eq!(applied.len(), migration_count());
        assert_eq!(applied.first().map(String::as_str), Some("create_statistics"));

        for table in ["users", "migrations", "statistics", "daily_stats", "chat_tabs"] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
        assert!(!table_exists(&conn, "refinery_schema_history"));
    }

    #[test]
    fn second_run_is_a_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        let applied = run_migrations(&mut conn).unwrap();
        assert!(applied.is_empty());

        let recorded: i64 = conn
            .query_row("SELECT count(*) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(recorded as usize, migration_count());
    }

    #[test]
    fn migrations_are_tracked_by_name() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        let names: Vec<String> = conn
            .prepare("SELECT name FROM migrations ORDER BY version")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            names,
            [
                "create_statistics",
                "create_daily_stats",
                "create_chat_tabs",
                "add_display_name"
            ]
        );
    }

    #[test]
    fn users_gain_display_name() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO users (username, display_name) VALUES ('a', 'Ann')",
            [],
        )
        .unwrap();
    }
}
