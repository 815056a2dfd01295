// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for users and usage statistics.
//!
//! Provides WAL-mode SQLite storage with name-tracked migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, and typed queries
//! for users, lifetime statistics, and daily statistics.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::*;

/// Round a USD amount to 5 decimal places.
pub fn round_usd(value: f64) -> f64 {
    (value * 100_000.0).round() / 100_000.0
}
