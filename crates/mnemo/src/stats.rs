// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mnemo stats` command implementation.

use mnemo_config::MnemoConfig;
use mnemo_core::MnemoError;
use mnemo_storage::Database;
use mnemo_storage::queries::statistics;
use serde::Serialize;

use crate::StatsArgs;

/// What `mnemo stats` reports for the given arguments.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum StatsReport {
    Global {
        global: mnemo_storage::GlobalStatistics,
        users: Vec<mnemo_storage::NamedStatistics>,
    },
    Page {
        page: u32,
        per_page: u32,
        rows: Vec<mnemo_storage::UserStatisticsRow>,
    },
    User {
        user: String,
        days: Vec<mnemo_storage::DailyStats>,
    },
}

pub async fn collect(db: &Database, args: &StatsArgs) -> Result<StatsReport, MnemoError> {
    if let Some(user) = &args.user {
        return Ok(StatsReport::User {
            user: user.clone(),
            days: statistics::user_daily_stats(db, user).await?,
        });
    }
    if let Some(page) = args.page {
        return Ok(StatsReport::Page {
            page,
            per_page: args.per_page,
            rows: statistics::statistics_page(db, page, args.per_page).await?,
        });
    }
    Ok(StatsReport::Global {
        global: statistics::global_statistics(db).await?,
        users: statistics::all_statistics(db).await?,
    })
}

/// Run the `mnemo stats` command, printing the report as JSON.
pub async fn run_stats(config: &MnemoConfig, args: StatsArgs) -> Result<(), MnemoError> {
    let db = Database::open(&config.storage).await?;
    let report = collect(&db, &args).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
