// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `PluginAdapter` implementation so the database reports health like the
//! other adapters.

use async_trait::async_trait;
use mnemo_core::{AdapterType, HealthStatus, MnemoError, PluginAdapter};
use tracing::warn;

use crate::database::{Database, map_tr_err};

#[async_trait]
impl PluginAdapter for Database {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemoError> {
        let result = self
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT count(*) FROM migrations", [], |row| row.get(0))
            })
            .await
            .map_err(map_tr_err);

        match result {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => {
                warn!(error = %e, "database health check failed");
                Ok(HealthStatus::Unhealthy(e.to_string()))
            }
        }
    }
}
