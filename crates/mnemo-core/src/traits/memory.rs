// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client surface of the external vector-memory store.

use std::path::Path;

use async_trait::async_trait;

use crate::error::MnemoError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{MemoryRecord, Metadata, SearchOptions};

/// Categorised memory store, namespaced per user.
///
/// Every operation takes an optional `user` namespace; `None` addresses the
/// shared namespace.
#[async_trait]
pub trait MemoryClient: PluginAdapter {
    /// Stores a new memory and returns its id.
    async fn create(
        &self,
        category: &str,
        document: &str,
        metadata: Metadata,
        user: Option<&str>,
    ) -> Result<String, MnemoError>;

    /// Stores a memory unless one within `similarity` distance already exists.
    ///
    /// Returns the new id, or `None` when a similar memory was found.
    async fn create_unique(
        &self,
        category: &str,
        document: &str,
        metadata: Metadata,
        similarity: f64,
        user: Option<&str>,
    ) -> Result<Option<String>, MnemoError>;

    /// Similarity search, closest first.
    async fn search(
        &self,
        category: &str,
        query: &str,
        options: &SearchOptions,
        user: Option<&str>,
    ) -> Result<Vec<MemoryRecord>, MnemoError>;

    /// Fetches a single memory. Ids without leading zeros are accepted.
    async fn get(
        &self,
        category: &str,
        id: &str,
        user: Option<&str>,
    ) -> Result<Option<MemoryRecord>, MnemoError>;

    /// Replaces the document (when given) and merges the metadata.
    async fn update(
        &self,
        category: &str,
        id: &str,
        document: Option<&str>,
        metadata: Metadata,
        user: Option<&str>,
    ) -> Result<(), MnemoError>;

    async fn delete(&self, category: &str, id: &str, user: Option<&str>)
    -> Result<(), MnemoError>;

    /// Deletes every memory closer than `1 - similarity_threshold`; returns the count.
    async fn delete_similar(
        &self,
        category: &str,
        content: &str,
        similarity_threshold: f64,
        user: Option<&str>,
    ) -> Result<usize, MnemoError>;

    async fn count(&self, category: &str, user: Option<&str>) -> Result<usize, MnemoError>;

    async fn wipe_category(&self, category: &str, user: Option<&str>)
    -> Result<usize, MnemoError>;

    async fn wipe_all(&self, user: Option<&str>) -> Result<usize, MnemoError>;

    /// Loads memories from a JSON export file; returns the number imported.
    async fn import(&self, path: &Path, user: Option<&str>) -> Result<usize, MnemoError>;

    /// Writes all memories of the namespace to a JSON file; returns the count.
    async fn export(&self, path: &Path, user: Option<&str>) -> Result<usize, MnemoError>;

    /// The `n` newest memories of a category in chronological order,
    /// optionally restricted to one chat.
    async fn most_recent(
        &self,
        category: &str,
        n: usize,
        chat_id: Option<&str>,
        user: Option<&str>,
    ) -> Result<Vec<MemoryRecord>, MnemoError>;
}
