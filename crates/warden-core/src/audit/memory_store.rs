// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory structured audit store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::error::AuditResult;
use super::types::{AuditAction, AuditEntry, AuditFilter};
use super::AuditSink;

/// Queryable audit store kept in memory.
///
/// Entries are kept in insertion order; queries walk them newest first.
/// Clones share the same storage.
#[derive(Debug, Clone)]
pub struct InMemoryAuditStore {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
    name: String,
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuditStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            name: "memory".to_string(),
        }
    }

    /// Sets the sink name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns every entry, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }

    /// Returns entries of one action, oldest first.
    pub fn entries_for_action(&self, action: AuditAction) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditStore {
    async fn append(&self, entry: AuditEntry) -> AuditResult<()> {
        self.entries.write().push(entry);
        Ok(())
    }

    async fn query(&self, filter: AuditFilter) -> AuditResult<Vec<AuditEntry>> {
        let entries = self.entries.read();
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn prune(&self, max_entries: usize) -> AuditResult<usize> {
        let mut entries = self.entries.write();
        let excess = entries.len().saturating_sub(max_entries);
        entries.drain(..excess);
        Ok(excess)
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> AuditResult<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        Ok(before - entries.len())
    }

    async fn flush(&self) -> AuditResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_query(&self) -> bool {
        true
    }
}
