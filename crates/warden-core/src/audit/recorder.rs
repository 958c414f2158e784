// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Audit recorder.
//!
//! The recorder fans every entry out to a queryable structured store and an
//! optional append-only text sink. Sink failures never reach the caller:
//! they are logged, counted, and the mutation that produced the entry
//! stands.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::error::AuditResult;
use super::types::{AuditEntry, AuditFilter};
use super::AuditSink;
use crate::types::PrincipalId;

// =============================================================================
// Settings
// =============================================================================

/// Recorder behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSettings {
    /// Whether anything is recorded at all.
    pub enabled: bool,
    /// Structured store is pruned to this many entries after each insert.
    pub max_entries: usize,
    /// Entries older than this many days are removed by `prune_expired`.
    pub retention_days: Option<u32>,
    /// Limit used when a query passes a non-positive limit.
    pub default_query_limit: usize,
    /// Origin tag stamped on entries that carry none.
    pub origin: String,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            retention_days: None,
            default_query_limit: 50,
            origin: "server".to_string(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Snapshot of recorder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    /// Entries accepted by `record`.
    pub recorded: u64,
    /// Failed sink operations.
    pub sink_failures: u64,
    /// Entries removed by pruning.
    pub pruned: u64,
}

#[derive(Debug, Default)]
struct Counters {
    recorded: AtomicU64,
    sink_failures: AtomicU64,
    pruned: AtomicU64,
}

// =============================================================================
// AuditRecorder
// =============================================================================

/// Records audit entries into a structured store and a text sink.
#[derive(Debug)]
pub struct AuditRecorder {
    store: Arc<dyn AuditSink>,
    text: Option<Arc<dyn AuditSink>>,
    settings: AuditSettings,
    counters: Counters,
}

impl AuditRecorder {
    /// Creates a recorder writing to `store` only.
    pub fn new(store: Arc<dyn AuditSink>, settings: AuditSettings) -> Self {
        Self {
            store,
            text: None,
            settings,
            counters: Counters::default(),
        }
    }

    /// Adds the append-only text sink.
    pub fn with_text_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.text = Some(sink);
        self
    }

    /// Returns the recorder settings.
    pub fn settings(&self) -> &AuditSettings {
        &self.settings
    }

    /// Returns `true` if recording is enabled.
    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Records an entry. Never fails.
    pub async fn record(&self, mut entry: AuditEntry) {
        if !self.settings.enabled {
            return;
        }
        if entry.origin.is_empty() {
            entry.origin = self.settings.origin.clone();
        }
        self.counters.recorded.fetch_add(1, Ordering::Relaxed);

        if let Some(text) = &self.text {
            if let Err(e) = text.append(entry.clone()).await {
                self.sink_failed(text.name(), "append", e.error_type(), &e);
            }
        }

        let action = entry.action;
        match self.store.append(entry).await {
            Ok(()) => match self.store.prune(self.settings.max_entries).await {
                Ok(0) => {}
                Ok(n) => {
                    self.counters.pruned.fetch_add(n as u64, Ordering::Relaxed);
                    debug!(sink = self.store.name(), pruned = n, "Pruned audit store");
                }
                Err(e) => self.sink_failed(self.store.name(), "prune", e.error_type(), &e),
            },
            Err(e) => {
                self.sink_failed(self.store.name(), "append", e.error_type(), &e);
                debug!(action = %action, "Audit entry lost from structured store");
            }
        }
    }

    fn sink_failed(
        &self,
        sink: &str,
        operation: &str,
        error_type: &str,
        error: &dyn std::error::Error,
    ) {
        self.counters.sink_failures.fetch_add(1, Ordering::Relaxed);
        warn!(sink, operation, error_type, error = %error, "Audit sink failure");
    }

    fn effective_limit(&self, limit: i64) -> usize {
        if limit <= 0 {
            self.settings.default_query_limit
        } else {
            limit as usize
        }
    }

    /// Entries targeting `principal`, newest first.
    ///
    /// A non-positive `limit` uses the configured default.
    pub async fn query(&self, principal: PrincipalId, limit: i64) -> AuditResult<Vec<AuditEntry>> {
        let filter = AuditFilter::new()
            .principal(principal)
            .limit(self.effective_limit(limit));
        self.store.query(filter).await
    }

    /// All entries, newest first.
    ///
    /// A non-positive `limit` uses the configured default.
    pub async fn query_all(&self, limit: i64) -> AuditResult<Vec<AuditEntry>> {
        let filter = AuditFilter::new().limit(self.effective_limit(limit));
        self.store.query(filter).await
    }

    /// Runs an arbitrary filter against the structured store.
    pub async fn query_filter(&self, filter: AuditFilter) -> AuditResult<Vec<AuditEntry>> {
        self.store.query(filter).await
    }

    /// Removes entries older than the retention window. Returns how many.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let Some(days) = self.settings.retention_days else {
            return 0;
        };
        let cutoff = now - Duration::days(i64::from(days));
        match self.store.prune_before(cutoff).await {
            Ok(n) => {
                self.counters.pruned.fetch_add(n as u64, Ordering::Relaxed);
                if n > 0 {
                    debug!(pruned = n, %cutoff, "Pruned expired audit entries");
                }
                n
            }
            Err(e) => {
                self.sink_failed(self.store.name(), "prune_before", e.error_type(), &e);
                0
            }
        }
    }

    /// Flushes both sinks.
    pub async fn flush(&self) {
        if let Err(e) = self.store.flush().await {
            self.sink_failed(self.store.name(), "flush", e.error_type(), &e);
        }
        if let Some(text) = &self.text {
            if let Err(e) = text.flush().await {
                self.sink_failed(text.name(), "flush", e.error_type(), &e);
            }
        }
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> AuditStats {
        AuditStats {
            recorded: self.counters.recorded.load(Ordering::Relaxed),
            sink_failures: self.counters.sink_failures.load(Ordering::Relaxed),
            pruned: self.counters.pruned.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::error::AuditError;
    use crate::audit::memory_store::InMemoryAuditStore;
    use crate::audit::types::AuditAction;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn append(&self, _entry: AuditEntry) -> AuditResult<()> {
            Err(AuditError::write_failed("disk full"))
        }

        async fn query(&self, _filter: AuditFilter) -> AuditResult<Vec<AuditEntry>> {
            Err(AuditError::query_failed("unreachable"))
        }

        async fn prune(&self, _max_entries: usize) -> AuditResult<usize> {
            Ok(0)
        }

        async fn prune_before(&self, _cutoff: DateTime<Utc>) -> AuditResult<usize> {
            Ok(0)
        }

        async fn flush(&self) -> AuditResult<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn settings(max_entries: usize) -> AuditSettings {
        AuditSettings {
            max_entries,
            default_query_limit: 3,
            origin: "lobby".into(),
            ..AuditSettings::default()
        }
    }

    #[tokio::test]
    async fn test_record_prunes_to_max_entries() {
        let store = InMemoryAuditStore::new();
        let recorder = AuditRecorder::new(Arc::new(store.clone()), settings(10));
        let principal = PrincipalId::random();

        for i in 0..15 {
            recorder
                .record(
                    AuditEntry::builder(AuditAction::PermissionAdd)
                        .target_principal(principal)
                        .detail(format!("e{}", i))
                        .build(),
                )
                .await;
        }

        assert_eq!(store.len(), 10);
        let newest = recorder.query(principal, 100).await.unwrap();
        assert_eq!(newest.len(), 10);
        assert_eq!(newest[0].detail, "e14");
        assert_eq!(newest[9].detail, "e5");
        assert_eq!(newest[0].origin, "lobby");

        let stats = recorder.stats();
        assert_eq!(stats.recorded, 15);
        assert_eq!(stats.pruned, 5);
    }

    #[tokio::test]
    async fn test_non_positive_limit_uses_default() {
        let recorder = AuditRecorder::new(Arc::new(InMemoryAuditStore::new()), settings(100));
        for _ in 0..5 {
            recorder
                .record(AuditEntry::builder(AuditAction::RankCreate).build())
                .await;
        }
        assert_eq!(recorder.query_all(0).await.unwrap().len(), 3);
        assert_eq!(recorder.query_all(-7).await.unwrap().len(), 3);
        assert_eq!(recorder.query_all(4).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let memory = InMemoryAuditStore::new();
        let recorder = AuditRecorder::new(Arc::new(BrokenSink), settings(100))
            .with_text_sink(Arc::new(memory.clone()));

        recorder
            .record(AuditEntry::builder(AuditAction::RankDelete).build())
            .await;

        assert_eq!(memory.len(), 1);
        assert_eq!(recorder.stats().sink_failures, 1);
    }

    #[tokio::test]
    async fn test_disabled_records_nothing() {
        let store = InMemoryAuditStore::new();
        let recorder = AuditRecorder::new(
            Arc::new(store.clone()),
            AuditSettings {
                enabled: false,
                ..AuditSettings::default()
            },
        );
        recorder
            .record(AuditEntry::builder(AuditAction::RankCreate).build())
            .await;
        assert!(store.is_empty());
        assert_eq!(recorder.stats().recorded, 0);
    }

    #[tokio::test]
    async fn test_prune_expired_uses_retention() {
        let store = InMemoryAuditStore::new();
        let recorder = AuditRecorder::new(
            Arc::new(store.clone()),
            AuditSettings {
                retention_days: Some(30),
                ..AuditSettings::default()
            },
        );
        let now = Utc::now();
        recorder
            .record(
                AuditEntry::builder(AuditAction::RankCreate)
                    .at(now - Duration::days(31))
                    .build(),
            )
            .await;
        recorder
            .record(AuditEntry::builder(AuditAction::RankCreate).at(now).build())
            .await;

        assert_eq!(recorder.prune_expired(now).await, 1);
        assert_eq!(store.len(), 1);
    }
}
