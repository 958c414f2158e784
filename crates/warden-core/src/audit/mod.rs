// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Audit trail for every mutation.
//!
//! # Components
//!
//! - [`AuditSink`]: Core trait for audit destinations
//! - [`AuditEntry`]: Immutable record of one mutation
//! - [`AuditRecorder`]: Fans entries out to a structured store and a text sink
//! - [`InMemoryAuditStore`]: Queryable in-process store
//! - [`StoreAuditSink`]: Queryable store over the persistence collaborator
//! - [`TextAuditSink`]: Append-only file with a pluggable [`AuditFormatter`]
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_core::audit::{
//!     AuditAction, AuditEntry, AuditRecorder, AuditSettings, InMemoryAuditStore, TextAuditSink,
//! };
//!
//! let recorder = AuditRecorder::new(Arc::new(InMemoryAuditStore::new()), AuditSettings::default())
//!     .with_text_sink(Arc::new(TextAuditSink::open("logs/audit.log")?));
//!
//! recorder
//!     .record(AuditEntry::builder(AuditAction::RankCreate).detail("created rank mod").build())
//!     .await;
//! ```

mod error;
mod formatter;
mod memory_store;
mod recorder;
mod store_sink;
mod text_sink;
mod types;

pub use error::{AuditError, AuditResult};
pub use formatter::{AuditFormatter, JsonLinesFormatter, TextFormatter};
pub use memory_store::InMemoryAuditStore;
pub use recorder::{AuditRecorder, AuditSettings, AuditStats};
pub use store_sink::StoreAuditSink;
pub use text_sink::TextAuditSink;
pub use types::{AuditAction, AuditEntry, AuditEntryBuilder, AuditFilter};

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

// =============================================================================
// Core Trait
// =============================================================================

/// A destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync + Debug {
    /// Appends an entry.
    async fn append(&self, entry: AuditEntry) -> AuditResult<()>;

    /// Returns matching entries, newest first.
    ///
    /// Sinks that cannot be queried return [`AuditError::QueryNotSupported`].
    async fn query(&self, filter: AuditFilter) -> AuditResult<Vec<AuditEntry>>;

    /// Keeps only the newest `max_entries`. Returns how many were removed.
    async fn prune(&self, max_entries: usize) -> AuditResult<usize>;

    /// Removes entries older than `cutoff`. Returns how many were removed.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> AuditResult<usize>;

    /// Flushes buffered output.
    async fn flush(&self) -> AuditResult<()>;

    /// Returns the sink name for logging.
    fn name(&self) -> &str {
        "audit_sink"
    }

    /// Returns `true` if this sink supports querying.
    fn supports_query(&self) -> bool {
        false
    }

    /// Returns `true` if the sink is healthy.
    async fn health_check(&self) -> bool {
        true
    }
}

// =============================================================================
// No-Op Sink
// =============================================================================

/// Discards every entry.
#[derive(Debug, Default, Clone)]
pub struct NoOpAuditSink;

impl NoOpAuditSink {
    /// Creates a new no-op sink.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for NoOpAuditSink {
    async fn append(&self, _entry: AuditEntry) -> AuditResult<()> {
        Ok(())
    }

    async fn query(&self, _filter: AuditFilter) -> AuditResult<Vec<AuditEntry>> {
        Ok(Vec::new())
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
        "noop"
    }
}
