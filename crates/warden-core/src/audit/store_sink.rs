// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Structured audit sink backed by the persistence collaborator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::{AuditError, AuditResult};
use super::types::{AuditEntry, AuditFilter};
use super::AuditSink;
use crate::persistence::{PersistenceError, SharedPersistence};

/// Routes audit entries into a [`Persistence`](crate::persistence::Persistence) backend.
#[derive(Debug, Clone)]
pub struct StoreAuditSink {
    persistence: SharedPersistence,
}

impl StoreAuditSink {
    /// Creates a sink over `persistence`.
    pub fn new(persistence: SharedPersistence) -> Self {
        Self { persistence }
    }
}

fn write_error(e: PersistenceError) -> AuditError {
    AuditError::write_failed_with("persistence backend rejected audit write", e)
}

#[async_trait]
impl AuditSink for StoreAuditSink {
    async fn append(&self, entry: AuditEntry) -> AuditResult<()> {
        self.persistence.append_audit(&entry).await.map_err(write_error)
    }

    async fn query(&self, filter: AuditFilter) -> AuditResult<Vec<AuditEntry>> {
        let limit = filter.limit.unwrap_or(usize::MAX);
        let only_principal =
            filter.rank.is_none() && filter.actions.is_empty() && filter.from.is_none() && filter.to.is_none();

        if only_principal {
            return self
                .persistence
                .query_audit(filter.principal, limit)
                .await
                .map_err(|e| AuditError::query_failed(e.to_string()));
        }

        let candidates = self
            .persistence
            .query_audit(filter.principal, usize::MAX)
            .await
            .map_err(|e| AuditError::query_failed(e.to_string()))?;
        Ok(candidates
            .into_iter()
            .filter(|e| filter.matches(e))
            .take(limit)
            .collect())
    }

    async fn prune(&self, max_entries: usize) -> AuditResult<usize> {
        self.persistence.prune_audit(max_entries).await.map_err(write_error)
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> AuditResult<usize> {
        self.persistence
            .prune_audit_before(cutoff)
            .await
            .map_err(write_error)
    }

    async fn flush(&self) -> AuditResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "store"
    }

    fn supports_query(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditAction;
    use crate::persistence::InMemoryPersistence;
    use crate::types::RankName;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_filtered_query_over_persistence() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let sink = StoreAuditSink::new(persistence.clone());

        sink.append(
            AuditEntry::builder(AuditAction::RankCreate)
                .target_rank(RankName::new("mod"))
                .build(),
        )
        .await
        .unwrap();
        sink.append(
            AuditEntry::builder(AuditAction::RankCreate)
                .target_rank(RankName::new("vip"))
                .build(),
        )
        .await
        .unwrap();

        let mods = sink
            .query(AuditFilter::new().rank(RankName::new("MOD")))
            .await
            .unwrap();
        assert_eq!(mods.len(), 1);

        assert_eq!(sink.prune(1).await.unwrap(), 1);
        assert_eq!(persistence.audit_len(), 1);
    }
}
