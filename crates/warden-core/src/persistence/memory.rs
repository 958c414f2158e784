// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-process persistence backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{Persistence, PersistenceResult};
use crate::audit::AuditEntry;
use crate::profile::PrincipalProfile;
use crate::rank::Rank;
use crate::types::{PrincipalId, RankName};

/// Persistence backend that keeps everything in memory.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    ranks: RwLock<HashMap<RankName, Rank>>,
    principals: RwLock<HashMap<PrincipalId, PrincipalProfile>>,
    audit: RwLock<Vec<AuditEntry>>,
    rank_saves: AtomicU64,
    principal_saves: AtomicU64,
}

impl InMemoryPersistence {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-seeded with ranks.
    pub fn with_ranks(ranks: impl IntoIterator<Item = Rank>) -> Self {
        let backend = Self::new();
        {
            let mut map = backend.ranks.write();
            for rank in ranks {
                map.insert(rank.name.clone(), rank);
            }
        }
        backend
    }

    /// Number of `save_rank` calls.
    pub fn rank_saves(&self) -> u64 {
        self.rank_saves.load(Ordering::Relaxed)
    }

    /// Number of `save_principal` calls.
    pub fn principal_saves(&self) -> u64 {
        self.principal_saves.load(Ordering::Relaxed)
    }

    /// Number of stored audit entries.
    pub fn audit_len(&self) -> usize {
        self.audit.read().len()
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn load_rank(&self, name: &RankName) -> PersistenceResult<Option<Rank>> {
        Ok(self.ranks.read().get(name).cloned())
    }

    async fn load_all_ranks(&self) -> PersistenceResult<Vec<Rank>> {
        Ok(self.ranks.read().values().cloned().collect())
    }

    async fn save_rank(&self, rank: &Rank) -> PersistenceResult<()> {
        self.ranks.write().insert(rank.name.clone(), rank.clone());
        self.rank_saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete_rank(&self, name: &RankName) -> PersistenceResult<bool> {
        Ok(self.ranks.write().remove(name).is_some())
    }

    async fn load_principal(&self, id: &PrincipalId) -> PersistenceResult<Option<PrincipalProfile>> {
        Ok(self.principals.read().get(id).cloned())
    }

    async fn load_all_principals(&self) -> PersistenceResult<Vec<PrincipalProfile>> {
        Ok(self.principals.read().values().cloned().collect())
    }

    async fn save_principal(&self, profile: &PrincipalProfile) -> PersistenceResult<()> {
        self.principals.write().insert(profile.id, profile.clone());
        self.principal_saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> PersistenceResult<()> {
        self.audit.write().push(entry.clone());
        Ok(())
    }

    async fn prune_audit(&self, max_entries: usize) -> PersistenceResult<usize> {
        let mut audit = self.audit.write();
        let excess = audit.len().saturating_sub(max_entries);
        audit.drain(..excess);
        Ok(excess)
    }

    async fn prune_audit_before(&self, cutoff: DateTime<Utc>) -> PersistenceResult<usize> {
        let mut audit = self.audit.write();
        let before = audit.len();
        audit.retain(|e| e.timestamp >= cutoff);
        Ok(before - audit.len())
    }

    async fn query_audit(
        &self,
        principal: Option<PrincipalId>,
        limit: usize,
    ) -> PersistenceResult<Vec<AuditEntry>> {
        Ok(self
            .audit
            .read()
            .iter()
            .rev()
            .filter(|e| principal.map_or(true, |p| e.targets(&p)))
            .take(limit)
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
