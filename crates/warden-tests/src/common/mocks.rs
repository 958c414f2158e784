// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! - [`MockBridge`]: records pushed role sets, serves configured links
//! - [`FlakyPersistence`]: in-memory persistence with switchable write failures
//!   and scripted profile save latency

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use warden_core::bridge::BridgeResult;
use warden_core::persistence::PersistenceResult;
use warden_core::{
    AuditEntry, BridgeError, IdentityBridge, InMemoryPersistence, Persistence, PersistenceError,
    PrincipalId, PrincipalProfile, Rank, RankName,
};

// =============================================================================
// Mock Identity Bridge
// =============================================================================

/// An identity bridge that remembers every push.
#[derive(Debug, Default)]
pub struct MockBridge {
    links: Mutex<HashMap<PrincipalId, String>>,
    pushes: Mutex<Vec<(String, Vec<String>)>>,
    pulls: AtomicU64,
    fail_pushes: AtomicBool,
}

impl MockBridge {
    /// Creates a bridge with no links.
    pub fn new() -> Self {
        Self::default()
    }

    /// Links `principal` to `external_id`.
    pub fn link(&self, principal: PrincipalId, external_id: impl Into<String>) {
        self.links.lock().insert(principal, external_id.into());
    }

    /// Makes every push fail until turned off again.
    pub fn set_fail_pushes(&self, fail: bool) {
        self.fail_pushes.store(fail, Ordering::SeqCst);
    }

    /// Every successful push, oldest first.
    pub fn pushes(&self) -> Vec<(String, Vec<String>)> {
        self.pushes.lock().clone()
    }

    /// Number of link lookups.
    pub fn pull_count(&self) -> u64 {
        self.pulls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityBridge for MockBridge {
    async fn push_role_set(&self, external_id: &str, roles: &[String]) -> BridgeResult<()> {
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(BridgeError::unavailable("mock bridge offline"));
        }
        self.pushes
            .lock()
            .push((external_id.to_string(), roles.to_vec()));
        Ok(())
    }

    async fn pull_linked_external_id(&self, principal: &PrincipalId) -> BridgeResult<Option<String>> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        Ok(self.links.lock().get(principal).cloned())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// =============================================================================
// Flaky Persistence
// =============================================================================

/// In-memory persistence whose writes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyPersistence {
    inner: InMemoryPersistence,
    fail_writes: AtomicBool,
    failed_writes: AtomicU64,
    save_delays: Mutex<VecDeque<Duration>>,
}

impl FlakyPersistence {
    /// Creates a backend that works until told otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write fail until turned off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delays the next profile saves, one delay per save in call order.
    pub fn set_save_delays(&self, delays: impl IntoIterator<Item = Duration>) {
        *self.save_delays.lock() = delays.into_iter().collect();
    }

    /// Number of rejected writes.
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::SeqCst)
    }

    fn check_write(&self) -> PersistenceResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            self.failed_writes.fetch_add(1, Ordering::SeqCst);
            return Err(PersistenceError::unavailable("flaky", "injected write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for FlakyPersistence {
    async fn load_rank(&self, name: &RankName) -> PersistenceResult<Option<Rank>> {
        self.inner.load_rank(name).await
    }

    async fn load_all_ranks(&self) -> PersistenceResult<Vec<Rank>> {
        self.inner.load_all_ranks().await
    }

    async fn save_rank(&self, rank: &Rank) -> PersistenceResult<()> {
        self.check_write()?;
        self.inner.save_rank(rank).await
    }

    async fn delete_rank(&self, name: &RankName) -> PersistenceResult<bool> {
        self.check_write()?;
        self.inner.delete_rank(name).await
    }

    async fn load_principal(&self, id: &PrincipalId) -> PersistenceResult<Option<PrincipalProfile>> {
        self.inner.load_principal(id).await
    }

    async fn load_all_principals(&self) -> PersistenceResult<Vec<PrincipalProfile>> {
        self.inner.load_all_principals().await
    }

    async fn save_principal(&self, profile: &PrincipalProfile) -> PersistenceResult<()> {
        self.check_write()?;
        let delay = self.save_delays.lock().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.save_principal(profile).await
    }

    async fn append_audit(&self, entry: &AuditEntry) -> PersistenceResult<()> {
        self.check_write()?;
        self.inner.append_audit(entry).await
    }

    async fn prune_audit(&self, max_entries: usize) -> PersistenceResult<usize> {
        self.inner.prune_audit(max_entries).await
    }

    async fn prune_audit_before(&self, cutoff: DateTime<Utc>) -> PersistenceResult<usize> {
        self.inner.prune_audit_before(cutoff).await
    }

    async fn query_audit(
        &self,
        principal: Option<PrincipalId>,
        limit: usize,
    ) -> PersistenceResult<Vec<AuditEntry>> {
        self.inner.query_audit(principal, limit).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}
