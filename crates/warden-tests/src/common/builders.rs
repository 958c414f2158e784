// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Builders
//!
//! [`TestServiceBuilder`] wires a [`PermissionService`] to a [`ManualClock`],
//! an inspectable audit store, and in-memory persistence.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use warden_core::{
    Actor, AuditAction, AuditEntry, AuditRecorder, AuditSettings, InMemoryAuditStore,
    InMemoryPersistence, ManualClock, PermissionService, PrincipalId, Rank, RankStore,
    ResolvedCapabilities, SharedPersistence,
};

use super::fixtures::RankFixtures;

/// Fixed start instant used by every test service.
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

// =============================================================================
// TestServiceBuilder
// =============================================================================

/// Builder for [`TestService`].
pub struct TestServiceBuilder {
    ranks: Vec<Rank>,
    settings: AuditSettings,
    max_secondary_ranks: Option<usize>,
    persistence: Option<SharedPersistence>,
    start: DateTime<Utc>,
}

impl Default for TestServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestServiceBuilder {
    /// Creates a builder with no ranks.
    pub fn new() -> Self {
        Self {
            ranks: Vec::new(),
            settings: AuditSettings {
                origin: "test".to_string(),
                ..AuditSettings::default()
            },
            max_secondary_ranks: None,
            persistence: None,
            start: test_epoch(),
        }
    }

    /// Seeds a rank without recording an audit entry.
    pub fn rank(mut self, rank: Rank) -> Self {
        self.ranks.push(rank);
        self
    }

    /// Seeds several ranks.
    pub fn ranks(mut self, ranks: impl IntoIterator<Item = Rank>) -> Self {
        self.ranks.extend(ranks);
        self
    }

    /// Seeds `default`, `mod`, and `admin`.
    pub fn with_standard_ranks(self) -> Self {
        self.ranks(RankFixtures::standard())
    }

    /// Seeds every fixture rank.
    pub fn with_all_ranks(self) -> Self {
        self.ranks(RankFixtures::all())
    }

    /// Caps the structured audit store.
    pub fn audit_max_entries(mut self, max: usize) -> Self {
        self.settings.max_entries = max;
        self
    }

    /// Sets audit retention.
    pub fn audit_retention_days(mut self, days: u32) -> Self {
        self.settings.retention_days = Some(days);
        self
    }

    /// Turns audit recording off.
    pub fn audit_disabled(mut self) -> Self {
        self.settings.enabled = false;
        self
    }

    /// Caps secondary ranks per principal.
    pub fn max_secondary_ranks(mut self, max: usize) -> Self {
        self.max_secondary_ranks = Some(max);
        self
    }

    /// Uses a specific persistence backend.
    pub fn persistence(mut self, persistence: SharedPersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Sets the clock's start instant.
    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    /// Builds the service.
    pub fn build(self) -> TestService {
        let clock = ManualClock::new(self.start);
        let audit = InMemoryAuditStore::new();
        let recorder = AuditRecorder::new(Arc::new(audit.clone()), self.settings);
        let persistence = self
            .persistence
            .unwrap_or_else(|| Arc::new(InMemoryPersistence::new()));

        let mut builder = PermissionService::builder()
            .clock(Arc::new(clock.clone()))
            .persistence(Arc::clone(&persistence))
            .recorder(Arc::new(recorder));
        if let Some(max) = self.max_secondary_ranks {
            builder = builder.max_secondary_ranks(max);
        }
        let service = builder.build();

        for rank in self.ranks {
            service.store().put(rank);
        }

        TestService {
            service: Arc::new(service),
            clock,
            audit,
            persistence,
        }
    }
}

// =============================================================================
// TestService
// =============================================================================

/// A wired service plus handles for steering and inspecting it.
pub struct TestService {
    /// The service under test.
    pub service: Arc<PermissionService>,
    /// Shared manual clock.
    pub clock: ManualClock,
    /// Structured audit store behind the recorder.
    pub audit: InMemoryAuditStore,
    /// Persistence behind the service.
    pub persistence: SharedPersistence,
}

impl TestService {
    /// The console actor.
    pub fn console() -> Actor {
        Actor::console()
    }

    /// Connects a fresh principal and returns its ID.
    pub async fn connect(&self, name: &str) -> PrincipalId {
        let id = PrincipalId::random();
        self.connect_as(id, name, None).await;
        id
    }

    /// Connects `id` in `world`.
    pub async fn connect_as(
        &self,
        id: PrincipalId,
        name: &str,
        world: Option<&str>,
    ) -> ResolvedCapabilities {
        self.service
            .on_connect(id, name, world.map(str::to_string))
            .await
            .expect("connect should succeed")
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Recorded audit actions, oldest first.
    pub fn audit_actions(&self) -> Vec<AuditAction> {
        self.audit.entries().into_iter().map(|e| e.action).collect()
    }

    /// Recorded audit entries of one action, oldest first.
    pub fn audit_of(&self, action: AuditAction) -> Vec<AuditEntry> {
        self.audit.entries_for_action(action)
    }
}
