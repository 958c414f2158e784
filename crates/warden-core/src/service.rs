// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Permission service.
//!
//! The service is the single entry point for mutations and checks. Every
//! mutation follows the same pipeline:
//!
//! ```text
//! validate ─▶ mutate (under lock) ─▶ recompute sessions ─▶ audit ─▶ persist
//! ```
//!
//! Validation errors are returned before any state changes. Locks are
//! released before the first await, and failures of the audit, persistence,
//! or bridge collaborators after a successful mutation are logged and
//! swallowed. Profile saves are the exception: each principal has an async
//! lock taken before its snapshot is read, so the last save to finish always
//! carries the newest profile.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::{
    AuditAction, AuditEntry, AuditEntryBuilder, AuditRecorder, AuditSettings, InMemoryAuditStore,
};
use crate::clock::{Clock, SharedClock, SystemClock};
use crate::error::{WardenError, WardenResult};
use crate::ledger::{GrantLedger, SweepOutcome, DEFAULT_MAX_SECONDARY_RANKS};
use crate::persistence::{InMemoryPersistence, SharedPersistence};
use crate::profile::PrincipalProfile;
use crate::rank::Rank;
use crate::resolver::{PermissionResolver, ResolvedCapabilities};
use crate::session::SessionProjectionCache;
use crate::store::{InMemoryRankStore, SharedRankStore};
use crate::types::{Actor, PermissionNode, PrincipalId, RankName};

// =============================================================================
// Supporting types
// =============================================================================

/// Partial update of a rank's display attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankDisplayUpdate {
    /// New display name.
    pub display_name: Option<String>,
    /// New prefix.
    pub prefix: Option<String>,
    /// New suffix.
    pub suffix: Option<String>,
    /// New name color.
    pub name_color: Option<String>,
    /// New chat color.
    pub chat_color: Option<String>,
    /// New weight.
    pub weight: Option<i32>,
}

impl RankDisplayUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the display name.
    pub fn display_name(mut self, value: impl Into<String>) -> Self {
        self.display_name = Some(value.into());
        self
    }

    /// Sets the prefix.
    pub fn prefix(mut self, value: impl Into<String>) -> Self {
        self.prefix = Some(value.into());
        self
    }

    /// Sets the suffix.
    pub fn suffix(mut self, value: impl Into<String>) -> Self {
        self.suffix = Some(value.into());
        self
    }

    /// Sets the name color.
    pub fn name_color(mut self, value: impl Into<String>) -> Self {
        self.name_color = Some(value.into());
        self
    }

    /// Sets the chat color.
    pub fn chat_color(mut self, value: impl Into<String>) -> Self {
        self.chat_color = Some(value.into());
        self
    }

    /// Sets the weight.
    pub fn weight(mut self, value: i32) -> Self {
        self.weight = Some(value);
        self
    }

    fn apply(&self, rank: &mut Rank) -> bool {
        let before = rank.clone();
        if let Some(v) = &self.display_name {
            rank.display_name = v.clone();
        }
        if let Some(v) = &self.prefix {
            rank.prefix = v.clone();
        }
        if let Some(v) = &self.suffix {
            rank.suffix = v.clone();
        }
        if let Some(v) = &self.name_color {
            rank.name_color = v.clone();
        }
        if let Some(v) = &self.chat_color {
            rank.chat_color = v.clone();
        }
        if let Some(v) = self.weight {
            rank.weight = v;
        }
        *rank != before
    }
}

/// Everything still pointing at a rank when it was deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RankDeletion {
    /// Ranks that still inherit the deleted rank.
    pub ranks: Vec<RankName>,
    /// Principals that still hold it as primary, secondary, or temporary rank.
    pub principals: Vec<PrincipalId>,
}

impl RankDeletion {
    /// Returns `true` if nothing referenced the rank.
    pub fn is_clean(&self) -> bool {
        self.ranks.is_empty() && self.principals.is_empty()
    }
}

/// What `restore` loaded from persistence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreStats {
    /// Ranks loaded into the store.
    pub ranks: usize,
    /// Profiles loaded into the ledger.
    pub principals: usize,
}

// =============================================================================
// PermissionService
// =============================================================================

/// Orchestrates the rank store, ledger, session cache, recorder, and persistence.
#[derive(Debug)]
pub struct PermissionService {
    clock: SharedClock,
    store: SharedRankStore,
    ledger: Arc<GrantLedger>,
    sessions: Arc<SessionProjectionCache>,
    recorder: Arc<AuditRecorder>,
    persistence: SharedPersistence,
    rank_lock: Mutex<()>,
    /// Orders profile saves per principal, snapshot included.
    persist_locks: DashMap<PrincipalId, Arc<tokio::sync::Mutex<()>>>,
}

impl PermissionService {
    /// Creates a builder.
    pub fn builder() -> PermissionServiceBuilder {
        PermissionServiceBuilder::new()
    }

    /// Returns the clock.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Returns the rank store.
    pub fn store(&self) -> &SharedRankStore {
        &self.store
    }

    /// Returns the grant ledger.
    pub fn ledger(&self) -> &Arc<GrantLedger> {
        &self.ledger
    }

    /// Returns the session cache.
    pub fn sessions(&self) -> &Arc<SessionProjectionCache> {
        &self.sessions
    }

    /// Returns the audit recorder.
    pub fn recorder(&self) -> &Arc<AuditRecorder> {
        &self.recorder
    }

    /// Returns the persistence backend.
    pub fn persistence(&self) -> &SharedPersistence {
        &self.persistence
    }

    /// Looks up a rank.
    pub fn rank(&self, name: &RankName) -> Option<Arc<Rank>> {
        self.store.get(name)
    }

    /// Every rank, heaviest first.
    pub fn ranks(&self) -> Vec<Arc<Rank>> {
        self.store.all()
    }

    /// Snapshot of a profile.
    pub fn profile(&self, id: &PrincipalId) -> Option<PrincipalProfile> {
        self.ledger.get(id)
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Loads every rank and profile from persistence.
    pub async fn restore(&self) -> WardenResult<RestoreStats> {
        let ranks = self.persistence.load_all_ranks().await?;
        let principals = self.persistence.load_all_principals().await?;

        let stats = RestoreStats {
            ranks: ranks.len(),
            principals: principals.len(),
        };
        for rank in ranks {
            self.store.put(rank);
        }
        for profile in principals {
            self.ledger.insert(profile);
        }

        info!(
            backend = self.persistence.name(),
            ranks = stats.ranks,
            principals = stats.principals,
            "Restored state from persistence"
        );
        Ok(stats)
    }

    // =========================================================================
    // Pipeline helpers
    // =========================================================================

    fn entry(&self, action: AuditAction, actor: &Actor) -> AuditEntryBuilder {
        AuditEntry::builder(action)
            .actor(actor)
            .at(self.clock.now())
    }

    fn principal_entry(
        &self,
        action: AuditAction,
        actor: &Actor,
        id: &PrincipalId,
    ) -> AuditEntryBuilder {
        let external_id = self.ledger.get(id).and_then(|p| p.external_id);
        self.entry(action, actor)
            .target_principal(*id)
            .target_external_id(external_id)
    }

    async fn persist_principal(&self, id: &PrincipalId) {
        let lock = self.persist_locks.entry(*id).or_default().value().clone();
        let _ordered = lock.lock().await;
        let Some(profile) = self.ledger.get(id) else {
            return;
        };
        if let Err(e) = self.persistence.save_principal(&profile).await {
            warn!(
                principal = %id,
                backend = self.persistence.name(),
                error_type = e.error_type(),
                error = %e,
                "Failed to save principal"
            );
        }
    }

    async fn persist_rank(&self, name: &RankName) {
        let Some(rank) = self.store.get(name) else {
            return;
        };
        if let Err(e) = self.persistence.save_rank(&rank).await {
            warn!(
                rank = %name,
                backend = self.persistence.name(),
                error_type = e.error_type(),
                error = %e,
                "Failed to save rank"
            );
        }
    }

    async fn finish_principal(&self, id: &PrincipalId, entry: AuditEntry) {
        self.sessions.recompute(id);
        self.recorder.record(entry).await;
        self.persist_principal(id).await;
    }

    async fn finish_ranks(&self, changed: &[RankName], entry: AuditEntry) {
        let refreshed = self.sessions.recompute_all();
        debug!(refreshed, "Recomputed sessions after rank change");
        self.recorder.record(entry).await;
        for name in changed {
            self.persist_rank(name).await;
        }
    }

    fn require_rank(&self, name: &RankName) -> WardenResult<()> {
        if self.store.contains(name) {
            Ok(())
        } else {
            Err(WardenError::rank_not_found(name.as_str()))
        }
    }

    /// Applies `f` to a copy of a rank and stores it if `f` reports a change.
    fn edit_rank(
        &self,
        name: &RankName,
        f: impl FnOnce(&mut Rank) -> WardenResult<bool>,
    ) -> WardenResult<bool> {
        let _guard = self.rank_lock.lock();
        let current = self
            .store
            .get(name)
            .ok_or_else(|| WardenError::rank_not_found(name.as_str()))?;
        let mut rank = Rank::clone(&current);
        if !f(&mut rank)? {
            return Ok(false);
        }
        self.store.put(rank);
        Ok(true)
    }

    // =========================================================================
    // Rank graph
    // =========================================================================

    /// Creates a rank. A rank created as default becomes the only default.
    pub async fn create_rank(&self, actor: &Actor, rank: Rank) -> WardenResult<Arc<Rank>> {
        let name = rank.name.clone();
        let mut changed = vec![name.clone()];
        {
            let _guard = self.rank_lock.lock();
            if self.store.contains(&name) {
                return Err(WardenError::rank_exists(name.as_str()));
            }
            for parent in &rank.inherits {
                if let Some(path) = self.store.would_create_cycle(&name, parent) {
                    return Err(WardenError::cycle(
                        path.iter().map(|r| r.to_string()).collect(),
                    ));
                }
            }
            if rank.is_default {
                changed.extend(self.clear_default_except(&name));
            }
            self.store.put(rank);
        }

        info!(rank = %name, actor = %actor.name, "Created rank");
        let entry = self
            .entry(AuditAction::RankCreate, actor)
            .target_rank(name.clone())
            .detail(format!("created rank {}", name))
            .build();
        self.finish_ranks(&changed, entry).await;

        self.store
            .get(&name)
            .ok_or_else(|| WardenError::rank_not_found(name.as_str()))
    }

    /// Unsets the default flag on every rank except `keep`. Caller holds `rank_lock`.
    fn clear_default_except(&self, keep: &RankName) -> Vec<RankName> {
        let mut changed = Vec::new();
        for rank in self.store.all() {
            if rank.is_default && &rank.name != keep {
                let mut rank = Rank::clone(&rank);
                rank.is_default = false;
                changed.push(rank.name.clone());
                self.store.put(rank);
            }
        }
        changed
    }

    /// Deletes a rank. Returns the ranks and principals that still reference it.
    ///
    /// Deletion is permissive: dangling references are reported and logged,
    /// and the resolver skips them.
    pub async fn delete_rank(&self, actor: &Actor, name: &RankName) -> WardenResult<RankDeletion> {
        let ranks = {
            let _guard = self.rank_lock.lock();
            if !self.store.delete(name) {
                return Err(WardenError::rank_not_found(name.as_str()));
            }
            self.store.dependents(name)
        };
        let mut principals: Vec<PrincipalId> = self
            .ledger
            .principals()
            .into_iter()
            .filter(|id| {
                self.ledger
                    .get(id)
                    .is_some_and(|p| p.references_rank(name))
            })
            .collect();
        principals.sort();

        if !ranks.is_empty() {
            let names: Vec<String> = ranks.iter().map(|r| r.to_string()).collect();
            warn!(
                rank = %name,
                dependents = %names.join(","),
                "Deleted rank is still inherited"
            );
        }
        if !principals.is_empty() {
            warn!(
                rank = %name,
                principals = principals.len(),
                "Deleted rank is still held by principals"
            );
        }
        info!(rank = %name, actor = %actor.name, "Deleted rank");

        let entry = self
            .entry(AuditAction::RankDelete, actor)
            .target_rank(name.clone())
            .detail(format!("deleted rank {}", name))
            .build();
        self.finish_ranks(&[], entry).await;

        match self.persistence.delete_rank(name).await {
            Ok(_) => {}
            Err(e) => warn!(
                rank = %name,
                error_type = e.error_type(),
                error = %e,
                "Failed to delete rank from persistence"
            ),
        }
        Ok(RankDeletion { ranks, principals })
    }

    /// Makes `name` the only default rank.
    pub async fn set_default_rank(&self, actor: &Actor, name: &RankName) -> WardenResult<()> {
        let mut changed = Vec::new();
        {
            let _guard = self.rank_lock.lock();
            let current = self
                .store
                .get(name)
                .ok_or_else(|| WardenError::rank_not_found(name.as_str()))?;
            changed.extend(self.clear_default_except(name));
            if !current.is_default {
                let mut rank = Rank::clone(&current);
                rank.is_default = true;
                self.store.put(rank);
                changed.push(name.clone());
            }
        }
        if changed.is_empty() {
            return Ok(());
        }

        let entry = self
            .entry(AuditAction::RankSetDefault, actor)
            .target_rank(name.clone())
            .detail(format!("default rank is now {}", name))
            .build();
        self.finish_ranks(&changed, entry).await;
        Ok(())
    }

    /// Adds a permission to a rank, globally or for one world.
    pub async fn add_rank_permission(
        &self,
        actor: &Actor,
        name: &RankName,
        permission: &str,
        world: Option<&str>,
    ) -> WardenResult<bool> {
        let node = PermissionNode::parse(permission)?;
        let detail = scoped_detail(&node, world);
        let added = self.edit_rank(name, |rank| Ok(rank.add_permission(node, world)))?;
        if added {
            let entry = self
                .entry(AuditAction::RankPermissionAdd, actor)
                .target_rank(name.clone())
                .detail(detail)
                .build();
            self.finish_ranks(std::slice::from_ref(name), entry).await;
        }
        Ok(added)
    }

    /// Removes a permission from a rank, globally or for one world.
    pub async fn remove_rank_permission(
        &self,
        actor: &Actor,
        name: &RankName,
        permission: &str,
        world: Option<&str>,
    ) -> WardenResult<bool> {
        let node = PermissionNode::parse(permission)?;
        let detail = scoped_detail(&node, world);
        let removed = self.edit_rank(name, |rank| Ok(rank.remove_permission(&node, world)))?;
        if removed {
            let entry = self
                .entry(AuditAction::RankPermissionRemove, actor)
                .target_rank(name.clone())
                .detail(detail)
                .build();
            self.finish_ranks(std::slice::from_ref(name), entry).await;
        }
        Ok(removed)
    }

    /// Adds an inheritance edge `name -> parent`.
    ///
    /// Fails with `CycleDetected` if the edge would close a cycle.
    pub async fn add_inheritance(
        &self,
        actor: &Actor,
        name: &RankName,
        parent: &RankName,
    ) -> WardenResult<bool> {
        self.require_rank(parent)?;
        let store = Arc::clone(&self.store);
        let added = self.edit_rank(name, |rank| {
            if rank.inherits_from(parent) {
                return Ok(false);
            }
            if let Some(path) = store.would_create_cycle(name, parent) {
                return Err(WardenError::cycle(
                    path.iter().map(|r| r.to_string()).collect(),
                ));
            }
            Ok(rank.add_inheritance(parent.clone()))
        })?;

        if added {
            let entry = self
                .entry(AuditAction::RankInheritanceAdd, actor)
                .target_rank(name.clone())
                .detail(format!("{} now inherits {}", name, parent))
                .build();
            self.finish_ranks(std::slice::from_ref(name), entry).await;
        }
        Ok(added)
    }

    /// Removes an inheritance edge.
    pub async fn remove_inheritance(
        &self,
        actor: &Actor,
        name: &RankName,
        parent: &RankName,
    ) -> WardenResult<bool> {
        let removed = self.edit_rank(name, |rank| Ok(rank.remove_inheritance(parent)))?;
        if removed {
            let entry = self
                .entry(AuditAction::RankInheritanceRemove, actor)
                .target_rank(name.clone())
                .detail(format!("{} no longer inherits {}", name, parent))
                .build();
            self.finish_ranks(std::slice::from_ref(name), entry).await;
        }
        Ok(removed)
    }

    /// Updates a rank's display attributes.
    pub async fn update_rank_display(
        &self,
        actor: &Actor,
        name: &RankName,
        update: RankDisplayUpdate,
    ) -> WardenResult<Arc<Rank>> {
        let changed = self.edit_rank(name, |rank| Ok(update.apply(rank)))?;
        if changed {
            let entry = self
                .entry(AuditAction::RankUpdate, actor)
                .target_rank(name.clone())
                .detail(format!("{:?}", update))
                .build();
            self.finish_ranks(std::slice::from_ref(name), entry).await;
        }
        self.store
            .get(name)
            .ok_or_else(|| WardenError::rank_not_found(name.as_str()))
    }

    // =========================================================================
    // Session front end
    // =========================================================================

    /// Handles a principal connecting.
    ///
    /// Creates the profile on first sight (loading it from persistence if it
    /// is stored there), assigns the default rank when the principal has no
    /// rank, stamps the login, attaches a session, and resolves it.
    pub async fn on_connect(
        &self,
        id: PrincipalId,
        name: &str,
        world: Option<String>,
    ) -> WardenResult<ResolvedCapabilities> {
        if !self.ledger.contains(&id) {
            match self.persistence.load_principal(&id).await {
                Ok(Some(profile)) => {
                    self.ledger.insert(profile);
                }
                Ok(None) => {}
                Err(e) => warn!(
                    principal = %id,
                    error_type = e.error_type(),
                    error = %e,
                    "Failed to load principal, starting fresh"
                ),
            }
        }

        let (profile, created) = self.ledger.get_or_create(id, name);
        if profile.has_no_rank() {
            if let Some(default) = self.store.get_default() {
                self.ledger.set_primary_rank(&id, Some(default.name.clone()))?;
                debug!(principal = %id, rank = %default.name, "Assigned default rank");
            }
        }
        self.ledger.touch_login(&id, name)?;

        self.sessions.attach(id, world);
        let resolved = self
            .sessions
            .recompute(&id)
            .ok_or_else(|| WardenError::principal_not_found(id))?;

        if created {
            info!(principal = %id, name, "New principal");
            let entry = self
                .principal_entry(AuditAction::PrincipalCreate, &Actor::system(), &id)
                .detail(format!("first connection as {}", name))
                .build();
            self.recorder.record(entry).await;
        }
        self.persist_principal(&id).await;
        Ok(resolved)
    }

    /// Handles a principal disconnecting. Returns `false` if it was not attached.
    pub async fn on_disconnect(&self, id: &PrincipalId) -> bool {
        if self.ledger.touch_seen(id).is_ok() {
            self.persist_principal(id).await;
        }
        self.sessions.detach(id)
    }

    /// Handles a principal changing world.
    pub fn on_world_change(
        &self,
        id: &PrincipalId,
        world: Option<String>,
    ) -> Option<ResolvedCapabilities> {
        self.sessions.set_world(id, world)
    }

    // =========================================================================
    // Principal ranks
    // =========================================================================

    /// Sets or clears a principal's primary rank. Returns the previous primary.
    pub async fn set_primary_rank(
        &self,
        actor: &Actor,
        id: &PrincipalId,
        rank: Option<RankName>,
    ) -> WardenResult<Option<RankName>> {
        if let Some(rank) = &rank {
            self.require_rank(rank)?;
        }
        let previous = self.ledger.set_primary_rank(id, rank.clone())?;
        if previous == rank {
            return Ok(previous);
        }

        let mut entry = self.principal_entry(AuditAction::PrimaryRankSet, actor, id);
        entry = match &rank {
            Some(rank) => entry
                .target_rank(rank.clone())
                .detail(format!("primary rank set to {}", rank)),
            None => entry.detail("primary rank cleared"),
        };
        self.finish_principal(id, entry.build()).await;
        Ok(previous)
    }

    /// Adds a secondary rank.
    pub async fn add_secondary_rank(
        &self,
        actor: &Actor,
        id: &PrincipalId,
        rank: &RankName,
    ) -> WardenResult<bool> {
        self.require_rank(rank)?;
        let added = self.ledger.add_secondary_rank(id, rank.clone())?;
        if added {
            let entry = self
                .principal_entry(AuditAction::SecondaryRankAdd, actor, id)
                .target_rank(rank.clone())
                .detail(format!("added secondary rank {}", rank))
                .build();
            self.finish_principal(id, entry).await;
        }
        Ok(added)
    }

    /// Removes a secondary rank.
    pub async fn remove_secondary_rank(
        &self,
        actor: &Actor,
        id: &PrincipalId,
        rank: &RankName,
    ) -> WardenResult<bool> {
        let removed = self.ledger.remove_secondary_rank(id, rank)?;
        if removed {
            let entry = self
                .principal_entry(AuditAction::SecondaryRankRemove, actor, id)
                .target_rank(rank.clone())
                .detail(format!("removed secondary rank {}", rank))
                .build();
            self.finish_principal(id, entry).await;
        }
        Ok(removed)
    }

    // =========================================================================
    // Principal permissions
    // =========================================================================

    /// Grants a direct permission, globally or for one world.
    pub async fn add_permission(
        &self,
        actor: &Actor,
        id: &PrincipalId,
        permission: &str,
        world: Option<&str>,
    ) -> WardenResult<bool> {
        let node = PermissionNode::parse(permission)?;
        let detail = scoped_detail(&node, world);
        let added = self.ledger.add_permission(id, node, world)?;
        if added {
            let action = if world.is_some() {
                AuditAction::WorldPermissionAdd
            } else {
                AuditAction::PermissionAdd
            };
            let entry = self.principal_entry(action, actor, id).detail(detail).build();
            self.finish_principal(id, entry).await;
        }
        Ok(added)
    }

    /// Revokes a direct permission, globally or for one world.
    pub async fn remove_permission(
        &self,
        actor: &Actor,
        id: &PrincipalId,
        permission: &str,
        world: Option<&str>,
    ) -> WardenResult<bool> {
        let node = PermissionNode::parse(permission)?;
        let detail = scoped_detail(&node, world);
        let removed = self.ledger.remove_permission(id, &node, world)?;
        if removed {
            let action = if world.is_some() {
                AuditAction::WorldPermissionRemove
            } else {
                AuditAction::PermissionRemove
            };
            let entry = self.principal_entry(action, actor, id).detail(detail).build();
            self.finish_principal(id, entry).await;
        }
        Ok(removed)
    }

    // =========================================================================
    // Temporary grants
    // =========================================================================

    /// Grants a rank until `expires_at`.
    pub async fn add_temporary_rank(
        &self,
        actor: &Actor,
        id: &PrincipalId,
        rank: &RankName,
        expires_at: DateTime<Utc>,
    ) -> WardenResult<()> {
        self.require_rank(rank)?;
        let previous = self.ledger.add_temporary_rank(id, rank.clone(), expires_at)?;
        let detail = match previous {
            Some(previous) => format!("{} extended from {} to {}", rank, previous, expires_at),
            None => format!("{} until {}", rank, expires_at),
        };
        let entry = self
            .principal_entry(AuditAction::TempRankAdd, actor, id)
            .target_rank(rank.clone())
            .detail(detail)
            .build();
        self.finish_principal(id, entry).await;
        Ok(())
    }

    /// Removes a temporary rank before it expires.
    pub async fn remove_temporary_rank(
        &self,
        actor: &Actor,
        id: &PrincipalId,
        rank: &RankName,
    ) -> WardenResult<bool> {
        let removed = self.ledger.remove_temporary_rank(id, rank)?;
        if removed {
            let entry = self
                .principal_entry(AuditAction::TempRankRemove, actor, id)
                .target_rank(rank.clone())
                .detail(format!("removed temporary rank {}", rank))
                .build();
            self.finish_principal(id, entry).await;
        }
        Ok(removed)
    }

    /// Grants a permission until `expires_at`.
    pub async fn add_temporary_permission(
        &self,
        actor: &Actor,
        id: &PrincipalId,
        permission: &str,
        expires_at: DateTime<Utc>,
    ) -> WardenResult<()> {
        let node = PermissionNode::parse(permission)?;
        let rendered = node.to_string();
        let previous = self.ledger.add_temporary_permission(id, node, expires_at)?;
        let detail = match previous {
            Some(previous) => format!("{} extended from {} to {}", rendered, previous, expires_at),
            None => format!("{} until {}", rendered, expires_at),
        };
        let entry = self
            .principal_entry(AuditAction::TempPermissionAdd, actor, id)
            .detail(detail)
            .build();
        self.finish_principal(id, entry).await;
        Ok(())
    }

    /// Removes a temporary permission before it expires.
    pub async fn remove_temporary_permission(
        &self,
        actor: &Actor,
        id: &PrincipalId,
        permission: &str,
    ) -> WardenResult<bool> {
        let node = PermissionNode::parse(permission)?;
        let removed = self.ledger.remove_temporary_permission(id, &node)?;
        if removed {
            let entry = self
                .principal_entry(AuditAction::TempPermissionRemove, actor, id)
                .detail(format!("removed temporary permission {}", node))
                .build();
            self.finish_principal(id, entry).await;
        }
        Ok(removed)
    }

    /// Purges every expired temporary grant. Returns how many grants were purged.
    ///
    /// Each purged grant gets its own audit entry.
    pub async fn sweep_expired_all(&self) -> usize {
        let outcomes = self.ledger.sweep_all();
        let mut purged = 0;
        for outcome in &outcomes {
            purged += outcome.count();
            self.finish_sweep(outcome).await;
        }
        if purged > 0 {
            info!(purged, principals = outcomes.len(), "Swept expired grants");
        }
        purged
    }

    async fn finish_sweep(&self, outcome: &SweepOutcome) {
        let id = outcome.principal;
        self.sessions.recompute(&id);

        let system = Actor::system();
        for grant in &outcome.ranks {
            let entry = self
                .principal_entry(AuditAction::TempRankExpire, &system, &id)
                .target_rank(grant.key.clone())
                .detail(format!("{} expired at {}", grant.key, grant.expires_at))
                .build();
            self.recorder.record(entry).await;
        }
        for grant in &outcome.permissions {
            let entry = self
                .principal_entry(AuditAction::TempPermissionExpire, &system, &id)
                .detail(format!("{} expired at {}", grant.key, grant.expires_at))
                .build();
            self.recorder.record(entry).await;
        }

        self.persist_principal(&id).await;
    }

    // =========================================================================
    // Checks
    // =========================================================================

    /// Resolves a principal on demand, bypassing the session cache.
    pub fn resolve(&self, id: &PrincipalId, world: Option<&str>) -> WardenResult<ResolvedCapabilities> {
        let profile = self
            .ledger
            .get(id)
            .ok_or_else(|| WardenError::principal_not_found(id))?;
        Ok(PermissionResolver::new(self.store.as_ref()).resolve(&profile, world, self.clock.now()))
    }

    /// Checks one permission.
    ///
    /// Attached principals are answered from the session cache when the
    /// requested world matches the session's world (or none is given);
    /// everyone else is resolved on demand. A cached projection that outlived
    /// one of its temporary grants is recomputed before it answers.
    pub fn check_permission(
        &self,
        id: &PrincipalId,
        permission: &str,
        world: Option<&str>,
    ) -> WardenResult<bool> {
        if let Some(handle) = self.sessions.current_handle(id) {
            let same_world = world.map_or(true, |w| handle.world().as_deref() == Some(w));
            if same_world && handle.capabilities().is_some() {
                return Ok(handle.has(permission));
            }
        }
        Ok(self.resolve(id, world)?.has(permission))
    }

    // =========================================================================
    // Audit
    // =========================================================================

    /// Audit entries targeting a principal, newest first.
    pub async fn query_audit(&self, id: PrincipalId, limit: i64) -> Vec<AuditEntry> {
        match self.recorder.query(id, limit).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(principal = %id, error_type = e.error_type(), error = %e, "Audit query failed");
                Vec::new()
            }
        }
    }

    /// Every audit entry, newest first.
    pub async fn query_audit_all(&self, limit: i64) -> Vec<AuditEntry> {
        match self.recorder.query_all(limit).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error_type = e.error_type(), error = %e, "Audit query failed");
                Vec::new()
            }
        }
    }

    /// Applies the audit retention window.
    pub async fn prune_audit_expired(&self) -> usize {
        self.recorder.prune_expired(self.clock.now()).await
    }

    /// Flushes the audit sinks.
    pub async fn flush(&self) {
        self.recorder.flush().await;
    }
}

fn scoped_detail(node: &PermissionNode, world: Option<&str>) -> String {
    match world {
        Some(world) => format!("{} in {}", node, world),
        None => node.to_string(),
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`PermissionService`].
///
/// Every collaborator is optional and falls back to an in-memory default.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use warden_core::clock::ManualClock;
/// use warden_core::service::PermissionService;
///
/// let service = PermissionService::builder()
///     .clock(Arc::new(ManualClock::starting_now()))
///     .max_secondary_ranks(4)
///     .build();
/// assert!(service.ranks().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct PermissionServiceBuilder {
    clock: Option<SharedClock>,
    store: Option<SharedRankStore>,
    persistence: Option<SharedPersistence>,
    recorder: Option<Arc<AuditRecorder>>,
    max_secondary_ranks: Option<usize>,
}

impl PermissionServiceBuilder {
    /// Creates a builder with no collaborators set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the clock.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the rank store.
    pub fn store(mut self, store: SharedRankStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the persistence backend.
    pub fn persistence(mut self, persistence: SharedPersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Sets the audit recorder.
    pub fn recorder(mut self, recorder: Arc<AuditRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Sets the cap on secondary ranks per principal.
    pub fn max_secondary_ranks(mut self, max: usize) -> Self {
        self.max_secondary_ranks = Some(max);
        self
    }

    /// Builds the service.
    pub fn build(self) -> PermissionService {
        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let store: SharedRankStore = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryRankStore::new()));
        let persistence: SharedPersistence = self
            .persistence
            .unwrap_or_else(|| Arc::new(InMemoryPersistence::new()));
        let recorder = self.recorder.unwrap_or_else(|| {
            Arc::new(AuditRecorder::new(
                Arc::new(InMemoryAuditStore::new()),
                AuditSettings::default(),
            ))
        });

        let ledger = Arc::new(
            GrantLedger::new(Arc::clone(&clock))
                .with_max_secondary_ranks(self.max_secondary_ranks.unwrap_or(DEFAULT_MAX_SECONDARY_RANKS)),
        );
        let sessions = Arc::new(SessionProjectionCache::new(
            Arc::clone(&ledger),
            Arc::clone(&store),
        ));

        PermissionService {
            clock,
            store,
            ledger,
            sessions,
            recorder,
            persistence,
            rank_lock: Mutex::new(()),
            persist_locks: DashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn service() -> (PermissionService, ManualClock, InMemoryAuditStore) {
        let clock = ManualClock::starting_now();
        let audit = InMemoryAuditStore::new();
        let recorder = Arc::new(AuditRecorder::new(
            Arc::new(audit.clone()),
            AuditSettings::default(),
        ));
        let service = PermissionService::builder()
            .clock(Arc::new(clock.clone()))
            .recorder(recorder)
            .max_secondary_ranks(2)
            .build();
        (service, clock, audit)
    }

    async fn seed(service: &PermissionService) {
        let console = Actor::console();
        service
            .create_rank(
                &console,
                Rank::builder("default")
                    .permission("essentials.spawn")
                    .default_rank(true)
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        service
            .create_rank(
                &console,
                Rank::builder("mod")
                    .inherit("default")
                    .permission("essentials.kick")
                    .prefix("[Mod] ")
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_connect_assigns_default_rank() {
        let (service, _, audit) = service();
        seed(&service).await;
        let id = PrincipalId::random();

        let resolved = service.on_connect(id, "steve", None).await.unwrap();
        assert_eq!(resolved.granted_sorted(), vec!["essentials.spawn"]);
        assert_eq!(
            service.profile(&id).unwrap().primary_rank,
            Some(RankName::new("default"))
        );
        assert_eq!(audit.entries_for_action(AuditAction::PrincipalCreate).len(), 1);

        service.on_disconnect(&id).await;
        service.on_connect(id, "steve", None).await.unwrap();
        assert_eq!(audit.entries_for_action(AuditAction::PrincipalCreate).len(), 1);
    }

    #[tokio::test]
    async fn test_create_rank_rejects_duplicate() {
        let (service, _, _) = service();
        seed(&service).await;
        let err = service
            .create_rank(&Actor::console(), Rank::new("MOD"))
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_create_rank_rejects_cycle() {
        let (service, _, audit) = service();
        let console = Actor::console();
        service
            .create_rank(&console, Rank::builder("a").inherit("b").build().unwrap())
            .await
            .unwrap();
        let before = audit.len();

        let err = service
            .create_rank(&console, Rank::builder("b").inherit("a").build().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "cycle_detected");
        assert!(!service.store().contains(&RankName::new("b")));

        let err = service
            .create_rank(&console, Rank::builder("c").inherit("C").build().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "cycle_detected");
        assert_eq!(audit.len(), before);
    }

    #[tokio::test]
    async fn test_set_default_rank_is_exclusive() {
        let (service, _, _) = service();
        seed(&service).await;
        service
            .set_default_rank(&Actor::console(), &RankName::new("mod"))
            .await
            .unwrap();

        let defaults: Vec<_> = service.ranks().into_iter().filter(|r| r.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].name.key(), "mod");
    }

    #[tokio::test]
    async fn test_add_inheritance_rejects_cycle() {
        let (service, _, audit) = service();
        seed(&service).await;
        let before = audit.len();

        let err = service
            .add_inheritance(&Actor::console(), &RankName::new("default"), &RankName::new("mod"))
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::CycleDetected { .. }));
        assert!(service.rank(&RankName::new("default")).unwrap().inherits.is_empty());
        assert_eq!(audit.len(), before);
    }

    #[tokio::test]
    async fn test_unknown_rank_assignment() {
        let (service, _, _) = service();
        seed(&service).await;
        let id = PrincipalId::random();
        service.on_connect(id, "steve", None).await.unwrap();

        let err = service
            .set_primary_rank(&Actor::console(), &id, Some(RankName::new("ghost")))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "not_found");
    }

    #[tokio::test]
    async fn test_mutation_visible_to_check() {
        let (service, _, _) = service();
        seed(&service).await;
        let id = PrincipalId::random();
        service.on_connect(id, "steve", None).await.unwrap();
        let console = Actor::console();

        service
            .set_primary_rank(&console, &id, Some(RankName::new("mod")))
            .await
            .unwrap();
        assert!(service.check_permission(&id, "essentials.kick", None).unwrap());

        service
            .add_permission(&console, &id, "-essentials.kick", None)
            .await
            .unwrap();
        assert!(!service.check_permission(&id, "essentials.kick", None).unwrap());

        let display = service.sessions().handle(&id).unwrap().display();
        assert_eq!(display.prefix, "[Mod] ");
    }

    #[tokio::test]
    async fn test_rank_edit_recomputes_sessions() {
        let (service, _, _) = service();
        seed(&service).await;
        let id = PrincipalId::random();
        service.on_connect(id, "steve", None).await.unwrap();

        service
            .add_rank_permission(&Actor::console(), &RankName::new("default"), "essentials.home", None)
            .await
            .unwrap();
        assert_eq!(
            service.sessions().has_permission(&id, "essentials.home"),
            Some(true)
        );
    }

    #[tokio::test]
    async fn test_sweep_audits_each_grant() {
        let (service, clock, audit) = service();
        seed(&service).await;
        let id = PrincipalId::random();
        service.on_connect(id, "steve", None).await.unwrap();
        let console = Actor::console();

        let expiry = clock.now() + Duration::minutes(5);
        service
            .add_temporary_permission(&console, &id, "essentials.fly", expiry)
            .await
            .unwrap();
        service
            .add_temporary_rank(&console, &id, &RankName::new("mod"), expiry)
            .await
            .unwrap();
        assert!(service.check_permission(&id, "essentials.kick", None).unwrap());

        clock.advance(Duration::minutes(6));
        assert_eq!(service.sweep_expired_all().await, 2);
        assert!(!service.check_permission(&id, "essentials.kick", None).unwrap());
        assert_eq!(audit.entries_for_action(AuditAction::TempRankExpire).len(), 1);
        assert_eq!(
            audit.entries_for_action(AuditAction::TempPermissionExpire).len(),
            1
        );
        assert_eq!(service.sweep_expired_all().await, 0);
    }

    #[tokio::test]
    async fn test_offline_check() {
        let (service, _, _) = service();
        seed(&service).await;
        let id = PrincipalId::random();
        service.on_connect(id, "steve", Some("overworld".into())).await.unwrap();
        service.on_disconnect(&id).await;

        assert!(service.check_permission(&id, "essentials.spawn", Some("nether")).unwrap());
        assert!(service
            .check_permission(&PrincipalId::random(), "essentials.spawn", None)
            .is_err());
    }
}
