// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Grant ledger.
//!
//! The ledger owns every known [`PrincipalProfile`]. Each profile sits behind
//! its own mutex, so mutations on different principals never contend while
//! a mutation and an expiry sweep on the same principal are serialized.
//!
//! # Temporary grants
//!
//! ```text
//!            add (expiry > now)            remove / sweep
//!   Absent ─────────────────────▶ Active ─────────────────▶ Absent
//!                                  │  ▲
//!                                  └──┘ re-grant (expiry replaced,
//!                                           position kept)
//! ```
//!
//! A grant whose expiry has passed is invisible to the resolver even before
//! the sweep purges it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::clock::SharedClock;
use crate::error::{WardenError, WardenResult};
use crate::profile::{PrincipalProfile, TimedGrant};
use crate::types::{PermissionNode, PrincipalId, RankName};

/// Default cap on secondary ranks per principal.
pub const DEFAULT_MAX_SECONDARY_RANKS: usize = 16;

/// How long a mutation waits for a principal's lock before giving up.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// SweepOutcome
// =============================================================================

/// Grants purged from one principal by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    /// The swept principal.
    pub principal: PrincipalId,
    /// Expired temporary ranks, in insertion order.
    pub ranks: Vec<TimedGrant<RankName>>,
    /// Expired temporary permissions, in insertion order.
    pub permissions: Vec<TimedGrant<PermissionNode>>,
}

impl SweepOutcome {
    /// Total number of purged grants.
    pub fn count(&self) -> usize {
        self.ranks.len() + self.permissions.len()
    }

    /// Returns `true` if nothing was purged.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

// =============================================================================
// GrantLedger
// =============================================================================

/// Per-principal grant storage.
#[derive(Debug)]
pub struct GrantLedger {
    profiles: DashMap<PrincipalId, Arc<Mutex<PrincipalProfile>>>,
    clock: SharedClock,
    max_secondary_ranks: usize,
}

impl GrantLedger {
    /// Creates an empty ledger.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            profiles: DashMap::new(),
            clock,
            max_secondary_ranks: DEFAULT_MAX_SECONDARY_RANKS,
        }
    }

    /// Sets the cap on secondary ranks per principal.
    pub fn with_max_secondary_ranks(mut self, max: usize) -> Self {
        self.max_secondary_ranks = max;
        self
    }

    /// Returns the clock used for expiry decisions.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Returns the number of known principals.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Returns `true` if no principal is known.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Returns `true` if the principal is known.
    pub fn contains(&self, id: &PrincipalId) -> bool {
        self.profiles.contains_key(id)
    }

    /// Returns every known principal id.
    pub fn principals(&self) -> Vec<PrincipalId> {
        self.profiles.iter().map(|e| *e.key()).collect()
    }

    // =========================================================================
    // Profile access
    // =========================================================================

    /// Returns a snapshot of a profile.
    pub fn get(&self, id: &PrincipalId) -> Option<PrincipalProfile> {
        let slot = self.slot(id)?;
        let profile = slot.lock();
        Some(profile.clone())
    }

    /// Inserts or replaces a profile. Returns the replaced snapshot.
    pub fn insert(&self, profile: PrincipalProfile) -> Option<PrincipalProfile> {
        let id = profile.id;
        self.profiles
            .insert(id, Arc::new(Mutex::new(profile)))
            .map(|old| old.lock().clone())
    }

    /// Returns the profile, creating an empty one on first sight.
    ///
    /// The boolean is `true` when the profile was created by this call.
    pub fn get_or_create(&self, id: PrincipalId, name: &str) -> (PrincipalProfile, bool) {
        let mut created = false;
        let slot = self
            .profiles
            .entry(id)
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(PrincipalProfile::new(id, name, self.clock.now())))
            })
            .clone();
        let profile = slot.lock().clone();
        if created {
            debug!(principal = %id, name, "Created principal profile");
        }
        (profile, created)
    }

    /// Applies `f` to a profile under its lock.
    ///
    /// The DashMap shard guard is released before the profile lock is taken.
    pub fn update<R>(
        &self,
        id: &PrincipalId,
        f: impl FnOnce(&mut PrincipalProfile) -> WardenResult<R>,
    ) -> WardenResult<R> {
        let slot = self
            .slot(id)
            .ok_or_else(|| WardenError::principal_not_found(id))?;
        let mut profile = slot
            .try_lock_for(LOCK_TIMEOUT)
            .ok_or_else(|| WardenError::ConcurrentMutationConflict {
                principal: id.to_string(),
            })?;
        f(&mut *profile)
    }

    fn slot(&self, id: &PrincipalId) -> Option<Arc<Mutex<PrincipalProfile>>> {
        self.profiles.get(id).map(|e| Arc::clone(e.value()))
    }

    // =========================================================================
    // Permanent grants
    // =========================================================================

    /// Sets or clears the primary rank. Returns the previous primary.
    ///
    /// A rank promoted to primary is removed from the secondary list.
    pub fn set_primary_rank(
        &self,
        id: &PrincipalId,
        rank: Option<RankName>,
    ) -> WardenResult<Option<RankName>> {
        self.update(id, |p| {
            if let Some(rank) = &rank {
                p.secondary_ranks.retain(|r| r != rank);
            }
            Ok(std::mem::replace(&mut p.primary_rank, rank))
        })
    }

    /// Appends a secondary rank. Returns `false` if already held.
    pub fn add_secondary_rank(&self, id: &PrincipalId, rank: RankName) -> WardenResult<bool> {
        let max = self.max_secondary_ranks;
        self.update(id, |p| {
            if p.primary_rank.as_ref() == Some(&rank) || p.secondary_ranks.contains(&rank) {
                return Ok(false);
            }
            if p.secondary_ranks.len() >= max {
                return Err(WardenError::limit_exceeded(
                    p.name.clone(),
                    "secondary ranks",
                    max,
                ));
            }
            p.secondary_ranks.push(rank);
            Ok(true)
        })
    }

    /// Removes a secondary rank. Returns `false` if absent.
    pub fn remove_secondary_rank(&self, id: &PrincipalId, rank: &RankName) -> WardenResult<bool> {
        self.update(id, |p| {
            let before = p.secondary_ranks.len();
            p.secondary_ranks.retain(|r| r != rank);
            Ok(p.secondary_ranks.len() != before)
        })
    }

    /// Adds a direct permission, globally or for a world.
    pub fn add_permission(
        &self,
        id: &PrincipalId,
        node: PermissionNode,
        world: Option<&str>,
    ) -> WardenResult<bool> {
        self.update(id, |p| {
            Ok(match world {
                Some(world) => p
                    .world_permissions
                    .entry(world.to_string())
                    .or_default()
                    .insert(node),
                None => p.permissions.insert(node),
            })
        })
    }

    /// Removes a direct permission, globally or for a world.
    pub fn remove_permission(
        &self,
        id: &PrincipalId,
        node: &PermissionNode,
        world: Option<&str>,
    ) -> WardenResult<bool> {
        self.update(id, |p| {
            Ok(match world {
                Some(world) => {
                    let Some(set) = p.world_permissions.get_mut(world) else {
                        return Ok(false);
                    };
                    let removed = set.remove(node);
                    if set.is_empty() {
                        p.world_permissions.remove(world);
                    }
                    removed
                }
                None => p.permissions.remove(node),
            })
        })
    }

    /// Adds a per-world direct permission.
    pub fn add_world_permission(
        &self,
        id: &PrincipalId,
        world: &str,
        node: PermissionNode,
    ) -> WardenResult<bool> {
        self.add_permission(id, node, Some(world))
    }

    /// Removes a per-world direct permission.
    pub fn remove_world_permission(
        &self,
        id: &PrincipalId,
        world: &str,
        node: &PermissionNode,
    ) -> WardenResult<bool> {
        self.remove_permission(id, node, Some(world))
    }

    /// Sets or clears the linked external identity.
    pub fn set_external_id(
        &self,
        id: &PrincipalId,
        external_id: Option<String>,
    ) -> WardenResult<Option<String>> {
        self.update(id, |p| Ok(std::mem::replace(&mut p.external_id, external_id)))
    }

    /// Records a connection and refreshes the display name.
    pub fn touch_login(&self, id: &PrincipalId, name: &str) -> WardenResult<()> {
        let now = self.clock.now();
        self.update(id, |p| {
            p.name = name.to_string();
            p.last_login = Some(now);
            Ok(())
        })
    }

    /// Records a disconnection.
    pub fn touch_seen(&self, id: &PrincipalId) -> WardenResult<()> {
        let now = self.clock.now();
        self.update(id, |p| {
            p.last_seen = Some(now);
            Ok(())
        })
    }

    /// Removes every reference to `rank` from every profile.
    ///
    /// Returns the principals that were changed.
    pub fn strip_rank(&self, rank: &RankName) -> Vec<PrincipalId> {
        let mut changed = Vec::new();
        for id in self.principals() {
            let result = self.update(&id, |p| {
                if !p.references_rank(rank) {
                    return Ok(false);
                }
                if p.primary_rank.as_ref() == Some(rank) {
                    p.primary_rank = None;
                }
                p.secondary_ranks.retain(|r| r != rank);
                p.temporary_ranks.remove(rank);
                Ok(true)
            });
            if let Ok(true) = result {
                changed.push(id);
            }
        }
        changed
    }

    // =========================================================================
    // Temporary grants
    // =========================================================================

    fn check_future(&self, key: &str, expires_at: DateTime<Utc>) -> WardenResult<()> {
        if expires_at <= self.clock.now() {
            return Err(WardenError::invalid_grant(
                key,
                expires_at,
                "expiry is not in the future",
            ));
        }
        Ok(())
    }

    /// Grants a rank until `expires_at`. Returns the previous expiry on re-grant.
    pub fn add_temporary_rank(
        &self,
        id: &PrincipalId,
        rank: RankName,
        expires_at: DateTime<Utc>,
    ) -> WardenResult<Option<DateTime<Utc>>> {
        self.check_future(rank.as_str(), expires_at)?;
        self.update(id, |p| Ok(p.temporary_ranks.upsert(rank, expires_at)))
    }

    /// Removes a temporary rank. Returns `false` if absent.
    pub fn remove_temporary_rank(&self, id: &PrincipalId, rank: &RankName) -> WardenResult<bool> {
        self.update(id, |p| Ok(p.temporary_ranks.remove(rank)))
    }

    /// Grants a permission until `expires_at`. Returns the previous expiry on re-grant.
    pub fn add_temporary_permission(
        &self,
        id: &PrincipalId,
        node: PermissionNode,
        expires_at: DateTime<Utc>,
    ) -> WardenResult<Option<DateTime<Utc>>> {
        self.check_future(&node.to_string(), expires_at)?;
        self.update(id, |p| Ok(p.temporary_permissions.upsert(node, expires_at)))
    }

    /// Removes a temporary permission. Returns `false` if absent.
    pub fn remove_temporary_permission(
        &self,
        id: &PrincipalId,
        node: &PermissionNode,
    ) -> WardenResult<bool> {
        self.update(id, |p| Ok(p.temporary_permissions.remove(node)))
    }

    /// Purges every expired temporary grant of one principal.
    pub fn sweep_expired(&self, id: &PrincipalId) -> WardenResult<SweepOutcome> {
        let now = self.clock.now();
        self.update(id, |p| {
            let outcome = SweepOutcome {
                principal: p.id,
                ranks: p.temporary_ranks.drain_expired(now),
                permissions: p.temporary_permissions.drain_expired(now),
            };
            if !outcome.is_empty() {
                trace!(principal = %p.id, purged = outcome.count(), "Swept expired grants");
            }
            Ok(outcome)
        })
    }

    /// Sweeps every principal and returns the non-empty outcomes.
    pub fn sweep_all(&self) -> Vec<SweepOutcome> {
        self.principals()
            .iter()
            .filter_map(|id| self.sweep_expired(id).ok())
            .filter(|outcome| !outcome.is_empty())
            .collect()
    }
}
