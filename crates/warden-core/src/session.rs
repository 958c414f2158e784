// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session projection cache.
//!
//! Every attached principal owns a [`SessionHandle`] holding its last
//! resolved capabilities and display projection. Recomputes on one handle
//! are serialized by a per-handle mutex, so a mutation followed by a
//! recompute and a check on the same principal always observes the
//! mutation. Readers only take the state read lock.
//!
//! A projection remembers the earliest expiry among the temporary grants it
//! was resolved from. Checks made at or after that instant recompute first,
//! so an expired grant never answers a check even before the sweeper runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, trace};

use crate::ledger::GrantLedger;
use crate::rank::Rank;
use crate::resolver::{PermissionResolver, ResolvedCapabilities};
use crate::store::SharedRankStore;
use crate::types::PrincipalId;

// =============================================================================
// DisplayProjection
// =============================================================================

/// Chat-facing attributes derived from the primary rank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisplayProjection {
    /// Principal display name.
    pub display_name: String,
    /// Primary rank prefix.
    pub prefix: String,
    /// Primary rank suffix.
    pub suffix: String,
    /// Name color code.
    pub name_color: String,
    /// Chat color code.
    pub chat_color: String,
    /// `prefix + name_color + display_name + suffix`.
    pub formatted_name: String,
}

impl DisplayProjection {
    /// Builds the projection for `name` under an optional primary rank.
    pub fn project(name: &str, primary: Option<&Rank>) -> Self {
        let Some(rank) = primary else {
            return Self {
                display_name: name.to_string(),
                formatted_name: name.to_string(),
                ..Self::default()
            };
        };
        Self {
            display_name: name.to_string(),
            prefix: rank.prefix.clone(),
            suffix: rank.suffix.clone(),
            name_color: rank.name_color.clone(),
            chat_color: rank.chat_color.clone(),
            formatted_name: format!("{}{}{}{}", rank.prefix, rank.name_color, name, rank.suffix),
        }
    }
}

// =============================================================================
// SessionHandle
// =============================================================================

#[derive(Debug, Default)]
struct SessionState {
    world: Option<String>,
    capabilities: Option<ResolvedCapabilities>,
    display: DisplayProjection,
    next_expiry: Option<DateTime<Utc>>,
}

/// Live index for one attached principal.
#[derive(Debug)]
pub struct SessionHandle {
    principal: PrincipalId,
    state: RwLock<SessionState>,
    recompute_lock: Mutex<()>,
    generation: AtomicU64,
    detached: AtomicBool,
}

impl SessionHandle {
    fn new(principal: PrincipalId, world: Option<String>) -> Self {
        Self {
            principal,
            state: RwLock::new(SessionState {
                world,
                ..SessionState::default()
            }),
            recompute_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            detached: AtomicBool::new(false),
        }
    }

    /// The principal this handle belongs to.
    pub fn principal(&self) -> PrincipalId {
        self.principal
    }

    /// Current world.
    pub fn world(&self) -> Option<String> {
        self.state.read().world.clone()
    }

    /// Number of completed recomputes.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns `true` once the handle has been released.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Returns `true` if `name` is granted in the last projection.
    pub fn has(&self, name: &str) -> bool {
        self.state
            .read()
            .capabilities
            .as_ref()
            .is_some_and(|c| c.has(name))
    }

    /// Earliest temporary grant expiry seen by the last recompute.
    pub fn next_expiry(&self) -> Option<DateTime<Utc>> {
        self.state.read().next_expiry
    }

    /// Returns `true` if a temporary grant in the projection has expired by `now`.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.state.read().next_expiry.is_some_and(|at| at <= now)
    }

    /// Last resolved capabilities, if any recompute completed.
    pub fn capabilities(&self) -> Option<ResolvedCapabilities> {
        self.state.read().capabilities.clone()
    }

    /// Current display projection.
    pub fn display(&self) -> DisplayProjection {
        self.state.read().display.clone()
    }

    fn mark_detached(&self) {
        self.detached.store(true, Ordering::Release);
    }
}

// =============================================================================
// SessionProjectionCache
// =============================================================================

/// Index of attached principals and their resolved capabilities.
#[derive(Debug)]
pub struct SessionProjectionCache {
    handles: DashMap<PrincipalId, Arc<SessionHandle>>,
    ledger: Arc<GrantLedger>,
    store: SharedRankStore,
}

impl SessionProjectionCache {
    /// Creates an empty cache reading from `ledger` and `store`.
    pub fn new(ledger: Arc<GrantLedger>, store: SharedRankStore) -> Self {
        Self {
            handles: DashMap::new(),
            ledger,
            store,
        }
    }

    /// Installs a fresh handle, releasing any previous one.
    pub fn attach(&self, principal: PrincipalId, world: Option<String>) -> Arc<SessionHandle> {
        let handle = Arc::new(SessionHandle::new(principal, world));
        if let Some(previous) = self.handles.insert(principal, Arc::clone(&handle)) {
            previous.mark_detached();
            debug!(principal = %principal, "Replaced existing session handle");
        }
        handle
    }

    /// Releases a handle. Returns `false` if none was attached.
    pub fn detach(&self, principal: &PrincipalId) -> bool {
        match self.handles.remove(principal) {
            Some((_, handle)) => {
                handle.mark_detached();
                true
            }
            None => false,
        }
    }

    /// Returns the handle of an attached principal.
    pub fn handle(&self, principal: &PrincipalId) -> Option<Arc<SessionHandle>> {
        self.handles.get(principal).map(|e| Arc::clone(e.value()))
    }

    /// Returns `true` if the principal is attached.
    pub fn is_attached(&self, principal: &PrincipalId) -> bool {
        self.handles.contains_key(principal)
    }

    /// Attached principals.
    pub fn attached(&self) -> Vec<PrincipalId> {
        self.handles.iter().map(|e| *e.key()).collect()
    }

    /// Number of attached principals.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if nobody is attached.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Returns the handle of an attached principal, recomputing it first if
    /// one of its temporary grants has expired since the last recompute.
    pub fn current_handle(&self, principal: &PrincipalId) -> Option<Arc<SessionHandle>> {
        let handle = self.handle(principal)?;
        if handle.is_stale(self.ledger.clock().now()) {
            trace!(principal = %principal, "Projection outlived a temporary grant");
            self.recompute(principal);
            return self.handle(principal);
        }
        Some(handle)
    }

    /// Checks a permission against the cached projection.
    ///
    /// Returns `None` if the principal is not attached.
    pub fn has_permission(&self, principal: &PrincipalId, name: &str) -> Option<bool> {
        self.current_handle(principal).map(|h| h.has(name))
    }

    /// Re-resolves an attached principal for its current world.
    ///
    /// Returns `None` if the principal is not attached, its handle was
    /// replaced mid-flight, or the ledger has no profile for it.
    pub fn recompute(&self, principal: &PrincipalId) -> Option<ResolvedCapabilities> {
        let handle = self.handle(principal)?;
        let _serialized = handle.recompute_lock.lock();
        if handle.is_detached() {
            return None;
        }

        let profile = self.ledger.get(principal)?;
        let world = handle.world();
        let now = self.ledger.clock().now();

        let resolved = PermissionResolver::new(self.store.as_ref()).resolve(
            &profile,
            world.as_deref(),
            now,
        );
        for anomaly in &resolved.anomalies {
            debug!(principal = %principal, %anomaly, "Resolution anomaly");
        }

        let primary = profile
            .primary_rank
            .as_ref()
            .and_then(|name| self.store.get(name));
        let display = DisplayProjection::project(&profile.name, primary.as_deref());
        let next_expiry = profile
            .temporary_ranks
            .active(now)
            .map(|g| g.expires_at)
            .chain(profile.temporary_permissions.active(now).map(|g| g.expires_at))
            .min();

        {
            let mut state = handle.state.write();
            state.capabilities = Some(resolved.clone());
            state.display = display;
            state.next_expiry = next_expiry;
        }
        let generation = handle.generation.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(
            principal = %principal,
            generation,
            granted = resolved.granted.len(),
            "Recomputed session projection"
        );

        Some(resolved)
    }

    /// Moves an attached principal to another world and recomputes.
    pub fn set_world(
        &self,
        principal: &PrincipalId,
        world: Option<String>,
    ) -> Option<ResolvedCapabilities> {
        let handle = self.handle(principal)?;
        {
            let _serialized = handle.recompute_lock.lock();
            handle.state.write().world = world;
        }
        self.recompute(principal)
    }

    /// Recomputes every attached principal. Returns how many were refreshed.
    pub fn recompute_all(&self) -> usize {
        self.attached()
            .iter()
            .filter(|id| self.recompute(id).is_some())
            .count()
    }
}
