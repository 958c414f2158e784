// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Principal profile and time-bounded grants.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{PermissionNode, PermissionSet, PrincipalId, RankName};

// =============================================================================
// TimedGrant
// =============================================================================

/// A single time-bounded grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedGrant<K> {
    /// Rank name or permission node.
    pub key: K,
    /// The grant is active strictly before this instant.
    pub expires_at: DateTime<Utc>,
}

impl<K> TimedGrant<K> {
    /// Returns `true` if the grant is still active at `now`.
    #[inline]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// =============================================================================
// TimedGrants
// =============================================================================

/// Insertion-ordered map from grant key to expiry.
///
/// Re-granting a key replaces its expiry in place, so the key keeps the
/// position of its first insertion.
///
/// # Example
///
/// ```
/// use chrono::{Duration, Utc};
/// use warden_core::profile::TimedGrants;
///
/// let now = Utc::now();
/// let mut grants = TimedGrants::new();
/// grants.upsert("vip".to_string(), now + Duration::hours(1));
/// grants.upsert("builder".to_string(), now + Duration::minutes(5));
/// grants.upsert("vip".to_string(), now + Duration::hours(2));
///
/// let keys: Vec<_> = grants.iter().map(|g| g.key.as_str()).collect();
/// assert_eq!(keys, vec!["vip", "builder"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimedGrants<K> {
    entries: Vec<TimedGrant<K>>,
}

impl<K> Default for TimedGrants<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: PartialEq> TimedGrants<K> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or re-grants a key. Returns the previous expiry, if any.
    pub fn upsert(&mut self, key: K, expires_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.entries.iter_mut().find(|g| g.key == key) {
            Some(existing) => Some(std::mem::replace(&mut existing.expires_at, expires_at)),
            None => {
                self.entries.push(TimedGrant { key, expires_at });
                None
            }
        }
    }

    /// Removes a key. Returns `false` if it was absent.
    pub fn remove(&mut self, key: &K) -> bool {
        let before = self.entries.len();
        self.entries.retain(|g| &g.key != key);
        self.entries.len() != before
    }

    /// Returns the expiry of a key.
    pub fn expiry(&self, key: &K) -> Option<DateTime<Utc>> {
        self.entries
            .iter()
            .find(|g| &g.key == key)
            .map(|g| g.expires_at)
    }

    /// Returns `true` if the key is present and active at `now`.
    pub fn is_active(&self, key: &K, now: DateTime<Utc>) -> bool {
        self.expiry(key).is_some_and(|at| now < at)
    }

    /// Iterates over grants still active at `now`, in insertion order.
    pub fn active(&self, now: DateTime<Utc>) -> impl Iterator<Item = &TimedGrant<K>> + Clone {
        self.entries.iter().filter(move |g| g.is_active(now))
    }

    /// Removes every grant expired at `now` and returns them in insertion order.
    pub fn drain_expired(&mut self, now: DateTime<Utc>) -> Vec<TimedGrant<K>> {
        let (active, expired) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|g| g.is_active(now));
        self.entries = active;
        expired
    }

    /// Iterates over every grant, active or not.
    pub fn iter(&self) -> std::slice::Iter<'_, TimedGrant<K>> {
        self.entries.iter()
    }

    /// Returns the number of stored grants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// PrincipalProfile
// =============================================================================

/// Everything the engine knows about one principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrincipalProfile {
    /// Stable identifier.
    pub id: PrincipalId,

    /// Last known display name.
    pub name: String,

    /// Primary rank, drives the display projection.
    #[serde(default)]
    pub primary_rank: Option<RankName>,

    /// Additional ranks, resolved in list order after the primary.
    #[serde(default)]
    pub secondary_ranks: Vec<RankName>,

    /// Direct global permission nodes.
    #[serde(default)]
    pub permissions: PermissionSet,

    /// Direct per-world permission nodes.
    #[serde(default)]
    pub world_permissions: BTreeMap<String, PermissionSet>,

    /// Time-bounded ranks.
    #[serde(default)]
    pub temporary_ranks: TimedGrants<RankName>,

    /// Time-bounded permission nodes.
    #[serde(default)]
    pub temporary_permissions: TimedGrants<PermissionNode>,

    /// Linked identity on the external platform.
    #[serde(default)]
    pub external_id: Option<String>,

    /// When the principal was first observed.
    pub first_seen: DateTime<Utc>,

    /// Most recent connection.
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,

    /// Most recent disconnection.
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,

    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl PrincipalProfile {
    /// Creates an empty profile first seen at `now`.
    pub fn new(id: PrincipalId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            primary_rank: None,
            secondary_ranks: Vec::new(),
            permissions: PermissionSet::new(),
            world_permissions: BTreeMap::new(),
            temporary_ranks: TimedGrants::new(),
            temporary_permissions: TimedGrants::new(),
            external_id: None,
            first_seen: now,
            last_login: None,
            last_seen: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Returns `true` if neither a primary nor a secondary rank is set.
    pub fn has_no_rank(&self) -> bool {
        self.primary_rank.is_none() && self.secondary_ranks.is_empty()
    }

    /// Returns `true` if the rank is referenced anywhere in the profile.
    pub fn references_rank(&self, rank: &RankName) -> bool {
        self.primary_rank.as_ref() == Some(rank)
            || self.secondary_ranks.contains(rank)
            || self.temporary_ranks.iter().any(|g| &g.key == rank)
    }

    /// Effective rank names at `now`: primary, secondaries, then active temporaries.
    ///
    /// Duplicates are dropped, keeping the first occurrence.
    pub fn effective_ranks(&self, now: DateTime<Utc>) -> Vec<RankName> {
        let mut ranks: Vec<RankName> = Vec::new();
        let candidates = self
            .primary_rank
            .iter()
            .chain(self.secondary_ranks.iter())
            .chain(self.temporary_ranks.active(now).map(|g| &g.key));
        for rank in candidates {
            if !ranks.contains(rank) {
                ranks.push(rank.clone());
            }
        }
        ranks
    }
}
