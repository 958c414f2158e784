// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Audit entry types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Actor, PrincipalId, RankName};

// =============================================================================
// Audit Entry
// =============================================================================

/// One immutable record of a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Time-ordered unique id.
    pub id: Uuid,

    /// When the mutation happened.
    pub timestamp: DateTime<Utc>,

    /// Principal that performed the mutation. `None` for console or system.
    pub actor_id: Option<PrincipalId>,

    /// Display name of the actor.
    pub actor_name: String,

    /// What kind of mutation this was.
    pub action: AuditAction,

    /// Free-text description.
    pub detail: String,

    /// Server the mutation originated on.
    pub origin: String,

    /// Affected principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_principal: Option<PrincipalId>,

    /// Affected principal's external identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_external_id: Option<String>,

    /// Affected rank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_rank: Option<RankName>,
}

impl AuditEntry {
    /// Creates a builder for an entry of the given action.
    pub fn builder(action: AuditAction) -> AuditEntryBuilder {
        AuditEntryBuilder::new(action)
    }

    /// Returns `true` if the entry targets the given principal.
    pub fn targets(&self, principal: &PrincipalId) -> bool {
        self.target_principal.as_ref() == Some(principal)
    }
}

/// Builder for [`AuditEntry`].
///
/// # Example
///
/// ```
/// use warden_core::audit::{AuditAction, AuditEntry};
/// use warden_core::types::{Actor, RankName};
///
/// let entry = AuditEntry::builder(AuditAction::RankCreate)
///     .actor(&Actor::console())
///     .target_rank(RankName::new("mod"))
///     .detail("created rank mod")
///     .origin("lobby")
///     .build();
///
/// assert_eq!(entry.actor_name, "CONSOLE");
/// assert!(entry.actor_id.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct AuditEntryBuilder {
    entry: AuditEntry,
}

impl AuditEntryBuilder {
    /// Creates a builder stamped with the current time.
    pub fn new(action: AuditAction) -> Self {
        Self {
            entry: AuditEntry {
                id: Uuid::now_v7(),
                timestamp: Utc::now(),
                actor_id: None,
                actor_name: String::new(),
                action,
                detail: String::new(),
                origin: String::new(),
                target_principal: None,
                target_external_id: None,
                target_rank: None,
            },
        }
    }

    /// Sets the actor.
    pub fn actor(mut self, actor: &Actor) -> Self {
        self.entry.actor_id = actor.id;
        self.entry.actor_name = actor.name.clone();
        self
    }

    /// Overrides the timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.entry.timestamp = timestamp;
        self
    }

    /// Sets the detail text.
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.entry.detail = detail.into();
        self
    }

    /// Sets the origin server tag.
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.entry.origin = origin.into();
        self
    }

    /// Sets the target principal.
    pub fn target_principal(mut self, principal: PrincipalId) -> Self {
        self.entry.target_principal = Some(principal);
        self
    }

    /// Sets the target external id.
    pub fn target_external_id(mut self, external_id: Option<String>) -> Self {
        self.entry.target_external_id = external_id;
        self
    }

    /// Sets the target rank.
    pub fn target_rank(mut self, rank: RankName) -> Self {
        self.entry.target_rank = Some(rank);
        self
    }

    /// Builds the entry.
    pub fn build(self) -> AuditEntry {
        self.entry
    }
}

// =============================================================================
// Audit Action
// =============================================================================

/// Closed set of audited mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // =========================================================================
    // Rank graph
    // =========================================================================
    /// Rank created.
    RankCreate,
    /// Rank deleted.
    RankDelete,
    /// Rank display attributes changed.
    RankUpdate,
    /// Default rank changed.
    RankSetDefault,
    /// Permission added to a rank.
    RankPermissionAdd,
    /// Permission removed from a rank.
    RankPermissionRemove,
    /// Inheritance edge added.
    RankInheritanceAdd,
    /// Inheritance edge removed.
    RankInheritanceRemove,

    // =========================================================================
    // Principal ranks
    // =========================================================================
    /// Principal seen for the first time.
    PrincipalCreate,
    /// Primary rank set or cleared.
    PrimaryRankSet,
    /// Secondary rank added.
    SecondaryRankAdd,
    /// Secondary rank removed.
    SecondaryRankRemove,

    // =========================================================================
    // Principal permissions
    // =========================================================================
    /// Direct permission added.
    PermissionAdd,
    /// Direct permission removed.
    PermissionRemove,
    /// Per-world permission added.
    WorldPermissionAdd,
    /// Per-world permission removed.
    WorldPermissionRemove,

    // =========================================================================
    // Temporary grants
    // =========================================================================
    /// Temporary rank granted.
    TempRankAdd,
    /// Temporary rank removed before expiry.
    TempRankRemove,
    /// Temporary rank purged by the sweep.
    TempRankExpire,
    /// Temporary permission granted.
    TempPermissionAdd,
    /// Temporary permission removed before expiry.
    TempPermissionRemove,
    /// Temporary permission purged by the sweep.
    TempPermissionExpire,

    // =========================================================================
    // External identity
    // =========================================================================
    /// External identity linked.
    ExternalLink,
    /// Role set pushed to the identity bridge.
    RoleSync,
}

impl AuditAction {
    /// Returns the action name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::RankCreate => "rank_create",
            AuditAction::RankDelete => "rank_delete",
            AuditAction::RankUpdate => "rank_update",
            AuditAction::RankSetDefault => "rank_set_default",
            AuditAction::RankPermissionAdd => "rank_permission_add",
            AuditAction::RankPermissionRemove => "rank_permission_remove",
            AuditAction::RankInheritanceAdd => "rank_inheritance_add",
            AuditAction::RankInheritanceRemove => "rank_inheritance_remove",
            AuditAction::PrincipalCreate => "principal_create",
            AuditAction::PrimaryRankSet => "primary_rank_set",
            AuditAction::SecondaryRankAdd => "secondary_rank_add",
            AuditAction::SecondaryRankRemove => "secondary_rank_remove",
            AuditAction::PermissionAdd => "permission_add",
            AuditAction::PermissionRemove => "permission_remove",
            AuditAction::WorldPermissionAdd => "world_permission_add",
            AuditAction::WorldPermissionRemove => "world_permission_remove",
            AuditAction::TempRankAdd => "temp_rank_add",
            AuditAction::TempRankRemove => "temp_rank_remove",
            AuditAction::TempRankExpire => "temp_rank_expire",
            AuditAction::TempPermissionAdd => "temp_permission_add",
            AuditAction::TempPermissionRemove => "temp_permission_remove",
            AuditAction::TempPermissionExpire => "temp_permission_expire",
            AuditAction::ExternalLink => "external_link",
            AuditAction::RoleSync => "role_sync",
        }
    }

    /// Returns `true` if the action changes the rank graph.
    pub fn is_rank_graph(&self) -> bool {
        matches!(
            self,
            AuditAction::RankCreate
                | AuditAction::RankDelete
                | AuditAction::RankUpdate
                | AuditAction::RankSetDefault
                | AuditAction::RankPermissionAdd
                | AuditAction::RankPermissionRemove
                | AuditAction::RankInheritanceAdd
                | AuditAction::RankInheritanceRemove
        )
    }

    /// Returns `true` if the action was performed automatically on expiry.
    pub fn is_expiry(&self) -> bool {
        matches!(
            self,
            AuditAction::TempRankExpire | AuditAction::TempPermissionExpire
        )
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Audit Filter
// =============================================================================

/// Query filter for audit sinks.
///
/// Results are always returned newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    /// Filter by target principal.
    pub principal: Option<PrincipalId>,
    /// Filter by target rank.
    pub rank: Option<RankName>,
    /// Filter by actions (any match, empty = all).
    pub actions: Vec<AuditAction>,
    /// Start time (inclusive).
    pub from: Option<DateTime<Utc>>,
    /// End time (exclusive).
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by target principal.
    pub fn principal(mut self, principal: PrincipalId) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Filters by target rank.
    pub fn rank(mut self, rank: RankName) -> Self {
        self.rank = Some(rank);
        self
    }

    /// Filters by action.
    pub fn action(mut self, action: AuditAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Filters by time range.
    pub fn time_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Sets the limit.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns `true` if the entry passes every criterion except the limit.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(principal) = &self.principal {
            if !entry.targets(principal) {
                return false;
            }
        }
        if let Some(rank) = &self.rank {
            if entry.target_rank.as_ref() != Some(rank) {
                return false;
            }
        }
        if !self.actions.is_empty() && !self.actions.contains(&entry.action) {
            return false;
        }
        if let Some(from) = self.from {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.timestamp >= to {
                return false;
            }
        }
        true
    }
}
