// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Rank entity.
//!
//! A rank is a named, inheritable bundle of permissions and display
//! attributes. The inheritance graph lives in each rank's ordered
//! `inherits` list and is interpreted by the resolver.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::WardenResult;
use crate::types::{PermissionNode, PermissionSet, RankName};

// =============================================================================
// Rank
// =============================================================================

/// A named role in the inheritance graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rank {
    /// Unique, case-insensitive name.
    pub name: RankName,

    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,

    /// Chat prefix.
    #[serde(default)]
    pub prefix: String,

    /// Chat suffix.
    #[serde(default)]
    pub suffix: String,

    /// Color code applied to the principal's name.
    #[serde(default)]
    pub name_color: String,

    /// Color code applied to the principal's chat messages.
    #[serde(default)]
    pub chat_color: String,

    /// Priority, higher wins when ranks are listed.
    #[serde(default)]
    pub weight: i32,

    /// Inherited ranks, walked in this order.
    #[serde(default)]
    pub inherits: Vec<RankName>,

    /// Global permission nodes.
    #[serde(default)]
    pub permissions: PermissionSet,

    /// Per-world permission nodes.
    #[serde(default)]
    pub world_permissions: BTreeMap<String, PermissionSet>,

    /// Whether new principals receive this rank.
    #[serde(default)]
    pub is_default: bool,

    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Rank {
    /// Creates an empty rank whose display name equals its name.
    pub fn new(name: impl Into<RankName>) -> Self {
        let name = name.into();
        Self {
            display_name: name.as_str().to_string(),
            name,
            prefix: String::new(),
            suffix: String::new(),
            name_color: String::new(),
            chat_color: String::new(),
            weight: 0,
            inherits: Vec::new(),
            permissions: PermissionSet::new(),
            world_permissions: BTreeMap::new(),
            is_default: false,
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a builder.
    pub fn builder(name: impl Into<RankName>) -> RankBuilder {
        RankBuilder::new(name)
    }

    /// Returns the permission set for a world, if any.
    pub fn world_set(&self, world: &str) -> Option<&PermissionSet> {
        self.world_permissions.get(world)
    }

    /// Adds a permission node globally or for a world. Returns `false` if present.
    pub fn add_permission(&mut self, node: PermissionNode, world: Option<&str>) -> bool {
        match world {
            Some(world) => self
                .world_permissions
                .entry(world.to_string())
                .or_default()
                .insert(node),
            None => self.permissions.insert(node),
        }
    }

    /// Removes a permission node globally or for a world. Returns `false` if absent.
    pub fn remove_permission(&mut self, node: &PermissionNode, world: Option<&str>) -> bool {
        match world {
            Some(world) => {
                let Some(set) = self.world_permissions.get_mut(world) else {
                    return false;
                };
                let removed = set.remove(node);
                if set.is_empty() {
                    self.world_permissions.remove(world);
                }
                removed
            }
            None => self.permissions.remove(node),
        }
    }

    /// Returns `true` if this rank directly inherits `parent`.
    pub fn inherits_from(&self, parent: &RankName) -> bool {
        self.inherits.contains(parent)
    }

    /// Appends an inheritance edge. Returns `false` if already present.
    pub fn add_inheritance(&mut self, parent: RankName) -> bool {
        if self.inherits.contains(&parent) {
            return false;
        }
        self.inherits.push(parent);
        true
    }

    /// Removes an inheritance edge. Returns `false` if absent.
    pub fn remove_inheritance(&mut self, parent: &RankName) -> bool {
        let before = self.inherits.len();
        self.inherits.retain(|p| p != parent);
        self.inherits.len() != before
    }
}

// =============================================================================
// Rank Builder
// =============================================================================

/// Builder for [`Rank`], parsing raw permission strings on `build`.
///
/// # Example
///
/// ```
/// use warden_core::rank::Rank;
///
/// let rank = Rank::builder("mod")
///     .inherit("default")
///     .permission("essentials.kick")
///     .world_permission("nether", "-essentials.fly")
///     .prefix("[Mod] ")
///     .weight(10)
///     .build()
///     .unwrap();
///
/// assert_eq!(rank.permissions.len(), 1);
/// assert_eq!(rank.world_set("nether").map(|s| s.len()), Some(1));
/// ```
#[derive(Debug)]
pub struct RankBuilder {
    rank: Rank,
    permissions: Vec<String>,
    world_permissions: Vec<(String, String)>,
}

impl RankBuilder {
    /// Creates a new builder.
    pub fn new(name: impl Into<RankName>) -> Self {
        Self {
            rank: Rank::new(name),
            permissions: Vec::new(),
            world_permissions: Vec::new(),
        }
    }

    /// Sets the display name.
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.rank.display_name = display_name.into();
        self
    }

    /// Sets the prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.rank.prefix = prefix.into();
        self
    }

    /// Sets the suffix.
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.rank.suffix = suffix.into();
        self
    }

    /// Sets the name and chat colors.
    pub fn colors(mut self, name_color: impl Into<String>, chat_color: impl Into<String>) -> Self {
        self.rank.name_color = name_color.into();
        self.rank.chat_color = chat_color.into();
        self
    }

    /// Sets the weight.
    pub fn weight(mut self, weight: i32) -> Self {
        self.rank.weight = weight;
        self
    }

    /// Adds an inherited rank.
    pub fn inherit(mut self, parent: impl Into<RankName>) -> Self {
        self.rank.add_inheritance(parent.into());
        self
    }

    /// Adds a raw global permission string.
    pub fn permission(mut self, raw: impl Into<String>) -> Self {
        self.permissions.push(raw.into());
        self
    }

    /// Adds a raw per-world permission string.
    pub fn world_permission(mut self, world: impl Into<String>, raw: impl Into<String>) -> Self {
        self.world_permissions.push((world.into(), raw.into()));
        self
    }

    /// Marks the rank as the default rank.
    pub fn default_rank(mut self, is_default: bool) -> Self {
        self.rank.is_default = is_default;
        self
    }

    /// Adds a metadata entry.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.rank.metadata.insert(key.into(), value.into());
        self
    }

    /// Builds the rank, failing on the first malformed permission string.
    pub fn build(self) -> WardenResult<Rank> {
        let mut rank = self.rank;
        for raw in &self.permissions {
            rank.add_permission(PermissionNode::parse(raw)?, None);
        }
        for (world, raw) in &self.world_permissions {
            rank.add_permission(PermissionNode::parse(raw)?, Some(world));
        }
        Ok(rank)
    }
}
