// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Permission resolution.
//!
//! Resolution is a pure function of a profile snapshot, the rank graph, the
//! requested world, and the current instant. Permission nodes are applied
//! in a fixed order and each node writes `name -> polarity` into an ordered
//! merge map, so a later step always overrides an earlier one. Inside one
//! step, negations are applied after grants:
//!
//! ```text
//! 1. primary rank        ┐  each rank: own nodes, world nodes,
//! 2. secondary ranks     │  then inherited ranks depth first
//! 3. active temp ranks   ┘
//! 4. direct nodes, then direct world nodes
//! 5. active temp permissions
//! ```
//!
//! Direct and temporary permissions are applied after every rank, so they
//! beat rank-level nodes regardless of polarity.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::profile::PrincipalProfile;
use crate::store::RankStore;
use crate::types::{PermissionNode, PermissionSet, RankName};

/// Inheritance chains longer than this are cut off.
pub const MAX_INHERITANCE_DEPTH: usize = 64;

// =============================================================================
// PermissionMerge
// =============================================================================

/// Ordered map from permission name to its final value.
///
/// Overwriting a name keeps the position of its first insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionMerge {
    entries: Vec<(String, bool)>,
    index: HashMap<String, usize>,
}

impl PermissionMerge {
    /// Creates an empty merge map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `name -> is_grant`, overwriting any earlier value.
    pub fn apply(&mut self, node: &PermissionNode) {
        let value = node.is_grant();
        match self.index.get(node.name()) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(node.name().to_string(), self.entries.len());
                self.entries.push((node.name().to_string(), value));
            }
        }
    }

    /// Applies one set: its grants first, then its negations.
    ///
    /// Inside a single set a negation always beats a grant of the same name,
    /// whatever order the two were added in. Between sets the later write
    /// still wins.
    pub fn apply_set(&mut self, set: &PermissionSet) {
        self.apply_layer(set.iter());
    }

    /// Same as [`apply_set`](Self::apply_set) for any group of nodes applied
    /// as one step.
    pub fn apply_layer<'n>(&mut self, nodes: impl Iterator<Item = &'n PermissionNode> + Clone) {
        for node in nodes.clone().filter(|n| n.is_grant()) {
            self.apply(node);
        }
        for node in nodes.filter(|n| !n.is_grant()) {
            self.apply(node);
        }
    }

    /// Returns the final value for a name, if it was written at all.
    pub fn get(&self, name: &str) -> Option<bool> {
        self.index.get(name).map(|&i| self.entries[i].1)
    }

    /// Iterates `(name, value)` in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    /// Returns the number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names whose final value is `true`.
    pub fn granted(&self) -> HashSet<String> {
        self.entries
            .iter()
            .filter(|(_, v)| *v)
            .map(|(n, _)| n.clone())
            .collect()
    }
}

// =============================================================================
// ResolutionAnomaly
// =============================================================================

/// Something odd noticed while walking the rank graph.
///
/// Anomalies never add permissions and never abort resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionAnomaly {
    /// A referenced rank does not exist.
    UnknownRank {
        /// The missing rank.
        rank: RankName,
    },
    /// A rank was reached again while still on the current path.
    CycleSkipped {
        /// The rank that closed the cycle.
        rank: RankName,
    },
    /// The inheritance chain exceeded [`MAX_INHERITANCE_DEPTH`].
    DepthExceeded {
        /// The rank that was not applied.
        rank: RankName,
    },
}

impl fmt::Display for ResolutionAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRank { rank } => write!(f, "unknown rank '{}'", rank),
            Self::CycleSkipped { rank } => write!(f, "inheritance cycle at '{}'", rank),
            Self::DepthExceeded { rank } => write!(
                f,
                "inheritance deeper than {} at '{}'",
                MAX_INHERITANCE_DEPTH, rank
            ),
        }
    }
}

// =============================================================================
// ResolvedCapabilities
// =============================================================================

/// The result of resolving one principal for one world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCapabilities {
    /// World the resolution was made for.
    pub world: Option<String>,
    /// Instant used to filter temporary grants.
    pub resolved_at: DateTime<Utc>,
    /// Final value per permission name.
    pub merge: PermissionMerge,
    /// Names whose final value is `true`.
    pub granted: HashSet<String>,
    /// Anomalies noticed during the walk.
    pub anomalies: Vec<ResolutionAnomaly>,
}

impl ResolvedCapabilities {
    /// Returns `true` if the exact name is granted.
    pub fn has(&self, name: &str) -> bool {
        self.granted.contains(name)
    }

    /// Returns `true` if the name's final value is an explicit negation.
    pub fn is_negated(&self, name: &str) -> bool {
        self.merge.get(name) == Some(false)
    }

    /// Granted names sorted alphabetically.
    pub fn granted_sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.granted.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// =============================================================================
// PermissionResolver
// =============================================================================

/// Resolves profiles against a rank store.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use warden_core::profile::PrincipalProfile;
/// use warden_core::rank::Rank;
/// use warden_core::resolver::PermissionResolver;
/// use warden_core::store::InMemoryRankStore;
/// use warden_core::types::{PrincipalId, RankName};
///
/// let store = InMemoryRankStore::with_ranks([
///     Rank::builder("default").permission("essentials.spawn").build().unwrap(),
///     Rank::builder("mod").inherit("default").permission("essentials.kick").build().unwrap(),
/// ]);
///
/// let now = Utc::now();
/// let mut profile = PrincipalProfile::new(PrincipalId::random(), "steve", now);
/// profile.primary_rank = Some(RankName::new("mod"));
///
/// let resolved = PermissionResolver::new(&store).resolve(&profile, None, now);
/// assert_eq!(resolved.granted_sorted(), vec!["essentials.kick", "essentials.spawn"]);
/// ```
pub struct PermissionResolver<'a> {
    store: &'a dyn RankStore,
}

impl<'a> PermissionResolver<'a> {
    /// Creates a resolver reading from `store`.
    pub fn new(store: &'a dyn RankStore) -> Self {
        Self { store }
    }

    /// Resolves `profile` for `world` at `now`.
    pub fn resolve(
        &self,
        profile: &PrincipalProfile,
        world: Option<&str>,
        now: DateTime<Utc>,
    ) -> ResolvedCapabilities {
        let mut walk = Walk {
            store: self.store,
            world,
            merge: PermissionMerge::new(),
            anomalies: Vec::new(),
        };

        let permanent = profile.primary_rank.iter().chain(profile.secondary_ranks.iter());
        for rank in permanent {
            walk.top_level(rank);
        }
        for grant in profile.temporary_ranks.active(now) {
            walk.top_level(&grant.key);
        }

        let mut merge = walk.merge;
        merge.apply_set(&profile.permissions);
        if let Some(set) = world.and_then(|w| profile.world_permissions.get(w)) {
            merge.apply_set(set);
        }
        merge.apply_layer(profile.temporary_permissions.active(now).map(|g| &g.key));

        ResolvedCapabilities {
            world: world.map(str::to_string),
            resolved_at: now,
            granted: merge.granted(),
            merge,
            anomalies: walk.anomalies,
        }
    }
}

struct Walk<'a, 'w> {
    store: &'a dyn RankStore,
    world: Option<&'w str>,
    merge: PermissionMerge,
    anomalies: Vec<ResolutionAnomaly>,
}

impl Walk<'_, '_> {
    fn top_level(&mut self, rank: &RankName) {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        self.visit(rank, 0, &mut visited, &mut path);
    }

    fn visit(
        &mut self,
        name: &RankName,
        depth: usize,
        visited: &mut HashSet<RankName>,
        path: &mut Vec<RankName>,
    ) {
        if depth >= MAX_INHERITANCE_DEPTH {
            self.anomalies
                .push(ResolutionAnomaly::DepthExceeded { rank: name.clone() });
            return;
        }
        if visited.contains(name) {
            // Diamonds are skipped silently; only a revisit on the live path is a cycle.
            if path.contains(name) {
                self.anomalies
                    .push(ResolutionAnomaly::CycleSkipped { rank: name.clone() });
            }
            return;
        }
        let Some(rank) = self.store.get(name) else {
            self.anomalies
                .push(ResolutionAnomaly::UnknownRank { rank: name.clone() });
            return;
        };

        visited.insert(name.clone());
        path.push(name.clone());

        self.merge.apply_set(&rank.permissions);
        if let Some(set) = self.world.and_then(|w| rank.world_set(w)) {
            self.merge.apply_set(set);
        }
        for parent in &rank.inherits {
            self.visit(parent, depth + 1, visited, path);
        }

        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::Rank;
    use crate::store::InMemoryRankStore;
    use crate::types::PrincipalId;
    use chrono::Duration;

    fn profile(primary: Option<&str>, secondary: &[&str]) -> PrincipalProfile {
        let mut p = PrincipalProfile::new(PrincipalId::random(), "steve", Utc::now());
        p.primary_rank = primary.map(RankName::new);
        p.secondary_ranks = secondary.iter().map(|s| RankName::new(*s)).collect();
        p
    }

    #[test]
    fn test_merge_last_write_wins_keeps_position() {
        let mut merge = PermissionMerge::new();
        merge.apply(&PermissionNode::grant("a"));
        merge.apply(&PermissionNode::grant("b"));
        merge.apply(&PermissionNode::negate("a"));

        let entries: Vec<_> = merge.iter().collect();
        assert_eq!(entries, vec![("a", false), ("b", true)]);
        assert_eq!(merge.granted().len(), 1);
    }

    #[test]
    fn test_negation_wins_inside_one_set() {
        let store = InMemoryRankStore::with_ranks([Rank::builder("r")
            .permission("-x")
            .permission("x")
            .permission("y")
            .build()
            .unwrap()]);

        let resolved = PermissionResolver::new(&store).resolve(&profile(Some("r"), &[]), None, Utc::now());
        assert!(!resolved.has("x"));
        assert!(resolved.is_negated("x"));
        assert!(resolved.has("y"));

        let mut p = profile(None, &[]);
        p.permissions.insert(PermissionNode::negate("fly"));
        p.permissions.insert(PermissionNode::grant("fly"));
        let resolved = PermissionResolver::new(&store).resolve(&p, None, Utc::now());
        assert!(!resolved.has("fly"));
    }

    #[test]
    fn test_negated_temporary_grant_beats_temporary_grant() {
        let store = InMemoryRankStore::new();
        let now = Utc::now();
        let mut p = profile(None, &[]);
        p.temporary_permissions
            .upsert(PermissionNode::negate("essentials.heal"), now + Duration::minutes(5));
        p.temporary_permissions
            .upsert(PermissionNode::grant("essentials.heal"), now + Duration::minutes(5));

        let resolved = PermissionResolver::new(&store).resolve(&p, None, now);
        assert!(!resolved.has("essentials.heal"));
    }

    #[test]
    fn test_single_rank() {
        let store = InMemoryRankStore::with_ranks([Rank::builder("default")
            .permission("essentials.spawn")
            .permission("-essentials.fly")
            .build()
            .unwrap()]);
        let p = profile(Some("default"), &[]);
        let resolved = PermissionResolver::new(&store).resolve(&p, None, Utc::now());

        assert_eq!(resolved.granted_sorted(), vec!["essentials.spawn"]);
        assert!(resolved.is_negated("essentials.fly"));
        assert!(resolved.anomalies.is_empty());
    }

    #[test]
    fn test_secondary_negation_then_direct_grant() {
        let store = InMemoryRankStore::with_ranks([
            Rank::builder("a").permission("x").build().unwrap(),
            Rank::builder("b").permission("-x").build().unwrap(),
        ]);
        let mut p = profile(Some("a"), &["b"]);
        let resolver = PermissionResolver::new(&store);

        assert!(!resolver.resolve(&p, None, Utc::now()).has("x"));

        p.permissions.insert(PermissionNode::grant("x"));
        assert!(resolver.resolve(&p, None, Utc::now()).has("x"));
    }

    #[test]
    fn test_world_scope() {
        let store = InMemoryRankStore::with_ranks([Rank::builder("builder")
            .permission("worldedit.wand")
            .world_permission("survival", "-worldedit.wand")
            .build()
            .unwrap()]);
        let p = profile(Some("builder"), &[]);
        let resolver = PermissionResolver::new(&store);

        assert!(resolver.resolve(&p, Some("creative"), Utc::now()).has("worldedit.wand"));
        assert!(!resolver.resolve(&p, Some("survival"), Utc::now()).has("worldedit.wand"));
        assert!(resolver.resolve(&p, None, Utc::now()).has("worldedit.wand"));
    }

    #[test]
    fn test_cycle_terminates() {
        let store = InMemoryRankStore::with_ranks([
            Rank::builder("a").inherit("b").permission("from.a").build().unwrap(),
            Rank::builder("b").inherit("a").permission("from.b").build().unwrap(),
        ]);
        let p = profile(Some("a"), &[]);
        let resolved = PermissionResolver::new(&store).resolve(&p, None, Utc::now());

        assert_eq!(resolved.granted_sorted(), vec!["from.a", "from.b"]);
        assert_eq!(
            resolved.anomalies,
            vec![ResolutionAnomaly::CycleSkipped {
                rank: RankName::new("a")
            }]
        );
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let store = InMemoryRankStore::with_ranks([
            Rank::builder("base").permission("base.perm").build().unwrap(),
            Rank::builder("left").inherit("base").build().unwrap(),
            Rank::builder("right").inherit("base").build().unwrap(),
            Rank::builder("top").inherit("left").inherit("right").build().unwrap(),
        ]);
        let p = profile(Some("top"), &[]);
        let resolved = PermissionResolver::new(&store).resolve(&p, None, Utc::now());

        assert!(resolved.has("base.perm"));
        assert!(resolved.anomalies.is_empty());
    }

    #[test]
    fn test_unknown_rank_is_skipped() {
        let store = InMemoryRankStore::with_ranks([Rank::builder("mod")
            .inherit("ghost")
            .permission("essentials.kick")
            .build()
            .unwrap()]);
        let p = profile(Some("mod"), &["missing"]);
        let resolved = PermissionResolver::new(&store).resolve(&p, None, Utc::now());

        assert_eq!(resolved.granted_sorted(), vec!["essentials.kick"]);
        assert_eq!(resolved.anomalies.len(), 2);
    }

    #[test]
    fn test_depth_bound() {
        let ranks = (0..MAX_INHERITANCE_DEPTH + 5).map(|i| {
            Rank::builder(format!("r{}", i))
                .inherit(format!("r{}", i + 1))
                .permission(format!("perm.{}", i))
                .build()
                .unwrap()
        });
        let store = InMemoryRankStore::with_ranks(ranks);
        let p = profile(Some("r0"), &[]);
        let resolved = PermissionResolver::new(&store).resolve(&p, None, Utc::now());

        assert_eq!(resolved.granted.len(), MAX_INHERITANCE_DEPTH);
        assert!(matches!(
            resolved.anomalies.as_slice(),
            [ResolutionAnomaly::DepthExceeded { .. }]
        ));
    }

    #[test]
    fn test_expired_temporary_grants_are_ignored() {
        let store =
            InMemoryRankStore::with_ranks([Rank::builder("vip").permission("vip.chat").build().unwrap()]);
        let now = Utc::now();
        let mut p = profile(None, &[]);
        p.temporary_ranks
            .upsert(RankName::new("vip"), now - Duration::seconds(1));
        p.temporary_permissions
            .upsert(PermissionNode::grant("essentials.fly"), now);

        let resolved = PermissionResolver::new(&store).resolve(&p, None, now);
        assert!(resolved.granted.is_empty());
        assert!(resolved.merge.is_empty());
    }

    #[test]
    fn test_temporary_permission_beats_direct() {
        let store = InMemoryRankStore::new();
        let now = Utc::now();
        let mut p = profile(None, &[]);
        p.permissions.insert(PermissionNode::grant("essentials.fly"));
        p.temporary_permissions
            .upsert(PermissionNode::negate("essentials.fly"), now + Duration::minutes(5));

        let resolved = PermissionResolver::new(&store).resolve(&p, None, now);
        assert!(!resolved.has("essentials.fly"));
        assert!(resolved.is_negated("essentials.fly"));
    }
}
