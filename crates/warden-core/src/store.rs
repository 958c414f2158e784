// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Rank graph store.
//!
//! The store owns every [`Rank`] and hands out `Arc<Rank>` snapshots.
//! Mutators replace whole ranks, so a reader holding a snapshot never sees
//! a half-applied edit.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::rank::Rank;
use crate::types::RankName;

// =============================================================================
// RankStore Trait
// =============================================================================

/// Keyed collection of ranks, safe for concurrent reads and writes.
pub trait RankStore: Send + Sync + Debug {
    /// Looks up a rank by name.
    fn get(&self, name: &RankName) -> Option<Arc<Rank>>;

    /// Inserts or replaces a rank. Returns the replaced rank.
    fn put(&self, rank: Rank) -> Option<Arc<Rank>>;

    /// Deletes a rank. Returns `false` if it was absent.
    fn delete(&self, name: &RankName) -> bool;

    /// Returns every rank sorted by weight descending, then by name.
    fn all(&self) -> Vec<Arc<Rank>>;

    /// Returns the rank flagged as default, if any.
    fn get_default(&self) -> Option<Arc<Rank>>;

    /// Returns `true` if a rank with this name exists.
    fn contains(&self, name: &RankName) -> bool {
        self.get(name).is_some()
    }

    /// Returns the number of ranks.
    fn len(&self) -> usize;

    /// Returns `true` if the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the names of ranks that directly inherit `name`.
    fn dependents(&self, name: &RankName) -> Vec<RankName> {
        self.all()
            .iter()
            .filter(|r| r.inherits_from(name))
            .map(|r| r.name.clone())
            .collect()
    }

    /// Checks whether adding `rank -> parent` would close a cycle.
    ///
    /// Returns the cycle path `rank -> parent -> ... -> rank` if it would.
    fn would_create_cycle(&self, rank: &RankName, parent: &RankName) -> Option<Vec<RankName>> {
        if rank == parent {
            return Some(vec![rank.clone(), parent.clone()]);
        }

        let mut visited = HashSet::new();
        let mut path = vec![rank.clone()];
        if find_path(self, parent, rank, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }
}

/// Depth-first search for `target` starting at `current`, recording the path.
fn find_path<S: RankStore + ?Sized>(
    store: &S,
    current: &RankName,
    target: &RankName,
    visited: &mut HashSet<RankName>,
    path: &mut Vec<RankName>,
) -> bool {
    path.push(current.clone());
    if current == target {
        return true;
    }
    if !visited.insert(current.clone()) {
        path.pop();
        return false;
    }

    if let Some(rank) = store.get(current) {
        for parent in &rank.inherits {
            if find_path(store, parent, target, visited, path) {
                return true;
            }
        }
    }

    path.pop();
    false
}

/// Shared rank store handle.
pub type SharedRankStore = Arc<dyn RankStore>;

// =============================================================================
// InMemoryRankStore
// =============================================================================

/// Rank store backed by a `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct InMemoryRankStore {
    ranks: RwLock<HashMap<RankName, Arc<Rank>>>,
}

impl InMemoryRankStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with ranks.
    pub fn with_ranks(ranks: impl IntoIterator<Item = Rank>) -> Self {
        let store = Self::new();
        for rank in ranks {
            store.put(rank);
        }
        store
    }
}

impl RankStore for InMemoryRankStore {
    fn get(&self, name: &RankName) -> Option<Arc<Rank>> {
        self.ranks.read().get(name).cloned()
    }

    fn put(&self, rank: Rank) -> Option<Arc<Rank>> {
        self.ranks.write().insert(rank.name.clone(), Arc::new(rank))
    }

    fn delete(&self, name: &RankName) -> bool {
        self.ranks.write().remove(name).is_some()
    }

    fn all(&self) -> Vec<Arc<Rank>> {
        let mut ranks: Vec<Arc<Rank>> = self.ranks.read().values().cloned().collect();
        ranks.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.name.cmp(&b.name)));
        ranks
    }

    fn get_default(&self) -> Option<Arc<Rank>> {
        // Highest weight wins if more than one rank is flagged.
        self.all().into_iter().find(|r| r.is_default)
    }

    fn contains(&self, name: &RankName) -> bool {
        self.ranks.read().contains_key(name)
    }

    fn len(&self) -> usize {
        self.ranks.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank(name: &str, weight: i32, inherits: &[&str]) -> Rank {
        let mut rank = Rank::new(name);
        rank.weight = weight;
        for parent in inherits {
            rank.add_inheritance(RankName::new(*parent));
        }
        rank
    }

    #[test]
    fn test_put_get_delete() {
        let store = InMemoryRankStore::new();
        assert!(store.put(rank("Mod", 10, &[])).is_none());
        assert!(store.contains(&RankName::new("mod")));
        assert_eq!(store.get(&RankName::new("MOD")).unwrap().weight, 10);

        let replaced = store.put(rank("mod", 20, &[])).unwrap();
        assert_eq!(replaced.weight, 10);
        assert_eq!(store.len(), 1);

        assert!(store.delete(&RankName::new("mod")));
        assert!(!store.delete(&RankName::new("mod")));
        assert!(store.is_empty());
    }

    #[test]
    fn test_all_sorted_by_weight_then_name() {
        let store = InMemoryRankStore::with_ranks([
            rank("default", 0, &[]),
            rank("admin", 100, &[]),
            rank("builder", 10, &[]),
            rank("mod", 10, &[]),
        ]);
        let names: Vec<String> = store.all().iter().map(|r| r.name.to_string()).collect();
        assert_eq!(names, vec!["admin", "builder", "mod", "default"]);
    }

    #[test]
    fn test_get_default() {
        let mut default = rank("default", 0, &[]);
        default.is_default = true;
        let store = InMemoryRankStore::with_ranks([default, rank("mod", 10, &[])]);
        assert_eq!(store.get_default().unwrap().name.key(), "default");
    }

    #[test]
    fn test_dependents() {
        let store = InMemoryRankStore::with_ranks([
            rank("default", 0, &[]),
            rank("mod", 10, &["default"]),
            rank("vip", 5, &["default"]),
            rank("admin", 100, &["mod"]),
        ]);
        let mut dependents = store.dependents(&RankName::new("default"));
        dependents.sort();
        assert_eq!(dependents, vec![RankName::new("mod"), RankName::new("vip")]);
    }

    #[test]
    fn test_would_create_cycle() {
        let store = InMemoryRankStore::with_ranks([
            rank("default", 0, &[]),
            rank("mod", 10, &["default"]),
            rank("admin", 100, &["mod"]),
        ]);

        let path = store
            .would_create_cycle(&RankName::new("default"), &RankName::new("admin"))
            .unwrap();
        let rendered: Vec<&str> = path.iter().map(|r| r.key()).collect();
        assert_eq!(rendered, vec!["default", "admin", "mod", "default"]);

        assert!(store
            .would_create_cycle(&RankName::new("admin"), &RankName::new("default"))
            .is_none());
        assert!(store
            .would_create_cycle(&RankName::new("mod"), &RankName::new("mod"))
            .is_some());
        assert!(store
            .would_create_cycle(&RankName::new("mod"), &RankName::new("ghost"))
            .is_none());
    }
}
