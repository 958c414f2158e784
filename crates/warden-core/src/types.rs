// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core identifier and permission types.
//!
//! Raw permission strings are parsed exactly once, at the boundary, into a
//! [`PermissionNode`] carrying an explicit [`Polarity`]. Nothing past this
//! module looks at the `-` prefix again.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{WardenError, WardenResult};

/// Prefix marking a negated permission in its raw string form.
pub const NEGATION_PREFIX: char = '-';

// =============================================================================
// PrincipalId
// =============================================================================

/// A stable unique identifier for a principal.
///
/// # Examples
///
/// ```
/// use warden_core::types::PrincipalId;
///
/// let id = PrincipalId::parse("6f1c0a8e-3f0b-4c39-9a3f-2f0f4b7b1a11").unwrap();
/// assert_eq!(id.to_string(), "6f1c0a8e-3f0b-4c39-9a3f-2f0f4b7b1a11");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    /// Wraps an existing UUID.
    #[inline]
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generates a random principal ID.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a principal ID from its hyphenated string form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Returns the inner UUID.
    #[inline]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PrincipalId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

// =============================================================================
// RankName
// =============================================================================

/// The case-insensitive identity of a rank.
///
/// Equality and hashing use the lowercase form; `Display` keeps the spelling
/// the rank was created with.
///
/// # Examples
///
/// ```
/// use warden_core::types::RankName;
///
/// assert_eq!(RankName::new("Mod"), RankName::new("mod"));
/// assert_eq!(RankName::new("Mod").to_string(), "Mod");
/// assert_eq!(RankName::new("Mod").key(), "mod");
/// ```
#[derive(Debug, Clone)]
pub struct RankName {
    display: String,
    key: String,
}

impl RankName {
    /// Creates a rank name.
    pub fn new(name: impl Into<String>) -> Self {
        let display = name.into().trim().to_string();
        let key = display.to_lowercase();
        Self { display, key }
    }

    /// Returns the name as originally spelled.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Returns the lowercase lookup key.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns `true` if the name is empty.
    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl PartialEq for RankName {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for RankName {}

impl Hash for RankName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for RankName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for RankName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display)
    }
}

impl From<&str> for RankName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RankName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl Serialize for RankName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display)
    }
}

impl<'de> Deserialize<'de> for RankName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}

// =============================================================================
// Polarity
// =============================================================================

/// Whether a permission node grants or negates its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    /// The permission is granted.
    Grant,
    /// The permission is explicitly revoked.
    Negate,
}

impl Polarity {
    /// Returns `true` for [`Polarity::Grant`].
    #[inline]
    pub fn is_grant(&self) -> bool {
        matches!(self, Polarity::Grant)
    }
}

// =============================================================================
// PermissionNode
// =============================================================================

/// A parsed permission string.
///
/// # Examples
///
/// ```
/// use warden_core::types::{PermissionNode, Polarity};
///
/// let node = PermissionNode::parse("-essentials.fly").unwrap();
/// assert_eq!(node.name(), "essentials.fly");
/// assert_eq!(node.polarity(), Polarity::Negate);
/// assert_eq!(node.to_string(), "-essentials.fly");
///
/// assert!(PermissionNode::parse("-").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionNode {
    name: String,
    polarity: Polarity,
}

impl PermissionNode {
    /// Parses a raw permission string.
    ///
    /// A leading `-` marks a negation. Surrounding whitespace is trimmed.
    pub fn parse(raw: &str) -> WardenResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(WardenError::invalid_permission(raw, "permission is empty"));
        }

        match trimmed.strip_prefix(NEGATION_PREFIX) {
            Some(rest) => {
                let rest = rest.trim();
                if rest.is_empty() {
                    return Err(WardenError::invalid_permission(
                        raw,
                        "negation has no permission name",
                    ));
                }
                Ok(Self::negate(rest))
            }
            None => Ok(Self::grant(trimmed)),
        }
    }

    /// Creates a granting node.
    pub fn grant(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            polarity: Polarity::Grant,
        }
    }

    /// Creates a negating node.
    pub fn negate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            polarity: Polarity::Negate,
        }
    }

    /// Returns the permission name without any prefix.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the polarity.
    #[inline]
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Returns `true` if this node grants its name.
    #[inline]
    pub fn is_grant(&self) -> bool {
        self.polarity.is_grant()
    }
}

impl fmt::Display for PermissionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.polarity {
            Polarity::Grant => write!(f, "{}", self.name),
            Polarity::Negate => write!(f, "{}{}", NEGATION_PREFIX, self.name),
        }
    }
}

impl std::str::FromStr for PermissionNode {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PermissionNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PermissionNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// PermissionSet
// =============================================================================

/// An insertion-ordered set of permission nodes.
///
/// `x` and `-x` are distinct members; when both are present the resolver
/// treats the set as denying `x`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionSet {
    nodes: Vec<PermissionNode>,
}

impl PermissionSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from raw strings, rejecting the first malformed one.
    pub fn parse_all<I, S>(raw: I) -> WardenResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for s in raw {
            set.insert(PermissionNode::parse(s.as_ref())?);
        }
        Ok(set)
    }

    /// Inserts a node. Returns `false` if it was already present.
    pub fn insert(&mut self, node: PermissionNode) -> bool {
        if self.nodes.contains(&node) {
            return false;
        }
        self.nodes.push(node);
        true
    }

    /// Removes a node. Returns `false` if it was absent.
    pub fn remove(&mut self, node: &PermissionNode) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| n != node);
        self.nodes.len() != before
    }

    /// Returns `true` if the exact node (name and polarity) is present.
    pub fn contains(&self, node: &PermissionNode) -> bool {
        self.nodes.contains(node)
    }

    /// Iterates over nodes in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, PermissionNode> {
        self.nodes.iter()
    }

    /// Returns the number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<'de> Deserialize<'de> for PermissionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let nodes = Vec::<PermissionNode>::deserialize(deserializer)?;
        Ok(nodes.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PermissionSet {
    type Item = &'a PermissionNode;
    type IntoIter = std::slice::Iter<'a, PermissionNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl FromIterator<PermissionNode> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = PermissionNode>>(iter: T) -> Self {
        let mut set = Self::new();
        for node in iter {
            set.insert(node);
        }
        set
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Who performed a mutation. `id == None` means console or system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Principal ID of the actor, if it was a principal.
    pub id: Option<PrincipalId>,
    /// Display name of the actor.
    pub name: String,
}

impl Actor {
    /// The console actor.
    pub fn console() -> Self {
        Self {
            id: None,
            name: "CONSOLE".to_string(),
        }
    }

    /// The system actor, used for automatic mutations such as expiry sweeps.
    pub fn system() -> Self {
        Self {
            id: None,
            name: "SYSTEM".to_string(),
        }
    }

    /// A principal acting on its own behalf or as an administrator.
    pub fn principal(id: PrincipalId, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_name_case_insensitive() {
        let a = RankName::new("Admin");
        let b = RankName::new("ADMIN");
        assert_eq!(a, b);
        assert_eq!(a.key(), "admin");
        assert_eq!(a.as_str(), "Admin");

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_permission_node_parse() {
        let grant = PermissionNode::parse("  essentials.spawn ").unwrap();
        assert_eq!(grant.name(), "essentials.spawn");
        assert!(grant.is_grant());

        let negate = PermissionNode::parse("-essentials.spawn").unwrap();
        assert_eq!(negate.name(), "essentials.spawn");
        assert_eq!(negate.polarity(), Polarity::Negate);

        let wildcard = PermissionNode::parse("*").unwrap();
        assert_eq!(wildcard.name(), "*");
        assert!(wildcard.is_grant());

        assert!(PermissionNode::parse("").is_err());
        assert!(PermissionNode::parse("  -  ").is_err());
    }

    #[test]
    fn test_permission_node_serde() {
        let node = PermissionNode::negate("worldedit.wand");
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, "\"-worldedit.wand\"");

        let parsed: PermissionNode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, node);

        assert!(serde_json::from_str::<PermissionNode>("\"-\"").is_err());
    }

    #[test]
    fn test_permission_set_ordering_and_uniqueness() {
        let mut set = PermissionSet::parse_all(["a", "-b", "c"]).unwrap();
        assert!(!set.insert(PermissionNode::grant("a")));
        assert!(set.insert(PermissionNode::grant("b")));

        let rendered: Vec<String> = set.iter().map(|n| n.to_string()).collect();
        assert_eq!(rendered, vec!["a", "-b", "c", "b"]);

        assert!(set.remove(&PermissionNode::negate("b")));
        assert!(!set.remove(&PermissionNode::negate("b")));
        assert_eq!(set.len(), 3);
    }
}
