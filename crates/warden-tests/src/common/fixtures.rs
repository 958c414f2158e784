// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Pre-built ranks, principals, and configuration documents.

use uuid::Uuid;
use warden_core::{PrincipalId, Rank, RankName};

// =============================================================================
// Rank Fixtures
// =============================================================================

/// Common rank layouts.
pub struct RankFixtures;

impl RankFixtures {
    /// `default`: the default rank, grants `essentials.spawn`.
    pub fn default_rank() -> Rank {
        Rank::builder("default")
            .display_name("Member")
            .prefix("[Member] ")
            .colors("&7", "&f")
            .permission("essentials.spawn")
            .default_rank(true)
            .build()
            .expect("valid rank")
    }

    /// `mod`: inherits `default`, grants `essentials.kick`.
    pub fn moderator() -> Rank {
        Rank::builder("mod")
            .display_name("Moderator")
            .prefix("[Mod] ")
            .colors("&2", "&a")
            .weight(50)
            .inherit("default")
            .permission("essentials.kick")
            .build()
            .expect("valid rank")
    }

    /// `admin`: inherits `mod`, grants `essentials.ban` and `worldedit.*`.
    pub fn admin() -> Rank {
        Rank::builder("admin")
            .display_name("Admin")
            .prefix("[Admin] ")
            .colors("&c", "&f")
            .weight(100)
            .inherit("mod")
            .permission("essentials.ban")
            .permission("worldedit.*")
            .build()
            .expect("valid rank")
    }

    /// `builder`: grants `worldedit.use` only in the `creative` world.
    pub fn builder_rank() -> Rank {
        Rank::builder("builder")
            .weight(20)
            .world_permission("creative", "worldedit.use")
            .build()
            .expect("valid rank")
    }

    /// `muted`: negates `essentials.chat`.
    pub fn muted() -> Rank {
        Rank::builder("muted")
            .weight(-10)
            .permission("-essentials.chat")
            .build()
            .expect("valid rank")
    }

    /// `vip`: grants `essentials.fly`.
    pub fn vip() -> Rank {
        Rank::builder("vip")
            .prefix("[VIP] ")
            .weight(10)
            .permission("essentials.fly")
            .build()
            .expect("valid rank")
    }

    /// `default`, `mod`, and `admin`.
    pub fn standard() -> Vec<Rank> {
        vec![Self::default_rank(), Self::moderator(), Self::admin()]
    }

    /// Every fixture rank.
    pub fn all() -> Vec<Rank> {
        vec![
            Self::default_rank(),
            Self::moderator(),
            Self::admin(),
            Self::builder_rank(),
            Self::muted(),
            Self::vip(),
        ]
    }

    /// Shorthand for a rank name.
    pub fn name(name: &str) -> RankName {
        RankName::new(name)
    }
}

// =============================================================================
// Principal Fixtures
// =============================================================================

/// Stable principal identities.
pub struct PrincipalFixtures;

impl PrincipalFixtures {
    /// A fixed ID, stable across runs.
    pub fn steve() -> PrincipalId {
        PrincipalId::new(Uuid::from_u128(0x0191_e0a4_7c1e_7000_8000_0000_0000_0001))
    }

    /// A second fixed ID.
    pub fn alex() -> PrincipalId {
        PrincipalId::new(Uuid::from_u128(0x0191_e0a4_7c1e_7000_8000_0000_0000_0002))
    }

    /// `count` random IDs.
    pub fn batch(count: usize) -> Vec<PrincipalId> {
        (0..count).map(|_| PrincipalId::random()).collect()
    }
}

// =============================================================================
// Config Fixtures
// =============================================================================

/// Configuration documents.
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// Full YAML document touching every section.
    pub fn full_yaml() -> &'static str {
        r#"
server:
  name: lobby-1
storage:
  backend: json_file
  path: /var/lib/warden
audit:
  enabled: true
  log_to_file: true
  path: /var/log/warden/audit.log
  format: json_lines
  max_entries: 5000
  retention_days: 14
  default_query_limit: 25
limits:
  max_secondary_ranks: 8
sync:
  enabled: true
  interval_secs: 120
sweep:
  interval_secs: 30
logging:
  level: debug
  format: json
"#
    }

    /// Equivalent TOML document.
    pub fn full_toml() -> &'static str {
        r#"
[server]
name = "lobby-1"

[storage]
backend = "json_file"
path = "/var/lib/warden"

[audit]
enabled = true
log_to_file = true
path = "/var/log/warden/audit.log"
format = "json_lines"
max_entries = 5000
retention_days = 14
default_query_limit = 25

[limits]
max_secondary_ranks = 8

[sync]
enabled = true
interval_secs = 120

[sweep]
interval_secs = 30

[logging]
level = "debug"
format = "json"
"#
    }

    /// Minimal JSON document.
    pub fn minimal_json() -> &'static str {
        r#"{ "server": { "name": "hub" } }"#
    }
}
