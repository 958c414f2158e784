// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # warden-core
//!
//! Rank-based permission management for multi-user game servers.
//!
//! This crate provides:
//!
//! - **Types**: `PrincipalId`, `RankName`, `PermissionNode`, `PermissionSet`
//! - **Rank**: Named permission bundles with display attributes and inheritance
//! - **Store**: The rank graph and its cycle check
//! - **Ledger**: Per-principal grants, including timed grants and expiry sweeps
//! - **Resolver**: Inheritance walk producing effective capabilities
//! - **Session**: Cached capabilities of attached principals
//! - **Audit**: Recording and querying of every mutation
//! - **Persistence**: Durable storage of ranks, profiles, and audit entries
//! - **Bridge**: Role sync with an external identity platform
//! - **Service**: The mutation pipeline tying all of the above together
//!
//! ## Example
//!
//! ```rust,ignore
//! use warden_core::{Actor, PermissionService, PrincipalId, Rank};
//!
//! let service = PermissionService::builder().build();
//! let console = Actor::console();
//!
//! service
//!     .create_rank(&console, Rank::builder("member").permission("spawn").default_rank(true).build()?)
//!     .await?;
//!
//! let id = PrincipalId::random();
//! service.on_connect(id, "steve", None).await?;
//! assert!(service.check_permission(&id, "spawn", None)?);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod clock;
pub mod error;
pub mod types;

// =============================================================================
// Permission Model
// =============================================================================

pub mod ledger;
pub mod profile;
pub mod rank;
pub mod resolver;
pub mod session;
pub mod store;

// =============================================================================
// Collaborators
// =============================================================================

pub mod audit;
pub mod bridge;
pub mod persistence;
pub mod scheduler;

// =============================================================================
// Orchestration
// =============================================================================

pub mod service;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::*;
pub use types::*;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use ledger::{GrantLedger, SweepOutcome, DEFAULT_MAX_SECONDARY_RANKS};
pub use profile::{PrincipalProfile, TimedGrant, TimedGrants};
pub use rank::{Rank, RankBuilder};
pub use resolver::{
    PermissionMerge, PermissionResolver, ResolutionAnomaly, ResolvedCapabilities,
    MAX_INHERITANCE_DEPTH,
};
pub use session::{DisplayProjection, SessionHandle, SessionProjectionCache};
pub use store::{InMemoryRankStore, RankStore, SharedRankStore};

pub use audit::{
    AuditAction, AuditEntry, AuditError, AuditFilter, AuditRecorder, AuditSettings, AuditSink,
    AuditStats, InMemoryAuditStore, StoreAuditSink, TextAuditSink,
};
pub use bridge::{BridgeError, IdentityBridge, NoOpBridge, RoleSyncer, SyncOutcome};
pub use persistence::{
    InMemoryPersistence, JsonFilePersistence, Persistence, PersistenceError, SharedPersistence,
};
pub use scheduler::{PeriodicTask, TaskStats};
pub use service::{
    PermissionService, PermissionServiceBuilder, RankDeletion, RankDisplayUpdate, RestoreStats,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
