// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Persistence collaborator.
//!
//! The engine treats durable storage as a key-value backend for ranks,
//! principal profiles, and audit entries. Storage is only touched after an
//! in-memory mutation succeeded and never while a ledger or session lock is
//! held.
//!
//! # Implementations
//!
//! - [`InMemoryPersistence`]: keeps everything in process, for tests and dry runs
//! - [`JsonFilePersistence`]: one JSON document per rank and per principal,
//!   plus a JSON-lines audit file

mod error;
mod json_file;
mod memory;

pub use error::{PersistenceError, PersistenceResult};
pub use json_file::JsonFilePersistence;
pub use memory::InMemoryPersistence;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::AuditEntry;
use crate::profile::PrincipalProfile;
use crate::rank::Rank;
use crate::types::{PrincipalId, RankName};

/// Durable storage for ranks, profiles, and audit entries.
#[async_trait]
pub trait Persistence: Send + Sync + Debug {
    /// Loads one rank.
    async fn load_rank(&self, name: &RankName) -> PersistenceResult<Option<Rank>>;

    /// Loads every rank.
    async fn load_all_ranks(&self) -> PersistenceResult<Vec<Rank>>;

    /// Saves or overwrites a rank.
    async fn save_rank(&self, rank: &Rank) -> PersistenceResult<()>;

    /// Deletes a rank. Returns `false` if it was absent.
    async fn delete_rank(&self, name: &RankName) -> PersistenceResult<bool>;

    /// Loads one principal profile.
    async fn load_principal(&self, id: &PrincipalId) -> PersistenceResult<Option<PrincipalProfile>>;

    /// Loads every principal profile.
    async fn load_all_principals(&self) -> PersistenceResult<Vec<PrincipalProfile>>;

    /// Saves or overwrites a principal profile.
    async fn save_principal(&self, profile: &PrincipalProfile) -> PersistenceResult<()>;

    /// Appends an audit entry.
    async fn append_audit(&self, entry: &AuditEntry) -> PersistenceResult<()>;

    /// Keeps only the newest `max_entries` audit entries. Returns how many were removed.
    async fn prune_audit(&self, max_entries: usize) -> PersistenceResult<usize>;

    /// Removes audit entries older than `cutoff`. Returns how many were removed.
    async fn prune_audit_before(&self, cutoff: DateTime<Utc>) -> PersistenceResult<usize>;

    /// Audit entries, newest first, optionally only those targeting `principal`.
    async fn query_audit(
        &self,
        principal: Option<PrincipalId>,
        limit: usize,
    ) -> PersistenceResult<Vec<AuditEntry>>;

    /// Returns the backend name.
    fn name(&self) -> &str;
}

/// Shared persistence handle.
pub type SharedPersistence = Arc<dyn Persistence>;
