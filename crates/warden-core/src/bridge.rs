// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Identity bridge to an external platform.
//!
//! The bridge is only driven from the sync path ([`RoleSyncer`]); mutations
//! never wait on it.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audit::{AuditAction, AuditEntry, AuditRecorder};
use crate::ledger::GrantLedger;
use crate::session::SessionProjectionCache;
use crate::types::{Actor, PrincipalId};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by an identity bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The external platform cannot be reached.
    #[error("Identity bridge unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },

    /// The external platform refused the request.
    #[error("Identity bridge rejected '{external_id}': {message}")]
    Rejected {
        /// External identity involved.
        external_id: String,
        /// Error message.
        message: String,
    },
}

impl BridgeError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a rejected error.
    pub fn rejected(external_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            external_id: external_id.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if retrying may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Unavailable { .. })
    }

    /// Returns the error type for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::Unavailable { .. } => "unavailable",
            BridgeError::Rejected { .. } => "rejected",
        }
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

// =============================================================================
// IdentityBridge Trait
// =============================================================================

/// Link between principals and an external identity platform.
#[async_trait]
pub trait IdentityBridge: Send + Sync + Debug {
    /// Replaces the role set of an external identity.
    async fn push_role_set(&self, external_id: &str, roles: &[String]) -> BridgeResult<()>;

    /// Looks up the external identity linked to a principal.
    async fn pull_linked_external_id(&self, principal: &PrincipalId) -> BridgeResult<Option<String>>;

    /// Returns the bridge name.
    fn name(&self) -> &str {
        "bridge"
    }
}

/// Bridge that links nothing and accepts every push.
#[derive(Debug, Default, Clone)]
pub struct NoOpBridge;

#[async_trait]
impl IdentityBridge for NoOpBridge {
    async fn push_role_set(&self, _external_id: &str, _roles: &[String]) -> BridgeResult<()> {
        Ok(())
    }

    async fn pull_linked_external_id(&self, _principal: &PrincipalId) -> BridgeResult<Option<String>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "noop"
    }
}

// =============================================================================
// RoleSyncer
// =============================================================================

/// What one sync pass did for a principal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// The external identity was linked during this pass.
    pub linked: bool,
    /// Role set pushed, if the principal is linked.
    pub pushed: Option<Vec<String>>,
}

/// Pushes effective rank names to the identity bridge.
#[derive(Debug)]
pub struct RoleSyncer {
    ledger: Arc<GrantLedger>,
    bridge: Arc<dyn IdentityBridge>,
    recorder: Arc<AuditRecorder>,
    last_pushed: DashMap<PrincipalId, Vec<String>>,
}

impl RoleSyncer {
    /// Creates a syncer.
    pub fn new(
        ledger: Arc<GrantLedger>,
        bridge: Arc<dyn IdentityBridge>,
        recorder: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            ledger,
            bridge,
            recorder,
            last_pushed: DashMap::new(),
        }
    }

    /// Links (if needed) and pushes the role set of one principal.
    ///
    /// Unknown principals are skipped with an empty outcome.
    pub async fn sync_principal(&self, principal: &PrincipalId) -> BridgeResult<SyncOutcome> {
        let Some(profile) = self.ledger.get(principal) else {
            return Ok(SyncOutcome::default());
        };
        let mut outcome = SyncOutcome::default();

        let external_id = match profile.external_id.clone() {
            Some(id) => Some(id),
            None => {
                let pulled = self.bridge.pull_linked_external_id(principal).await?;
                if let Some(id) = &pulled {
                    if self
                        .ledger
                        .set_external_id(principal, Some(id.clone()))
                        .is_ok()
                    {
                        outcome.linked = true;
                        info!(principal = %principal, external_id = %id, "Linked external identity");
                        self.recorder
                            .record(
                                AuditEntry::builder(AuditAction::ExternalLink)
                                    .actor(&Actor::system())
                                    .at(self.ledger.clock().now())
                                    .target_principal(*principal)
                                    .target_external_id(Some(id.clone()))
                                    .detail(format!("linked {}", id))
                                    .build(),
                            )
                            .await;
                    }
                }
                pulled
            }
        };

        let Some(external_id) = external_id else {
            return Ok(outcome);
        };

        let roles: Vec<String> = profile
            .effective_ranks(self.ledger.clock().now())
            .into_iter()
            .map(|r| r.to_string())
            .collect();
        self.bridge.push_role_set(&external_id, &roles).await?;

        let changed = self
            .last_pushed
            .insert(*principal, roles.clone())
            .map_or(true, |previous| previous != roles);
        if changed {
            debug!(principal = %principal, roles = ?roles, "Pushed role set");
            self.recorder
                .record(
                    AuditEntry::builder(AuditAction::RoleSync)
                        .actor(&Actor::system())
                        .at(self.ledger.clock().now())
                        .target_principal(*principal)
                        .target_external_id(Some(external_id.clone()))
                        .detail(roles.join(","))
                        .build(),
                )
                .await;
        }

        outcome.pushed = Some(roles);
        Ok(outcome)
    }

    /// Syncs every attached principal. Returns how many succeeded.
    ///
    /// Failures are logged and do not stop the pass. Remembered role sets of
    /// principals no longer attached are dropped first, so a principal that
    /// reconnects gets a fresh `RoleSync` entry on its next push.
    pub async fn sync_all_attached(&self, sessions: &SessionProjectionCache) -> usize {
        let attached = sessions.attached();
        let live: HashSet<PrincipalId> = attached.iter().copied().collect();
        let before = self.last_pushed.len();
        self.last_pushed.retain(|id, _| live.contains(id));
        let dropped = before.saturating_sub(self.last_pushed.len());
        if dropped > 0 {
            debug!(dropped, "Dropped role sets of detached principals");
        }

        let mut synced = 0;
        for principal in attached {
            match self.sync_principal(&principal).await {
                Ok(_) => synced += 1,
                Err(e) => warn!(
                    principal = %principal,
                    bridge = self.bridge.name(),
                    error_type = e.error_type(),
                    error = %e,
                    "Role sync failed"
                ),
            }
        }
        synced
    }

    /// Forgets the last pushed role set of a principal.
    pub fn forget(&self, principal: &PrincipalId) {
        self.last_pushed.remove(principal);
    }

    /// Number of principals with a remembered role set.
    pub fn tracked(&self) -> usize {
        self.last_pushed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditSettings, InMemoryAuditStore};
    use crate::clock::SystemClock;
    use crate::types::RankName;
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct FakeBridge {
        pushes: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl IdentityBridge for FakeBridge {
        async fn push_role_set(&self, external_id: &str, roles: &[String]) -> BridgeResult<()> {
            self.pushes
                .lock()
                .push((external_id.to_string(), roles.to_vec()));
            Ok(())
        }

        async fn pull_linked_external_id(&self, _principal: &PrincipalId) -> BridgeResult<Option<String>> {
            Ok(Some("discord-42".to_string()))
        }
    }

    #[tokio::test]
    async fn test_sync_links_and_pushes() {
        let ledger = Arc::new(GrantLedger::new(SystemClock::shared()));
        let id = PrincipalId::random();
        ledger.get_or_create(id, "steve");
        ledger.set_primary_rank(&id, Some(RankName::new("Mod"))).unwrap();

        let bridge = Arc::new(FakeBridge::default());
        let store = InMemoryAuditStore::new();
        let recorder = Arc::new(AuditRecorder::new(
            Arc::new(store.clone()),
            AuditSettings::default(),
        ));
        let syncer = RoleSyncer::new(Arc::clone(&ledger), bridge.clone(), recorder);

        let outcome = syncer.sync_principal(&id).await.unwrap();
        assert!(outcome.linked);
        assert_eq!(outcome.pushed, Some(vec!["Mod".to_string()]));
        assert_eq!(
            ledger.get(&id).unwrap().external_id.as_deref(),
            Some("discord-42")
        );

        let outcome = syncer.sync_principal(&id).await.unwrap();
        assert!(!outcome.linked);
        assert_eq!(bridge.pushes.lock().len(), 2);
        assert_eq!(store.entries_for_action(AuditAction::ExternalLink).len(), 1);
        assert_eq!(store.entries_for_action(AuditAction::RoleSync).len(), 1);
    }

    #[tokio::test]
    async fn test_sync_all_drops_detached_principals() {
        let ledger = Arc::new(GrantLedger::new(SystemClock::shared()));
        let sessions = SessionProjectionCache::new(
            Arc::clone(&ledger),
            Arc::new(crate::store::InMemoryRankStore::new()),
        );
        let ids: Vec<PrincipalId> = (0..3).map(|_| PrincipalId::random()).collect();
        for id in &ids {
            ledger.get_or_create(*id, "player");
            sessions.attach(*id, None);
        }
        let store = InMemoryAuditStore::new();
        let recorder = Arc::new(AuditRecorder::new(
            Arc::new(store.clone()),
            AuditSettings::default(),
        ));
        let syncer = RoleSyncer::new(
            Arc::clone(&ledger),
            Arc::new(FakeBridge::default()),
            recorder,
        );

        assert_eq!(syncer.sync_all_attached(&sessions).await, 3);
        assert_eq!(syncer.tracked(), 3);

        sessions.detach(&ids[0]);
        sessions.detach(&ids[1]);
        assert_eq!(syncer.sync_all_attached(&sessions).await, 1);
        assert_eq!(syncer.tracked(), 1);

        syncer.forget(&ids[2]);
        assert_eq!(syncer.tracked(), 0);
        assert_eq!(syncer.sync_all_attached(&sessions).await, 1);
        assert_eq!(store.entries_for_action(AuditAction::RoleSync).len(), 4);
    }

    #[tokio::test]
    async fn test_noop_bridge_leaves_unlinked() {
        let ledger = Arc::new(GrantLedger::new(SystemClock::shared()));
        let id = PrincipalId::random();
        ledger.get_or_create(id, "alex");
        let recorder = Arc::new(AuditRecorder::new(
            Arc::new(InMemoryAuditStore::new()),
            AuditSettings::default(),
        ));
        let syncer = RoleSyncer::new(ledger, Arc::new(NoOpBridge), recorder);

        let outcome = syncer.sync_principal(&id).await.unwrap();
        assert_eq!(outcome, SyncOutcome::default());
    }
}
