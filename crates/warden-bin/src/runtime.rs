// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Engine runtime orchestration.
//!
//! - Building the permission service from configuration
//! - Restoring ranks and principals from storage
//! - Running the expiry sweep and role sync tasks
//! - Graceful shutdown and final audit flush

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use warden_config::{load_config, AuditFileFormat, StorageBackend, WardenConfig};
use warden_core::audit::{JsonLinesFormatter, TextFormatter};
use warden_core::{
    AuditRecorder, AuditSettings, AuditSink, IdentityBridge, InMemoryAuditStore,
    InMemoryPersistence, JsonFilePersistence, NoOpBridge, PeriodicTask, PermissionService,
    RoleSyncer, SharedPersistence, StoreAuditSink, TextAuditSink,
};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// Service Construction
// =============================================================================

/// Builds a [`PermissionService`] wired to the configured backends.
///
/// With `ephemeral` set, storage and audit stay in memory and no files are
/// touched.
pub async fn build_service(config: &WardenConfig, ephemeral: bool) -> BinResult<PermissionService> {
    let persistence: SharedPersistence = if ephemeral {
        info!("Ephemeral mode: state is kept in memory");
        Arc::new(InMemoryPersistence::new())
    } else {
        open_persistence(config).await?
    };
    debug!(backend = persistence.name(), "Persistence ready");

    let recorder = build_recorder(config, Arc::clone(&persistence), ephemeral)?;

    Ok(PermissionService::builder()
        .persistence(persistence)
        .recorder(Arc::new(recorder))
        .max_secondary_ranks(config.limits.max_secondary_ranks)
        .build())
}

/// Opens the configured storage backend.
pub async fn open_persistence(config: &WardenConfig) -> BinResult<SharedPersistence> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryPersistence::new())),
        StorageBackend::JsonFile => {
            let store = JsonFilePersistence::open(&config.storage.path)
                .await
                .map_err(|e| {
                    BinError::init(format!(
                        "Failed to open storage at {}: {}",
                        config.storage.path.display(),
                        e
                    ))
                })?;
            Ok(Arc::new(store))
        }
    }
}

fn build_recorder(
    config: &WardenConfig,
    persistence: SharedPersistence,
    ephemeral: bool,
) -> BinResult<AuditRecorder> {
    let audit = &config.audit;
    let settings = AuditSettings {
        enabled: audit.enabled,
        max_entries: audit.max_entries,
        retention_days: audit.retention_days,
        default_query_limit: audit.default_query_limit,
        origin: config.server.name.clone(),
    };

    let store: Arc<dyn AuditSink> = if ephemeral {
        Arc::new(InMemoryAuditStore::new())
    } else {
        Arc::new(StoreAuditSink::new(persistence))
    };
    let recorder = AuditRecorder::new(store, settings);

    if !audit.enabled {
        info!("Audit recording disabled");
        return Ok(recorder);
    }
    if ephemeral || !audit.log_to_file {
        return Ok(recorder);
    }

    let sink = open_text_sink(&audit.path, audit.format)?;
    info!(path = %audit.path.display(), format = ?audit.format, "Audit log file enabled");
    Ok(recorder.with_text_sink(Arc::new(sink)))
}

fn open_text_sink(path: &Path, format: AuditFileFormat) -> BinResult<TextAuditSink> {
    let sink = match format {
        AuditFileFormat::Text => TextAuditSink::with_formatter(path, TextFormatter::new()),
        AuditFileFormat::JsonLines => TextAuditSink::with_formatter(path, JsonLinesFormatter::new()),
    };
    sink.map_err(|e| {
        BinError::init(format!("Failed to open audit log {}: {}", path.display(), e))
    })
}

// =============================================================================
// WardenRuntime
// =============================================================================

/// The long-running engine process.
pub struct WardenRuntime {
    config: Arc<WardenConfig>,
    shutdown: ShutdownCoordinator,
    bridge: Arc<dyn IdentityBridge>,
    ephemeral: bool,
}

impl WardenRuntime {
    /// Creates a runtime with the no-op identity bridge.
    pub fn new(config: WardenConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: ShutdownCoordinator::new(),
            bridge: Arc::new(NoOpBridge),
            ephemeral: false,
        }
    }

    /// Keeps all state in memory.
    pub fn with_ephemeral(mut self, ephemeral: bool) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    /// Uses a different identity bridge for role sync.
    pub fn with_bridge(mut self, bridge: Arc<dyn IdentityBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Returns the shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Runs the engine until shutdown is signaled.
    pub async fn run(self) -> BinResult<()> {
        info!(
            server = %self.config.server.name,
            version = warden_core::VERSION,
            "Starting WARDEN"
        );

        let service = Arc::new(build_service(&self.config, self.ephemeral).await?);
        let restored = service
            .restore()
            .await
            .map_err(|e| BinError::from(e).with_context("Restoring state"))?;
        info!(
            ranks = restored.ranks,
            principals = restored.principals,
            "State restored"
        );

        let mut tasks = Vec::new();

        let sweep = PeriodicTask::new("expiry-sweep", self.config.sweep.interval());
        let sweep_service = Arc::clone(&service);
        let sweep_handle = sweep.start(move || {
            let service = Arc::clone(&sweep_service);
            async move {
                let expired = service.sweep_expired_all().await;
                let pruned = service.prune_audit_expired().await;
                if expired > 0 || pruned > 0 {
                    debug!(expired, pruned, "Sweep finished");
                }
            }
        });
        tasks.push((sweep, sweep_handle));

        if self.config.sync.enabled {
            let syncer = Arc::new(RoleSyncer::new(
                Arc::clone(service.ledger()),
                Arc::clone(&self.bridge),
                Arc::clone(service.recorder()),
            ));
            let sync = PeriodicTask::new("role-sync", self.config.sync.interval());
            let sync_service = Arc::clone(&service);
            let sync_handle = sync.start(move || {
                let service = Arc::clone(&sync_service);
                let syncer = Arc::clone(&syncer);
                async move {
                    let synced = syncer.sync_all_attached(service.sessions()).await;
                    debug!(synced, "Role sync pass finished");
                }
            });
            tasks.push((sync, sync_handle));
        } else {
            debug!("Role sync disabled");
        }

        info!("WARDEN is ready");
        self.shutdown.wait_for_shutdown().await;
        info!("Shutdown initiated, cleaning up...");

        for (task, handle) in tasks {
            task.cancel();
            if let Err(e) = handle.await {
                warn!(task = task.name(), error = %e, "Task ended abnormally");
            }
        }

        service.flush().await;
        info!("WARDEN shutdown complete");
        Ok(())
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`WardenRuntime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    config: Option<WardenConfig>,
    bridge: Option<Arc<dyn IdentityBridge>>,
    ephemeral: bool,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: WardenConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the identity bridge.
    pub fn bridge(mut self, bridge: Arc<dyn IdentityBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Keeps all state in memory.
    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> BinResult<WardenRuntime> {
        let config = match self.config {
            Some(cfg) => cfg,
            None => {
                let path = self
                    .config_path
                    .ok_or_else(|| BinError::config("No configuration provided"))?;
                load_config(&path).map_err(|e| {
                    BinError::config(format!("Failed to load config from {}: {}", path.display(), e))
                })?
            }
        };

        let mut runtime = WardenRuntime::new(config).with_ephemeral(self.ephemeral);
        if let Some(bridge) = self.bridge {
            runtime = runtime.with_bridge(bridge);
        }
        Ok(runtime)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use warden_core::{Actor, PrincipalId, Rank};

    #[test]
    fn test_runtime_builder() {
        let runtime = RuntimeBuilder::new()
            .config(WardenConfig::default())
            .ephemeral(true)
            .build()
            .unwrap();
        assert!(runtime.ephemeral);
        assert_eq!(runtime.config().server.name, "server");
    }

    #[test]
    fn test_runtime_builder_requires_config() {
        assert!(RuntimeBuilder::new().build().is_err());
    }

    #[tokio::test]
    async fn test_build_service_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WardenConfig::default();
        config.storage.path = dir.path().join("data");
        config.audit.path = dir.path().join("logs/audit.log");
        config.server.name = "lobby".to_string();

        let service = build_service(&config, false).await.unwrap();
        service
            .create_rank(
                &Actor::console(),
                Rank::builder("member").permission("spawn").default_rank(true).build().unwrap(),
            )
            .await
            .unwrap();
        let id = PrincipalId::random();
        service.on_connect(id, "steve", None).await.unwrap();
        service.flush().await;

        let entries = service.query_audit_all(10).await;
        assert!(entries.iter().all(|e| e.origin == "lobby"));
        assert!(config.audit.path.exists());

        let reopened = build_service(&config, false).await.unwrap();
        let stats = reopened.restore().await.unwrap();
        assert_eq!(stats.ranks, 1);
        assert_eq!(stats.principals, 1);
        assert!(reopened.check_permission(&id, "spawn", None).unwrap());
    }

    #[tokio::test]
    async fn test_ephemeral_touches_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WardenConfig::default();
        config.storage.path = dir.path().join("data");
        config.audit.path = dir.path().join("audit.log");

        let _service = build_service(&config, true).await.unwrap();
        assert!(!config.storage.path.exists());
        assert!(!config.audit.path.exists());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let runtime = RuntimeBuilder::new()
            .config(WardenConfig::default())
            .ephemeral(true)
            .build()
            .unwrap();
        let shutdown = runtime.shutdown().clone();

        let handle = tokio::spawn(runtime.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.initiate_shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("runtime should stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
