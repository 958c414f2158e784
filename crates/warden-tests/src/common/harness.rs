// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! File-backed harness: a temp directory holding JSON storage and the text
//! audit log, with the ability to "restart" the service over the same files.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use warden_core::audit::JsonLinesFormatter;
use warden_core::{
    AuditRecorder, AuditSettings, JsonFilePersistence, ManualClock, PermissionService,
    SharedPersistence, StoreAuditSink, TextAuditSink,
};

use super::builders::test_epoch;

/// Owns a temp directory and builds services over it.
pub struct TestHarness {
    name: String,
    dir: TempDir,
    clock: ManualClock,
    timeout: Duration,
}

impl TestHarness {
    /// Creates a harness with a fresh temp directory.
    pub fn with_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let dir = super::temp_test_dir(&format!("warden_{}_", name));
        Self {
            name,
            dir,
            clock: ManualClock::new(test_epoch()),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the timeout applied by [`run`](Self::run).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Test name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root of the temp directory.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Storage directory.
    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    /// Text audit log path.
    pub fn audit_log(&self) -> PathBuf {
        self.dir.path().join("logs").join("audit.jsonl")
    }

    /// Shared manual clock.
    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Builds a service over the harness files. Call again to simulate a restart.
    pub async fn open_service(&self) -> Arc<PermissionService> {
        let persistence: SharedPersistence = Arc::new(
            JsonFilePersistence::open(self.data_dir())
                .await
                .expect("storage should open"),
        );
        let text = TextAuditSink::with_formatter(self.audit_log(), JsonLinesFormatter::new())
            .expect("audit log should open");
        let recorder = AuditRecorder::new(
            Arc::new(StoreAuditSink::new(Arc::clone(&persistence))),
            AuditSettings {
                origin: self.name.clone(),
                ..AuditSettings::default()
            },
        )
        .with_text_sink(Arc::new(text));

        let service = PermissionService::builder()
            .clock(Arc::new(self.clock.clone()))
            .persistence(persistence)
            .recorder(Arc::new(recorder))
            .build();
        service.restore().await.expect("restore should succeed");
        Arc::new(service)
    }

    /// Runs `test` under the harness timeout.
    pub async fn run<F, Fut>(&self, test: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        tokio::time::timeout(self.timeout, test())
            .await
            .unwrap_or_else(|_| panic!("test {} timed out after {:?}", self.name, self.timeout));
    }
}
