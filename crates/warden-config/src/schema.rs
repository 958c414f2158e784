// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for WARDEN.
//!
//! # Schema Structure
//!
//! ```text
//! WardenConfig
//! ├── server: ServerConfig
//! ├── storage: StorageConfig
//! ├── audit: AuditConfig
//! ├── limits: LimitsConfig
//! ├── sync: SyncConfig
//! ├── sweep: SweepConfig
//! └── logging: LoggingConfig
//! ```
//!
//! Every section is optional; an empty file yields [`WardenConfig::default`].

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Constants
// =============================================================================

/// Default origin tag stamped on audit entries.
pub const DEFAULT_SERVER_NAME: &str = "server";

/// Default number of audit entries kept in the structured store.
pub const DEFAULT_AUDIT_MAX_ENTRIES: usize = 10_000;

/// Default audit retention in days.
pub const DEFAULT_AUDIT_RETENTION_DAYS: u32 = 30;

/// Default audit query limit when a caller passes `limit <= 0`.
pub const DEFAULT_AUDIT_QUERY_LIMIT: usize = 50;

/// Default cap on secondary ranks per principal.
pub const DEFAULT_MAX_SECONDARY_RANKS: usize = 16;

/// Upper bound for the secondary rank cap.
pub const MAX_SECONDARY_RANKS_LIMIT: usize = 1024;

/// Default external role sync interval (5 minutes).
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Default expiry sweep interval (1 minute).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Longest accepted periodic interval (1 day).
pub const MAX_INTERVAL_SECS: u64 = 86_400;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure for WARDEN.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WardenConfig {
    /// Server identification.
    #[serde(default)]
    pub server: ServerConfig,

    /// Durable storage.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Audit trail.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Per-principal limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// External role sync.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Temporary grant expiry sweep.
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WardenConfig {
    /// Validates every section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.storage.validate()?;
        self.audit.validate()?;
        self.limits.validate()?;
        self.sync.validate()?;
        self.sweep.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

// =============================================================================
// Server
// =============================================================================

/// Server identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Name stamped as the origin of every audit entry.
    #[serde(default = "default_server_name")]
    pub name: String,
}

fn default_server_name() -> String {
    DEFAULT_SERVER_NAME.to_string()
}

impl ServerConfig {
    /// Validates the server configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::validation("server.name", "cannot be empty"));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
        }
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Everything stays in process and is lost on exit.
    Memory,
    /// One JSON document per rank and per principal.
    #[default]
    JsonFile,
}

impl StorageBackend {
    /// Returns the backend name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::JsonFile => "json_file",
        }
    }
}

/// Durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend.
    #[serde(default)]
    pub backend: StorageBackend,

    /// Root directory of the file backend.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data")
}

impl StorageConfig {
    /// Validates the storage configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.backend == StorageBackend::JsonFile && self.path.as_os_str().is_empty() {
            return Err(ConfigError::validation(
                "storage.path",
                "cannot be empty with the json_file backend",
            ));
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
        }
    }
}

// =============================================================================
// Audit
// =============================================================================

/// Line format of the text audit file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditFileFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    JsonLines,
}

/// Audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Whether mutations are recorded at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether entries are mirrored to a text file.
    #[serde(default = "default_true")]
    pub log_to_file: bool,

    /// Text file path.
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,

    /// Text file line format.
    #[serde(default)]
    pub format: AuditFileFormat,

    /// Entries kept in the structured store; older ones are evicted.
    #[serde(default = "default_audit_max_entries")]
    pub max_entries: usize,

    /// Entries older than this many days are pruned. `None` keeps them.
    #[serde(default = "default_audit_retention")]
    pub retention_days: Option<u32>,

    /// Query limit applied when a caller passes `limit <= 0`.
    #[serde(default = "default_audit_query_limit")]
    pub default_query_limit: usize,
}

fn default_true() -> bool {
    true
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("./logs/audit.log")
}

fn default_audit_max_entries() -> usize {
    DEFAULT_AUDIT_MAX_ENTRIES
}

fn default_audit_retention() -> Option<u32> {
    Some(DEFAULT_AUDIT_RETENTION_DAYS)
}

fn default_audit_query_limit() -> usize {
    DEFAULT_AUDIT_QUERY_LIMIT
}

impl AuditConfig {
    /// Validates the audit configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_entries == 0 {
            return Err(ConfigError::validation("audit.max_entries", "cannot be zero"));
        }
        if self.default_query_limit == 0 {
            return Err(ConfigError::validation(
                "audit.default_query_limit",
                "cannot be zero",
            ));
        }
        if self.retention_days == Some(0) {
            return Err(ConfigError::validation(
                "audit.retention_days",
                "cannot be zero; omit it to keep entries indefinitely",
            ));
        }
        if self.enabled && self.log_to_file && self.path.as_os_str().is_empty() {
            return Err(ConfigError::validation(
                "audit.path",
                "cannot be empty when log_to_file is enabled",
            ));
        }
        Ok(())
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_to_file: true,
            path: default_audit_path(),
            format: AuditFileFormat::default(),
            max_entries: default_audit_max_entries(),
            retention_days: default_audit_retention(),
            default_query_limit: default_audit_query_limit(),
        }
    }
}

// =============================================================================
// Limits
// =============================================================================

/// Per-principal limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum secondary ranks one principal may hold.
    #[serde(default = "default_max_secondary_ranks")]
    pub max_secondary_ranks: usize,
}

fn default_max_secondary_ranks() -> usize {
    DEFAULT_MAX_SECONDARY_RANKS
}

impl LimitsConfig {
    /// Validates the limits.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_secondary_ranks > MAX_SECONDARY_RANKS_LIMIT {
            return Err(ConfigError::out_of_range(
                "limits.max_secondary_ranks",
                self.max_secondary_ranks,
                0,
                MAX_SECONDARY_RANKS_LIMIT,
            ));
        }
        Ok(())
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_secondary_ranks: default_max_secondary_ranks(),
        }
    }
}

// =============================================================================
// Periodic tasks
// =============================================================================

fn validate_interval(field: &str, secs: u64) -> ConfigResult<()> {
    if secs == 0 || secs > MAX_INTERVAL_SECS {
        return Err(ConfigError::out_of_range(field, secs, 1, MAX_INTERVAL_SECS));
    }
    Ok(())
}

/// External role sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Whether attached principals are synced periodically.
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between sync passes.
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,
}

fn default_sync_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

impl SyncConfig {
    /// Returns the interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validates the sync configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.enabled {
            validate_interval("sync.interval_secs", self.interval_secs)?;
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_sync_interval(),
        }
    }
}

/// Temporary grant expiry sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Seconds between sweeps.
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

impl SweepConfig {
    /// Returns the interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validates the sweep configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        validate_interval("sweep.interval_secs", self.interval_secs)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include span targets in logs.
    #[serde(default = "default_true")]
    pub with_target: bool,

    /// Include file/line in logs.
    #[serde(default)]
    pub with_file: bool,

    /// Include thread IDs in logs.
    #[serde(default)]
    pub with_thread_ids: bool,
}

impl LoggingConfig {
    /// Validates the logging configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            with_target: true,
            with_file: false,
            with_thread_ids: false,
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name, accepting `warning` for `warn`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Compact single-line text.
    Compact,
    /// JSON for log shippers.
    Json,
}

impl LogFormat {
    /// Parses a format name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "text" | "pretty" => Some(LogFormat::Text),
            "compact" => Some(LogFormat::Compact),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}
