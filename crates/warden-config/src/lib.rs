// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # warden-config
//!
//! Configuration management for the WARDEN permission engine.
//!
//! ## Features
//!
//! - **Schema Definition**: Sections with defaults and validation
//! - **Multi-Format Support**: YAML, TOML, and JSON configuration files
//! - **Environment Overrides**: `WARDEN_*` variables override file values
//! - **Placeholders**: `${VAR}` and `${VAR:default}` inside files
//!
//! ## Quick Start
//!
//! ```no_run
//! use warden_config::loader::load_config;
//!
//! let config = load_config("warden.yaml").unwrap();
//! println!("Server: {}", config.server.name);
//! println!("Audit cap: {}", config.audit.max_entries);
//! ```
//!
//! ## Example File
//!
//! ```yaml
//! server:
//!   name: "${SERVER_NAME:lobby}"
//! storage:
//!   backend: json_file
//!   path: ./data
//! audit:
//!   max_entries: 10000
//!   retention_days: 30
//! sync:
//!   enabled: true
//!   interval_secs: 300
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod loader;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader, ConfigLoaderBuilder};
pub use schema::{
    AuditConfig, AuditFileFormat, LimitsConfig, LogFormat, LogLevel, LoggingConfig, ServerConfig,
    StorageBackend, StorageConfig, SweepConfig, SyncConfig, WardenConfig,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
