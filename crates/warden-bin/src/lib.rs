// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # warden-bin
//!
//! CLI binary for the WARDEN permission engine.
//!
//! - CLI argument parsing with clap
//! - Runtime orchestration (restore, expiry sweep, role sync)
//! - Graceful shutdown handling
//! - Logging initialization
//! - Command implementations (run, validate, version, check)
//!
//! ## Architecture
//!
//! ```text
//!                     main.rs
//!                        │
//!                     cli.rs
//!                        │
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!      commands       runtime       logging
//!          │             │
//!          │         shutdown
//!          │             │
//!          └──────┬──────┘
//!                 ▼
//!       warden-core / warden-config
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the engine (default command)
//! warden
//!
//! # Start with a custom config, keeping state in memory
//! warden -c /etc/warden/warden.toml run --ephemeral
//!
//! # Validate configuration
//! warden validate --strict
//!
//! # Check a stored principal's permission in a world
//! warden check 0191e0a4-7c1e-7000-8000-000000000001 essentials.fly -w nether
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{build_service, RuntimeBuilder, WardenRuntime};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal, ShutdownToken};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
