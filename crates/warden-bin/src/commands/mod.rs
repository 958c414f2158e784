// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `run`: Start the engine
//! - `validate`: Validate configuration file
//! - `version`: Show version information
//! - `check`: Resolve a stored principal and check a permission

mod check;
mod run;
mod validate;
mod version;

pub use check::check;
pub use run::run;
pub use validate::validate;
pub use version::version;

use std::path::Path;

use tracing::info;
use warden_config::{load_config, WardenConfig};

use crate::cli::{Cli, Commands};
use crate::error::{BinError, BinResult};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "warden.yaml";

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run(args) => run::run(&cli, args).await,
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Version => version::version(&cli),
        Commands::Check(args) => check::check(&cli, args).await,
    }
}

/// Loads the configuration at `path`.
///
/// A missing file at the default location yields the built-in defaults; a
/// missing file anywhere else is an error.
pub fn load_or_default(path: &Path) -> BinResult<WardenConfig> {
    if !path.exists() {
        if path == Path::new(DEFAULT_CONFIG_FILE) {
            info!(path = %path.display(), "No configuration file, using defaults");
            return Ok(WardenConfig::default());
        }
        return Err(BinError::config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    load_config(path).map_err(|e| BinError::from(e).with_context(format!("Loading {}", path.display())))
}
