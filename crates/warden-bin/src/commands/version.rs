// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `version` command.

use warden_config::{AuditFileFormat, StorageBackend};
use warden_core::MAX_INHERITANCE_DEPTH;

use crate::cli::Cli;
use crate::error::BinResult;

/// Prints crate versions and the engine's compiled-in capabilities.
pub fn version(_cli: &Cli) -> BinResult<()> {
    let backends = [StorageBackend::Memory, StorageBackend::JsonFile]
        .iter()
        .map(|b| b.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let audit_formats = [AuditFileFormat::Text, AuditFileFormat::JsonLines]
        .iter()
        .map(|f| format!("{:?}", f).to_lowercase())
        .collect::<Vec<_>>()
        .join(", ");

    println!("warden {}", crate::VERSION);
    println!("  {:<14} {}", warden_core::NAME, warden_core::VERSION);
    println!("  {:<14} {}", warden_config::NAME, warden_config::VERSION);
    println!();
    println!("Engine:");
    println!("  storage backends:      {}", backends);
    println!("  audit file formats:    {}", audit_formats);
    println!("  config formats:        yaml, toml, json");
    println!("  max inheritance depth: {}", MAX_INHERITANCE_DEPTH);
    println!();
    println!(
        "Built for {}-{}",
        std::env::consts::ARCH,
        std::env::consts::OS
    );

    Ok(())
}
