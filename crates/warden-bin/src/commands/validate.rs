// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use warden_config::{StorageBackend, WardenConfig};

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Executes the `validate` command to validate configuration.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;

    if !config_path.exists() {
        return Err(BinError::config(format!(
            "Configuration file not found: {}",
            config_path.display()
        )));
    }

    let config = warden_config::load_config(config_path)
        .map_err(|e| BinError::config(format!("Configuration validation failed: {}", e)))?;

    let warnings = collect_warnings(&config);

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Server:          {}", config.server.name);
            println!("  Storage:         {} ({})", config.storage.backend.as_str(), config.storage.path.display());
            println!("  Audit:           {}", if config.audit.enabled { "enabled" } else { "disabled" });
            println!("  Audit cap:       {}", config.audit.max_entries);
            match config.audit.retention_days {
                Some(days) => println!("  Audit retention: {} days", days),
                None => println!("  Audit retention: unlimited"),
            }
            println!("  Secondary ranks: up to {}", config.limits.max_secondary_ranks);
            println!("  Sweep interval:  {}s", config.sweep.interval_secs);
            println!(
                "  Role sync:       {}",
                if config.sync.enabled {
                    format!("every {}s", config.sync.interval_secs)
                } else {
                    "disabled".to_string()
                }
            );

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!(
                    "{}",
                    serde_json::to_string_pretty(&config)
                        .unwrap_or_else(|_| "(serialization error)".to_string())
                );
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "server": config.server.name,
                    "storage_backend": config.storage.backend.as_str(),
                    "audit_enabled": config.audit.enabled,
                    "audit_max_entries": config.audit.max_entries,
                    "audit_retention_days": config.audit.retention_days,
                    "sync_enabled": config.sync.enabled,
                },
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            let text = serde_json::to_string_pretty(&output)
                .map_err(|e| BinError::runtime(format!("Failed to render output: {}", e)))?;
            println!("{}", text);
        }
    }

    if args.strict && !warnings.is_empty() {
        return Err(BinError::config(format!(
            "Strict mode: {} warning(s) found",
            warnings.len()
        )));
    }

    Ok(())
}

/// Non-fatal issues worth pointing out.
fn collect_warnings(config: &WardenConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.storage.backend == StorageBackend::Memory {
        warnings.push("Memory storage backend: state is lost on restart".to_string());
    } else if !config.storage.path.exists() {
        warnings.push(format!(
            "Storage directory does not exist (will be created): {}",
            config.storage.path.display()
        ));
    }

    if config.audit.enabled && config.audit.log_to_file {
        if let Some(parent) = config.audit.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                warnings.push(format!(
                    "Audit log directory does not exist (will be created): {}",
                    parent.display()
                ));
            }
        }
    }

    if config.audit.enabled && config.audit.retention_days.is_none() {
        warnings.push("Audit retention is unlimited; only the entry cap bounds the log".to_string());
    }

    if config.sync.enabled {
        warnings.push("Role sync is enabled but no identity bridge is linked".to_string());
    }

    warnings
}
