// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `check` command.

use std::sync::Arc;

use warden_core::{
    AuditRecorder, AuditSettings, DisplayProjection, InMemoryAuditStore, PermissionService,
    PrincipalId, ResolvedCapabilities,
};

use crate::cli::{CheckArgs, Cli, OutputFormat};
use crate::error::{BinError, BinResult};
use crate::runtime::open_persistence;

use super::load_or_default;

/// Executes the `check` command: resolves a stored principal offline.
///
/// Nothing is recorded to the audit log and nothing is written back.
pub async fn check(cli: &Cli, args: CheckArgs) -> BinResult<()> {
    let id = PrincipalId::parse(&args.principal)
        .ok_or_else(|| BinError::input(format!("Not a principal UUID: {}", args.principal)))?;

    let config = load_or_default(&cli.config)?;
    let persistence = open_persistence(&config).await?;
    let recorder = AuditRecorder::new(
        Arc::new(InMemoryAuditStore::new()),
        AuditSettings {
            enabled: false,
            ..AuditSettings::default()
        },
    );
    let service = PermissionService::builder()
        .persistence(persistence)
        .recorder(Arc::new(recorder))
        .max_secondary_ranks(config.limits.max_secondary_ranks)
        .build();
    service.restore().await?;

    let profile = service
        .profile(&id)
        .ok_or_else(|| BinError::input(format!("Unknown principal: {}", id)))?;
    let resolved = service.resolve(&id, args.world.as_deref())?;
    let primary = profile
        .primary_rank
        .as_ref()
        .and_then(|name| service.rank(name));
    let display = DisplayProjection::project(&profile.name, primary.as_deref());
    let ranks: Vec<String> = profile
        .effective_ranks(resolved.resolved_at)
        .iter()
        .map(|r| r.to_string())
        .collect();

    match args.format {
        OutputFormat::Text => {
            println!("Principal: {} ({})", profile.name, id);
            println!("Display:   {}", display.formatted_name);
            println!("World:     {}", args.world.as_deref().unwrap_or("(global)"));
            println!("Ranks:     {}", if ranks.is_empty() { "(none)".to_string() } else { ranks.join(", ") });
            println!();
            match &args.permission {
                Some(permission) => println!("{}: {}", permission, verdict(&resolved, permission)),
                None => {
                    println!("Granted permissions:");
                    for name in resolved.granted_sorted() {
                        println!("  {}", name);
                    }
                }
            }
            if !resolved.anomalies.is_empty() {
                println!();
                println!("Anomalies:");
                for anomaly in &resolved.anomalies {
                    println!("  ⚠ {}", anomaly);
                }
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "principal": id,
                "name": profile.name,
                "display": display,
                "world": args.world,
                "ranks": ranks,
                "permission": args.permission,
                "result": args.permission.as_deref().map(|p| resolved.has(p)),
                "granted": resolved.granted_sorted(),
                "anomalies": resolved.anomalies,
            });
            let text = serde_json::to_string_pretty(&output)
                .map_err(|e| BinError::runtime(format!("Failed to render output: {}", e)))?;
            println!("{}", text);
        }
    }

    Ok(())
}

fn verdict(resolved: &ResolvedCapabilities, permission: &str) -> &'static str {
    if resolved.has(permission) {
        "granted"
    } else if resolved.is_negated(permission) {
        "denied (negated)"
    } else {
        "not set"
    }
}
