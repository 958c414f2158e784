// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Audit Integration Tests
//!
//! - `test_cap_*`: entry cap and eviction order
//! - `test_query_*`: newest-first queries and limits
//! - `test_retention_*`: time-based pruning
//! - `test_sink_*`: file sinks and failure accounting

use std::sync::Arc;

use chrono::Duration;
use warden_core::audit::{AuditSink, JsonLinesFormatter, NoOpAuditSink};
use warden_core::{
    Actor, AuditAction, AuditEntry, AuditFilter, AuditRecorder, AuditSettings,
    InMemoryAuditStore, PrincipalId, RankName, TextAuditSink,
};

use warden_tests::common::temp_test_dir;
use warden_tests::prelude::*;

fn recorder(store: &InMemoryAuditStore, max_entries: usize) -> AuditRecorder {
    AuditRecorder::new(
        Arc::new(store.clone()),
        AuditSettings {
            max_entries,
            default_query_limit: 3,
            origin: "lobby".to_string(),
            ..AuditSettings::default()
        },
    )
}

fn entry(n: usize, principal: Option<PrincipalId>) -> AuditEntry {
    let mut builder = AuditEntry::builder(AuditAction::PermissionAdd)
        .actor(&Actor::console())
        .at(test_epoch() + Duration::seconds(n as i64))
        .detail(format!("perm.{}", n));
    if let Some(principal) = principal {
        builder = builder.target_principal(principal);
    }
    builder.build()
}

// =============================================================================
// Entry Cap
// =============================================================================

#[tokio::test]
async fn test_cap_evicts_oldest_entries() {
    let max = 20;
    let store = InMemoryAuditStore::new();
    let recorder = recorder(&store, max);

    for n in 0..max + 5 {
        recorder.record(entry(n, None)).await;
    }

    assert_eq!(store.len(), max);
    let entries = recorder.query_all(100).await.unwrap();
    assert_eq!(entries.len(), max);
    assert_newest_first(&entries);
    assert_eq!(entries[0].detail, format!("perm.{}", max + 4));
    assert_eq!(entries[max - 1].detail, "perm.5");
    assert!(entries.iter().all(|e| e.detail != "perm.4"));

    let stats = recorder.stats();
    assert_eq!(stats.recorded, (max + 5) as u64);
    assert_eq!(stats.pruned, 5);
}

#[tokio::test]
async fn test_cap_through_service_pipeline() {
    let env = TestServiceBuilder::new()
        .with_standard_ranks()
        .audit_max_entries(10)
        .build();
    let console = TestService::console();
    let id = env.connect("steve").await;

    for n in 0..14 {
        env.service
            .add_permission(&console, &id, &format!("perm.{}", n), None)
            .await
            .unwrap();
    }

    // 1 PrincipalCreate + 14 PermissionAdd, capped at 10.
    let entries = env.service.query_audit_all(50).await;
    assert_eq!(entries.len(), 10);
    assert!(entries.iter().all(|e| e.action == AuditAction::PermissionAdd));
    assert_eq!(entries[0].detail, "perm.13");
    assert_eq!(entries[9].detail, "perm.4");
}

// =============================================================================
// Queries
// =============================================================================

#[tokio::test]
async fn test_query_non_positive_limit_uses_default() {
    let store = InMemoryAuditStore::new();
    let recorder = recorder(&store, 100);
    for n in 0..10 {
        recorder.record(entry(n, None)).await;
    }

    assert_eq!(recorder.query_all(0).await.unwrap().len(), 3);
    assert_eq!(recorder.query_all(-7).await.unwrap().len(), 3);
    assert_eq!(recorder.query_all(5).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_query_by_principal_and_filter() {
    let store = InMemoryAuditStore::new();
    let recorder = recorder(&store, 100);
    let steve = PrincipalFixtures::steve();
    let alex = PrincipalFixtures::alex();

    for n in 0..6 {
        let target = if n % 2 == 0 { steve } else { alex };
        recorder.record(entry(n, Some(target))).await;
    }
    recorder
        .record(
            AuditEntry::builder(AuditAction::RankCreate)
                .actor(&Actor::console())
                .at(test_epoch() + Duration::seconds(10))
                .target_rank(RankName::new("vip"))
                .detail("created rank vip")
                .build(),
        )
        .await;

    let for_steve = recorder.query(steve, 10).await.unwrap();
    let details: Vec<&str> = for_steve.iter().map(|e| e.detail.as_str()).collect();
    assert_eq!(details, vec!["perm.4", "perm.2", "perm.0"]);

    let rank_changes = recorder
        .query_filter(AuditFilter::new().rank(RankName::new("VIP")))
        .await
        .unwrap();
    assert_eq!(rank_changes.len(), 1);
    assert_eq!(rank_changes[0].action, AuditAction::RankCreate);
    assert!(rank_changes.iter().all(|e| e.origin == "lobby"));

    let window = recorder
        .query_filter(AuditFilter::new().time_range(
            test_epoch() + Duration::seconds(2),
            test_epoch() + Duration::seconds(4),
        ))
        .await
        .unwrap();
    assert!(window.iter().all(|e| {
        e.timestamp >= test_epoch() + Duration::seconds(2)
            && e.timestamp <= test_epoch() + Duration::seconds(4)
    }));
    assert!(!window.is_empty());
}

// =============================================================================
// Retention
// =============================================================================

#[tokio::test]
async fn test_retention_prunes_old_entries() {
    let env = TestServiceBuilder::new()
        .with_standard_ranks()
        .audit_retention_days(7)
        .build();
    let console = TestService::console();
    let id = env.connect("steve").await;
    env.service
        .add_permission(&console, &id, "essentials.old", None)
        .await
        .unwrap();

    env.advance(Duration::days(8));
    env.service
        .add_permission(&console, &id, "essentials.new", None)
        .await
        .unwrap();

    assert_eq!(env.service.prune_audit_expired().await, 2);
    let remaining = env.service.query_audit(id, 50).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].detail, "essentials.new");
    assert_eq!(env.service.recorder().stats().pruned, 2);
}

#[tokio::test]
async fn test_disabled_recorder_records_nothing() {
    let env = TestServiceBuilder::new()
        .with_standard_ranks()
        .audit_disabled()
        .build();
    let id = env.connect("steve").await;
    env.service
        .add_permission(&TestService::console(), &id, "essentials.tpa", None)
        .await
        .unwrap();

    assert!(env.audit.is_empty());
    assert_eq!(env.service.recorder().stats().recorded, 0);
    assert_granted(&env.service, &id, "essentials.tpa");
}

// =============================================================================
// Sinks
// =============================================================================

#[tokio::test]
async fn test_sink_text_file_receives_every_entry() {
    let dir = temp_test_dir("warden_audit_");
    let path = dir.path().join("audit.jsonl");
    let store = InMemoryAuditStore::new();
    let text = TextAuditSink::with_formatter(&path, JsonLinesFormatter::new()).unwrap();
    let recorder = recorder(&store, 2).with_text_sink(Arc::new(text));

    for n in 0..4 {
        recorder.record(entry(n, None)).await;
    }
    recorder.flush().await;

    // The text log is append-only and ignores the cap.
    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines.iter().all(|l| l.contains("\"action\":\"permission_add\"")));
    assert!(lines[3].contains("perm.3"));
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_sink_noop_store_accepts_and_returns_nothing() {
    let recorder = AuditRecorder::new(Arc::new(NoOpAuditSink::new()), AuditSettings::default());
    recorder.record(entry(0, None)).await;

    assert!(!NoOpAuditSink::new().supports_query());
    assert!(recorder.query_all(10).await.unwrap().is_empty());
    assert_eq!(recorder.stats().recorded, 1);
    assert_eq!(recorder.stats().sink_failures, 0);
}

#[tokio::test]
async fn test_sink_keeps_explicit_origin() {
    let store = InMemoryAuditStore::new();
    let recorder = recorder(&store, 10);
    recorder
        .record(
            AuditEntry::builder(AuditAction::RoleSync)
                .actor(&Actor::console())
                .origin("proxy")
                .build(),
        )
        .await;
    recorder.record(entry(1, None)).await;

    let origins: Vec<String> = store.entries().into_iter().map(|e| e.origin).collect();
    assert_eq!(origins, vec!["proxy".to_string(), "lobby".to_string()]);
}
