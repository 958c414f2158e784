// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Service Integration Tests
//!
//! The full mutation pipeline: validation, ledger mutation, session
//! recompute, audit, persistence.
//!
//! - `test_lifecycle_*`: connect, world change, disconnect
//! - `test_temporary_*`: timed grants against a manual clock
//! - `test_rank_*`: rank graph editing
//! - `test_failure_*`: collaborator failures after a mutation
//! - `test_sync_*`: role sync with a mock bridge
//! - `test_restart_*`: file-backed state across a restart

use std::sync::Arc;

use chrono::Duration;
use warden_core::{
    AuditAction, Clock, PeriodicTask, Persistence, PrincipalId, Rank, RankDisplayUpdate,
    RankName, RoleSyncer,
};

use warden_tests::common::init_test_logging;
use warden_tests::prelude::*;

fn name(rank: &str) -> RankName {
    RankName::new(rank)
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_lifecycle_connect_world_change_disconnect() {
    let env = TestServiceBuilder::new().with_all_ranks().build();
    let console = TestService::console();
    let id = env.connect("steve").await;

    env.service
        .add_secondary_rank(&console, &id, &name("builder"))
        .await
        .unwrap();
    assert!(!env.service.check_permission(&id, "worldedit.use", None).unwrap());

    let resolved = env
        .service
        .on_world_change(&id, Some("creative".to_string()))
        .unwrap();
    assert!(resolved.has("worldedit.use"));
    assert!(env.service.check_permission(&id, "worldedit.use", None).unwrap());

    assert!(env.service.on_disconnect(&id).await);
    assert!(!env.service.sessions().is_attached(&id));
    assert!(env.service.profile(&id).unwrap().last_seen.is_some());

    // Offline checks resolve on demand.
    assert!(env
        .service
        .check_permission(&id, "worldedit.use", Some("creative"))
        .unwrap());
    assert!(!env.service.on_disconnect(&id).await);
}

#[tokio::test]
async fn test_lifecycle_reconnect_keeps_ranks() {
    let env = TestServiceBuilder::new().with_standard_ranks().build();
    let id = PrincipalFixtures::steve();

    env.connect_as(id, "steve", None).await;
    env.service
        .set_primary_rank(&TestService::console(), &id, Some(name("mod")))
        .await
        .unwrap();
    env.service.on_disconnect(&id).await;

    let resolved = env.connect_as(id, "Steve_", None).await;
    assert!(resolved.has("essentials.kick"));
    assert_eq!(env.service.profile(&id).unwrap().name, "Steve_");
    assert_eq!(env.audit_of(AuditAction::PrincipalCreate).len(), 1);
}

// =============================================================================
// Temporary Grants
// =============================================================================

#[tokio::test]
async fn test_temporary_end_to_end_with_manual_clock() {
    init_test_logging();
    let env = TestServiceBuilder::new().with_standard_ranks().build();
    let console = TestService::console();
    let id = env.connect("steve").await;

    env.service
        .set_primary_rank(&console, &id, Some(name("mod")))
        .await
        .unwrap();
    let resolved = env.service.resolve(&id, None).unwrap();
    assert_granted_exactly(&resolved, &["essentials.kick", "essentials.spawn"]);

    let expires = env.clock.now() + Duration::minutes(10);
    env.service
        .add_temporary_permission(&console, &id, "essentials.fly", expires)
        .await
        .unwrap();
    assert_granted(&env.service, &id, "essentials.fly");

    env.advance(Duration::minutes(11));
    assert!(!env.service.resolve(&id, None).unwrap().has("essentials.fly"));
    assert_eq!(env.service.profile(&id).unwrap().temporary_permissions.len(), 1);

    assert_eq!(env.service.sweep_expired_all().await, 1);
    assert!(env.service.profile(&id).unwrap().temporary_permissions.is_empty());
    assert_not_granted(&env.service, &id, "essentials.fly");

    let expired = env.audit_of(AuditAction::TempPermissionExpire);
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].actor_name, "SYSTEM");
    assert_eq!(expired[0].target_principal, Some(id));
}

#[tokio::test]
async fn test_temporary_past_expiry_is_rejected() {
    let env = TestServiceBuilder::new().with_all_ranks().build();
    let console = TestService::console();
    let id = env.connect("steve").await;
    let now = env.clock.now();

    let err = env
        .service
        .add_temporary_permission(&console, &id, "essentials.fly", now)
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "invalid_grant");

    let err = env
        .service
        .add_temporary_rank(&console, &id, &name("vip"), now - Duration::seconds(1))
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "invalid_grant");

    let profile = env.service.profile(&id).unwrap();
    assert!(profile.temporary_permissions.is_empty());
    assert!(profile.temporary_ranks.is_empty());
    assert!(env.audit_of(AuditAction::TempPermissionAdd).is_empty());
    assert!(env.audit_of(AuditAction::TempRankAdd).is_empty());
}

#[tokio::test]
async fn test_temporary_regrant_extends_expiry() {
    let env = TestServiceBuilder::new().with_all_ranks().build();
    let console = TestService::console();
    let id = env.connect("steve").await;
    let now = env.clock.now();

    env.service
        .add_temporary_rank(&console, &id, &name("vip"), now + Duration::minutes(5))
        .await
        .unwrap();
    env.service
        .add_temporary_rank(&console, &id, &name("vip"), now + Duration::minutes(30))
        .await
        .unwrap();

    env.advance(Duration::minutes(10));
    assert_eq!(env.service.sweep_expired_all().await, 0);
    assert_granted(&env.service, &id, "essentials.fly");

    let added = env.audit_of(AuditAction::TempRankAdd);
    assert_eq!(added.len(), 2);
    assert!(added[1].detail.contains("extended"));
}

#[tokio::test]
async fn test_temporary_expiry_answers_before_sweep() {
    let env = TestServiceBuilder::new().with_all_ranks().build();
    let console = TestService::console();
    let id = env.connect("steve").await;
    env.service
        .add_temporary_permission(
            &console,
            &id,
            "essentials.fly",
            env.clock.now() + Duration::minutes(10),
        )
        .await
        .unwrap();
    assert_granted(&env.service, &id, "essentials.fly");

    env.advance(Duration::minutes(11));
    assert_not_granted(&env.service, &id, "essentials.fly");
    assert_eq!(
        env.service.sessions().has_permission(&id, "essentials.fly"),
        Some(false)
    );
    assert_granted(&env.service, &id, "essentials.spawn");

    // The grant is still in the ledger until a sweep removes it.
    assert_eq!(env.service.profile(&id).unwrap().temporary_permissions.len(), 1);
    assert!(env.audit_of(AuditAction::TempPermissionExpire).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_temporary_periodic_sweep() {
    let env = TestServiceBuilder::new().with_all_ranks().build();
    let console = TestService::console();
    let id = env.connect("steve").await;
    env.service
        .add_temporary_rank(&console, &id, &name("vip"), env.clock.now() + Duration::minutes(1))
        .await
        .unwrap();
    env.advance(Duration::minutes(2));

    let task = PeriodicTask::new("sweep", std::time::Duration::from_secs(60));
    let service = Arc::clone(&env.service);
    let handle = task.start(move || {
        let service = Arc::clone(&service);
        async move {
            service.sweep_expired_all().await;
        }
    });

    tokio::time::sleep(std::time::Duration::from_secs(61)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    task.cancel();
    handle.await.unwrap();

    assert_eq!(task.stats().runs, 1);
    assert!(env.service.profile(&id).unwrap().temporary_ranks.is_empty());
    assert_not_granted(&env.service, &id, "essentials.fly");
}

// =============================================================================
// Rank Graph
// =============================================================================

#[tokio::test]
async fn test_rank_cycle_rejected_without_side_effects() {
    let env = TestServiceBuilder::new().with_standard_ranks().build();
    let console = TestService::console();
    let before = env.audit_actions().len();

    let err = env
        .service
        .add_inheritance(&console, &name("default"), &name("admin"))
        .await
        .unwrap_err();

    assert_eq!(err.error_type(), "cycle_detected");
    assert!(env.service.rank(&name("default")).unwrap().inherits.is_empty());
    assert_eq!(env.audit_actions().len(), before);
}

#[tokio::test]
async fn test_rank_edit_reaches_attached_sessions() {
    let env = TestServiceBuilder::new().with_standard_ranks().build();
    let console = TestService::console();
    let id = env.connect("steve").await;

    env.service
        .add_rank_permission(&console, &name("default"), "essentials.home", None)
        .await
        .unwrap();
    assert_granted(&env.service, &id, "essentials.home");

    env.service
        .add_rank_permission(&console, &name("default"), "-essentials.spawn", None)
        .await
        .unwrap();
    assert_not_granted(&env.service, &id, "essentials.spawn");

    let rank = env
        .service
        .update_rank_display(
            &console,
            &name("default"),
            RankDisplayUpdate::new().prefix("[Guest] ").name_color("&8"),
        )
        .await
        .unwrap();
    assert_eq!(rank.prefix, "[Guest] ");
    let display = env.service.sessions().handle(&id).unwrap().display();
    assert_eq!(display.formatted_name, "[Guest] &8steve");

    assert_actions_contain(
        &env.audit_actions(),
        &[
            AuditAction::RankPermissionAdd,
            AuditAction::RankPermissionAdd,
            AuditAction::RankUpdate,
        ],
    );
}

#[tokio::test]
async fn test_rank_delete_is_permissive() {
    let env = TestServiceBuilder::new().with_standard_ranks().build();
    let console = TestService::console();
    let id = env.connect("steve").await;
    env.service
        .set_primary_rank(&console, &id, Some(name("admin")))
        .await
        .unwrap();
    let alex = env.connect("alex").await;
    env.service
        .set_primary_rank(&console, &alex, Some(name("mod")))
        .await
        .unwrap();

    let deletion = env.service.delete_rank(&console, &name("mod")).await.unwrap();
    assert_eq!(deletion.ranks, vec![name("admin")]);
    assert_eq!(deletion.principals, vec![alex]);
    assert!(!deletion.is_clean());
    assert!(!env.service.resolve(&alex, None).unwrap().has("essentials.kick"));

    let resolved = env.service.resolve(&id, None).unwrap();
    assert!(resolved.has("essentials.ban"));
    assert!(!resolved.has("essentials.kick"));
    assert!(!resolved.has("essentials.spawn"));
    assert!(!resolved.anomalies.is_empty());

    let err = env.service.delete_rank(&console, &name("mod")).await.unwrap_err();
    assert_eq!(err.error_type(), "not_found");
}

#[tokio::test]
async fn test_rank_create_rejects_inheritance_cycle() {
    let env = TestServiceBuilder::new().with_standard_ranks().build();
    let console = TestService::console();

    env.service
        .create_rank(&console, Rank::builder("a").inherit("b").build().unwrap())
        .await
        .unwrap();
    let err = env
        .service
        .create_rank(&console, Rank::builder("b").inherit("a").build().unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "cycle_detected");
    assert!(env.service.rank(&name("b")).is_none());

    let err = env
        .service
        .create_rank(&console, Rank::builder("loop").inherit("loop").build().unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "cycle_detected");
    assert_eq!(env.audit_of(AuditAction::RankCreate).len(), 1);
}

#[tokio::test]
async fn test_rank_unknown_assignment_rejected() {
    let env = TestServiceBuilder::new().with_standard_ranks().build();
    let console = TestService::console();
    let id = env.connect("steve").await;

    let err = env
        .service
        .add_secondary_rank(&console, &id, &name("ghost"))
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "not_found");

    let err = env
        .service
        .set_primary_rank(&console, &PrincipalId::random(), Some(name("mod")))
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "not_found");
}

#[tokio::test]
async fn test_rank_secondary_limit() {
    let env = TestServiceBuilder::new()
        .with_all_ranks()
        .max_secondary_ranks(2)
        .build();
    let console = TestService::console();
    let id = env.connect("steve").await;

    assert!(env.service.add_secondary_rank(&console, &id, &name("vip")).await.unwrap());
    assert!(env.service.add_secondary_rank(&console, &id, &name("builder")).await.unwrap());
    let err = env
        .service
        .add_secondary_rank(&console, &id, &name("muted"))
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "limit_exceeded");

    // Promotion frees a secondary slot.
    env.service
        .set_primary_rank(&console, &id, Some(name("vip")))
        .await
        .unwrap();
    assert!(env.service.add_secondary_rank(&console, &id, &name("muted")).await.unwrap());
    assert_eq!(
        env.service.profile(&id).unwrap().secondary_ranks,
        vec![name("builder"), name("muted")]
    );
}

// =============================================================================
// Collaborator Failures
// =============================================================================

#[tokio::test]
async fn test_failure_persistence_is_swallowed() {
    let flaky = Arc::new(FlakyPersistence::new());
    let env = TestServiceBuilder::new()
        .with_standard_ranks()
        .persistence(flaky.clone())
        .build();
    let console = TestService::console();
    let id = env.connect("steve").await;

    flaky.set_fail_writes(true);
    env.service
        .add_permission(&console, &id, "essentials.tpa", None)
        .await
        .unwrap();

    assert_granted(&env.service, &id, "essentials.tpa");
    assert!(flaky.failed_writes() >= 1);
    assert_eq!(env.audit_of(AuditAction::PermissionAdd).len(), 1);
}

// =============================================================================
// Role Sync
// =============================================================================

#[tokio::test]
async fn test_sync_links_and_pushes_once() {
    let env = TestServiceBuilder::new().with_all_ranks().build();
    let console = TestService::console();
    let id = env.connect("steve").await;
    env.service
        .add_secondary_rank(&console, &id, &name("vip"))
        .await
        .unwrap();

    let bridge = Arc::new(MockBridge::new());
    bridge.link(id, "discord:42");
    let syncer = RoleSyncer::new(
        Arc::clone(env.service.ledger()),
        bridge.clone(),
        Arc::clone(env.service.recorder()),
    );

    let outcome = syncer.sync_principal(&id).await.unwrap();
    assert!(outcome.linked);
    assert_eq!(
        outcome.pushed,
        Some(vec!["default".to_string(), "vip".to_string()])
    );
    assert_eq!(
        env.service.profile(&id).unwrap().external_id.as_deref(),
        Some("discord:42")
    );

    // Unchanged role set: pushed again, audited once.
    assert_eq!(syncer.sync_all_attached(env.service.sessions()).await, 1);
    assert_eq!(bridge.pushes().len(), 2);
    assert_eq!(bridge.pull_count(), 1);
    assert_eq!(env.audit_of(AuditAction::ExternalLink).len(), 1);
    assert_eq!(env.audit_of(AuditAction::RoleSync).len(), 1);
}

#[tokio::test]
async fn test_sync_failure_does_not_stop_pass() {
    let env = TestServiceBuilder::new().with_standard_ranks().build();
    let a = env.connect("steve").await;
    let _b = env.connect("alex").await;

    let bridge = Arc::new(MockBridge::new());
    bridge.link(a, "discord:1");
    bridge.set_fail_pushes(true);
    let syncer = RoleSyncer::new(
        Arc::clone(env.service.ledger()),
        bridge.clone(),
        Arc::clone(env.service.recorder()),
    );

    // The unlinked principal succeeds with nothing to push.
    assert_eq!(syncer.sync_all_attached(env.service.sessions()).await, 1);
    assert!(bridge.pushes().is_empty());
    assert!(env.audit_of(AuditAction::RoleSync).is_empty());
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mutations_on_distinct_principals() {
    let env = TestServiceBuilder::new().with_standard_ranks().build();
    let ids = PrincipalFixtures::batch(16);
    for (i, id) in ids.iter().enumerate() {
        env.connect_as(*id, &format!("player{}", i), None).await;
    }

    let mut handles = Vec::new();
    for id in ids.clone() {
        let service = Arc::clone(&env.service);
        handles.push(tokio::spawn(async move {
            let console = TestService::console();
            for n in 0..10 {
                service
                    .add_permission(&console, &id, &format!("perm.{}", n), None)
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for id in &ids {
        for n in 0..10 {
            assert_granted(&env.service, id, &format!("perm.{}", n));
        }
    }
    assert_eq!(env.audit_of(AuditAction::PermissionAdd).len(), 160);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mutations_and_sweeps_on_one_principal() {
    let flaky = Arc::new(FlakyPersistence::new());
    let env = TestServiceBuilder::new()
        .with_standard_ranks()
        .persistence(flaky.clone())
        .build();
    let id = env.connect("steve").await;
    env.service
        .add_temporary_permission(
            &TestService::console(),
            &id,
            "essentials.heal",
            env.clock.now() + Duration::minutes(1),
        )
        .await
        .unwrap();
    env.advance(Duration::minutes(2));

    // Early saves finish last unless saves of one principal are ordered.
    const TASKS: usize = 24;
    flaky.set_save_delays((0..TASKS as u64).rev().map(std::time::Duration::from_millis));

    let mut handles = Vec::new();
    for n in 0..TASKS {
        let service = Arc::clone(&env.service);
        handles.push(tokio::spawn(async move {
            service
                .add_permission(&TestService::console(), &id, &format!("perm.{}", n), None)
                .await
                .unwrap();
        }));
        if n % 6 == 0 {
            let service = Arc::clone(&env.service);
            handles.push(tokio::spawn(async move {
                service.sweep_expired_all().await;
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for n in 0..TASKS {
        assert_granted(&env.service, &id, &format!("perm.{}", n));
    }
    assert_not_granted(&env.service, &id, "essentials.heal");
    assert_eq!(env.audit_of(AuditAction::PermissionAdd).len(), TASKS);
    assert_eq!(env.audit_of(AuditAction::TempPermissionExpire).len(), 1);

    let profile = env.service.profile(&id).unwrap();
    assert_eq!(profile.permissions.len(), TASKS);
    assert!(profile.temporary_permissions.is_empty());
    let saved = flaky.load_principal(&id).await.unwrap().unwrap();
    assert_eq!(saved, profile);
}

// =============================================================================
// Restart
// =============================================================================

#[tokio::test]
async fn test_restart_restores_file_backed_state() {
    let harness = TestHarness::with_name("restart");
    let id = PrincipalFixtures::alex();

    harness
        .run(|| async {
            let service = harness.open_service().await;
            let console = TestService::console();
            for rank in RankFixtures::standard() {
                service.create_rank(&console, rank).await.unwrap();
            }
            service.on_connect(id, "alex", None).await.unwrap();
            service
                .set_primary_rank(&console, &id, Some(name("mod")))
                .await
                .unwrap();
            service
                .add_temporary_permission(
                    &console,
                    &id,
                    "essentials.fly",
                    harness.clock().now() + Duration::hours(1),
                )
                .await
                .unwrap();
            service.flush().await;

            let reopened = harness.open_service().await;
            assert_eq!(reopened.ranks().len(), 3);
            let profile = reopened.profile(&id).unwrap();
            assert_eq!(profile.primary_rank, Some(name("mod")));
            assert_eq!(profile.temporary_permissions.len(), 1);
            assert_granted(&reopened, &id, "essentials.fly");
            assert_granted(&reopened, &id, "essentials.spawn");

            let history = reopened.query_audit(id, 0).await;
            assert_newest_first(&history);
            assert_eq!(history[0].action, AuditAction::TempPermissionAdd);
            assert!(history.iter().all(|e| e.origin == "restart"));

            let log = std::fs::read_to_string(harness.audit_log()).unwrap();
            assert!(log.lines().count() >= 6);
        })
        .await;
}
