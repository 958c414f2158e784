// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Custom Assertions

use warden_core::{AuditAction, AuditEntry, PermissionService, PrincipalId, ResolvedCapabilities};

/// Asserts that `permission` is granted globally.
#[track_caller]
pub fn assert_granted(service: &PermissionService, id: &PrincipalId, permission: &str) {
    let granted = service
        .check_permission(id, permission, None)
        .expect("principal should exist");
    assert!(granted, "expected {} to be granted to {}", permission, id);
}

/// Asserts that `permission` is not granted globally.
#[track_caller]
pub fn assert_not_granted(service: &PermissionService, id: &PrincipalId, permission: &str) {
    let granted = service
        .check_permission(id, permission, None)
        .expect("principal should exist");
    assert!(!granted, "expected {} not to be granted to {}", permission, id);
}

/// Asserts the exact granted set, ignoring order.
#[track_caller]
pub fn assert_granted_exactly(resolved: &ResolvedCapabilities, expected: &[&str]) {
    let mut expected: Vec<&str> = expected.to_vec();
    expected.sort_unstable();
    assert_eq!(resolved.granted_sorted(), expected);
}

/// Asserts entries are ordered newest first.
#[track_caller]
pub fn assert_newest_first(entries: &[AuditEntry]) {
    for pair in entries.windows(2) {
        assert!(
            pair[0].timestamp >= pair[1].timestamp,
            "entries out of order: {} before {}",
            pair[0].timestamp,
            pair[1].timestamp
        );
    }
}

/// Asserts that `actions` contains `expected` as a contiguous run, in order.
#[track_caller]
pub fn assert_actions_contain(actions: &[AuditAction], expected: &[AuditAction]) {
    let found = actions.windows(expected.len()).any(|w| w == expected);
    assert!(found, "expected {:?} within {:?}", expected, actions);
}
