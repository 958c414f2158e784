// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Unified error hierarchy for WARDEN.
//!
//! # Error Hierarchy
//!
//! ```text
//! WardenError (root)
//! ├── NotFound                    - Unknown rank or principal reference
//! ├── InvalidGrant                - Non-future expiry on a temporary grant
//! ├── InvalidPermission           - Malformed permission string
//! ├── CycleDetected               - Inheritance edge would close a cycle
//! ├── LimitExceeded               - Configured per-principal limit reached
//! ├── AlreadyExists               - Duplicate rank creation
//! ├── SinkUnavailable             - Audit or persistence sink failed
//! ├── ConcurrentMutationConflict  - Same-principal race that could not be serialized
//! └── Persistence                 - Wrapped persistence collaborator error
//! ```
//!
//! Collaborator failures that happen *after* an in-memory mutation succeeded
//! are logged and swallowed by the service layer; only validation errors
//! reach the caller.
//!
//! # Examples
//!
//! ```
//! use warden_core::error::WardenError;
//! use chrono::Utc;
//!
//! let error = WardenError::invalid_grant("essentials.fly", Utc::now(), "expiry is not in the future");
//! assert_eq!(error.error_type(), "invalid_grant");
//! assert!(!error.is_retryable());
//! ```

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::persistence::PersistenceError;

// =============================================================================
// WardenError
// =============================================================================

/// The root error type for WARDEN.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Unknown rank or principal reference.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What kind of entity was looked up.
        kind: EntityKind,
        /// The name or id that was looked up.
        name: String,
    },

    /// A temporary grant was rejected at the ledger boundary.
    #[error("Invalid grant for '{key}' (expiry {expires_at}): {reason}")]
    InvalidGrant {
        /// The rank name or permission string of the grant.
        key: String,
        /// The rejected expiry.
        expires_at: DateTime<Utc>,
        /// Why the grant was rejected.
        reason: String,
    },

    /// A permission string could not be parsed.
    #[error("Invalid permission '{raw}': {reason}")]
    InvalidPermission {
        /// The raw permission string.
        raw: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Adding an inheritance edge would create a cycle.
    #[error("Inheritance cycle detected: {}", path.join(" -> "))]
    CycleDetected {
        /// The rank names forming the cycle, starting and ending with the same rank.
        path: Vec<String>,
    },

    /// A configured limit was reached.
    #[error("Limit exceeded for '{subject}': at most {limit} {what}")]
    LimitExceeded {
        /// The principal or rank the limit applies to.
        subject: String,
        /// What is being limited.
        what: String,
        /// The configured limit.
        limit: usize,
    },

    /// An entity with the same identity already exists.
    #[error("{kind} already exists: {name}")]
    AlreadyExists {
        /// What kind of entity.
        kind: EntityKind,
        /// Its name.
        name: String,
    },

    /// An audit or persistence sink could not be reached.
    #[error("Sink '{sink}' unavailable: {message}")]
    SinkUnavailable {
        /// Name of the sink.
        sink: String,
        /// Error message.
        message: String,
    },

    /// Two mutations on the same principal raced.
    #[error("Concurrent mutation conflict on principal {principal}")]
    ConcurrentMutationConflict {
        /// The principal being mutated.
        principal: String,
    },

    /// Wrapped persistence error.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl WardenError {
    /// Creates a rank-not-found error.
    pub fn rank_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: EntityKind::Rank,
            name: name.into(),
        }
    }

    /// Creates a principal-not-found error.
    pub fn principal_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: EntityKind::Principal,
            name: id.to_string(),
        }
    }

    /// Creates an invalid grant error.
    pub fn invalid_grant(
        key: impl Into<String>,
        expires_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidGrant {
            key: key.into(),
            expires_at,
            reason: reason.into(),
        }
    }

    /// Creates an invalid permission error.
    pub fn invalid_permission(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPermission {
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    /// Creates a cycle detected error.
    pub fn cycle(path: Vec<String>) -> Self {
        Self::CycleDetected { path }
    }

    /// Creates a limit exceeded error.
    pub fn limit_exceeded(subject: impl Into<String>, what: impl Into<String>, limit: usize) -> Self {
        Self::LimitExceeded {
            subject: subject.into(),
            what: what.into(),
            limit,
        }
    }

    /// Creates a rank-already-exists error.
    pub fn rank_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: EntityKind::Rank,
            name: name.into(),
        }
    }

    /// Creates a sink unavailable error.
    pub fn sink_unavailable(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkUnavailable {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WardenError::SinkUnavailable { .. } | WardenError::ConcurrentMutationConflict { .. } => {
                true
            }
            WardenError::Persistence(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns `true` if this error was caused by caller input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WardenError::NotFound { .. }
                | WardenError::InvalidGrant { .. }
                | WardenError::InvalidPermission { .. }
                | WardenError::CycleDetected { .. }
                | WardenError::LimitExceeded { .. }
                | WardenError::AlreadyExists { .. }
        )
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            WardenError::NotFound { .. } => "not_found",
            WardenError::InvalidGrant { .. } => "invalid_grant",
            WardenError::InvalidPermission { .. } => "invalid_permission",
            WardenError::CycleDetected { .. } => "cycle_detected",
            WardenError::LimitExceeded { .. } => "limit_exceeded",
            WardenError::AlreadyExists { .. } => "already_exists",
            WardenError::SinkUnavailable { .. } => "sink_unavailable",
            WardenError::ConcurrentMutationConflict { .. } => "concurrent_mutation_conflict",
            WardenError::Persistence(_) => "persistence",
        }
    }
}

/// Result type for WARDEN operations.
pub type WardenResult<T> = Result<T, WardenError>;

// =============================================================================
// EntityKind
// =============================================================================

/// The kind of entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A rank.
    Rank,
    /// A principal profile.
    Principal,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Rank => write!(f, "Rank"),
            EntityKind::Principal => write!(f, "Principal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WardenError::rank_not_found("mod");
        assert_eq!(err.to_string(), "Rank not found: mod");

        let err = WardenError::cycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Inheritance cycle detected: a -> b -> a");
    }

    #[test]
    fn test_error_classification() {
        let err = WardenError::sink_unavailable("audit-file", "disk full");
        assert!(err.is_retryable());
        assert!(!err.is_validation());
        assert_eq!(err.error_type(), "sink_unavailable");

        let err = WardenError::limit_exceeded("steve", "secondary ranks", 3);
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }
}
