// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Audit error types.

use thiserror::Error;

/// Errors raised by audit sinks.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to write an audit entry.
    #[error("Failed to write audit entry: {message}")]
    WriteFailed {
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failed to query audit entries.
    #[error("Failed to query audit entries: {message}")]
    QueryFailed {
        /// Error message.
        message: String,
    },

    /// Query not supported by this sink.
    #[error("Query not supported by this sink: {sink}")]
    QueryNotSupported {
        /// The sink that does not support queries.
        sink: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },
}

impl AuditError {
    /// Creates a write failed error.
    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a write failed error with source.
    pub fn write_failed_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WriteFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a query failed error.
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed {
            message: message.into(),
        }
    }

    /// Creates a query not supported error.
    pub fn query_not_supported(sink: impl Into<String>) -> Self {
        Self::QueryNotSupported { sink: sink.into() }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuditError::WriteFailed { .. } | AuditError::Io(_))
    }

    /// Returns the error type for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            AuditError::WriteFailed { .. } => "write_failed",
            AuditError::QueryFailed { .. } => "query_failed",
            AuditError::QueryNotSupported { .. } => "query_not_supported",
            AuditError::Io(_) => "io_error",
            AuditError::Serialization { .. } => "serialization_error",
        }
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = AuditError::write_failed("disk full");
        assert!(err.is_retryable());
        assert_eq!(err.error_type(), "write_failed");

        let err = AuditError::query_not_supported("text");
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Query not supported by this sink: text");
    }
}
