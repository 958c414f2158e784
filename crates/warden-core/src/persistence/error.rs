// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Persistence error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by persistence backends.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Reading a document failed.
    #[error("Failed to read {}: {message}", path.display())]
    ReadFailed {
        /// Document path.
        path: PathBuf,
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<std::io::Error>,
    },

    /// Writing a document failed.
    #[error("Failed to write {}: {message}", path.display())]
    WriteFailed {
        /// Document path.
        path: PathBuf,
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<std::io::Error>,
    },

    /// A stored document could not be decoded.
    #[error("Corrupt document {}: {message}", path.display())]
    Corrupt {
        /// Document path.
        path: PathBuf,
        /// Decoder message.
        message: String,
    },

    /// A value could not be encoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    /// The backend cannot be reached at all.
    #[error("Backend '{backend}' unavailable: {message}")]
    Unavailable {
        /// Backend name.
        backend: String,
        /// Error message.
        message: String,
    },
}

impl PersistenceError {
    /// Creates a read failed error.
    pub fn read_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ReadFailed {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a read failed error with source.
    pub fn read_failed_with(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::ReadFailed {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a write failed error with source.
    pub fn write_failed_with(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::WriteFailed {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a corrupt document error.
    pub fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a backend unavailable error.
    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if retrying may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PersistenceError::ReadFailed { .. }
                | PersistenceError::WriteFailed { .. }
                | PersistenceError::Unavailable { .. }
        )
    }

    /// Returns the error type for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            PersistenceError::ReadFailed { .. } => "read_failed",
            PersistenceError::WriteFailed { .. } => "write_failed",
            PersistenceError::Corrupt { .. } => "corrupt",
            PersistenceError::Serialization { .. } => "serialization_error",
            PersistenceError::Unavailable { .. } => "unavailable",
        }
    }
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;
