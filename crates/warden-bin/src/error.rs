// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors surfaced by the `warden` command and their process exit codes.
//!
//! | Code | Meaning                                   |
//! |------|-------------------------------------------|
//! | 1    | bad or unreadable configuration           |
//! | 2    | storage or audit log could not be opened  |
//! | 3    | failure while the engine was running      |
//! | 4    | filesystem error                          |
//! | 5    | bad command-line argument                 |
//! | 6    | rejected by the permission engine         |

use thiserror::Error;
use warden_config::ConfigError;
use warden_core::{PersistenceError, WardenError};

/// Result of a `warden` subcommand.
pub type BinResult<T> = Result<T, BinError>;

/// Failure of a `warden` subcommand.
#[derive(Debug, Error)]
pub enum BinError {
    /// Configuration is unusable for the requested command.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Storage or the audit log could not be opened.
    #[error("engine failed to start: {0}")]
    Initialization(String),

    /// Failure after startup.
    #[error("engine failure: {0}")]
    Runtime(String),

    /// Bad command-line argument.
    #[error("invalid argument: {0}")]
    Input(String),

    /// Filesystem failure outside storage.
    #[error("filesystem error: {0}")]
    Io(String),

    /// Loading the config file failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The engine refused an operation.
    #[error("permission engine rejected the request: {0}")]
    Core(#[from] WardenError),

    /// Wraps another error with what the command was doing.
    #[error("{context}: {source}")]
    WithContext {
        /// Step that failed.
        context: String,
        /// Wrapped error.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Shorthand for [`BinError::Configuration`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Shorthand for [`BinError::Initialization`].
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    /// Shorthand for [`BinError::Runtime`].
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Shorthand for [`BinError::Input`].
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Prefixes the error with the step that failed.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Process exit code; context wrappers report the wrapped error's code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::WithContext { source, .. } => source.exit_code(),
            Self::Configuration(_) | Self::Config(_) => 1,
            Self::Initialization(_) => 2,
            Self::Runtime(_) => 3,
            Self::Io(_) => 4,
            Self::Input(_) => 5,
            Self::Core(_) => 6,
        }
    }
}

impl From<std::io::Error> for BinError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<PersistenceError> for BinError {
    fn from(err: PersistenceError) -> Self {
        Self::Core(err.into())
    }
}

// =============================================================================
// Reporting
// =============================================================================

/// Prints the error and every underlying cause to stderr.
pub fn report_error(error: &BinError) {
    eprintln!("warden: {}", error);

    let mut cause = std::error::Error::source(error);
    while let Some(err) = cause {
        eprintln!("  because: {}", err);
        cause = err.source();
    }
}

/// Prints the error and terminates with its exit code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            BinError::config("audit.path is empty").to_string(),
            "invalid configuration: audit.path is empty"
        );
        assert_eq!(
            BinError::input("not-a-uuid").to_string(),
            "invalid argument: not-a-uuid"
        );
    }

    #[test]
    fn test_context_keeps_inner_exit_code() {
        let err = BinError::init("storage offline").with_context("Restoring state");
        assert_eq!(
            err.to_string(),
            "Restoring state: engine failed to start: storage offline"
        );
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_codes() {
        let cases = [
            (BinError::config("x"), 1),
            (BinError::runtime("x"), 3),
            (BinError::input("x"), 5),
            (BinError::from(std::io::Error::other("disk")), 4),
            (BinError::from(WardenError::rank_not_found("ghost")), 6),
        ];
        for (err, code) in cases {
            assert_eq!(err.exit_code(), code, "{}", err);
        }
    }
}
