// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors raised while reading, parsing, or validating a WARDEN config file.

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but its content is malformed or has unknown keys.
    #[error("{path}: cannot parse: {message}")]
    Parse {
        /// Offending file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A value parsed but breaks a rule, e.g. an empty server name.
    #[error("{field}: {message}")]
    Validation {
        /// Dotted key, e.g. `audit.max_entries`.
        field: String,
        /// Rule that was broken.
        message: String,
    },

    /// The file exists but could not be read.
    #[error("{path}: cannot read: {source}")]
    Io {
        /// Offending file.
        path: PathBuf,
        /// OS error.
        #[source]
        source: std::io::Error,
    },

    /// Nothing at the given path.
    #[error("{path}: no such config file")]
    FileNotFound {
        /// Requested path.
        path: PathBuf,
    },

    /// A `WARDEN_*` override holds an unusable value.
    #[error("${name}: {message}")]
    InvalidEnvVar {
        /// Full variable name.
        name: String,
        /// Expected shape of the value.
        message: String,
    },

    /// A numeric setting outside its allowed bounds.
    #[error("{field}: {value} is outside {min}..={max}")]
    OutOfRange {
        /// Dotted key.
        field: String,
        /// Value given.
        value: String,
        /// Smallest allowed.
        min: String,
        /// Largest allowed.
        max: String,
    },

    /// The file extension is not yaml, yml, toml, or json.
    #[error("unsupported config format '{format}'")]
    UnsupportedFormat {
        /// The extension as written.
        format: String,
    },

    /// Content without a known path failed to deserialize.
    #[error("cannot deserialize config: {message}")]
    Serialization {
        /// Deserializer message.
        message: String,
    },
}

impl ConfigError {
    /// Content of `path` failed to parse.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// `field` broke a rule.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Reading `path` failed.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Nothing exists at `path`.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Override variable `name` is unusable.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// `value` of `field` is outside `min..=max`.
    pub fn out_of_range<T: std::fmt::Display>(
        field: impl Into<String>,
        value: T,
        min: T,
        max: T,
    ) -> Self {
        Self::OutOfRange {
            field: field.into(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    /// Unknown file extension.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Deserialization failed without a known path.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// The file could not be reached at all.
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::FileNotFound { .. })
    }

    /// The file was read but what it says is wrong.
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. }
                | Self::Validation { .. }
                | Self::OutOfRange { .. }
                | Self::Serialization { .. }
        )
    }

    /// Stable name used as the `error_type` log field.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::Validation { .. } => "validation",
            Self::Io { .. } => "io",
            Self::FileNotFound { .. } => "file_not_found",
            Self::InvalidEnvVar { .. } => "invalid_env_var",
            Self::OutOfRange { .. } => "out_of_range",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::Serialization { .. } => "serialization",
        }
    }
}

/// Result of loading or validating configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;
