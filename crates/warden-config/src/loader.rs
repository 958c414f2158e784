// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading and processing for WARDEN.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and resolve `${VAR}` / `${VAR:default}` placeholders
//! 2. Parse YAML, TOML, or JSON based on the extension
//! 3. Apply `WARDEN_*` environment overrides
//! 4. Resolve relative paths against the config file's directory
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! WARDEN_SERVER_NAME=lobby-1
//! WARDEN_STORAGE_BACKEND=memory
//! WARDEN_STORAGE_PATH=/var/lib/warden
//! WARDEN_AUDIT_ENABLED=false
//! WARDEN_AUDIT_PATH=/var/log/warden/audit.log
//! WARDEN_AUDIT_MAX_ENTRIES=5000
//! WARDEN_LIMITS_MAX_SECONDARY_RANKS=8
//! WARDEN_SYNC_ENABLED=true
//! WARDEN_SYNC_INTERVAL_SECS=120
//! WARDEN_SWEEP_INTERVAL_SECS=30
//! WARDEN_LOG_LEVEL=debug
//! WARDEN_LOG_FORMAT=json
//! ```

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{LogFormat, LogLevel, StorageBackend, WardenConfig};
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader for WARDEN.
///
/// # Examples
///
/// ```no_run
/// use warden_config::loader::ConfigLoader;
///
/// let loader = ConfigLoader::new();
/// let config = loader.load("warden.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Base directory for resolving relative paths.
    base_path: Option<PathBuf>,

    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve environment variables.
    resolve_env_vars: bool,

    /// Whether to resolve relative paths.
    resolve_paths: bool,
}

impl ConfigLoader {
    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            base_path: None,
            env_prefix: "WARDEN".to_string(),
            resolve_env_vars: true,
            resolve_paths: true,
        }
    }

    /// Creates a builder for configuring the loader.
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder::new()
    }

    /// Sets the base path for resolving relative paths.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Enables or disables relative path resolution.
    pub fn with_path_resolution(mut self, enabled: bool) -> Self {
        self.resolve_paths = enabled;
        self
    }

    /// Loads configuration from a file.
    ///
    /// The format is chosen by extension: `.yaml`/`.yml`, `.toml`, or `.json`.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<WardenConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let base_path = self.base_path.clone().unwrap_or_else(|| {
            path.parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
        });

        let content = self.read_file(path)?;
        let format = ConfigFormat::from_path(path)?;
        let mut config = self.parse_content(&content, format, path)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }
        if self.resolve_paths {
            resolve_relative_paths(&mut config, &base_path);
        }

        config.validate()?;

        debug!(
            server = %config.server.name,
            storage = config.storage.backend.as_str(),
            audit_enabled = config.audit.enabled,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<WardenConfig> {
        let content = if self.resolve_env_vars {
            resolve_env_placeholders(content, |name| env::var(name).ok())
        } else {
            content.to_string()
        };
        let mut config = parse_str(&content, format)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }
        if self.resolve_paths {
            if let Some(base) = &self.base_path {
                resolve_relative_paths(&mut config, base);
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    fn parse_content(
        &self,
        content: &str,
        format: ConfigFormat,
        path: &Path,
    ) -> ConfigResult<WardenConfig> {
        let content = if self.resolve_env_vars {
            resolve_env_placeholders(content, |name| env::var(name).ok())
        } else {
            content.to_string()
        };

        parse_str(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })
    }

    /// Applies `<PREFIX>_*` overrides from the process environment.
    pub fn apply_env_overrides(&self, config: &mut WardenConfig) -> ConfigResult<()> {
        self.apply_overrides_from(config, |name| env::var(name).ok())
    }

    /// Applies `<PREFIX>_*` overrides read through `lookup`.
    pub fn apply_overrides_from<F>(&self, config: &mut WardenConfig, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let name = format!("{}_{}", self.env_prefix, suffix);
            lookup(&name).map(|value| (name, value))
        };

        if let Some((_, value)) = var("SERVER_NAME") {
            config.server.name = value;
        }

        if let Some((name, value)) = var("STORAGE_BACKEND") {
            config.storage.backend = match value.to_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "json_file" | "json" => StorageBackend::JsonFile,
                _ => {
                    return Err(ConfigError::invalid_env_var(
                        name,
                        "expected memory or json_file",
                    ))
                }
            };
        }
        if let Some((_, value)) = var("STORAGE_PATH") {
            config.storage.path = PathBuf::from(value);
        }

        if let Some((_, value)) = var("AUDIT_ENABLED") {
            config.audit.enabled = parse_bool(&value);
        }
        if let Some((_, value)) = var("AUDIT_LOG_TO_FILE") {
            config.audit.log_to_file = parse_bool(&value);
        }
        if let Some((_, value)) = var("AUDIT_PATH") {
            config.audit.path = PathBuf::from(value);
        }
        if let Some((name, value)) = var("AUDIT_MAX_ENTRIES") {
            config.audit.max_entries = parse_number(&name, &value)?;
        }
        if let Some((name, value)) = var("AUDIT_RETENTION_DAYS") {
            config.audit.retention_days = match value.trim() {
                "" | "none" | "off" => None,
                days => Some(parse_number(&name, days)?),
            };
        }

        if let Some((name, value)) = var("LIMITS_MAX_SECONDARY_RANKS") {
            config.limits.max_secondary_ranks = parse_number(&name, &value)?;
        }

        if let Some((_, value)) = var("SYNC_ENABLED") {
            config.sync.enabled = parse_bool(&value);
        }
        if let Some((name, value)) = var("SYNC_INTERVAL_SECS") {
            config.sync.interval_secs = parse_number(&name, &value)?;
        }
        if let Some((name, value)) = var("SWEEP_INTERVAL_SECS") {
            config.sweep.interval_secs = parse_number(&name, &value)?;
        }

        if let Some((name, value)) = var("LOG_LEVEL") {
            match LogLevel::parse(&value) {
                Some(level) => config.logging.level = level,
                None => warn!(variable = %name, value = %value, "Ignoring unknown log level"),
            }
        }
        if let Some((name, value)) = var("LOG_FORMAT") {
            match LogFormat::parse(&value) {
                Some(format) => config.logging.format = format,
                None => warn!(variable = %name, value = %value, "Ignoring unknown log format"),
            }
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigLoaderBuilder
// =============================================================================

/// Builder for ConfigLoader.
#[derive(Debug, Default)]
pub struct ConfigLoaderBuilder {
    base_path: Option<PathBuf>,
    env_prefix: Option<String>,
    resolve_env_vars: Option<bool>,
    resolve_paths: Option<bool>,
}

impl ConfigLoaderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base path.
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Sets the environment prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn resolve_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = Some(enabled);
        self
    }

    /// Enables or disables path resolution.
    pub fn resolve_paths(mut self, enabled: bool) -> Self {
        self.resolve_paths = Some(enabled);
        self
    }

    /// Builds the ConfigLoader.
    pub fn build(self) -> ConfigLoader {
        let mut loader = ConfigLoader::new();
        loader.base_path = self.base_path;
        if let Some(prefix) = self.env_prefix {
            loader.env_prefix = prefix;
        }
        if let Some(resolve_env_vars) = self.resolve_env_vars {
            loader.resolve_env_vars = resolve_env_vars;
        }
        if let Some(resolve_paths) = self.resolve_paths {
            loader.resolve_paths = resolve_paths;
        }
        loader
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_str(content: &str, format: ConfigFormat) -> ConfigResult<WardenConfig> {
    if content.trim().is_empty() {
        return Ok(WardenConfig::default());
    }
    match format {
        ConfigFormat::Yaml => yaml_parse(content),
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
    }
}

/// YAML goes through the `config` crate.
fn yaml_parse<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| ConfigError::serialization(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

/// Replaces `${NAME}` and `${NAME:default}` placeholders.
///
/// An unset variable without a default is left in place and logged.
fn resolve_env_placeholders<F>(content: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            return result;
        };

        let inner = &after[..end];
        let (name, default) = match inner.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (inner, None),
        };
        match (lookup(name), default) {
            (Some(value), _) => result.push_str(&value),
            (None, Some(default)) => result.push_str(default),
            (None, None) => {
                warn!(variable = %name, "Environment variable not found");
                result.push_str(&rest[start..start + 2 + end + 1]);
            }
        }
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    result
}

fn resolve_relative_paths(config: &mut WardenConfig, base_path: &Path) {
    if config.storage.path.is_relative() {
        config.storage.path = base_path.join(&config.storage.path);
    }
    if config.audit.path.is_relative() {
        config.audit.path = base_path.join(&config.audit.path);
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "1" | "yes" | "on" | "enabled"
    )
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid_env_var(name, "expected a non-negative integer"))
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<WardenConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<WardenConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
server:
  name: lobby-1

storage:
  backend: json_file
  path: ./state

audit:
  max_entries: 500
  format: json_lines

limits:
  max_secondary_ranks: 4

sync:
  enabled: true
  interval_secs: 120
"#;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_load_yaml() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        let config = ConfigLoader::new().with_env_vars(false).load(file.path()).unwrap();

        assert_eq!(config.server.name, "lobby-1");
        assert_eq!(config.audit.max_entries, 500);
        assert_eq!(config.limits.max_secondary_ranks, 4);
        assert_eq!(config.sync.interval_secs, 120);
        assert_eq!(config.sweep.interval_secs, 60);

        let base = file.path().parent().unwrap();
        assert_eq!(config.storage.path, base.join("./state"));
        assert!(config.audit.path.starts_with(base));
    }

    #[test]
    fn test_load_toml_and_json() {
        let toml = r#"
[server]
name = "survival"

[audit]
retention_days = 7
"#;
        let config = ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(toml, ConfigFormat::Toml)
            .unwrap();
        assert_eq!(config.server.name, "survival");
        assert_eq!(config.audit.retention_days, Some(7));

        let json = r#"{"sweep": {"interval_secs": 15}}"#;
        let config = ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(json, ConfigFormat::Json)
            .unwrap();
        assert_eq!(config.sweep.interval_secs, 15);
    }

    #[test]
    fn test_empty_content_yields_defaults() {
        let config = ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str("  \n", ConfigFormat::Yaml)
            .unwrap();
        assert_eq!(config, WardenConfig::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(r#"{"audit": {"max_entries": 0}}"#, ConfigFormat::Json);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("warden.yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("warden.TOML")).unwrap(),
            ConfigFormat::Toml
        );
        assert!(ConfigFormat::from_path(Path::new("warden.ini")).is_err());
        assert!(ConfigFormat::from_path(Path::new("warden")).is_err());
    }

    #[test]
    fn test_env_placeholders() {
        let vars = lookup(&[("WARDEN_TEST_NAME", "hub")]);
        assert_eq!(
            resolve_env_placeholders("name: ${WARDEN_TEST_NAME}", &vars),
            "name: hub"
        );
        assert_eq!(
            resolve_env_placeholders("name: ${MISSING:fallback}", &vars),
            "name: fallback"
        );
        assert_eq!(
            resolve_env_placeholders("name: ${MISSING}", &vars),
            "name: ${MISSING}"
        );
        assert_eq!(
            resolve_env_placeholders("name: ${UNCLOSED", &vars),
            "name: ${UNCLOSED"
        );
    }

    #[test]
    fn test_env_overrides() {
        let loader = ConfigLoader::new();
        let mut config = WardenConfig::default();
        loader
            .apply_overrides_from(
                &mut config,
                lookup(&[
                    ("WARDEN_SERVER_NAME", "creative"),
                    ("WARDEN_STORAGE_BACKEND", "memory"),
                    ("WARDEN_AUDIT_RETENTION_DAYS", "none"),
                    ("WARDEN_SYNC_ENABLED", "yes"),
                    ("WARDEN_SWEEP_INTERVAL_SECS", "5"),
                    ("WARDEN_LOG_LEVEL", "debug"),
                    ("WARDEN_LOG_FORMAT", "json"),
                ]),
            )
            .unwrap();

        assert_eq!(config.server.name, "creative");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.audit.retention_days, None);
        assert!(config.sync.enabled);
        assert_eq!(config.sweep.interval_secs, 5);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_env_override_bad_number() {
        let mut config = WardenConfig::default();
        let result = ConfigLoader::new().apply_overrides_from(
            &mut config,
            lookup(&[("WARDEN_AUDIT_MAX_ENTRIES", "lots")]),
        );
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar { .. })));
    }

    #[test]
    fn test_custom_prefix() {
        let loader = ConfigLoader::builder().env_prefix("PERMS").build();
        let mut config = WardenConfig::default();
        loader
            .apply_overrides_from(
                &mut config,
                lookup(&[("PERMS_SERVER_NAME", "x"), ("WARDEN_SERVER_NAME", "y")]),
            )
            .unwrap();
        assert_eq!(config.server.name, "x");
    }

    #[test]
    fn test_file_not_found() {
        let result = ConfigLoader::new().load("/nonexistent/path/warden.yaml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_parse_error_carries_path() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        file.write_all(b"{ not json").unwrap();
        let result = ConfigLoader::new().with_env_vars(false).load(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
