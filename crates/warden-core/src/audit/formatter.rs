// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Line formatters for the text audit sink.

use super::error::AuditResult;
use super::types::AuditEntry;

/// Renders an audit entry as a single line.
pub trait AuditFormatter: Send + Sync {
    /// Formats one entry without a trailing newline.
    fn format(&self, entry: &AuditEntry) -> AuditResult<String>;

    /// Returns the formatter name.
    fn name(&self) -> &'static str;

    /// Returns the conventional file extension.
    fn file_extension(&self) -> &'static str;
}

impl std::fmt::Debug for dyn AuditFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditFormatter")
            .field("name", &self.name())
            .finish()
    }
}

// =============================================================================
// JSON Lines Formatter
// =============================================================================

/// One JSON object per line.
#[derive(Debug, Clone, Default)]
pub struct JsonLinesFormatter;

impl JsonLinesFormatter {
    /// Creates a new JSON lines formatter.
    pub fn new() -> Self {
        Self
    }
}

impl AuditFormatter for JsonLinesFormatter {
    fn format(&self, entry: &AuditEntry) -> AuditResult<String> {
        Ok(serde_json::to_string(entry)?)
    }

    fn name(&self) -> &'static str {
        "json_lines"
    }

    fn file_extension(&self) -> &'static str {
        "jsonl"
    }
}

// =============================================================================
// Text Formatter
// =============================================================================

/// Human-readable `key=value` formatter.
///
/// ```text
/// 2025-01-04 12:00:00.000 [lobby] [temp_permission_add] actor=CONSOLE principal=6f1c... detail="essentials.fly until ..."
/// ```
#[derive(Debug, Clone)]
pub struct TextFormatter {
    timestamp_format: String,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            timestamp_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
        }
    }
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timestamp format.
    pub fn timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }
}

impl AuditFormatter for TextFormatter {
    fn format(&self, entry: &AuditEntry) -> AuditResult<String> {
        let mut parts = vec![
            entry.timestamp.format(&self.timestamp_format).to_string(),
            format!("[{}]", entry.origin),
            format!("[{}]", entry.action),
            format!("actor={}", entry.actor_name),
        ];

        if let Some(principal) = &entry.target_principal {
            parts.push(format!("principal={}", principal));
        }
        if let Some(external_id) = &entry.target_external_id {
            parts.push(format!("external={}", external_id));
        }
        if let Some(rank) = &entry.target_rank {
            parts.push(format!("rank={}", rank));
        }
        if !entry.detail.is_empty() {
            parts.push(format!("detail={:?}", entry.detail));
        }

        Ok(parts.join(" "))
    }

    fn name(&self) -> &'static str {
        "text"
    }

    fn file_extension(&self) -> &'static str {
        "log"
    }
}
