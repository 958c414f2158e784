// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Append-only text audit sink.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::error::{AuditError, AuditResult};
use super::formatter::{AuditFormatter, TextFormatter};
use super::types::{AuditEntry, AuditFilter};
use super::AuditSink;

/// Writes one formatted line per entry to a file.
///
/// The file is never rewritten, so pruning is a no-op and queries are not
/// supported.
///
/// # Example
///
/// ```rust,ignore
/// use warden_core::audit::{JsonLinesFormatter, TextAuditSink};
///
/// let sink = TextAuditSink::open("logs/audit.log")?;
/// let json = TextAuditSink::with_formatter("logs/audit.jsonl", JsonLinesFormatter::new())?;
/// ```
pub struct TextAuditSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    formatter: Box<dyn AuditFormatter>,
    lines_written: AtomicU64,
}

impl std::fmt::Debug for TextAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextAuditSink")
            .field("path", &self.path)
            .field("formatter", &self.formatter.name())
            .field("lines_written", &self.lines_written())
            .finish()
    }
}

impl TextAuditSink {
    /// Opens `path` for appending with the human-readable formatter.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        Self::with_formatter(path, TextFormatter::new())
    }

    /// Opens `path` for appending with a custom formatter.
    pub fn with_formatter(
        path: impl AsRef<Path>,
        formatter: impl AuditFormatter + 'static,
    ) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = Self::open_file(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            formatter: Box::new(formatter),
            lines_written: AtomicU64::new(0),
        })
    }

    fn open_file(path: &Path) -> AuditResult<File> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AuditError::write_failed_with(format!("Failed to open {}", path.display()), e))
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of lines written since opening.
    pub fn lines_written(&self) -> u64 {
        self.lines_written.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AuditSink for TextAuditSink {
    async fn append(&self, entry: AuditEntry) -> AuditResult<()> {
        let line = self.formatter.format(&entry)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        self.lines_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn query(&self, _filter: AuditFilter) -> AuditResult<Vec<AuditEntry>> {
        Err(AuditError::query_not_supported(self.name()))
    }

    async fn prune(&self, _max_entries: usize) -> AuditResult<usize> {
        Ok(0)
    }

    async fn prune_before(&self, _cutoff: DateTime<Utc>) -> AuditResult<usize> {
        Ok(0)
    }

    async fn flush(&self) -> AuditResult<()> {
        self.writer.lock().flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "text"
    }

    async fn health_check(&self) -> bool {
        self.path.exists()
    }
}

impl Drop for TextAuditSink {
    fn drop(&mut self) {
        if let Err(e) = self.writer.get_mut().flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to flush audit file on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::formatter::JsonLinesFormatter;
    use crate::audit::types::AuditAction;
    use crate::types::Actor;

    #[tokio::test]
    async fn test_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.log");
        let sink = TextAuditSink::open(&path).unwrap();

        for action in [AuditAction::RankCreate, AuditAction::RankDelete] {
            sink.append(
                AuditEntry::builder(action)
                    .actor(&Actor::console())
                    .origin("lobby")
                    .build(),
            )
            .await
            .unwrap();
        }
        sink.flush().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[rank_create]"));
        assert!(lines[1].contains("[rank_delete]"));
        assert_eq!(sink.lines_written(), 2);
        assert!(sink.health_check().await);
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        for _ in 0..2 {
            let sink = TextAuditSink::with_formatter(&path, JsonLinesFormatter::new()).unwrap();
            sink.append(AuditEntry::builder(AuditAction::RoleSync).build())
                .await
                .unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_query_not_supported() {
        let dir = tempfile::tempdir().unwrap();
        let sink = TextAuditSink::open(dir.path().join("audit.log")).unwrap();
        let err = sink.query(AuditFilter::new()).await.unwrap_err();
        assert_eq!(err.error_type(), "query_not_supported");
        assert!(!sink.supports_query());
    }
}
