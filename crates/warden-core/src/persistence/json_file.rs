// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! JSON document persistence backend.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/
//! ├── ranks/<rank-key>.json
//! ├── principals/<uuid>.json
//! └── audit.jsonl
//! ```
//!
//! Documents are written to a uniquely named temporary file and renamed into
//! place, so a crash never leaves a half-written rank or profile behind and
//! concurrent saves of one document never share a temporary file.
//!
//! The audit file is append-only. The backend keeps a count of its lines,
//! seeded when the directory is opened, and only reads the file back when a
//! prune actually has something to drop. Lines that fail to parse are kept
//! by every rewrite and count toward the cap like any other line.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Persistence, PersistenceError, PersistenceResult};
use crate::audit::AuditEntry;
use crate::profile::PrincipalProfile;
use crate::rank::Rank;
use crate::types::{PrincipalId, RankName};

const RANKS_DIR: &str = "ranks";
const PRINCIPALS_DIR: &str = "principals";
const AUDIT_FILE: &str = "audit.jsonl";

/// Persistence backend storing JSON documents in a directory.
#[derive(Debug)]
pub struct JsonFilePersistence {
    root: PathBuf,
    /// Non-blank lines in the audit file. Held across every audit file access.
    audit_lines: Mutex<usize>,
}

impl JsonFilePersistence {
    /// Opens (and creates if needed) a storage directory.
    pub async fn open(root: impl AsRef<Path>) -> PersistenceResult<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in [root.join(RANKS_DIR), root.join(PRINCIPALS_DIR)] {
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                PersistenceError::write_failed_with(dir.clone(), "Failed to create directory", e)
            })?;
        }
        let audit_lines = read_audit_lines(&root.join(AUDIT_FILE)).await?.len();
        debug!(root = %root.display(), audit_lines, "Opened JSON storage");
        Ok(Self {
            root,
            audit_lines: Mutex::new(audit_lines),
        })
    }

    /// Returns the storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn rank_path(&self, name: &RankName) -> PathBuf {
        self.root
            .join(RANKS_DIR)
            .join(format!("{}.json", file_stem(name.key())))
    }

    fn principal_path(&self, id: &PrincipalId) -> PathBuf {
        self.root.join(PRINCIPALS_DIR).join(format!("{}.json", id))
    }

    fn audit_path(&self) -> PathBuf {
        self.root.join(AUDIT_FILE)
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> PersistenceResult<Option<T>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PersistenceError::read_failed_with(
                    path,
                    "Failed to read document",
                    e,
                ))
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| PersistenceError::corrupt(path, e.to_string()))
    }

    async fn write_json<T: Serialize>(path: &Path, value: &T) -> PersistenceResult<()> {
        let content = serde_json::to_string_pretty(value)
            .map_err(|e| PersistenceError::serialization(e.to_string()))?;
        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| PersistenceError::write_failed_with(&tmp, "Failed to write document", e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| PersistenceError::write_failed_with(path, "Failed to replace document", e))
    }

    async fn read_all<T: DeserializeOwned>(dir: &Path) -> PersistenceResult<Vec<T>> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| PersistenceError::read_failed_with(dir, "Failed to list directory", e))?;

        let mut documents = Vec::new();
        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|e| PersistenceError::read_failed_with(dir, "Failed to list directory", e))?;
            let Some(entry) = entry else { break };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(document) = Self::read_json(&path).await? {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    /// Parses audit lines, skipping the ones that are not entries.
    fn parse_audit(&self, lines: &[String]) -> Vec<AuditEntry> {
        let mut entries = Vec::with_capacity(lines.len());
        for (line_no, line) in lines.iter().enumerate() {
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    path = %self.audit_path().display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping corrupt audit line"
                ),
            }
        }
        entries
    }

    async fn rewrite_audit(&self, lines: &[String]) -> PersistenceResult<()> {
        let mut content = String::new();
        for line in lines {
            content.push_str(line);
            content.push('\n');
        }
        let path = self.audit_path();
        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| PersistenceError::write_failed_with(&tmp, "Failed to write audit file", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| PersistenceError::write_failed_with(&path, "Failed to replace audit file", e))
    }
}

/// Non-blank lines of a text file; a missing file has none.
async fn read_audit_lines(path: &Path) -> PersistenceResult<Vec<String>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(PersistenceError::read_failed_with(
                path,
                "Failed to read audit file",
                e,
            ))
        }
    };
    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

/// Maps a rank key to a safe file stem.
fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl Persistence for JsonFilePersistence {
    async fn load_rank(&self, name: &RankName) -> PersistenceResult<Option<Rank>> {
        let rank: Option<Rank> = Self::read_json(&self.rank_path(name)).await?;
        // Sanitized stems can collide; the stored name is authoritative.
        Ok(rank.filter(|r| &r.name == name))
    }

    async fn load_all_ranks(&self) -> PersistenceResult<Vec<Rank>> {
        Self::read_all(&self.root.join(RANKS_DIR)).await
    }

    async fn save_rank(&self, rank: &Rank) -> PersistenceResult<()> {
        Self::write_json(&self.rank_path(&rank.name), rank).await
    }

    async fn delete_rank(&self, name: &RankName) -> PersistenceResult<bool> {
        let path = self.rank_path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PersistenceError::write_failed_with(
                path,
                "Failed to delete document",
                e,
            )),
        }
    }

    async fn load_principal(&self, id: &PrincipalId) -> PersistenceResult<Option<PrincipalProfile>> {
        Self::read_json(&self.principal_path(id)).await
    }

    async fn load_all_principals(&self) -> PersistenceResult<Vec<PrincipalProfile>> {
        Self::read_all(&self.root.join(PRINCIPALS_DIR)).await
    }

    async fn save_principal(&self, profile: &PrincipalProfile) -> PersistenceResult<()> {
        Self::write_json(&self.principal_path(&profile.id), profile).await
    }

    async fn append_audit(&self, entry: &AuditEntry) -> PersistenceResult<()> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| PersistenceError::serialization(e.to_string()))?;
        line.push('\n');

        let path = self.audit_path();
        let mut count = self.audit_lines.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| PersistenceError::write_failed_with(&path, "Failed to open audit file", e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| PersistenceError::write_failed_with(&path, "Failed to append audit entry", e))?;
        file.flush()
            .await
            .map_err(|e| PersistenceError::write_failed_with(&path, "Failed to flush audit file", e))?;
        *count += 1;
        Ok(())
    }

    async fn prune_audit(&self, max_entries: usize) -> PersistenceResult<usize> {
        let mut count = self.audit_lines.lock().await;
        if *count <= max_entries {
            return Ok(0);
        }
        let mut lines = read_audit_lines(&self.audit_path()).await?;
        let excess = lines.len().saturating_sub(max_entries);
        if excess > 0 {
            lines.drain(..excess);
            self.rewrite_audit(&lines).await?;
        }
        *count = lines.len();
        Ok(excess)
    }

    async fn prune_audit_before(&self, cutoff: DateTime<Utc>) -> PersistenceResult<usize> {
        let mut count = self.audit_lines.lock().await;
        let mut lines = read_audit_lines(&self.audit_path()).await?;
        let before = lines.len();
        lines.retain(|line| {
            serde_json::from_str::<AuditEntry>(line).map_or(true, |e| e.timestamp >= cutoff)
        });
        let removed = before - lines.len();
        if removed > 0 {
            self.rewrite_audit(&lines).await?;
        }
        *count = lines.len();
        Ok(removed)
    }

    async fn query_audit(
        &self,
        principal: Option<PrincipalId>,
        limit: usize,
    ) -> PersistenceResult<Vec<AuditEntry>> {
        let lines = {
            let _count = self.audit_lines.lock().await;
            read_audit_lines(&self.audit_path()).await?
        };
        Ok(self
            .parse_audit(&lines)
            .into_iter()
            .rev()
            .filter(|e| principal.map_or(true, |p| e.targets(&p)))
            .take(limit)
            .collect())
    }

    fn name(&self) -> &str {
        "json"
    }
}
