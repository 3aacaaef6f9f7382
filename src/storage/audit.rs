// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit entries and their append-only JSONL store.
//!
//! Every download attempt, link issuance, and upload produces one
//! [`AuditEntry`]. Entries are immutable once written; this module never
//! updates or deletes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::{DataStore, StorageError, StorageResult};

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    DownloadSuccess,
    DownloadFailed,
    LinkIssued,
    StatementUploaded,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    /// Unique entry ID.
    pub id: String,
    pub action: AuditAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_ref: Option<String>,
    /// Download token record ID (never the token itself).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    /// Who triggered the event.
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    /// Context: client IP, user agent, outcome, failure reason.
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl AuditEntry {
    /// Create a new audit entry.
    pub fn new(action: AuditAction, actor: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action,
            statement_id: None,
            account_ref: None,
            token_id: None,
            actor: actor.into(),
            timestamp: Utc::now(),
            details: Map::new(),
        }
    }

    pub fn with_statement(mut self, statement_id: impl Into<String>) -> Self {
        self.statement_id = Some(statement_id.into());
        self
    }

    pub fn with_account(mut self, account_ref: impl Into<String>) -> Self {
        self.account_ref = Some(account_ref.into());
        self
    }

    pub fn with_token(mut self, token_id: impl Into<String>) -> Self {
        self.token_id = Some(token_id.into());
        self
    }

    /// Add one detail field.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> StorageResult<()>;

    /// Every stored entry, oldest day first.
    fn list_all(&self) -> StorageResult<Vec<AuditEntry>>;
}

/// JSONL audit store: one `events.jsonl` per UTC day.
pub struct AuditRepository {
    storage: DataStore,
}

impl AuditRepository {
    /// Create a new audit repository.
    pub fn new(storage: DataStore) -> Self {
        Self { storage }
    }

    /// Append an entry to its day's log.
    pub fn log(&self, entry: &AuditEntry) -> StorageResult<()> {
        let date = entry.timestamp.format("%Y-%m-%d").to_string();
        let path = self.storage.paths().audit_events_file(&date);

        let line = serde_json::to_vec(entry)?;
        self.storage.append_line(&path, &line)
    }

    /// Read audit entries for a specific date (`YYYY-MM-DD`).
    ///
    /// Lines that do not parse, such as one torn by a crash mid-append, are
    /// skipped with a warning.
    pub fn read_events(&self, date: &str) -> StorageResult<Vec<AuditEntry>> {
        let path = self.storage.paths().audit_events_file(date);
        let content = self.storage.read_raw(&path)?;

        let mut entries = Vec::new();
        for (index, line) in String::from_utf8_lossy(&content).lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    file = %path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping unreadable audit line"
                ),
            }
        }

        Ok(entries)
    }
}

impl AuditSink for AuditRepository {
    fn append(&self, entry: &AuditEntry) -> StorageResult<()> {
        self.log(entry)
    }

    fn list_all(&self) -> StorageResult<Vec<AuditEntry>> {
        let mut all = Vec::new();
        for date in self.storage.list_dirs(self.storage.paths().audit_dir())? {
            match self.read_events(&date) {
                Ok(entries) => all.extend(entries),
                Err(StorageError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(all)
    }
}
