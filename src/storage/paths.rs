// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the data directory layout.

use std::path::{Path, PathBuf};

/// Default base directory for all persistent data.
pub const DATA_ROOT: &str = "/data";

/// Storage path utilities for the data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Statement Paths ==========

    /// Directory containing all encrypted statements.
    pub fn statements_dir(&self) -> PathBuf {
        self.root.join("statements")
    }

    /// Shard directory for one account, keyed by its identifier hash.
    ///
    /// The first two hex characters fan out the tree so no directory grows
    /// unbounded.
    pub fn account_dir(&self, account_hash: &str) -> PathBuf {
        let shard = account_hash.get(..2).unwrap_or(account_hash);
        self.statements_dir().join(shard).join(account_hash)
    }

    /// Path to an encrypted statement file.
    pub fn statement_file(&self, account_hash: &str, statement_id: &str) -> PathBuf {
        self.account_dir(account_hash)
            .join(format!("{statement_id}.pdf.enc"))
    }

    // ========== Metadata ==========

    /// Embedded metadata database (statements + download tokens).
    pub fn metadata_db(&self) -> PathBuf {
        self.root.join("metadata.redb")
    }

    // ========== Audit Log Paths ==========

    /// Directory containing audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Directory for a specific date's audit logs.
    pub fn audit_date_dir(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date)
    }

    /// Path to a daily audit events file (JSONL format).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_date_dir(date).join("events.jsonl")
    }
}
