// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded metadata database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `statements`: statement_id → serialized StatementRecord
//! - `download_tokens`: token nonce → serialized DownloadToken
//!
//! redb serializes write transactions and holds an exclusive file lock, so a
//! read-check-write inside one write transaction is a true compare-and-swap.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::stores::{StatementLookup, TokenStore};
use crate::models::{DownloadToken, StatementRecord};

// =============================================================================
// Table Definitions
// =============================================================================

/// statement_id → StatementRecord (JSON bytes).
const STATEMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("statements");

/// token nonce → DownloadToken (JSON bytes).
const DOWNLOAD_TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("download_tokens");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// MetadataDatabase
// =============================================================================

/// Statement metadata and download tokens in one redb file.
pub struct MetadataDatabase {
    db: Database,
}

impl MetadataDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(STATEMENTS)?;
            let _ = write_txn.open_table(DOWNLOAD_TOKENS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Insert a new statement record.
    pub fn insert_statement(&self, record: &StatementRecord) -> DbResult<()> {
        let json = serde_json::to_vec(record)?;

        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(STATEMENTS)?;
            let exists = table.get(record.id.as_str())?.is_some();
            if !exists {
                table.insert(record.id.as_str(), json.as_slice())?;
            }
            !exists
        };

        if !inserted {
            write_txn.abort()?;
            return Err(DbError::AlreadyExists(format!("Statement {}", record.id)));
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a statement by ID.
    pub fn get_statement(&self, id: &str) -> DbResult<Option<StatementRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(STATEMENTS)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Download Tokens
    // =========================================================================

    /// Insert a new download token.
    pub fn insert_download_token(&self, token: &DownloadToken) -> DbResult<()> {
        let json = serde_json::to_vec(token)?;

        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(DOWNLOAD_TOKENS)?;
            let exists = table.get(token.token.as_str())?.is_some();
            if !exists {
                table.insert(token.token.as_str(), json.as_slice())?;
            }
            !exists
        };

        if !inserted {
            write_txn.abort()?;
            return Err(DbError::AlreadyExists(format!("Download token {}", token.id)));
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a download token by nonce.
    pub fn get_download_token(&self, token: &str) -> DbResult<Option<DownloadToken>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DOWNLOAD_TOKENS)?;
        match table.get(token)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Conditional update: flip `used` to `true` only if it is `false`.
    pub fn consume_download_token(&self, token: &str, used_at: DateTime<Utc>) -> DbResult<bool> {
        let write_txn = self.db.begin_write()?;
        let flipped = {
            let mut table = write_txn.open_table(DOWNLOAD_TOKENS)?;

            // Read existing value and deserialize before mutating
            let existing_bytes = table.get(token)?.map(|existing| existing.value().to_vec());

            match existing_bytes {
                Some(bytes) => {
                    let mut record: DownloadToken = serde_json::from_slice(&bytes)?;
                    if record.used {
                        false
                    } else {
                        record.used = true;
                        record.used_at = Some(used_at);
                        let json = serde_json::to_vec(&record)?;
                        table.insert(token, json.as_slice())?;
                        true
                    }
                }
                None => false,
            }
        };

        if flipped {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(flipped)
    }
}

impl StatementLookup for MetadataDatabase {
    fn find_statement(&self, id: &str) -> DbResult<Option<StatementRecord>> {
        self.get_statement(id)
    }
}

impl TokenStore for MetadataDatabase {
    fn insert_token(&self, token: &DownloadToken) -> DbResult<()> {
        self.insert_download_token(token)
    }

    fn find_token(&self, token: &str) -> DbResult<Option<DownloadToken>> {
        self.get_download_token(token)
    }

    fn mark_used_if_unused(&self, token: &str, used_at: DateTime<Utc>) -> DbResult<bool> {
        self.consume_download_token(token, used_at)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn temp_db() -> (MetadataDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = MetadataDatabase::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn sample_statement(id: &str) -> StatementRecord {
        StatementRecord {
            id: id.to_string(),
            account_ref: "acct-1".to_string(),
            statement_date: NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
            file_path: PathBuf::from(format!("/data/statements/ab/abcd/{id}.pdf.enc")),
            size_bytes: 1024,
            content_hash: "00".repeat(32),
            encrypted: true,
            created_at: Utc::now(),
        }
    }

    fn sample_token(nonce: &str) -> DownloadToken {
        let now = Utc::now();
        DownloadToken {
            id: uuid::Uuid::new_v4().to_string(),
            statement_id: "stmt-1".to_string(),
            token: nonce.to_string(),
            created_at: now,
            expires_at: now + Duration::minutes(5),
            used: false,
            used_at: None,
        }
    }

    #[test]
    fn insert_and_get_statement() {
        let (db, _dir) = temp_db();
        let record = sample_statement("stmt-1");
        db.insert_statement(&record).unwrap();

        assert_eq!(db.get_statement("stmt-1").unwrap(), Some(record));
        assert_eq!(db.find_statement("missing").unwrap(), None);
    }

    #[test]
    fn duplicate_statement_rejected() {
        let (db, _dir) = temp_db();
        db.insert_statement(&sample_statement("stmt-1")).unwrap();
        let result = db.insert_statement(&sample_statement("stmt-1"));
        assert!(matches!(result, Err(DbError::AlreadyExists(_))));
    }

    #[test]
    fn insert_and_find_token() {
        let (db, _dir) = temp_db();
        let token = sample_token("nonce-a");
        db.insert_token(&token).unwrap();

        assert_eq!(db.find_token("nonce-a").unwrap(), Some(token));
        assert_eq!(db.find_token("nonce-b").unwrap(), None);
        assert!(matches!(
            db.insert_token(&sample_token("nonce-a")),
            Err(DbError::AlreadyExists(_))
        ));
    }

    #[test]
    fn consume_flips_once() {
        let (db, _dir) = temp_db();
        db.insert_token(&sample_token("nonce-a")).unwrap();
        let at = Utc::now();

        assert!(db.mark_used_if_unused("nonce-a", at).unwrap());
        assert!(!db.mark_used_if_unused("nonce-a", at).unwrap());

        let stored = db.find_token("nonce-a").unwrap().unwrap();
        assert!(stored.used);
        assert_eq!(stored.used_at, Some(at));
    }

    #[test]
    fn consume_unknown_token_is_noop() {
        let (db, _dir) = temp_db();
        assert!(!db.mark_used_if_unused("ghost", Utc::now()).unwrap());
    }

    #[test]
    fn concurrent_consume_has_single_winner() {
        let (db, _dir) = temp_db();
        db.insert_token(&sample_token("nonce-race")).unwrap();
        let db = Arc::new(db);

        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let db = db.clone();
                    scope.spawn(move || db.mark_used_if_unused("nonce-race", Utc::now()).unwrap())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap() as usize)
                .sum()
        });

        assert_eq!(winners, 1);
    }

    #[test]
    fn reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.redb");
        {
            let db = MetadataDatabase::open(&path).unwrap();
            db.insert_statement(&sample_statement("stmt-keep")).unwrap();
            db.insert_token(&sample_token("nonce-keep")).unwrap();
            db.mark_used_if_unused("nonce-keep", Utc::now()).unwrap();
        }
        let db = MetadataDatabase::open(&path).unwrap();
        assert!(db.get_statement("stmt-keep").unwrap().is_some());
        assert!(db.get_download_token("nonce-keep").unwrap().unwrap().used);
    }
}
