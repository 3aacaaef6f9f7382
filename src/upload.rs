// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Statement ingestion: encrypt an uploaded PDF and register its record.
//!
//! Content validation (format sniffing, virus scanning) happens before this
//! point, in the admin layer.

use std::io::Read;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use zeroize::Zeroizing;

use crate::crypto::{compute_content_hash, compute_identifier_hash, CryptoEngine, CryptoFailure};
use crate::models::StatementRecord;
use crate::recorder::AuditRecorder;
use crate::storage::{AuditAction, AuditEntry, DataStore, DbError, MetadataDatabase};

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("account reference must not be empty")]
    EmptyAccountRef,

    #[error("failed to read upload: {0}")]
    Read(#[from] std::io::Error),

    #[error("encryption failed: {0}")]
    Crypto(#[from] CryptoFailure),

    #[error("metadata store error: {0}")]
    Store(#[from] DbError),
}

/// Encrypts statements into the data directory.
pub struct StatementUploader {
    storage: DataStore,
    db: Arc<MetadataDatabase>,
    crypto: Arc<CryptoEngine>,
    audit: AuditRecorder,
}

impl StatementUploader {
    pub fn new(
        storage: DataStore,
        db: Arc<MetadataDatabase>,
        crypto: Arc<CryptoEngine>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            storage,
            db,
            crypto,
            audit,
        }
    }

    /// Encrypt `pdf` under a fresh IV and persist its [`StatementRecord`].
    ///
    /// The file lands at `statements/<hh>/<account_hash>/<id>.pdf.enc`. If the
    /// record cannot be stored the encrypted file is removed again.
    pub fn upload(
        &self,
        account_ref: &str,
        statement_date: NaiveDate,
        mut pdf: impl Read,
        actor: &str,
    ) -> Result<StatementRecord, UploadError> {
        let account_ref = account_ref.trim();
        if account_ref.is_empty() {
            return Err(UploadError::EmptyAccountRef);
        }

        let mut bytes = Zeroizing::new(Vec::new());
        pdf.read_to_end(&mut bytes)?;
        let content_hash = compute_content_hash(&bytes);

        let id = uuid::Uuid::new_v4().to_string();
        let account_hash = compute_identifier_hash(account_ref);
        let file_path = self.storage.paths().statement_file(&account_hash, &id);

        let iv = self.crypto.generate_iv()?;
        let size_bytes = self.crypto.encrypt_to_file(bytes.as_slice(), &file_path, &iv)?;

        let record = StatementRecord {
            id,
            account_ref: account_ref.to_string(),
            statement_date,
            file_path,
            size_bytes,
            content_hash,
            encrypted: true,
            created_at: Utc::now(),
        };

        if let Err(e) = self.db.insert_statement(&record) {
            if let Err(cleanup) = std::fs::remove_file(&record.file_path) {
                tracing::warn!(
                    statement_id = %record.id,
                    error = %cleanup,
                    "Failed to remove orphaned statement file"
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            statement_id = %record.id,
            size_bytes = record.size_bytes,
            "Statement uploaded"
        );

        self.audit.record(
            AuditEntry::new(AuditAction::StatementUploaded, actor)
                .with_statement(&record.id)
                .with_account(&record.account_ref)
                .with_detail("size_bytes", record.size_bytes)
                .with_detail("statement_date", record.statement_date.to_string()),
        );

        Ok(record)
    }
}
