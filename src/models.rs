// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Domain Records
//!
//! Persisted records shared by the download pipeline. Both are owned by their
//! stores; the pipeline only holds transient copies for one request.
//!
//! - [`StatementRecord`]: metadata for one encrypted statement file
//! - [`DownloadToken`]: a single-use, time-bounded download grant

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Statements
// =============================================================================

/// Metadata for an encrypted statement on disk.
///
/// Any record the download pipeline serves must have `encrypted == true`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatementRecord {
    /// Opaque unique identifier (UUID).
    pub id: String,
    /// Account the statement belongs to.
    pub account_ref: String,
    /// Statement period date.
    pub statement_date: NaiveDate,
    /// Location of the `[iv][ciphertext][tag]` file.
    pub file_path: PathBuf,
    /// Plaintext size in bytes.
    pub size_bytes: u64,
    /// Hex SHA-256 of the plaintext.
    pub content_hash: String,
    /// Whether the file on disk is encrypted.
    pub encrypted: bool,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl StatementRecord {
    /// Suggested download file name, e.g. `statement-2026-09-30.pdf`.
    pub fn download_file_name(&self) -> String {
        format!("statement-{}.pdf", self.statement_date.format("%Y-%m-%d"))
    }
}

// =============================================================================
// Download Tokens
// =============================================================================

/// A persisted download grant.
///
/// `expires_at` and `statement_id` never change after creation. `used` flips
/// from `false` to `true` exactly once, through the token store's conditional
/// update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadToken {
    /// Record identifier (UUID), referenced by audit entries.
    pub id: String,
    /// Statement this token grants access to.
    pub statement_id: String,
    /// Random nonce (base64url); the store key.
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
}

impl DownloadToken {
    /// Whether the token is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
