// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Collaborator interfaces for statement metadata and download tokens.
//!
//! [`MetadataDatabase`](super::MetadataDatabase) implements both; other
//! backends (e.g. a shared SQL store for multi-instance deployments) plug in
//! here.

use chrono::{DateTime, Utc};

use super::DbResult;
use crate::models::{DownloadToken, StatementRecord};

/// Read-only statement metadata lookup.
pub trait StatementLookup: Send + Sync {
    fn find_statement(&self, id: &str) -> DbResult<Option<StatementRecord>>;
}

/// Persistence for download tokens.
pub trait TokenStore: Send + Sync {
    /// Persist a new token. Fails if the nonce already exists.
    fn insert_token(&self, token: &DownloadToken) -> DbResult<()>;

    fn find_token(&self, token: &str) -> DbResult<Option<DownloadToken>>;

    /// Set `used = true` only if it is currently `false`, in one atomic step.
    ///
    /// Returns `true` when this call performed the transition. Exactly one of
    /// any number of concurrent callers (across processes sharing the store)
    /// may observe `true` for a given token.
    fn mark_used_if_unused(&self, token: &str, used_at: DateTime<Utc>) -> DbResult<bool>;
}
