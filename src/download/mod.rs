// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Download Pipeline
//!
//! Turns a presented link into either an open decrypted stream or one of a
//! fixed set of rejection outcomes.
//!
//! ```text
//! validate_and_consume ─┬─ NotFound ─────────────────────► STATEMENT_NOT_FOUND
//!                       ├─ Expired / Used ───────────────► LINK_EXPIRED_OR_USED
//!                       └─ Valid ─► lookup statement ─┬─ absent ─► STATEMENT_NOT_FOUND
//!                                                    └─ file? ─┬─ no ─► FILE_MISSING
//!                                                              └─ decrypt ─┬─ err ─► DECRYPTION_FAILED
//!                                                                          └─ ok ──► OK + stream
//! ```
//!
//! Store errors and panics map to `INTERNAL_ERROR`. Every call records
//! exactly one audit entry, whatever the outcome.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::crypto::{CryptoEngine, DecryptedStream};
use crate::links::{IssuedLink, LinkError, LinkIssuer, ValidationResult};
use crate::models::{DownloadToken, StatementRecord};
use crate::recorder::AuditRecorder;
use crate::storage::{AuditAction, AuditEntry, DbError, StatementLookup};

// =============================================================================
// Types
// =============================================================================

/// Terminal outcome of a download attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadOutcome {
    Ok,
    StatementNotFound,
    LinkExpiredOrUsed,
    FileMissing,
    DecryptionFailed,
    InternalError,
}

impl DownloadOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::StatementNotFound => "STATEMENT_NOT_FOUND",
            Self::LinkExpiredOrUsed => "LINK_EXPIRED_OR_USED",
            Self::FileMissing => "FILE_MISSING",
            Self::DecryptionFailed => "DECRYPTION_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for DownloadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One download attempt as presented by the transport.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub token: String,
    pub expiry_hint: Option<i64>,
    pub client_ip: String,
    pub user_agent: String,
    pub actor: String,
}

/// Result of [`DownloadService::validate_and_stream`].
///
/// Only `Ready` carries a stream. The caller owns it from here on.
#[derive(Debug)]
pub enum DownloadResponse {
    Ready {
        statement: StatementRecord,
        stream: DecryptedStream,
    },
    Rejected(DownloadOutcome),
}

impl DownloadResponse {
    pub fn outcome(&self) -> DownloadOutcome {
        match self {
            Self::Ready { .. } => DownloadOutcome::Ok,
            Self::Rejected(outcome) => *outcome,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IssueLinkError {
    #[error("statement not found: {0}")]
    StatementNotFound(String),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("metadata store error: {0}")]
    Store(#[from] DbError),
}

/// What the audit entry for one attempt knows.
#[derive(Default)]
struct AttemptContext {
    statement_id: Option<String>,
    account_ref: Option<String>,
    token_id: Option<String>,
    reason: Option<&'static str>,
}

impl AttemptContext {
    fn reject(&mut self, outcome: DownloadOutcome, reason: &'static str) -> DownloadResponse {
        self.reason = Some(reason);
        DownloadResponse::Rejected(outcome)
    }

    fn note_token(&mut self, token: &DownloadToken) {
        self.token_id = Some(token.id.clone());
        self.statement_id = Some(token.statement_id.clone());
    }
}

// =============================================================================
// Service
// =============================================================================

/// Composes link validation, statement lookup, decryption, and auditing.
pub struct DownloadService {
    links: LinkIssuer,
    statements: Arc<dyn StatementLookup>,
    crypto: Arc<CryptoEngine>,
    audit: AuditRecorder,
}

impl DownloadService {
    pub fn new(
        links: LinkIssuer,
        statements: Arc<dyn StatementLookup>,
        crypto: Arc<CryptoEngine>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            links,
            statements,
            crypto,
            audit,
        }
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    /// Validate `request.token`, consume it, and open the statement.
    ///
    /// Never fails and never panics: every problem becomes a
    /// [`DownloadOutcome`]. Runs blocking I/O; call from a blocking context.
    pub fn validate_and_stream(&self, request: &DownloadRequest) -> DownloadResponse {
        self.validate_and_stream_at(request, Utc::now())
    }

    /// [`validate_and_stream`](Self::validate_and_stream) against an explicit clock.
    pub fn validate_and_stream_at(
        &self,
        request: &DownloadRequest,
        now: DateTime<Utc>,
    ) -> DownloadResponse {
        let mut ctx = AttemptContext::default();

        let resolved =
            panic::catch_unwind(AssertUnwindSafe(|| self.resolve(request, now, &mut ctx)));
        let response = match resolved {
            Ok(response) => response,
            Err(_) => {
                error!("Download pipeline panicked");
                ctx.reject(DownloadOutcome::InternalError, "internal_error")
            }
        };

        self.record_attempt(request, &response, ctx);
        response
    }

    fn resolve(
        &self,
        request: &DownloadRequest,
        now: DateTime<Utc>,
        ctx: &mut AttemptContext,
    ) -> DownloadResponse {
        let validation = match self
            .links
            .validate_and_consume_at(&request.token, request.expiry_hint, now)
        {
            Ok(validation) => validation,
            Err(e) => {
                error!(error = %e, "Link validation failed");
                return ctx.reject(DownloadOutcome::InternalError, "internal_error");
            }
        };

        let token = match validation {
            ValidationResult::Valid(token) => token,
            ValidationResult::NotFound => {
                return ctx.reject(DownloadOutcome::StatementNotFound, "invalid_link");
            }
            ValidationResult::Expired(token) => {
                self.note_rejected_token(ctx, &token);
                return ctx.reject(DownloadOutcome::LinkExpiredOrUsed, "link_expired");
            }
            ValidationResult::Used(token) => {
                self.note_rejected_token(ctx, &token);
                return ctx.reject(DownloadOutcome::LinkExpiredOrUsed, "link_used");
            }
        };
        ctx.note_token(&token);

        let statement = match self.statements.find_statement(&token.statement_id) {
            Ok(Some(statement)) => statement,
            Ok(None) => {
                warn!(statement_id = %token.statement_id, "Consumed link for unknown statement");
                return ctx.reject(DownloadOutcome::StatementNotFound, "statement_not_found");
            }
            Err(e) => {
                error!(statement_id = %token.statement_id, error = %e, "Statement lookup failed");
                return ctx.reject(DownloadOutcome::InternalError, "internal_error");
            }
        };
        ctx.account_ref = Some(statement.account_ref.clone());

        if !statement.encrypted {
            error!(statement_id = %statement.id, "Statement record is not marked encrypted");
            return ctx.reject(DownloadOutcome::InternalError, "statement_not_encrypted");
        }

        if !statement.file_path.is_file() {
            warn!(statement_id = %statement.id, "Statement file missing from storage");
            return ctx.reject(DownloadOutcome::FileMissing, "file_missing");
        }

        match self.crypto.decrypt_file_to_stream(&statement.file_path) {
            Ok(stream) => DownloadResponse::Ready { statement, stream },
            Err(e) => {
                warn!(statement_id = %statement.id, error = %e, "Failed to open statement");
                ctx.reject(DownloadOutcome::DecryptionFailed, "decryption_failed")
            }
        }
    }

    /// Best-effort account context for a rejected token.
    fn note_rejected_token(&self, ctx: &mut AttemptContext, token: &DownloadToken) {
        ctx.note_token(token);
        match self.statements.find_statement(&token.statement_id) {
            Ok(Some(statement)) => ctx.account_ref = Some(statement.account_ref),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Statement lookup for rejected link failed"),
        }
    }

    fn record_attempt(
        &self,
        request: &DownloadRequest,
        response: &DownloadResponse,
        ctx: AttemptContext,
    ) {
        let outcome = response.outcome();
        let action = match outcome {
            DownloadOutcome::Ok => AuditAction::DownloadSuccess,
            _ => AuditAction::DownloadFailed,
        };

        let mut entry = AuditEntry::new(action, request.actor.as_str())
            .with_detail("client_ip", request.client_ip.as_str())
            .with_detail("user_agent", request.user_agent.as_str())
            .with_detail("outcome", outcome.as_str());
        if let Some(reason) = ctx.reason {
            entry = entry.with_detail("reason", reason);
        }
        entry.statement_id = ctx.statement_id;
        entry.account_ref = ctx.account_ref;
        entry.token_id = ctx.token_id;

        self.audit.record(entry);
    }

    /// Issue a link for an existing statement and audit it as `LINK_ISSUED`.
    ///
    /// `ttl` falls back to the configured default.
    pub fn issue_link(
        &self,
        statement_id: &str,
        ttl: Option<Duration>,
        actor: &str,
    ) -> Result<IssuedLink, IssueLinkError> {
        let statement = self
            .statements
            .find_statement(statement_id)?
            .ok_or_else(|| IssueLinkError::StatementNotFound(statement_id.to_string()))?;

        let link = self
            .links
            .issue(statement_id, ttl.unwrap_or_else(|| self.links.default_ttl()))?;

        self.audit.record(
            AuditEntry::new(AuditAction::LinkIssued, actor)
                .with_statement(statement_id)
                .with_account(statement.account_ref)
                .with_token(&link.record.id)
                .with_detail("expires_at", link.record.expires_at.to_rfc3339()),
        );

        Ok(link)
    }
}
