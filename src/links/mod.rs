// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Signed Download Links
//!
//! Issues unguessable, time-bounded, single-use download tokens and
//! validates/consumes them.
//!
//! ## Link Format
//!
//! ```text
//! <statement_id>.<nonce>.<signature>        ?expires=<unix seconds>
//! ```
//!
//! - `nonce`: 32 CSPRNG bytes, base64url (unpadded); the token-store key
//! - `signature`: HMAC-SHA256 over the length-prefixed fields `v1`, statement id, nonce, expires
//!
//! The stored `expires_at` is authoritative. The `expires` hint only feeds
//! the signature check and is never used for the access decision.
//!
//! ## Consumption
//!
//! The `used` flag flips through the store's conditional update
//! ([`TokenStore::mark_used_if_unused`]), so racing validators (in one
//! process or many) see exactly one [`ValidationResult::Valid`].

mod signature;

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::models::DownloadToken;
use crate::storage::{DbError, TokenStore};

use signature::{parse_presented, sign};

/// Random bytes per link nonce.
const NONCE_LEN: usize = 32;

/// Minimum signing secret length (256 bits).
pub const MIN_SECRET_LEN: usize = 32;

// =============================================================================
// Types
// =============================================================================

/// Server-side HMAC secret. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    /// `None` if shorter than [`MIN_SECRET_LEN`].
    pub fn new(bytes: Vec<u8>) -> Option<Self> {
        (bytes.len() >= MIN_SECRET_LEN).then_some(Self(bytes))
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// A freshly issued link.
#[derive(Debug, Clone)]
pub struct IssuedLink {
    /// URL-embeddable token (`<statement_id>.<nonce>.<signature>`).
    pub token: String,
    /// Expiry hint to embed next to the token.
    pub expires: i64,
    /// The persisted record.
    pub record: DownloadToken,
}

impl IssuedLink {
    /// Relative download path for the transport layer.
    pub fn download_path(&self) -> String {
        format!(
            "/v1/statements/download/{}?expires={}",
            self.token, self.expires
        )
    }
}

/// Outcome of [`LinkIssuer::validate_and_consume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// First successful use; the token is now consumed.
    Valid(DownloadToken),
    Expired(DownloadToken),
    Used(DownloadToken),
    /// Malformed, forged, or unknown.
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("link TTL must be positive and within the clock range")]
    InvalidTtl,

    #[error("random source failed")]
    Random,

    #[error("signing key rejected: {0}")]
    SigningKey(#[from] hmac::digest::InvalidLength),

    #[error("token store error: {0}")]
    Store(#[from] DbError),
}

// =============================================================================
// Issuer
// =============================================================================

/// Issues and consumes download tokens.
pub struct LinkIssuer {
    store: Arc<dyn TokenStore>,
    secret: SigningSecret,
    default_ttl: Duration,
    rng: SystemRandom,
}

impl LinkIssuer {
    pub fn new(store: Arc<dyn TokenStore>, secret: SigningSecret, default_ttl: Duration) -> Self {
        Self {
            store,
            secret,
            default_ttl,
            rng: SystemRandom::new(),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a link for `statement_id` with the configured TTL.
    pub fn issue_default(&self, statement_id: &str) -> Result<IssuedLink, LinkError> {
        self.issue(statement_id, self.default_ttl)
    }

    /// Issue a link for `statement_id` valid for `ttl`.
    pub fn issue(&self, statement_id: &str, ttl: Duration) -> Result<IssuedLink, LinkError> {
        if ttl <= Duration::zero() {
            return Err(LinkError::InvalidTtl);
        }

        let mut raw = [0u8; NONCE_LEN];
        self.rng.fill(&mut raw).map_err(|_| LinkError::Random)?;
        let nonce = Base64UrlUnpadded::encode_string(&raw);

        let now = Utc::now();
        let expires_at = now.checked_add_signed(ttl).ok_or(LinkError::InvalidTtl)?;
        let record = DownloadToken {
            id: uuid::Uuid::new_v4().to_string(),
            statement_id: statement_id.to_string(),
            token: nonce,
            created_at: now,
            expires_at,
            used: false,
            used_at: None,
        };
        self.store.insert_token(&record)?;

        let expires = record.expires_at.timestamp();
        let signature = sign(&self.secret, statement_id, &record.token, expires)?;

        tracing::debug!(
            token_id = %record.id,
            statement_id = %statement_id,
            expires_at = %record.expires_at,
            "Download link issued"
        );

        Ok(IssuedLink {
            token: format!("{statement_id}.{}.{signature}", record.token),
            expires,
            record,
        })
    }

    /// Validate `presented` against `expiry_hint` and consume it.
    pub fn validate_and_consume(
        &self,
        presented: &str,
        expiry_hint: Option<i64>,
    ) -> Result<ValidationResult, LinkError> {
        self.validate_and_consume_at(presented, expiry_hint, Utc::now())
    }

    /// [`validate_and_consume`](Self::validate_and_consume) against an explicit clock.
    pub fn validate_and_consume_at(
        &self,
        presented: &str,
        expiry_hint: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ValidationResult, LinkError> {
        let Some(expires) = expiry_hint else {
            return Ok(ValidationResult::NotFound);
        };
        let Some(parts) = parse_presented(presented) else {
            return Ok(ValidationResult::NotFound);
        };
        if !parts.verify(&self.secret, expires) {
            tracing::debug!("Download link signature mismatch");
            return Ok(ValidationResult::NotFound);
        }

        let Some(record) = self.store.find_token(parts.nonce)? else {
            return Ok(ValidationResult::NotFound);
        };
        if record.statement_id != parts.statement_id {
            return Ok(ValidationResult::NotFound);
        }

        if record.is_expired_at(now) {
            return Ok(ValidationResult::Expired(record));
        }
        if record.used {
            return Ok(ValidationResult::Used(record));
        }

        if self.store.mark_used_if_unused(&record.token, now)? {
            Ok(ValidationResult::Valid(DownloadToken {
                used: true,
                used_at: Some(now),
                ..record
            }))
        } else {
            // Lost the race to a concurrent validator.
            Ok(ValidationResult::Used(DownloadToken {
                used: true,
                ..record
            }))
        }
    }
}
