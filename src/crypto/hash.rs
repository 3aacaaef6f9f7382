// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SHA-256 helpers for content integrity and storage sharding.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of raw content.
pub fn compute_content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex SHA-256 of an identifier, after trimming surrounding whitespace.
///
/// Used to shard storage paths without writing raw account identifiers to
/// disk. `" acct-1 "` and `"acct-1"` hash identically.
pub fn compute_identifier_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.trim().as_bytes()))
}
