// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Statement Vault - Secure Statement Download Service
//!
//! Delivers PDF statements through signed, time-limited, single-use links.
//! Files stay AES-256-GCM encrypted at rest and every access attempt leaves
//! an audit entry.
//!
//! ## Modules
//!
//! - `crypto` - Envelope encryption, decrypting streams, hashes
//! - `links` - Signed link issuance and atomic consumption
//! - `download` - Download pipeline (outcome state machine)
//! - `recorder` - Asynchronous audit recorder
//! - `upload` - Statement ingestion
//! - `storage` - Data directory, metadata database, audit log
//! - `api` - HTTP API handlers (Axum)

pub mod api;
pub mod config;
pub mod crypto;
pub mod download;
pub mod error;
pub mod links;
pub mod models;
pub mod recorder;
pub mod state;
pub mod storage;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;
