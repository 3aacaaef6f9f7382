// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Everything the pipeline persists lives under one data directory.
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   metadata.redb                       # statements + download tokens
//!   statements/{hh}/{account_hash}/
//!     {statement_id}.pdf.enc            # [iv][ciphertext][tag]
//!   audit/
//!     {date}/events.jsonl               # Daily audit logs
//! ```
//!
//! Statement files are encrypted by the application (see `crypto`); account
//! references appear on disk only as SHA-256 hashes.

pub mod audit;
pub mod data_store;
pub mod metadata_db;
pub mod paths;
pub mod stores;

pub use audit::{AuditAction, AuditEntry, AuditRepository, AuditSink};
pub use data_store::{DataStore, StorageError, StorageResult};
pub use metadata_db::{DbError, DbResult, MetadataDatabase};
pub use paths::StoragePaths;
pub use stores::{StatementLookup, TokenStore};
