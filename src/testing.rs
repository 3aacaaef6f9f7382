// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Test fixture: the full download pipeline over a temporary data directory.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::crypto::{CryptoEngine, MasterKey};
use crate::download::{DownloadRequest, DownloadService};
use crate::links::{LinkIssuer, SigningSecret};
use crate::models::StatementRecord;
use crate::recorder::AuditRecorder;
use crate::state::AppState;
use crate::storage::{AuditRepository, DataStore, MetadataDatabase, StoragePaths};
use crate::upload::StatementUploader;

pub(crate) struct TestPipeline {
    pub storage: DataStore,
    pub db: Arc<MetadataDatabase>,
    pub crypto: Arc<CryptoEngine>,
    pub recorder: AuditRecorder,
    pub service: Arc<DownloadService>,
    pub uploader: StatementUploader,
    _shutdown: tokio_util::sync::DropGuard,
    _dir: TempDir,
}

impl TestPipeline {
    /// Must run inside a tokio runtime (the audit worker is spawned).
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut storage = DataStore::new(StoragePaths::new(dir.path()));
        storage.initialize().unwrap();

        let db = Arc::new(MetadataDatabase::open(&storage.paths().metadata_db()).unwrap());
        let crypto = Arc::new(CryptoEngine::new(&MasterKey::new([7u8; 32])));

        let shutdown = CancellationToken::new();
        let (recorder, _worker) = AuditRecorder::spawn(
            Arc::new(AuditRepository::new(storage.clone())),
            shutdown.clone(),
        );

        let links = LinkIssuer::new(
            db.clone(),
            SigningSecret::new(vec![0x5a; 32]).unwrap(),
            Duration::minutes(5),
        );
        let service = Arc::new(DownloadService::new(
            links,
            db.clone(),
            crypto.clone(),
            recorder.clone(),
        ));
        let uploader =
            StatementUploader::new(storage.clone(), db.clone(), crypto.clone(), recorder.clone());

        Self {
            storage,
            db,
            crypto,
            recorder,
            service,
            uploader,
            _shutdown: shutdown.drop_guard(),
            _dir: dir,
        }
    }

    /// Upload `pdf` for a fixed test account.
    pub fn upload(&self, pdf: &[u8]) -> StatementRecord {
        self.uploader
            .upload(
                "ACC-1001",
                NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
                pdf,
                "admin",
            )
            .unwrap()
    }

    pub fn request(&self, token: &str, expires: Option<i64>) -> DownloadRequest {
        DownloadRequest {
            token: token.to_string(),
            expiry_hint: expires,
            client_ip: "203.0.113.7".to_string(),
            user_agent: "test-agent/1.0".to_string(),
            actor: "link-holder".to_string(),
        }
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.storage.clone(), self.service.clone())
    }
}
