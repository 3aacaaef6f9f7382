// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::IpAddr;
use std::sync::Arc;

use crate::download::DownloadService;
use crate::storage::DataStore;

#[derive(Clone)]
pub struct AppState {
    pub storage: DataStore,
    pub downloads: Arc<DownloadService>,
    /// Peers whose `X-Forwarded-For` header is believed.
    pub trusted_proxies: Arc<[IpAddr]>,
}

impl AppState {
    pub fn new(storage: DataStore, downloads: Arc<DownloadService>) -> Self {
        Self {
            storage,
            downloads,
            trusted_proxies: Arc::from([]),
        }
    }

    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = proxies.into();
        self
    }
}
