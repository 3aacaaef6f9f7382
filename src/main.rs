// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, process::ExitCode, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use statement_vault::{
    api::router,
    config::{AppConfig, LogFormat, DEFAULT_LOG_FILTER},
    crypto::CryptoEngine,
    download::DownloadService,
    links::LinkIssuer,
    recorder::AuditRecorder,
    state::AppState,
    storage::{AuditRepository, DataStore, MetadataDatabase, StoragePaths},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How long in-flight downloads get to finish after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    init_logging(LogFormat::from_env());

    // Secrets are validated before anything touches disk or the network.
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration; refusing to start");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init(),
    }
}

async fn run(config: AppConfig) -> Result<(), BoxError> {
    let mut storage = DataStore::new(StoragePaths::new(&config.data_dir));
    storage.initialize()?;
    info!(data_dir = %config.data_dir.display(), "Data directory ready");

    let db = Arc::new(MetadataDatabase::open(&storage.paths().metadata_db())?);
    let crypto = Arc::new(CryptoEngine::new(&config.master_key));

    let shutdown = CancellationToken::new();
    let (recorder, audit_worker) = AuditRecorder::spawn(
        Arc::new(AuditRepository::new(storage.clone())),
        shutdown.clone(),
    );

    let links = LinkIssuer::new(db.clone(), config.signing_secret, config.link_ttl);
    let downloads = Arc::new(DownloadService::new(links, db, crypto, recorder));
    let app = router(
        AppState::new(storage, downloads).with_trusted_proxies(config.trusted_proxies.clone()),
    );

    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    match &config.tls {
        Some(tls) => {
            rustls::crypto::ring::default_provider()
                .install_default()
                .map_err(|_| "failed to install rustls crypto provider")?;
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;

            info!(addr = %config.bind_addr, "Statement Vault listening on https (docs at /docs)");
            axum_server::bind_rustls(config.bind_addr, tls_config)
                .handle(handle)
                .serve(service)
                .await?;
        }
        None => {
            warn!("TLS_CERT_PATH/TLS_KEY_PATH not set; serving plain HTTP");
            info!(addr = %config.bind_addr, "Statement Vault listening on http (docs at /docs)");
            axum_server::bind(config.bind_addr)
                .handle(handle)
                .serve(service)
                .await?;
        }
    }

    info!("Server stopped; draining audit log");
    shutdown.cancel();
    audit_worker.await?;
    Ok(())
}

async fn shutdown_signal(handle: Handle<SocketAddr>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
