// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed-link download endpoint.
//!
//! The download pipeline runs on the blocking pool. Decrypted bytes are
//! pumped from the returned stream through a bounded channel, so the file
//! handle lives exactly as long as the response body needs it.

use std::io::{self, Read};
use std::net::{IpAddr, SocketAddr};

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Path, Query, State},
    http::{header, Extensions, HeaderMap},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{error, info};
use utoipa::IntoParams;

use crate::crypto::{CryptoFailure, DecryptedStream};
use crate::download::{DownloadRequest, DownloadResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// Actor recorded for anonymous link holders.
pub const LINK_HOLDER_ACTOR: &str = "link-holder";

const CHUNK_SIZE: usize = 64 * 1024;
const CHANNEL_DEPTH: usize = 4;

/// Query parameters for a download link.
#[derive(Debug, Deserialize, IntoParams)]
pub struct DownloadQuery {
    /// Expiry hint issued with the link (Unix seconds).
    #[param(value_type = Option<i64>)]
    pub expires: Option<String>,
}

/// Download a statement through a signed, single-use link.
#[utoipa::path(
    get,
    path = "/v1/statements/download/{token}",
    tag = "Statements",
    params(
        ("token" = String, Path, description = "Signed link token"),
        DownloadQuery
    ),
    responses(
        (status = 200, description = "Decrypted statement (application/pdf)"),
        (status = 404, description = "Statement not found", body = crate::error::ErrorBody),
        (status = 410, description = "Link expired or already used", body = crate::error::ErrorBody),
        (status = 500, description = "Statement could not be delivered", body = crate::error::ErrorBody)
    )
)]
pub async fn download_statement(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
    extensions: Extensions,
) -> Result<Response, ApiError> {
    let request = DownloadRequest {
        token,
        // Unparseable hints fail signature verification like any forgery.
        expiry_hint: query.expires.as_deref().and_then(|v| v.trim().parse().ok()),
        client_ip: client_ip(&headers, &extensions, &state.trusted_proxies),
        user_agent: user_agent(&headers),
        actor: LINK_HOLDER_ACTOR.to_string(),
    };

    let downloads = state.downloads.clone();
    let response = tokio::task::spawn_blocking(move || downloads.validate_and_stream(&request))
        .await
        .map_err(|e| {
            error!(error = %e, "Download task failed");
            ApiError::internal("The statement could not be delivered")
        })?;

    let (statement, stream) = match response {
        DownloadResponse::Ready { statement, stream } => (statement, stream),
        DownloadResponse::Rejected(outcome) => {
            info!(outcome = %outcome, "Download rejected");
            return Err(ApiError::from(outcome));
        }
    };

    let (tx, mut rx) = mpsc::channel(CHANNEL_DEPTH);
    tokio::task::spawn_blocking(move || pump(stream, tx));

    // Authentication happens on the first read; fail before sending headers.
    let body = match rx.recv().await {
        Some(Ok(first)) => Body::from_stream(
            tokio_stream::once(Ok::<_, io::Error>(first)).chain(ReceiverStream::new(rx)),
        ),
        Some(Err(e)) => {
            error!(
                statement_id = %statement.id,
                kind = ?CryptoFailure::from_io_error(&e).map(CryptoFailure::kind),
                error = %e,
                "Statement failed to decrypt"
            );
            return Err(ApiError::internal("The statement could not be delivered"));
        }
        None => Body::empty(),
    };

    info!(statement_id = %statement.id, "Statement download started");

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", statement.download_file_name()),
            ),
            (header::CACHE_CONTROL, "no-store".to_string()),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        ],
        body,
    )
        .into_response())
}

/// Read `stream` to the end, forwarding chunks until the receiver goes away.
fn pump(mut stream: DecryptedStream, tx: mpsc::Sender<io::Result<Bytes>>) {
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let message = match stream.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => Ok(Bytes::copy_from_slice(&buffer[..n])),
            Err(e) => Err(e),
        };
        let failed = message.is_err();
        if tx.blocking_send(message).is_err() || failed {
            break;
        }
    }
    stream.close();
}

/// The peer address, or the first `X-Forwarded-For` hop when the peer is a
/// trusted proxy.
fn client_ip(headers: &HeaderMap, extensions: &Extensions, trusted_proxies: &[IpAddr]) -> String {
    let Some(peer) = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
    else {
        return "unknown".to_string();
    };
    if !trusted_proxies.contains(&peer) {
        return peer.to_string();
    }

    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.to_string())
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_believes_forwarded_header_only_from_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.4, 10.0.0.1"),
        );
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo::<SocketAddr>("10.0.0.9:5555".parse().unwrap()));
        let proxy: IpAddr = "10.0.0.9".parse().unwrap();

        assert_eq!(client_ip(&headers, &extensions, &[proxy]), "198.51.100.4");
        assert_eq!(client_ip(&headers, &extensions, &[]), "10.0.0.9");
        assert_eq!(client_ip(&HeaderMap::new(), &extensions, &[proxy]), "10.0.0.9");
        assert_eq!(client_ip(&headers, &Extensions::new(), &[proxy]), "unknown");
    }

    #[test]
    fn user_agent_defaults_to_unknown() {
        let mut headers = HeaderMap::new();
        assert_eq!(user_agent(&headers), "unknown");
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.5"));
        assert_eq!(user_agent(&headers), "curl/8.5");
    }
}
