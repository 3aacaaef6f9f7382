// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::download::DownloadOutcome;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

/// JSON error body.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn gone(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GONE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

/// Rejected downloads get fixed messages that reveal nothing about why.
impl From<DownloadOutcome> for ApiError {
    fn from(outcome: DownloadOutcome) -> Self {
        match outcome {
            DownloadOutcome::StatementNotFound | DownloadOutcome::FileMissing => {
                Self::not_found("Statement not found")
            }
            DownloadOutcome::LinkExpiredOrUsed => {
                Self::gone("This download link has expired or was already used")
            }
            DownloadOutcome::Ok
            | DownloadOutcome::DecryptionFailed
            | DownloadOutcome::InternalError => {
                Self::internal("The statement could not be delivered")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        assert_eq!(ApiError::gone("g").status, StatusCode::GONE);
        assert_eq!(
            ApiError::internal("boom").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn outcomes_map_to_status() {
        let cases = [
            (DownloadOutcome::StatementNotFound, StatusCode::NOT_FOUND),
            (DownloadOutcome::FileMissing, StatusCode::NOT_FOUND),
            (DownloadOutcome::LinkExpiredOrUsed, StatusCode::GONE),
            (DownloadOutcome::DecryptionFailed, StatusCode::INTERNAL_SERVER_ERROR),
            (DownloadOutcome::InternalError, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (outcome, status) in cases {
            assert_eq!(ApiError::from(outcome).status, status, "{outcome}");
        }

        // File and metadata gaps look the same to the caller.
        assert_eq!(
            ApiError::from(DownloadOutcome::FileMissing).message,
            ApiError::from(DownloadOutcome::StatementNotFound).message
        );
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::gone("expired").into_response();
        assert_eq!(response.status(), StatusCode::GONE);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"expired"}"#);
    }
}
