// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
///
/// Validation errors (`InvalidGrant`, `ChallengeNotEligible`, `EventProcessing`)
/// are surfaced to the caller and never leave partial state behind. Sync errors
/// are normally caught by the session and logged; they only reach HTTP callers
/// on the explicit sync endpoint.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid XP grant: {0}")]
    InvalidGrant(String),

    #[error("Challenge not eligible for completion: {0}")]
    ChallengeNotEligible(String),

    #[error("Event processing failed: {0}")]
    EventProcessing(String),

    #[error("Remote store unavailable: {0}")]
    SyncUnavailable(String),

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Session closed for user {0}")]
    SessionClosed(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for errors caused by the caller's input rather than by storage.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            AppError::InvalidGrant(_)
                | AppError::ChallengeNotEligible(_)
                | AppError::EventProcessing(_)
                | AppError::BadRequest(_)
        )
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::InvalidGrant(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_grant",
                Some(msg.clone()),
            ),
            AppError::ChallengeNotEligible(msg) => (
                StatusCode::CONFLICT,
                "challenge_not_eligible",
                Some(msg.clone()),
            ),
            AppError::EventProcessing(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "event_processing_error",
                Some(msg.clone()),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::SessionClosed(msg) => {
                (StatusCode::GONE, "session_closed", Some(msg.clone()))
            }
            AppError::SyncUnavailable(msg) => {
                tracing::warn!(error = %msg, "Remote store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "sync_unavailable", None)
            }
            AppError::CorruptSnapshot(msg) => {
                tracing::error!(error = %msg, "Corrupt snapshot");
                (StatusCode::INTERNAL_SERVER_ERROR, "corrupt_snapshot", None)
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for services and handlers
pub type Result<T> = std::result::Result<T, AppError>;
