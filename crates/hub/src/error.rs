// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::fmt;

/// Error categories for the hub API.
///
/// Every variant carries a human-readable message; the category decides the
/// HTTP status. Handlers fail fast with one of these and the envelope
/// `{"success": false, "error": "<message>"}` is emitted.
#[derive(Debug)]
pub enum HubError {
    /// Malformed body, invalid IP literal, bad parameters.
    Validation(String),
    /// Unknown IP for unblock, unknown host for deregister/attacks.
    NotFound(String),
    /// Database or firewall adapter unavailable.
    Backend(String),
}

impl HubError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation(m) | Self::NotFound(m) | Self::Backend(m) => m,
        }
    }
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for HubError {}

impl From<sqlx::Error> for HubError {
    fn from(e: sqlx::Error) -> Self {
        Self::Backend(format!("database error: {e}"))
    }
}

/// Error envelope: `{"success": false, "error": "<message>"}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Backend(_)) {
            tracing::error!(err = %self, "request failed");
        }
        let body = ErrorBody { success: false, error: self.message().to_owned() };
        (self.status(), Json(body)).into_response()
    }
}
