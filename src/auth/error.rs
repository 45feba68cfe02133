// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Every cryptographic and network failure in the validation pipeline is
//! normalized into this taxonomy at the validator boundary. The gate and the
//! API layer never see a raw transport or decoding error, and the rendered
//! response body never carries internal detail (key material, portal error
//! bodies). Server-side logs may.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication error type.
///
/// `InvalidSignature` is kept distinct from expiry and malformed-token
/// failures: a signature mismatch may indicate the portal rotated its key,
/// and drives a forced public-key cache invalidation. Expiry does not.
#[derive(Debug)]
pub enum AuthError {
    /// No token in the request and no existing session
    MissingToken,
    /// Token is malformed (not decodable as a JWT)
    MalformedToken,
    /// Token signature does not verify against the portal public key
    InvalidSignature,
    /// Token has expired
    TokenExpired,
    /// Token audience does not match the registered application identifier
    InvalidAudience,
    /// Portal public key could not be fetched
    KeyUnavailable(String),
    /// Session-data or refresh endpoint unreachable (includes timeouts)
    RemoteUnavailable(String),
    /// Portal rejected the session-data or refresh request
    RemoteRejected(u16),
    /// Internal error
    InternalError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::KeyUnavailable(_) => "key_unavailable",
            AuthError::RemoteUnavailable(_) => "session_data_unavailable",
            AuthError::RemoteRejected(_) => "session_data_rejected",
            AuthError::InternalError(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken
            | AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::InvalidAudience
            | AuthError::RemoteRejected(_) => StatusCode::UNAUTHORIZED,
            AuthError::KeyUnavailable(_) | AuthError::RemoteUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "No authentication token was provided"),
            AuthError::MalformedToken => write!(f, "Token is malformed"),
            AuthError::InvalidSignature => write!(f, "Token signature is invalid"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::InvalidAudience => write!(f, "Token audience is invalid"),
            AuthError::KeyUnavailable(msg) => {
                write!(f, "Failed to fetch portal public key: {msg}")
            }
            AuthError::RemoteUnavailable(msg) => {
                write!(f, "Portal session-data endpoint unreachable: {msg}")
            }
            AuthError::RemoteRejected(status) => {
                write!(f, "Portal rejected the session-data request (HTTP {status})")
            }
            AuthError::InternalError(msg) => write!(f, "Internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Generic body only: the Display text for remote failures carries
        // transport detail that must stay server-side.
        let body = Json(AuthErrorBody {
            error: generic_message(&self).to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

/// User-visible message for an auth failure. Never includes internal detail.
pub fn generic_message(error: &AuthError) -> &'static str {
    match error {
        AuthError::MissingToken => "No authentication token was provided",
        AuthError::MalformedToken | AuthError::InvalidSignature | AuthError::InvalidAudience => {
            "Invalid session"
        }
        AuthError::TokenExpired => "Session expired",
        AuthError::KeyUnavailable(_)
        | AuthError::RemoteUnavailable(_)
        | AuthError::InternalError(_) => "Authentication is temporarily unavailable",
        AuthError::RemoteRejected(_) => "Invalid session",
    }
}
