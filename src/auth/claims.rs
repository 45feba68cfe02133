// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and session data representations.
//!
//! The portal issues a *minimal* JWT: identity, audience, and timing claims
//! only. Profile and permission data are deliberately stripped so the token
//! fits in a URL parameter; they are fetched out-of-band from the portal's
//! session-data endpoint using `(jti, email)` as the lookup key.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Claims carried by the portal's minimal JWT.
///
/// Signature, expiry, and audience are enforced by the `jsonwebtoken`
/// validation in `validator.rs`; this struct only names the fields.
#[derive(Debug, Clone, Deserialize)]
pub struct MinimalClaims {
    /// Subject identifier
    pub sub: String,

    /// Email address, used with `jti` to look up session data
    pub email: String,

    /// Unique token id
    pub jti: String,

    /// Audience: must equal the registered application identifier exactly
    pub aud: String,

    /// Issuer (portal URL)
    #[serde(default)]
    pub iss: Option<String>,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,
}

/// Full session payload returned by the portal's session-data endpoint.
///
/// This is the authoritative user record for the lifetime of a session.
/// It is replaced wholesale on every renewal, never partially mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionData {
    /// Email address (canonical user identifier)
    pub email: String,

    /// Display name
    pub name: String,

    /// Avatar reference (URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// Profile label assigned by the portal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Permission strings, in portal order
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Extension fields the portal may add without a contract change
    #[serde(flatten)]
    #[schema(ignore)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl SessionData {
    /// Check whether the portal granted a named permission.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Result of a successful two-phase validation.
///
/// The minimal token's claims are discarded except for the timing metadata
/// needed to schedule renewal; `data` comes from the session-data endpoint.
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    /// The validated minimal token (kept for renewal)
    pub token: String,
    /// Authoritative session payload from the portal
    pub data: SessionData,
    /// Token issued-at (Unix timestamp)
    pub issued_at: i64,
    /// Token expiry (Unix timestamp)
    pub expires_at: i64,
}
