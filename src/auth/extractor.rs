// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for the authenticated session.
//!
//! The gate middleware validates the request and stores the session payload
//! in the request extensions; these extractors hand it to handlers:
//!
//! ```rust,ignore
//! async fn me(CurrentUser(user): CurrentUser) -> impl IntoResponse {
//!     // user is the SessionData for this browser session
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::claims::SessionData;
use super::error::AuthError;
use super::middleware::SessionScope;

/// Extractor for the current session payload.
///
/// Only valid on routes behind the gate middleware; elsewhere it rejects
/// with `MissingToken`.
pub struct CurrentUser(pub SessionData);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionData>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AuthError::MissingToken)
    }
}

/// Extractor for the opaque session-scope identifier.
pub struct Scope(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Scope {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionScope>()
            .map(|scope| Scope(scope.0.clone()))
            .ok_or(AuthError::MissingToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn sample_session() -> SessionData {
        serde_json::from_value(serde_json::json!({
            "email": "ana@example.com",
            "name": "Ana Torres",
            "permissions": ["reports"],
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn current_user_requires_gate() {
        let mut parts = Request::builder()
            .uri("/me")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let result = CurrentUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::MissingToken)));
    }

    #[tokio::test]
    async fn current_user_reads_gate_extensions() {
        let mut parts = Request::builder()
            .uri("/me")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        parts.extensions.insert(sample_session());
        parts.extensions.insert(SessionScope("sid-1".to_string()));

        let CurrentUser(user) = CurrentUser::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(user.email, "ana@example.com");

        let Scope(sid) = Scope::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(sid, "sid-1");
    }
}
