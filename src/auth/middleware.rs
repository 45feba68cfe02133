// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum: the single chokepoint every
//! protected request passes through.
//!
//! ## Flow
//!
//! 1. A valid session exists for the browser's session cookie: the request
//!    proceeds with the session payload in its extensions. If the token is
//!    close to expiry the session is renewed in-line (single-flight with the
//!    background refresher).
//! 2. No session, but the request carries a `token` URL parameter (the
//!    portal's login callback): the token runs through the two-phase
//!    validator. Success creates the session and redirects to the same URL
//!    with the token parameter stripped; failure redirects to the auth
//!    error page without creating a session.
//! 3. Neither: redirect to the portal login entry with a return-to address.
//!
//! The middleware performs no cryptographic work itself; all verification
//! lives in the [`TokenValidator`](super::validator::TokenValidator).

use axum::{
    extract::{Request, State},
    http::header::SET_COOKIE,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::AppState;

use super::error::AuthError;

/// Name of the opaque browser-session cookie.
pub const SESSION_COOKIE: &str = "sso_session";

/// Session-scope identifier for the current request.
///
/// Inserted into request extensions by the middleware so handlers (logout)
/// can address the session without re-reading cookies.
#[derive(Debug, Clone)]
pub struct SessionScope(pub String);

/// Authentication gate middleware.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let session_id = session_id_from_cookies(&request);
    let token = token_from_query(&request);

    // A fresh token always wins: the portal just sent the user back, so the
    // session (if any) is re-established from it.
    if let Some(token) = token {
        let target = url_without_token(&state, &request);
        return handle_login(&state, session_id, &token, &target).await;
    }

    if let Some(session_id) = session_id {
        if let Some(user) = state.sessions.current_user(&session_id).await {
            // Belt and braces alongside the background refresher: a request
            // arriving inside the renewal margin renews in-line. Both paths
            // collapse into one remote call per session.
            if let Err(e) = state.sessions.renew(&session_id).await {
                debug!(error_code = e.error_code(), "In-line renewal failed");
            }

            request.extensions_mut().insert(user);
            request.extensions_mut().insert(SessionScope(session_id));
            return next.run(request).await;
        }
    }

    debug!(path = %request.uri().path(), "Unauthenticated request, redirecting to portal");
    let return_to = original_url(&state, &request);
    Redirect::temporary(&state.config.login_url(Some(&return_to))).into_response()
}

/// Validate a portal callback token and establish the session.
async fn handle_login(
    state: &AppState,
    session_id: Option<String>,
    token: &str,
    target: &str,
) -> Response {
    match state.validator.validate(token).await {
        Ok(validated) => {
            let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            state.sessions.establish(&session_id, validated).await;

            // Strip the token from the address bar.
            let mut response = Redirect::to(target).into_response();

            let cookie = session_cookie(state, &session_id);
            match cookie.to_string().parse() {
                Ok(value) => {
                    response.headers_mut().append(SET_COOKIE, value);
                }
                Err(_) => {
                    return AuthError::InternalError("invalid session cookie".to_string())
                        .into_response()
                }
            }
            response
        }
        Err(e) => {
            warn!(error_code = e.error_code(), "Token validation failed at the gate");
            let target = format!(
                "{}/auth/error?code={}",
                state.config.base_path,
                e.error_code()
            );
            Redirect::to(&target).into_response()
        }
    }
}

/// Session id from the request cookies.
///
/// Session ids are minted locally as UUIDs; anything else is rejected here,
/// before the value can reach a session file path.
fn session_id_from_cookies(request: &Request) -> Option<String> {
    let jar = CookieJar::from_headers(request.headers());
    let value = jar.get(SESSION_COOKIE)?.value().to_string();
    Uuid::parse_str(&value).ok()?;
    Some(value)
}

/// The `token` URL parameter, if present.
fn token_from_query(request: &Request) -> Option<String> {
    let query = request.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
}

/// Request URL with the `token` parameter removed.
///
/// Nested routers see the request path with the base path stripped; the
/// Location header must carry the external path, so it is prefixed back.
fn url_without_token(state: &AppState, request: &Request) -> String {
    let path = format!("{}{}", state.config.base_path, request.uri().path());
    let remaining: String = match request.uri().query() {
        Some(query) => url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(
                url::form_urlencoded::parse(query.as_bytes()).filter(|(key, _)| key != "token"),
            )
            .finish(),
        None => String::new(),
    };

    if remaining.is_empty() {
        path
    } else {
        format!("{path}?{remaining}")
    }
}

/// Full request URL as the portal should send the user back to it.
fn original_url(state: &AppState, request: &Request) -> String {
    let path = format!("{}{}", state.config.base_path, request.uri().path());
    match request.uri().query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    }
}

fn session_cookie(state: &AppState, session_id: &str) -> Cookie<'static> {
    let path = if state.config.base_path.is_empty() {
        "/".to_string()
    } else {
        state.config.base_path.clone()
    };

    Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path(path)
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Cookie that removes the browser session cookie (logout).
pub fn removal_cookie(state: &AppState) -> Cookie<'static> {
    let mut cookie = session_cookie(state, "");
    cookie.make_removal();
    cookie
}
