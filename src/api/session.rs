// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session-facing HTTP handlers: the protected views, logout, the portal's
//! form-POST callback, and the auth error page.

use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::auth::middleware::removal_cookie;
use crate::auth::{CurrentUser, Scope, SessionData};
use crate::state::AppState;

/// Response body for the landing view.
#[derive(Debug, Serialize, ToSchema)]
pub struct WelcomeResponse {
    /// Application display name.
    pub app: String,
    /// Authenticated user's email.
    pub email: String,
    /// Authenticated user's display name.
    pub name: String,
}

/// Landing view for an authenticated session.
#[utoipa::path(
    get,
    path = "/",
    tag = "Session",
    responses(
        (status = 200, description = "Authenticated", body = WelcomeResponse),
        (status = 307, description = "No session, redirected to the portal login")
    )
)]
pub async fn index(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        app: state.config.app_name.clone(),
        email: user.email,
        name: user.name,
    })
}

/// Current session payload.
#[utoipa::path(
    get,
    path = "/me",
    tag = "Session",
    responses(
        (status = 200, description = "Current session data", body = SessionData),
        (status = 307, description = "No session, redirected to the portal login")
    )
)]
pub async fn me(CurrentUser(user): CurrentUser) -> Json<SessionData> {
    Json(user)
}

/// Tear down the current session.
#[utoipa::path(
    post,
    path = "/logout",
    tag = "Session",
    responses(
        (status = 204, description = "Session removed")
    )
)]
pub async fn logout(State(state): State<AppState>, Scope(session_id): Scope) -> Response {
    state.sessions.logout(&session_id).await;

    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Ok(value) = removal_cookie(&state).to_string().parse() {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

/// Form body the portal POSTs to the application root after login.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SsoCallbackForm {
    pub token: String,
}

/// Portal login callback.
///
/// Some portal deployments deliver the token as a form POST instead of a
/// query parameter. Convert it to a relative redirect carrying `?token=` so
/// the gate picks it up on the following GET.
#[utoipa::path(
    post,
    path = "/",
    tag = "Session",
    responses(
        (status = 303, description = "Redirect to the same path with the token as a query parameter")
    )
)]
pub async fn sso_callback(Form(form): Form<SsoCallbackForm>) -> Redirect {
    info!("SSO callback received, redirecting with token parameter");
    let encoded: String =
        url::form_urlencoded::byte_serialize(form.token.as_bytes()).collect();
    Redirect::to(&format!("./?token={encoded}"))
}

#[derive(Debug, Deserialize)]
pub struct AuthErrorParams {
    pub code: Option<String>,
}

/// Response body for the auth error page.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthErrorPage {
    /// Generic, non-leaking description of the failure.
    pub error: String,
    /// Stable error code for the UI layer.
    pub error_code: String,
    /// Path back to the portal login.
    pub login_url: String,
}

/// Observable auth error state, rendered by the UI layer.
///
/// Internal failure detail (portal responses, transport errors) stays in the
/// server logs; this surface only ever shows the coarse category.
#[utoipa::path(
    get,
    path = "/auth/error",
    tag = "Session",
    params(("code" = Option<String>, Query, description = "Auth error code")),
    responses(
        (status = 200, description = "Auth error description", body = AuthErrorPage)
    )
)]
pub async fn auth_error(
    State(state): State<AppState>,
    Query(params): Query<AuthErrorParams>,
) -> Json<AuthErrorPage> {
    let code = params.code.unwrap_or_else(|| "unknown".to_string());
    let error = match code.as_str() {
        "token_expired" => "Session expired",
        "key_unavailable" | "session_data_unavailable" => {
            "Authentication is temporarily unavailable"
        }
        _ => "Invalid session",
    };

    Json(AuthErrorPage {
        error: error.to_string(),
        error_code: code,
        login_url: state.config.login_url(None),
    })
}
