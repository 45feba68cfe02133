// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{claims::SessionData, middleware::require_auth},
    state::AppState,
};

pub mod health;
pub mod session;

pub fn router(state: AppState) -> Router {
    // Every route here is behind the auth gate.
    let protected = Router::new()
        .route("/", get(session::index))
        .route("/me", get(session::me))
        .route("/logout", post(session::logout))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let public = Router::new()
        .route("/", post(session::sso_callback))
        .route("/auth/error", get(session::auth_error))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let base_path = state.config.base_path.clone();
    let app = protected.merge(public).with_state(state);

    let app = if base_path.is_empty() {
        app
    } else {
        Router::new().nest(&base_path, app)
    };

    app.merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        session::index,
        session::me,
        session::logout,
        session::sso_callback,
        session::auth_error
    ),
    components(
        schemas(
            SessionData,
            session::WelcomeResponse,
            session::SsoCallbackForm,
            session::AuthErrorPage,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Session", description = "Session state and portal callback"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
