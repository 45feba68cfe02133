// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{env, net::SocketAddr};

use tracing::info;
use tracing_subscriber::EnvFilter;

use portal_sso_gateway::api::router;
use portal_sso_gateway::config::Config;
use portal_sso_gateway::state::AppState;
use portal_sso_gateway::storage::{EncryptedStorage, StoragePaths};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    match env::var("LOG_FORMAT").as_deref() {
        Ok("json") => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = Config::from_env();

    // All persistent state (key cache, sessions) lives in the encrypted
    // data directory.
    let mut storage = EncryptedStorage::new(StoragePaths::new(&config.data_dir));
    storage
        .initialize()
        .expect("Failed to initialize encrypted storage");

    let state = AppState::new(config, storage);
    let app = router(state.clone());

    // Parse bind address
    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("Failed to parse bind address");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");

    info!(
        portal = %state.config.portal_url,
        audience = %state.config.audience,
        "Portal SSO gateway listening on http://{addr} (docs at /docs)"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed");

    // Stop background session refreshers before exiting.
    state.shutdown();
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    info!("Shutdown signal received");
}
