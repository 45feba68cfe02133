// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Test helpers for the authentication pipeline: a freshly generated RSA
//! keypair, token minting, and an in-process stub portal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tempfile::TempDir;

use crate::config::Config;
use crate::storage::{EncryptedStorage, StoragePaths};

/// An RSA keypair in PEM form, as the portal would hold it.
#[derive(Clone)]
pub(crate) struct TestKeys {
    pub private_pem: String,
    pub public_pem: String,
}

pub(crate) fn generate_keys() -> TestKeys {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, 2048).expect("RSA key generation failed");
    let public = RsaPublicKey::from(&private);

    TestKeys {
        private_pem: private
            .to_pkcs8_pem(LineEnding::LF)
            .expect("private PEM encoding failed")
            .to_string(),
        public_pem: public
            .to_public_key_pem(LineEnding::LF)
            .expect("public PEM encoding failed"),
    }
}

pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Mint a minimal token the way the portal does.
pub(crate) fn mint_token(keys: &TestKeys, claims: &serde_json::Value) -> String {
    let key =
        EncodingKey::from_rsa_pem(keys.private_pem.as_bytes()).expect("invalid private PEM");
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), claims, &key).expect("encode failed")
}

/// Standard minimal claims for a token expiring `ttl` from now.
pub(crate) fn minimal_claims(audience: &str, email: &str, jti: &str, ttl: Duration) -> serde_json::Value {
    let iat = now();
    serde_json::json!({
        "sub": email,
        "email": email,
        "jti": jti,
        "aud": audience,
        "iss": "https://portal.example.com",
        "iat": iat,
        "exp": iat + ttl.as_secs() as i64,
    })
}

/// Default session-data payload the stub portal returns.
pub(crate) fn sample_session_data(email: &str) -> serde_json::Value {
    serde_json::json!({
        "email": email,
        "name": "Ana Torres",
        "picture": "https://portal.example.com/avatars/ana.png",
        "profile": "standard",
        "permissions": ["reports", "billing"],
    })
}

/// What the stub's session-data endpoint should answer.
pub(crate) enum SessionReply {
    Data(serde_json::Value),
    Status(u16),
}

/// Shared, mutable behavior of the stub portal.
pub(crate) struct PortalState {
    pub public_key_pem: Mutex<String>,
    pub key_fetches: AtomicUsize,
    pub session_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub session_reply: Mutex<SessionReply>,
    /// Token the refresh endpoint hands out; None rejects with 401.
    pub refresh_token: Mutex<Option<String>>,
    pub last_session_request: Mutex<Option<serde_json::Value>>,
}

/// In-process stand-in for the identity portal's internal API.
pub(crate) struct StubPortal {
    pub base_url: String,
    pub state: Arc<PortalState>,
}

impl StubPortal {
    pub async fn spawn(keys: &TestKeys, email: &str) -> Self {
        let state = Arc::new(PortalState {
            public_key_pem: Mutex::new(keys.public_pem.clone()),
            key_fetches: AtomicUsize::new(0),
            session_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            session_reply: Mutex::new(SessionReply::Data(sample_session_data(email))),
            refresh_token: Mutex::new(None),
            last_session_request: Mutex::new(None),
        });

        let router = Router::new()
            .route("/internal/public-key", get(serve_public_key))
            .route("/internal/session-data", post(serve_session_data))
            .route("/internal/refresh", post(serve_refresh))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("stub portal bind failed");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn key_fetches(&self) -> usize {
        self.state.key_fetches.load(Ordering::SeqCst)
    }

    pub fn session_calls(&self) -> usize {
        self.state.session_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn set_public_key(&self, pem: &str) {
        *self.state.public_key_pem.lock().unwrap() = pem.to_string();
    }

    pub fn set_session_reply(&self, reply: SessionReply) {
        *self.state.session_reply.lock().unwrap() = reply;
    }

    pub fn set_refresh_token(&self, token: Option<String>) {
        *self.state.refresh_token.lock().unwrap() = token;
    }
}

async fn serve_public_key(State(state): State<Arc<PortalState>>) -> impl IntoResponse {
    state.key_fetches.fetch_add(1, Ordering::SeqCst);
    state.public_key_pem.lock().unwrap().clone()
}

async fn serve_session_data(
    State(state): State<Arc<PortalState>>,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    state.session_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_session_request.lock().unwrap() = Some(body);

    let reply = state.session_reply.lock().unwrap();
    match &*reply {
        SessionReply::Data(data) => Json(data.clone()).into_response(),
        SessionReply::Status(code) => StatusCode::from_u16(*code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
    }
}

async fn serve_refresh(State(state): State<Arc<PortalState>>) -> axum::response::Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let token = state.refresh_token.lock().unwrap().clone();
    match token {
        Some(token) => Json(serde_json::json!({ "token": token })).into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

/// Config wired to the stub portal.
pub(crate) fn portal_config(base_url: &str, audience: &str, data_dir: &str) -> Config {
    Config {
        portal_url: base_url.to_string(),
        portal_internal_url: base_url.to_string(),
        app_name: "Test App".to_string(),
        audience: audience.to_string(),
        base_path: String::new(),
        data_dir: data_dir.to_string(),
        refresh_margin: Duration::from_secs(60),
        refresh_retry: Duration::from_secs(1),
    }
}

/// Initialized storage rooted in a fresh temp dir.
pub(crate) fn temp_storage() -> (Arc<EncryptedStorage>, TempDir) {
    let temp_dir = TempDir::new().expect("temp dir");
    let mut storage = EncryptedStorage::new(StoragePaths::new(temp_dir.path()));
    storage.initialize().expect("storage init");
    (Arc::new(storage), temp_dir)
}
