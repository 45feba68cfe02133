// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared application state.
//!
//! All process-scoped state (key cache, session map) lives here and is
//! injected into handlers and middleware; nothing is accessed as an ambient
//! global. Created once at startup, torn down via `shutdown()`.

use std::sync::Arc;

use crate::auth::{PublicKeyManager, TokenValidator};
use crate::config::Config;
use crate::session::SessionManager;
use crate::storage::EncryptedStorage;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<EncryptedStorage>,
    pub keys: Arc<PublicKeyManager>,
    pub validator: Arc<TokenValidator>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    /// Wire up all components over initialized storage.
    pub fn new(config: Config, storage: EncryptedStorage) -> Self {
        let config = Arc::new(config);
        let storage = Arc::new(storage);
        let keys = Arc::new(PublicKeyManager::new(&config, storage.clone()));
        let validator = Arc::new(TokenValidator::new(&config, keys.clone()));
        let sessions = Arc::new(SessionManager::new(
            &config,
            storage.clone(),
            validator.clone(),
        ));

        Self {
            config,
            storage,
            keys,
            validator,
            sessions,
        }
    }

    /// Drop the cached portal public key; the next validation re-fetches.
    pub async fn invalidate_public_key_cache(&self) {
        self.keys.invalidate().await;
    }

    /// Cancel all background session refreshers.
    pub fn shutdown(&self) {
        self.sessions.shutdown();
    }
}
