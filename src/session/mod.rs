// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Store
//!
//! In-memory map from an opaque per-browser-session identifier to the
//! current validated session, backed by the encrypted data directory so a
//! server restart does not silently log users out. Persisted tokens are
//! never trusted on reload: restoring a session runs the stored token
//! through the full two-phase validator again.
//!
//! Each active session owns one background refresher task (see
//! [`refresher`]) that renews the token before expiry. Logout cancels the
//! task; a renewal that completes after logout is discarded, never applied.
//!
//! A session is either fully populated or absent. Callers only ever observe
//! a complete [`SessionData`] or `None`.

pub mod refresher;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::claims::{SessionData, ValidatedSession};
use crate::auth::error::AuthError;
use crate::auth::validator::TokenValidator;
use crate::config::Config;
use crate::storage::EncryptedStorage;

/// Session record persisted to the encrypted data directory.
///
/// Carries only the token: the session payload is re-fetched from the portal
/// when the record is restored, so permissions never survive a restart
/// stale.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedSession {
    pub token: String,
    pub saved_at: DateTime<Utc>,
}

struct SessionEntry {
    session: ValidatedSession,
    /// Serializes renewal attempts for this session (single-flight).
    renew_lock: Arc<Mutex<()>>,
    cancel: CancellationToken,
}

enum Lookup {
    Fresh(SessionData),
    Expired,
    Absent,
}

/// Store of active user sessions, one entry per browser session.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    storage: Arc<EncryptedStorage>,
    validator: Arc<TokenValidator>,
    refresh_margin: Duration,
    refresh_retry: Duration,
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(
        config: &Config,
        storage: Arc<EncryptedStorage>,
        validator: Arc<TokenValidator>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            storage,
            validator,
            refresh_margin: config.refresh_margin,
            refresh_retry: config.refresh_retry,
            shutdown: CancellationToken::new(),
        }
    }

    pub(crate) fn refresh_margin(&self) -> Duration {
        self.refresh_margin
    }

    pub(crate) fn refresh_retry(&self) -> Duration {
        self.refresh_retry
    }

    /// Install a freshly validated session and start its refresher.
    ///
    /// Replaces any existing session for the same identifier, cancelling the
    /// old refresher first.
    pub async fn establish(self: &Arc<Self>, session_id: &str, session: ValidatedSession) {
        if let Err(e) = self.persist(session_id, &session) {
            warn!(error = %e, "Failed to persist session");
        }

        let cancel = self.shutdown.child_token();
        let entry = SessionEntry {
            session,
            renew_lock: Arc::new(Mutex::new(())),
            cancel: cancel.clone(),
        };

        let replaced = self
            .sessions
            .write()
            .await
            .insert(session_id.to_string(), entry);
        if let Some(old) = replaced {
            old.cancel.cancel();
        }

        refresher::spawn(self.clone(), session_id.to_string(), cancel);
        info!(session_id = %session_id, "Session established");
    }

    /// Current session payload for this browser session, if any.
    ///
    /// An expired entry is removed and reported as absent. If the session is
    /// not in memory but a persisted record exists (previous process run),
    /// the stored token is revalidated end-to-end before the session is
    /// reinstated.
    pub async fn current_user(self: &Arc<Self>, session_id: &str) -> Option<SessionData> {
        let lookup = {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some(entry) if Utc::now().timestamp() < entry.session.expires_at => {
                    Lookup::Fresh(entry.session.data.clone())
                }
                Some(_) => Lookup::Expired,
                None => Lookup::Absent,
            }
        };

        match lookup {
            Lookup::Fresh(data) => Some(data),
            Lookup::Expired => {
                self.expire(session_id).await;
                None
            }
            Lookup::Absent => self.restore(session_id).await,
        }
    }

    /// Expiry timestamp of the session, if it is active.
    pub(crate) async fn expires_at(&self, session_id: &str) -> Option<i64> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|entry| entry.session.expires_at)
    }

    /// Renew the session token if its remaining lifetime has dropped below
    /// the refresh margin.
    ///
    /// At most one renewal is in flight per session: concurrent callers
    /// queue on the per-entry lock and find the work already done. Returns
    /// `Ok(true)` if this call performed a renewal.
    pub async fn renew(&self, session_id: &str) -> Result<bool, AuthError> {
        let (token, renew_lock, expires_at) = {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some(entry) => (
                    entry.session.token.clone(),
                    entry.renew_lock.clone(),
                    entry.session.expires_at,
                ),
                None => return Ok(false),
            }
        };

        let now = Utc::now().timestamp();
        if now >= expires_at {
            // The token ran out before a renewal succeeded.
            self.expire(session_id).await;
            return Err(AuthError::TokenExpired);
        }
        if expires_at - now > self.refresh_margin.as_secs() as i64 {
            return Ok(false);
        }

        let _guard = renew_lock.lock().await;

        // Re-check: a concurrent caller may have renewed while this one
        // waited on the lock.
        match self.sessions.read().await.get(session_id) {
            Some(entry) if entry.session.token == token => {}
            _ => return Ok(false),
        }

        let new_token = self.validator.refresh(&token).await?;
        // The new token goes through the full two-phase flow, so the session
        // payload is refreshed along with the signature.
        let validated = self.validator.validate(&new_token).await?;
        self.store_renewed(session_id, &token, validated).await;
        Ok(true)
    }

    /// Tear down the session on explicit logout.
    pub async fn logout(&self, session_id: &str) {
        if let Some(entry) = self.sessions.write().await.remove(session_id) {
            entry.cancel.cancel();
        }
        if let Err(e) = self.storage.delete(self.storage.paths().session(session_id)) {
            warn!(error = %e, "Failed to delete persisted session");
        }
        info!(session_id = %session_id, "Session logged out");
    }

    /// Remove a session whose token expired without a successful renewal.
    pub(crate) async fn expire(&self, session_id: &str) {
        if let Some(entry) = self.sessions.write().await.remove(session_id) {
            entry.cancel.cancel();
        }
        if let Err(e) = self.storage.delete(self.storage.paths().session(session_id)) {
            warn!(error = %e, "Failed to delete persisted session");
        }
        info!(session_id = %session_id, "Session expired");
    }

    /// Cancel all refreshers. Persisted records stay on disk and are
    /// revalidated on the next start.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Apply a completed renewal, unless the session went away or was
    /// replaced while the renewal was in flight. A renewal must never
    /// resurrect a logged-out session.
    async fn store_renewed(&self, session_id: &str, old_token: &str, validated: ValidatedSession) {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(entry) if entry.session.token == old_token && !entry.cancel.is_cancelled() => {
                entry.session = validated;
                if let Err(e) = self.persist(session_id, &entry.session) {
                    warn!(error = %e, "Failed to persist renewed session");
                }
                info!(session_id = %session_id, "Session renewed");
            }
            _ => {
                debug!(session_id = %session_id, "Discarding renewal for a session that went away");
            }
        }
    }

    /// Lazily restore a session persisted by a previous process run.
    async fn restore(self: &Arc<Self>, session_id: &str) -> Option<SessionData> {
        let path = self.storage.paths().session(session_id);
        let persisted: PersistedSession = self.storage.read_json(&path).ok()?;

        match self.validator.validate(&persisted.token).await {
            Ok(validated) => {
                let data = validated.data.clone();
                self.establish(session_id, validated).await;
                info!(session_id = %session_id, "Persisted session revalidated and restored");
                Some(data)
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    error_code = e.error_code(),
                    "Persisted session failed revalidation, discarding"
                );
                if let Err(e) = self.storage.delete(&path) {
                    warn!(error = %e, "Failed to delete stale persisted session");
                }
                None
            }
        }
    }

    fn persist(
        &self,
        session_id: &str,
        session: &ValidatedSession,
    ) -> crate::storage::StorageResult<()> {
        self.storage.write_json(
            self.storage.paths().session(session_id),
            &PersistedSession {
                token: session.token.clone(),
                saved_at: Utc::now(),
            },
        )
    }
}
