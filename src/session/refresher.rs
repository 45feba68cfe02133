// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Refresher
//!
//! One background task per active session that renews the token before it
//! expires, so the user never sees an interruption.
//!
//! ## Strategy
//!
//! The task sleeps until the token's remaining lifetime drops below the
//! configured refresh margin, then asks the portal for a renewed token. The
//! renewed token runs through the full two-phase validator, so the session
//! payload is refreshed along with the signature. A failed attempt is
//! retried on the retry cadence until the token actually expires; only then
//! is the session torn down.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for cancellation: logout and
//! process shutdown cancel the token, and a renewal completing after
//! cancellation is discarded by the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::error::AuthError;

use super::SessionManager;

/// Spawn the renewal task for one session.
pub(crate) fn spawn(manager: Arc<SessionManager>, session_id: String, cancel: CancellationToken) {
    tokio::spawn(run(manager, session_id, cancel));
}

async fn run(manager: Arc<SessionManager>, session_id: String, cancel: CancellationToken) {
    debug!(session_id = %session_id, "Session refresher starting");

    loop {
        let Some(expires_at) = manager.expires_at(&session_id).await else {
            // Logged out or replaced.
            return;
        };

        let margin = manager.refresh_margin().as_secs() as i64;
        let now = Utc::now().timestamp();
        let renew_at = expires_at - margin;

        if now < renew_at {
            let wait = Duration::from_secs((renew_at - now) as u64);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => {
                    debug!(session_id = %session_id, "Session refresher cancelled");
                    return;
                }
            }
        }

        if cancel.is_cancelled() {
            debug!(session_id = %session_id, "Session refresher cancelled");
            return;
        }

        match manager.renew(&session_id).await {
            // Renewed (or another caller got there first); the next
            // iteration picks up the new expiry.
            Ok(_) => {}
            Err(AuthError::TokenExpired) => {
                // renew() already expired the session.
                return;
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    error_code = e.error_code(),
                    "Session renewal failed, will retry"
                );
                tokio::select! {
                    _ = tokio::time::sleep(manager.refresh_retry()) => {}
                    _ = cancel.cancelled() => return,
                }
            }
        }
    }
}
