// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Portal public key fetching and caching.
//!
//! ## Security
//!
//! - The key is fetched from the portal over HTTPS only
//! - Fetched PEM bytes are persisted to the encrypted data directory, so a
//!   restart does not need the portal to be reachable
//! - A signature failure during validation forces a re-fetch (key rotation)
//!
//! ## Concurrency
//!
//! `get_decoding_key` is safe for concurrent callers. The cold-cache path is
//! single-flight: the first caller performs the fetch while the rest wait on
//! the same lock and reuse the result, so a burst of sessions validating
//! against a cold cache produces exactly one portal request.

use std::sync::Arc;
use std::time::SystemTime;

use jsonwebtoken::DecodingKey;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{Config, KEY_FETCH_TIMEOUT};
use crate::storage::EncryptedStorage;

use super::error::AuthError;

/// In-memory copy of the portal public key.
struct CachedKey {
    key: Arc<DecodingKey>,
    /// Mtime of the cache file when this copy was loaded. Compared on every
    /// read so that deleting or replacing the file on disk invalidates the
    /// in-memory copy without a process restart.
    file_mtime: Option<SystemTime>,
}

/// Manager for the portal's asymmetric public key.
///
/// Owns the only long-lived copy of the verification material; callers get
/// an `Arc<DecodingKey>` for the duration of one validation call.
pub struct PublicKeyManager {
    endpoint: String,
    storage: Arc<EncryptedStorage>,
    client: reqwest::Client,
    cached: RwLock<Option<CachedKey>>,
    /// Serializes cold fetches (single-flight).
    fetch_lock: Mutex<()>,
}

impl PublicKeyManager {
    pub fn new(config: &Config, storage: Arc<EncryptedStorage>) -> Self {
        Self {
            endpoint: config.public_key_endpoint(),
            storage,
            client: reqwest::Client::builder()
                .timeout(KEY_FETCH_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
            cached: RwLock::new(None),
            fetch_lock: Mutex::new(()),
        }
    }

    /// Get the current decoding key, loading from the disk cache or fetching
    /// from the portal as needed. Idempotent and safe for concurrent callers.
    pub async fn get_decoding_key(&self) -> Result<Arc<DecodingKey>, AuthError> {
        let key_path = self.storage.paths().public_key();

        // Fast path: in-memory copy, still backed by the same cache file.
        {
            let cached = self.cached.read().await;
            if let Some(entry) = &*cached {
                if self.storage.exists(&key_path)
                    && self.storage.mtime(&key_path) == entry.file_mtime
                {
                    return Ok(entry.key.clone());
                }
            }
        }

        let _guard = self.fetch_lock.lock().await;

        // Re-check after acquiring the lock; a concurrent caller may have
        // completed the fetch while this one waited.
        {
            let cached = self.cached.read().await;
            if let Some(entry) = &*cached {
                if self.storage.exists(&key_path)
                    && self.storage.mtime(&key_path) == entry.file_mtime
                {
                    return Ok(entry.key.clone());
                }
            }
        }

        // Disk cache next.
        if let Some(key) = self.load_from_disk().await {
            return Ok(key);
        }

        self.fetch_and_store().await
    }

    /// Drop the in-memory copy and delete the cache file. The next
    /// validation attempt fetches fresh material from the portal.
    pub async fn invalidate(&self) {
        let _guard = self.fetch_lock.lock().await;
        *self.cached.write().await = None;
        if let Err(e) = self.storage.delete(self.storage.paths().public_key()) {
            warn!(error = %e, "Failed to delete public key cache file");
        }
        info!("Public key cache invalidated");
    }

    /// Fetch from the portal unconditionally, replacing both caches.
    ///
    /// Used after a signature failure, which may indicate the portal rotated
    /// its key while our cached copy stayed stale.
    pub async fn force_refresh(&self) -> Result<Arc<DecodingKey>, AuthError> {
        let _guard = self.fetch_lock.lock().await;
        *self.cached.write().await = None;
        self.fetch_and_store().await
    }

    /// Whether a usable key is currently cached (memory or disk).
    pub async fn is_cached(&self) -> bool {
        if self.cached.read().await.is_some() {
            return true;
        }
        self.storage.exists(self.storage.paths().public_key())
    }

    /// Load and parse the cache file, refreshing the in-memory copy.
    /// Returns None on a missing, empty, or unparseable file.
    async fn load_from_disk(&self) -> Option<Arc<DecodingKey>> {
        let key_path = self.storage.paths().public_key();
        let pem = match self.storage.read_raw(&key_path) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => return None,
            Err(_) => return None,
        };

        match DecodingKey::from_rsa_pem(&pem) {
            Ok(key) => {
                let key = Arc::new(key);
                *self.cached.write().await = Some(CachedKey {
                    key: key.clone(),
                    file_mtime: self.storage.mtime(&key_path),
                });
                debug!("Portal public key loaded from cache file");
                Some(key)
            }
            Err(e) => {
                warn!(error = %e, "Cached public key file is unparseable, refetching");
                None
            }
        }
    }

    /// Fetch the PEM from the portal, persist it atomically, cache it.
    async fn fetch_and_store(&self) -> Result<Arc<DecodingKey>, AuthError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| AuthError::KeyUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyUnavailable(format!(
                "HTTP {} from public key endpoint",
                response.status()
            )));
        }

        let pem = response
            .bytes()
            .await
            .map_err(|e| AuthError::KeyUnavailable(e.to_string()))?;

        if pem.is_empty() {
            return Err(AuthError::KeyUnavailable(
                "Portal returned an empty public key".to_string(),
            ));
        }

        let key = DecodingKey::from_rsa_pem(&pem)
            .map_err(|e| AuthError::KeyUnavailable(format!("Invalid PEM from portal: {e}")))?;

        let key_path = self.storage.paths().public_key();
        if let Err(e) = self.storage.write_raw(&key_path, &pem) {
            // A failed cache write is not fatal: the key is valid, the next
            // cold start just fetches again.
            warn!(error = %e, "Failed to persist public key cache file");
        }

        let key = Arc::new(key);
        *self.cached.write().await = Some(CachedKey {
            key: key.clone(),
            file_mtime: self.storage.mtime(&key_path),
        });

        info!("Portal public key fetched and cached");
        Ok(key)
    }
}
