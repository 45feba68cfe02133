// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Two-phase token validation ("Lazy SSO").
//!
//! Phase 1 verifies the minimal JWT locally: RS256 signature against the
//! cached portal public key, exact audience match, expiry. Phase 2 resolves
//! the full session payload from the portal's session-data endpoint using the
//! `(jti, email)` claims. A failure in either phase fails the whole
//! validation; no partial identity ever reaches the caller.
//!
//! A signature failure in phase 1 forces one public-key re-fetch and a single
//! retry, which transparently covers portal key rotation.

use std::sync::Arc;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::{Config, REFRESH_TIMEOUT, SESSION_DATA_TIMEOUT};

use super::claims::{MinimalClaims, SessionData, ValidatedSession};
use super::error::AuthError;
use super::keys::PublicKeyManager;

/// Clock skew tolerance for expiry checks, in seconds.
///
/// None: the portal and this service are expected to run NTP-synchronized
/// clocks, and tokens are renewed well before expiry.
const CLOCK_SKEW_LEEWAY: u64 = 0;

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: Option<String>,
}

/// Validator for portal-issued minimal tokens.
pub struct TokenValidator {
    keys: Arc<PublicKeyManager>,
    audience: String,
    session_data_endpoint: String,
    refresh_endpoint: String,
    client: reqwest::Client,
}

impl TokenValidator {
    pub fn new(config: &Config, keys: Arc<PublicKeyManager>) -> Self {
        Self {
            keys,
            audience: config.audience.clone(),
            session_data_endpoint: config.session_data_endpoint(),
            refresh_endpoint: config.refresh_endpoint(),
            client: reqwest::Client::new(),
        }
    }

    /// Validate a minimal token and resolve its full session payload.
    pub async fn validate(&self, token: &str) -> Result<ValidatedSession, AuthError> {
        let claims = self.verify_local(token).await?;
        debug!(sub = %claims.sub, jti = %claims.jti, "Token verified locally");

        let data = self.fetch_session_data(&claims).await?;
        info!(email = %data.email, "Session data resolved");

        Ok(ValidatedSession {
            token: token.to_string(),
            data,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }

    /// Phase 1: local signature, audience, and expiry verification.
    ///
    /// Retries exactly once with freshly fetched key material when the
    /// signature does not verify, since that may mean the key rotated.
    async fn verify_local(&self, token: &str) -> Result<MinimalClaims, AuthError> {
        let key = self.keys.get_decoding_key().await?;

        match self.decode(token, &key) {
            Err(AuthError::InvalidSignature) => {
                warn!("Token signature mismatch, refreshing portal public key");
                let key = self.keys.force_refresh().await?;
                self.decode(token, &key)
            }
            other => other,
        }
    }

    fn decode(&self, token: &str, key: &DecodingKey) -> Result<MinimalClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.audience]);
        validation.leeway = CLOCK_SKEW_LEEWAY;

        let token_data =
            decode::<MinimalClaims>(token, key, &validation).map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                jsonwebtoken::errors::ErrorKind::InvalidAudience => {
                    // A wrong audience on an otherwise well-formed token means
                    // this deployment is registered under a different
                    // identifier than the portal used.
                    error!(
                        expected = %self.audience,
                        "Token audience mismatch, check APP_AUDIENCE against the portal registration"
                    );
                    AuthError::InvalidAudience
                }
                _ => AuthError::MalformedToken,
            })?;

        Ok(token_data.claims)
    }

    /// Phase 2: lazy-load the authoritative session payload.
    async fn fetch_session_data(&self, claims: &MinimalClaims) -> Result<SessionData, AuthError> {
        let response = self
            .client
            .post(&self.session_data_endpoint)
            .timeout(SESSION_DATA_TIMEOUT)
            .json(&serde_json::json!({
                "jti": claims.jti,
                "email": claims.email,
            }))
            .send()
            .await
            .map_err(|e| AuthError::RemoteUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Portal rejected session-data request");
            return Err(AuthError::RemoteRejected(status.as_u16()));
        }

        response.json::<SessionData>().await.map_err(|e| {
            warn!(error = %e, "Session-data response did not match the expected shape");
            AuthError::RemoteRejected(status.as_u16())
        })
    }

    /// Exchange the current token for a renewed one at the portal.
    ///
    /// Any rejection is reported as-is; callers treat it as equivalent to
    /// expiry, since the portal revalidates session liveness on its side.
    pub async fn refresh(&self, token: &str) -> Result<String, AuthError> {
        let response = self
            .client
            .post(&self.refresh_endpoint)
            .timeout(REFRESH_TIMEOUT)
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|e| AuthError::RemoteUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::RemoteRejected(status.as_u16()));
        }

        let body = response
            .json::<RefreshResponse>()
            .await
            .map_err(|_| AuthError::RemoteRejected(status.as_u16()))?;

        body.token
            .ok_or(AuthError::RemoteRejected(status.as_u16()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testutil::{
        generate_keys, minimal_claims, mint_token, portal_config, temp_storage, SessionReply,
        StubPortal,
    };
    use std::time::Duration;

    const AUDIENCE: &str = "test-app";
    const EMAIL: &str = "ana@example.com";

    async fn setup() -> (TokenValidator, StubPortal, crate::auth::testutil::TestKeys, tempfile::TempDir)
    {
        let keys = generate_keys();
        let portal = StubPortal::spawn(&keys, EMAIL).await;
        let (storage, temp_dir) = temp_storage();
        let config = portal_config(
            &portal.base_url,
            AUDIENCE,
            &temp_dir.path().display().to_string(),
        );
        let manager = Arc::new(PublicKeyManager::new(&config, storage));
        let validator = TokenValidator::new(&config, manager);
        (validator, portal, keys, temp_dir)
    }

    #[tokio::test]
    async fn valid_token_resolves_session_data() {
        let (validator, portal, keys, _temp_dir) = setup().await;
        let token = mint_token(
            &keys,
            &minimal_claims(AUDIENCE, EMAIL, "tok-1", Duration::from_secs(300)),
        );

        let session = validator.validate(&token).await.expect("should validate");
        assert_eq!(session.data.email, EMAIL);
        assert_eq!(session.data.name, "Ana Torres");
        assert_eq!(session.data.permissions, vec!["reports", "billing"]);
        assert_eq!(portal.session_calls(), 1);

        // The lookup key is (jti, email) from the minimal claims.
        let request = portal
            .state
            .last_session_request
            .lock()
            .unwrap()
            .clone()
            .unwrap();
        assert_eq!(request["jti"], "tok-1");
        assert_eq!(request["email"], EMAIL);
    }

    #[tokio::test]
    async fn audience_mismatch_is_rejected() {
        let (validator, _portal, keys, _temp_dir) = setup().await;
        let token = mint_token(
            &keys,
            &minimal_claims("another-app", EMAIL, "tok-1", Duration::from_secs(300)),
        );

        let result = validator.validate(&token).await;
        assert!(matches!(result, Err(AuthError::InvalidAudience)));
    }

    #[tokio::test]
    async fn audience_match_is_case_sensitive() {
        let (validator, portal, keys, _temp_dir) = setup().await;
        let token = mint_token(
            &keys,
            &minimal_claims("Test-App", EMAIL, "tok-1", Duration::from_secs(300)),
        );

        let result = validator.validate(&token).await;
        assert!(matches!(result, Err(AuthError::InvalidAudience)));
        // Phase 2 never runs on a phase-1 failure.
        assert_eq!(portal.session_calls(), 0);
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let (validator, _portal, keys, _temp_dir) = setup().await;
        let mut claims = minimal_claims(AUDIENCE, EMAIL, "tok-1", Duration::from_secs(300));
        claims["iat"] = serde_json::json!(crate::auth::testutil::now() - 600);
        claims["exp"] = serde_json::json!(crate::auth::testutil::now() - 300);
        let token = mint_token(&keys, &claims);

        let result = validator.validate(&token).await;
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[tokio::test]
    async fn malformed_token_is_rejected() {
        let (validator, _portal, _keys, _temp_dir) = setup().await;
        let result = validator.validate("not.a.jwt").await;
        assert!(matches!(result, Err(AuthError::MalformedToken)));
    }

    #[tokio::test]
    async fn foreign_signature_fails_after_one_forced_refetch() {
        let (validator, portal, _keys, _temp_dir) = setup().await;
        let foreign = generate_keys();
        let token = mint_token(
            &foreign,
            &minimal_claims(AUDIENCE, EMAIL, "tok-1", Duration::from_secs(300)),
        );

        let result = validator.validate(&token).await;
        assert!(matches!(result, Err(AuthError::InvalidSignature)));
        // Initial fetch plus exactly one forced refresh.
        assert_eq!(portal.key_fetches(), 2);
    }

    #[tokio::test]
    async fn key_rotation_recovers_via_forced_refetch() {
        let (validator, portal, keys, _temp_dir) = setup().await;

        // Warm the cache with the old key.
        let old_token = mint_token(
            &keys,
            &minimal_claims(AUDIENCE, EMAIL, "tok-1", Duration::from_secs(300)),
        );
        validator.validate(&old_token).await.unwrap();
        assert_eq!(portal.key_fetches(), 1);

        // Portal rotates; a token signed with the new key arrives.
        let rotated = generate_keys();
        portal.set_public_key(&rotated.public_pem);
        let new_token = mint_token(
            &rotated,
            &minimal_claims(AUDIENCE, EMAIL, "tok-2", Duration::from_secs(300)),
        );

        let session = validator
            .validate(&new_token)
            .await
            .expect("rotation should recover");
        assert_eq!(session.data.email, EMAIL);
        assert_eq!(portal.key_fetches(), 2);
    }

    #[tokio::test]
    async fn session_data_rejection_fails_whole_validation() {
        let (validator, portal, keys, _temp_dir) = setup().await;
        portal.set_session_reply(SessionReply::Status(503));
        let token = mint_token(
            &keys,
            &minimal_claims(AUDIENCE, EMAIL, "tok-1", Duration::from_secs(300)),
        );

        let result = validator.validate(&token).await;
        assert!(matches!(result, Err(AuthError::RemoteRejected(503))));
    }

    #[tokio::test]
    async fn malformed_session_data_fails_whole_validation() {
        let (validator, portal, keys, _temp_dir) = setup().await;
        portal.set_session_reply(SessionReply::Data(serde_json::json!({
            "email": EMAIL
            // name missing
        })));
        let token = mint_token(
            &keys,
            &minimal_claims(AUDIENCE, EMAIL, "tok-1", Duration::from_secs(300)),
        );

        let result = validator.validate(&token).await;
        assert!(matches!(result, Err(AuthError::RemoteRejected(_))));
    }

    #[tokio::test]
    async fn unreachable_session_endpoint_is_remote_unavailable() {
        let keys = generate_keys();
        let portal = StubPortal::spawn(&keys, EMAIL).await;
        let (storage, temp_dir) = temp_storage();

        // Key comes from the warm disk cache; the session-data endpoint
        // points at a dead port.
        storage
            .write_raw(storage.paths().public_key(), keys.public_pem.as_bytes())
            .unwrap();
        let mut config = portal_config(
            &portal.base_url,
            AUDIENCE,
            &temp_dir.path().display().to_string(),
        );
        config.portal_internal_url = "http://127.0.0.1:1".to_string();

        let manager = Arc::new(PublicKeyManager::new(&config, storage));
        let validator = TokenValidator::new(&config, manager);
        let token = mint_token(
            &keys,
            &minimal_claims(AUDIENCE, EMAIL, "tok-1", Duration::from_secs(300)),
        );

        let result = validator.validate(&token).await;
        assert!(matches!(result, Err(AuthError::RemoteUnavailable(_))));
    }

    #[tokio::test]
    async fn refresh_returns_new_token() {
        let (validator, portal, _keys, _temp_dir) = setup().await;
        portal.set_refresh_token(Some("renewed-token".to_string()));

        let token = validator.refresh("old-token").await.unwrap();
        assert_eq!(token, "renewed-token");
        assert_eq!(portal.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn refresh_rejection_is_remote_rejected() {
        let (validator, portal, _keys, _temp_dir) = setup().await;
        portal.set_refresh_token(None);

        let result = validator.refresh("old-token").await;
        assert!(matches!(result, Err(AuthError::RemoteRejected(401))));
    }
}
