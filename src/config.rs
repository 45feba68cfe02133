// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup and injected into
//! the components that need it. No component reads environment variables at
//! request time.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `PORTAL_URL` | Public portal URL (login redirect target) | `https://portal.example.com` |
//! | `PORTAL_INTERNAL_URL` | Portal URL for internal API calls | value of `PORTAL_URL` |
//! | `APP_NAME` | Display name of this application | `Portal SSO Gateway` |
//! | `APP_AUDIENCE` | Registered audience identifier for token validation | `sso-gateway` |
//! | `BASE_PATH` | Path prefix behind the reverse proxy | `` (none) |
//! | `DATA_DIR` | Root directory for encrypted storage | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `TOKEN_REFRESH_MARGIN` | Seconds before expiry at which renewal starts | `60` |
//! | `TOKEN_REFRESH_RETRY` | Seconds between renewal retries after a failure | `30` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! The portal is reached via `PORTAL_INTERNAL_URL` for the public-key,
//! session-data, and refresh endpoints: internal traffic does not go through
//! the public reverse proxy.

use std::env;
use std::time::Duration;

/// Environment variable name for the encrypted data directory path.
///
/// The data directory holds the cached portal public key and persisted
/// sessions. It is mounted as an encrypted filesystem in production.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Timeout for fetching the portal public key.
///
/// Short so that a portal outage fails validation fast instead of stalling
/// every cold-cache request behind it.
pub const KEY_FETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Timeout for the session-data lazy-load call.
pub const SESSION_DATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for the token refresh call.
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Public portal URL, used as the login redirect target.
    pub portal_url: String,
    /// Portal URL for internal API calls (public key, session data, refresh).
    pub portal_internal_url: String,
    /// Display name of this application.
    pub app_name: String,
    /// Audience identifier this application is registered under. Tokens whose
    /// `aud` claim does not match this exactly are rejected.
    pub audience: String,
    /// Path prefix the reverse proxy serves this application under.
    pub base_path: String,
    /// Root directory for encrypted storage.
    pub data_dir: String,
    /// Renewal starts once remaining token lifetime drops below this.
    pub refresh_margin: Duration,
    /// Interval between renewal retries while the token is still valid.
    pub refresh_retry: Duration,
}

impl Config {
    /// Load configuration from the environment, applying defaults.
    pub fn from_env() -> Self {
        let portal_url = env::var("PORTAL_URL")
            .unwrap_or_else(|_| "https://portal.example.com".to_string());
        let portal_internal_url =
            env::var("PORTAL_INTERNAL_URL").unwrap_or_else(|_| portal_url.clone());

        Self {
            portal_url,
            portal_internal_url,
            app_name: env::var("APP_NAME").unwrap_or_else(|_| "Portal SSO Gateway".to_string()),
            audience: env::var("APP_AUDIENCE").unwrap_or_else(|_| "sso-gateway".to_string()),
            base_path: env::var("BASE_PATH").unwrap_or_default(),
            data_dir: env::var(DATA_DIR_ENV).unwrap_or_else(|_| "/data".to_string()),
            refresh_margin: Duration::from_secs(parse_secs("TOKEN_REFRESH_MARGIN", 60)),
            refresh_retry: Duration::from_secs(parse_secs("TOKEN_REFRESH_RETRY", 30)),
        }
    }

    /// Portal endpoint returning the PEM-encoded public key.
    pub fn public_key_endpoint(&self) -> String {
        format!("{}/internal/public-key", self.portal_internal_url)
    }

    /// Portal endpoint returning full session data for `{jti, email}`.
    pub fn session_data_endpoint(&self) -> String {
        format!("{}/internal/session-data", self.portal_internal_url)
    }

    /// Portal endpoint exchanging a current token for a renewed one.
    pub fn refresh_endpoint(&self) -> String {
        format!("{}/internal/refresh", self.portal_internal_url)
    }

    /// Portal login entry point, with an optional return-to address.
    pub fn login_url(&self, return_to: Option<&str>) -> String {
        match return_to {
            Some(next) => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(next.as_bytes()).collect();
                format!("{}/?next={}", self.portal_url, encoded)
            }
            None => format!("{}/", self.portal_url),
        }
    }
}

fn parse_secs(var: &str, default: u64) -> u64 {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            portal_url: "https://portal.example.com".to_string(),
            portal_internal_url: "http://10.0.0.5:9000".to_string(),
            app_name: "Test App".to_string(),
            audience: "test-app".to_string(),
            base_path: "/test-app".to_string(),
            data_dir: "/tmp/test-data".to_string(),
            refresh_margin: Duration::from_secs(60),
            refresh_retry: Duration::from_secs(30),
        }
    }

    #[test]
    fn endpoints_use_internal_url() {
        let config = test_config();
        assert_eq!(
            config.public_key_endpoint(),
            "http://10.0.0.5:9000/internal/public-key"
        );
        assert_eq!(
            config.session_data_endpoint(),
            "http://10.0.0.5:9000/internal/session-data"
        );
        assert_eq!(
            config.refresh_endpoint(),
            "http://10.0.0.5:9000/internal/refresh"
        );
    }

    #[test]
    fn login_url_uses_public_url() {
        let config = test_config();
        assert_eq!(config.login_url(None), "https://portal.example.com/");
    }

    #[test]
    fn login_url_encodes_return_to() {
        let config = test_config();
        assert_eq!(
            config.login_url(Some("/test-app/reports?id=1")),
            "https://portal.example.com/?next=%2Ftest-app%2Freports%3Fid%3D1"
        );
    }
}
