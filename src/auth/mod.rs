// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Lazy SSO authentication against the identity portal.
//!
//! ## Auth Flow
//!
//! 1. The portal authenticates the user and redirects back to this
//!    application with a minimal JWT in a `token` URL parameter
//! 2. Phase 1: the token is verified locally (RS256 signature against the
//!    cached portal public key, exact audience, expiry)
//! 3. Phase 2: the full session payload (profile, permissions) is fetched
//!    from the portal's session-data endpoint keyed by `(jti, email)` --
//!    the token itself deliberately carries neither
//! 4. The session is stored per browser session and renewed in the
//!    background before the token expires
//!
//! ## Security
//!
//! - The portal public key is fetched over HTTPS and cached (memory + disk)
//! - A signature mismatch forces a key re-fetch before failing, covering
//!   portal key rotation
//! - Phase-2 failures fail the whole validation; local claims alone never
//!   authenticate a user
//! - Clock skew tolerance is zero; renewal happens well before expiry

pub mod claims;
pub mod error;
pub mod extractor;
pub mod keys;
pub mod middleware;
pub mod validator;

#[cfg(test)]
pub(crate) mod testutil;

pub use claims::{SessionData, ValidatedSession};
pub use error::AuthError;
pub use extractor::{CurrentUser, Scope};
pub use keys::PublicKeyManager;
pub use validator::TokenValidator;
