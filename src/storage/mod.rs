// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Encrypted Storage Module
//!
//! This module provides persistent storage using **Gramine encrypted files**.
//! All data is stored under `DATA_DIR` (default `/data`) which is mounted as
//! an encrypted filesystem in the Gramine manifest.
//!
//! ## Security Model
//!
//! - Files are encrypted on the host filesystem
//! - Files are transparently decrypted inside the enclave
//! - Encryption keys are derived by Gramine (bound to enclave identity)
//! - Files cannot be read outside the enclave
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   portal_public.pem     # Cached portal public key
//!   sessions/
//!     {session_id}.json   # Persisted session token (revalidated on restore)
//! ```
//!
//! ## Important Notes
//!
//! - This module uses **normal filesystem I/O**
//! - Gramine handles all encryption/decryption transparently
//! - DO NOT implement any crypto in Rust for storage

pub mod encrypted_fs;
pub mod paths;

pub use encrypted_fs::{EncryptedStorage, StorageError, StorageResult};
pub use paths::StoragePaths;
