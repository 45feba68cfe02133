// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for encrypted storage layout.

use std::path::{Path, PathBuf};

/// Base directory for all encrypted persistent storage.
/// This MUST be mounted as `type = "encrypted"` in the Gramine manifest.
pub const DATA_ROOT: &str = "/data";

/// Storage path utilities for the encrypted filesystem.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all encrypted data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the cached portal public key (PEM).
    pub fn public_key(&self) -> PathBuf {
        self.root.join("portal_public.pem")
    }

    /// Directory containing persisted sessions.
    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Path to a specific persisted session file.
    pub fn session(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{session_id}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_use_data_root() {
        let paths = StoragePaths::default();
        assert_eq!(paths.root(), Path::new("/data"));
    }

    #[test]
    fn custom_root_for_testing() {
        let paths = StoragePaths::new("/tmp/test-data");
        assert_eq!(paths.root(), Path::new("/tmp/test-data"));
        assert_eq!(
            paths.session("abc-123"),
            PathBuf::from("/tmp/test-data/sessions/abc-123.json")
        );
    }

    #[test]
    fn public_key_path_is_correct() {
        let paths = StoragePaths::default();
        assert_eq!(paths.public_key(), PathBuf::from("/data/portal_public.pem"));
    }

    #[test]
    fn session_paths_are_correct() {
        let paths = StoragePaths::default();
        assert_eq!(paths.sessions_dir(), PathBuf::from("/data/sessions"));
        assert_eq!(
            paths.session("sid-1"),
            PathBuf::from("/data/sessions/sid-1.json")
        );
    }
}
