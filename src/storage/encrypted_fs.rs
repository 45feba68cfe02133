// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Encrypted filesystem operations using Gramine's transparent encryption.
//!
//! ## Security Note
//!
//! This module uses **standard filesystem I/O**. Gramine handles encryption
//! transparently for all files under the data root (mounted as
//! `type = "encrypted"`).
//!
//! **DO NOT**:
//! - Implement any crypto operations in this module
//! - Access SGX key devices (`/dev/attestation/keys/*`)
//!
//! The Rust application treats the data root as a normal filesystem; Gramine
//! ensures confidentiality, integrity, and tamper resistance.
//!
//! All writes go through a temp-file-then-rename sequence so a concurrent
//! reader never observes a partially written file. The public key cache in
//! particular is read by every cold validation.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use super::StoragePaths;

/// Error type for encrypted storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Storage not initialized")]
    NotInitialized,
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Encrypted storage manager using Gramine's transparent encryption.
///
/// All operations use standard filesystem I/O. Gramine handles encryption
/// for files under the data mount point.
#[derive(Debug, Clone)]
pub struct EncryptedStorage {
    paths: StoragePaths,
    initialized: bool,
}

impl EncryptedStorage {
    /// Create a new EncryptedStorage instance.
    ///
    /// Does NOT initialize the directory structure. Call `initialize()` first.
    pub fn new(paths: StoragePaths) -> Self {
        Self {
            paths,
            initialized: false,
        }
    }

    /// Get the storage paths.
    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Initialize the encrypted storage directory structure.
    ///
    /// Safe to call multiple times (idempotent).
    pub fn initialize(&mut self) -> StorageResult<()> {
        fs::create_dir_all(self.paths.root())?;
        fs::create_dir_all(self.paths.sessions_dir())?;
        self.initialized = true;
        Ok(())
    }

    /// Check if the encrypted filesystem is available and working.
    ///
    /// This performs a write-read-delete test to verify the filesystem
    /// is properly mounted and encryption is working.
    pub fn health_check(&self) -> StorageResult<()> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }

        let test_file = self.paths.root().join(".health_check");
        let test_data = b"health_check_data";

        fs::write(&test_file, test_data)?;
        let read_data = fs::read(&test_file)?;
        fs::remove_file(&test_file)?;

        if read_data != test_data {
            return Err(StorageError::IntegrityViolation(
                "Health check data mismatch".to_string(),
            ));
        }

        Ok(())
    }

    /// Read a JSON file and deserialize it.
    pub fn read_json<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> StorageResult<T> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }

        let file = File::open(path.as_ref()).map_err(|e| self.map_open_error(e, path.as_ref()))?;
        let reader = BufReader::new(file);
        let value = serde_json::from_reader(reader)?;
        Ok(value)
    }

    /// Write a JSON file (atomic write via rename).
    pub fn write_json<T: Serialize>(&self, path: impl AsRef<Path>, value: &T) -> StorageResult<()> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }

        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }

        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Write raw bytes to a file (atomic write via rename).
    pub fn write_raw(&self, path: impl AsRef<Path>, data: &[u8]) -> StorageResult<()> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }

        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(data)?;
            file.flush()?;
        }

        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Read raw bytes from a file.
    pub fn read_raw(&self, path: impl AsRef<Path>) -> StorageResult<Vec<u8>> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }

        let mut file = File::open(path.as_ref()).map_err(|e| self.map_open_error(e, path.as_ref()))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Check if a file exists.
    ///
    /// Uses `File::open()` instead of `Path::exists()` because Gramine's
    /// encrypted filesystem can fail `stat()` calls on encrypted files
    /// while `open()` + `read()` works correctly.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        File::open(path.as_ref()).is_ok()
    }

    /// Modification time of a file, if it exists.
    pub fn mtime(&self, path: impl AsRef<Path>) -> Option<std::time::SystemTime> {
        fs::metadata(path.as_ref()).and_then(|m| m.modified()).ok()
    }

    /// Delete a file. Deleting a file that does not exist is not an error.
    pub fn delete(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }
        match fs::remove_file(path.as_ref()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn map_open_error(&self, e: io::Error, path: &Path) -> StorageError {
        if e.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound(path.display().to_string())
        } else {
            StorageError::Io(e)
        }
    }
}
