// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Plain filesystem operations on the data directory.
//!
//! Statement files are encrypted by [`crate::crypto`] before they reach
//! disk; this module only manages layout, appends, and reads.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::StoragePaths;

/// Error type for data directory operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error during file operations
    Io(io::Error),
    /// JSON serialization/deserialization error
    Json(serde_json::Error),
    /// Entity not found
    NotFound(String),
    /// Storage not initialized
    NotInitialized,
    /// Integrity violation (file contents unreadable or mismatched)
    IntegrityViolation(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "I/O error: {e}"),
            StorageError::Json(e) => write!(f, "JSON error: {e}"),
            StorageError::NotFound(entity) => write!(f, "Not found: {entity}"),
            StorageError::NotInitialized => write!(f, "Storage not initialized"),
            StorageError::IntegrityViolation(msg) => write!(f, "Integrity violation: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            StorageError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Json(e)
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Manager for the data directory.
#[derive(Debug, Clone)]
pub struct DataStore {
    paths: StoragePaths,
    initialized: bool,
}

impl DataStore {
    /// Create a new DataStore instance.
    ///
    /// Does NOT create the directory structure. Call `initialize()` first.
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

    /// Create the directory structure. Idempotent.
    pub fn initialize(&mut self) -> StorageResult<()> {
        for dir in [self.paths.statements_dir(), self.paths.audit_dir()] {
            fs::create_dir_all(&dir)?;
        }

        self.initialized = true;
        Ok(())
    }

    /// Write-read-delete probe of the data directory.
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

    /// Append one line to a file, creating it (and its parents) if needed.
    ///
    /// The line and its newline go out in a single write.
    pub fn append_line(&self, path: impl AsRef<Path>, line: &[u8]) -> StorageResult<()> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let mut record = Vec::with_capacity(line.len() + 2);
        // Terminate a partial record left by an interrupted write.
        if file.metadata()?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                record.push(b'\n');
            }
        }
        record.extend_from_slice(line);
        record.push(b'\n');

        file.write_all(&record)?;
        file.flush()?;
        Ok(())
    }

    /// Read raw bytes from a file.
    pub fn read_raw(&self, path: impl AsRef<Path>) -> StorageResult<Vec<u8>> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }

        let mut file = File::open(path.as_ref())?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// List subdirectory names, sorted.
    pub fn list_dirs(&self, dir: impl AsRef<Path>) -> StorageResult<Vec<String>> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }

        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_storage() -> (TempDir, DataStore) {
        let temp = TempDir::new().unwrap();
        let mut storage = DataStore::new(StoragePaths::new(temp.path()));
        storage.initialize().expect("Failed to initialize test storage");
        (temp, storage)
    }

    #[test]
    fn initialize_creates_directories() {
        let (_temp, storage) = test_storage();
        assert!(storage.paths().statements_dir().is_dir());
        assert!(storage.paths().audit_dir().is_dir());
    }

    #[test]
    fn health_check_works() {
        let (_temp, storage) = test_storage();
        storage.health_check().expect("Health check should pass");
        assert!(!storage.paths().root().join(".health_check").exists());
    }

    #[test]
    fn append_line_accumulates() {
        let (_temp, storage) = test_storage();
        let path = storage.paths().audit_events_file("2026-01-01");

        storage.append_line(&path, b"first").unwrap();
        storage.append_line(&path, b"second").unwrap();

        assert_eq!(storage.read_raw(&path).unwrap(), b"first\nsecond\n");
    }

    #[test]
    fn append_line_terminates_partial_record() {
        let (_temp, storage) = test_storage();
        let path = storage.paths().audit_events_file("2026-01-01");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"first\npart").unwrap();

        storage.append_line(&path, b"second").unwrap();

        assert_eq!(storage.read_raw(&path).unwrap(), b"first\npart\nsecond\n");
    }

    #[test]
    fn list_dirs_returns_sorted_names() {
        let (_temp, storage) = test_storage();
        for date in ["2026-01-03", "2026-01-01", "2026-01-02"] {
            fs::create_dir_all(storage.paths().audit_date_dir(date)).unwrap();
        }
        fs::write(storage.paths().audit_dir().join("stray.txt"), b"x").unwrap();

        let names = storage.list_dirs(storage.paths().audit_dir()).unwrap();
        assert_eq!(names, vec!["2026-01-01", "2026-01-02", "2026-01-03"]);
    }

    #[test]
    fn missing_file_maps_to_not_found() {
        let (_temp, storage) = test_storage();
        let result = storage.read_raw(storage.paths().root().join("absent"));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn uninitialized_storage_returns_error() {
        let storage = DataStore::new(StoragePaths::new("/tmp/never-init"));
        let result = storage.append_line("/tmp/never-init/x", b"line");
        assert!(matches!(result, Err(StorageError::NotInitialized)));
        assert!(matches!(storage.health_check(), Err(StorageError::NotInitialized)));
    }
}
