//! # Storage Module
//!
//! Durable CSV recording of acquired samples.
//!
//! This module handles:
//! - The [`Storage`] collaborator interface (mount probe, open/write/close)
//! - A directory-backed implementation for host use ([`FsStorage`])
//! - The recording sink and its session lifecycle ([`recorder`])
//!
//! Every row is written with its own open-append/write/close cycle, so an
//! interrupted process loses at most the row in flight.

pub mod recorder;

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{MonitorError, Result};

/// How [`Storage::open`] treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create; fails if the file already exists.
    CreateNew,
    /// Create or append.
    Append,
}

/// Storage collaborator.
///
/// Each call is assumed atomic; none may block longer than a sample period.
pub trait Storage {
    /// Open file resource.
    type Handle;

    /// Mounts the medium. Probed once at startup.
    fn mount(&mut self) -> bool;

    /// `true` if the medium is present and writable.
    fn card_present(&self) -> bool;

    /// `true` if `path` already exists.
    fn exists(&self, path: &str) -> bool;

    /// Opens `path` (relative to the storage root).
    fn open(&mut self, path: &str, mode: OpenMode) -> Result<Self::Handle>;

    /// Writes `text` followed by a newline.
    fn write_line(&mut self, handle: &mut Self::Handle, text: &str) -> Result<()>;

    /// Flushes and releases the handle.
    fn close(&mut self, handle: Self::Handle) -> Result<()>;
}

/// [`Storage`] rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Creates storage rooted at `root`; nothing is touched until `mount`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Storage for FsStorage {
    type Handle = File;

    fn mount(&mut self) -> bool {
        match fs::create_dir_all(&self.root) {
            Ok(()) => {
                debug!("Mounted storage at {}", self.root.display());
                true
            }
            Err(e) => {
                warn!("Failed to mount storage at {}: {}", self.root.display(), e);
                false
            }
        }
    }

    fn card_present(&self) -> bool {
        fs::metadata(&self.root)
            .map(|meta| meta.is_dir() && !meta.permissions().readonly())
            .unwrap_or(false)
    }

    fn exists(&self, path: &str) -> bool {
        self.root.join(path).exists()
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<File> {
        let full_path = self.root.join(path);
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::CreateNew => options.write(true).create_new(true),
            OpenMode::Append => options.append(true).create(true),
        };

        options.open(&full_path).map_err(|e| {
            MonitorError::Storage(format!("Failed to open {}: {}", full_path.display(), e))
        })
    }

    fn write_line(&mut self, handle: &mut File, text: &str) -> Result<()> {
        writeln!(handle, "{}", text)
            .map_err(|e| MonitorError::Storage(format!("Failed to write line: {}", e)))
    }

    fn close(&mut self, mut handle: File) -> Result<()> {
        handle
            .flush()
            .map_err(|e| MonitorError::Storage(format!("Failed to close file: {}", e)))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_storage_mount_creates_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("recordings");
        let mut storage = FsStorage::new(&root);

        assert!(!storage.card_present());
        assert!(storage.mount());
        assert!(storage.card_present());
        assert_eq!(storage.root(), root.as_path());
    }

    #[test]
    fn test_fs_storage_write_then_append() {
        let dir = TempDir::new().unwrap();
        let mut storage = FsStorage::new(dir.path());
        assert!(storage.mount());

        let mut handle = storage.open("log.csv", OpenMode::CreateNew).unwrap();
        storage.write_line(&mut handle, "header").unwrap();
        storage.close(handle).unwrap();

        let mut handle = storage.open("log.csv", OpenMode::Append).unwrap();
        storage.write_line(&mut handle, "row").unwrap();
        storage.close(handle).unwrap();

        let contents = fs::read_to_string(dir.path().join("log.csv")).unwrap();
        assert_eq!(contents, "header\nrow\n");
    }

    #[test]
    fn test_fs_storage_create_new_never_truncates() {
        let dir = TempDir::new().unwrap();
        let mut storage = FsStorage::new(dir.path());
        assert!(storage.mount());
        assert!(!storage.exists("log.csv"));

        let mut handle = storage.open("log.csv", OpenMode::CreateNew).unwrap();
        storage.write_line(&mut handle, "first").unwrap();
        storage.close(handle).unwrap();
        assert!(storage.exists("log.csv"));

        match storage.open("log.csv", OpenMode::CreateNew) {
            Err(MonitorError::Storage(msg)) => assert!(msg.contains("Failed to open")),
            other => panic!("Expected Storage error, got: {:?}", other),
        }

        let contents = fs::read_to_string(dir.path().join("log.csv")).unwrap();
        assert_eq!(contents, "first\n");
    }

    #[test]
    fn test_fs_storage_open_in_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let mut storage = FsStorage::new(dir.path().join("not-mounted"));

        match storage.open("log.csv", OpenMode::Append) {
            Err(MonitorError::Storage(msg)) => assert!(msg.contains("Failed to open")),
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }
}
