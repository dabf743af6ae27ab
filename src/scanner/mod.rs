//! Scanner module for directory traversal and file hashing.
//!
//! This module provides:
//! - Batched, cancellable directory walking using jwalk
//! - Streaming BLAKE3 content hashing with a fixed-size chunk buffer
//! - The [`FileRecord`] produced for every successfully hashed file
//!
//! # Architecture
//!
//! - [`walker`]: Directory traversal, one batch of file paths per directory
//! - [`hasher`]: Chunked BLAKE3 hashing that honours a [`CancelToken`]
//!
//! # Example
//!
//! ```no_run
//! use dupetree::scanner::{Hasher, Walker};
//! use dupetree::signal::CancelToken;
//! use std::path::Path;
//!
//! let token = CancelToken::new();
//! let hasher = Hasher::new();
//!
//! for batch in Walker::new(Path::new(".")).walk(token.clone()) {
//!     for path in batch {
//!         match hasher.hash_file(&path, &token) {
//!             Ok(hash) => println!("{} {}", dupetree::scanner::hash_to_hex(&hash), path.display()),
//!             Err(e) => eprintln!("skipped: {}", e),
//!         }
//!     }
//! }
//! ```
//!
//! [`CancelToken`]: crate::signal::CancelToken

pub mod hasher;
pub mod walker;

use std::path::{Path, PathBuf};

pub use hasher::{hash_to_hex, hex_to_hash, Hash, Hasher, DEFAULT_CHUNK_SIZE};
pub use walker::{FileBatch, WalkBatches, Walker};

/// A scanned file and its content digest.
///
/// Identity is the absolute path. Records are created by the scan pipeline
/// after a successful hash and are never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Base name of the file
    pub name: String,
    /// Extension without the leading dot, empty if there is none
    pub extension: String,
    /// BLAKE3 digest of the content, `None` until hashed
    pub content_hash: Option<Hash>,
}

impl FileRecord {
    /// Create a record for a path that has not been hashed yet.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            path,
            name,
            extension,
            content_hash: None,
        }
    }

    /// Create a record for a file whose content has been hashed.
    #[must_use]
    pub fn hashed(path: PathBuf, hash: Hash) -> Self {
        Self {
            content_hash: Some(hash),
            ..Self::new(path)
        }
    }

    /// Hex rendering of the content hash, if present.
    #[must_use]
    pub fn hash_hex(&self) -> Option<String> {
        self.content_hash.as_ref().map(hash_to_hex)
    }

    /// The record's path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Errors that can occur during file hashing.
///
/// Every variant means "this file is skipped"; none of them abort a scan.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The run was cancelled before the digest was finalised.
    #[error("Hashing cancelled: {0}")]
    Cancelled(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    /// Classify an I/O error raised while hashing `path`.
    pub(crate) fn from_io(path: &Path, error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Whether this error reports cancellation rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
