//! Persistence for scanned files and selected directories.
//!
//! The scan pipeline and the CLI only talk to the [`FileStore`] trait:
//!
//! * [`sqlite`]: the on-disk store used by the application, backed by SQLite.
//! * [`MemoryStore`]: a process-local store for tests and throwaway scans.
//!
//! Records are written one at a time; each write is a single statement, so a
//! cancelled scan never leaves a half-written record behind.

pub mod sqlite;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::scanner::FileRecord;

pub use sqlite::SqliteStore;

/// Errors returned by a [`FileStore`].
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The underlying database reported an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored hash could not be decoded.
    #[error("corrupt hash for {path}: {value:?}")]
    CorruptHash {
        /// Path of the affected record
        path: PathBuf,
        /// The stored value
        value: String,
    },

    /// Creating the database directory failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Key/record store for the two persisted record kinds.
///
/// Implementations need not be safe for concurrent writers: the pipeline
/// funnels every write through one dedicated thread.
pub trait FileStore: Send + Sync {
    /// Remove every scanned file record.
    fn clear_files(&self) -> StoreResult<()>;

    /// Insert one scanned file record, replacing any record with the same path.
    fn add_file(&self, record: &FileRecord) -> StoreResult<()>;

    /// Read every scanned file record in insertion order.
    fn read_all_files(&self) -> StoreResult<Vec<FileRecord>>;

    /// Remember a directory the user selected for scanning.
    fn add_directory(&self, path: &Path) -> StoreResult<()>;

    /// Forget a selected directory. Removing an unknown path is not an error.
    fn remove_directory(&self, path: &Path) -> StoreResult<()>;

    /// Read all selected directories.
    fn read_all_directories(&self) -> StoreResult<Vec<PathBuf>>;
}

/// In-memory [`FileStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<Vec<FileRecord>>,
    directories: Mutex<BTreeSet<PathBuf>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FileStore for MemoryStore {
    fn clear_files(&self) -> StoreResult<()> {
        lock(&self.files).clear();
        Ok(())
    }

    fn add_file(&self, record: &FileRecord) -> StoreResult<()> {
        let mut files = lock(&self.files);
        files.retain(|f| f.path != record.path);
        files.push(record.clone());
        Ok(())
    }

    fn read_all_files(&self) -> StoreResult<Vec<FileRecord>> {
        Ok(lock(&self.files).clone())
    }

    fn add_directory(&self, path: &Path) -> StoreResult<()> {
        lock(&self.directories).insert(path.to_path_buf());
        Ok(())
    }

    fn remove_directory(&self, path: &Path) -> StoreResult<()> {
        lock(&self.directories).remove(path);
        Ok(())
    }

    fn read_all_directories(&self) -> StoreResult<Vec<PathBuf>> {
        Ok(lock(&self.directories).iter().cloned().collect())
    }
}
