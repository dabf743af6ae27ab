//! SQLite-backed [`FileStore`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection};

use super::{FileStore, StoreError, StoreResult};
use crate::scanner::{hex_to_hash, FileRecord};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS files (
        path         TEXT PRIMARY KEY NOT NULL,
        name         TEXT NOT NULL,
        extension    TEXT NOT NULL,
        content_hash TEXT
    );
    CREATE TABLE IF NOT EXISTS selected_directories (
        path TEXT PRIMARY KEY NOT NULL
    );
";

/// Persistent store for scanned files and selected directories.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create the database at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the parent directory cannot be created and
    /// [`StoreError::Database`] if SQLite cannot open or migrate the file.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        log::debug!("Opening store at {}", path.display());
        Self::init(Connection::open(path)?)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the schema cannot be created.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        // Every record is its own commit.
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        log::trace!("Store journal mode: {}", mode);
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl FileStore for SqliteStore {
    fn clear_files(&self) -> StoreResult<()> {
        let removed = self.conn().execute("DELETE FROM files", [])?;
        log::debug!("Cleared {} file records", removed);
        Ok(())
    }

    fn add_file(&self, record: &FileRecord) -> StoreResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO files (path, name, extension, content_hash)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                path_text(&record.path),
                record.name,
                record.extension,
                record.hash_hex(),
            ],
        )?;
        Ok(())
    }

    fn read_all_files(&self) -> StoreResult<Vec<FileRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT path, name, extension, content_hash FROM files ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (path, name, extension, hash) = row?;
            let path = PathBuf::from(path);
            let content_hash = match hash {
                Some(hex) => Some(hex_to_hash(&hex).ok_or_else(|| StoreError::CorruptHash {
                    path: path.clone(),
                    value: hex.clone(),
                })?),
                None => None,
            };
            records.push(FileRecord {
                path,
                name,
                extension,
                content_hash,
            });
        }
        Ok(records)
    }

    fn add_directory(&self, path: &Path) -> StoreResult<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO selected_directories (path) VALUES (?1)",
            params![path_text(path)],
        )?;
        Ok(())
    }

    fn remove_directory(&self, path: &Path) -> StoreResult<()> {
        self.conn().execute(
            "DELETE FROM selected_directories WHERE path = ?1",
            params![path_text(path)],
        )?;
        Ok(())
    }

    fn read_all_directories(&self) -> StoreResult<Vec<PathBuf>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT path FROM selected_directories ORDER BY path")?;
        let dirs = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|r| r.map(PathBuf::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(dirs)
    }
}
