//! BLAKE3 file hasher with streaming support.
//!
//! # Overview
//!
//! [`Hasher`] reads a file in fixed-size chunks into a buffer that is reused
//! by every file hashed on the same worker thread, feeding each chunk into an
//! incremental BLAKE3 state. Whole files are never loaded into memory.
//!
//! The cancellation token is checked before every read; a cancelled hash
//! reports [`HashError::Cancelled`] instead of a partial digest.

use std::cell::RefCell;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use super::HashError;
use crate::signal::CancelToken;

/// A 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Default chunk size: 256 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Smallest accepted chunk size.
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;

/// Largest accepted chunk size.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

thread_local! {
    static CHUNK_BUFFER: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

/// Streaming content hasher.
#[derive(Debug, Clone)]
pub struct Hasher {
    chunk_size: usize,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher with the default chunk size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the chunk size, clamped to `MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE`.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self
    }

    /// The configured chunk size in bytes.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Hash the full content of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Cancelled`] if `cancel` fires before the digest is
    /// final, and the matching I/O variant if the file cannot be opened or read.
    pub fn hash_file(&self, path: &Path, cancel: &CancelToken) -> Result<Hash, HashError> {
        CHUNK_BUFFER.with(|cell| match cell.try_borrow_mut() {
            Ok(mut buffer) => {
                if buffer.len() != self.chunk_size {
                    buffer.resize(self.chunk_size, 0);
                }
                self.hash_with_buffer(path, &mut buffer, cancel)
            }
            Err(_) => {
                let mut buffer = vec![0u8; self.chunk_size];
                self.hash_with_buffer(path, &mut buffer, cancel)
            }
        })
    }

    /// Hash `path` using a caller-provided chunk buffer.
    ///
    /// # Errors
    ///
    /// Same as [`Hasher::hash_file`].
    pub fn hash_with_buffer(
        &self,
        path: &Path,
        buffer: &mut [u8],
        cancel: &CancelToken,
    ) -> Result<Hash, HashError> {
        if cancel.is_cancelled() {
            return Err(HashError::Cancelled(path.to_path_buf()));
        }

        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        log::trace!("Hashing {}", path.display());
        digest_reader(file, path, buffer, cancel)
    }
}

/// Feed `reader` through BLAKE3 one buffer at a time, checking `cancel`
/// before every read.
fn digest_reader<R: Read>(
    mut reader: R,
    path: &Path,
    buffer: &mut [u8],
    cancel: &CancelToken,
) -> Result<Hash, HashError> {
    let mut state = blake3::Hasher::new();

    loop {
        if cancel.is_cancelled() {
            log::trace!("Abandoning hash of {}", path.display());
            return Err(HashError::Cancelled(path.to_path_buf()));
        }

        let read = match reader.read(buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(HashError::from_io(path, e)),
        };
        state.update(&buffer[..read]);
    }

    Ok(*state.finalize().as_bytes())
}

/// Render a hash as uppercase hexadecimal.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    use std::fmt::Write;

    hash.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{byte:02X}");
        out
    })
}

/// Parse a 64-character hexadecimal string back into a hash.
///
/// Accepts either case. Returns `None` for malformed input.
#[must_use]
pub fn hex_to_hash(hex: &str) -> Option<Hash> {
    if hex.len() != 64 || !hex.is_ascii() {
        return None;
    }

    let mut hash = [0u8; 32];
    for (i, byte) in hash.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(hash)
}
