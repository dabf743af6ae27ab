//! Directory walker that emits one batch of file paths per directory.
//!
//! # Overview
//!
//! [`Walker`] enumerates every regular file under a root. Directory reads
//! run on a rayon pool owned by that walker, so the caller never blocks on
//! filesystem I/O and a busy global pool cannot starve the walk. The
//! immediate files of each directory are cut into a
//! [`FileBatch`] inside jwalk's `process_read_dir` hook and sent over a
//! bounded channel, and the directory's subdirectories are descended
//! afterwards in no particular order.
//!
//! # Error tolerance
//!
//! A directory that cannot be listed (permission denied, deleted while the
//! walk is in progress) is logged at debug level and skipped. Its siblings
//! are still enumerated.
//!
//! # Cancellation
//!
//! The token is checked each time a directory's children are delivered.
//! Once cancelled, no further batches are sent and no subdirectory is
//! entered; the sequence simply ends.
//!
//! # Example
//!
//! ```no_run
//! use dupetree::scanner::Walker;
//! use dupetree::signal::CancelToken;
//! use std::path::Path;
//!
//! let batches = Walker::new(Path::new("/home/user/Pictures")).walk(CancelToken::new());
//! let total: usize = batches.map(|batch| batch.len()).sum();
//! println!("Found {} files", total);
//! ```

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use jwalk::{Parallelism, WalkDir};

use crate::signal::CancelToken;

/// Files found directly inside one directory.
pub type FileBatch = Vec<PathBuf>;

/// Default capacity of the batch channel between a walker and its consumer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Upper bound on the directory reader threads of one walker.
const MAX_READ_THREADS: usize = 8;

fn default_read_threads() -> usize {
    thread::available_parallelism()
        .map_or(2, std::num::NonZeroUsize::get)
        .min(MAX_READ_THREADS)
}

/// Recursive, batched directory walker for a single root.
#[derive(Debug, Clone)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Bounded channel capacity used by [`Walker::walk`]
    channel_capacity: usize,
    /// Directory reader threads in this walker's own pool
    read_threads: usize,
}

impl Walker {
    /// Create a walker for `root`.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            read_threads: default_read_threads(),
        }
    }

    /// Set the number of directory reader threads (minimum 1).
    #[must_use]
    pub fn with_read_threads(mut self, threads: usize) -> Self {
        self.read_threads = threads.max(1);
        self
    }

    /// Set the capacity of the batch channel used by [`Walker::walk`].
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// The root this walker enumerates.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk on a dedicated thread and return the batches as a lazy iterator.
    ///
    /// The iterator ends when the tree is exhausted or `cancel` fires. If the
    /// walker thread cannot be started the iterator is empty.
    #[must_use]
    pub fn walk(self, cancel: CancelToken) -> WalkBatches {
        let (tx, rx) = mpsc::sync_channel(self.channel_capacity);
        let root = self.root.clone();
        let handle = match self.spawn(cancel, tx) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("Failed to start walker for {}: {}", root.display(), e);
                None
            }
        };
        WalkBatches { rx, handle }
    }

    /// Walk on a dedicated thread, sending batches into a shared channel.
    ///
    /// Several walkers can share one sender; the receiver then sees the
    /// merged, unordered stream of all their batches. The channel closes
    /// once every walker holding a sender has finished.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the walker thread cannot be created.
    pub fn spawn(
        self,
        cancel: CancelToken,
        tx: SyncSender<FileBatch>,
    ) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("walker:{}", self.root.display()))
            .spawn(move || self.run(&cancel, &tx))
    }

    /// Drive the walk on the current thread until exhaustion or cancellation.
    fn run(&self, cancel: &CancelToken, tx: &SyncSender<FileBatch>) {
        log::debug!("Walker: starting at {}", self.root.display());

        let sender = tx.clone();
        let gate = cancel.clone();

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(false)
            .skip_hidden(false)
            .sort(false)
            .parallelism(Parallelism::RayonNewPool(self.read_threads))
            .process_read_dir(move |_depth, dir_path, _read_dir_state, children| {
                if gate.is_cancelled() {
                    // Dropping the children stops the walk from descending.
                    children.clear();
                    return;
                }

                let batch: FileBatch = children
                    .iter()
                    .filter_map(|child| child.as_ref().ok())
                    .filter(|entry| entry.file_type().is_file())
                    .map(|entry| entry.path())
                    .collect();

                log::trace!(
                    "Walker: {} files in {}",
                    batch.len(),
                    dir_path.display()
                );

                if !batch.is_empty() && sender.send(batch).is_err() {
                    // Receiver is gone, nobody wants the rest of the tree.
                    children.clear();
                }
            });

        for entry in walk_dir {
            if cancel.is_cancelled() {
                log::debug!("Walker: cancellation observed under {}", self.root.display());
                break;
            }

            if let Err(e) = entry {
                if e.is_busy() {
                    log::warn!("Walker: no reader thread for {}: {}", self.root.display(), e);
                    continue;
                }
                let path = e
                    .path()
                    .map_or_else(|| self.root.clone(), std::borrow::ToOwned::to_owned);
                log::debug!("Walker: skipping unreadable {}: {}", path.display(), e);
            }
        }

        log::debug!("Walker: finished {}", self.root.display());
    }
}

/// Lazy sequence of batches produced by a walker running on its own thread.
#[derive(Debug)]
pub struct WalkBatches {
    rx: Receiver<FileBatch>,
    handle: Option<JoinHandle<()>>,
}

impl Iterator for WalkBatches {
    type Item = FileBatch;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rx.recv() {
            Ok(batch) => Some(batch),
            Err(_) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        log::warn!("Walker thread panicked");
                    }
                }
                None
            }
        }
    }
}
