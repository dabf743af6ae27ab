//! Scan pipeline: clear the store, walk every root, hash what is found and
//! persist the results.
//!
//! # Overview
//!
//! A run moves through [`ScanState::Clearing`] and [`ScanState::Discovering`]
//! before ending in [`ScanState::Completed`] or [`ScanState::Canceled`]:
//!
//! 1. The persisted file set is cleared. If that fails nothing else happens
//!    and the run ends in [`ScanState::Failed`] with [`ScanError::Setup`].
//! 2. One [`Walker`] per root sends batches into a shared bounded channel.
//! 3. Every discovered path is hashed on a rayon pool sized by
//!    [`ScanOptions::io_threads`]. The number of admitted but unfinished
//!    hashes is capped so a huge tree cannot queue unbounded work.
//! 4. Discovery and hash events go through a [`Hub`] to four subscribers:
//!    two counters, the last-path tracker and the persistence forwarder.
//!    A [`Sampler`] forwards throttled snapshots to attached observers.
//!
//! Cancellation is cooperative and is reported as [`ScanOutcome::Canceled`],
//! never as an error.
//!
//! # Example
//!
//! ```no_run
//! use dupetree::pipeline::{ScanOptions, ScanPipeline};
//! use dupetree::signal::CancelToken;
//! use dupetree::store::MemoryStore;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! let pipeline = ScanPipeline::new(Arc::new(MemoryStore::new()), ScanOptions::default());
//! let outcome = pipeline
//!     .run(&[PathBuf::from("/home/user/Music")], &CancelToken::new())
//!     .unwrap();
//! println!("{} files hashed", outcome.stats().files_hashed);
//! ```

pub mod hub;
pub mod observers;
pub mod sampler;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use hub::{Hub, ScanEvent};
use observers::{PersistenceForwarder, ProgressBoard, WriterStats, WRITER_QUEUE_CAPACITY};
use sampler::{Sampler, DEFAULT_SAMPLE_INTERVAL};

use crate::progress::ProgressObserver;
use crate::scanner::walker::DEFAULT_CHANNEL_CAPACITY;
use crate::scanner::{FileBatch, FileRecord, Hasher, Walker, DEFAULT_CHUNK_SIZE};
use crate::signal::CancelToken;
use crate::store::{FileStore, StoreError};

/// Admitted hashes allowed to wait per worker thread.
const IN_FLIGHT_PER_THREAD: usize = 256;

/// How often a blocked admission re-checks for cancellation.
const ADMISSION_POLL: Duration = Duration::from_millis(50);

/// Lifecycle of a single scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    /// No run has started
    #[default]
    Idle,
    /// Removing the previous run's records
    Clearing,
    /// Walking and hashing
    Discovering,
    /// All roots exhausted
    Completed,
    /// Stopped by cancellation
    Canceled,
    /// Setup failed before discovery started
    Failed,
}

impl ScanState {
    /// Whether the run has ended.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Failed)
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Clearing => "clearing",
            Self::Discovering => "discovering",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Tuning knobs for a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Hash worker threads
    pub io_threads: usize,
    /// Hasher read size in bytes
    pub chunk_size: usize,
    /// Cadence of progress delivery to observers
    pub sample_interval: Duration,
    /// Capacity of the merged walker channel
    pub channel_capacity: usize,
    /// Hashed records allowed to wait for the store writer
    pub writer_capacity: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            io_threads: thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get),
            chunk_size: DEFAULT_CHUNK_SIZE,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            writer_capacity: WRITER_QUEUE_CAPACITY,
        }
    }
}

impl ScanOptions {
    /// Set the number of hash worker threads (minimum 1).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the hasher chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Set the progress sampling interval.
    #[must_use]
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Set the walker channel capacity (minimum 1).
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Set the store writer queue capacity (minimum 1).
    #[must_use]
    pub fn with_writer_capacity(mut self, capacity: usize) -> Self {
        self.writer_capacity = capacity.max(1);
        self
    }
}

/// Totals for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Files reported by walkers before cancellation
    pub files_discovered: u64,
    /// Files hashed before cancellation
    pub files_hashed: u64,
    /// Files skipped because hashing failed
    pub files_failed: u64,
    /// Records the store accepted
    pub records_written: u64,
    /// Records the store rejected
    pub write_failures: u64,
    /// Wall time of the run
    pub duration: Duration,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Every root was exhausted.
    Completed(ScanStats),
    /// Cancellation stopped the run.
    Canceled(ScanStats),
}

impl ScanOutcome {
    /// Totals regardless of how the run ended.
    #[must_use]
    pub fn stats(&self) -> &ScanStats {
        match self {
            Self::Completed(stats) | Self::Canceled(stats) => stats,
        }
    }

    /// Whether the run was cancelled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }
}

/// Errors that abort a scan run.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// The previous results could not be cleared.
    #[error("scan setup failed: {0}")]
    Setup(#[source] StoreError),

    /// The hash worker pool could not be created.
    #[error("failed to build hash worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// A pipeline thread could not be created.
    #[error("failed to start pipeline thread: {0}")]
    Io(#[from] std::io::Error),

    /// The scan thread panicked.
    #[error("scan thread panicked")]
    Panicked,
}

/// Caps the number of admitted but unfinished hashes.
struct Admission {
    in_flight: Mutex<usize>,
    released: Condvar,
    limit: usize,
}

impl Admission {
    fn new(limit: usize) -> Self {
        Self {
            in_flight: Mutex::new(0),
            released: Condvar::new(),
            limit: limit.max(1),
        }
    }

    /// Wait for a free slot. Returns `false` if cancelled while waiting.
    fn acquire(&self, cancel: &CancelToken) -> bool {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        while *in_flight >= self.limit {
            if cancel.is_cancelled() {
                return false;
            }
            in_flight = self
                .released
                .wait_timeout(in_flight, ADMISSION_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *in_flight += 1;
        true
    }

    fn release(&self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        *in_flight = in_flight.saturating_sub(1);
        self.released.notify_one();
    }
}

/// Orchestrates scan runs against a [`FileStore`].
///
/// Cloning is cheap; clones share the store, the observers and the state.
#[derive(Clone)]
pub struct ScanPipeline {
    store: Arc<dyn FileStore>,
    options: ScanOptions,
    hasher: Hasher,
    observers: Vec<Arc<dyn ProgressObserver>>,
    state: Arc<Mutex<ScanState>>,
}

impl fmt::Debug for ScanPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanPipeline")
            .field("options", &self.options)
            .field("observers", &self.observers.len())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ScanPipeline {
    /// Create a pipeline writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn FileStore>, options: ScanOptions) -> Self {
        let hasher = Hasher::new().with_chunk_size(options.chunk_size);
        Self {
            store,
            options,
            hasher,
            observers: Vec::new(),
            state: Arc::new(Mutex::new(ScanState::Idle)),
        }
    }

    /// Attach an observer for state changes and sampled progress.
    pub fn attach_observer(&mut self, observer: Arc<dyn ProgressObserver>) {
        self.observers.push(observer);
    }

    /// Builder form of [`ScanPipeline::attach_observer`].
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.attach_observer(observer);
        self
    }

    /// The options this pipeline was built with.
    #[must_use]
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Current state of the most recent run.
    #[must_use]
    pub fn state(&self) -> ScanState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ScanState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        log::debug!("Scan state: {}", state);
        for observer in &self.observers {
            observer.on_state(state);
        }
    }

    fn fail(&self, err: ScanError) -> ScanError {
        log::error!("Scan aborted: {}", err);
        self.set_state(ScanState::Failed);
        err
    }

    /// Run a scan over `roots` on the calling thread.
    ///
    /// Roots are made absolute and de-duplicated; a root that is not a
    /// directory is logged and skipped. Per-file failures never abort the run.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Setup`] if the previous results cannot be
    /// cleared, or [`ScanError::WorkerPool`] / [`ScanError::Io`] if the
    /// pipeline's threads cannot be started. Cancellation is not an error.
    pub fn run(&self, roots: &[PathBuf], cancel: &CancelToken) -> Result<ScanOutcome, ScanError> {
        let started = Instant::now();

        self.set_state(ScanState::Clearing);
        self.store
            .clear_files()
            .map_err(|e| self.fail(ScanError::Setup(e)))?;

        let roots = normalize_roots(roots);
        if cancel.is_cancelled() {
            log::info!("Scan canceled before discovery");
            self.set_state(ScanState::Canceled);
            return Ok(ScanOutcome::Canceled(ScanStats {
                duration: started.elapsed(),
                ..ScanStats::default()
            }));
        }

        self.set_state(ScanState::Discovering);
        log::info!(
            "Scanning {} root(s) with {} hash thread(s)",
            roots.len(),
            self.options.io_threads
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.io_threads.max(1))
            .thread_name(|i| format!("hash-{}", i))
            .build()
            .map_err(|e| self.fail(e.into()))?;

        let board = ProgressBoard::new();
        let (forwarder, writer) = PersistenceForwarder::spawn(
            Arc::clone(&self.store),
            cancel.clone(),
            self.options.writer_capacity,
        )
        .map_err(|e| self.fail(e.into()))?;

        let mut hub = Hub::new();
        hub.subscribe("discovered", board.discovered.clone(), cancel.clone());
        hub.subscribe("hashed", board.hashed.clone(), cancel.clone());
        hub.subscribe("last-hashed", board.last.clone(), cancel.clone());
        hub.subscribe("persistence", Arc::new(forwarder), cancel.clone());

        let sampler = match Sampler::spawn(
            board.clone(),
            self.observers.clone(),
            self.options.sample_interval,
        ) {
            Ok(sampler) => sampler,
            Err(e) => {
                hub.complete();
                join_writer(writer);
                return Err(self.fail(e.into()));
            }
        };

        let (tx, rx) = mpsc::sync_channel::<FileBatch>(self.options.channel_capacity);
        let walkers: Vec<JoinHandle<()>> = roots
            .iter()
            .filter_map(|root| {
                Walker::new(root)
                    .spawn(cancel.clone(), tx.clone())
                    .map_err(|e| log::warn!("Failed to start walker for {}: {}", root.display(), e))
                    .ok()
            })
            .collect();
        drop(tx);

        let failed = AtomicU64::new(0);
        let admission = Admission::new(self.options.io_threads * IN_FLIGHT_PER_THREAD);

        pool.in_place_scope(|scope| {
            for batch in rx {
                if cancel.is_cancelled() {
                    break;
                }
                hub.publish(&ScanEvent::Discovered(batch.len()));

                for path in batch {
                    if !admission.acquire(cancel) {
                        break;
                    }
                    let (hub, admission, failed) = (&hub, &admission, &failed);
                    let hasher = &self.hasher;
                    scope.spawn(move |_| {
                        hash_one(hasher, path, cancel, hub, failed);
                        admission.release();
                    });
                }
            }
        });

        for walker in walkers {
            if walker.join().is_err() {
                log::warn!("Walker thread panicked");
            }
        }

        hub.complete();
        let written = join_writer(writer);
        let snapshot = sampler.finish();

        let stats = ScanStats {
            files_discovered: board.discovered.get(),
            files_hashed: board.hashed.get(),
            files_failed: failed.load(Ordering::SeqCst),
            records_written: written.written,
            write_failures: written.failed,
            duration: started.elapsed(),
        };
        log::trace!("Final sampled progress: {:?}", snapshot);

        if cancel.is_cancelled() {
            log::info!(
                "Scan canceled: {} discovered, {} hashed, {} records kept",
                stats.files_discovered,
                stats.files_hashed,
                stats.records_written
            );
            self.set_state(ScanState::Canceled);
            Ok(ScanOutcome::Canceled(stats))
        } else {
            log::info!(
                "Scan completed in {:.2?}: {} discovered, {} hashed, {} failed",
                stats.duration,
                stats.files_discovered,
                stats.files_hashed,
                stats.files_failed
            );
            self.set_state(ScanState::Completed);
            Ok(ScanOutcome::Completed(stats))
        }
    }

    /// Run a scan on a dedicated thread with a fresh cancellation token.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Io`] if the scan thread cannot be created.
    pub fn start(&self, roots: Vec<PathBuf>) -> Result<ScanHandle, ScanError> {
        let cancel = CancelToken::new();
        let pipeline = self.clone();
        let token = cancel.clone();

        let handle = thread::Builder::new()
            .name("scan".to_string())
            .spawn(move || pipeline.run(&roots, &token))?;

        Ok(ScanHandle {
            cancel,
            state: Arc::clone(&self.state),
            handle,
        })
    }
}

/// Hash one file and publish the record, or count the failure.
fn hash_one(
    hasher: &Hasher,
    path: PathBuf,
    cancel: &CancelToken,
    hub: &Hub,
    failed: &AtomicU64,
) {
    match hasher.hash_file(&path, cancel) {
        Ok(hash) => {
            log::trace!("Hashed {}", path.display());
            hub.publish(&ScanEvent::Hashed(FileRecord::hashed(path, hash)));
        }
        Err(e) if e.is_cancelled() => {}
        Err(e) => {
            log::debug!("Skipping {}", e);
            failed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn join_writer(writer: JoinHandle<WriterStats>) -> WriterStats {
    writer.join().unwrap_or_else(|_| {
        log::warn!("Store writer panicked");
        WriterStats::default()
    })
}

/// Make roots absolute, drop duplicates and anything that is not a directory.
fn normalize_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(roots.len());

    for root in roots {
        let absolute = std::path::absolute(root).unwrap_or_else(|_| root.clone());
        if !is_dir(&absolute) {
            log::warn!("Skipping {}: not a directory", absolute.display());
            continue;
        }
        if seen.insert(absolute.clone()) {
            out.push(absolute);
        }
    }
    out
}

fn is_dir(path: &Path) -> bool {
    path.metadata().map(|m| m.is_dir()).unwrap_or(false)
}

/// Control handle for a scan started with [`ScanPipeline::start`].
#[derive(Debug)]
pub struct ScanHandle {
    cancel: CancelToken,
    state: Arc<Mutex<ScanState>>,
    handle: JoinHandle<Result<ScanOutcome, ScanError>>,
}

impl ScanHandle {
    /// Request cancellation. The run ends at its next check.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The token driving this run, for wiring into a signal handler.
    #[must_use]
    pub fn token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Whether the scan thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Current state of the run.
    #[must_use]
    pub fn state(&self) -> ScanState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the run to end.
    ///
    /// # Errors
    ///
    /// Returns the run's [`ScanError`], or [`ScanError::Panicked`] if the
    /// scan thread panicked.
    pub fn join(self) -> Result<ScanOutcome, ScanError> {
        self.handle.join().map_err(|_| ScanError::Panicked)?
    }
}
