//! The four consumers attached to every scan run.
//!
//! * [`DiscoveredCounter`] adds up batch sizes from the discovery stream.
//! * [`HashedCounter`] counts completed hashes.
//! * [`LastHashedTracker`] remembers the path of the latest completed hash.
//! * [`PersistenceForwarder`] hands each hashed record to a single writer
//!   thread, which is the only place the store is written during a scan.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use super::hub::{ScanEvent, Subscriber};
use crate::progress::ProgressSnapshot;
use crate::scanner::FileRecord;
use crate::signal::CancelToken;
use crate::store::FileStore;

/// Running total of discovered files.
#[derive(Debug, Default)]
pub struct DiscoveredCounter {
    count: AtomicU64,
}

impl DiscoveredCounter {
    /// Current total.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Subscriber for DiscoveredCounter {
    fn on_event(&self, event: &ScanEvent) {
        if let ScanEvent::Discovered(n) = event {
            self.count.fetch_add(*n as u64, Ordering::SeqCst);
        }
    }
}

/// Running total of completed hashes.
#[derive(Debug, Default)]
pub struct HashedCounter {
    count: AtomicU64,
}

impl HashedCounter {
    /// Current total.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Subscriber for HashedCounter {
    fn on_event(&self, event: &ScanEvent) {
        if let ScanEvent::Hashed(_) = event {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Path of the most recently completed hash.
#[derive(Debug, Default)]
pub struct LastHashedTracker {
    last: Mutex<Option<PathBuf>>,
}

impl LastHashedTracker {
    /// Latest path, if any hash has completed.
    #[must_use]
    pub fn get(&self) -> Option<PathBuf> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Subscriber for LastHashedTracker {
    fn on_event(&self, event: &ScanEvent) {
        if let ScanEvent::Hashed(record) = event {
            *self.last.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(record.path.clone());
        }
    }
}

/// Read-only view over the three progress consumers.
#[derive(Debug, Clone, Default)]
pub struct ProgressBoard {
    pub(crate) discovered: Arc<DiscoveredCounter>,
    pub(crate) hashed: Arc<HashedCounter>,
    pub(crate) last: Arc<LastHashedTracker>,
}

impl ProgressBoard {
    /// Create a board with fresh zeroed consumers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact current values.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            files_discovered: self.discovered.get(),
            files_hashed: self.hashed.get(),
            last_hashed_path: self.last.get(),
        }
    }
}

/// Records allowed to wait for the store writer before hashing blocks.
pub const WRITER_QUEUE_CAPACITY: usize = 1024;

/// Outcome of the persistence writer thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Records written to the store
    pub written: u64,
    /// Records the store rejected
    pub failed: u64,
    /// Records still queued when cancellation was observed
    pub dropped: u64,
}

/// Forwards hashed records to the dedicated writer thread.
#[derive(Debug)]
pub struct PersistenceForwarder {
    tx: Mutex<Option<SyncSender<FileRecord>>>,
}

impl PersistenceForwarder {
    /// Start the writer thread for `store` and return its forwarder.
    ///
    /// The writer processes records strictly one at a time in arrival order.
    /// At most `capacity` records wait for it; publishers block beyond that.
    /// It stops writing as soon as `cancel` fires; queued records are dropped.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the writer thread cannot be created.
    pub fn spawn(
        store: Arc<dyn FileStore>,
        cancel: CancelToken,
        capacity: usize,
    ) -> std::io::Result<(Self, JoinHandle<WriterStats>)> {
        let (tx, rx) = mpsc::sync_channel::<FileRecord>(capacity.max(1));

        let handle = thread::Builder::new()
            .name("store-writer".to_string())
            .spawn(move || {
                let mut stats = WriterStats::default();
                for record in rx.iter() {
                    if cancel.is_cancelled() {
                        stats.dropped += 1 + rx.try_iter().count() as u64;
                        log::debug!("Store writer: cancelled, dropped {} records", stats.dropped);
                        break;
                    }
                    match store.add_file(&record) {
                        Ok(()) => stats.written += 1,
                        Err(e) => {
                            stats.failed += 1;
                            log::warn!("Failed to store {}: {}", record.path.display(), e);
                        }
                    }
                }
                stats
            })?;

        Ok((
            Self {
                tx: Mutex::new(Some(tx)),
            },
            handle,
        ))
    }
}

impl Subscriber for PersistenceForwarder {
    fn on_event(&self, event: &ScanEvent) {
        if let ScanEvent::Hashed(record) = event {
            // Clone out so a full queue blocks only this publisher.
            let tx = self
                .tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(tx) = tx {
                if tx.send(record.clone()).is_err() {
                    log::debug!("Store writer gone, dropping {}", record.path.display());
                }
            }
        }
    }

    fn on_complete(&self) {
        // Closing the channel lets the writer drain and exit.
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreResult};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Condvar;
    use std::time::Duration;

    fn hashed(path: &str) -> ScanEvent {
        ScanEvent::Hashed(FileRecord::hashed(PathBuf::from(path), [7; 32]))
    }

    #[test]
    fn test_counters_only_count_their_events() {
        let discovered = DiscoveredCounter::default();
        let hashed_count = HashedCounter::default();

        for event in [ScanEvent::Discovered(4), hashed("/a"), ScanEvent::Discovered(2)] {
            discovered.on_event(&event);
            hashed_count.on_event(&event);
        }

        assert_eq!(discovered.get(), 6);
        assert_eq!(hashed_count.get(), 1);
    }

    #[test]
    fn test_last_hashed_overwrites() {
        let tracker = LastHashedTracker::default();
        assert!(tracker.get().is_none());

        tracker.on_event(&hashed("/a"));
        tracker.on_event(&ScanEvent::Discovered(9));
        tracker.on_event(&hashed("/b"));

        assert_eq!(tracker.get(), Some(PathBuf::from("/b")));
    }

    #[test]
    fn test_board_snapshot_reads_all_consumers() {
        let board = ProgressBoard::new();
        board.discovered.on_event(&ScanEvent::Discovered(3));
        board.hashed.on_event(&hashed("/x"));
        board.last.on_event(&hashed("/x"));

        let snapshot = board.snapshot();
        assert_eq!(snapshot.files_discovered, 3);
        assert_eq!(snapshot.files_hashed, 1);
        assert_eq!(snapshot.last_hashed_path, Some(PathBuf::from("/x")));
    }

    #[test]
    fn test_forwarder_writes_in_order() {
        let store = Arc::new(MemoryStore::new());
        let (forwarder, handle) =
            PersistenceForwarder::spawn(store.clone(), CancelToken::new(), 8).unwrap();

        forwarder.on_event(&hashed("/1"));
        forwarder.on_event(&ScanEvent::Discovered(5));
        forwarder.on_event(&hashed("/2"));
        forwarder.on_complete();

        let stats = handle.join().unwrap();
        assert_eq!(stats.written, 2);
        assert_eq!(stats.failed, 0);

        let paths: Vec<_> = store
            .read_all_files()
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(paths, vec![PathBuf::from("/1"), PathBuf::from("/2")]);
    }

    #[test]
    fn test_forwarder_stops_writing_after_cancel() {
        let store = Arc::new(MemoryStore::new());
        let token = CancelToken::new();
        token.cancel();
        let (forwarder, handle) = PersistenceForwarder::spawn(store.clone(), token, 8).unwrap();

        forwarder.on_event(&hashed("/1"));
        forwarder.on_complete();

        let stats = handle.join().unwrap();
        assert_eq!(stats.written, 0);
        assert_eq!(stats.dropped, 1);
        assert!(store.read_all_files().unwrap().is_empty());
    }

    /// Store whose writes wait until `open` is called.
    #[derive(Default)]
    struct GatedStore {
        inner: MemoryStore,
        opened: Mutex<bool>,
        changed: Condvar,
    }

    impl GatedStore {
        fn open(&self) {
            *self.opened.lock().unwrap() = true;
            self.changed.notify_all();
        }
    }

    impl FileStore for GatedStore {
        fn clear_files(&self) -> StoreResult<()> {
            self.inner.clear_files()
        }
        fn add_file(&self, record: &FileRecord) -> StoreResult<()> {
            let mut opened = self.opened.lock().unwrap();
            while !*opened {
                opened = self.changed.wait(opened).unwrap();
            }
            drop(opened);
            self.inner.add_file(record)
        }
        fn read_all_files(&self) -> StoreResult<Vec<FileRecord>> {
            self.inner.read_all_files()
        }
        fn add_directory(&self, path: &Path) -> StoreResult<()> {
            self.inner.add_directory(path)
        }
        fn remove_directory(&self, path: &Path) -> StoreResult<()> {
            self.inner.remove_directory(path)
        }
        fn read_all_directories(&self) -> StoreResult<Vec<PathBuf>> {
            self.inner.read_all_directories()
        }
    }

    #[test]
    fn test_forwarder_queue_is_bounded() {
        let store = Arc::new(GatedStore::default());
        let (forwarder, handle) =
            PersistenceForwarder::spawn(store.clone(), CancelToken::new(), 2).unwrap();
        let forwarder = Arc::new(forwarder);
        let sent = Arc::new(AtomicUsize::new(0));

        let publisher = {
            let forwarder = Arc::clone(&forwarder);
            let sent = Arc::clone(&sent);
            thread::spawn(move || {
                for i in 0..10 {
                    forwarder.on_event(&hashed(&format!("/{}", i)));
                    sent.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        thread::sleep(Duration::from_millis(100));
        // One record held by the blocked writer plus two queued.
        assert!(sent.load(Ordering::SeqCst) <= 3);

        store.open();
        publisher.join().unwrap();
        forwarder.on_complete();

        let stats = handle.join().unwrap();
        assert_eq!(stats.written, 10);
        assert_eq!(store.read_all_files().unwrap().len(), 10);
    }
}
