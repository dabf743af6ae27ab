use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dupetree::grouping::{DuplicateTree, EquivalenceKey, ViewSettings};
use dupetree::pipeline::{ScanError, ScanPipeline, ScanState};
use dupetree::progress::{ProgressObserver, ProgressSnapshot};
use dupetree::scanner::FileRecord;
use dupetree::signal::CancelToken;
use dupetree::store::{FileStore, MemoryStore, StoreError, StoreResult};
use tempfile::TempDir;

use super::common::{test_options, write_file, Recorder};

#[test]
fn test_same_content_different_names() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("a");
    let x = write_file(&root, "x.txt", "hi");
    write_file(&root, "b/y.txt", "hi");

    let store = Arc::new(MemoryStore::new());
    let outcome = ScanPipeline::new(store.clone(), test_options())
        .run(&[root], &CancelToken::new())
        .unwrap();
    assert_eq!(outcome.stats().files_hashed, 2);

    let files = store.read_all_files().unwrap();
    let mut tree = DuplicateTree::build(files, ViewSettings::new(EquivalenceKey::ByHash));
    let x_node = tree.find_file(&x).unwrap();
    assert_eq!(tree.duplicate_group(x_node).len(), 2);

    tree.apply(ViewSettings::new(EquivalenceKey::ByName));
    assert_eq!(tree.duplicate_group(x_node).len(), 1);
    assert!(!tree.node(x_node).unwrap().has_duplicates());
}

#[cfg(unix)]
#[test]
fn test_unreadable_subdirectory_does_not_stop_siblings() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "ok1.txt", "one");
    write_file(dir.path(), "ok2.txt", "two");
    let locked = dir.path().join("locked");
    fs::create_dir(&locked).unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    let store = Arc::new(MemoryStore::new());
    let result = ScanPipeline::new(store.clone(), test_options())
        .run(&[dir.path().to_path_buf()], &CancelToken::new());

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    let outcome = result.unwrap();
    assert!(!outcome.is_canceled());
    assert_eq!(outcome.stats().files_hashed, 2);
    assert_eq!(store.read_all_files().unwrap().len(), 2);
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_is_skipped_and_counted() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "ok.txt", "one");
    let secret = write_file(dir.path(), "secret.txt", "two");
    fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();
    // Root can read anything; the scenario only exists for other users.
    let readable_anyway = fs::File::open(&secret).is_ok();

    let store = Arc::new(MemoryStore::new());
    let outcome = ScanPipeline::new(store.clone(), test_options())
        .run(&[dir.path().to_path_buf()], &CancelToken::new())
        .unwrap();

    fs::set_permissions(&secret, fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(outcome.stats().files_discovered, 2);
    if readable_anyway {
        assert_eq!(outcome.stats().files_hashed, 2);
    } else {
        assert_eq!(outcome.stats().files_hashed, 1);
        assert_eq!(outcome.stats().files_failed, 1);
        let names: Vec<String> = store
            .read_all_files()
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["ok.txt".to_string()]);
    }
}

/// Cancels the token when the run enters discovery.
struct CancelOnDiscover(CancelToken);

impl ProgressObserver for CancelOnDiscover {
    fn on_state(&self, state: ScanState) {
        if state == ScanState::Discovering {
            self.0.cancel();
        }
    }

    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}
}

fn populate(root: &Path, dirs: usize, files_per_dir: usize) {
    for d in 0..dirs {
        for f in 0..files_per_dir {
            write_file(root, &format!("d{}/f{}.bin", d, f), &format!("{}-{}", d, f));
        }
    }
}

#[test]
fn test_cancel_right_after_start_is_an_outcome() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), 10, 20);

    let token = CancelToken::new();
    let store = Arc::new(MemoryStore::new());
    let recorder = Recorder::new();
    let pipeline = ScanPipeline::new(store.clone(), test_options())
        .with_observer(Arc::new(CancelOnDiscover(token.clone())))
        .with_observer(recorder.clone());

    let outcome = pipeline.run(&[dir.path().to_path_buf()], &token).unwrap();

    assert!(outcome.is_canceled());
    let stats = outcome.stats();
    assert!(stats.files_hashed <= stats.files_discovered);
    assert_eq!(
        recorder.states(),
        vec![
            ScanState::Clearing,
            ScanState::Discovering,
            ScanState::Canceled
        ]
    );
    assert!(store
        .read_all_files()
        .unwrap()
        .iter()
        .all(|r| r.content_hash.is_some()));
}

/// Cancels once a few hashes have been sampled.
struct CancelAfterHashes(CancelToken, u64);

impl ProgressObserver for CancelAfterHashes {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        if snapshot.files_hashed >= self.1 {
            self.0.cancel();
        }
    }
}

#[test]
fn test_cancel_mid_scan_keeps_only_hashed_records() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), 20, 50);

    let token = CancelToken::new();
    let store = Arc::new(MemoryStore::new());
    let pipeline = ScanPipeline::new(store.clone(), test_options().with_io_threads(1))
        .with_observer(Arc::new(CancelAfterHashes(token.clone(), 5)));

    let outcome = pipeline.run(&[dir.path().to_path_buf()], &token).unwrap();

    let stats = outcome.stats();
    assert!(stats.files_hashed <= stats.files_discovered);
    assert!(stats.records_written <= stats.files_hashed);

    let records = store.read_all_files().unwrap();
    assert_eq!(records.len() as u64, stats.records_written);
    assert!(records.iter().all(|r| r.content_hash.is_some()));
}

#[test]
fn test_handle_cancel_before_join() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), 5, 5);

    let pipeline = ScanPipeline::new(Arc::new(MemoryStore::new()), test_options());
    let handle = pipeline.start(vec![dir.path().to_path_buf()]).unwrap();
    handle.cancel();
    assert!(handle.token().is_cancelled());
    let outcome = handle.join().unwrap();

    let stats = outcome.stats();
    assert!(stats.files_hashed <= stats.files_discovered);
    assert!(pipeline.state().is_terminal());
}

/// Store whose clear always fails.
#[derive(Default)]
struct BrokenClear(MemoryStore);

impl FileStore for BrokenClear {
    fn clear_files(&self) -> StoreResult<()> {
        Err(StoreError::Io {
            path: PathBuf::from("/db"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
    fn add_file(&self, record: &FileRecord) -> StoreResult<()> {
        self.0.add_file(record)
    }
    fn read_all_files(&self) -> StoreResult<Vec<FileRecord>> {
        self.0.read_all_files()
    }
    fn add_directory(&self, path: &Path) -> StoreResult<()> {
        self.0.add_directory(path)
    }
    fn remove_directory(&self, path: &Path) -> StoreResult<()> {
        self.0.remove_directory(path)
    }
    fn read_all_directories(&self) -> StoreResult<Vec<PathBuf>> {
        self.0.read_all_directories()
    }
}

#[test]
fn test_clear_failure_is_a_setup_error() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", "x");

    let recorder = Recorder::new();
    let pipeline = ScanPipeline::new(Arc::new(BrokenClear::default()), test_options())
        .with_observer(recorder.clone());

    let err = pipeline
        .run(&[dir.path().to_path_buf()], &CancelToken::new())
        .unwrap_err();

    assert!(matches!(err, ScanError::Setup(_)));
    assert_eq!(pipeline.state(), ScanState::Failed);
    assert_eq!(
        recorder.states(),
        vec![ScanState::Clearing, ScanState::Failed]
    );
}

/// Store that rejects one particular file name.
#[derive(Default)]
struct RejectName(MemoryStore);

impl FileStore for RejectName {
    fn clear_files(&self) -> StoreResult<()> {
        self.0.clear_files()
    }
    fn add_file(&self, record: &FileRecord) -> StoreResult<()> {
        if record.name == "reject.txt" {
            return Err(StoreError::Io {
                path: record.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        self.0.add_file(record)
    }
    fn read_all_files(&self) -> StoreResult<Vec<FileRecord>> {
        self.0.read_all_files()
    }
    fn add_directory(&self, path: &Path) -> StoreResult<()> {
        self.0.add_directory(path)
    }
    fn remove_directory(&self, path: &Path) -> StoreResult<()> {
        self.0.remove_directory(path)
    }
    fn read_all_directories(&self) -> StoreResult<Vec<PathBuf>> {
        self.0.read_all_directories()
    }
}

#[test]
fn test_write_failure_does_not_abort_run() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "keep.txt", "1");
    write_file(dir.path(), "reject.txt", "2");

    let store = Arc::new(RejectName::default());
    let outcome = ScanPipeline::new(store.clone(), test_options())
        .run(&[dir.path().to_path_buf()], &CancelToken::new())
        .unwrap();

    assert!(!outcome.is_canceled());
    assert_eq!(outcome.stats().files_hashed, 2);
    assert_eq!(outcome.stats().records_written, 1);
    assert_eq!(outcome.stats().write_failures, 1);
    assert_eq!(store.read_all_files().unwrap().len(), 1);
}

#[test]
fn test_multiple_roots_are_merged() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    write_file(first.path(), "one/a.txt", "same");
    write_file(second.path(), "two/a.txt", "same");
    write_file(second.path(), "b.txt", "other");

    let store = Arc::new(MemoryStore::new());
    let recorder = Recorder::new();
    let outcome = ScanPipeline::new(store.clone(), test_options())
        .with_observer(recorder.clone())
        .run(
            &[first.path().to_path_buf(), second.path().to_path_buf()],
            &CancelToken::new(),
        )
        .unwrap();

    assert_eq!(outcome.stats().files_discovered, 3);
    assert_eq!(outcome.stats().files_hashed, 3);

    let last = recorder.snapshots.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.files_discovered, 3);
    assert_eq!(last.files_hashed, 3);
    assert!(last.last_hashed_path.is_some());

    let tree = DuplicateTree::build(
        store.read_all_files().unwrap(),
        ViewSettings::new(EquivalenceKey::ByNameAndHash),
    );
    let a = tree
        .find_file(&first.path().join("one").join("a.txt"))
        .unwrap();
    assert_eq!(tree.duplicate_group(a).len(), 2);
}

#[test]
fn test_progress_counts_are_monotonic() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), 8, 25);

    let recorder = Recorder::new();
    let outcome = ScanPipeline::new(Arc::new(MemoryStore::new()), test_options())
        .with_observer(recorder.clone())
        .run(&[dir.path().to_path_buf()], &CancelToken::new())
        .unwrap();

    let snapshots = recorder.snapshots.lock().unwrap();
    for pair in snapshots.windows(2) {
        assert!(pair[0].files_discovered <= pair[1].files_discovered);
        assert!(pair[0].files_hashed <= pair[1].files_hashed);
    }
    let last = snapshots.last().unwrap();
    assert_eq!(last.files_hashed, outcome.stats().files_hashed);
    assert_eq!(outcome.stats().files_hashed, 200);
}
