//! Fixtures shared by the integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dupetree::pipeline::{ScanOptions, ScanState};
use dupetree::progress::{ProgressObserver, ProgressSnapshot};

/// Write `content` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Small, fast options for tests.
pub fn test_options() -> ScanOptions {
    ScanOptions::default()
        .with_io_threads(2)
        .with_sample_interval(Duration::from_millis(1))
}

/// Records every state and progress callback.
#[derive(Default)]
pub struct Recorder {
    pub states: Mutex<Vec<ScanState>>,
    pub snapshots: Mutex<Vec<ProgressSnapshot>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn states(&self) -> Vec<ScanState> {
        self.states.lock().unwrap().clone()
    }
}

impl ProgressObserver for Recorder {
    fn on_state(&self, state: ScanState) {
        self.states.lock().unwrap().push(state);
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }
}
