//! Throttled progress delivery.
//!
//! The sampler reads the exact counters on a fixed cadence and forwards a
//! snapshot to observers only when it differs from the last one delivered.
//! On stop it delivers the final values once more if they changed.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::observers::ProgressBoard;
use crate::progress::{ProgressObserver, ProgressSnapshot};

/// Default sampling cadence.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(20);

/// Handle to a running sampler thread.
#[derive(Debug)]
pub struct Sampler {
    stop: Sender<()>,
    handle: JoinHandle<ProgressSnapshot>,
}

impl Sampler {
    /// Start sampling `board` every `interval` for `observers`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the sampler thread cannot be created.
    pub fn spawn(
        board: ProgressBoard,
        observers: Vec<Arc<dyn ProgressObserver>>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (stop, stop_rx) = mpsc::channel::<()>();
        let interval = interval.max(Duration::from_millis(1));

        let handle = thread::Builder::new()
            .name("progress-sampler".to_string())
            .spawn(move || {
                let mut last = ProgressSnapshot::default();
                loop {
                    let stopping = match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => false,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
                    };

                    let current = board.snapshot();
                    if current != last {
                        for observer in &observers {
                            observer.on_progress(&current);
                        }
                        last = current;
                    }

                    if stopping {
                        return last;
                    }
                }
            })?;

        Ok(Self { stop, handle })
    }

    /// Stop sampling and return the last snapshot delivered.
    pub fn finish(self) -> ProgressSnapshot {
        let _ = self.stop.send(());
        self.handle.join().unwrap_or_else(|_| {
            log::warn!("Progress sampler panicked");
            ProgressSnapshot::default()
        })
    }
}
