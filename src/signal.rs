//! Cooperative cancellation and Ctrl+C handling.
//!
//! A [`CancelToken`] wraps an `AtomicBool` that is shared by every part of a
//! scan run: the walkers check it before entering each directory, the hasher
//! checks it before each chunk read, and every pipeline subscription checks it
//! before handling an event.
//!
//! The first Ctrl+C cancels the active scan. A second one, while that scan
//! is still winding down, exits the process with code 130.
//!
//! # Usage
//!
//! ```rust
//! use dupetree::signal::CancelToken;
//!
//! let token = CancelToken::new();
//! let worker_view = token.clone();
//!
//! token.cancel();
//! assert!(worker_view.is_cancelled());
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Shared cancellation signal for one scan run.
///
/// Clones observe the same flag. Cancellation is one-way for the lifetime
/// of a run; a new run gets a fresh token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

/// Exit code used when a second interrupt forces the process down.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Token the process-wide Ctrl+C handler cancels. Swapped per scan.
static ACTIVE_TOKEN: OnceLock<Mutex<Option<CancelToken>>> = OnceLock::new();

fn active_slot() -> &'static Mutex<Option<CancelToken>> {
    ACTIVE_TOKEN.get_or_init(|| Mutex::new(None))
}

/// Install the Ctrl+C handler once per process and route it to `token`.
///
/// Later calls only swap the token the handler cancels, so every scan can
/// register its own token without re-installing the hook.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] when the OS hook cannot be
/// registered and no handler from an earlier call exists.
pub fn cancel_on_interrupt(token: &CancelToken) -> Result<(), SignalError> {
    let first_install = {
        let mut slot = active_slot()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let first = slot.is_none();
        *slot = Some(token.clone());
        first
    };

    if !first_install {
        return Ok(());
    }

    match ctrlc::set_handler(|| {
        let force = {
            let slot = active_slot()
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            interrupt(slot.as_ref())
        };

        if force {
            let _ = writeln!(std::io::stderr(), "\nInterrupted again. Exiting.");
            let _ = std::io::stderr().flush();
            std::process::exit(FORCED_EXIT_CODE);
        }

        let _ = writeln!(
            std::io::stderr(),
            "\nInterrupted. Stopping scan... (Ctrl+C again to exit now)"
        );
        let _ = std::io::stderr().flush();

        log::info!("Interrupt received, cancelling active scan");
    }) {
        Ok(()) => Ok(()),
        Err(ctrlc::Error::MultipleHandlers) => {
            // Another component owns the hook; manual cancel() still works.
            log::debug!("Ctrl+C handler already registered, token is cancel-only");
            Ok(())
        }
        Err(e) => Err(SignalError::InstallFailed(e)),
    }
}

/// Cancel `token` for an interrupt. Returns `true` when it was already
/// cancelled, meaning the process should exit immediately.
fn interrupt(token: Option<&CancelToken>) -> bool {
    match token {
        Some(token) if token.is_cancelled() => true,
        Some(token) => {
            token.cancel();
            false
        }
        None => false,
    }
}
