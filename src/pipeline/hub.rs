//! Broadcast hub that fans every scan event out to all subscribers.
//!
//! Events are delivered synchronously to each subscription in turn, with no
//! per-subscriber queue. Each [`Subscription`] owns its own cancellation
//! check: once its token fires it stops delivering and never resumes, even
//! if other subscriptions are still active.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::scanner::FileRecord;
use crate::signal::CancelToken;

/// One event on the scan stream.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A walker delivered a batch of this many files.
    Discovered(usize),
    /// A file finished hashing.
    Hashed(FileRecord),
}

/// A consumer attached to the hub.
pub trait Subscriber: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &ScanEvent);

    /// The stream has ended. Called at most once.
    fn on_complete(&self) {}
}

/// A subscriber plus its own liveness and cancellation state.
pub struct Subscription {
    name: &'static str,
    subscriber: Arc<dyn Subscriber>,
    cancel: CancelToken,
    active: AtomicBool,
}

impl Subscription {
    fn new(name: &'static str, subscriber: Arc<dyn Subscriber>, cancel: CancelToken) -> Self {
        Self {
            name,
            subscriber,
            cancel,
            active: AtomicBool::new(true),
        }
    }

    /// Whether this subscription still receives events.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn deliver(&self, event: &ScanEvent) {
        if !self.is_active() {
            return;
        }
        if self.cancel.is_cancelled() {
            if self.active.swap(false, Ordering::SeqCst) {
                log::debug!("Subscription '{}' stopped by cancellation", self.name);
            }
            return;
        }
        self.subscriber.on_event(event);
    }

    fn complete(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.subscriber.on_complete();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Multicast hub for [`ScanEvent`]s.
///
/// Subscriptions are fixed before publishing starts, so publishing from many
/// threads at once needs no locking in the hub itself.
#[derive(Debug, Default)]
pub struct Hub {
    subscriptions: Vec<Subscription>,
    completed: AtomicBool,
}

impl Hub {
    /// Create a hub with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a subscriber whose delivery stops once `cancel` fires.
    pub fn subscribe(
        &mut self,
        name: &'static str,
        subscriber: Arc<dyn Subscriber>,
        cancel: CancelToken,
    ) {
        self.subscriptions
            .push(Subscription::new(name, subscriber, cancel));
    }

    /// Number of attached subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether the hub has no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Deliver `event` to every active subscription.
    pub fn publish(&self, event: &ScanEvent) {
        if self.completed.load(Ordering::SeqCst) {
            return;
        }
        for subscription in &self.subscriptions {
            subscription.deliver(event);
        }
    }

    /// End the stream for every subscription. Later calls are no-ops.
    pub fn complete(&self) {
        if self.completed.swap(true, Ordering::SeqCst) {
            return;
        }
        for subscription in &self.subscriptions {
            subscription.complete();
        }
    }
}
