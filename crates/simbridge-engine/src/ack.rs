//! Per-step acknowledgement tracking for consumer-controlled vehicles.
//!
//! The step driver [`reset`](AckTracker::reset)s the expected set before
//! advancing the world, control readers [`acknowledge`](AckTracker::acknowledge)
//! from node callback threads, and the driver finally
//! [`wait`](AckTracker::wait)s (bounded, interruptible) until the set is
//! empty.

use std::collections::BTreeSet;
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::Mutex;
use tracing::warn;

use simbridge_core::ActorId;

use crate::shutdown::Shutdown;

/// Result of [`AckTracker::wait`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    /// Every expected id acknowledged.
    Complete,
    /// The timeout elapsed; these ids never acknowledged.
    TimedOut(BTreeSet<ActorId>),
    /// Shutdown began while waiting.
    Cancelled(BTreeSet<ActorId>),
}

/// The set of ids still awaited this step.
pub struct AckTracker {
    awaited: Mutex<BTreeSet<ActorId>>,
    notify_tx: Sender<()>,
    notify_rx: Receiver<()>,
}

impl AckTracker {
    /// A tracker awaiting nothing.
    pub fn new() -> Self {
        let (notify_tx, notify_rx) = crossbeam_channel::bounded(1);
        Self {
            awaited: Mutex::new(BTreeSet::new()),
            notify_tx,
            notify_rx,
        }
    }

    /// Start a new step expecting `ids`.
    pub fn reset(&self, ids: BTreeSet<ActorId>) {
        let mut awaited = self.awaited.lock();
        *awaited = ids;
        while self.notify_rx.try_recv().is_ok() {}
    }

    /// Record an acknowledgement from `id`.
    pub fn acknowledge(&self, id: ActorId) {
        let mut awaited = self.awaited.lock();
        if !awaited.remove(&id) {
            warn!(uid = %id, "unexpected acknowledgement");
            return;
        }
        if awaited.is_empty() {
            let _ = self.notify_tx.try_send(());
        }
    }

    /// Ids not yet acknowledged.
    pub fn missing(&self) -> BTreeSet<ActorId> {
        self.awaited.lock().clone()
    }

    /// Block until every expected id acknowledged, `timeout` elapsed, or
    /// shutdown began.
    pub fn wait(&self, timeout: Duration, shutdown: &Shutdown) -> AckOutcome {
        if self.awaited.lock().is_empty() {
            return AckOutcome::Complete;
        }
        select! {
            recv(self.notify_rx) -> _ => AckOutcome::Complete,
            recv(shutdown.receiver()) -> _ => AckOutcome::Cancelled(self.missing()),
            default(timeout) => {
                let missing = self.missing();
                if missing.is_empty() {
                    AckOutcome::Complete
                } else {
                    AckOutcome::TimedOut(missing)
                }
            }
        }
    }
}

impl Default for AckTracker {
    fn default() -> Self {
        Self::new()
    }
}
