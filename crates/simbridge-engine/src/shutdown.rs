//! Cooperative cancellation shared by every loop and blocking wait.
//!
//! A [`Shutdown`] token pairs an `AtomicBool` (cheap polling at loop
//! boundaries) with a channel whose only sender is dropped on trigger.
//! A disconnected receiver is always ready, so blocking waits include
//! [`Shutdown::receiver`] in a `crossbeam_channel::select!` and wake up
//! the moment shutdown begins instead of running out their timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

struct Inner {
    flag: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

/// Cloneable cancellation token.
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    /// A token that has not been triggered.
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                flag: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
                signal: rx,
            }),
        }
    }

    /// Begin shutdown. Idempotent.
    pub fn trigger(&self) {
        self.inner.flag.store(true, Ordering::Release);
        self.inner.trigger.lock().take();
    }

    /// Whether shutdown has begun.
    pub fn is_triggered(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Receiver that becomes ready (disconnected) once triggered.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Sleep for up to `timeout`, returning early on shutdown.
    ///
    /// Returns `true` if shutdown was triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.inner.signal.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => true,
            _ => self.is_triggered(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}
