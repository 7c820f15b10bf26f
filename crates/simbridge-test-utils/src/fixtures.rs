//! Reusable translator fixture.
//!
//! [`RecordingTranslator`] logs every update and released sample, and can
//! be told to fail updates for chosen ids, or the next few samples, to
//! exercise error isolation.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use simbridge_core::{ActorId, ActorInfo, FrameId, SensorSample, Translator, UpdateError};

/// Records `on_update` / `on_sample` calls.
pub struct RecordingTranslator {
    updates: Mutex<Vec<(ActorId, FrameId)>>,
    samples: Mutex<Vec<(ActorId, SensorSample)>>,
    failing: Mutex<BTreeSet<ActorId>>,
    failing_samples: Mutex<usize>,
}

impl RecordingTranslator {
    pub fn new() -> Self {
        Self {
            updates: Mutex::new(Vec::new()),
            samples: Mutex::new(Vec::new()),
            failing: Mutex::new(BTreeSet::new()),
            failing_samples: Mutex::new(0),
        }
    }

    /// Make every subsequent update of `id` fail.
    pub fn fail_updates_for(&self, id: ActorId) {
        self.failing.lock().insert(id);
    }

    /// Reject the next `n` samples. Rejected samples are not recorded.
    pub fn fail_next_samples(&self, n: usize) {
        *self.failing_samples.lock() = n;
    }

    /// All `(uid, frame)` update calls, including failed ones.
    pub fn updates(&self) -> Vec<(ActorId, FrameId)> {
        self.updates.lock().clone()
    }

    /// Ids updated for `frame`, in call order.
    pub fn updated_at(&self, frame: FrameId) -> Vec<ActorId> {
        self.updates
            .lock()
            .iter()
            .filter(|(_, f)| *f == frame)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Samples released for `id`, in release order.
    pub fn samples_for(&self, id: ActorId) -> Vec<SensorSample> {
        self.samples
            .lock()
            .iter()
            .filter(|(uid, _)| *uid == id)
            .map(|(_, s)| s.clone())
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.updates.lock().clear();
        self.samples.lock().clear();
    }
}

impl Default for RecordingTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl Translator for RecordingTranslator {
    fn on_update(
        &self,
        actor: &ActorInfo,
        frame: FrameId,
        _timestamp: f64,
    ) -> Result<(), UpdateError> {
        self.updates.lock().push((actor.uid, frame));
        if self.failing.lock().contains(&actor.uid) {
            return Err(UpdateError::Translation {
                reason: format!("deliberate failure for {}", actor.uid),
            });
        }
        Ok(())
    }

    fn on_sample(&self, actor: &ActorInfo, sample: SensorSample) -> Result<(), UpdateError> {
        {
            let mut failing = self.failing_samples.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(UpdateError::Translation {
                    reason: format!("deliberate sample failure for {}", actor.uid),
                });
            }
        }
        self.samples.lock().push((actor.uid, sample));
        Ok(())
    }
}
