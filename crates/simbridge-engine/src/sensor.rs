//! Per-sensor sample buffering and frame-aligned release.
//!
//! Simulator callbacks push samples from arbitrary threads; the update
//! pass pulls the samples that belong to the frame being published.
//!
//! - **Unsynchronized:** [`SensorSync::on_sample`] forwards immediately,
//!   behind a non-blocking activity guard. A sample arriving while the
//!   previous one is still being forwarded is dropped.
//! - **Synchronized:** samples go into an unbounded channel.
//!   [`SensorSync::drain`] releases them:
//!   - event sensors release every sample with `frame <= requested`, in
//!     arrival order;
//!   - regular sensors release the newest sample at or before the
//!     requested frame, discarding older ones, and block (bounded,
//!     interruptible) only while the sampling deadline says a sample is
//!     due.
//!
//! Samples tagged with a later frame stay buffered for a later drain.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use simbridge_core::{FrameId, SensorSample, SensorType};

use crate::shutdown::Shutdown;

/// Samples released by one drain. Regular sensors release at most one.
pub type Released = SmallVec<[SensorSample; 1]>;

/// Buffer and delivery policy for one mirrored sensor.
pub struct SensorSync {
    sensor_type: SensorType,
    synchronous: bool,
    sensor_tick: Option<f64>,
    tx: Sender<SensorSample>,
    rx: Receiver<SensorSample>,
    /// Samples pulled from the channel but held back for a later frame.
    /// Always older than anything still in the channel.
    held: Mutex<VecDeque<SensorSample>>,
    next_expected: Mutex<Option<f64>>,
    guard: Mutex<()>,
    closed: AtomicBool,
}

impl SensorSync {
    /// A synchronizer for a sensor of `sensor_type`.
    ///
    /// `sensor_tick` is the declared sampling period in seconds; `None`
    /// (or non-positive) means the sensor samples every frame.
    pub fn new(sensor_type: SensorType, synchronous: bool, sensor_tick: Option<f64>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            sensor_type,
            synchronous,
            sensor_tick: sensor_tick.filter(|t| t.is_finite() && *t > 0.0),
            tx,
            rx,
            held: Mutex::new(VecDeque::new()),
            next_expected: Mutex::new(None),
            guard: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// The sensor's type.
    pub fn sensor_type(&self) -> SensorType {
        self.sensor_type
    }

    /// Callback entry point.
    ///
    /// In unsynchronized mode `forward` runs on the calling thread; in
    /// synchronized mode the sample is buffered and `forward` is unused.
    pub fn on_sample(&self, sample: SensorSample, forward: impl FnOnce(SensorSample)) {
        if self.synchronous {
            let _active = self.guard.lock();
            if self.closed.load(Ordering::Acquire) {
                return;
            }
            if let Some(tick) = self.sensor_tick {
                *self.next_expected.lock() = Some(sample.timestamp + tick);
            }
            // The receiver lives in `self`, so the channel cannot be disconnected.
            let _ = self.tx.send(sample);
        } else {
            let Some(_active) = self.guard.try_lock() else {
                trace!(frame = %sample.frame, "sensor busy, sample dropped");
                return;
            };
            if self.closed.load(Ordering::Acquire) {
                return;
            }
            forward(sample);
        }
    }

    /// Release the samples belonging to `frame`.
    pub fn drain(
        &self,
        frame: FrameId,
        timestamp: f64,
        timeout: Duration,
        shutdown: &Shutdown,
    ) -> Released {
        if self.sensor_type.is_event() {
            self.drain_event(frame)
        } else {
            self.drain_regular(frame, timestamp, timeout, shutdown)
                .into_iter()
                .collect()
        }
    }

    fn drain_event(&self, frame: FrameId) -> Released {
        let mut held = self.held.lock();
        let mut later = VecDeque::new();
        let mut released = Released::new();
        while let Some(sample) = held.pop_front().or_else(|| self.rx.try_recv().ok()) {
            if sample.frame > frame {
                later.push_back(sample);
            } else {
                released.push(sample);
            }
        }
        *held = later;
        released
    }

    fn drain_regular(
        &self,
        frame: FrameId,
        timestamp: f64,
        timeout: Duration,
        shutdown: &Shutdown,
    ) -> Option<SensorSample> {
        let mut held = self.held.lock();
        let mut candidate: Option<SensorSample> = None;
        loop {
            let next = match held.pop_front().or_else(|| self.rx.try_recv().ok()) {
                Some(sample) => sample,
                None => {
                    if !self.sample_due(timestamp) {
                        break;
                    }
                    match self.wait_for_sample(timeout, shutdown) {
                        Some(sample) => sample,
                        None => break,
                    }
                }
            };
            if next.frame > frame {
                held.push_front(next);
                break;
            }
            let exact = next.frame == frame;
            if let Some(stale) = candidate.replace(next) {
                trace!(frame = %stale.frame, requested = %frame, "stale sample discarded");
            }
            if exact {
                break;
            }
        }
        candidate
    }

    /// Whether it is legitimate to block for another sample at `timestamp`.
    fn sample_due(&self, timestamp: f64) -> bool {
        match *self.next_expected.lock() {
            None => true,
            Some(deadline) => deadline <= timestamp,
        }
    }

    fn wait_for_sample(&self, timeout: Duration, shutdown: &Shutdown) -> Option<SensorSample> {
        if shutdown.is_triggered() {
            return None;
        }
        select! {
            recv(self.rx) -> msg => msg.ok(),
            recv(shutdown.receiver()) -> _ => None,
            default(timeout) => None,
        }
    }

    /// Stop accepting samples, waiting out an in-flight callback.
    pub fn close(&self) {
        let _active = self.guard.lock();
        self.closed.store(true, Ordering::Release);
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Samples currently buffered.
    pub fn buffered(&self) -> usize {
        self.held.lock().len() + self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn sample(frame: u64) -> SensorSample {
        SensorSample::new(FrameId(frame), frame as f64 * 0.05, vec![frame as u8])
    }

    fn feed(sync: &SensorSync, frames: &[u64]) {
        for f in frames {
            sync.on_sample(sample(*f), |_| unreachable!("synchronous mode buffers"));
        }
    }

    fn frames(released: &Released) -> Vec<u64> {
        released.iter().map(|s| s.frame.0).collect()
    }

    #[test]
    fn regular_drain_releases_newest_at_or_before() {
        let sync = SensorSync::new(SensorType::RgbCamera, true, None);
        feed(&sync, &[3, 4, 6]);
        let start = Instant::now();
        let out = sync.drain(FrameId(5), 0.25, Duration::from_secs(1), &Shutdown::new());
        assert_eq!(frames(&out), vec![4]);
        assert!(start.elapsed() < Duration::from_millis(500));
        // Frame 6 stays buffered for the next drain.
        assert_eq!(sync.buffered(), 1);
        let next = sync.drain(FrameId(6), 0.3, Duration::from_secs(1), &Shutdown::new());
        assert_eq!(frames(&next), vec![6]);
    }

    #[test]
    fn regular_drain_stops_at_exact_match() {
        let sync = SensorSync::new(SensorType::Lidar, true, None);
        feed(&sync, &[4, 5, 5]);
        let out = sync.drain(FrameId(5), 0.25, Duration::from_secs(1), &Shutdown::new());
        assert_eq!(frames(&out), vec![5]);
        assert_eq!(sync.buffered(), 1);
    }

    #[test]
    fn regular_drain_times_out_with_nothing_buffered() {
        let sync = SensorSync::new(SensorType::Lidar, true, None);
        let start = Instant::now();
        let out = sync.drain(FrameId(5), 0.25, Duration::from_millis(30), &Shutdown::new());
        assert!(out.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn regular_drain_delivers_stale_candidate_after_timeout() {
        let sync = SensorSync::new(SensorType::Lidar, true, None);
        feed(&sync, &[3]);
        let out = sync.drain(FrameId(5), 0.25, Duration::from_millis(20), &Shutdown::new());
        assert_eq!(frames(&out), vec![3]);
    }

    #[test]
    fn regular_drain_does_not_block_before_deadline() {
        let sync = SensorSync::new(SensorType::RgbCamera, true, Some(1.0));
        feed(&sync, &[1]); // timestamp 0.05, next expected at 1.05
        let _ = sync.drain(FrameId(1), 0.05, Duration::from_secs(1), &Shutdown::new());
        let start = Instant::now();
        let out = sync.drain(FrameId(2), 0.10, Duration::from_secs(5), &Shutdown::new());
        assert!(out.is_empty());
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn regular_drain_wakes_for_late_sample() {
        let sync = Arc::new(SensorSync::new(SensorType::RgbCamera, true, None));
        let producer = Arc::clone(&sync);
        let h = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.on_sample(sample(7), |_| {});
        });
        let out = sync.drain(FrameId(7), 0.35, Duration::from_secs(5), &Shutdown::new());
        h.join().unwrap();
        assert_eq!(frames(&out), vec![7]);
    }

    #[test]
    fn shutdown_interrupts_blocked_drain() {
        let sync = Arc::new(SensorSync::new(SensorType::RgbCamera, true, None));
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        let start = Instant::now();
        let h = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            trigger.trigger();
        });
        let out = sync.drain(FrameId(1), 0.05, Duration::from_secs(10), &shutdown);
        h.join().unwrap();
        assert!(out.is_empty());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn event_drain_releases_all_in_order() {
        let sync = SensorSync::new(SensorType::Collision, true, None);
        for (i, f) in [5u64, 5, 5].iter().enumerate() {
            let mut s = sample(*f);
            s.payload = vec![i as u8];
            sync.on_sample(s, |_| {});
        }
        let out = sync.drain(FrameId(5), 0.25, Duration::from_secs(1), &Shutdown::new());
        let payloads: Vec<u8> = out.iter().map(|s| s.payload[0]).collect();
        assert_eq!(payloads, vec![0, 1, 2]);
        assert_eq!(sync.buffered(), 0);
    }

    #[test]
    fn event_drain_keeps_later_frames() {
        let sync = SensorSync::new(SensorType::LaneInvasion, true, None);
        feed(&sync, &[4, 6, 5]);
        let out = sync.drain(FrameId(5), 0.25, Duration::from_secs(1), &Shutdown::new());
        assert_eq!(frames(&out), vec![4, 5]);
        assert_eq!(sync.buffered(), 1);
    }

    #[test]
    fn unsynchronized_forwards_immediately() {
        let sync = SensorSync::new(SensorType::Gnss, false, None);
        let mut got = Vec::new();
        sync.on_sample(sample(2), |s| got.push(s.frame));
        assert_eq!(got, vec![FrameId(2)]);
        assert_eq!(sync.buffered(), 0);
    }

    #[test]
    fn unsynchronized_drops_reentrant_sample() {
        let sync = SensorSync::new(SensorType::Gnss, false, None);
        let mut inner_forwarded = false;
        sync.on_sample(sample(1), |_| {
            sync.on_sample(sample(2), |_| inner_forwarded = true);
        });
        assert!(!inner_forwarded);
    }

    #[test]
    fn closed_sensor_ignores_samples() {
        let sync = SensorSync::new(SensorType::RgbCamera, true, None);
        sync.close();
        feed(&sync, &[1, 2]);
        assert!(sync.is_closed());
        assert_eq!(sync.buffered(), 0);
    }
}
