//! Bridge-level publishers: run status, simulation clock, map info.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use simbridge_core::{FrameId, Message, Node, NodeError, StatusMessage, World, Writer};

/// Topic carrying [`StatusMessage`]s.
pub const STATUS_TOPIC: &str = "/carla/status";
/// Topic carrying the simulation clock.
pub const CLOCK_TOPIC: &str = "/clock";
/// Topic carrying the map description.
pub const WORLD_INFO_TOPIC: &str = "/carla/world_info";
/// Topic carrying run-state commands.
pub const CONTROL_TOPIC: &str = "/carla/control";

fn publish(writer: &dyn Writer, topic: &str, msg: Message) {
    if let Err(e) = writer.write(msg) {
        warn!(%topic, error = %e, "publish failed");
    }
}

// ── StatusPublisher ──────────────────────────────────────────────

/// Publishes the bridge status on construction and on every change.
pub struct StatusPublisher {
    writer: Arc<dyn Writer>,
    state: Mutex<StatusMessage>,
}

impl StatusPublisher {
    /// Create the writer and publish the initial status.
    pub fn new(
        node: &dyn Node,
        synchronous_mode: bool,
        fixed_delta_seconds: f64,
    ) -> Result<Self, NodeError> {
        let writer = node.create_writer(STATUS_TOPIC, "CarlaStatus", 1)?;
        let state = StatusMessage {
            frame: FrameId(0),
            synchronous_mode,
            synchronous_mode_running: true,
            fixed_delta_seconds,
        };
        publish(&*writer, STATUS_TOPIC, Message::Status(state));
        Ok(Self {
            writer,
            state: Mutex::new(state),
        })
    }

    /// Record the latest frame, publishing if it changed.
    pub fn set_frame(&self, frame: FrameId) {
        self.modify(|s| {
            let changed = s.frame != frame;
            s.frame = frame;
            changed
        });
    }

    /// Record the stepping state, publishing if it changed.
    pub fn set_synchronous_mode_running(&self, running: bool) {
        self.modify(|s| {
            let changed = s.synchronous_mode_running != running;
            s.synchronous_mode_running = running;
            changed
        });
    }

    /// The last published status.
    pub fn current(&self) -> StatusMessage {
        *self.state.lock()
    }

    fn modify(&self, f: impl FnOnce(&mut StatusMessage) -> bool) {
        let mut state = self.state.lock();
        if f(&mut state) {
            publish(&*self.writer, STATUS_TOPIC, Message::Status(*state));
        }
    }
}

// ── ClockPublisher ───────────────────────────────────────────────

/// Publishes elapsed simulation seconds.
pub struct ClockPublisher {
    writer: Arc<dyn Writer>,
}

impl ClockPublisher {
    /// Create the clock writer.
    pub fn new(node: &dyn Node) -> Result<Self, NodeError> {
        Ok(Self {
            writer: node.create_writer(CLOCK_TOPIC, "Clock", 10)?,
        })
    }

    /// Publish `elapsed_seconds`.
    pub fn publish(&self, elapsed_seconds: f64) {
        publish(&*self.writer, CLOCK_TOPIC, Message::Clock { elapsed_seconds });
    }
}

// ── WorldInfoPublisher ───────────────────────────────────────────

/// Publishes the map description once.
pub struct WorldInfoPublisher {
    writer: Arc<dyn Writer>,
    published: Mutex<bool>,
}

impl WorldInfoPublisher {
    /// Create the world-info writer. Nothing is published yet.
    pub fn new(node: &dyn Node) -> Result<Self, NodeError> {
        Ok(Self {
            writer: node.create_writer(WORLD_INFO_TOPIC, "CarlaWorldInfo", 1)?,
            published: Mutex::new(false),
        })
    }

    /// Publish the map on the first successful call; later calls are
    /// no-ops.
    pub fn update(&self, world: &dyn World) {
        let mut published = self.published.lock();
        if *published {
            return;
        }
        match world.map_info() {
            Ok(map) => {
                debug!(map = %map.name, "publishing world info");
                publish(
                    &*self.writer,
                    WORLD_INFO_TOPIC,
                    Message::WorldInfo {
                        map_name: map.name,
                        opendrive: map.opendrive,
                    },
                );
                *published = true;
            }
            Err(e) => warn!(error = %e, "map info unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simbridge_test_utils::{MockNode, MockWorld};

    fn statuses(node: &MockNode) -> Vec<StatusMessage> {
        node.messages(STATUS_TOPIC)
            .into_iter()
            .filter_map(|m| match m {
                Message::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn status_publishes_initially_and_on_change_only() {
        let node = MockNode::new();
        let status = StatusPublisher::new(&node, true, 0.05).unwrap();
        assert_eq!(statuses(&node).len(), 1);

        status.set_frame(FrameId(1));
        status.set_frame(FrameId(1));
        status.set_synchronous_mode_running(true);
        assert_eq!(statuses(&node).len(), 2);

        status.set_synchronous_mode_running(false);
        let all = statuses(&node);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].frame, FrameId(1));
        assert!(!all[2].synchronous_mode_running);
        assert!(all[2].synchronous_mode);
    }

    #[test]
    fn world_info_is_published_once() {
        let node = MockNode::new();
        let world = MockWorld::new();
        let info = WorldInfoPublisher::new(&node).unwrap();
        assert!(node.messages(WORLD_INFO_TOPIC).is_empty());
        info.update(&world);
        info.update(&world);
        let msgs = node.messages(WORLD_INFO_TOPIC);
        assert_eq!(msgs.len(), 1);
        assert!(matches!(&msgs[0], Message::WorldInfo { map_name, .. } if map_name == "Town01"));
    }

    #[test]
    fn clock_publishes_every_call() {
        let node = MockNode::new();
        let clock = ClockPublisher::new(&node).unwrap();
        clock.publish(0.05);
        clock.publish(0.10);
        assert_eq!(node.messages(CLOCK_TOPIC).len(), 2);
    }
}
