//! Capability traits the bridge consumes (`World`, `Node`, `Writer`) and
//! the hook it produces into (`Translator`).
//!
//! All four are object-safe and `Send + Sync`: the bridge holds them as
//! `Arc<dyn _>` and calls them from its background thread, from consumer
//! callback threads, and from simulator sensor callbacks.

use std::sync::Arc;

use crate::actor::ActorInfo;
use crate::error::{NodeError, UpdateError, WorldError};
use crate::id::{ActorId, FrameId};
use crate::message::{Message, SensorSample, VehicleControl};
use crate::transform::Transform;
use crate::world::{Blueprint, LiveObject, MapInfo, WorldSnapshot};

/// Callback invoked by the simulator for every sensor measurement.
///
/// Called on arbitrary simulator threads, possibly concurrently.
pub type SampleCallback = Box<dyn Fn(SensorSample) + Send + Sync>;

/// Callback invoked by the node for every message on a subscribed topic.
pub type MessageCallback = Box<dyn Fn(Message) + Send + Sync>;

/// The simulator's authoritative world state.
pub trait World: Send + Sync {
    /// Ids of every object currently alive.
    fn list_live_object_ids(&self) -> Vec<ActorId>;

    /// Describe a live object; `None` if it no longer exists.
    fn get_live_object(&self, id: ActorId) -> Option<LiveObject>;

    /// Live parent of a live object.
    fn get_live_object_parent_id(&self, id: ActorId) -> Option<ActorId>;

    /// Create a live object from `blueprint`, optionally attached.
    fn spawn(
        &self,
        blueprint: &Blueprint,
        transform: Transform,
        parent: Option<ActorId>,
    ) -> Result<ActorId, WorldError>;

    /// Remove a live object.
    fn destroy(&self, id: ActorId) -> Result<(), WorldError>;

    /// Advance the world by exactly one step.
    fn advance_step(&self) -> Result<FrameId, WorldError>;

    /// Frame and elapsed time of the latest step.
    fn snapshot(&self) -> Result<WorldSnapshot, WorldError>;

    /// Blueprint with exactly this type tag.
    fn find_blueprint(&self, type_id: &str) -> Option<Blueprint>;

    /// Blueprints matching a `*` wildcard pattern.
    fn filter_blueprints(&self, pattern: &str) -> Vec<Blueprint>;

    /// Recommended spawn poses on the current map.
    fn spawn_points(&self) -> Vec<Transform>;

    /// Start delivering a sensor's measurements to `callback`.
    fn listen(&self, id: ActorId, callback: SampleCallback) -> Result<(), WorldError>;

    /// Stop delivering measurements; a no-op when not listening.
    fn stop_listening(&self, id: ActorId) -> Result<(), WorldError>;

    /// Actuate a vehicle.
    fn apply_vehicle_control(&self, id: ActorId, control: VehicleControl)
        -> Result<(), WorldError>;

    /// Teleport a live object.
    fn set_transform(&self, id: ActorId, transform: Transform) -> Result<(), WorldError>;

    /// Describe the loaded map.
    fn map_info(&self) -> Result<MapInfo, WorldError>;
}

/// A topic-bound publisher.
pub trait Writer: Send + Sync {
    /// Publish one message.
    fn write(&self, message: Message) -> Result<(), NodeError>;
}

/// The publish/subscribe endpoint.
pub trait Node: Send + Sync {
    /// Create a publisher on `topic`.
    fn create_writer(
        &self,
        topic: &str,
        message_type: &str,
        queue_depth: usize,
    ) -> Result<Arc<dyn Writer>, NodeError>;

    /// Subscribe `callback` to `topic`.
    fn create_reader(
        &self,
        topic: &str,
        message_type: &str,
        callback: MessageCallback,
    ) -> Result<(), NodeError>;

    /// Drop every subscription on `topic`.
    fn remove_reader(&self, topic: &str);

    /// Whether the node has been asked to shut down.
    fn is_shutdown(&self) -> bool;
}

/// Payload construction for mirrored objects.
///
/// The bridge decides *when* an object updates and *which* samples belong
/// to a frame; the translator decides what gets published.
pub trait Translator: Send + Sync {
    /// Per-frame update of one mirrored object.
    fn on_update(&self, actor: &ActorInfo, frame: FrameId, timestamp: f64)
        -> Result<(), UpdateError>;

    /// A sensor sample released for publication.
    fn on_sample(&self, actor: &ActorInfo, sample: SensorSample) -> Result<(), UpdateError>;
}
