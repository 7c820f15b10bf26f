//! Messages exchanged with the pub/sub node and samples produced by live
//! sensors.

use crate::id::FrameId;
use crate::transform::Transform;

/// Run-state commands consumed by the step driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    /// Stop advancing the world until the next command.
    Pause,
    /// Advance continuously.
    Play,
    /// Advance exactly one step, then pause.
    StepOnce,
}

/// Vehicle actuation requested by the consumer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VehicleControl {
    /// Throttle in `[0, 1]`.
    pub throttle: f32,
    /// Steering in `[-1, 1]`.
    pub steer: f32,
    /// Brake in `[0, 1]`.
    pub brake: f32,
    /// Hand brake engaged.
    pub hand_brake: bool,
    /// Reverse gear engaged.
    pub reverse: bool,
    /// Manual gear shifting.
    pub manual_gear_shift: bool,
    /// Selected gear when shifting manually.
    pub gear: i32,
}

/// Simulator status published on `/carla/status`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusMessage {
    /// Latest frame.
    pub frame: FrameId,
    /// Whether the bridge paces the simulator.
    pub synchronous_mode: bool,
    /// Whether synchronized stepping is currently running (not paused).
    pub synchronous_mode_running: bool,
    /// Fixed step length in seconds; 0 when variable.
    pub fixed_delta_seconds: f64,
}

/// Everything the core writes to or reads from the node.
///
/// Translated payloads travel as [`Message::Payload`]; their encoding is
/// the translation layer's business.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Simulation clock in elapsed seconds.
    Clock {
        /// Elapsed simulation time.
        elapsed_seconds: f64,
    },
    /// Bridge status.
    Status(StatusMessage),
    /// Map description, published once.
    WorldInfo {
        /// Map name.
        map_name: String,
        /// OpenDRIVE document.
        opendrive: String,
    },
    /// Run-state command.
    Control(ControlCommand),
    /// Vehicle actuation.
    VehicleControl(VehicleControl),
    /// Boolean flag (manual override, autopilot).
    Bool(bool),
    /// Target pose.
    Pose(Transform),
    /// Opaque translated payload.
    Payload(Vec<u8>),
}

/// One measurement delivered by a live sensor callback.
///
/// Tagged with the frame that produced it. Ownership moves from the
/// callback into the sensor's buffer and from there to the translator.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorSample {
    /// Frame that produced the sample.
    pub frame: FrameId,
    /// Simulation time of the measurement, in seconds.
    pub timestamp: f64,
    /// Sensor pose in world coordinates at measurement time.
    pub transform: Transform,
    /// Raw measurement bytes.
    pub payload: Vec<u8>,
}

impl SensorSample {
    /// A sample with an identity transform.
    pub fn new(frame: FrameId, timestamp: f64, payload: Vec<u8>) -> Self {
        Self {
            frame,
            timestamp,
            transform: Transform::default(),
            payload,
        }
    }
}
