//! The closed set of mirrored-object kinds and the read-only view handed
//! to the translation layer.

use crate::id::ActorId;
use crate::transform::Transform;

/// Object classification reported for traffic participants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Classification {
    /// No classification available.
    #[default]
    Unknown,
    /// Passenger car.
    Car,
    /// Bicycle.
    Bike,
    /// Motorcycle.
    Motorcycle,
    /// Truck.
    Truck,
    /// Any other vehicle.
    OtherVehicle,
    /// Pedestrian.
    Pedestrian,
}

impl Classification {
    /// Classification from a vehicle's `object_type` attribute.
    ///
    /// Vehicles without a recognised `object_type` are cars.
    pub fn from_object_type(object_type: Option<&str>) -> Self {
        match object_type {
            Some("bike") => Self::Bike,
            Some("motorcycle") => Self::Motorcycle,
            Some("truck") => Self::Truck,
            Some("other") => Self::OtherVehicle,
            _ => Self::Car,
        }
    }
}

/// Concrete sensor variants backed by a live sensor object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SensorType {
    /// `sensor.camera.rgb`
    RgbCamera,
    /// `sensor.camera.depth`
    DepthCamera,
    /// `sensor.camera.semantic_segmentation`
    SemanticSegmentationCamera,
    /// `sensor.camera.dvs`
    DvsCamera,
    /// Any other `sensor.camera.*`.
    Camera,
    /// `sensor.lidar.ray_cast`
    Lidar,
    /// `sensor.lidar.ray_cast_semantic`
    SemanticLidar,
    /// `sensor.other.radar`
    Radar,
    /// `sensor.other.gnss`
    Gnss,
    /// `sensor.other.imu`
    Imu,
    /// `sensor.other.collision`
    Collision,
    /// `sensor.other.rss`
    Rss,
    /// `sensor.other.lane_invasion`
    LaneInvasion,
    /// Any other `sensor.*`.
    Other,
}

impl SensorType {
    /// Event sensors emit irregularly and release every buffered sample
    /// for a frame instead of exactly one.
    pub fn is_event(self) -> bool {
        matches!(self, Self::DvsCamera | Self::Collision | Self::LaneInvasion)
    }
}

/// Virtual objects with no live counterpart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PseudoType {
    /// Transform tree publisher.
    Tf,
    /// Odometry of the parent.
    Odometry,
    /// Speed of the parent.
    Speedometer,
    /// Visualisation markers for all participants.
    Markers,
    /// List of all mirrored objects.
    ActorList,
    /// Object list of all traffic participants.
    Objects,
    /// Traffic light states.
    TrafficLights,
    /// The map as OpenDRIVE.
    OpenDriveMap,
    /// Pose/velocity control of the parent.
    ActorControl,
}

impl PseudoType {
    /// Every pseudo type, in registry order.
    pub const ALL: [PseudoType; 9] = [
        Self::Tf,
        Self::Odometry,
        Self::Speedometer,
        Self::Markers,
        Self::ActorList,
        Self::Objects,
        Self::TrafficLights,
        Self::OpenDriveMap,
        Self::ActorControl,
    ];

    /// The blueprint name a spawn request uses to ask for this type.
    pub fn blueprint_name(self) -> &'static str {
        match self {
            Self::Tf => "sensor.pseudo.tf",
            Self::Odometry => "sensor.pseudo.odom",
            Self::Speedometer => "sensor.pseudo.speedometer",
            Self::Markers => "sensor.pseudo.markers",
            Self::ActorList => "sensor.pseudo.actor_list",
            Self::Objects => "sensor.pseudo.objects",
            Self::TrafficLights => "sensor.pseudo.traffic_lights",
            Self::OpenDriveMap => "sensor.pseudo.opendrive_map",
            Self::ActorControl => "actor.pseudo.control",
        }
    }
}

/// The concrete kind of a mirrored object.
///
/// Closed set: every live type tag resolves to exactly one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActorKind {
    /// Passthrough for live types with no dedicated behaviour.
    Generic,
    /// The simulator's spectator camera.
    Spectator,
    /// Static traffic infrastructure (signs, poles).
    Traffic,
    /// A traffic light.
    TrafficLight,
    /// A vehicle not driven by the consumer.
    Vehicle(Classification),
    /// A vehicle controlled by the consumer.
    EgoVehicle(Classification),
    /// A pedestrian.
    Walker,
    /// A live sensor.
    Sensor(SensorType),
    /// A virtual object.
    Pseudo(PseudoType),
}

impl ActorKind {
    /// Whether this kind buffers sensor samples.
    pub fn sensor_type(self) -> Option<SensorType> {
        match self {
            Self::Sensor(t) => Some(t),
            _ => None,
        }
    }

    /// Whether the step driver waits for this object's control command.
    pub fn is_ego(self) -> bool {
        matches!(self, Self::EgoVehicle(_))
    }

    /// Whether this kind has no live counterpart.
    pub fn is_pseudo(self) -> bool {
        matches!(self, Self::Pseudo(_))
    }

    /// Classification for traffic participants, `Unknown` otherwise.
    pub fn classification(self) -> Classification {
        match self {
            Self::Vehicle(c) | Self::EgoVehicle(c) => c,
            Self::Walker => Classification::Pedestrian,
            _ => Classification::Unknown,
        }
    }
}

/// Read-only description of a mirrored object.
///
/// Handed to the [`Translator`](crate::Translator) with every update and
/// sample so that payload construction never touches the mirror table.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorInfo {
    /// Stable mirror id.
    pub uid: ActorId,
    /// Role name, or the id when the live object has none.
    pub name: String,
    /// Live type tag or pseudo blueprint name.
    pub type_id: String,
    /// Resolved kind.
    pub kind: ActorKind,
    /// Parent mirror id.
    pub parent: Option<ActorId>,
    /// Live handle; `None` for pseudo objects.
    pub live: Option<ActorId>,
    /// `/`-joined names from the root ancestor down to this object.
    pub prefix: String,
    /// Pose relative to the parent at spawn time.
    pub relative_pose: Option<Transform>,
}

impl ActorInfo {
    /// Topic namespace for this object's writers and readers.
    pub fn topic_prefix(&self) -> String {
        format!("/carla/{}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_type_selects_classification() {
        assert_eq!(Classification::from_object_type(None), Classification::Car);
        assert_eq!(
            Classification::from_object_type(Some("truck")),
            Classification::Truck
        );
        assert_eq!(
            Classification::from_object_type(Some("spaceship")),
            Classification::Car
        );
    }

    #[test]
    fn pseudo_blueprint_names_are_unique() {
        let mut names: Vec<_> = PseudoType::ALL.iter().map(|p| p.blueprint_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), PseudoType::ALL.len());
        assert!(names.iter().all(|n| n.contains("pseudo")));
    }

    #[test]
    fn event_sensors() {
        assert!(SensorType::Collision.is_event());
        assert!(SensorType::LaneInvasion.is_event());
        assert!(!SensorType::Lidar.is_event());
    }

    #[test]
    fn walker_classifies_as_pedestrian() {
        assert_eq!(ActorKind::Walker.classification(), Classification::Pedestrian);
        assert_eq!(ActorKind::Generic.classification(), Classification::Unknown);
    }
}
