//! Static type-resolution table.
//!
//! Maps a type tag (plus attributes) to the [`ActorKind`] the factory
//! instantiates. Resolution is pure and total:
//!
//! 1. exact match against the pseudo blueprint names,
//! 2. the most specific matching live-type prefix,
//! 3. otherwise [`ActorKind::Generic`].
//!
//! A prefix matches a tag equal to it or followed by `.`, so `vehicle`
//! matches `vehicle.audi.tt` but not `vehicles`.

use std::collections::BTreeMap;

use simbridge_core::{ActorKind, Classification, PseudoType, SensorType};

#[derive(Clone, Copy)]
enum Rule {
    Kind(ActorKind),
    Vehicle,
}

const RULES: &[(&str, Rule)] = &[
    ("traffic.traffic_light", Rule::Kind(ActorKind::TrafficLight)),
    ("traffic", Rule::Kind(ActorKind::Traffic)),
    ("vehicle", Rule::Vehicle),
    ("walker", Rule::Kind(ActorKind::Walker)),
    ("spectator", Rule::Kind(ActorKind::Spectator)),
    ("sensor.camera.rgb", Rule::Kind(ActorKind::Sensor(SensorType::RgbCamera))),
    ("sensor.camera.depth", Rule::Kind(ActorKind::Sensor(SensorType::DepthCamera))),
    (
        "sensor.camera.semantic_segmentation",
        Rule::Kind(ActorKind::Sensor(SensorType::SemanticSegmentationCamera)),
    ),
    ("sensor.camera.dvs", Rule::Kind(ActorKind::Sensor(SensorType::DvsCamera))),
    ("sensor.camera", Rule::Kind(ActorKind::Sensor(SensorType::Camera))),
    (
        "sensor.lidar.ray_cast_semantic",
        Rule::Kind(ActorKind::Sensor(SensorType::SemanticLidar)),
    ),
    ("sensor.lidar.ray_cast", Rule::Kind(ActorKind::Sensor(SensorType::Lidar))),
    ("sensor.other.radar", Rule::Kind(ActorKind::Sensor(SensorType::Radar))),
    ("sensor.other.gnss", Rule::Kind(ActorKind::Sensor(SensorType::Gnss))),
    ("sensor.other.imu", Rule::Kind(ActorKind::Sensor(SensorType::Imu))),
    ("sensor.other.collision", Rule::Kind(ActorKind::Sensor(SensorType::Collision))),
    ("sensor.other.rss", Rule::Kind(ActorKind::Sensor(SensorType::Rss))),
    (
        "sensor.other.lane_invasion",
        Rule::Kind(ActorKind::Sensor(SensorType::LaneInvasion)),
    ),
    ("sensor", Rule::Kind(ActorKind::Sensor(SensorType::Other))),
];

fn prefix_matches(type_id: &str, prefix: &str) -> bool {
    type_id
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

/// Every pseudo type a consumer may request, in registry order.
pub fn available_pseudo_types() -> &'static [PseudoType] {
    &PseudoType::ALL
}

/// The pseudo type whose blueprint name is exactly `type_id`.
pub fn pseudo_type(type_id: &str) -> Option<PseudoType> {
    PseudoType::ALL
        .iter()
        .copied()
        .find(|p| p.blueprint_name() == type_id)
}

/// Whether `type_id` names a live sensor.
pub fn is_live_sensor(type_id: &str) -> bool {
    prefix_matches(type_id, "sensor")
}

/// Resolve the kind to instantiate for a type tag.
///
/// Vehicles whose `role_name` attribute is one of `ego_role_names`
/// resolve to [`ActorKind::EgoVehicle`]; the `object_type` attribute picks
/// the classification.
pub fn resolve(
    type_id: &str,
    attributes: &BTreeMap<String, String>,
    ego_role_names: &[String],
) -> ActorKind {
    if let Some(p) = pseudo_type(type_id) {
        return ActorKind::Pseudo(p);
    }
    let rule = RULES
        .iter()
        .filter(|(prefix, _)| prefix_matches(type_id, prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, rule)| *rule);
    match rule {
        Some(Rule::Kind(kind)) => kind,
        Some(Rule::Vehicle) => {
            let class =
                Classification::from_object_type(attributes.get("object_type").map(String::as_str));
            let is_ego = attributes
                .get("role_name")
                .is_some_and(|r| ego_role_names.iter().any(|e| e == r));
            if is_ego {
                ActorKind::EgoVehicle(class)
            } else {
                ActorKind::Vehicle(class)
            }
        }
        None => ActorKind::Generic,
    }
}
