//! Plain data exchanged with the simulator: live-object descriptions,
//! blueprints, snapshots, and consumer spawn requests.

use std::collections::BTreeMap;

use crate::id::{ActorId, FrameId};
use crate::transform::Transform;

/// A live object as currently reported by the simulator.
#[derive(Clone, Debug, PartialEq)]
pub struct LiveObject {
    /// Simulator-assigned id.
    pub id: ActorId,
    /// Type tag, e.g. `vehicle.tesla.model3` or `sensor.camera.rgb`.
    pub type_id: String,
    /// Blueprint attributes the object was spawned with.
    pub attributes: BTreeMap<String, String>,
    /// World-frame pose.
    pub transform: Transform,
    /// Live parent, if attached.
    pub parent: Option<ActorId>,
}

impl LiveObject {
    /// Look up a single attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// The `role_name` attribute, if set and non-empty.
    pub fn role_name(&self) -> Option<&str> {
        self.attribute("role_name").filter(|r| !r.is_empty())
    }
}

/// A spawnable object template.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Blueprint {
    /// Type tag the spawned object will carry.
    pub id: String,
    /// Attribute values applied at spawn.
    pub attributes: BTreeMap<String, String>,
}

impl Blueprint {
    /// A blueprint with no attributes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Set (or overwrite) an attribute.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }
}

/// Frame and elapsed time of the world's latest step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WorldSnapshot {
    /// Latest frame.
    pub frame: FrameId,
    /// Elapsed simulation seconds.
    pub elapsed_seconds: f64,
}

/// Description of the loaded map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MapInfo {
    /// Map name.
    pub name: String,
    /// OpenDRIVE document.
    pub opendrive: String,
}

/// A consumer's request to create an object.
///
/// `type_id` containing `pseudo` selects a virtual object; anything else
/// is spawned in the live world. A `*` in a real type picks a random
/// matching blueprint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpawnRequest {
    /// Blueprint or pseudo type name.
    pub type_id: String,
    /// Role name; becomes the mirrored object's name.
    pub role_name: String,
    /// Parent to attach to.
    pub attach_to: Option<ActorId>,
    /// Spawn pose, relative to the parent when attached.
    pub transform: Option<Transform>,
    /// Pick a random spawn point instead of `transform`.
    pub random_pose: bool,
    /// Extra blueprint attributes, applied in order.
    pub attributes: Vec<(String, String)>,
}

impl SpawnRequest {
    /// A request for `type_id` named `role_name`.
    pub fn new(type_id: impl Into<String>, role_name: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            role_name: role_name.into(),
            ..Self::default()
        }
    }

    /// Attach the new object to `parent`.
    pub fn attached_to(mut self, parent: ActorId) -> Self {
        self.attach_to = Some(parent);
        self
    }

    /// Spawn at `transform`.
    pub fn at(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Add a blueprint attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Whether the request names a virtual object.
    pub fn is_pseudo(&self) -> bool {
        self.type_id.contains("pseudo")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_role_name_is_absent() {
        let mut obj = LiveObject {
            id: ActorId::new(1),
            type_id: "vehicle.audi.tt".into(),
            attributes: BTreeMap::new(),
            transform: Transform::default(),
            parent: None,
        };
        assert_eq!(obj.role_name(), None);
        obj.attributes.insert("role_name".into(), String::new());
        assert_eq!(obj.role_name(), None);
        obj.attributes.insert("role_name".into(), "hero".into());
        assert_eq!(obj.role_name(), Some("hero"));
    }

    #[test]
    fn pseudo_requests_are_detected_by_type() {
        assert!(SpawnRequest::new("sensor.pseudo.tf", "tf").is_pseudo());
        assert!(!SpawnRequest::new("sensor.camera.rgb", "front").is_pseudo());
    }
}
