//! Test utilities and mock capabilities for simbridge development.
//!
//! Provides in-memory implementations of the core capability traits
//! ([`World`], [`Node`], [`Writer`]) so engine tests can script the live
//! world, inject sensor samples, and inspect everything published.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::RecordingTranslator;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use simbridge_core::{
    ActorId, Blueprint, FrameId, LiveObject, MapInfo, Message, MessageCallback, Node, NodeError,
    SampleCallback, SensorSample, Transform, VehicleControl, World, WorldError, WorldSnapshot,
    Writer,
};

type SharedSampleCallback = Arc<dyn Fn(SensorSample) + Send + Sync>;
type SharedMessageCallback = Arc<dyn Fn(Message) + Send + Sync>;
type StepHook = Arc<dyn Fn(FrameId, f64) + Send + Sync>;

// ── MockWorld ───────────────────────────────────────────────────

struct WorldState {
    objects: BTreeMap<ActorId, LiveObject>,
    next_id: u32,
    frame: u64,
    elapsed: f64,
    delta: f64,
    blueprints: Vec<Blueprint>,
    spawn_points: Vec<Transform>,
    listeners: HashMap<ActorId, SharedSampleCallback>,
    destroyed: Vec<ActorId>,
    controls: Vec<(ActorId, VehicleControl)>,
    teleports: Vec<(ActorId, Transform)>,
    step_hook: Option<StepHook>,
    map: MapInfo,
}

/// Scriptable in-memory simulator.
///
/// Objects appear via [`add_object`](MockWorld::add_object) (as if some
/// other client spawned them) or through [`World::spawn`]. Each
/// [`World::advance_step`] bumps the frame, adds `delta` seconds and runs
/// the optional step hook outside the internal lock, so the hook may call
/// back into the world (e.g. to [`emit`](MockWorld::emit) samples).
pub struct MockWorld {
    state: Mutex<WorldState>,
}

impl MockWorld {
    pub fn new() -> Self {
        let blueprints = [
            "vehicle.tesla.model3",
            "vehicle.audi.tt",
            "walker.pedestrian.0001",
            "sensor.camera.rgb",
            "sensor.lidar.ray_cast",
            "sensor.other.collision",
        ]
        .into_iter()
        .map(Blueprint::new)
        .collect();
        Self {
            state: Mutex::new(WorldState {
                objects: BTreeMap::new(),
                next_id: 1,
                frame: 0,
                elapsed: 0.0,
                delta: 0.05,
                blueprints,
                spawn_points: vec![Transform::default()],
                listeners: HashMap::new(),
                destroyed: Vec::new(),
                controls: Vec::new(),
                teleports: Vec::new(),
                step_hook: None,
                map: MapInfo {
                    name: "Town01".into(),
                    opendrive: "<OpenDRIVE/>".into(),
                },
            }),
        }
    }

    /// Insert a live object as if another client spawned it.
    pub fn add_object(
        &self,
        type_id: &str,
        attributes: &[(&str, &str)],
        parent: Option<ActorId>,
    ) -> ActorId {
        let mut st = self.state.lock();
        let id = ActorId::new(st.next_id);
        st.next_id += 1;
        let attributes = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        st.objects.insert(
            id,
            LiveObject {
                id,
                type_id: type_id.to_string(),
                attributes,
                transform: Transform::default(),
                parent,
            },
        );
        id
    }

    /// Make a live object vanish without going through `destroy`. Objects
    /// attached to it vanish with it.
    pub fn remove_object(&self, id: ActorId) {
        let mut st = self.state.lock();
        let mut doomed = vec![id];
        while let Some(next) = doomed.pop() {
            st.objects.remove(&next);
            st.listeners.remove(&next);
            doomed.extend(
                st.objects
                    .values()
                    .filter(|o| o.parent == Some(next))
                    .map(|o| o.id),
            );
        }
    }

    /// Overwrite a live object's world pose.
    pub fn place(&self, id: ActorId, transform: Transform) {
        if let Some(obj) = self.state.lock().objects.get_mut(&id) {
            obj.transform = transform;
        }
    }

    /// Deliver a sample to the sensor's listener. Returns whether one was
    /// registered.
    pub fn emit(&self, id: ActorId, sample: SensorSample) -> bool {
        let cb = self.state.lock().listeners.get(&id).cloned();
        match cb {
            Some(cb) => {
                cb(sample);
                true
            }
            None => false,
        }
    }

    pub fn is_listening(&self, id: ActorId) -> bool {
        self.state.lock().listeners.contains_key(&id)
    }

    /// Run `hook` after every `advance_step`.
    pub fn set_step_hook(&self, hook: impl Fn(FrameId, f64) + Send + Sync + 'static) {
        self.state.lock().step_hook = Some(Arc::new(hook));
    }

    pub fn set_spawn_points(&self, points: Vec<Transform>) {
        self.state.lock().spawn_points = points;
    }

    /// Ids passed to [`World::destroy`], in call order.
    pub fn destroyed(&self) -> Vec<ActorId> {
        self.state.lock().destroyed.clone()
    }

    pub fn applied_controls(&self) -> Vec<(ActorId, VehicleControl)> {
        self.state.lock().controls.clone()
    }

    pub fn teleports(&self) -> Vec<(ActorId, Transform)> {
        self.state.lock().teleports.clone()
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn frame(&self) -> FrameId {
        FrameId(self.state.lock().frame)
    }
}

impl Default for MockWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// `*`-wildcard match, anchored at both ends.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }
    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

impl World for MockWorld {
    fn list_live_object_ids(&self) -> Vec<ActorId> {
        self.state.lock().objects.keys().copied().collect()
    }

    fn get_live_object(&self, id: ActorId) -> Option<LiveObject> {
        self.state.lock().objects.get(&id).cloned()
    }

    fn get_live_object_parent_id(&self, id: ActorId) -> Option<ActorId> {
        self.state.lock().objects.get(&id).and_then(|o| o.parent)
    }

    fn spawn(
        &self,
        blueprint: &Blueprint,
        transform: Transform,
        parent: Option<ActorId>,
    ) -> Result<ActorId, WorldError> {
        let mut st = self.state.lock();
        if let Some(p) = parent {
            if !st.objects.contains_key(&p) {
                return Err(WorldError::NotFound(p));
            }
        }
        let id = ActorId::new(st.next_id);
        st.next_id += 1;
        st.objects.insert(
            id,
            LiveObject {
                id,
                type_id: blueprint.id.clone(),
                attributes: blueprint.attributes.clone(),
                transform,
                parent,
            },
        );
        Ok(id)
    }

    fn destroy(&self, id: ActorId) -> Result<(), WorldError> {
        let mut st = self.state.lock();
        st.destroyed.push(id);
        st.listeners.remove(&id);
        st.objects
            .remove(&id)
            .map(|_| ())
            .ok_or(WorldError::NotFound(id))
    }

    fn advance_step(&self) -> Result<FrameId, WorldError> {
        let (frame, elapsed, hook) = {
            let mut st = self.state.lock();
            st.frame += 1;
            st.elapsed += st.delta;
            (FrameId(st.frame), st.elapsed, st.step_hook.clone())
        };
        if let Some(hook) = hook {
            hook(frame, elapsed);
        }
        Ok(frame)
    }

    fn snapshot(&self) -> Result<WorldSnapshot, WorldError> {
        let st = self.state.lock();
        Ok(WorldSnapshot {
            frame: FrameId(st.frame),
            elapsed_seconds: st.elapsed,
        })
    }

    fn find_blueprint(&self, type_id: &str) -> Option<Blueprint> {
        self.state
            .lock()
            .blueprints
            .iter()
            .find(|b| b.id == type_id)
            .cloned()
    }

    fn filter_blueprints(&self, pattern: &str) -> Vec<Blueprint> {
        self.state
            .lock()
            .blueprints
            .iter()
            .filter(|b| glob_match(pattern, &b.id))
            .cloned()
            .collect()
    }

    fn spawn_points(&self) -> Vec<Transform> {
        self.state.lock().spawn_points.clone()
    }

    fn listen(&self, id: ActorId, callback: SampleCallback) -> Result<(), WorldError> {
        let mut st = self.state.lock();
        if !st.objects.contains_key(&id) {
            return Err(WorldError::NotFound(id));
        }
        st.listeners.insert(id, Arc::from(callback));
        Ok(())
    }

    fn stop_listening(&self, id: ActorId) -> Result<(), WorldError> {
        self.state.lock().listeners.remove(&id);
        Ok(())
    }

    fn apply_vehicle_control(
        &self,
        id: ActorId,
        control: VehicleControl,
    ) -> Result<(), WorldError> {
        let mut st = self.state.lock();
        if !st.objects.contains_key(&id) {
            return Err(WorldError::NotFound(id));
        }
        st.controls.push((id, control));
        Ok(())
    }

    fn set_transform(&self, id: ActorId, transform: Transform) -> Result<(), WorldError> {
        let mut st = self.state.lock();
        let obj = st.objects.get_mut(&id).ok_or(WorldError::NotFound(id))?;
        obj.transform = transform;
        st.teleports.push((id, transform));
        Ok(())
    }

    fn map_info(&self) -> Result<MapInfo, WorldError> {
        Ok(self.state.lock().map.clone())
    }
}

// ── MockNode ────────────────────────────────────────────────────

type Published = Arc<Mutex<BTreeMap<String, Vec<Message>>>>;

/// Writer that appends to the owning [`MockNode`]'s log.
pub struct MockWriter {
    topic: String,
    log: Published,
}

impl Writer for MockWriter {
    fn write(&self, message: Message) -> Result<(), NodeError> {
        self.log
            .lock()
            .entry(self.topic.clone())
            .or_default()
            .push(message);
        Ok(())
    }
}

/// In-memory pub/sub endpoint.
///
/// Records every message written to any of its writers, keyed by topic,
/// and lets tests act as a remote publisher via
/// [`publish`](MockNode::publish).
pub struct MockNode {
    published: Published,
    writers: Mutex<Vec<String>>,
    readers: Mutex<HashMap<String, Vec<SharedMessageCallback>>>,
    shutdown: AtomicBool,
}

impl MockNode {
    pub fn new() -> Self {
        Self {
            published: Arc::new(Mutex::new(BTreeMap::new())),
            writers: Mutex::new(Vec::new()),
            readers: Mutex::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Deliver `message` to every reader on `topic`. Returns how many
    /// readers received it.
    pub fn publish(&self, topic: &str, message: Message) -> usize {
        let callbacks = self.readers.lock().get(topic).cloned().unwrap_or_default();
        for cb in &callbacks {
            cb(message.clone());
        }
        callbacks.len()
    }

    /// Everything written to `topic`, in order.
    pub fn messages(&self, topic: &str) -> Vec<Message> {
        self.published
            .lock()
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Topics a writer was created for, in creation order.
    pub fn writer_topics(&self) -> Vec<String> {
        self.writers.lock().clone()
    }

    pub fn has_reader(&self, topic: &str) -> bool {
        self.readers
            .lock()
            .get(topic)
            .is_some_and(|cbs| !cbs.is_empty())
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for MockNode {
    fn create_writer(
        &self,
        topic: &str,
        _message_type: &str,
        _queue_depth: usize,
    ) -> Result<Arc<dyn Writer>, NodeError> {
        self.writers.lock().push(topic.to_string());
        Ok(Arc::new(MockWriter {
            topic: topic.to_string(),
            log: Arc::clone(&self.published),
        }))
    }

    fn create_reader(
        &self,
        topic: &str,
        _message_type: &str,
        callback: MessageCallback,
    ) -> Result<(), NodeError> {
        self.readers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(Arc::from(callback));
        Ok(())
    }

    fn remove_reader(&self, topic: &str) {
        self.readers.lock().remove(topic);
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
