//! Mirrored objects: one closed variant set behind the `Mirror` hooks.
//!
//! Every [`MirroredObject`] carries an [`ActorInfo`] (identity, parent
//! lookup id, cached topic prefix) plus variant state holding only what
//! that variant's behaviour needs:
//!
//! | Variant      | Kinds                                   | State |
//! |--------------|-----------------------------------------|-------|
//! | Passthrough  | generic, spectator, traffic, pseudo     | none |
//! | Participant  | vehicle, walker                         | classification age |
//! | Ego          | ego vehicle                             | age, manual override, control readers |
//! | Sensor       | every live sensor                       | [`SensorSync`] |
//! | Control      | `actor.pseudo.control`                  | pose reader |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use simbridge_core::{
    ActorId, ActorInfo, ActorKind, FrameId, LiveObject, Message, MessageCallback, Node,
    PseudoType, SampleCallback, SensorType, Translator, UpdateError, World,
};

use crate::ack::AckTracker;
use crate::sensor::{Released, SensorSync};
use crate::shutdown::Shutdown;

/// Capabilities and settings shared by every mirrored object.
pub(crate) struct Context {
    pub world: Arc<dyn World>,
    pub node: Arc<dyn Node>,
    pub translator: Arc<dyn Translator>,
    /// Present only when the step driver waits for vehicle control.
    pub acks: Option<Arc<AckTracker>>,
    pub shutdown: Shutdown,
    pub sync_mode: bool,
    pub sensor_timeout: Duration,
}

/// Per-variant behaviour.
trait Mirror {
    fn update(
        &mut self,
        info: &ActorInfo,
        ctx: &Context,
        frame: FrameId,
        timestamp: f64,
    ) -> Result<(), UpdateError>;

    fn destroy(&mut self, _info: &ActorInfo, _ctx: &Context) {}
}

// ── Variants ───────────────────────────────────────────────────────

struct Passthrough;

impl Mirror for Passthrough {
    fn update(
        &mut self,
        info: &ActorInfo,
        ctx: &Context,
        frame: FrameId,
        timestamp: f64,
    ) -> Result<(), UpdateError> {
        ctx.translator.on_update(info, frame, timestamp)
    }
}

struct Participant {
    classification_age: u64,
}

impl Mirror for Participant {
    fn update(
        &mut self,
        info: &ActorInfo,
        ctx: &Context,
        frame: FrameId,
        timestamp: f64,
    ) -> Result<(), UpdateError> {
        if let Some(live) = info.live {
            if ctx.world.get_live_object(live).is_none() {
                return Err(UpdateError::LiveObjectGone(live));
            }
        }
        self.classification_age += 1;
        ctx.translator.on_update(info, frame, timestamp)
    }
}

const CONTROL_TOPICS: [&str; 3] = [
    "vehicle_control_cmd",
    "vehicle_control_cmd_manual",
    "vehicle_control_manual_override",
];

struct Ego {
    participant: Participant,
    manual_override: Arc<AtomicBool>,
    topics: Vec<String>,
}

impl Ego {
    fn new(info: &ActorInfo, ctx: &Context) -> Self {
        let manual_override = Arc::new(AtomicBool::new(false));
        let prefix = info.topic_prefix();
        let mut topics = Vec::with_capacity(CONTROL_TOPICS.len());
        for (i, suffix) in CONTROL_TOPICS.iter().enumerate() {
            let topic = format!("{prefix}/{suffix}");
            let (message_type, callback) = if i < 2 {
                (
                    "CarlaEgoVehicleControl",
                    Self::control_callback(info, ctx, i == 1, &manual_override),
                )
            } else {
                let flag = Arc::clone(&manual_override);
                let cb: MessageCallback = Box::new(move |msg| {
                    if let Message::Bool(enabled) = msg {
                        flag.store(enabled, Ordering::Release);
                    }
                });
                ("Bool", cb)
            };
            match ctx.node.create_reader(&topic, message_type, callback) {
                Ok(()) => topics.push(topic),
                Err(e) => warn!(uid = %info.uid, %topic, error = %e, "control reader unavailable"),
            }
        }
        Self {
            participant: Participant {
                classification_age: 0,
            },
            manual_override,
            topics,
        }
    }

    fn control_callback(
        info: &ActorInfo,
        ctx: &Context,
        manual: bool,
        manual_override: &Arc<AtomicBool>,
    ) -> MessageCallback {
        let uid = info.uid;
        let live = info.live;
        let world = Arc::clone(&ctx.world);
        let acks = ctx.acks.clone();
        let flag = Arc::clone(manual_override);
        Box::new(move |msg| {
            let Message::VehicleControl(control) = msg else {
                return;
            };
            if manual != flag.load(Ordering::Acquire) {
                return;
            }
            let Some(live) = live else { return };
            if let Err(e) = world.apply_vehicle_control(live, control) {
                warn!(%uid, error = %e, "vehicle control failed");
                return;
            }
            if let Some(acks) = &acks {
                acks.acknowledge(uid);
            }
        })
    }
}

impl Mirror for Ego {
    fn update(
        &mut self,
        info: &ActorInfo,
        ctx: &Context,
        frame: FrameId,
        timestamp: f64,
    ) -> Result<(), UpdateError> {
        self.participant.update(info, ctx, frame, timestamp)
    }

    fn destroy(&mut self, _info: &ActorInfo, ctx: &Context) {
        for topic in self.topics.drain(..) {
            ctx.node.remove_reader(&topic);
        }
    }
}

struct Sensor {
    sync: Arc<SensorSync>,
}

impl Sensor {
    fn new(info: &ActorInfo, live: &LiveObject, ctx: &Context) -> Self {
        let sensor_type = info.kind.sensor_type().unwrap_or(SensorType::Other);
        let tick = live
            .attribute("sensor_tick")
            .and_then(|t| t.parse::<f64>().ok());
        let sync = Arc::new(SensorSync::new(sensor_type, ctx.sync_mode, tick));

        let cb_sync = Arc::clone(&sync);
        let translator = Arc::clone(&ctx.translator);
        let cb_info = info.clone();
        let callback: SampleCallback = Box::new(move |sample| {
            cb_sync.on_sample(sample, |s| {
                if let Err(e) = translator.on_sample(&cb_info, s) {
                    warn!(uid = %cb_info.uid, error = %e, "sample translation failed");
                }
            });
        });
        if let Err(e) = ctx.world.listen(live.id, callback) {
            warn!(uid = %info.uid, error = %e, "sensor listen failed");
        }
        Self { sync }
    }
}

impl Sensor {
    /// Hand every released sample to the translator. A failing sample
    /// does not hold back the ones after it; the first error is returned.
    fn deliver(
        &self,
        info: &ActorInfo,
        ctx: &Context,
        released: Released,
    ) -> Result<(), UpdateError> {
        let mut first_err = None;
        for sample in released {
            let frame = sample.frame;
            if let Err(e) = ctx.translator.on_sample(info, sample) {
                warn!(uid = %info.uid, %frame, error = %e, "sample translation failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Mirror for Sensor {
    fn update(
        &mut self,
        info: &ActorInfo,
        ctx: &Context,
        frame: FrameId,
        timestamp: f64,
    ) -> Result<(), UpdateError> {
        ctx.translator.on_update(info, frame, timestamp)
    }

    fn destroy(&mut self, info: &ActorInfo, ctx: &Context) {
        self.sync.close();
        if let Some(live) = info.live {
            if let Err(e) = ctx.world.stop_listening(live) {
                debug!(uid = %info.uid, error = %e, "stop listening failed");
            }
        }
    }
}

struct Control {
    topic: Option<String>,
}

impl Control {
    fn new(info: &ActorInfo, parent_live: Option<ActorId>, ctx: &Context) -> Self {
        let Some(target) = parent_live else {
            warn!(uid = %info.uid, "actor control has no live parent to move");
            return Self { topic: None };
        };
        let topic = format!("{}/set_transform", info.topic_prefix());
        let world = Arc::clone(&ctx.world);
        let uid = info.uid;
        let callback: MessageCallback = Box::new(move |msg| {
            if let Message::Pose(transform) = msg {
                if let Err(e) = world.set_transform(target, transform) {
                    warn!(%uid, error = %e, "set_transform failed");
                }
            }
        });
        match ctx.node.create_reader(&topic, "Pose", callback) {
            Ok(()) => Self { topic: Some(topic) },
            Err(e) => {
                warn!(%uid, %topic, error = %e, "pose reader unavailable");
                Self { topic: None }
            }
        }
    }
}

impl Mirror for Control {
    fn update(
        &mut self,
        info: &ActorInfo,
        ctx: &Context,
        frame: FrameId,
        timestamp: f64,
    ) -> Result<(), UpdateError> {
        ctx.translator.on_update(info, frame, timestamp)
    }

    fn destroy(&mut self, _info: &ActorInfo, ctx: &Context) {
        if let Some(topic) = self.topic.take() {
            ctx.node.remove_reader(&topic);
        }
    }
}

enum Variant {
    Passthrough(Passthrough),
    Participant(Participant),
    Ego(Ego),
    Sensor(Sensor),
    Control(Control),
}

impl Variant {
    fn as_mirror(&mut self) -> &mut dyn Mirror {
        match self {
            Self::Passthrough(v) => v,
            Self::Participant(v) => v,
            Self::Ego(v) => v,
            Self::Sensor(v) => v,
            Self::Control(v) => v,
        }
    }
}

// ── MirroredObject ────────────────────────────────────────────────

/// A locally-owned object tracking a live object, or a virtual one.
pub struct MirroredObject {
    info: ActorInfo,
    variant: Variant,
    destroyed: bool,
}

impl MirroredObject {
    /// Build the variant for `info.kind` and attach its callbacks.
    ///
    /// `live` is the live counterpart (absent for pseudo objects) and
    /// `parent_live` the parent's live handle.
    pub(crate) fn create(
        info: ActorInfo,
        live: Option<&LiveObject>,
        parent_live: Option<ActorId>,
        ctx: &Context,
    ) -> Self {
        let variant = match (info.kind, live) {
            (ActorKind::Vehicle(_) | ActorKind::Walker, _) => Variant::Participant(Participant {
                classification_age: 0,
            }),
            (ActorKind::EgoVehicle(_), _) => Variant::Ego(Ego::new(&info, ctx)),
            (ActorKind::Sensor(_), Some(live)) => Variant::Sensor(Sensor::new(&info, live, ctx)),
            (ActorKind::Pseudo(PseudoType::ActorControl), _) => {
                Variant::Control(Control::new(&info, parent_live, ctx))
            }
            _ => Variant::Passthrough(Passthrough),
        };
        Self {
            info,
            variant,
            destroyed: false,
        }
    }

    /// A passthrough object with no callbacks attached.
    #[cfg(test)]
    pub(crate) fn detached(info: ActorInfo) -> Self {
        Self {
            info,
            variant: Variant::Passthrough(Passthrough),
            destroyed: false,
        }
    }

    /// Per-frame update hook.
    ///
    /// `released` holds the samples drained for this frame (sensors only).
    /// They are delivered before the update hook runs; both run even when
    /// the other fails.
    pub(crate) fn update(
        &mut self,
        ctx: &Context,
        frame: FrameId,
        timestamp: f64,
        released: Released,
    ) -> Result<(), UpdateError> {
        let delivered = match &self.variant {
            Variant::Sensor(s) => s.deliver(&self.info, ctx, released),
            _ => Ok(()),
        };
        let updated = self
            .variant
            .as_mirror()
            .update(&self.info, ctx, frame, timestamp);
        delivered.and(updated)
    }

    /// Detach callbacks. Idempotent; never touches the live object
    /// itself.
    pub(crate) fn destroy(&mut self, ctx: &Context) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.variant.as_mirror().destroy(&self.info, ctx);
    }

    /// Identity and topology.
    pub fn info(&self) -> &ActorInfo {
        &self.info
    }

    /// Mirror id.
    pub fn uid(&self) -> ActorId {
        self.info.uid
    }

    /// Resolved kind.
    pub fn kind(&self) -> ActorKind {
        self.info.kind
    }

    /// Parent mirror id.
    pub fn parent(&self) -> Option<ActorId> {
        self.info.parent
    }

    /// Live handle; `None` for pseudo objects.
    pub fn live(&self) -> Option<ActorId> {
        self.info.live
    }

    /// Number of successful participant updates so far.
    pub fn classification_age(&self) -> Option<u64> {
        match &self.variant {
            Variant::Participant(p) => Some(p.classification_age),
            Variant::Ego(e) => Some(e.participant.classification_age),
            _ => None,
        }
    }

    /// Whether the consumer's manual override is engaged (ego only).
    pub fn manual_override(&self) -> Option<bool> {
        match &self.variant {
            Variant::Ego(e) => Some(e.manual_override.load(Ordering::Acquire)),
            _ => None,
        }
    }

    /// The sample synchronizer (sensors only).
    pub fn sensor(&self) -> Option<&Arc<SensorSync>> {
        match &self.variant {
            Variant::Sensor(s) => Some(&s.sync),
            _ => None,
        }
    }
}

impl std::fmt::Debug for MirroredObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirroredObject")
            .field("uid", &self.info.uid)
            .field("kind", &self.info.kind)
            .field("prefix", &self.info.prefix)
            .finish()
    }
}
