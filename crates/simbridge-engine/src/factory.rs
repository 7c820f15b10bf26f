//! Actor factory: reconciliation, the task queue, and the thread-safe
//! spawn/destroy entry points.
//!
//! # Locking
//!
//! Two locks, always taken in the order **table → spawn**:
//!
//! - the *table lock* guards the [`MirrorTable`] and the set of live ids
//!   seen by the previous pass. Reconciliation holds it for the whole
//!   pass, so readers never observe a half-applied pass. Update passes
//!   drain sensors before taking it.
//! - the *spawn lock* guards id allocation, the [`TaskQueue`], the set of
//!   known ids and the RNG. Entry points that need the table (parent
//!   validation, destroy closure) read it and release it before taking
//!   the spawn lock.
//!
//! ```text
//! caller threads                       reconcile / step thread
//!     |                                        |
//!     |--request_spawn()--> [spawn lock]       |
//!     |     allocate id, enqueue               |
//!     |--request_destroy()                     |
//!     |     [table lock] closure               |
//!     |     [spawn lock] enqueue               |
//!     |                                        | [table lock]
//!     |                                        |   diff live ids
//!     |                                        |   create / remove
//!     |                                        |   [spawn lock] take batch
//!     |                                        |   apply batch
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use simbridge_core::{
    ActorId, ActorInfo, ActorKind, BridgeError, FrameId, LiveObject, Node, PseudoType, SpawnRequest,
    Translator, World,
};

use crate::ack::AckTracker;
use crate::actor::{Context, MirroredObject};
use crate::config::BridgeConfig;
use crate::registry;
use crate::sensor::{Released, SensorSync};
use crate::shutdown::Shutdown;
use crate::step::TickFollower;
use crate::table::MirrorTable;
use crate::task_queue::{PendingTask, TaskQueue};

// ── Lock-protected state ─────────────────────────────────────────

struct TableState {
    table: MirrorTable,
    /// Live ids seen by the previous reconciliation.
    observed: BTreeSet<ActorId>,
}

struct SpawnState {
    queue: TaskQueue,
    next_pseudo_id: u64,
    /// Ids handed out by `request_spawn` and not yet destroyed.
    known: BTreeSet<ActorId>,
    rng: ChaCha8Rng,
}

impl SpawnState {
    fn allocate_pseudo_id(&mut self) -> Result<ActorId, BridgeError> {
        let id = ActorId::try_from(self.next_pseudo_id)?;
        self.next_pseudo_id += 1;
        Ok(id)
    }
}

// ── ActorFactory ─────────────────────────────────────────────────

/// Keeps the mirror table consistent with the live world and applies
/// queued lifecycle requests.
pub struct ActorFactory {
    ctx: Context,
    table: Mutex<TableState>,
    spawn: Mutex<SpawnState>,
    register_all_sensors: bool,
    ego_role_names: Vec<String>,
    update_interval: Duration,
    started: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ActorFactory {
    /// Create a factory over the given capabilities.
    ///
    /// `acks` receives ego control acknowledgements; pass `None` when the
    /// step driver does not wait for them.
    pub fn new(
        config: &BridgeConfig,
        world: Arc<dyn World>,
        node: Arc<dyn Node>,
        translator: Arc<dyn Translator>,
        acks: Option<Arc<AckTracker>>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            ctx: Context {
                world,
                node,
                translator,
                acks,
                shutdown,
                sync_mode: config.sync_mode(),
                sensor_timeout: config.sensor_timeout(),
            },
            table: Mutex::new(TableState {
                table: MirrorTable::new(),
                observed: BTreeSet::new(),
            }),
            spawn: Mutex::new(SpawnState {
                queue: TaskQueue::new(),
                next_pseudo_id: config.pseudo_id_base,
                known: BTreeSet::new(),
                rng: ChaCha8Rng::seed_from_u64(config.seed),
            }),
            register_all_sensors: config.register_all_sensors,
            ego_role_names: config.ego_role_names.clone(),
            update_interval: config.update_interval(),
            started: AtomicBool::new(false),
            thread: Mutex::new(None),
        }
    }

    /// Run one reconciliation, then start the background loop.
    ///
    /// Returns [`BridgeError::AlreadyStarted`] on a second call.
    pub fn start(self: &Arc<Self>) -> Result<(), BridgeError> {
        self.start_with(None)
    }

    /// Like [`start`](Self::start), additionally following world ticks
    /// with `follower` on every iteration.
    pub fn start_with(self: &Arc<Self>, follower: Option<TickFollower>) -> Result<(), BridgeError> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BridgeError::AlreadyStarted);
        }
        self.reconcile();
        let factory = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("simbridge-reconcile".into())
            .spawn(move || factory.run(follower))
            .map_err(|e| BridgeError::ThreadSpawnFailed {
                reason: format!("reconcile thread: {e}"),
            })?;
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    fn run(&self, mut follower: Option<TickFollower>) {
        loop {
            if self.ctx.shutdown.wait_timeout(self.update_interval) {
                break;
            }
            if self.ctx.node.is_shutdown() {
                self.ctx.shutdown.trigger();
                break;
            }
            self.reconcile();
            if let Some(f) = follower.as_mut() {
                f.follow(self);
            }
        }
        debug!("reconcile loop stopped");
    }

    /// Join the background loop. Returns whether it exited cleanly (or
    /// was never started). Call after triggering shutdown.
    pub fn join(&self) -> bool {
        match self.thread.lock().take() {
            Some(handle) => handle.join().is_ok(),
            None => true,
        }
    }

    // ── Entry points ─────────────────────────────────────────────

    /// Validate `request`, allocate its id and queue it.
    ///
    /// The object appears in the mirror table at the next
    /// reconciliation. Real objects are spawned in the live world before
    /// this returns and reuse the live id.
    pub fn request_spawn(&self, request: SpawnRequest) -> Result<ActorId, BridgeError> {
        if request.is_pseudo() {
            self.request_pseudo(request)
        } else {
            self.request_real(request)
        }
    }

    fn request_pseudo(&self, request: SpawnRequest) -> Result<ActorId, BridgeError> {
        if registry::pseudo_type(&request.type_id).is_none() {
            return Err(BridgeError::UnknownBlueprint(request.type_id));
        }
        let parent_mirrored = request
            .attach_to
            .is_some_and(|p| self.table.lock().table.contains(p));
        let mut spawn = self.spawn.lock();
        if let Some(parent) = request.attach_to {
            if !parent_mirrored && !spawn.known.contains(&parent) {
                return Err(BridgeError::ParentNotFound(parent));
            }
        }
        let id = spawn.allocate_pseudo_id()?;
        debug!(uid = %id, type_id = %request.type_id, "pseudo spawn queued");
        spawn.queue.push(PendingTask::SpawnPseudo { id, request });
        spawn.known.insert(id);
        Ok(id)
    }

    fn request_real(&self, request: SpawnRequest) -> Result<ActorId, BridgeError> {
        let world = &self.ctx.world;
        let mut spawn = self.spawn.lock();
        let mut blueprint = if request.type_id.contains('*') {
            world
                .filter_blueprints(&request.type_id)
                .choose(&mut spawn.rng)
                .cloned()
                .ok_or_else(|| BridgeError::NoMatchingBlueprint(request.type_id.clone()))?
        } else {
            world
                .find_blueprint(&request.type_id)
                .ok_or_else(|| BridgeError::UnknownBlueprint(request.type_id.clone()))?
        };
        blueprint.set_attribute("role_name", request.role_name.as_str());
        for (key, value) in &request.attributes {
            blueprint.set_attribute(key.as_str(), value.as_str());
        }
        let transform = if request.random_pose {
            world
                .spawn_points()
                .choose(&mut spawn.rng)
                .copied()
                .unwrap_or_default()
        } else {
            request.transform.unwrap_or_default()
        };
        if let Some(parent) = request.attach_to {
            if world.get_live_object(parent).is_none() {
                return Err(BridgeError::ParentNotFound(parent));
            }
        }
        let id = world.spawn(&blueprint, transform, request.attach_to)?;
        debug!(uid = %id, blueprint = %blueprint.id, "live spawn queued");
        spawn.queue.push(PendingTask::SpawnReal { id, request });
        spawn.known.insert(id);
        Ok(id)
    }

    /// Queue the removal of `id` and every descendant, releasing their
    /// live objects. Returns the affected ids.
    pub fn request_destroy(&self, id: ActorId) -> BTreeSet<ActorId> {
        let order = self.table.lock().table.subtree_post_order(id);
        let mut spawn = self.spawn.lock();
        for uid in &order {
            spawn.known.remove(uid);
            spawn.queue.push(PendingTask::Destroy {
                id: *uid,
                release_live: true,
            });
        }
        order.into_iter().collect()
    }

    // ── Reconciliation ───────────────────────────────────────────

    /// Bring the mirror table in line with the live world, then apply
    /// every queued task.
    pub fn reconcile(&self) {
        let mut guard = self.table.lock();
        let st = &mut *guard;
        // Listed under the table lock so concurrent passes apply in order.
        let current: BTreeSet<ActorId> =
            self.ctx.world.list_live_object_ids().into_iter().collect();

        let appeared: Vec<ActorId> = current.difference(&st.observed).copied().collect();
        let disappeared: Vec<ActorId> = st.observed.difference(&current).copied().collect();

        for id in appeared {
            self.mirror_live(&mut st.table, id);
        }

        // A vanished parent takes its mirrored subtree with it; children
        // still in the world come back as roots.
        let mut orphans = Vec::new();
        for id in disappeared {
            orphans.extend(
                self.remove(&mut st.table, id, false)
                    .into_iter()
                    .filter(|uid| current.contains(uid)),
            );
        }
        for id in orphans {
            debug!(uid = %id, "re-mirroring orphaned child");
            self.mirror_live(&mut st.table, id);
        }
        st.observed = current;

        let tasks = self.spawn.lock().queue.drain();
        let shutting_down = self.ctx.shutdown.is_triggered();
        for task in tasks {
            match task {
                PendingTask::SpawnReal { id, .. } | PendingTask::SpawnPseudo { id, .. }
                    if shutting_down =>
                {
                    debug!(uid = %id, "spawn skipped during shutdown");
                }
                PendingTask::SpawnReal { id, request } => {
                    match self.ctx.world.get_live_object(id) {
                        Some(live) => {
                            self.create_from_live(&mut st.table, live, Some(&request));
                        }
                        None => debug!(uid = %id, "spawned object gone before mirroring"),
                    }
                }
                PendingTask::SpawnPseudo { id, request } => {
                    self.create_pseudo(&mut st.table, id, &request);
                }
                PendingTask::Destroy { id, release_live } => {
                    self.remove(&mut st.table, id, release_live);
                }
            }
        }
    }

    fn mirror_live(&self, table: &mut MirrorTable, id: ActorId) {
        let Some(live) = self.ctx.world.get_live_object(id) else {
            debug!(uid = %id, "live object vanished before mirroring");
            return;
        };
        if !self.register_all_sensors && registry::is_live_sensor(&live.type_id) {
            return;
        }
        self.create_from_live(table, live, None);
    }

    fn create_from_live(
        &self,
        table: &mut MirrorTable,
        live: LiveObject,
        request: Option<&SpawnRequest>,
    ) -> Option<ActorId> {
        if table.contains(live.id) {
            return Some(live.id);
        }
        let parent_live = self
            .ctx
            .world
            .get_live_object_parent_id(live.id)
            .and_then(|pid| self.ctx.world.get_live_object(pid));
        let (parent, relative_pose) = match parent_live {
            Some(p) => {
                let pose = request
                    .and_then(|r| r.transform)
                    .unwrap_or_else(|| live.transform.relative_to(&p.transform));
                let parent = if table.contains(p.id) {
                    Some(p.id)
                } else {
                    self.create_from_live(table, p, None)
                };
                (parent, pose)
            }
            None => (None, live.transform),
        };
        let name = live
            .role_name()
            .map(str::to_string)
            .unwrap_or_else(|| live.id.to_string());
        let kind = registry::resolve(&live.type_id, &live.attributes, &self.ego_role_names);
        let info = ActorInfo {
            uid: live.id,
            prefix: child_prefix(table, parent, &name),
            name,
            type_id: live.type_id.clone(),
            kind,
            parent,
            live: Some(live.id),
            relative_pose: Some(relative_pose),
        };
        let obj = MirroredObject::create(info, Some(&live), parent, &self.ctx);
        self.insert(table, obj)
    }

    fn create_pseudo(&self, table: &mut MirrorTable, id: ActorId, request: &SpawnRequest) {
        let Some(pseudo) = registry::pseudo_type(&request.type_id) else {
            warn!(uid = %id, type_id = %request.type_id, "unknown pseudo type");
            return;
        };
        let parent_live = match request.attach_to {
            Some(p) => match table.get(p) {
                Some(parent) => parent.live(),
                None => {
                    warn!(uid = %id, parent = %p, "parent gone, pseudo object not created");
                    return;
                }
            },
            None => None,
        };
        let info = ActorInfo {
            uid: id,
            prefix: child_prefix(table, request.attach_to, &request.role_name),
            name: request.role_name.clone(),
            type_id: request.type_id.clone(),
            kind: ActorKind::Pseudo(pseudo),
            parent: request.attach_to,
            live: None,
            relative_pose: request.transform,
        };
        let obj = MirroredObject::create(info, None, parent_live, &self.ctx);
        self.insert(table, obj);
    }

    fn insert(&self, table: &mut MirrorTable, obj: MirroredObject) -> Option<ActorId> {
        let uid = obj.uid();
        let kind = obj.kind();
        match table.insert(obj) {
            Ok(()) => {
                info!(%uid, ?kind, "created");
                Some(uid)
            }
            Err(mut dup) => {
                dup.destroy(&self.ctx);
                debug!(%uid, "already mirrored");
                Some(uid)
            }
        }
    }

    /// Remove `id` and its subtree, returning the removed ids. The entries
    /// leave the table before any live object is released.
    ///
    /// With `release_live`, an unmirrored id that is still live (an
    /// opted-out sensor, say) is released too.
    fn remove(&self, table: &mut MirrorTable, id: ActorId, release_live: bool) -> Vec<ActorId> {
        let removed = table.remove_subtree(id);
        if removed.is_empty() {
            if release_live && self.ctx.world.get_live_object(id).is_some() {
                self.release(id, id);
                info!(uid = %id, "released unmirrored object");
            } else {
                debug!(uid = %id, "destroy of unknown object ignored");
            }
            return Vec::new();
        }
        let mut ids = Vec::with_capacity(removed.len());
        for mut obj in removed {
            obj.destroy(&self.ctx);
            if release_live {
                if let Some(live) = obj.live() {
                    self.release(obj.uid(), live);
                }
            }
            info!(uid = %obj.uid(), kind = ?obj.kind(), "removed");
            ids.push(obj.uid());
        }
        ids
    }

    fn release(&self, uid: ActorId, live: ActorId) {
        if let Err(e) = self.ctx.world.destroy(live) {
            debug!(%uid, error = %e, "live object already gone");
        }
    }

    // ── Updates & queries ────────────────────────────────────────

    /// Run every object's update hook for `frame`, in creation order.
    ///
    /// In synchronized mode the sensors are drained first, without the
    /// table lock, so the bounded sensor waits never stall spawn or
    /// destroy requests. A failing object is logged and skipped.
    pub fn update_actor_states(&self, frame: FrameId, timestamp: f64) {
        let mut released = self.drain_sensors(frame, timestamp);
        let mut st = self.table.lock();
        for obj in st.table.iter_mut() {
            let samples = released.remove(&obj.uid()).unwrap_or_default();
            if let Err(e) = obj.update(&self.ctx, frame, timestamp, samples) {
                warn!(uid = %obj.uid(), kind = ?obj.kind(), error = %e, "update failed");
            }
        }
    }

    fn drain_sensors(&self, frame: FrameId, timestamp: f64) -> HashMap<ActorId, Released> {
        if !self.ctx.sync_mode {
            return HashMap::new();
        }
        let sensors: Vec<(ActorId, Arc<SensorSync>)> = self
            .table
            .lock()
            .table
            .iter()
            .filter_map(|o| o.sensor().map(|s| (o.uid(), Arc::clone(s))))
            .collect();
        sensors
            .into_iter()
            .map(|(uid, sync)| {
                let timeout = self.ctx.sensor_timeout;
                (uid, sync.drain(frame, timestamp, timeout, &self.ctx.shutdown))
            })
            .collect()
    }

    /// Detach and drop every mirrored object. Live objects are untouched.
    pub fn clear(&self) {
        let mut st = self.table.lock();
        for mut obj in st.table.drain() {
            obj.destroy(&self.ctx);
        }
        st.observed.clear();
    }

    /// Pseudo types a consumer may request.
    pub fn available_pseudo_types(&self) -> &'static [PseudoType] {
        registry::available_pseudo_types()
    }

    /// Ids of every consumer-controlled vehicle.
    pub fn ego_ids(&self) -> BTreeSet<ActorId> {
        self.table
            .lock()
            .table
            .iter()
            .filter(|o| o.kind().is_ego())
            .map(MirroredObject::uid)
            .collect()
    }

    /// Mirrored ids, in creation order.
    pub fn mirrored_ids(&self) -> Vec<ActorId> {
        self.table.lock().table.ids()
    }

    /// Run `f` against one mirrored object under the table lock.
    pub fn with_object<R>(&self, id: ActorId, f: impl FnOnce(&MirroredObject) -> R) -> Option<R> {
        self.table.lock().table.get(id).map(f)
    }

    /// Whether the node asked the process to stop.
    pub(crate) fn node_is_shutdown(&self) -> bool {
        self.ctx.node.is_shutdown()
    }

    /// Number of tasks waiting for the next reconciliation.
    pub fn pending_tasks(&self) -> usize {
        self.spawn.lock().queue.len()
    }
}

fn child_prefix(table: &MirrorTable, parent: Option<ActorId>, name: &str) -> String {
    match parent.and_then(|p| table.get(p)) {
        Some(p) => format!("{}/{}", p.info().prefix, name),
        None => name.to_string(),
    }
}
