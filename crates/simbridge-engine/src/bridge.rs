//! The bridge: wires the factory, step driver and publishers together
//! and owns the shutdown sequence.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info};

use simbridge_core::{
    ActorId, BridgeError, ControlCommand, Message, MessageCallback, Node, PseudoType,
    SpawnRequest, Translator, World,
};

use crate::ack::AckTracker;
use crate::config::BridgeConfig;
use crate::factory::ActorFactory;
use crate::shutdown::Shutdown;
use crate::status::CONTROL_TOPIC;
use crate::step::{Publishers, StepDriver, TickFollower};

// ── ShutdownReport ───────────────────────────────────────────────

/// Report from [`Bridge::shutdown`].
#[derive(Debug)]
pub struct ShutdownReport {
    /// Total time spent in the shutdown sequence.
    pub total_ms: u64,
    /// Whether the reconcile thread was joined successfully (true when
    /// none ran).
    pub reconcile_joined: bool,
    /// Whether the step thread was joined successfully (true when none ran).
    pub step_joined: bool,
    /// Objects destroyed because the bridge spawned them.
    pub destroyed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

// ── Bridge ───────────────────────────────────────────────────────

/// Mirrors a live simulator into a publish/subscribe node.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use simbridge_core::{Node, SpawnRequest, Translator, World};
/// # use simbridge_engine::{Bridge, BridgeConfig};
/// # fn demo(world: Arc<dyn World>, node: Arc<dyn Node>, translator: Arc<dyn Translator>) {
/// let mut bridge = Bridge::new(BridgeConfig::default(), world, node, translator).unwrap();
/// bridge.start().unwrap();
/// let ego = bridge
///     .spawn_object(SpawnRequest::new("vehicle.tesla.model3", "hero"))
///     .unwrap();
/// bridge.destroy_object(ego).unwrap();
/// let report = bridge.shutdown();
/// assert!(report.reconcile_joined);
/// # }
/// ```
pub struct Bridge {
    config: BridgeConfig,
    world: Arc<dyn World>,
    node: Arc<dyn Node>,
    factory: Arc<ActorFactory>,
    publishers: Arc<Publishers>,
    acks: Option<Arc<AckTracker>>,
    shutdown: Shutdown,
    commands: (Sender<ControlCommand>, Receiver<ControlCommand>),
    control_reader: bool,
    step_thread: Option<JoinHandle<()>>,
    spawned: Mutex<BTreeSet<ActorId>>,
    state: Lifecycle,
}

impl Bridge {
    /// Validate `config` and create the publishers, the control reader
    /// (synchronized mode only) and the actor factory.
    ///
    /// Nothing runs until [`start`](Self::start).
    pub fn new(
        config: BridgeConfig,
        world: Arc<dyn World>,
        node: Arc<dyn Node>,
        translator: Arc<dyn Translator>,
    ) -> Result<Self, BridgeError> {
        config.validate().map_err(|e| BridgeError::InvalidConfig {
            reason: e.to_string(),
        })?;
        let sync = config.sync_mode();
        let publishers = Arc::new(Publishers::new(&*node, sync, config.fixed_delta_seconds)?);
        let acks = (sync && config.wait_for_vehicle_control).then(|| Arc::new(AckTracker::new()));
        let shutdown = Shutdown::new();
        let factory = Arc::new(ActorFactory::new(
            &config,
            Arc::clone(&world),
            Arc::clone(&node),
            translator,
            acks.clone(),
            shutdown.clone(),
        ));

        let commands = crossbeam_channel::unbounded();
        let control_reader = if sync {
            let tx = commands.0.clone();
            let callback: MessageCallback = Box::new(move |msg| {
                if let Message::Control(cmd) = msg {
                    let _ = tx.send(cmd);
                }
            });
            node.create_reader(CONTROL_TOPIC, "CarlaControl", callback)?;
            true
        } else {
            false
        };

        info!(
            synchronous = sync,
            wait_for_vehicle_control = acks.is_some(),
            "bridge created"
        );
        Ok(Self {
            config,
            world,
            node,
            factory,
            publishers,
            acks,
            shutdown,
            commands,
            control_reader,
            step_thread: None,
            spawned: Mutex::new(BTreeSet::new()),
            state: Lifecycle::Created,
        })
    }

    /// Reconcile once and start the background threads.
    ///
    /// Synchronized mode runs only the step driver, which reconciles at
    /// the top of every step; otherwise the reconcile loop runs and
    /// follows the world's ticks.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        if self.state != Lifecycle::Created {
            return Err(BridgeError::AlreadyStarted);
        }
        self.state = Lifecycle::Running;
        if !self.config.sync_mode() {
            let follower = TickFollower::new(Arc::clone(&self.world), Arc::clone(&self.publishers));
            return self.factory.start_with(Some(follower));
        }
        self.factory.reconcile();
        let driver = StepDriver::new(
            Arc::clone(&self.world),
            Arc::clone(&self.factory),
            Arc::clone(&self.publishers),
            self.acks.clone(),
            self.config.control_timeout(),
            self.shutdown.clone(),
            self.commands.1.clone(),
            self.commands.0.clone(),
        );
        let handle = thread::Builder::new()
            .name("simbridge-step".into())
            .spawn(move || driver.run())
            .map_err(|e| BridgeError::ThreadSpawnFailed {
                reason: format!("step thread: {e}"),
            })?;
        self.step_thread = Some(handle);
        Ok(())
    }

    /// Spawn an object on the consumer's behalf. The bridge destroys it
    /// again on shutdown unless the consumer does first.
    pub fn spawn_object(&self, request: SpawnRequest) -> Result<ActorId, BridgeError> {
        if self.shutdown.is_triggered() {
            return Err(BridgeError::ShuttingDown);
        }
        let id = self.factory.request_spawn(request)?;
        self.spawned.lock().insert(id);
        Ok(id)
    }

    /// Destroy `id` and its descendants. Returns the affected ids.
    pub fn destroy_object(&self, id: ActorId) -> Result<BTreeSet<ActorId>, BridgeError> {
        if self.shutdown.is_triggered() {
            return Err(BridgeError::ShuttingDown);
        }
        let closure = self.factory.request_destroy(id);
        let mut spawned = self.spawned.lock();
        for uid in &closure {
            spawned.remove(uid);
        }
        Ok(closure)
    }

    /// Pseudo types consumers may request.
    pub fn available_pseudo_types(&self) -> &'static [PseudoType] {
        self.factory.available_pseudo_types()
    }

    /// The actor factory, for inspection.
    pub fn factory(&self) -> &Arc<ActorFactory> {
        &self.factory
    }

    /// The per-frame publishers.
    pub fn publishers(&self) -> &Publishers {
        &self.publishers
    }

    /// The cancellation token shared by every background loop.
    pub fn shutdown_token(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Stop the threads, destroy everything the bridge spawned, and
    /// detach every mirrored object.
    ///
    /// Idempotent: later calls return an empty report.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.state == Lifecycle::Stopped {
            return ShutdownReport {
                total_ms: 0,
                reconcile_joined: true,
                step_joined: true,
                destroyed: 0,
            };
        }
        let start = Instant::now();
        self.state = Lifecycle::Stopped;
        self.shutdown.trigger();

        let step_joined = match self.step_thread.take() {
            Some(handle) => handle.join().is_ok(),
            None => true,
        };
        let reconcile_joined = self.factory.join();

        let spawned = std::mem::take(&mut *self.spawned.lock());
        let mut destroyed = BTreeSet::new();
        for id in spawned {
            destroyed.extend(self.factory.request_destroy(id));
        }
        self.factory.reconcile();
        self.factory.clear();
        if self.control_reader {
            self.node.remove_reader(CONTROL_TOPIC);
            self.control_reader = false;
        }

        let total_ms = start.elapsed().as_millis() as u64;
        debug!(total_ms, destroyed = destroyed.len(), "bridge shut down");
        ShutdownReport {
            total_ms,
            reconcile_joined,
            step_joined,
            destroyed: destroyed.len(),
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if self.state != Lifecycle::Stopped {
            self.shutdown();
        }
    }
}
