//! Stepping: the synchronized step driver and the passive tick follower.
//!
//! In synchronized mode a [`StepDriver`] owns the simulation clock. Each
//! iteration reconciles, advances the world one step, publishes status
//! and clock, runs every object's update hook (which releases the
//! sensor samples belonging to the frame) and finally waits, bounded,
//! for ego control acknowledgements.
//!
//! Run-state commands from `/carla/control` arrive over a crossbeam
//! channel and are applied between iterations:
//!
//! ```text
//!   Play ──────────► Playing ──► step, step, ...
//!   Pause ─────────► Paused  ──► block for the next command
//!   StepOnce ──────► SteppingOnce ──► one step, then Pause
//! ```
//!
//! The driver is the only thread that reconciles in this mode. In
//! unsynchronized mode another client drives the world; the reconcile
//! thread calls a [`TickFollower`] instead.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};
use tracing::{debug, info, warn};

use simbridge_core::{ControlCommand, FrameId, Node, World, WorldError};

use crate::ack::{AckOutcome, AckTracker};
use crate::factory::ActorFactory;
use crate::shutdown::Shutdown;
use crate::status::{ClockPublisher, StatusPublisher, WorldInfoPublisher};

/// Back-off after a failed step before retrying.
const STEP_RETRY: Duration = Duration::from_millis(100);

/// Stepping state of the synchronized driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// Waiting for a command; the world does not advance.
    Paused,
    /// Stepping continuously.
    Playing,
    /// Running exactly one step before pausing again.
    SteppingOnce,
}

impl From<ControlCommand> for RunState {
    fn from(cmd: ControlCommand) -> Self {
        match cmd {
            ControlCommand::Pause => Self::Paused,
            ControlCommand::Play => Self::Playing,
            ControlCommand::StepOnce => Self::SteppingOnce,
        }
    }
}

/// The per-frame publishers shared by both stepping modes.
pub struct Publishers {
    /// `/carla/status`.
    pub status: StatusPublisher,
    /// `/clock`.
    pub clock: ClockPublisher,
    /// `/carla/world_info`.
    pub world_info: WorldInfoPublisher,
}

impl Publishers {
    /// Create all three writers; publishes the initial status.
    pub fn new(
        node: &dyn Node,
        synchronous_mode: bool,
        fixed_delta_seconds: f64,
    ) -> Result<Self, simbridge_core::NodeError> {
        Ok(Self {
            status: StatusPublisher::new(node, synchronous_mode, fixed_delta_seconds)?,
            clock: ClockPublisher::new(node)?,
            world_info: WorldInfoPublisher::new(node)?,
        })
    }

    fn on_frame(&self, world: &dyn World, frame: FrameId, elapsed_seconds: f64) {
        self.status.set_frame(frame);
        self.clock.publish(elapsed_seconds);
        self.world_info.update(world);
    }
}

// ── StepDriver ───────────────────────────────────────────────────

/// Drives the simulator one step at a time.
pub struct StepDriver {
    world: Arc<dyn World>,
    factory: Arc<ActorFactory>,
    publishers: Arc<Publishers>,
    acks: Option<Arc<AckTracker>>,
    control_timeout: Duration,
    shutdown: Shutdown,
    commands: Receiver<ControlCommand>,
    requeue: Sender<ControlCommand>,
    state: RunState,
}

impl StepDriver {
    /// Create a driver starting in [`RunState::Playing`].
    ///
    /// `commands`/`requeue` are the two ends of the run-state channel;
    /// `acks` is present only when steps wait for ego control.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        world: Arc<dyn World>,
        factory: Arc<ActorFactory>,
        publishers: Arc<Publishers>,
        acks: Option<Arc<AckTracker>>,
        control_timeout: Duration,
        shutdown: Shutdown,
        commands: Receiver<ControlCommand>,
        requeue: Sender<ControlCommand>,
    ) -> Self {
        Self {
            world,
            factory,
            publishers,
            acks,
            control_timeout,
            shutdown,
            commands,
            requeue,
            state: RunState::Playing,
        }
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Step until shutdown.
    pub fn run(mut self) {
        while !self.shutdown.is_triggered() {
            if self.factory.node_is_shutdown() {
                self.shutdown.trigger();
                break;
            }
            if !self.apply_commands() {
                break;
            }
            if let Err(e) = self.step() {
                warn!(error = %e, "step failed");
                if self.shutdown.wait_timeout(STEP_RETRY) {
                    break;
                }
            }
        }
        debug!("step driver stopped");
    }

    /// Apply pending run-state commands, collapsed to the most recent.
    ///
    /// Blocks while paused. Returns `false` when shutdown interrupted the
    /// wait.
    pub fn apply_commands(&mut self) -> bool {
        let mut next = self.commands.try_iter().last();
        while let Some(cmd) = next {
            self.set_state(cmd.into());
            next = match cmd {
                ControlCommand::StepOnce => {
                    let _ = self.requeue.send(ControlCommand::Pause);
                    None
                }
                ControlCommand::Pause => {
                    select! {
                        recv(self.commands) -> msg => msg.ok(),
                        recv(self.shutdown.receiver()) -> _ => return false,
                    }
                }
                ControlCommand::Play => None,
            };
        }
        true
    }

    fn set_state(&mut self, state: RunState) {
        if self.state != state {
            info!(from = ?self.state, to = ?state, "run state changed");
            self.state = state;
        }
        self.publishers
            .status
            .set_synchronous_mode_running(state != RunState::Paused);
    }

    /// Run one full iteration and return the new frame.
    pub fn step(&self) -> Result<FrameId, WorldError> {
        if let Some(acks) = &self.acks {
            acks.reset(self.factory.ego_ids());
        }
        self.factory.reconcile();
        let advanced = self.world.advance_step()?;
        let snap = self.world.snapshot()?;
        if snap.frame != advanced {
            debug!(%advanced, latest = %snap.frame, "snapshot ahead of step");
        }
        self.publishers
            .on_frame(&*self.world, snap.frame, snap.elapsed_seconds);
        self.factory
            .update_actor_states(snap.frame, snap.elapsed_seconds);

        if let Some(acks) = &self.acks {
            match acks.wait(self.control_timeout, &self.shutdown) {
                AckOutcome::Complete => {}
                AckOutcome::TimedOut(missing) => {
                    warn!(frame = %snap.frame, ?missing, "no vehicle control received");
                }
                AckOutcome::Cancelled(_) => debug!("control wait cancelled by shutdown"),
            }
        }
        debug!(frame = %snap.frame, "step complete");
        Ok(snap.frame)
    }
}

// ── TickFollower ─────────────────────────────────────────────────

/// Follows world ticks driven by another client.
pub struct TickFollower {
    world: Arc<dyn World>,
    publishers: Arc<Publishers>,
    last_timestamp: Option<f64>,
}

impl TickFollower {
    /// A follower that has seen no tick yet.
    pub fn new(world: Arc<dyn World>, publishers: Arc<Publishers>) -> Self {
        Self {
            world,
            publishers,
            last_timestamp: None,
        }
    }

    /// Publish and update once if the world advanced since the last call.
    pub fn follow(&mut self, factory: &ActorFactory) {
        let snap = match self.world.snapshot() {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "snapshot unavailable");
                return;
            }
        };
        if self
            .last_timestamp
            .is_some_and(|t| snap.elapsed_seconds <= t)
        {
            return;
        }
        self.last_timestamp = Some(snap.elapsed_seconds);
        self.publishers
            .on_frame(&*self.world, snap.frame, snap.elapsed_seconds);
        factory.update_actor_states(snap.frame, snap.elapsed_seconds);
    }
}
