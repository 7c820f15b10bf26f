//! Actor lifecycle and frame synchronization for simbridge.
//!
//! A [`Bridge`] keeps a *mirror table* of locally-owned objects in step
//! with the simulator's live object graph, runs their per-frame update
//! hooks, and (in synchronized mode) paces the simulator so every sensor
//! sample reaches the consumer in the frame that produced it.
//!
//! ```text
//!            ┌────────────── Bridge ──────────────┐
//!  consumer ─┤ spawn_object / destroy_object      │
//!            │        │                           │
//!            │        ▼                           │
//!            │   ActorFactory ◄── reconcile thread│ (unsynchronized)
//!            │   (MirrorTable,                    │
//!            │    TaskQueue)  ◄── StepDriver ─────┼──► World::advance_step
//!            │        │                           │
//!            │        ▼ update_actor_states       │
//!            │   MirroredObject ─► SensorSync ────┼──► Translator
//!            └────────────────────────────────────┘
//! ```
//!
//! Everything the bridge touches outside itself goes through the
//! capability traits in `simbridge-core`: [`World`](simbridge_core::World),
//! [`Node`](simbridge_core::Node) and [`Translator`](simbridge_core::Translator).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod ack;
pub mod actor;
pub mod bridge;
pub mod config;
pub mod factory;
pub mod registry;
pub mod sensor;
pub mod shutdown;
pub mod status;
pub mod step;
pub mod table;
pub mod task_queue;

pub use ack::{AckOutcome, AckTracker};
pub use actor::MirroredObject;
pub use bridge::{Bridge, ShutdownReport};
pub use config::{BridgeConfig, ConfigError};
pub use factory::ActorFactory;
pub use sensor::{Released, SensorSync};
pub use shutdown::Shutdown;
pub use status::{ClockPublisher, StatusPublisher, WorldInfoPublisher};
pub use step::{Publishers, RunState, StepDriver, TickFollower};
pub use table::MirrorTable;
pub use task_queue::{PendingTask, TaskQueue};
