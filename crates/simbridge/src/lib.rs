//! simbridge: mirror a live simulator's object graph into a
//! publish/subscribe node, frame by frame.
//!
//! This is the top-level facade crate that re-exports the public API of the
//! simbridge sub-crates. For most users, adding `simbridge` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! The bridge talks to the outside world only through three capability
//! traits. Implement [`World`](types::World) over your simulator client,
//! [`Node`](types::Node) over your pub/sub transport, and
//! [`Translator`](types::Translator) to turn mirrored objects and sensor
//! samples into messages.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use simbridge::prelude::*;
//!
//! fn run(world: Arc<dyn World>, node: Arc<dyn Node>, translator: Arc<dyn Translator>) {
//!     let config = BridgeConfig::from_toml_str(
//!         r#"
//!         synchronous_mode = true
//!         wait_for_vehicle_control = true
//!         ego_role_names = ["hero"]
//!         "#,
//!     )
//!     .unwrap();
//!     let mut bridge = Bridge::new(config, world, node, translator).unwrap();
//!     bridge.start().unwrap();
//!
//!     let hero = bridge
//!         .spawn_object(SpawnRequest::new("vehicle.tesla.model3", "hero"))
//!         .unwrap();
//!     bridge
//!         .spawn_object(SpawnRequest::new("sensor.pseudo.odom", "odometry").attached_to(hero))
//!         .unwrap();
//!
//!     // ... consumer runs ...
//!
//!     let report = bridge.shutdown();
//!     assert!(report.step_joined);
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `simbridge-core` | IDs, transforms, actor kinds, messages, capability traits |
//! | [`engine`] | `simbridge-engine` | Bridge, actor factory, step driver, sensor sync |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`simbridge-core`).
///
/// Contains the actor model, spawn requests, messages, error types and
/// the capability traits ([`types::World`], [`types::Node`],
/// [`types::Translator`]).
pub use simbridge_core as types;

/// Lifecycle and synchronization engine (`simbridge-engine`).
///
/// [`engine::Bridge`] wires everything together; [`engine::ActorFactory`]
/// and [`engine::StepDriver`] are usable on their own for custom loops.
pub use simbridge_engine as engine;

/// Common imports for typical simbridge usage.
///
/// ```rust
/// use simbridge::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use simbridge_core::{
        ActorId, ActorInfo, ActorKind, ControlCommand, FrameId, Message, SensorSample, SpawnRequest,
        Transform,
    };
    pub use simbridge_core::{Node, Translator, World, Writer};

    // Errors
    pub use simbridge_core::{BridgeError, NodeError, UpdateError, WorldError};

    // Engine
    pub use simbridge_engine::{Bridge, BridgeConfig, ConfigError, ShutdownReport};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;

    use simbridge_test_utils::{MockNode, MockWorld, RecordingTranslator};

    #[test]
    fn prelude_builds_and_stops_a_bridge() {
        let config = BridgeConfig {
            synchronous_mode: false,
            ..BridgeConfig::default()
        };
        let mut bridge = Bridge::new(
            config,
            Arc::new(MockWorld::new()),
            Arc::new(MockNode::new()),
            Arc::new(RecordingTranslator::new()),
        )
        .unwrap();
        bridge.start().unwrap();
        let tf = bridge
            .spawn_object(SpawnRequest::new("sensor.pseudo.tf", "tf"))
            .unwrap();
        assert_eq!(tf, ActorId::new(10_000));
        let report = bridge.shutdown();
        assert!(report.reconcile_joined);
        assert_eq!(report.destroyed, 1);
    }
}
