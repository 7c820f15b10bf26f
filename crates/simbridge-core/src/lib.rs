//! Core types and traits for the simbridge workspace.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! vocabulary shared by the engine and by capability implementations:
//! actor and frame ids, transforms, messages and sensor samples, the
//! closed set of mirrored-object kinds, error types, and the `World`,
//! `Node` and `Translator` traits.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod actor;
pub mod error;
pub mod id;
pub mod message;
pub mod traits;
pub mod transform;
pub mod world;

pub use actor::{ActorInfo, ActorKind, Classification, PseudoType, SensorType};
pub use error::{BridgeError, IdError, NodeError, UpdateError, WorldError};
pub use id::{ActorId, FrameId};
pub use message::{ControlCommand, Message, SensorSample, StatusMessage, VehicleControl};
pub use traits::{MessageCallback, Node, SampleCallback, Translator, World, Writer};
pub use transform::{Rotation, Transform, Vector3};
pub use world::{Blueprint, LiveObject, MapInfo, SpawnRequest, WorldSnapshot};
