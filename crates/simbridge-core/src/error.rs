//! Error types for the simbridge workspace.
//!
//! Organised by concern: identifier construction, capability failures
//! reported by `World`/`Node` implementations, bridge-level request
//! validation, and per-object update failures.

use thiserror::Error;

use crate::id::ActorId;

/// Errors from identifier construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum IdError {
    /// The value does not fit the unsigned 32-bit id range.
    #[error("actor id {value} exceeds maximum supported value {}", u32::MAX)]
    Overflow {
        /// The rejected value.
        value: u64,
    },
}

/// Failures reported by a [`World`](crate::World) implementation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WorldError {
    /// The referenced live object does not exist (anymore).
    #[error("live object {0} not found")]
    NotFound(ActorId),
    /// The simulator refused to spawn the object.
    #[error("spawn failed: {reason}")]
    SpawnFailed {
        /// Simulator-provided reason.
        reason: String,
    },
    /// The simulator connection is unavailable.
    #[error("simulator unavailable: {reason}")]
    Unavailable {
        /// Description of the failure.
        reason: String,
    },
}

/// Failures reported by a [`Node`](crate::Node) implementation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum NodeError {
    /// The topic could not be created.
    #[error("topic '{topic}' unavailable: {reason}")]
    TopicUnavailable {
        /// The topic name.
        topic: String,
        /// Description of the failure.
        reason: String,
    },
    /// The node has shut down.
    #[error("node is shut down")]
    Shutdown,
}

/// Errors raised synchronously to callers of the bridge entry points.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The referenced parent id is neither mirrored nor pending.
    #[error("parent actor {0} not found")]
    ParentNotFound(ActorId),
    /// No blueprint matches the requested type.
    #[error("unknown blueprint '{0}'")]
    UnknownBlueprint(String),
    /// A wildcard type matched no blueprint.
    #[error("no blueprint matches pattern '{0}'")]
    NoMatchingBlueprint(String),
    /// The configuration failed validation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Validation message.
        reason: String,
    },
    /// The background loop was started twice.
    #[error("bridge already started")]
    AlreadyStarted,
    /// The bridge is shutting down and accepts no new work.
    #[error("bridge is shutting down")]
    ShuttingDown,
    /// A background thread could not be spawned.
    #[error("thread spawn failed: {reason}")]
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
    /// Identifier construction failed.
    #[error(transparent)]
    Id(#[from] IdError),
    /// The simulator reported a failure.
    #[error("world: {0}")]
    World(#[from] WorldError),
    /// The pub/sub node reported a failure.
    #[error("node: {0}")]
    Node(#[from] NodeError),
}

/// A single object's per-frame update failed.
///
/// Never fatal: the update pass logs it and moves on to the next object.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum UpdateError {
    /// The translation layer rejected the update.
    #[error("translation failed: {reason}")]
    Translation {
        /// Description of the failure.
        reason: String,
    },
    /// The live counterpart is gone; the next reconciliation removes it.
    #[error("live object {0} is gone")]
    LiveObjectGone(ActorId),
    /// A world call made during the update failed.
    #[error(transparent)]
    World(#[from] WorldError),
    /// Publishing through the node failed.
    #[error(transparent)]
    Node(#[from] NodeError),
}
