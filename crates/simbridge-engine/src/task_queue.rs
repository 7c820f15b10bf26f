//! FIFO of pending lifecycle operations.
//!
//! [`TaskQueue`] buffers spawn and destroy requests between the caller's
//! thread and the next reconciliation pass. Tasks are applied strictly in
//! submission order; nothing is reordered, merged, or deduplicated. The
//! queue itself is not synchronized: it lives inside the factory's spawn
//! lock, so enqueue and drain of one batch never interleave.

use std::collections::VecDeque;

use simbridge_core::{ActorId, SpawnRequest};

/// A queued lifecycle operation.
#[derive(Clone, Debug, PartialEq)]
pub enum PendingTask {
    /// The live object `id` was spawned on request; mirror it.
    SpawnReal {
        /// Live id, reused as the mirror id.
        id: ActorId,
        /// The originating request.
        request: SpawnRequest,
    },
    /// Create the virtual object `id`.
    SpawnPseudo {
        /// Allocated mirror id.
        id: ActorId,
        /// The originating request.
        request: SpawnRequest,
    },
    /// Remove `id` from the mirror table.
    Destroy {
        /// Mirror id.
        id: ActorId,
        /// Also destroy the live counterpart.
        release_live: bool,
    },
}

/// Unbounded FIFO of [`PendingTask`]s.
#[derive(Debug, Default)]
pub struct TaskQueue {
    queue: VecDeque<PendingTask>,
}

impl TaskQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task.
    pub fn push(&mut self, task: PendingTask) {
        self.queue.push_back(task);
    }

    /// Take every queued task, oldest first.
    pub fn drain(&mut self) -> Vec<PendingTask> {
        self.queue.drain(..).collect()
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
