//! Strongly-typed identifiers for mirrored objects and simulation frames.

use std::fmt;

use crate::error::IdError;

/// Identifies a mirrored object, and the live object it tracks.
///
/// Real objects reuse the id the simulator assigned to their live
/// counterpart. Pseudo objects draw ids from a counter seeded above any
/// id the simulator hands out. Ids are bounded to the unsigned 32-bit
/// range; wider values are rejected at construction.
///
/// # Examples
///
/// ```
/// use simbridge_core::ActorId;
///
/// let id = ActorId::try_from(42u64).unwrap();
/// assert_eq!(id.get(), 42);
/// assert!(ActorId::try_from(u64::from(u32::MAX) + 1).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(u32);

impl ActorId {
    /// Wrap a raw 32-bit id.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw id.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ActorId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl TryFrom<u64> for ActorId {
    type Error = IdError;

    fn try_from(v: u64) -> Result<Self, Self::Error> {
        u32::try_from(v)
            .map(Self)
            .map_err(|_| IdError::Overflow { value: v })
    }
}

/// Discrete simulation step identifier.
///
/// Incremented by the simulator each time the world advances one step.
/// Sensor samples carry the frame that produced them so they can be
/// released to the consumer in the step they belong to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for FrameId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
