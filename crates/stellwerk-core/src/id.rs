//! Strongly-typed identifiers.
//!
//! Cross-references between trains, wagons, sections, and blocks are ids,
//! never pointers: every entity lives in an indexed collection owned by the
//! engine, and these newtypes keep the id spaces from mixing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a track section, the atomic occupancy unit.
///
/// Section ids come from the topology input and may be sparse; the
/// topology assigns each one a dense internal index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(pub u32);

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SectionId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a reservation block (a named group of sections).
///
/// Assigned sequentially by the topology loader; `BlockId(n)` is the n-th
/// block in load order, implicit single-section blocks included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BlockId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a train for the lifetime of its run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainId(pub u32);

impl fmt::Display for TrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TrainId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a wagon across all trains.
///
/// The engine allocates wagon ids from a monotonic counter; a train's
/// wagons are `base + index` with index 0 being the locomotive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WagonId(pub u32);

impl fmt::Display for WagonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for WagonId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a stop (a named dwell point placed on a section).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StopId(pub u32);

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StopId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a train type (priority class plus cruising speed).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainTypeId(pub u32);

impl fmt::Display for TrainTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TrainTypeId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Monotonically increasing tick counter.
///
/// Incremented each time the simulation advances one step; pausing the
/// simulation does not advance it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TickId(pub u64);

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TickId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
