//! Train types, lifecycle status, and travel heading.

use crate::id::TrainTypeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Properties shared by all trains of one type.
///
/// The type table is part of the engine configuration; spawn requests
/// reference types by id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainType {
    /// Identifier referenced by spawn requests.
    pub id: TrainTypeId,
    /// Display name, e.g. "Regional".
    pub name: String,
    /// Arbitration rank. Higher values win conflicting claims.
    pub priority_index: u8,
    /// Cruising speed in sections per simulated minute.
    pub cruising_speed: f64,
}

/// Lifecycle state of a train.
///
/// Transitions are driven by the tick engine; `Despawned` is terminal and
/// the train is removed from the engine in the same tick it is reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrainStatus {
    /// Accepted but not yet materialized on the layout.
    Scheduled,
    /// Advancing along its route, subject to signaling.
    Moving,
    /// Stationary at its desired stop while the dwell timer runs.
    Dwelling,
    /// No route to the current goal under the current graph.
    Stuck,
    /// All wagons have left the layout.
    Despawned,
}

impl fmt::Display for TrainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scheduled => "Scheduled",
            Self::Moving => "Moving",
            Self::Dwelling => "Dwelling",
            Self::Stuck => "Stuck",
            Self::Despawned => "Despawned",
        };
        f.write_str(s)
    }
}

/// Geometric travel direction along the layout's horizontal axis.
///
/// Derived from section coordinates: an edge whose target lies at a
/// greater x than its source is an eastbound edge. A train's heading is
/// the orientation of its most recent head transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heading {
    /// Increasing x. Reported as direction `+1` in snapshots.
    East,
    /// Decreasing x. Reported as direction `-1` in snapshots.
    West,
}

impl Heading {
    /// The signed direction convention used in snapshots.
    pub fn sign(self) -> i8 {
        match self {
            Self::East => 1,
            Self::West => -1,
        }
    }

    /// The opposite heading.
    pub fn opposite(self) -> Self {
        match self {
            Self::East => Self::West,
            Self::West => Self::East,
        }
    }
}

impl fmt::Display for Heading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::East => f.write_str("east"),
            Self::West => f.write_str("west"),
        }
    }
}
