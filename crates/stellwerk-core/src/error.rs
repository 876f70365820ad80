//! Error taxonomy for the simulator.
//!
//! Organized by subsystem: routing, spawn admission, switch commands,
//! command dispatch, and the fatal invariant check. Admission denials are
//! deliberately absent — being held at a signal is backpressure, not an
//! error.

use crate::id::{BlockId, SectionId, StopId, TrainId, TrainTypeId};
use std::error::Error;
use std::fmt;

/// Errors from the route planner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteError {
    /// The goal is unreachable under the current active-connection graph.
    /// The train is held in place and surfaced as `Stuck`.
    NoRouteFound,
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRouteFound => write!(f, "no route to goal"),
        }
    }
}

impl Error for RouteError {}

/// Reasons a spawn request is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpawnError {
    /// The entry section is occupied.
    EntryOccupied,
    /// The entry section's block is held by another train.
    EntryBlockHeld,
    /// A train with this id is already present.
    DuplicateTrainId,
    /// Wagon count outside `1..=15`.
    InvalidWagonCount {
        /// The requested count.
        got: u8,
    },
    /// The desired stop does not exist in the topology.
    UnknownStop {
        /// The unknown stop id.
        stop: StopId,
    },
    /// The train type is not in the configured type table.
    UnknownTrainType {
        /// The unknown type id.
        train_type: TrainTypeId,
    },
    /// The requested section is not a designated entry point.
    NotAnEntrySection {
        /// The offending section.
        section: SectionId,
    },
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntryOccupied => write!(f, "entry section occupied"),
            Self::EntryBlockHeld => write!(f, "entry block held by another train"),
            Self::DuplicateTrainId => write!(f, "train id already present"),
            Self::InvalidWagonCount { got } => {
                write!(f, "wagon count {got} outside 1..=15")
            }
            Self::UnknownStop { stop } => write!(f, "unknown stop {stop}"),
            Self::UnknownTrainType { train_type } => {
                write!(f, "unknown train type {train_type}")
            }
            Self::NotAnEntrySection { section } => {
                write!(f, "section {section} is not a spawn point")
            }
        }
    }
}

impl Error for SpawnError {}

/// Reasons a `SetConnectionActive` command is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchError {
    /// A wagon sits on one of the connection's endpoint sections; the
    /// active flag may not change under a train.
    SwitchOccupied,
    /// No such directed connection exists in the topology.
    UnknownConnection {
        /// Source section of the requested connection.
        from: SectionId,
        /// Target section of the requested connection.
        to: SectionId,
    },
}

impl fmt::Display for SwitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SwitchOccupied => write!(f, "switch endpoint occupied"),
            Self::UnknownConnection { from, to } => {
                write!(f, "no connection {from} -> {to}")
            }
        }
    }
}

impl Error for SwitchError {}

/// Rejection reason attached to a command receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandError {
    /// Spawn request rejected.
    Spawn(SpawnError),
    /// Switch command rejected.
    Switch(SwitchError),
    /// The bounded command queue was at capacity at submission.
    QueueFull,
    /// The engine has halted on an invariant violation; the command was
    /// not applied.
    EngineHalted,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "spawn rejected: {e}"),
            Self::Switch(e) => write!(f, "switch rejected: {e}"),
            Self::QueueFull => write!(f, "command queue full"),
            Self::EngineHalted => write!(f, "engine halted"),
        }
    }
}

impl Error for CommandError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn(e) => Some(e),
            Self::Switch(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SpawnError> for CommandError {
    fn from(e: SpawnError) -> Self {
        Self::Spawn(e)
    }
}

impl From<SwitchError> for CommandError {
    fn from(e: SwitchError) -> Self {
        Self::Switch(e)
    }
}

/// A fatal internal contradiction detected at a tick boundary.
///
/// The engine is designed so these cannot occur; the check exists as an
/// executable assertion. On detection the engine halts and refuses
/// further ticks.
#[derive(Clone, Debug, PartialEq)]
pub enum InvariantViolation {
    /// Two wagons found in one section.
    SectionDoubleOccupancy {
        /// The doubly-occupied section.
        section: SectionId,
    },
    /// Wagons of two trains found in one block.
    BlockDoubleOccupancy {
        /// The doubly-occupied block.
        block: BlockId,
    },
    /// A train's occupied sections do not form a connected path.
    TrailDiscontinuity {
        /// The train whose trail broke.
        train: TrainId,
        /// Adjacent trail entries with no connecting edge.
        between: (SectionId, SectionId),
    },
    /// A wagon offset escaped `[0, 1)`.
    OffsetOutOfRange {
        /// The train carrying the offset.
        train: TrainId,
        /// The offending value.
        offset: f64,
    },
    /// The reservation table disagrees with the trains' actual footprint.
    ReservationMismatch {
        /// The section where the disagreement was found.
        section: SectionId,
    },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SectionDoubleOccupancy { section } => {
                write!(f, "two wagons in section {section}")
            }
            Self::BlockDoubleOccupancy { block } => {
                write!(f, "two trains in block {block}")
            }
            Self::TrailDiscontinuity { train, between } => write!(
                f,
                "train {train} trail breaks between sections {} and {}",
                between.0, between.1
            ),
            Self::OffsetOutOfRange { train, offset } => {
                write!(f, "train {train} offset {offset} outside [0, 1)")
            }
            Self::ReservationMismatch { section } => {
                write!(f, "reservation table disagrees at section {section}")
            }
        }
    }
}

impl Error for InvariantViolation {}

/// Errors from `execute_tick`.
#[derive(Clone, Debug, PartialEq)]
pub enum StepError {
    /// An invariant violation was detected this tick; the engine is now
    /// halted.
    Invariant(InvariantViolation),
    /// The engine halted on a previous tick and refuses to advance.
    Halted,
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invariant(v) => write!(f, "invariant violated: {v}"),
            Self::Halted => write!(f, "engine halted on earlier invariant violation"),
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Invariant(v) => Some(v),
            Self::Halted => None,
        }
    }
}

impl From<InvariantViolation> for StepError {
    fn from(v: InvariantViolation) -> Self {
        Self::Invariant(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_source_chains() {
        let e = CommandError::Spawn(SpawnError::EntryOccupied);
        assert!(e.source().is_some());
        assert_eq!(e.to_string(), "spawn rejected: entry section occupied");
    }

    #[test]
    fn invariant_display_names_the_section() {
        let v = InvariantViolation::SectionDoubleOccupancy {
            section: SectionId(31),
        };
        assert_eq!(v.to_string(), "two wagons in section 31");
    }
}
