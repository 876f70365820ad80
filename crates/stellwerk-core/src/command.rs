//! Inbound commands and their per-command receipts.
//!
//! Commands cross the queue boundary into the tick engine and are applied
//! at the start of the next tick, in submission order. Every command in a
//! batch produces exactly one [`Receipt`].

use crate::error::CommandError;
use crate::id::{SectionId, StopId, TickId, TrainId, TrainTypeId};
use serde::{Deserialize, Serialize};

/// A request to place a new train on the layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// Caller-chosen train id; rejected if already present.
    pub train_id: TrainId,
    /// Display code, e.g. "R 2301".
    pub code: String,
    /// Train type, resolved against the configured type table.
    pub train_type: TrainTypeId,
    /// Entry section; must be a designated spawn point.
    pub entry_section: SectionId,
    /// Wagon count in `1..=15`, locomotive included.
    pub num_wagons: u8,
    /// Optional stop to dwell at; `None` means transit only.
    pub desired_stop: Option<StopId>,
}

/// All commands accepted by the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Place a new train (subject to spawn validation).
    Spawn(SpawnRequest),
    /// Toggle a connection's active flag. Takes effect this tick; rejected
    /// while either endpoint section is occupied.
    SetConnectionActive {
        /// Source section of the directed connection.
        from: SectionId,
        /// Target section of the directed connection.
        to: SectionId,
        /// The new active state.
        active: bool,
    },
    /// Remove every train and clear all reservations.
    ClearAll,
    /// Suspend simulation phases; command intake keeps running.
    Pause,
    /// Resume a paused simulation.
    Resume,
    /// Finish the current tick, emit a final snapshot, and stop.
    Shutdown,
}

/// Outcome of one command in a submitted batch.
#[derive(Clone, Debug, PartialEq)]
pub struct Receipt {
    /// Whether the command was applied.
    pub accepted: bool,
    /// The tick in which the command was applied, if it was.
    pub applied_tick: Option<TickId>,
    /// Rejection reason when `accepted` is false.
    pub reason: Option<CommandError>,
    /// Index of this command within the submitted batch.
    pub command_index: usize,
}

impl Receipt {
    /// Receipt for an applied command.
    pub fn ok(command_index: usize, tick: TickId) -> Self {
        Self {
            accepted: true,
            applied_tick: Some(tick),
            reason: None,
            command_index,
        }
    }

    /// Receipt for a rejected command.
    pub fn rejected(command_index: usize, reason: CommandError) -> Self {
        Self {
            accepted: false,
            applied_tick: None,
            reason: Some(reason),
            command_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpawnError;

    #[test]
    fn receipt_constructors() {
        let ok = Receipt::ok(3, TickId(7));
        assert!(ok.accepted);
        assert_eq!(ok.applied_tick, Some(TickId(7)));
        assert_eq!(ok.command_index, 3);

        let no = Receipt::rejected(0, SpawnError::DuplicateTrainId.into());
        assert!(!no.accepted);
        assert_eq!(no.reason, Some(CommandError::Spawn(SpawnError::DuplicateTrainId)));
    }
}
