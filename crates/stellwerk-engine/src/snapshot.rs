//! Owned, serializable state snapshots.
//!
//! One [`Snapshot`] is produced per advancing tick and published to
//! subscribers. It is self-contained — cloning or shipping it across
//! threads never touches engine state.

use serde::Serialize;
use stellwerk_core::{SectionId, StopId, TickId, TrainId, TrainStatus, WagonId};

/// Per-train record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainSnapshot {
    /// Train id.
    pub id: TrainId,
    /// Display code.
    pub code: String,
    /// Lifecycle status.
    pub status: TrainStatus,
    /// The head wagon's section; the entry section while `Scheduled`.
    pub head_section: Option<SectionId>,
    /// `+1` east, `-1` west, `0` before the first move.
    pub direction: i8,
    /// The stop the train still intends to dwell at.
    pub desired_stop: Option<StopId>,
}

/// Per-wagon record. Only wagons currently on the layout appear.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WagonSnapshot {
    /// Wagon id (`base + index`).
    pub id: WagonId,
    /// Owning train.
    pub train: TrainId,
    /// Index within the train; 0 is the locomotive.
    pub index: u8,
    /// The occupied section.
    pub section: SectionId,
    /// Fractional progress across the section, in `[0, 1)`.
    pub position_offset: f64,
}

/// Per-connection diagnostic record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConnectionSnapshot {
    /// Source section.
    pub from: SectionId,
    /// Target section.
    pub to: SectionId,
    /// Current active flag.
    pub active: bool,
}

/// The world as of one tick boundary.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    /// The tick this snapshot reflects.
    pub tick: TickId,
    /// Simulated seconds elapsed since engine construction.
    pub sim_time_seconds: f64,
    /// All trains, submission order.
    pub trains: Vec<TrainSnapshot>,
    /// All on-layout wagons, grouped by train.
    pub wagons: Vec<WagonSnapshot>,
    /// All connections with their active flags.
    pub connections: Vec<ConnectionSnapshot>,
}
