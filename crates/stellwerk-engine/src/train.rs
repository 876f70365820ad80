//! Runtime state of one train.
//!
//! A train's footprint on the layout is its *trail*: a contiguous,
//! head-first deque of sections. Wagon `i` (for `exited <= i < entered`)
//! sits on `trail[i - exited]`; wagons below `exited` have left through
//! the despawn boundary and wagons at or above `entered` are still out
//! of frame behind the spawn section. All wagons share the head's
//! fractional offset in lockstep.

use crate::router::RoutePlan;
use std::collections::VecDeque;
use stellwerk_core::{
    BlockId, Heading, SectionId, SpawnRequest, StopId, TrainId, TrainStatus, TrainType,
    TrainTypeId, WagonId,
};

/// Largest representable offset below the section boundary, used when a
/// carry has to be clamped back into `[0, 1)`.
pub(crate) const ALMOST_ONE: f64 = 1.0 - 1e-9;

#[derive(Clone, Debug)]
pub(crate) struct Train {
    pub id: TrainId,
    pub code: String,
    pub train_type: TrainTypeId,
    /// Arbitration rank, resolved from the type table at spawn.
    pub priority: u8,
    /// Cruising speed in sections per simulated minute.
    pub speed: f64,
    pub status: TrainStatus,
    /// Orientation of the most recent head transition.
    pub heading: Option<Heading>,
    /// Lockstep fractional progress of every wagon, in `[0, 1)`.
    pub offset: f64,
    pub num_wagons: u8,
    /// Wagon ids are `wagon_base + index`.
    pub wagon_base: WagonId,
    /// Occupied sections, head first. Length is `entered - exited`.
    pub trail: VecDeque<SectionId>,
    /// Wagons that have come on-layout through the spawn section.
    pub entered: u8,
    /// Wagons that have left through the despawn boundary.
    pub exited: u8,
    pub desired_stop: Option<StopId>,
    /// Remaining dwell time in simulated seconds.
    pub dwell_remaining: f64,
    /// Consecutive ticks of admission denial.
    pub blocked_ticks: u32,
    /// The section whose denial is accumulating; replans route around it.
    pub contested: Option<SectionId>,
    pub plan: Option<RoutePlan>,
    /// The block the head most recently left.
    pub previous_block: Option<BlockId>,
    /// The entry section this train spawned at.
    pub entry: SectionId,
    /// The despawn section transit routing targets; updated after dwell.
    pub transit_exit: SectionId,
}

impl Train {
    pub fn new(
        req: &SpawnRequest,
        train_type: &TrainType,
        wagon_base: WagonId,
        transit_exit: SectionId,
    ) -> Self {
        Self {
            id: req.train_id,
            code: req.code.clone(),
            train_type: req.train_type,
            priority: train_type.priority_index,
            speed: train_type.cruising_speed,
            status: TrainStatus::Scheduled,
            heading: None,
            offset: 0.0,
            num_wagons: req.num_wagons,
            wagon_base,
            trail: VecDeque::with_capacity(req.num_wagons as usize),
            entered: 0,
            exited: 0,
            desired_stop: req.desired_stop,
            dwell_remaining: 0.0,
            blocked_ticks: 0,
            contested: None,
            plan: None,
            previous_block: None,
            entry: req.entry_section,
            transit_exit,
        }
    }

    /// The section the head wagon occupies, if materialized.
    pub fn head_section(&self) -> Option<SectionId> {
        self.trail.front().copied()
    }

    /// Whether every wagon has come on-layout.
    pub fn is_fully_entered(&self) -> bool {
        self.entered == self.num_wagons
    }

    /// Wagons currently on the layout: `(wagon id, wagon index, section)`.
    pub fn wagons_on_layout(&self) -> impl Iterator<Item = (WagonId, u8, SectionId)> + '_ {
        (self.exited..self.entered).map(move |i| {
            let section = self.trail[(i - self.exited) as usize];
            (WagonId(self.wagon_base.0 + u32::from(i)), i, section)
        })
    }

    /// Reset the denial bookkeeping after a successful move or replan.
    pub fn clear_denials(&mut self) {
        self.blocked_ticks = 0;
        self.contested = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SpawnRequest {
        SpawnRequest {
            train_id: TrainId(7),
            code: "R 7".into(),
            train_type: TrainTypeId(1),
            entry_section: SectionId(0),
            num_wagons: 3,
            desired_stop: None,
        }
    }

    fn train_type() -> TrainType {
        TrainType {
            id: TrainTypeId(1),
            name: "Regional".into(),
            priority_index: 1,
            cruising_speed: 60.0,
        }
    }

    #[test]
    fn new_train_is_scheduled_and_off_layout() {
        let t = Train::new(&request(), &train_type(), WagonId(1000), SectionId(41));
        assert_eq!(t.status, TrainStatus::Scheduled);
        assert_eq!(t.head_section(), None);
        assert_eq!(t.wagons_on_layout().count(), 0);
        assert!(!t.is_fully_entered());
    }

    #[test]
    fn wagon_ids_are_base_plus_index() {
        let mut t = Train::new(&request(), &train_type(), WagonId(1000), SectionId(41));
        t.trail.push_front(SectionId(0));
        t.entered = 1;
        t.trail.push_front(SectionId(2));
        t.entered = 2;

        let wagons: Vec<_> = t.wagons_on_layout().collect();
        assert_eq!(
            wagons,
            vec![
                (WagonId(1000), 0, SectionId(2)),
                (WagonId(1001), 1, SectionId(0)),
            ]
        );
    }

    #[test]
    fn exited_wagons_shift_the_mapping() {
        let mut t = Train::new(&request(), &train_type(), WagonId(1000), SectionId(41));
        t.trail = [SectionId(41), SectionId(40)].into_iter().collect();
        t.entered = 3;
        t.exited = 1;

        let wagons: Vec<_> = t.wagons_on_layout().collect();
        assert_eq!(
            wagons,
            vec![
                (WagonId(1001), 1, SectionId(41)),
                (WagonId(1002), 2, SectionId(40)),
            ]
        );
    }
}
