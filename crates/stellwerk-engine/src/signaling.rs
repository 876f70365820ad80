//! Per-tick admission decisions.
//!
//! Signaling runs once per tick, before kinematics, for every moving
//! train whose head would cross its section boundary this tick. Trains
//! are evaluated in priority order and record their claims in a
//! [`ClaimSet`]; a later (lower-priority) train that wants an already
//! claimed section or block is denied for the tick, so arbitration
//! falls out of the evaluation order without a separate resolver.

use crate::config::SimConfig;
use crate::reservation::ReservationTable;
use crate::router::{plan_route, RoutePlan, RouteRequest};
use crate::train::Train;
use std::collections::HashSet;
use stellwerk_core::{BlockId, SectionId, TrainId};
use stellwerk_topology::Topology;

/// What a train is allowed to do this tick.
#[derive(Clone, Debug)]
pub(crate) enum Decision {
    /// Cross into the next section.
    Proceed {
        /// The admitted section.
        next: SectionId,
    },
    /// Commit a push-back reversal: re-index wagons, mirror the offset,
    /// adopt this plan from the new head. Admissibility of the new
    /// head's first move has been checked.
    Reverse {
        /// Plan from the new head (the old tail section).
        plan: RoutePlan,
    },
    /// Cross the despawn boundary: one wagon leaves the layout.
    Exit,
    /// The plan demands a reversal that is structurally impossible from
    /// the new head; the engine drops the goal and retargets.
    DropGoal,
    /// Denied for this tick; the train holds its offset.
    Hold {
        /// The section that was wanted, when known.
        next: Option<SectionId>,
        /// Why admission failed.
        reason: HoldReason,
    },
}

/// Why a train was held at its boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HoldReason {
    /// No usable plan; upkeep will replan next tick.
    NoPlan,
    /// The connection is missing, inactive, or excluded by the
    /// previous-block rule.
    EdgeBlocked,
    /// The next section is reserved or was claimed this tick.
    SectionOccupied,
    /// The next block is held by another train or claimed this tick.
    BlockHeld,
    /// The next block could not be left again (dead-end pocket).
    NoExit,
}

/// Sections and blocks granted so far in this tick's signaling pass.
#[derive(Debug, Default)]
pub(crate) struct ClaimSet {
    sections: HashSet<SectionId>,
    blocks: HashSet<BlockId>,
}

/// Evaluate one train's admission. The caller guarantees the train is
/// moving and would cross its boundary this tick.
pub(crate) fn evaluate(
    topology: &Topology,
    reservations: &ReservationTable,
    config: &SimConfig,
    train: &Train,
    claims: &mut ClaimSet,
) -> Decision {
    let Some(head) = train.head_section() else {
        return Decision::Hold {
            next: None,
            reason: HoldReason::NoPlan,
        };
    };
    let Some(plan) = &train.plan else {
        return Decision::Hold {
            next: None,
            reason: HoldReason::NoPlan,
        };
    };

    if plan.is_exhausted() {
        if plan.goal().section() == head && topology.is_despawn(head) {
            return Decision::Exit;
        }
        return Decision::Hold {
            next: None,
            reason: HoldReason::NoPlan,
        };
    }
    let Some(next) = plan.peek_next() else {
        return Decision::Hold {
            next: None,
            reason: HoldReason::NoPlan,
        };
    };

    // A plan that steps into the train's own second section is a
    // push-back: the tail must lead.
    if train.trail.len() > 1 && train.trail.get(1) == Some(&next) {
        return evaluate_reversal(topology, reservations, config, train);
    }

    match admit(
        topology,
        reservations,
        train.id,
        head,
        next,
        train.previous_block,
        plan,
        config.exit_lookahead,
        claims,
    ) {
        Some(reason) => Decision::Hold {
            next: Some(next),
            reason,
        },
        None => {
            claims.sections.insert(next);
            let b_next = topology.block_of(next);
            if b_next != topology.block_of(head) {
                if let Some(b) = b_next {
                    claims.blocks.insert(b);
                }
            }
            Decision::Proceed { next }
        }
    }
}

/// Run the admission rules for entering `next` from `head`. Returns the
/// hold reason, or `None` when the move is admissible.
#[allow(clippy::too_many_arguments)]
fn admit(
    topology: &Topology,
    reservations: &ReservationTable,
    train: TrainId,
    head: SectionId,
    next: SectionId,
    previous_block: Option<BlockId>,
    plan: &RoutePlan,
    lookahead: usize,
    claims: &ClaimSet,
) -> Option<HoldReason> {
    if !topology.edge_allowed(head, next, previous_block) {
        return Some(HoldReason::EdgeBlocked);
    }
    if reservations.peek(topology, next).is_some() || claims.sections.contains(&next) {
        return Some(HoldReason::SectionOccupied);
    }
    let (Some(b_next), Some(b_cur)) = (topology.block_of(next), topology.block_of(head)) else {
        return Some(HoldReason::EdgeBlocked);
    };
    if b_next != b_cur {
        if !reservations.block_free_or_held_by(b_next, train) || claims.blocks.contains(&b_next) {
            return Some(HoldReason::BlockHeld);
        }
        if !has_exit(topology, reservations, train, b_next, plan, lookahead) {
            return Some(HoldReason::NoExit);
        }
    }
    None
}

/// The contract on block entry: a train may enter a block only if it can
/// also leave it. Walks the train's plan past the entered block within
/// the lookahead; if the plan never leaves the block in that window,
/// falls back to a static scan of the block's outgoing edges.
fn has_exit(
    topology: &Topology,
    reservations: &ReservationTable,
    train: TrainId,
    entered: BlockId,
    plan: &RoutePlan,
    lookahead: usize,
) -> bool {
    let mut walked = 0;
    for &sec in plan.beyond_next() {
        if walked >= lookahead {
            // Plan stays inside the block beyond the window; check the
            // block's edges statically.
            return block_has_open_edge(topology, reservations, train, entered);
        }
        walked += 1;
        match topology.block_of(sec) {
            Some(b) if b != entered => {
                return reservations.block_free_or_held_by(b, train);
            }
            _ => {}
        }
    }
    // The plan ends inside the entered block: the goal (stop or despawn)
    // is in there, which is its own way out.
    true
}

fn block_has_open_edge(
    topology: &Topology,
    reservations: &ReservationTable,
    train: TrainId,
    block: BlockId,
) -> bool {
    topology.sections_of(block).iter().any(|&s| {
        topology.neighbors(s, None).iter().any(|&n| {
            match topology.block_of(n) {
                Some(b) if b != block => reservations.block_free_or_held_by(b, train),
                _ => false,
            }
        })
    })
}

/// Admission for a push-back reversal: plan from the would-be new head
/// (the current tail) and check its first move.
fn evaluate_reversal(
    topology: &Topology,
    reservations: &ReservationTable,
    config: &SimConfig,
    train: &Train,
) -> Decision {
    let Some(&new_head) = train.trail.back() else {
        return Decision::Hold {
            next: None,
            reason: HoldReason::NoPlan,
        };
    };
    let goal = match &train.plan {
        Some(p) => p.goal(),
        None => {
            return Decision::Hold {
                next: None,
                reason: HoldReason::NoPlan,
            }
        }
    };
    // The reversed head's block history is unknown; plan with a clean
    // slate.
    let req = RouteRequest {
        topology,
        start: new_head,
        heading: None,
        previous_block: None,
        goal,
        avoid: None,
        reverse_penalty: config.reverse_penalty,
    };
    let Ok(rev) = plan_route(&req) else {
        return Decision::DropGoal;
    };

    match rev.peek_next() {
        None => Decision::Reverse { plan: rev },
        Some(first) => {
            // A reverse plan that immediately re-enters the train's own
            // footprint means the headshunt is shorter than the train;
            // no amount of waiting fixes that.
            if reservations.peek(topology, first) == Some(train.id) {
                return Decision::DropGoal;
            }
            // The first reverse move executes on a later tick and is
            // re-admitted then; here it only gates the re-index, so no
            // claim is recorded.
            let empty = ClaimSet::default();
            match admit(
                topology,
                reservations,
                train.id,
                new_head,
                first,
                None,
                &rev,
                config.exit_lookahead,
                &empty,
            ) {
                Some(reason) => Decision::Hold {
                    next: Some(first),
                    reason,
                },
                None => Decision::Reverse { plan: rev },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{plan_route, RouteGoal, RouteRequest};
    use stellwerk_core::{SpawnRequest, TrainStatus, TrainType, TrainTypeId, WagonId};
    use stellwerk_topology::demo::demo_station;

    fn moving_train(topology: &Topology, id: u32, at: u32, goal: u32) -> Train {
        let req = SpawnRequest {
            train_id: TrainId(id),
            code: format!("T {id}"),
            train_type: TrainTypeId(1),
            entry_section: SectionId(0),
            num_wagons: 1,
            desired_stop: None,
        };
        let tt = TrainType {
            id: TrainTypeId(1),
            name: "Test".into(),
            priority_index: 1,
            cruising_speed: 60.0,
        };
        let mut t = Train::new(&req, &tt, WagonId(1000 + id * 100), SectionId(41));
        t.status = TrainStatus::Moving;
        t.trail.push_front(SectionId(at));
        t.entered = 1;
        t.plan = Some(
            plan_route(&RouteRequest {
                topology,
                start: SectionId(at),
                heading: None,
                previous_block: None,
                goal: RouteGoal::Section(SectionId(goal)),
                avoid: None,
                reverse_penalty: 50,
            })
            .unwrap(),
        );
        t
    }

    #[test]
    fn occupied_next_section_is_held() {
        let topo = demo_station();
        let mut res = ReservationTable::new(&topo);
        let cfg = SimConfig::default();
        let train = moving_train(&topo, 1, 10, 41);
        res.try_reserve(&topo, train.id, SectionId(10));
        res.try_reserve(&topo, TrainId(2), SectionId(20));

        let mut claims = ClaimSet::default();
        let d = evaluate(&topo, &res, &cfg, &train, &mut claims);
        assert!(matches!(
            d,
            Decision::Hold {
                next: Some(SectionId(20)),
                reason: HoldReason::SectionOccupied
            }
        ));
    }

    #[test]
    fn same_tick_block_claim_denies_the_later_train() {
        let topo = demo_station();
        let mut res = ReservationTable::new(&topo);
        let cfg = SimConfig::default();
        // Train a approaches track-1 from the west ladder, train b from
        // the east crossover. Evaluated first, a claims the whole block;
        // b is denied in the same tick.
        let a = moving_train(&topo, 1, 20, 41);
        res.try_reserve(&topo, a.id, SectionId(20));
        let b = moving_train(&topo, 2, 140, 100);
        res.try_reserve(&topo, b.id, SectionId(140));
        assert_eq!(
            b.plan.as_ref().unwrap().peek_next(),
            Some(SectionId(32)),
            "b's cheapest route to the west exit runs through track-1"
        );

        let mut claims = ClaimSet::default();
        let da = evaluate(&topo, &res, &cfg, &a, &mut claims);
        assert!(matches!(da, Decision::Proceed { next: SectionId(30) }));
        let db = evaluate(&topo, &res, &cfg, &b, &mut claims);
        assert!(matches!(
            db,
            Decision::Hold {
                next: Some(SectionId(32)),
                reason: HoldReason::BlockHeld,
            }
        ));
    }

    #[test]
    fn block_without_exit_is_refused() {
        let topo = demo_station();
        let mut res = ReservationTable::new(&topo);
        let cfg = SimConfig::default();
        // A stranger parks beyond the station throat, filling the only
        // block the plan leaves track-1 into.
        res.try_reserve(&topo, TrainId(9), SectionId(40));

        let train = moving_train(&topo, 1, 20, 41);
        let mut claims = ClaimSet::default();
        let d = evaluate(&topo, &res, &cfg, &train, &mut claims);
        assert!(matches!(
            d,
            Decision::Hold {
                next: Some(SectionId(30)),
                reason: HoldReason::NoExit
            }
        ));
    }

    #[test]
    fn exhausted_plan_at_despawn_exits() {
        let topo = demo_station();
        let res = ReservationTable::new(&topo);
        let cfg = SimConfig::default();
        let mut train = moving_train(&topo, 1, 41, 41);
        if let Some(plan) = train.plan.as_mut() {
            while !plan.is_exhausted() {
                plan.advance();
            }
        }
        let mut claims = ClaimSet::default();
        let d = evaluate(&topo, &res, &cfg, &train, &mut claims);
        assert!(matches!(d, Decision::Exit));
    }
}
