//! Shortest-path planning over the filtered connection graph.
//!
//! The search node is `(section, previous_block, heading)`: carrying the
//! previous block makes turn exclusions a first-class graph constraint,
//! and carrying the heading lets reversing moves be costed. Sections
//! occupied by other trains are treated as open at plan time —
//! admissibility is re-checked every tick by signaling, which keeps
//! plans stable while entry is merely delayed.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use stellwerk_core::{BlockId, Heading, RouteError, SectionId};
use stellwerk_topology::{Approach, SectionKind, Topology};

/// What a route is trying to reach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteGoal {
    /// Reach a section from any direction (transit and despawn targets).
    Section(SectionId),
    /// Reach a stop's section entering with the mandated heading, so the
    /// dwell rule is satisfied on arrival.
    Stop {
        /// The stop's section.
        section: SectionId,
        /// The mandated approach.
        approach: Approach,
    },
}

impl RouteGoal {
    /// The goal's target section.
    pub fn section(&self) -> SectionId {
        match self {
            Self::Section(s) => *s,
            Self::Stop { section, .. } => *section,
        }
    }

    fn satisfied_by(&self, section: SectionId, heading: Option<Heading>) -> bool {
        match self {
            Self::Section(s) => *s == section,
            Self::Stop {
                section: s,
                approach,
            } => *s == section && heading == Some(approach.entry_heading()),
        }
    }
}

/// An ordered section sequence from a train's head to its goal, with a
/// cursor tracking the head's position along it.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutePlan {
    goal: RouteGoal,
    sections: Vec<SectionId>,
    cursor: usize,
    cost: u32,
}

impl RoutePlan {
    /// The goal this plan was computed for.
    pub fn goal(&self) -> RouteGoal {
        self.goal
    }

    /// Total route cost, reverse penalties included.
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// The section the cursor currently sits on.
    pub fn current(&self) -> SectionId {
        self.sections[self.cursor]
    }

    /// The next section to enter, if the plan is not exhausted.
    pub fn peek_next(&self) -> Option<SectionId> {
        self.sections.get(self.cursor + 1).copied()
    }

    /// Sections after the next one (used by the block exit lookahead).
    pub fn beyond_next(&self) -> &[SectionId] {
        let from = (self.cursor + 2).min(self.sections.len());
        &self.sections[from..]
    }

    /// Move the cursor one step forward.
    pub fn advance(&mut self) {
        if self.cursor + 1 < self.sections.len() {
            self.cursor += 1;
        }
    }

    /// Whether the cursor has reached the final section.
    pub fn is_exhausted(&self) -> bool {
        self.cursor + 1 >= self.sections.len()
    }

    /// The full section sequence.
    pub fn sections(&self) -> &[SectionId] {
        &self.sections
    }
}

/// Inputs to one planning call.
#[derive(Clone, Copy, Debug)]
pub struct RouteRequest<'a> {
    /// The graph to plan over.
    pub topology: &'a Topology,
    /// The head's current section.
    pub start: SectionId,
    /// The train's current heading, if it has moved yet.
    pub heading: Option<Heading>,
    /// The block the train most recently left.
    pub previous_block: Option<BlockId>,
    /// What to reach.
    pub goal: RouteGoal,
    /// A section to route around entirely (grace replans).
    pub avoid: Option<SectionId>,
    /// Cost added to each reversing move.
    pub reverse_penalty: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Node {
    section: SectionId,
    previous_block: Option<BlockId>,
    heading: Option<Heading>,
}

/// Plan a route, or fail with [`RouteError::NoRouteFound`].
pub fn plan_route(req: &RouteRequest<'_>) -> Result<RoutePlan, RouteError> {
    search(req).ok_or(RouteError::NoRouteFound)
}

/// Plan to whichever of `goals` is cheapest to reach; ties go to the
/// lower section id.
pub fn plan_to_nearest(
    topology: &Topology,
    start: SectionId,
    heading: Option<Heading>,
    previous_block: Option<BlockId>,
    goals: &[SectionId],
    reverse_penalty: u32,
) -> Result<RoutePlan, RouteError> {
    let mut best: Option<RoutePlan> = None;
    let mut ordered: Vec<SectionId> = goals.to_vec();
    ordered.sort();
    for &goal in &ordered {
        let req = RouteRequest {
            topology,
            start,
            heading,
            previous_block,
            goal: RouteGoal::Section(goal),
            avoid: None,
            reverse_penalty,
        };
        if let Some(plan) = search(&req) {
            let better = best.as_ref().map_or(true, |b| plan.cost() < b.cost());
            if better {
                best = Some(plan);
            }
        }
    }
    best.ok_or(RouteError::NoRouteFound)
}

fn search(req: &RouteRequest<'_>) -> Option<RoutePlan> {
    let topo = req.topology;
    topo.index_of(req.start)?;

    let start = Node {
        section: req.start,
        previous_block: req.previous_block,
        heading: req.heading,
    };

    // Heap entries are (cost, diagonal-reversal count, push sequence);
    // the sequence index doubles as a handle into `nodes` and makes
    // equal-cost pops deterministic.
    let mut nodes: Vec<Node> = vec![start];
    let mut heap: BinaryHeap<Reverse<(u32, u32, usize)>> = BinaryHeap::new();
    let mut best: HashMap<Node, (u32, u32)> = HashMap::new();
    let mut parent: HashMap<Node, Node> = HashMap::new();
    best.insert(start, (0, 0));
    heap.push(Reverse((0, 0, 0)));

    while let Some(Reverse((cost, diag, seq))) = heap.pop() {
        let node = nodes[seq];
        match best.get(&node) {
            Some(&(c, d)) if (c, d) < (cost, diag) => continue,
            _ => {}
        }

        if req.goal.satisfied_by(node.section, node.heading) {
            let mut path = vec![node.section];
            let mut cur = node;
            while let Some(&p) = parent.get(&cur) {
                path.push(p.section);
                cur = p;
            }
            path.reverse();
            return Some(RoutePlan {
                goal: req.goal,
                sections: path,
                cursor: 0,
                cost,
            });
        }

        for next in topo.neighbors(node.section, node.previous_block) {
            if Some(next) == req.avoid {
                continue;
            }
            let h = topo.orientation(node.section, next);
            let reversing = node.heading.is_some_and(|cur| cur != h);
            let mut ncost = cost + 1;
            let mut ndiag = diag;
            if reversing {
                ncost += req.reverse_penalty;
                if topo
                    .section(next)
                    .is_some_and(|s| s.kind == SectionKind::Diagonal)
                {
                    ndiag += 1;
                }
            }
            let next_block = topo.block_of(next);
            let cur_block = topo.block_of(node.section);
            let nprev = if next_block != cur_block {
                cur_block
            } else {
                node.previous_block
            };
            let nnode = Node {
                section: next,
                previous_block: nprev,
                heading: Some(h),
            };
            let improves = best
                .get(&nnode)
                .map_or(true, |&(c, d)| (ncost, ndiag) < (c, d));
            if improves {
                best.insert(nnode, (ncost, ndiag));
                parent.insert(nnode, node);
                heap.push(Reverse((ncost, ndiag, nodes.len())));
                nodes.push(nnode);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellwerk_topology::demo::demo_station;

    fn req<'a>(topo: &'a Topology, start: u32, goal: RouteGoal) -> RouteRequest<'a> {
        RouteRequest {
            topology: topo,
            start: SectionId(start),
            heading: None,
            previous_block: None,
            goal,
            avoid: None,
            reverse_penalty: 50,
        }
    }

    fn ids(plan: &RoutePlan) -> Vec<u32> {
        plan.sections().iter().map(|s| s.0).collect()
    }

    #[test]
    fn transit_route_prefers_track_1() {
        let topo = demo_station();
        let plan = plan_route(&req(&topo, 0, RouteGoal::Section(SectionId(41)))).unwrap();
        assert_eq!(ids(&plan), vec![0, 2, 10, 20, 30, 31, 32, 40, 41]);
        assert_eq!(plan.cost(), 8);
    }

    #[test]
    fn avoid_diverts_to_track_2() {
        let topo = demo_station();
        let mut r = req(&topo, 0, RouteGoal::Section(SectionId(41)));
        r.avoid = Some(SectionId(30));
        let plan = plan_route(&r).unwrap();
        assert_eq!(ids(&plan), vec![0, 2, 10, 20, 128, 129, 130, 40, 41]);
    }

    #[test]
    fn stop_goal_requires_mandated_entry_heading() {
        let topo = demo_station();
        // From the westbound entry, Track 1 must be entered heading east,
        // which forces a run past the platform and a reversal at 30.
        let plan = plan_route(&req(
            &topo,
            141,
            RouteGoal::Stop {
                section: SectionId(31),
                approach: Approach::Left,
            },
        ))
        .unwrap();
        assert_eq!(ids(&plan), vec![141, 140, 32, 31, 30, 31]);
        // Four plain moves plus one penalized reversal.
        assert_eq!(plan.cost(), 4 + 1 + 50);
    }

    #[test]
    fn exclusion_is_a_hard_constraint() {
        let topo = demo_station();
        // A train that just arrived through section 20 sits in track-1.
        // The only way west is the 30 -> 104 crossover, which its
        // previous block excludes, so the west exit is unreachable.
        let excl = topo.block_of(SectionId(20));
        let mut r = req(&topo, 30, RouteGoal::Section(SectionId(100)));
        r.previous_block = excl;
        assert_eq!(plan_route(&r), Err(RouteError::NoRouteFound));

        // With a clean history the crossover is open.
        let r = req(&topo, 30, RouteGoal::Section(SectionId(100)));
        let plan = plan_route(&r).unwrap();
        assert_eq!(ids(&plan), vec![30, 104, 101, 100]);
    }

    #[test]
    fn reversal_is_expensive_but_possible() {
        let topo = demo_station();
        let mut r = req(&topo, 30, RouteGoal::Section(SectionId(31)));
        r.heading = Some(Heading::West);
        let plan = plan_route(&r).unwrap();
        assert_eq!(ids(&plan), vec![30, 31]);
        assert_eq!(plan.cost(), 51);
    }

    #[test]
    fn nearest_despawn_from_track_1_is_the_east_exit() {
        let topo = demo_station();
        let plan = plan_to_nearest(
            &topo,
            SectionId(31),
            Some(Heading::East),
            topo.block_of(SectionId(20)),
            topo.despawns(),
            50,
        )
        .unwrap();
        assert_eq!(plan.goal().section(), SectionId(41));
        assert_eq!(ids(&plan), vec![31, 32, 40, 41]);
    }

    #[test]
    fn plan_cursor_walks_the_route() {
        let topo = demo_station();
        let mut plan = plan_route(&req(&topo, 0, RouteGoal::Section(SectionId(41)))).unwrap();
        assert_eq!(plan.current(), SectionId(0));
        assert_eq!(plan.peek_next(), Some(SectionId(2)));
        plan.advance();
        assert_eq!(plan.current(), SectionId(2));
        while !plan.is_exhausted() {
            plan.advance();
        }
        assert_eq!(plan.current(), SectionId(41));
        assert_eq!(plan.peek_next(), None);
    }

    #[test]
    fn unreachable_goal_reports_no_route() {
        let topo = demo_station();
        // The siding connection ships inactive.
        assert_eq!(
            plan_route(&req(&topo, 0, RouteGoal::Section(SectionId(1000)))),
            Err(RouteError::NoRouteFound)
        );
    }
}
