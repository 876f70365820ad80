//! The single-threaded tick engine.
//!
//! [`SimulationEngine`] owns all simulation state and executes ticks
//! synchronously in the fixed phase order: apply drained commands, sort
//! trains by priority, run per-train upkeep (dwell timers, spawn
//! activation, plan maintenance), run the signaling pass, run
//! kinematics, remove despawned trains, and verify the occupancy
//! invariants. A detected invariant violation latches the engine into a
//! halted state that refuses further ticks.

use crate::config::{ConfigError, SimConfig};
use crate::metrics::TickMetrics;
use crate::reservation::ReservationTable;
use crate::router::{plan_route, plan_to_nearest, RouteGoal, RouteRequest};
use crate::signaling::{self, ClaimSet, Decision};
use crate::snapshot::{ConnectionSnapshot, Snapshot, TrainSnapshot, WagonSnapshot};
use crate::train::{Train, ALMOST_ONE};
use indexmap::IndexMap;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::time::Instant;
use stellwerk_core::{
    BlockId, Command, CommandError, Heading, InvariantViolation, Receipt, SectionId,
    SpawnError, SpawnRequest, StepError, SwitchError, TickId, TrainId, TrainStatus, WagonId,
};
use stellwerk_topology::Topology;

/// Result of a successful tick.
#[derive(Clone, Debug)]
pub struct TickResult {
    /// One receipt per submitted command, in submission order.
    pub receipts: Vec<Receipt>,
    /// Whether simulation phases ran (false while paused).
    pub advanced: bool,
    /// Metrics after this tick.
    pub metrics: TickMetrics,
}

/// Error returned from [`SimulationEngine::execute_tick`].
///
/// Carries the receipts produced before the failure; callers must not
/// discard them.
#[derive(Clone, Debug)]
pub struct TickFailure {
    /// The underlying error.
    pub error: StepError,
    /// Receipts produced this tick.
    pub receipts: Vec<Receipt>,
}

impl fmt::Display for TickFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for TickFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// Values read from a train before plan maintenance, so the borrow of
/// the train table ends before any routing or mutation happens.
struct PlanProbe {
    head: SectionId,
    heading: Option<Heading>,
    previous_block: Option<BlockId>,
    blocked: u32,
    contested: Option<SectionId>,
    goal: RouteGoal,
    has_plan: bool,
    exhausted: bool,
    next: Option<SectionId>,
    trail_second: Option<SectionId>,
}

/// The authoritative world state and tick executor.
pub struct SimulationEngine {
    topology: Topology,
    config: SimConfig,
    reservations: ReservationTable,
    trains: IndexMap<TrainId, Train>,
    tick: TickId,
    sim_time: f64,
    paused: bool,
    shutdown: bool,
    halted: Option<InvariantViolation>,
    /// Set by kinematics when a guaranteed reservation fails.
    violation: Option<InvariantViolation>,
    /// Set when a switch command changed the graph this tick; consumed
    /// by stuck-train retries.
    graph_changed: bool,
    next_wagon_id: u32,
    metrics: TickMetrics,
}

impl SimulationEngine {
    /// Construct an engine over a validated topology.
    pub fn new(topology: Topology, config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let reservations = ReservationTable::new(&topology);
        Ok(Self {
            topology,
            config,
            reservations,
            trains: IndexMap::new(),
            tick: TickId(0),
            sim_time: 0.0,
            paused: false,
            shutdown: false,
            halted: None,
            violation: None,
            graph_changed: false,
            next_wagon_id: 1000,
            metrics: TickMetrics::default(),
        })
    }

    /// Execute one tick with the commands drained for it.
    ///
    /// Commands are applied first, in order, even while paused; the
    /// simulation phases run only when not paused. Returns one receipt
    /// per command.
    pub fn execute_tick(&mut self, commands: Vec<Command>) -> Result<TickResult, TickFailure> {
        let tick_start = Instant::now();

        if self.halted.is_some() {
            let receipts = (0..commands.len())
                .map(|i| Receipt::rejected(i, CommandError::EngineHalted))
                .collect();
            return Err(TickFailure {
                error: StepError::Halted,
                receipts,
            });
        }

        let next_tick = TickId(self.tick.0 + 1);

        // 1. Apply drained commands.
        let cmd_start = Instant::now();
        let receipts = self.apply_commands(commands, next_tick);
        self.metrics.command_us = cmd_start.elapsed().as_micros() as u64;

        let mut advanced = false;
        if !self.paused {
            // 2-6. Simulation phases.
            self.advance(self.config.sim_dt());

            // Assertion layer: the phases above are designed so this
            // cannot fail.
            let verdict = match self.violation.take() {
                Some(v) => Err(v),
                None => self.check_invariants(),
            };
            if let Err(v) = verdict {
                error!("engine halting: {v}");
                self.halted = Some(v.clone());
                return Err(TickFailure {
                    error: StepError::Invariant(v),
                    receipts,
                });
            }

            self.tick = next_tick;
            self.sim_time += self.config.sim_dt();
            advanced = true;
        }

        self.metrics.total_us = tick_start.elapsed().as_micros() as u64;
        self.metrics.active_trains = self.trains.len();
        Ok(TickResult {
            receipts,
            advanced,
            metrics: self.metrics.clone(),
        })
    }

    /// Build a snapshot of the current state (phase 7).
    pub fn snapshot(&self) -> Snapshot {
        let trains = self
            .trains
            .values()
            .map(|t| TrainSnapshot {
                id: t.id,
                code: t.code.clone(),
                status: t.status,
                head_section: t
                    .head_section()
                    .or((t.status == TrainStatus::Scheduled).then_some(t.entry)),
                direction: t.heading.map_or(0, Heading::sign),
                desired_stop: t.desired_stop,
            })
            .collect();
        let wagons = self
            .trains
            .values()
            .flat_map(|t| {
                t.wagons_on_layout()
                    .map(|(id, index, section)| WagonSnapshot {
                        id,
                        train: t.id,
                        index,
                        section,
                        position_offset: t.offset,
                    })
            })
            .collect();
        let connections = self
            .topology
            .connections()
            .iter()
            .map(|c| ConnectionSnapshot {
                from: c.from,
                to: c.to,
                active: c.active,
            })
            .collect();
        Snapshot {
            tick: self.tick,
            sim_time_seconds: self.sim_time,
            trains,
            wagons,
            connections,
        }
    }

    /// The current tick.
    pub fn tick(&self) -> TickId {
        self.tick
    }

    /// Simulated seconds since construction.
    pub fn sim_time_seconds(&self) -> f64 {
        self.sim_time
    }

    /// Whether the simulation phases are suspended.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether a `Shutdown` command has been applied.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown
    }

    /// The latched invariant violation, if the engine has halted.
    pub fn halt_reason(&self) -> Option<&InvariantViolation> {
        self.halted.as_ref()
    }

    /// Metrics after the most recent tick.
    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    /// The topology the engine runs on.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// A train's lifecycle status, while the train exists.
    pub fn train_status(&self, id: TrainId) -> Option<TrainStatus> {
        self.trains.get(&id).map(|t| t.status)
    }

    /// A train's head section, once materialized.
    pub fn train_head(&self, id: TrainId) -> Option<SectionId> {
        self.trains.get(&id).and_then(Train::head_section)
    }

    /// Number of reserved sections (test observability).
    pub fn occupied_sections(&self) -> usize {
        self.reservations.occupied_sections()
    }

    // ── Phase 1: commands ───────────────────────────────────────────

    fn apply_commands(&mut self, commands: Vec<Command>, tick: TickId) -> Vec<Receipt> {
        let mut receipts = Vec::with_capacity(commands.len());
        for (index, command) in commands.into_iter().enumerate() {
            let outcome = match command {
                Command::Spawn(req) => self.apply_spawn(req),
                Command::SetConnectionActive { from, to, active } => {
                    self.apply_switch(from, to, active)
                }
                Command::ClearAll => {
                    info!("clearing {} trains", self.trains.len());
                    self.trains.clear();
                    self.reservations.clear();
                    Ok(())
                }
                Command::Pause => {
                    self.paused = true;
                    Ok(())
                }
                Command::Resume => {
                    self.paused = false;
                    Ok(())
                }
                Command::Shutdown => {
                    self.shutdown = true;
                    Ok(())
                }
            };
            receipts.push(match outcome {
                Ok(()) => Receipt::ok(index, tick),
                Err(reason) => Receipt::rejected(index, reason),
            });
        }
        receipts
    }

    fn apply_spawn(&mut self, req: SpawnRequest) -> Result<(), CommandError> {
        if self.trains.contains_key(&req.train_id) {
            return Err(SpawnError::DuplicateTrainId.into());
        }
        if req.num_wagons == 0 || req.num_wagons > 15 {
            return Err(SpawnError::InvalidWagonCount {
                got: req.num_wagons,
            }
            .into());
        }
        let Some(train_type) = self.config.train_type(req.train_type) else {
            return Err(SpawnError::UnknownTrainType {
                train_type: req.train_type,
            }
            .into());
        };
        let Some(spawn) = self.topology.spawn_point(req.entry_section) else {
            return Err(SpawnError::NotAnEntrySection {
                section: req.entry_section,
            }
            .into());
        };
        if let Some(stop) = req.desired_stop {
            if self.topology.stop(stop).is_none() {
                return Err(SpawnError::UnknownStop { stop }.into());
            }
        }
        if !self.reservations.is_free(&self.topology, req.entry_section) {
            return Err(SpawnError::EntryOccupied.into());
        }
        if let Some(block) = self.topology.block_of(req.entry_section) {
            if !self
                .reservations
                .block_free_or_held_by(block, req.train_id)
            {
                return Err(SpawnError::EntryBlockHeld.into());
            }
        }

        let wagon_base = WagonId(self.next_wagon_id);
        self.next_wagon_id += u32::from(req.num_wagons);
        let train = Train::new(&req, train_type, wagon_base, spawn.exit);
        info!(
            "train {} '{}' scheduled at {} ({} wagons)",
            train.id, train.code, train.entry, train.num_wagons
        );
        self.trains.insert(train.id, train);
        Ok(())
    }

    fn apply_switch(
        &mut self,
        from: SectionId,
        to: SectionId,
        active: bool,
    ) -> Result<(), CommandError> {
        if self.topology.connection(from, to).is_none() {
            return Err(SwitchError::UnknownConnection { from, to }.into());
        }
        if self.reservations.peek(&self.topology, from).is_some()
            || self.reservations.peek(&self.topology, to).is_some()
        {
            return Err(SwitchError::SwitchOccupied.into());
        }
        match self.topology.set_connection_active(from, to, active) {
            Ok(changed) => {
                if changed {
                    info!("connection {from} -> {to} set {}", if active { "active" } else { "inactive" });
                    self.graph_changed = true;
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Phases 2-6: simulation ──────────────────────────────────────

    fn advance(&mut self, dt: f64) {
        // 2. Priority order: higher priority first, then lower id.
        let mut order: Vec<(u8, TrainId)> = self
            .trains
            .values()
            .map(|t| (t.priority, t.id))
            .collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        let order: Vec<TrainId> = order.into_iter().map(|(_, id)| id).collect();

        // 3. Dwell timers, spawn activation, plan upkeep.
        let upkeep_start = Instant::now();
        for &id in &order {
            self.upkeep_train(id, dt);
        }

        // 4. Signaling.
        let decisions = self.signaling_pass(&order);
        self.metrics.signaling_us = upkeep_start.elapsed().as_micros() as u64;

        // 5. Kinematics.
        let move_start = Instant::now();
        for &id in &order {
            let decision = decisions.get(&id).cloned();
            self.move_train(id, decision, dt);
        }
        self.metrics.movement_us = move_start.elapsed().as_micros() as u64;

        // 6. Remove despawned trains.
        let before = self.trains.len();
        self.trains.retain(|_, t| t.status != TrainStatus::Despawned);
        self.metrics.despawned += (before - self.trains.len()) as u64;

        self.graph_changed = false;
    }

    fn upkeep_train(&mut self, id: TrainId, dt: f64) {
        let Some(status) = self.train_status(id) else {
            return;
        };
        match status {
            TrainStatus::Scheduled => self.try_activate(id),
            TrainStatus::Dwelling => self.update_dwell(id, dt),
            TrainStatus::Stuck => self.retry_stuck(id),
            TrainStatus::Moving => self.upkeep_plan(id),
            TrainStatus::Despawned => {}
        }
    }

    fn try_activate(&mut self, id: TrainId) {
        let (entry, goal) = {
            let Some(t) = self.trains.get(&id) else { return };
            (t.entry, goal_for(t, &self.topology))
        };
        if !self.reservations.is_free(&self.topology, entry) {
            return;
        }
        if let Some(block) = self.topology.block_of(entry) {
            if !self.reservations.block_free_or_held_by(block, id) {
                return;
            }
        }
        let request = RouteRequest {
            topology: &self.topology,
            start: entry,
            heading: None,
            previous_block: None,
            goal,
            avoid: None,
            reverse_penalty: self.config.reverse_penalty,
        };
        let plan = match plan_route(&request) {
            Ok(plan) => plan,
            Err(_) if matches!(goal, RouteGoal::Stop { .. }) => {
                // The stop cannot be approached from the mandated side
                // under the current graph; degrade to a transit run.
                let exit = {
                    let Some(t) = self.trains.get_mut(&id) else { return };
                    warn!(
                        "train {id}: desired stop unreachable from mandated side, running through"
                    );
                    t.desired_stop = None;
                    t.transit_exit
                };
                let fallback = RouteRequest {
                    goal: RouteGoal::Section(exit),
                    ..request
                };
                match plan_route(&fallback) {
                    Ok(plan) => plan,
                    Err(_) => return,
                }
            }
            Err(_) => return,
        };
        if !self.reservations.try_reserve(&self.topology, id, entry) {
            return;
        }
        let heading = plan
            .peek_next()
            .map(|n| self.topology.orientation(entry, n));
        let Some(t) = self.trains.get_mut(&id) else { return };
        t.trail.push_front(entry);
        t.entered = 1;
        t.offset = 0.0;
        t.heading = heading;
        t.plan = Some(plan);
        t.status = TrainStatus::Moving;
        self.metrics.spawned += 1;
        info!("train {id} entering at {entry}");
    }

    fn update_dwell(&mut self, id: TrainId, dt: f64) {
        let (done, head, heading, prev) = {
            let Some(t) = self.trains.get_mut(&id) else { return };
            t.dwell_remaining -= dt;
            (
                t.dwell_remaining <= 0.0,
                t.head_section(),
                t.heading,
                t.previous_block,
            )
        };
        if !done {
            return;
        }
        let Some(head) = head else { return };
        // Dwell over: the new target is the nearest exit by route cost.
        match plan_to_nearest(
            &self.topology,
            head,
            heading,
            prev,
            self.topology.despawns(),
            self.config.reverse_penalty,
        ) {
            Ok(plan) => {
                let exit = plan.goal().section();
                let Some(t) = self.trains.get_mut(&id) else { return };
                t.desired_stop = None;
                t.transit_exit = exit;
                t.plan = Some(plan);
                t.status = TrainStatus::Moving;
                t.clear_denials();
                self.metrics.replans += 1;
                info!("train {id} departing for {exit}");
            }
            Err(_) => {
                let Some(t) = self.trains.get_mut(&id) else { return };
                t.desired_stop = None;
                t.plan = None;
                t.status = TrainStatus::Stuck;
                self.metrics.stuck_transitions += 1;
                warn!("train {id}: no route to any exit after dwell");
            }
        }
    }

    fn retry_stuck(&mut self, id: TrainId) {
        let probe = {
            let Some(t) = self.trains.get(&id) else { return };
            // The contested section must be free at both granularities:
            // a free section inside a still-held block is no opening.
            let contested_clear = t.contested.map_or(true, |s| {
                self.reservations.is_free(&self.topology, s)
                    && self.topology.block_of(s).map_or(true, |b| {
                        self.reservations.block_free_or_held_by(b, t.id)
                    })
            });
            if !(self.graph_changed || contested_clear) {
                return;
            }
            let Some(head) = t.head_section() else { return };
            (head, t.heading, t.previous_block, goal_for(t, &self.topology))
        };
        let (head, heading, prev, goal) = probe;
        let request = RouteRequest {
            topology: &self.topology,
            start: head,
            heading,
            previous_block: prev,
            goal,
            avoid: None,
            reverse_penalty: self.config.reverse_penalty,
        };
        if let Ok(plan) = plan_route(&request) {
            let Some(t) = self.trains.get_mut(&id) else { return };
            t.plan = Some(plan);
            t.status = TrainStatus::Moving;
            t.clear_denials();
            self.metrics.replans += 1;
            info!("train {id} unstuck, moving again");
        }
    }

    fn upkeep_plan(&mut self, id: TrainId) {
        let probe = {
            let Some(t) = self.trains.get(&id) else { return };
            let Some(head) = t.head_section() else { return };
            PlanProbe {
                head,
                heading: t.heading,
                previous_block: t.previous_block,
                blocked: t.blocked_ticks,
                contested: t.contested,
                goal: goal_for(t, &self.topology),
                has_plan: t.plan.is_some(),
                exhausted: t.plan.as_ref().is_some_and(|p| p.is_exhausted()),
                next: t.plan.as_ref().and_then(|p| p.peek_next()),
                trail_second: t.trail.get(1).copied(),
            }
        };

        // Grace expiry: try to route around the contested section.
        if probe.blocked >= self.config.block_grace_ticks {
            if let Some(avoid) = probe.contested {
                let request = RouteRequest {
                    topology: &self.topology,
                    start: probe.head,
                    heading: probe.heading,
                    previous_block: probe.previous_block,
                    goal: probe.goal,
                    avoid: Some(avoid),
                    reverse_penalty: self.config.reverse_penalty,
                };
                match plan_route(&request) {
                    Ok(plan) => {
                        let Some(t) = self.trains.get_mut(&id) else { return };
                        t.plan = Some(plan);
                        t.clear_denials();
                        self.metrics.replans += 1;
                        info!("train {id} routing around {avoid}");
                    }
                    Err(_) => {
                        let Some(t) = self.trains.get_mut(&id) else { return };
                        t.status = TrainStatus::Stuck;
                        t.plan = None;
                        t.blocked_ticks = 0;
                        self.metrics.stuck_transitions += 1;
                        warn!("train {id}: no route around {avoid}, stuck");
                    }
                }
                return;
            }
        }

        // Missing or spent plan.
        if !probe.has_plan {
            self.replan_or_stick(id, &probe);
            return;
        }
        if probe.exhausted {
            let at_exit =
                probe.goal.section() == probe.head && self.topology.is_despawn(probe.head);
            if !at_exit {
                self.replan_or_stick(id, &probe);
            }
            return;
        }

        // A switch may have invalidated the next edge since planning.
        // Push-back steps are exempt: they are not traversed head-first.
        if let Some(next) = probe.next {
            let push_back = probe.trail_second == Some(next);
            if !push_back
                && !self
                    .topology
                    .edge_allowed(probe.head, next, probe.previous_block)
            {
                debug!("train {id}: edge {} -> {next} closed, replanning", probe.head);
                self.replan_or_stick(id, &probe);
            }
        }
    }

    fn replan_or_stick(&mut self, id: TrainId, probe: &PlanProbe) {
        let request = RouteRequest {
            topology: &self.topology,
            start: probe.head,
            heading: probe.heading,
            previous_block: probe.previous_block,
            goal: probe.goal,
            avoid: None,
            reverse_penalty: self.config.reverse_penalty,
        };
        match plan_route(&request) {
            Ok(plan) => {
                let Some(t) = self.trains.get_mut(&id) else { return };
                t.plan = Some(plan);
                t.clear_denials();
                self.metrics.replans += 1;
            }
            Err(_) if matches!(probe.goal, RouteGoal::Stop { .. }) => {
                let exit = {
                    let Some(t) = self.trains.get_mut(&id) else { return };
                    warn!("train {id}: desired stop unreachable, running through");
                    t.desired_stop = None;
                    t.transit_exit
                };
                let fallback = RouteRequest {
                    goal: RouteGoal::Section(exit),
                    ..request
                };
                match plan_route(&fallback) {
                    Ok(plan) => {
                        let Some(t) = self.trains.get_mut(&id) else { return };
                        t.plan = Some(plan);
                        t.clear_denials();
                        self.metrics.replans += 1;
                    }
                    Err(_) => self.stick(id),
                }
            }
            Err(_) => self.stick(id),
        }
    }

    fn stick(&mut self, id: TrainId) {
        let Some(t) = self.trains.get_mut(&id) else { return };
        t.status = TrainStatus::Stuck;
        t.plan = None;
        self.metrics.stuck_transitions += 1;
        warn!("train {id}: no route to goal, stuck");
    }

    fn signaling_pass(&mut self, order: &[TrainId]) -> HashMap<TrainId, Decision> {
        let dt = self.config.sim_dt();
        let mut decisions = HashMap::new();
        let mut claims = ClaimSet::default();
        for &id in order {
            let Some(t) = self.trains.get(&id) else { continue };
            if t.status != TrainStatus::Moving {
                continue;
            }
            let Some(head) = t.head_section() else { continue };
            let advance = t.speed / 60.0 * dt / self.topology.section_length(head);
            if t.offset + advance < 1.0 {
                continue;
            }
            let decision =
                signaling::evaluate(&self.topology, &self.reservations, &self.config, t, &mut claims);
            decisions.insert(id, decision);
        }
        decisions
    }

    fn move_train(&mut self, id: TrainId, decision: Option<Decision>, dt: f64) {
        let topology = &self.topology;
        let Some(t) = self.trains.get_mut(&id) else { return };
        if t.status != TrainStatus::Moving {
            return;
        }
        let Some(head) = t.head_section() else { return };
        let advance = t.speed / 60.0 * dt / topology.section_length(head);

        match decision {
            None => {
                // Mid-section: plain advance, no boundary involved.
                t.offset = (t.offset + advance).min(ALMOST_ONE);
            }
            Some(Decision::Hold { next, reason }) => {
                t.blocked_ticks += 1;
                t.contested = next;
                self.metrics.denials += 1;
                debug!(
                    "train {id} held at {head} ({reason:?}, {} ticks)",
                    t.blocked_ticks
                );
            }
            Some(Decision::DropGoal) => {
                if t.desired_stop.is_some() {
                    warn!("train {id}: required reversal is impossible, running through");
                    t.desired_stop = None;
                    t.plan = None;
                } else {
                    // Even the transit route demands an impossible
                    // push-back; only a graph change can free this train.
                    t.status = TrainStatus::Stuck;
                    t.plan = None;
                    t.contested = t.trail.get(1).copied();
                    self.metrics.stuck_transitions += 1;
                    warn!("train {id}: wedged against its own trail, stuck");
                }
            }
            Some(Decision::Reverse { plan }) => {
                let reversed: std::collections::VecDeque<SectionId> =
                    t.trail.iter().rev().copied().collect();
                t.trail = reversed;
                t.offset = (1.0 - t.offset).clamp(0.0, ALMOST_ONE);
                t.heading = None;
                t.previous_block = None;
                t.plan = Some(plan);
                t.clear_denials();
                info!("train {id} reversed, new head at {}", t.trail[0]);
            }
            Some(Decision::Exit) => {
                t.offset += advance;
                let carry = (t.offset - 1.0).clamp(0.0, ALMOST_ONE);
                t.exited += 1;
                if t.entered < t.num_wagons {
                    t.entered += 1;
                } else if let Some(tail) = t.trail.pop_back() {
                    self.reservations.release(topology, id, tail);
                }
                t.offset = carry;
                if t.exited == t.num_wagons {
                    t.status = TrainStatus::Despawned;
                    info!("train {id} despawned at {head}");
                }
            }
            Some(Decision::Proceed { next }) => {
                t.offset += advance;
                let carry = (t.offset - 1.0).clamp(0.0, ALMOST_ONE);
                // Tail first: vacate before the head claims new track.
                if t.is_fully_entered() {
                    if let Some(tail) = t.trail.pop_back() {
                        self.reservations.release(topology, id, tail);
                    }
                } else {
                    t.entered += 1;
                }
                if !self.reservations.try_reserve(topology, id, next) {
                    // Signaling guaranteed this section; a refusal here
                    // is an internal contradiction.
                    self.violation =
                        Some(InvariantViolation::ReservationMismatch { section: next });
                    return;
                }
                t.trail.push_front(next);
                let entry_heading = topology.orientation(head, next);
                t.heading = Some(entry_heading);
                let (b_old, b_new) = (topology.block_of(head), topology.block_of(next));
                if b_new != b_old {
                    t.previous_block = b_old;
                }
                match t.plan.as_mut() {
                    Some(plan) if plan.peek_next() == Some(next) => plan.advance(),
                    _ => t.plan = None,
                }
                t.offset = carry;
                t.clear_denials();

                if let Some(stop) = topology.stop_at(next) {
                    if t.desired_stop == Some(stop.id) && stop.approach.matches(entry_heading) {
                        t.status = TrainStatus::Dwelling;
                        t.dwell_remaining = self.config.dwell_seconds;
                        info!(
                            "train {id} dwelling at '{}' for {:.1}s",
                            stop.name, self.config.dwell_seconds
                        );
                    }
                }
            }
        }
    }

    // ── Invariant assertions ────────────────────────────────────────

    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut section_owner: HashMap<SectionId, TrainId> = HashMap::new();
        let mut block_owner: HashMap<BlockId, TrainId> = HashMap::new();
        for t in self.trains.values() {
            for (i, &section) in t.trail.iter().enumerate() {
                if section_owner.insert(section, t.id).is_some() {
                    return Err(InvariantViolation::SectionDoubleOccupancy { section });
                }
                if self.reservations.peek(&self.topology, section) != Some(t.id) {
                    return Err(InvariantViolation::ReservationMismatch { section });
                }
                if let Some(block) = self.topology.block_of(section) {
                    match block_owner.get(&block) {
                        Some(&owner) if owner != t.id => {
                            return Err(InvariantViolation::BlockDoubleOccupancy { block });
                        }
                        _ => {
                            block_owner.insert(block, t.id);
                        }
                    }
                }
                if let Some(&following) = t.trail.get(i + 1) {
                    let connected = self.topology.connection(section, following).is_some()
                        || self.topology.connection(following, section).is_some();
                    if !connected {
                        return Err(InvariantViolation::TrailDiscontinuity {
                            train: t.id,
                            between: (section, following),
                        });
                    }
                }
            }
            if matches!(t.status, TrainStatus::Moving | TrainStatus::Dwelling)
                && !(0.0..1.0).contains(&t.offset)
            {
                return Err(InvariantViolation::OffsetOutOfRange {
                    train: t.id,
                    offset: t.offset,
                });
            }
        }
        Ok(())
    }
}

/// The goal a train is currently routing toward.
fn goal_for(train: &Train, topology: &Topology) -> RouteGoal {
    if let Some(stop_id) = train.desired_stop {
        if let Some(stop) = topology.stop(stop_id) {
            return RouteGoal::Stop {
                section: stop.section,
                approach: stop.approach,
            };
        }
    }
    RouteGoal::Section(train.transit_exit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellwerk_core::TrainTypeId;
    use stellwerk_topology::demo::demo_station;

    fn engine() -> SimulationEngine {
        SimulationEngine::new(demo_station(), SimConfig::demo()).unwrap()
    }

    fn spawn(id: u32, entry: u32, wagons: u8, stop: Option<u32>) -> Command {
        Command::Spawn(SpawnRequest {
            train_id: TrainId(id),
            code: format!("T {id}"),
            train_type: TrainTypeId(2),
            entry_section: SectionId(entry),
            num_wagons: wagons,
            desired_stop: stop.map(stellwerk_core::StopId),
        })
    }

    #[test]
    fn spawn_validation_rejects_bad_requests() {
        let mut e = engine();
        let result = e
            .execute_tick(vec![
                spawn(1, 0, 3, None),
                spawn(1, 0, 3, None),  // duplicate id
                spawn(2, 31, 3, None), // not an entry
                spawn(3, 0, 16, None), // too many wagons
                spawn(4, 0, 0, None),  // too few wagons
                spawn(5, 0, 3, Some(99)), // unknown stop
            ])
            .unwrap();
        let reasons: Vec<_> = result.receipts.iter().map(|r| r.reason).collect();
        assert_eq!(reasons[0], None);
        assert_eq!(
            reasons[1],
            Some(CommandError::Spawn(SpawnError::DuplicateTrainId))
        );
        assert!(matches!(
            reasons[2],
            Some(CommandError::Spawn(SpawnError::NotAnEntrySection { .. }))
        ));
        assert!(matches!(
            reasons[3],
            Some(CommandError::Spawn(SpawnError::InvalidWagonCount { got: 16 }))
        ));
        assert!(matches!(
            reasons[4],
            Some(CommandError::Spawn(SpawnError::InvalidWagonCount { got: 0 }))
        ));
        assert!(matches!(
            reasons[5],
            Some(CommandError::Spawn(SpawnError::UnknownStop { .. }))
        ));
    }

    #[test]
    fn spawned_train_materializes_and_moves() {
        let mut e = engine();
        e.execute_tick(vec![spawn(1, 0, 2, None)]).unwrap();
        assert_eq!(e.train_status(TrainId(1)), Some(TrainStatus::Moving));
        assert_eq!(e.train_head(TrainId(1)), Some(SectionId(0)));
        assert_eq!(e.occupied_sections(), 1);

        // Express at 60 sections/min with dt 0.1s is 0.1 sections/tick:
        // ten ticks to the first boundary.
        for _ in 0..10 {
            e.execute_tick(vec![]).unwrap();
        }
        assert_eq!(e.train_head(TrainId(1)), Some(SectionId(2)));
        assert_eq!(e.occupied_sections(), 2, "two wagons on layout");
    }

    #[test]
    fn pause_freezes_time_and_state() {
        let mut e = engine();
        e.execute_tick(vec![spawn(1, 0, 1, None)]).unwrap();

        let result = e.execute_tick(vec![Command::Pause]).unwrap();
        assert!(!result.advanced, "pause takes effect at its own tick");
        let frozen = e.snapshot();
        for _ in 0..5 {
            let r = e.execute_tick(vec![]).unwrap();
            assert!(!r.advanced);
        }
        assert_eq!(e.snapshot(), frozen, "no drift while paused");

        let result = e.execute_tick(vec![Command::Resume]).unwrap();
        assert!(result.advanced);
        assert_ne!(e.snapshot(), frozen, "resumed");
        assert_eq!(e.snapshot().tick, TickId(frozen.tick.0 + 1));
    }

    #[test]
    fn clear_all_restores_reservation_table() {
        let mut e = engine();
        e.execute_tick(vec![spawn(1, 0, 3, None)]).unwrap();
        for _ in 0..30 {
            e.execute_tick(vec![]).unwrap();
        }
        assert!(e.occupied_sections() > 0);
        e.execute_tick(vec![Command::ClearAll]).unwrap();
        assert_eq!(e.occupied_sections(), 0);
        assert_eq!(e.snapshot().trains.len(), 0);
    }

    #[test]
    fn switch_under_a_train_is_rejected() {
        let mut e = engine();
        e.execute_tick(vec![spawn(1, 0, 1, None)]).unwrap();
        // Drive the train onto section 2.
        for _ in 0..15 {
            e.execute_tick(vec![]).unwrap();
        }
        assert_eq!(e.train_head(TrainId(1)), Some(SectionId(2)));

        let result = e
            .execute_tick(vec![Command::SetConnectionActive {
                from: SectionId(2),
                to: SectionId(1000),
                active: true,
            }])
            .unwrap();
        assert_eq!(
            result.receipts[0].reason,
            Some(CommandError::Switch(SwitchError::SwitchOccupied))
        );
        // The flag is unchanged: the siding stays inactive.
        let conn = e
            .topology()
            .connection(SectionId(2), SectionId(1000))
            .unwrap();
        assert!(!conn.active);
    }

    #[test]
    fn switch_no_op_produces_no_graph_change() {
        let mut e = engine();
        let result = e
            .execute_tick(vec![Command::SetConnectionActive {
                from: SectionId(0),
                to: SectionId(2),
                active: true,
            }])
            .unwrap();
        assert!(result.receipts[0].accepted);
        let snap = e.snapshot();
        let conn = snap
            .connections
            .iter()
            .find(|c| c.from == SectionId(0) && c.to == SectionId(2))
            .unwrap();
        assert!(conn.active);
    }

    #[test]
    fn unknown_connection_is_rejected() {
        let mut e = engine();
        let result = e
            .execute_tick(vec![Command::SetConnectionActive {
                from: SectionId(0),
                to: SectionId(41),
                active: false,
            }])
            .unwrap();
        assert!(matches!(
            result.receipts[0].reason,
            Some(CommandError::Switch(SwitchError::UnknownConnection { .. }))
        ));
    }

    #[test]
    fn shutdown_flag_is_latched() {
        let mut e = engine();
        assert!(!e.shutdown_requested());
        e.execute_tick(vec![Command::Shutdown]).unwrap();
        assert!(e.shutdown_requested());
    }
}
