//! Realtime wrapper: the tick thread and its user-facing handle.
//!
//! The tick thread owns the [`SimulationEngine`] exclusively (moved in
//! via `thread::spawn`). Commands arrive in batches over a bounded
//! crossbeam channel, wait in the bounded [`CommandQueue`], and are
//! drained at the start of the next tick; the per-batch receipts go
//! back over a oneshot reply channel within one tick period. Snapshots
//! fan out through the [`SnapshotHub`]'s drop-stale slots, so a slow
//! subscriber can never stall the cadence.
//!
//! The thread sleeps with `park_timeout` rather than `sleep` so a
//! shutdown request interrupts the budget wait immediately, regardless
//! of the configured tick rate.

use crate::broadcast::{SnapshotHub, Subscription};
use crate::config::{ConfigError, SimConfig};
use crate::engine::SimulationEngine;
use crate::ingress::CommandQueue;
use crossbeam_channel::{Receiver, Sender};
use log::error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use stellwerk_core::{Command, Receipt};
use stellwerk_topology::Topology;

/// Error submitting commands to the tick thread.
#[derive(Debug, PartialEq, Eq)]
pub enum SubmitError {
    /// The tick thread has shut down.
    Shutdown,
    /// The command channel is full (back-pressure).
    ChannelFull,
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shutdown => write!(f, "tick thread has shut down"),
            Self::ChannelFull => write!(f, "command channel full"),
        }
    }
}

impl std::error::Error for SubmitError {}

/// A batch of commands paired with its receipt reply channel.
struct CommandBatch {
    commands: Vec<Command>,
    reply: Sender<Vec<Receipt>>,
}

/// Handle to a running realtime simulation.
///
/// Dropping the handle shuts the simulation down.
pub struct SimulationHandle {
    cmd_tx: Option<Sender<CommandBatch>>,
    hub: Arc<SnapshotHub>,
    shutdown_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<SimulationEngine>>,
}

impl SimulationHandle {
    /// Validate the configuration, build the engine, and start the tick
    /// thread at the configured cadence.
    pub fn new(topology: Topology, config: SimConfig) -> Result<Self, ConfigError> {
        let engine = SimulationEngine::new(topology, config.clone())?;
        let hub = Arc::new(SnapshotHub::new());
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(64);

        let state = TickThread {
            engine,
            cmd_rx,
            hub: Arc::clone(&hub),
            shutdown: Arc::clone(&shutdown_flag),
            queue: CommandQueue::new(config.max_command_queue),
            tick_budget: Duration::from_secs_f64(1.0 / config.tick_rate_hz),
        };
        let thread = thread::Builder::new()
            .name("stellwerk-tick".into())
            .spawn(move || state.run())
            .expect("failed to spawn tick thread");

        Ok(Self {
            cmd_tx: Some(cmd_tx),
            hub,
            shutdown_flag,
            thread: Some(thread),
        })
    }

    /// Submit commands to be applied at the next tick boundary.
    ///
    /// Blocks only for the receipt reply, which arrives within one tick
    /// period.
    pub fn submit_commands(&self, commands: Vec<Command>) -> Result<Vec<Receipt>, SubmitError> {
        let cmd_tx = self.cmd_tx.as_ref().ok_or(SubmitError::Shutdown)?;
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let batch = CommandBatch {
            commands,
            reply: reply_tx,
        };
        cmd_tx.try_send(batch).map_err(|e| match e {
            crossbeam_channel::TrySendError::Full(_) => SubmitError::ChannelFull,
            crossbeam_channel::TrySendError::Disconnected(_) => SubmitError::Shutdown,
        })?;
        reply_rx.recv().map_err(|_| SubmitError::Shutdown)
    }

    /// Register a snapshot subscriber.
    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    /// Stop the simulation: the current tick completes, the final
    /// snapshot stands, queued commands are discarded. Returns the
    /// engine for post-mortem inspection.
    pub fn shutdown(&mut self) -> Option<SimulationEngine> {
        let handle = self.thread.take()?;
        self.shutdown_flag.store(true, Ordering::Release);
        // Wake the tick thread if it is parked in its budget sleep.
        handle.thread().unpark();
        self.cmd_tx.take();
        let engine = handle.join().ok();
        self.hub.close();
        engine
    }
}

impl Drop for SimulationHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the tick thread's main loop.
struct TickThread {
    engine: SimulationEngine,
    cmd_rx: Receiver<CommandBatch>,
    hub: Arc<SnapshotHub>,
    shutdown: Arc<AtomicBool>,
    queue: CommandQueue,
    tick_budget: Duration,
}

impl TickThread {
    /// Main loop. Runs until the shutdown flag is set or a `Shutdown`
    /// command is applied. Consumes self and returns the engine so the
    /// handle can recover it.
    fn run(mut self) -> SimulationEngine {
        // Per staged batch: the reply channel and receipts gathered so
        // far (queue overflow first, apply-time receipts after).
        let mut pending: Vec<(Sender<Vec<Receipt>>, Vec<Receipt>)> = Vec::new();

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            let tick_start = Instant::now();

            // Stage incoming batches into the bounded queue.
            while let Ok(batch) = self.cmd_rx.try_recv() {
                let batch_id = pending.len();
                let overflow = self.queue.submit(batch_id, batch.commands);
                pending.push((batch.reply, overflow));
            }

            // Drain the queue and execute the tick.
            let drained = self.queue.drain();
            let origins: Vec<(usize, usize)> =
                drained.iter().map(|q| (q.batch, q.index)).collect();
            let commands: Vec<Command> = drained.into_iter().map(|q| q.command).collect();

            match self.engine.execute_tick(commands) {
                Ok(result) => {
                    route_receipts(&mut pending, &origins, result.receipts);
                    if result.advanced {
                        self.hub.publish(Arc::new(self.engine.snapshot()));
                    }
                }
                Err(failure) => {
                    // Log the first failure loudly; a halted engine
                    // repeats `Halted` every tick after that.
                    if matches!(failure.error, stellwerk_core::StepError::Invariant(_)) {
                        error!("tick failed: {failure}");
                    }
                    route_receipts(&mut pending, &origins, failure.receipts);
                }
            }

            // Reply to every batch staged for this tick.
            for (reply, mut receipts) in pending.drain(..) {
                receipts.sort_by_key(|r| r.command_index);
                let _ = reply.send(receipts);
            }

            if self.engine.shutdown_requested() {
                break;
            }

            if let Some(remaining) = self.tick_budget.checked_sub(tick_start.elapsed()) {
                thread::park_timeout(remaining);
            }
        }

        self.hub.close();
        self.engine
    }
}

/// Rewrite engine receipts (indexed by drain position) to their
/// batch-local indices and hand them to the owning batch.
fn route_receipts(
    pending: &mut [(Sender<Vec<Receipt>>, Vec<Receipt>)],
    origins: &[(usize, usize)],
    receipts: Vec<Receipt>,
) {
    for (pos, mut receipt) in receipts.into_iter().enumerate() {
        let Some(&(batch, index)) = origins.get(pos) else {
            continue;
        };
        receipt.command_index = index;
        if let Some((_, gathered)) = pending.get_mut(batch) {
            gathered.push(receipt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellwerk_topology::demo::demo_station;

    #[test]
    fn handle_starts_ticks_and_shuts_down() {
        let mut handle =
            SimulationHandle::new(demo_station(), SimConfig::demo()).unwrap();
        let sub = handle.subscribe();
        let snap = sub
            .recv_timeout(Duration::from_secs(2))
            .expect("a snapshot within 2s");
        assert!(snap.tick.0 >= 1);

        let engine = handle.shutdown().expect("engine recovered");
        assert!(engine.tick().0 >= snap.tick.0);
        // Second shutdown is a no-op.
        assert!(handle.shutdown().is_none());
    }

    #[test]
    fn submit_after_shutdown_reports_shutdown() {
        let mut handle =
            SimulationHandle::new(demo_station(), SimConfig::demo()).unwrap();
        handle.shutdown();
        assert_eq!(
            handle.submit_commands(vec![Command::Pause]),
            Err(SubmitError::Shutdown)
        );
    }

    #[test]
    fn shutdown_command_stops_the_loop() {
        let mut handle =
            SimulationHandle::new(demo_station(), SimConfig::demo()).unwrap();
        let receipts = handle.submit_commands(vec![Command::Shutdown]).unwrap();
        assert!(receipts[0].accepted);
        // The thread exits on its own; join via shutdown.
        let engine = handle.shutdown().expect("engine recovered");
        assert!(engine.shutdown_requested());
    }

    #[test]
    fn drop_triggers_shutdown() {
        let handle = SimulationHandle::new(demo_station(), SimConfig::demo()).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        drop(handle);
        // If this returns, the drop path joined the thread.
    }
}
